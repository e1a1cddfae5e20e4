use super::elements::*;

type HashMap<K,V> = std::collections::hash_map::HashMap<K,V,nohash::BuildNoHashHasher<usize>>;

type Result<T> = std::result::Result<T,GraphError>;

fn new_map<K,V>() -> HashMap<K,V> {
    HashMap::with_hasher(nohash::BuildNoHashHasher::default())
}

// The substrate/virtual data model. Entities live in dense arenas and are
// addressed by index, removal leaves a tombstone so ids stay stable.
// The embedding orchestrator is the only writer during an embedding run.
pub struct ResourceGraph {
    pub(crate) networks:Vec<Network>,
    pub(crate) nodes:Vec<Node>,
    pub(crate) links:Vec<Link>,
    pub(crate) paths:Vec<Path>,
    // substrate adjacency, both directions of every link
    pub(crate) adjacency:HashMap<NodeId,Vec<(NodeId,LinkId)>>,
    // (source,target) -> cached shortest path, keyed in both orders
    pub(crate) path_between:std::collections::HashMap<(NodeId,NodeId),PathId>,
    pub(crate) paths_over_link:HashMap<LinkId,Vec<PathId>>,
    // forward references, one host per virtual element
    node_host:HashMap<NodeId,NodeId>,
    link_host:HashMap<LinkId,SubstrateTarget>,
    // back references from substrate elements to their guests
    node_guests:HashMap<NodeId,Vec<NodeId>>,
    link_guests:HashMap<LinkId,Vec<LinkId>>,
    colocated_guests:HashMap<NodeId,Vec<LinkId>>,
    path_guests:HashMap<PathId,Vec<LinkId>>,
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self {
            networks:vec![],
            nodes:vec![],
            links:vec![],
            paths:vec![],
            adjacency:new_map(),
            path_between:std::collections::HashMap::new(),
            paths_over_link:new_map(),
            node_host:new_map(),
            link_host:new_map(),
            node_guests:new_map(),
            link_guests:new_map(),
            colocated_guests:new_map(),
            path_guests:new_map(),
        }
    }

    pub fn add_network(&mut self,name:&str,substrate:bool) -> NetworkId {
        let id = self.networks.len();
        self.networks.push(Network {
            name:name.to_string(),
            substrate,
            nodes:vec![],
            links:vec![],
            guests:vec![],
            host:None,
            dirty:false,
        });
        id
    }

    pub fn add_node(&mut self,network:NetworkId,capacity:NodeCapacity) -> Result<NodeId> {
        if network >= self.networks.len() {
            return Err(GraphError::NetworkNotFound{network});
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            network,
            total:capacity,
            residual:capacity,
            removed:false,
        });
        self.networks[network].nodes.push(id);
        Ok(id)
    }

    pub fn add_link(&mut self,network:NetworkId,source:NodeId,target:NodeId,bandwidth:Bandwidth) -> Result<LinkId> {
        if network >= self.networks.len() {
            return Err(GraphError::NetworkNotFound{network});
        }
        for node in [source,target] {
            let found = self.node(node)?;
            if found.network != network {
                return Err(GraphError::NodeNetworkMismatch{node,actual:found.network,expected:network});
            }
        }
        let id = self.links.len();
        self.links.push(Link {
            network,
            source,
            target,
            total_bandwidth:bandwidth,
            residual_bandwidth:bandwidth,
            removed:false,
        });
        self.networks[network].links.push(id);
        if self.networks[network].substrate {
            self.adjacency.entry(source).or_default().push((target,id));
            self.adjacency.entry(target).or_default().push((source,id));
        }
        Ok(id)
    }

    pub fn network(&self,network:NetworkId) -> Result<&Network> {
        self.networks.get(network).ok_or(GraphError::NetworkNotFound{network})
    }

    pub fn node(&self,node:NodeId) -> Result<&Node> {
        match self.nodes.get(node) {
            Some(found) if !found.removed => Ok(found),
            _ => Err(GraphError::NodeNotFound{node}),
        }
    }

    pub fn link(&self,link:LinkId) -> Result<&Link> {
        match self.links.get(link) {
            Some(found) if !found.removed => Ok(found),
            _ => Err(GraphError::LinkNotFound{link}),
        }
    }

    pub fn path(&self,path:PathId) -> Result<&Path> {
        match self.paths.get(path) {
            Some(found) if !found.retired => Ok(found),
            _ => Err(GraphError::PathNotFound{path}),
        }
    }

    pub fn path_between(&self,source:NodeId,target:NodeId) -> Option<PathId> {
        self.path_between.get(&(source,target)).copied()
    }

    pub fn path_count(&self) -> usize {
        self.paths.iter().filter(|p| !p.retired).count()
    }

    pub fn host_of_node(&self,node:NodeId) -> Option<NodeId> {
        self.node_host.get(&node).copied()
    }

    pub fn host_of_link(&self,link:LinkId) -> Option<SubstrateTarget> {
        self.link_host.get(&link).copied()
    }

    fn substrate_node(&self,node:NodeId) -> Result<&Node> {
        let found = self.node(node)?;
        if !self.networks[found.network].substrate {
            return Err(GraphError::NotSubstrate(node));
        }
        Ok(found)
    }

    fn virtual_node(&self,node:NodeId) -> Result<&Node> {
        let found = self.node(node)?;
        if self.networks[found.network].substrate {
            return Err(GraphError::NotVirtual(node));
        }
        Ok(found)
    }

    fn virtual_link(&self,link:LinkId) -> Result<&Link> {
        let found = self.link(link)?;
        if self.networks[found.network].substrate {
            return Err(GraphError::NotVirtual(link));
        }
        Ok(found)
    }

    // map a virtual node onto a substrate node, decrementing residuals
    pub fn embed_node(&mut self,vnode:NodeId,snode:NodeId) -> Result<()> {
        let demand = self.virtual_node(vnode)?.total;
        let vnet = self.nodes[vnode].network;
        let residual = self.substrate_node(snode)?.residual;
        if self.node_host.contains_key(&vnode) {
            return Err(GraphError::NodeAlreadyMapped{node:vnode});
        }
        if !residual.fits(&demand) {
            return Err(GraphError::NodeCapacityExceeded{node:snode,residual,demand});
        }
        let snet = self.nodes[snode].network;
        self.nodes[snode].residual.try_sub(&demand)
            .ok_or(GraphError::NodeCapacityExceeded{node:snode,residual,demand})?;
        self.node_host.insert(vnode,snode);
        self.node_guests.entry(snode).or_default().push(vnode);
        self.networks[vnet].host = Some(snet);
        if !self.networks[snet].guests.contains(&vnet) {
            self.networks[snet].guests.push(vnet);
        }
        Ok(())
    }

    // map a virtual link onto a substrate node (co-located endpoints),
    // a direct substrate link, or a cached path
    pub fn embed_link(&mut self,vlink:LinkId,target:SubstrateTarget) -> Result<()> {
        let demand = self.virtual_link(vlink)?.total_bandwidth;
        if self.link_host.contains_key(&vlink) {
            return Err(GraphError::LinkAlreadyMapped{link:vlink});
        }
        match target {
            SubstrateTarget::Node(snode) => {
                self.substrate_node(snode)?;
                // co-located endpoints consume no substrate bandwidth
                self.colocated_guests.entry(snode).or_default().push(vlink);
            }
            SubstrateTarget::Link(slink) => {
                let residual = self.link(slink)?.residual_bandwidth;
                if residual < demand {
                    return Err(GraphError::LinkCapacityExceeded{link:slink,residual,demand});
                }
                self.links[slink].residual_bandwidth -= demand;
                self.link_guests.entry(slink).or_default().push(vlink);
                self.refresh_paths_over_link(slink);
            }
            SubstrateTarget::Path(spath) => {
                let constituents = self.path(spath)?.links.clone();
                for slink in constituents.iter() {
                    let residual = self.link(*slink)?.residual_bandwidth;
                    if residual < demand {
                        return Err(GraphError::LinkCapacityExceeded{link:*slink,residual,demand});
                    }
                }
                for slink in constituents.iter() {
                    self.links[*slink].residual_bandwidth -= demand;
                    self.link_guests.entry(*slink).or_default().push(vlink);
                }
                self.path_guests.entry(spath).or_default().push(vlink);
                for slink in constituents {
                    self.refresh_paths_over_link(slink);
                }
            }
        }
        self.link_host.insert(vlink,target);
        Ok(())
    }

    pub fn unembed_node(&mut self,vnode:NodeId) -> Result<()> {
        let demand = self.virtual_node(vnode)?.total;
        let Some(snode) = self.node_host.remove(&vnode) else {
            return Err(GraphError::NodeNotMapped{node:vnode});
        };
        self.nodes[snode].residual.add(&demand);
        debug_assert!(self.nodes[snode].total.fits(&self.nodes[snode].residual));
        if let Some(guests) = self.node_guests.get_mut(&snode) {
            guests.retain(|guest| *guest != vnode);
        }
        Ok(())
    }

    pub fn unembed_link(&mut self,vlink:LinkId) -> Result<()> {
        let demand = self.virtual_link(vlink)?.total_bandwidth;
        let Some(target) = self.link_host.remove(&vlink) else {
            return Err(GraphError::LinkNotMapped{link:vlink});
        };
        match target {
            SubstrateTarget::Node(snode) => {
                if let Some(guests) = self.colocated_guests.get_mut(&snode) {
                    guests.retain(|guest| *guest != vlink);
                }
            }
            SubstrateTarget::Link(slink) => {
                self.links[slink].residual_bandwidth += demand;
                debug_assert!(self.links[slink].residual_bandwidth <= self.links[slink].total_bandwidth);
                if let Some(guests) = self.link_guests.get_mut(&slink) {
                    guests.retain(|guest| *guest != vlink);
                }
                self.refresh_paths_over_link(slink);
            }
            SubstrateTarget::Path(spath) => {
                let constituents = self.paths[spath].links.clone();
                for slink in constituents.iter() {
                    self.links[*slink].residual_bandwidth += demand;
                    debug_assert!(self.links[*slink].residual_bandwidth <= self.links[*slink].total_bandwidth);
                    if let Some(guests) = self.link_guests.get_mut(slink) {
                        guests.retain(|guest| *guest != vlink);
                    }
                }
                if let Some(guests) = self.path_guests.get_mut(&spath) {
                    guests.retain(|guest| *guest != vlink);
                }
                for slink in constituents {
                    self.refresh_paths_over_link(slink);
                }
            }
        }
        Ok(())
    }

    // fully unembed a virtual network, links before nodes, and detach it
    // from its host; restores every touched residual
    pub fn unembed_network(&mut self,vnet:NetworkId) -> Result<()> {
        let network = self.network(vnet)?;
        if network.substrate {
            return Err(GraphError::NotVirtual(vnet));
        }
        let links = network.links.clone();
        let nodes = network.nodes.clone();
        for vlink in links {
            if self.link_host.contains_key(&vlink) {
                self.unembed_link(vlink)?;
            }
        }
        for vnode in nodes {
            if self.node_host.contains_key(&vnode) {
                self.unembed_node(vnode)?;
            }
        }
        if let Some(snet) = self.networks[vnet].host.take() {
            self.networks[snet].guests.retain(|guest| *guest != vnet);
        }
        self.networks[vnet].dirty = false;
        Ok(())
    }

    pub(crate) fn refresh_paths_over_link(&mut self,slink:LinkId) {
        let Some(path_ids) = self.paths_over_link.get(&slink) else {return};
        for path_id in path_ids.clone() {
            if self.paths[path_id].retired {
                continue;
            }
            let min = self.paths[path_id].links.iter()
                .map(|l| self.links[*l].residual_bandwidth)
                .min()
                .unwrap_or(0);
            self.paths[path_id].residual_bandwidth = min;
        }
    }

    // ungraceful removal of a substrate node: incident links are removed
    // too, guest mappings are force-unembedded without releasing residuals
    // onto the removed element, owners are flagged dirty
    pub fn remove_node(&mut self,snode:NodeId) -> Result<Vec<NetworkId>> {
        self.substrate_node(snode)?;
        let mut dirty:Vec<NetworkId> = vec![];
        let incident:Vec<LinkId> = self.networks[self.nodes[snode].network].links.iter()
            .filter(|l| {
                let link = &self.links[**l];
                !link.removed && (link.source == snode || link.target == snode)
            })
            .copied()
            .collect();
        for slink in incident {
            self.remove_link_inner(slink,&mut dirty);
        }
        for vnode in self.node_guests.remove(&snode).unwrap_or_default() {
            self.node_host.remove(&vnode);
            self.mark_dirty(self.nodes[vnode].network,&mut dirty);
        }
        for vlink in self.colocated_guests.remove(&snode).unwrap_or_default() {
            self.link_host.remove(&vlink);
            self.mark_dirty(self.links[vlink].network,&mut dirty);
        }
        self.nodes[snode].removed = true;
        self.adjacency.remove(&snode);
        log::warn!("substrate node {snode} removed, {} guest network(s) flagged for repair",dirty.len());
        Ok(dirty)
    }

    // ungraceful removal of a substrate link: paths over it are retired and
    // their guests force-unembedded, releasing bandwidth only on surviving
    // links so nothing is double-released
    pub fn remove_link(&mut self,slink:LinkId) -> Result<Vec<NetworkId>> {
        let found = self.link(slink)?;
        if !self.networks[found.network].substrate {
            return Err(GraphError::NotSubstrate(slink));
        }
        let mut dirty = vec![];
        self.remove_link_inner(slink,&mut dirty);
        log::warn!("substrate link {slink} removed, {} guest network(s) flagged for repair",dirty.len());
        Ok(dirty)
    }

    fn remove_link_inner(&mut self,slink:LinkId,dirty:&mut Vec<NetworkId>) {
        // direct guests lose their mapping, the bandwidth they held on the
        // removed link disappears with it
        for vlink in self.link_guests.remove(&slink).unwrap_or_default() {
            match self.link_host.get(&vlink).copied() {
                Some(SubstrateTarget::Link(direct)) if direct == slink => {
                    self.link_host.remove(&vlink);
                    self.mark_dirty(self.links[vlink].network,dirty);
                }
                // path guests are handled below, per retired path
                _ => {}
            }
        }
        for path_id in self.paths_over_link.remove(&slink).unwrap_or_default() {
            if self.paths[path_id].retired {
                continue;
            }
            for vlink in self.path_guests.remove(&path_id).unwrap_or_default() {
                let demand = self.links[vlink].total_bandwidth;
                for survivor in self.paths[path_id].links.clone() {
                    if survivor == slink {
                        continue;
                    }
                    self.links[survivor].residual_bandwidth += demand;
                    if let Some(guests) = self.link_guests.get_mut(&survivor) {
                        guests.retain(|guest| *guest != vlink);
                    }
                }
                self.link_host.remove(&vlink);
                self.mark_dirty(self.links[vlink].network,dirty);
            }
            let (source,target) = (self.paths[path_id].source,self.paths[path_id].target);
            self.path_between.remove(&(source,target));
            self.path_between.remove(&(target,source));
            self.paths[path_id].retired = true;
        }
        let (source,target) = (self.links[slink].source,self.links[slink].target);
        if let Some(neighbours) = self.adjacency.get_mut(&source) {
            neighbours.retain(|(_,l)| *l != slink);
        }
        if let Some(neighbours) = self.adjacency.get_mut(&target) {
            neighbours.retain(|(_,l)| *l != slink);
        }
        self.links[slink].removed = true;
        // releases above may have raised residuals of surviving paths
        for link_id in 0..self.links.len() {
            if !self.links[link_id].removed {
                self.refresh_paths_over_link(link_id);
            }
        }
    }

    fn mark_dirty(&mut self,vnet:NetworkId,dirty:&mut Vec<NetworkId>) {
        self.networks[vnet].dirty = true;
        if !dirty.contains(&vnet) {
            dirty.push(vnet);
        }
    }

    pub fn dirty_guests(&self,snet:NetworkId) -> Vec<NetworkId> {
        let Ok(network) = self.network(snet) else {return vec![]};
        network.guests.iter()
            .filter(|guest| self.networks[**guest].dirty)
            .copied()
            .collect()
    }

    // full consistency pass over the capacity and assignment invariants,
    // fatal if the graph was left unrepaired after an ungraceful removal
    pub fn validate(&self) -> Result<()> {
        let fail = |reason:String| Err(GraphError::Inconsistent{reason});
        for (id,node) in self.nodes.iter().enumerate() {
            if node.removed || !self.networks[node.network].substrate {
                continue;
            }
            let mut hosted = NodeCapacity::default();
            for guest in self.node_guests.get(&id).map(|v| v.as_slice()).unwrap_or(&[]) {
                hosted.add(&self.nodes[*guest].total);
            }
            hosted.add(&node.residual);
            if hosted != node.total {
                return fail(format!("node {id}: residual {:?} + hosted demands != total {:?}",node.residual,node.total));
            }
        }
        for (id,link) in self.links.iter().enumerate() {
            if link.removed || !self.networks[link.network].substrate {
                continue;
            }
            let hosted:Bandwidth = self.link_guests.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
                .iter()
                .map(|guest| self.links[*guest].total_bandwidth)
                .sum();
            if hosted + link.residual_bandwidth != link.total_bandwidth {
                return fail(format!("link {id}: residual {} + hosted {} != total {}",link.residual_bandwidth,hosted,link.total_bandwidth));
            }
        }
        for (id,path) in self.paths.iter().enumerate() {
            if path.retired {
                continue;
            }
            let mut min = Bandwidth::MAX;
            for slink in path.links.iter() {
                if self.links[*slink].removed {
                    return fail(format!("path {id} crosses removed link {slink}"));
                }
                min = min.min(self.links[*slink].residual_bandwidth);
            }
            if path.residual_bandwidth != min {
                return fail(format!("path {id}: cached residual {} != min constituent residual {min}",path.residual_bandwidth));
            }
        }
        for (vnode,snode) in self.node_host.iter() {
            if self.nodes[*snode].removed {
                return fail(format!("virtual node {vnode} mapped to removed node {snode}"));
            }
            let listed = self.node_guests.get(snode)
                .map(|guests| guests.contains(vnode))
                .unwrap_or(false);
            if !listed {
                return fail(format!("virtual node {vnode} missing from guest list of node {snode}"));
            }
        }
        for (id,network) in self.networks.iter().enumerate() {
            if network.substrate {
                continue;
            }
            if network.dirty {
                return fail(format!("network {id} ({}) is awaiting repair",network.name));
            }
            if network.host.is_none() {
                continue;
            }
            // assignment invariant: an accepted network has every element mapped
            for vnode in network.nodes.iter() {
                if !self.node_host.contains_key(vnode) {
                    return fail(format!("embedded network {id}: node {vnode} has no host"));
                }
            }
            for vlink in network.links.iter() {
                if !self.link_host.contains_key(vlink) {
                    return fail(format!("embedded network {id}: link {vlink} has no host"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_servers_one_switch() -> (ResourceGraph,NetworkId,[NodeId;3],[LinkId;2]) {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let server_a = graph.add_node(substrate,NodeCapacity::new(4,4,4)).unwrap();
        let server_b = graph.add_node(substrate,NodeCapacity::new(4,4,4)).unwrap();
        let switch = graph.add_node(substrate,NodeCapacity::new(0,0,0)).unwrap();
        let link_a = graph.add_link(substrate,server_a,switch,10).unwrap();
        let link_b = graph.add_link(substrate,switch,server_b,10).unwrap();
        (graph,substrate,[server_a,server_b,switch],[link_a,link_b])
    }

    #[test]
    fn test_embed_unembed_restores_residuals() {
        let (mut graph,_,[server_a,server_b,_],links) = two_servers_one_switch();
        graph.precompute_paths(0,4).unwrap();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,2,1)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(2,1,1)).unwrap();
        let vl = graph.add_link(vnet,v0,v1,3).unwrap();

        let before:Vec<NodeCapacity> = graph.nodes.iter().map(|n| n.residual).collect();
        let before_bw:Vec<u64> = graph.links.iter().map(|l| l.residual_bandwidth).collect();

        graph.embed_node(v0,server_a).unwrap();
        graph.embed_node(v1,server_b).unwrap();
        let path = graph.path_between(server_a,server_b).unwrap();
        graph.embed_link(vl,SubstrateTarget::Path(path)).unwrap();

        assert_eq!(graph.node(server_a).unwrap().residual(),NodeCapacity::new(3,2,3));
        assert_eq!(graph.link(links[0]).unwrap().residual_bandwidth(),7);
        assert_eq!(graph.path(path).unwrap().residual_bandwidth(),7);
        graph.validate().unwrap();

        graph.unembed_network(vnet).unwrap();
        let after:Vec<NodeCapacity> = graph.nodes.iter().map(|n| n.residual).collect();
        let after_bw:Vec<u64> = graph.links.iter().map(|l| l.residual_bandwidth).collect();
        assert_eq!(before,after);
        assert_eq!(before_bw,after_bw);
        assert!(graph.network(vnet).unwrap().host().is_none());
        graph.validate().unwrap();
    }

    #[test]
    fn test_single_host_invariant() {
        let (mut graph,_,[server_a,server_b,_],_) = two_servers_one_switch();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        graph.embed_node(v0,server_a).unwrap();
        // re-mapping without unembedding first must be refused
        let denied = graph.embed_node(v0,server_b);
        assert!(matches!(denied,Err(GraphError::NodeAlreadyMapped{..})));
        graph.unembed_node(v0).unwrap();
        graph.embed_node(v0,server_b).unwrap();
        graph.validate().unwrap();
    }

    #[test]
    fn test_capacity_refused() {
        let (mut graph,_,[server_a,_,_],_) = two_servers_one_switch();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(5,1,1)).unwrap();
        let denied = graph.embed_node(v0,server_a);
        assert!(matches!(denied,Err(GraphError::NodeCapacityExceeded{..})));
        assert_eq!(graph.node(server_a).unwrap().residual(),NodeCapacity::new(4,4,4));
    }

    #[test]
    fn test_remove_node_cascades_and_validation_fails() {
        let (mut graph,_,[server_a,server_b,_],_) = two_servers_one_switch();
        graph.precompute_paths(0,4).unwrap();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let vl = graph.add_link(vnet,v0,v1,2).unwrap();
        graph.embed_node(v0,server_a).unwrap();
        graph.embed_node(v1,server_b).unwrap();
        let path = graph.path_between(server_a,server_b).unwrap();
        graph.embed_link(vl,SubstrateTarget::Path(path)).unwrap();
        graph.validate().unwrap();

        let dirty = graph.remove_node(server_b).unwrap();
        assert_eq!(dirty,vec![vnet]);
        assert!(graph.network(vnet).unwrap().is_dirty());
        assert!(graph.host_of_node(v1).is_none());
        assert!(graph.host_of_link(vl).is_none());
        // the mapping onto server_a survives
        assert_eq!(graph.host_of_node(v0),Some(server_a));
        // unrepaired graph must fail its own validation
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_remove_link_releases_survivors_once() {
        let (mut graph,_,[server_a,server_b,_],[link_a,link_b]) = two_servers_one_switch();
        graph.precompute_paths(0,4).unwrap();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let vl = graph.add_link(vnet,v0,v1,4).unwrap();
        graph.embed_node(v0,server_a).unwrap();
        graph.embed_node(v1,server_b).unwrap();
        let path = graph.path_between(server_a,server_b).unwrap();
        graph.embed_link(vl,SubstrateTarget::Path(path)).unwrap();
        assert_eq!(graph.link(link_a).unwrap().residual_bandwidth(),6);

        graph.remove_link(link_b).unwrap();
        // the surviving constituent got its bandwidth back exactly once
        assert_eq!(graph.link(link_a).unwrap().residual_bandwidth(),10);
        assert!(graph.path(path).is_err());
        assert!(graph.host_of_link(vl).is_none());
        assert!(graph.network(vnet).unwrap().is_dirty());
    }
}
