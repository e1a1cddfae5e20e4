use crate::resource_graph::{
    GraphError,LinkId,NetworkId,NodeId,ResourceGraph,SubstrateTarget,
};

use super::config::MigrationPolicy;
use super::matches::{CandidateMatch,MatchKind,VirtualSide};

type HashMap<K,V> = std::collections::hash_map::HashMap<K,V,nohash::BuildNoHashHasher<usize>>;

type Result<T> = std::result::Result<T,GraphError>;

// Pre-release record of every mapping owned by the networks that re-enter
// the optimization. Lets a rejected re-embedding roll back, and lets the
// penalty policy surcharge candidates that deviate from the prior host.
pub(crate) struct MappingSnapshot {
    node_hosts:HashMap<NodeId,NodeId>,
    link_hosts:HashMap<LinkId,SubstrateTarget>,
    // networks that were fully embedded before release, safe to roll back
    restorable:Vec<NetworkId>,
    released:Vec<NetworkId>,
}

impl MappingSnapshot {
    pub(crate) fn empty() -> Self {
        Self {
            node_hosts:HashMap::with_hasher(nohash::BuildNoHashHasher::default()),
            link_hosts:HashMap::with_hasher(nohash::BuildNoHashHasher::default()),
            restorable:vec![],
            released:vec![],
        }
    }
    pub(crate) fn released(&self) -> &[NetworkId] {
        &self.released
    }
    pub(crate) fn is_restorable(&self,vnet:NetworkId) -> bool {
        self.restorable.contains(&vnet)
    }
    pub(crate) fn prior_node_host(&self,vnode:NodeId) -> Option<NodeId> {
        self.node_hosts.get(&vnode).copied()
    }
    // true when accepting this candidate would move an element away from
    // the host it occupied before release
    pub(crate) fn deviates(&self,graph:&ResourceGraph,candidate:&CandidateMatch) -> bool {
        match (candidate.kind,candidate.virtual_side,candidate.target) {
            (MatchKind::NodeToNode,VirtualSide::Node(vnode),Some(SubstrateTarget::Node(snode))) => {
                self.prior_node_host(vnode).map(|prior| prior != snode).unwrap_or(false)
            }
            (MatchKind::NetworkToServer,VirtualSide::Network(vnet),Some(SubstrateTarget::Node(snode))) => {
                let Ok(network) = graph.network(vnet) else {return false};
                network.nodes().iter().any(|vnode| {
                    self.prior_node_host(*vnode).map(|prior| prior != snode).unwrap_or(false)
                })
            }
            // links follow their endpoints, moving them is not surcharged twice
            _ => false,
        }
    }
}

// guests that the active policy allows back into the optimization; dirty
// networks are handled separately, they are always re-embedded
pub(crate) fn migratable_guests(graph:&ResourceGraph,substrate:NetworkId,policy:MigrationPolicy) -> Vec<NetworkId> {
    match policy {
        MigrationPolicy::AlwaysFree | MigrationPolicy::AlwaysPenalty => {
            let Ok(network) = graph.network(substrate) else {return vec![]};
            network.guests().iter()
                .filter(|guest| {
                    let Ok(found) = graph.network(**guest) else {return false};
                    !found.is_dirty()
                })
                .copied()
                .collect()
        }
        MigrationPolicy::Never | MigrationPolicy::MappingRemoved => vec![],
    }
}

// record and tear down the mappings of the given networks so the solver
// may place their elements afresh
pub(crate) fn snapshot_and_release(graph:&mut ResourceGraph,nets:&[NetworkId]) -> Result<MappingSnapshot> {
    let mut snapshot = MappingSnapshot::empty();
    for vnet in nets {
        let network = graph.network(*vnet)?;
        let dirty = network.is_dirty();
        let nodes = network.nodes().to_vec();
        let links = network.links().to_vec();
        let mut complete = !dirty;
        for vnode in nodes.iter() {
            match graph.host_of_node(*vnode) {
                Some(host) => {
                    snapshot.node_hosts.insert(*vnode,host);
                }
                None => complete = false,
            }
        }
        for vlink in links.iter() {
            match graph.host_of_link(*vlink) {
                Some(target) => {
                    snapshot.link_hosts.insert(*vlink,target);
                }
                None => complete = false,
            }
        }
        graph.unembed_network(*vnet)?;
        if complete {
            snapshot.restorable.push(*vnet);
        }
        snapshot.released.push(*vnet);
    }
    Ok(snapshot)
}

// roll a rejected network back to its snapshotted mapping; Ok(false) means
// the prior capacity has been taken in the meantime and the rollback was
// unwound, the network stays unembedded
pub(crate) fn restore(graph:&mut ResourceGraph,snapshot:&MappingSnapshot,vnet:NetworkId) -> Result<bool> {
    if !snapshot.is_restorable(vnet) {
        return Ok(false);
    }
    let network = graph.network(vnet)?;
    let nodes = network.nodes().to_vec();
    let links = network.links().to_vec();
    let mut unwind = false;
    for vnode in nodes {
        let Some(host) = snapshot.prior_node_host(vnode) else {
            unwind = true;
            break;
        };
        match graph.embed_node(vnode,host) {
            Ok(()) => {}
            Err(GraphError::NodeCapacityExceeded{..}) | Err(GraphError::NodeNotFound{..}) => {
                unwind = true;
                break;
            }
            Err(error) => return Err(error),
        }
    }
    if !unwind {
        for vlink in links {
            let Some(target) = snapshot.link_hosts.get(&vlink).copied() else {
                unwind = true;
                break;
            };
            match graph.embed_link(vlink,target) {
                Ok(()) => {}
                Err(GraphError::LinkCapacityExceeded{..})
                | Err(GraphError::LinkNotFound{..})
                | Err(GraphError::PathNotFound{..}) => {
                    unwind = true;
                    break;
                }
                Err(error) => return Err(error),
            }
        }
    }
    if unwind {
        // unembed_network tears down whatever part of the rollback landed
        graph.unembed_network(vnet)?;
        log::warn!("rollback of network {vnet} no longer fits, it stays unembedded");
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_graph::NodeCapacity;

    fn embedded_pair() -> (ResourceGraph,NetworkId,NetworkId,NodeId,NodeId) {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let server_a = graph.add_node(substrate,NodeCapacity::new(2,2,2)).unwrap();
        let server_b = graph.add_node(substrate,NodeCapacity::new(2,2,2)).unwrap();
        graph.add_link(substrate,server_a,server_b,4).unwrap();
        let vnet = graph.add_network("guest",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        graph.embed_node(v0,server_a).unwrap();
        (graph,substrate,vnet,v0,server_b)
    }

    #[test]
    fn test_snapshot_release_restore_roundtrip() {
        let (mut graph,_,vnet,v0,_) = embedded_pair();
        let residual_before = graph.nodes[0].residual();
        let snapshot = snapshot_and_release(&mut graph,&[vnet]).unwrap();
        assert!(graph.host_of_node(v0).is_none());
        assert!(snapshot.is_restorable(vnet));
        assert!(restore(&mut graph,&snapshot,vnet).unwrap());
        assert_eq!(graph.host_of_node(v0),Some(0));
        assert_eq!(graph.nodes[0].residual(),residual_before);
        graph.validate().unwrap();
    }

    #[test]
    fn test_restore_fails_when_capacity_taken() {
        let (mut graph,_,vnet,v0,_) = embedded_pair();
        let snapshot = snapshot_and_release(&mut graph,&[vnet]).unwrap();
        // a competing guest grabs the freed server
        let rival_net = graph.add_network("rival",false);
        let rival = graph.add_node(rival_net,NodeCapacity::new(2,2,2)).unwrap();
        graph.embed_node(rival,0).unwrap();
        assert!(!restore(&mut graph,&snapshot,vnet).unwrap());
        assert!(graph.host_of_node(v0).is_none());
        graph.validate().unwrap();
    }

    #[test]
    fn test_policy_selects_guests() {
        let (graph,substrate,vnet,_,_) = embedded_pair();
        assert_eq!(migratable_guests(&graph,substrate,MigrationPolicy::AlwaysFree),vec![vnet]);
        assert_eq!(migratable_guests(&graph,substrate,MigrationPolicy::AlwaysPenalty),vec![vnet]);
        assert!(migratable_guests(&graph,substrate,MigrationPolicy::Never).is_empty());
        assert!(migratable_guests(&graph,substrate,MigrationPolicy::MappingRemoved).is_empty());
    }
}
