use std::collections::VecDeque;

use super::elements::*;
use super::graph::ResourceGraph;

type HashMap<K,V> = std::collections::hash_map::HashMap<K,V,nohash::BuildNoHashHasher<usize>>;

type Result<T> = std::result::Result<T,GraphError>;

impl ResourceGraph {
    // cache a shortest path (in hops) between every reachable substrate
    // node pair, up to max_hops links; bandwidth-aware embedding requires
    // this to have run before the orchestrator is built
    pub fn precompute_paths(&mut self,substrate:NetworkId,max_hops:usize) -> Result<usize> {
        let network = self.network(substrate)?;
        if !network.substrate {
            return Err(GraphError::NotSubstrate(substrate));
        }
        let sources:Vec<NodeId> = network.nodes.iter()
            .filter(|n| !self.nodes[**n].removed)
            .copied()
            .collect();
        let mut created = 0;
        for source in sources {
            created += self.bfs_cache_paths(source,max_hops);
        }
        log::debug!("precomputed {created} substrate path(s) for network {substrate}");
        Ok(created)
    }

    fn bfs_cache_paths(&mut self,source:NodeId,max_hops:usize) -> usize {
        // predecessor per reached node, rebuilt into link sequences below
        let mut came_from:HashMap<NodeId,(NodeId,LinkId)> =
            HashMap::with_capacity_and_hasher(self.nodes.len(),nohash::BuildNoHashHasher::default());
        let mut hops:HashMap<NodeId,usize> =
            HashMap::with_capacity_and_hasher(self.nodes.len(),nohash::BuildNoHashHasher::default());
        let mut queue = VecDeque::new();
        hops.insert(source,0);
        queue.push_back(source);
        while let Some(current) = queue.pop_front() {
            let depth = hops[&current];
            if depth == max_hops {
                continue;
            }
            let Some(neighbours) = self.adjacency.get(&current) else {continue};
            for (next,link) in neighbours.clone() {
                if self.links[link].removed || hops.contains_key(&next) {
                    continue;
                }
                hops.insert(next,depth + 1);
                came_from.insert(next,(current,link));
                queue.push_back(next);
            }
        }
        let mut created = 0;
        for (target,_) in hops.iter() {
            if *target == source || self.path_between.contains_key(&(source,*target)) {
                continue;
            }
            let mut links = vec![];
            let mut cursor = *target;
            while cursor != source {
                let (previous,link) = came_from[&cursor];
                links.push(link);
                cursor = previous;
            }
            links.reverse();
            let residual = links.iter()
                .map(|l| self.links[*l].residual_bandwidth)
                .min()
                .unwrap_or(0);
            let path_id = self.paths.len();
            for link in links.iter() {
                self.paths_over_link.entry(*link).or_default().push(path_id);
            }
            self.path_between.insert((source,*target),path_id);
            self.path_between.insert((*target,source),path_id);
            self.paths.push(Path {
                source,
                target:*target,
                links,
                residual_bandwidth:residual,
                retired:false,
            });
            created += 1;
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_through_switch() {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let server_a = graph.add_node(substrate,NodeCapacity::new(1,1,1)).unwrap();
        let server_b = graph.add_node(substrate,NodeCapacity::new(1,1,1)).unwrap();
        let switch = graph.add_node(substrate,NodeCapacity::new(0,0,0)).unwrap();
        graph.add_link(substrate,server_a,switch,5).unwrap();
        graph.add_link(substrate,switch,server_b,3).unwrap();

        graph.precompute_paths(substrate,4).unwrap();
        let path_id = graph.path_between(server_a,server_b).unwrap();
        let path = graph.path(path_id).unwrap();
        assert_eq!(path.hops(),2);
        // residual is the bottleneck link
        assert_eq!(path.residual_bandwidth(),3);
        // cached in both directions, same entry
        assert_eq!(graph.path_between(server_b,server_a),Some(path_id));
        graph.validate().unwrap();
    }

    #[test]
    fn test_hop_bound() {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let mut chain = vec![];
        for _ in 0..5 {
            chain.push(graph.add_node(substrate,NodeCapacity::new(1,1,1)).unwrap());
        }
        for pair in chain.windows(2) {
            graph.add_link(substrate,pair[0],pair[1],1).unwrap();
        }
        graph.precompute_paths(substrate,2).unwrap();
        assert!(graph.path_between(chain[0],chain[2]).is_some());
        // 4 hops away, beyond the bound
        assert!(graph.path_between(chain[0],chain[4]).is_none());
    }

    #[test]
    fn test_shortest_is_cached() {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let a = graph.add_node(substrate,NodeCapacity::new(1,1,1)).unwrap();
        let b = graph.add_node(substrate,NodeCapacity::new(1,1,1)).unwrap();
        let c = graph.add_node(substrate,NodeCapacity::new(0,0,0)).unwrap();
        // direct link plus a 2-hop detour
        graph.add_link(substrate,a,b,1).unwrap();
        graph.add_link(substrate,a,c,1).unwrap();
        graph.add_link(substrate,c,b,1).unwrap();
        graph.precompute_paths(substrate,4).unwrap();
        let path = graph.path(graph.path_between(a,b).unwrap()).unwrap();
        assert_eq!(path.hops(),1);
    }
}
