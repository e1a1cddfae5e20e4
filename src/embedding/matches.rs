use crate::resource_graph::{NetworkId,NodeId,LinkId,ResourceGraph,SubstrateTarget};

use super::EmbedError;

type Result<T> = std::result::Result<T,EmbedError>;

#[derive(Clone,Copy,PartialEq,Eq,Debug,Hash)]
pub enum MatchKind {
    NodeToNode,
    LinkToLink,
    LinkToPath,
    // a whole small request onto a single server
    NetworkToServer,
    // the rejection sentinel
    NetworkReject,
}

#[derive(Clone,Copy,PartialEq,Eq,Debug,Hash)]
pub enum VirtualSide {
    Node(NodeId),
    Link(LinkId),
    Network(NetworkId),
}

// a structurally and capacity-feasible pairing of one virtual element with
// one substrate element or path; ephemeral, regenerated per matcher run
#[derive(Clone,Copy,PartialEq,Eq,Debug,Hash)]
pub struct CandidateMatch {
    pub kind:MatchKind,
    pub virtual_side:VirtualSide,
    pub target:Option<SubstrateTarget>,
    // link matches carry an orientation: flipped means the virtual source
    // endpoint sits on the substrate target endpoint
    pub flipped:bool,
}

#[derive(Clone,Debug,Default)]
pub struct Delta {
    pub added:Vec<CandidateMatch>,
    pub removed:Vec<CandidateMatch>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub trait CandidateMatcher {
    fn run(&mut self,graph:&ResourceGraph,batch:&[NetworkId]) -> Result<Delta>;
    // release matcher-held state
    fn dispose(&mut self);
}

fn kind_rank(kind:MatchKind) -> usize {
    // node matches must precede link matches so the compiler can wire
    // link-to-endpoint consistency rows against existing variables
    match kind {
        MatchKind::NetworkReject => 0,
        MatchKind::NodeToNode | MatchKind::NetworkToServer => 1,
        MatchKind::LinkToLink | MatchKind::LinkToPath => 2,
    }
}

fn diff(emitted:&mut std::collections::HashSet<CandidateMatch>,
        current:std::collections::HashSet<CandidateMatch>,
        batch_of:impl Fn(&CandidateMatch) -> Option<NetworkId>,
        batch:&[NetworkId]) -> Delta {
    // candidates of networks outside this batch were purged with their
    // batch, drop them silently instead of emitting removals
    emitted.retain(|m| batch_of(m).map(|net| batch.contains(&net)).unwrap_or(false));
    let mut added:Vec<CandidateMatch> = current.difference(emitted).copied().collect();
    let mut removed:Vec<CandidateMatch> = emitted.difference(&current).copied().collect();
    added.sort_by_key(|m| (kind_rank(m.kind),m.virtual_side_index(),m.target_index()));
    removed.sort_by_key(|m| (usize::MAX - kind_rank(m.kind),m.virtual_side_index(),m.target_index()));
    *emitted = current;
    Delta {added,removed}
}

impl CandidateMatch {
    fn virtual_side_index(&self) -> usize {
        match self.virtual_side {
            VirtualSide::Node(id) | VirtualSide::Link(id) | VirtualSide::Network(id) => id,
        }
    }
    fn target_index(&self) -> usize {
        match self.target {
            Some(SubstrateTarget::Node(id))
            | Some(SubstrateTarget::Link(id))
            | Some(SubstrateTarget::Path(id)) => id + 1,
            None => 0,
        }
    }
}

// Element-granularity matcher: node-to-node plus link-to-link/path/host
// candidates, filtered by current residual capacity. Keeps the previously
// emitted set to report a delta of newly valid/invalid candidates.
pub struct ElementMatcher {
    substrate:NetworkId,
    bandwidth_aware:bool,
    emitted:std::collections::HashSet<CandidateMatch>,
}

impl ElementMatcher {
    pub fn new(substrate:NetworkId,bandwidth_aware:bool) -> Self {
        Self {
            substrate,
            bandwidth_aware,
            emitted:std::collections::HashSet::new(),
        }
    }
}

impl CandidateMatcher for ElementMatcher {
    fn run(&mut self,graph:&ResourceGraph,batch:&[NetworkId]) -> Result<Delta> {
        let mut current = std::collections::HashSet::new();
        let substrate_nodes:Vec<NodeId> = graph.network(self.substrate)?.nodes().iter()
            .filter(|n| graph.node(**n).is_ok())
            .copied()
            .collect();
        for vnet in batch {
            current.insert(CandidateMatch {
                kind:MatchKind::NetworkReject,
                virtual_side:VirtualSide::Network(*vnet),
                target:None,
                flipped:false,
            });
            let network = graph.network(*vnet)?;
            let vnodes = network.nodes().to_vec();
            let vlinks = network.links().to_vec();
            // per virtual node: substrate hosts whose residual fits
            let mut hosts:Vec<(NodeId,Vec<NodeId>)> = vec![];
            for vnode in vnodes {
                debug_assert!(graph.host_of_node(vnode).is_none());
                let demand = graph.node(vnode)?.demand();
                let mut feasible = vec![];
                for snode in substrate_nodes.iter() {
                    if graph.node(*snode)?.residual().fits(&demand) {
                        current.insert(CandidateMatch {
                            kind:MatchKind::NodeToNode,
                            virtual_side:VirtualSide::Node(vnode),
                            target:Some(SubstrateTarget::Node(*snode)),
                            flipped:false,
                        });
                        feasible.push(*snode);
                    }
                }
                hosts.push((vnode,feasible));
            }
            for vlink in vlinks {
                let (u,v) = graph.link(vlink)?.endpoints();
                let demand = graph.link(vlink)?.demand();
                let hosts_of = |node:NodeId| hosts.iter()
                    .find(|(vnode,_)| *vnode == node)
                    .map(|(_,feasible)| feasible.as_slice())
                    .unwrap_or(&[]);
                for a in hosts_of(u) {
                    for b in hosts_of(v) {
                        if a == b {
                            // co-located endpoints, no bandwidth needed
                            current.insert(CandidateMatch {
                                kind:MatchKind::LinkToLink,
                                virtual_side:VirtualSide::Link(vlink),
                                target:Some(SubstrateTarget::Node(*a)),
                                flipped:false,
                            });
                            continue;
                        }
                        if let Some(direct) = direct_link(graph,*a,*b) {
                            let link = graph.link(direct)?;
                            if link.residual_bandwidth() >= demand {
                                current.insert(CandidateMatch {
                                    kind:MatchKind::LinkToLink,
                                    virtual_side:VirtualSide::Link(vlink),
                                    target:Some(SubstrateTarget::Link(direct)),
                                    flipped:link.endpoints().0 != *a,
                                });
                            }
                        }
                        if !self.bandwidth_aware {
                            continue;
                        }
                        let Some(path_id) = graph.path_between(*a,*b) else {continue};
                        let path = graph.path(path_id)?;
                        if path.hops() > 1 && path.residual_bandwidth() >= demand {
                            current.insert(CandidateMatch {
                                kind:MatchKind::LinkToPath,
                                virtual_side:VirtualSide::Link(vlink),
                                target:Some(SubstrateTarget::Path(path_id)),
                                flipped:path.endpoints().0 != *a,
                            });
                        }
                    }
                }
            }
        }
        let delta = diff(&mut self.emitted,current,|m| owner_network(graph,m),batch);
        log::debug!("element matcher: +{} -{} candidate(s)",delta.added.len(),delta.removed.len());
        Ok(delta)
    }
    fn dispose(&mut self) {
        self.emitted.clear();
        self.emitted.shrink_to_fit();
    }
}

// Network-granularity matcher: offers whole small requests to single
// servers that can absorb every node demand at once; virtual links become
// co-located and take no substrate bandwidth.
pub struct ServerMatcher {
    substrate:NetworkId,
    emitted:std::collections::HashSet<CandidateMatch>,
}

impl ServerMatcher {
    pub fn new(substrate:NetworkId) -> Self {
        Self {
            substrate,
            emitted:std::collections::HashSet::new(),
        }
    }
}

impl CandidateMatcher for ServerMatcher {
    fn run(&mut self,graph:&ResourceGraph,batch:&[NetworkId]) -> Result<Delta> {
        let mut current = std::collections::HashSet::new();
        let substrate_nodes:Vec<NodeId> = graph.network(self.substrate)?.nodes().iter()
            .filter(|n| graph.node(**n).is_ok())
            .copied()
            .collect();
        for vnet in batch {
            current.insert(CandidateMatch {
                kind:MatchKind::NetworkReject,
                virtual_side:VirtualSide::Network(*vnet),
                target:None,
                flipped:false,
            });
            let network = graph.network(*vnet)?;
            let mut total = crate::resource_graph::NodeCapacity::default();
            for vnode in network.nodes() {
                total.add(&graph.node(*vnode)?.demand());
            }
            for snode in substrate_nodes.iter() {
                if graph.node(*snode)?.residual().fits(&total) {
                    current.insert(CandidateMatch {
                        kind:MatchKind::NetworkToServer,
                        virtual_side:VirtualSide::Network(*vnet),
                        target:Some(SubstrateTarget::Node(*snode)),
                        flipped:false,
                    });
                }
            }
        }
        let delta = diff(&mut self.emitted,current,|m| owner_network(graph,m),batch);
        log::debug!("server matcher: +{} -{} candidate(s)",delta.added.len(),delta.removed.len());
        Ok(delta)
    }
    fn dispose(&mut self) {
        self.emitted.clear();
        self.emitted.shrink_to_fit();
    }
}

pub(crate) fn owner_network(graph:&ResourceGraph,candidate:&CandidateMatch) -> Option<NetworkId> {
    match candidate.virtual_side {
        VirtualSide::Network(net) => Some(net),
        VirtualSide::Node(node) => graph.node(node).ok().map(|n| n.network()),
        VirtualSide::Link(link) => graph.link(link).ok().map(|l| l.network()),
    }
}

fn direct_link(graph:&ResourceGraph,a:NodeId,b:NodeId) -> Option<LinkId> {
    graph.adjacency.get(&a)?
        .iter()
        .find(|(neighbour,_)| *neighbour == b)
        .map(|(_,link)| *link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_graph::NodeCapacity;

    fn testbed() -> (ResourceGraph,NetworkId,NetworkId) {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let a = graph.add_node(substrate,NodeCapacity::new(2,2,2)).unwrap();
        let b = graph.add_node(substrate,NodeCapacity::new(1,1,1)).unwrap();
        graph.add_link(substrate,a,b,5).unwrap();
        graph.precompute_paths(substrate,4).unwrap();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(2,2,2)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        graph.add_link(vnet,v0,v1,2).unwrap();
        (graph,substrate,vnet)
    }

    #[test]
    fn test_capacity_filters_node_candidates() {
        let (graph,substrate,vnet) = testbed();
        let mut matcher = ElementMatcher::new(substrate,true);
        let delta = matcher.run(&graph,&[vnet]).unwrap();
        assert!(delta.removed.is_empty());
        let node_matches:Vec<&CandidateMatch> = delta.added.iter()
            .filter(|m| m.kind == MatchKind::NodeToNode)
            .collect();
        // v0 (2,2,2) only fits server a, v1 fits both
        assert_eq!(node_matches.len(),3);
        let rejects = delta.added.iter().filter(|m| m.kind == MatchKind::NetworkReject).count();
        assert_eq!(rejects,1);
    }

    #[test]
    fn test_second_run_reports_invalidated_candidates() {
        let (mut graph,substrate,vnet) = testbed();
        let mut matcher = ElementMatcher::new(substrate,true);
        let first = matcher.run(&graph,&[vnet]).unwrap();
        assert!(!first.added.is_empty());
        // consume server b entirely with a foreign guest
        let other = graph.add_network("other",false);
        let filler = graph.add_node(other,NodeCapacity::new(1,1,1)).unwrap();
        let server_b = graph.network(substrate).unwrap().nodes()[1];
        graph.embed_node(filler,server_b).unwrap();
        let second = matcher.run(&graph,&[vnet]).unwrap();
        assert!(second.added.is_empty());
        // v1's candidate on server b and the links relying on it are gone
        assert!(second.removed.iter().any(|m| {
            m.kind == MatchKind::NodeToNode && m.target == Some(SubstrateTarget::Node(server_b))
        }));
    }

    #[test]
    fn test_server_matcher_requires_total_fit() {
        let (graph,substrate,vnet) = testbed();
        let mut matcher = ServerMatcher::new(substrate);
        let delta = matcher.run(&graph,&[vnet]).unwrap();
        // total demand (3,3,3) fits neither server, only the reject sentinel
        assert_eq!(delta.added.len(),1);
        assert_eq!(delta.added[0].kind,MatchKind::NetworkReject);
    }

    #[test]
    fn test_link_candidates_carry_orientation() {
        let (graph,substrate,vnet) = testbed();
        let mut matcher = ElementMatcher::new(substrate,true);
        let delta = matcher.run(&graph,&[vnet]).unwrap();
        let link_matches:Vec<&CandidateMatch> = delta.added.iter()
            .filter(|m| m.kind == MatchKind::LinkToLink)
            .collect();
        // v0@a,v1@b plus the co-located pairing on server a
        assert!(link_matches.iter().any(|m| matches!(m.target,Some(SubstrateTarget::Link(_)))));
        assert!(link_matches.iter().any(|m| matches!(m.target,Some(SubstrateTarget::Node(_)))));
    }
}
