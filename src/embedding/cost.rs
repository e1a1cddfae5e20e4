use crate::resource_graph::{NetworkId,NodeId,ResourceGraph,SubstrateTarget};

use super::EmbedError;
use super::config::{Objective,rejection_base_cost};
use super::matches::{CandidateMatch,MatchKind,VirtualSide};

type Result<T> = std::result::Result<T,EmbedError>;

// Pure projections of resource graph state into objective coefficients.
// Every value is finite, nonnegative, monotonic in path length and
// strictly below the rejection cost.

fn residual_ratio(graph:&ResourceGraph,snode:NodeId) -> Result<f64> {
    let node = graph.node(snode)?;
    let total = node.total().sum();
    if total == 0 {
        return Ok(0.0);
    }
    Ok(node.residual().sum() as f64 / total as f64)
}

fn node_cost(graph:&ResourceGraph,objective:Objective,vnode:NodeId,snode:NodeId) -> Result<f64> {
    let cost = match objective {
        Objective::TotalPathCost => 1.0,
        Objective::CommunicationCostPreferFilled => 1.0 + residual_ratio(graph,snode)?,
        Objective::CommunicationCostPreferFree => 2.0 - residual_ratio(graph,snode)?,
        Objective::OperatingCost => {
            let demand = graph.node(vnode)?.demand().sum() as f64;
            let total = graph.node(snode)?.total().sum() as f64;
            1.0 + demand/(total + 1.0)
        }
    };
    Ok(cost)
}

// link cost is the hop count under every objective, which keeps all of
// them monotonic in path length
fn link_cost(graph:&ResourceGraph,target:SubstrateTarget) -> Result<f64> {
    let hops = match target {
        // co-located endpoints, free
        SubstrateTarget::Node(_) => 0,
        SubstrateTarget::Link(_) => 1,
        SubstrateTarget::Path(path) => graph.path(path)?.hops(),
    };
    Ok(hops as f64)
}

pub(crate) fn match_cost(graph:&ResourceGraph,objective:Objective,candidate:&CandidateMatch) -> Result<f64> {
    let cost = match (candidate.kind,candidate.virtual_side,candidate.target) {
        (MatchKind::NodeToNode,VirtualSide::Node(vnode),Some(SubstrateTarget::Node(snode))) => {
            node_cost(graph,objective,vnode,snode)?
        }
        (MatchKind::LinkToLink,VirtualSide::Link(_),Some(target))
        | (MatchKind::LinkToPath,VirtualSide::Link(_),Some(target)) => {
            link_cost(graph,target)?
        }
        (MatchKind::NetworkToServer,VirtualSide::Network(vnet),Some(SubstrateTarget::Node(snode))) => {
            let mut sum = 0.0;
            for vnode in graph.network(vnet)?.nodes().to_vec() {
                sum += node_cost(graph,objective,vnode,snode)?;
            }
            sum
        }
        (MatchKind::NetworkReject,VirtualSide::Network(_),None) => 0.0,
        _ => {
            return Err(EmbedError::NotFound{
                reason:format!("malformed candidate match {candidate:?}"),
            });
        }
    };
    debug_assert!(cost >= 0.0 && cost < *rejection_base_cost);
    Ok(cost)
}

pub(crate) fn rejection_cost(graph:&ResourceGraph,vnet:NetworkId,scale_by_demand:bool) -> Result<f64> {
    if !scale_by_demand {
        return Ok(*rejection_base_cost);
    }
    let network = graph.network(vnet)?;
    let mut demand = 0u64;
    for vnode in network.nodes() {
        demand += graph.node(*vnode)?.demand().sum();
    }
    for vlink in network.links() {
        demand += graph.link(*vlink)?.demand();
    }
    Ok(*rejection_base_cost * (1.0 + demand as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_graph::NodeCapacity;

    fn chain_substrate(spans:usize) -> (ResourceGraph,Vec<NodeId>) {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let mut nodes = vec![];
        for _ in 0..=spans {
            nodes.push(graph.add_node(substrate,NodeCapacity::new(4,4,4)).unwrap());
        }
        for pair in nodes.windows(2) {
            graph.add_link(substrate,pair[0],pair[1],10).unwrap();
        }
        graph.precompute_paths(substrate,8).unwrap();
        (graph,nodes)
    }

    #[test]
    fn test_monotonic_in_path_length() {
        let (mut graph,nodes) = chain_substrate(4);
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let vlink = graph.add_link(vnet,v0,v1,1).unwrap();
        let mut previous = -1.0;
        for target in 1..nodes.len() {
            let path = graph.path_between(nodes[0],nodes[target]).unwrap();
            let candidate = CandidateMatch {
                kind:MatchKind::LinkToPath,
                virtual_side:VirtualSide::Link(vlink),
                target:Some(SubstrateTarget::Path(path)),
                flipped:false,
            };
            for objective in [
                Objective::TotalPathCost,
                Objective::CommunicationCostPreferFilled,
                Objective::CommunicationCostPreferFree,
                Objective::OperatingCost,
            ] {
                let cost = match_cost(&graph,objective,&candidate).unwrap();
                assert!(cost < *rejection_base_cost);
            }
            let cost = match_cost(&graph,Objective::TotalPathCost,&candidate).unwrap();
            assert!(cost > previous,"cost must grow with hops");
            previous = cost;
        }
    }

    #[test]
    fn test_prefer_filled_is_cheaper_on_used_server() {
        let (mut graph,nodes) = chain_substrate(1);
        let filler_net = graph.add_network("filler",false);
        let filler = graph.add_node(filler_net,NodeCapacity::new(3,3,3)).unwrap();
        graph.embed_node(filler,nodes[0]).unwrap();
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let on = |snode| CandidateMatch {
            kind:MatchKind::NodeToNode,
            virtual_side:VirtualSide::Node(v0),
            target:Some(SubstrateTarget::Node(snode)),
            flipped:false,
        };
        let filled = match_cost(&graph,Objective::CommunicationCostPreferFilled,&on(nodes[0])).unwrap();
        let empty = match_cost(&graph,Objective::CommunicationCostPreferFilled,&on(nodes[1])).unwrap();
        assert!(filled < empty);
        let filled = match_cost(&graph,Objective::CommunicationCostPreferFree,&on(nodes[0])).unwrap();
        let empty = match_cost(&graph,Objective::CommunicationCostPreferFree,&on(nodes[1])).unwrap();
        assert!(filled > empty);
    }

    #[test]
    fn test_rejection_scaling() {
        let mut graph = ResourceGraph::new();
        let vnet = graph.add_network("request",false);
        graph.add_node(vnet,NodeCapacity::new(2,2,2)).unwrap();
        let flat = rejection_cost(&graph,vnet,false).unwrap();
        let scaled = rejection_cost(&graph,vnet,true).unwrap();
        assert_eq!(flat,*rejection_base_cost);
        assert_eq!(scaled,*rejection_base_cost*7.0);
    }
}
