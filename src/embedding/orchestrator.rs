use crate::resource_graph::{NetworkId,ResourceGraph,SubstrateTarget};

use super::EmbedError;
use super::compiler::{ConstraintCompiler,Granularity};
use super::config::{EmbedConfig,MigrationPolicy};
use super::engine::{OptimizationEngine,SolveStatistics,SolveStatus};
use super::matches::{owner_network,CandidateMatch,CandidateMatcher,ElementMatcher,MatchKind,ServerMatcher,VirtualSide};
use super::migration::{migratable_guests,restore,snapshot_and_release,MappingSnapshot};

type Result<T> = std::result::Result<T,EmbedError>;

#[derive(Clone,Debug,Default)]
pub struct EmbedOutcome {
    pub accepted:Vec<NetworkId>,
    pub rejected:Vec<NetworkId>,
    // previously embedded networks that were rolled back to their prior
    // mapping after the solver rejected their re-embedding
    pub restored:Vec<NetworkId>,
    // previously embedded networks that ended up on different hosts
    pub migrated:Vec<NetworkId>,
    pub stats:Vec<SolveStatistics>,
}

// The top-level control loop over one substrate network. Owns its engine,
// compiler and matchers; one instance per concurrent embedding run, with
// exclusive write access to the resource graph while embed() runs.
//
// each invocation walks INIT -> MATCH -> COMPILE -> SOLVE -> APPLY per
// stage, feeding the rejected remainder of one stage into the next
pub struct Orchestrator<E:OptimizationEngine> {
    config:EmbedConfig,
    substrate:NetworkId,
    engine:E,
    compiler:ConstraintCompiler,
    server_matcher:ServerMatcher,
    element_matcher:ElementMatcher,
}

impl<E:OptimizationEngine> Orchestrator<E> {
    pub fn new(config:EmbedConfig,engine:E,graph:&ResourceGraph,substrate:NetworkId) -> Result<Self> {
        let network = graph.network(substrate)?;
        if !network.is_substrate() {
            return Err(EmbedError::Config{
                reason:format!("network {substrate} ({}) is not a substrate network",network.name()),
            });
        }
        if config.bandwidth_aware && graph.path_count() == 0 {
            return Err(EmbedError::Config{
                reason:"bandwidth-aware embedding requires precomputed substrate paths".to_string(),
            });
        }
        Ok(Self {
            server_matcher:ServerMatcher::new(substrate),
            element_matcher:ElementMatcher::new(substrate,config.bandwidth_aware),
            config,
            substrate,
            engine,
            compiler:ConstraintCompiler::new(),
        })
    }

    // embed a batch of virtual network requests, honoring the active
    // migration policy; dirty (repair-pending) guests are re-embedded
    // ahead of the requested networks
    pub fn embed(&mut self,graph:&mut ResourceGraph,requested:&[NetworkId]) -> Result<EmbedOutcome> {
        self.validate_batch(graph,requested)?;
        self.run(graph,requested)
    }

    // re-embed the guests broken by an ungraceful substrate removal
    // without admitting anything new
    pub fn repair(&mut self,graph:&mut ResourceGraph) -> Result<EmbedOutcome> {
        self.run(graph,&[])
    }

    pub fn dispose(&mut self) {
        self.engine.dispose();
        self.server_matcher.dispose();
        self.element_matcher.dispose();
    }

    fn validate_batch(&self,graph:&ResourceGraph,requested:&[NetworkId]) -> Result<()> {
        if requested.is_empty() {
            return Err(EmbedError::Config{reason:"empty request batch".to_string()});
        }
        for (index,vnet) in requested.iter().enumerate() {
            if requested[..index].contains(vnet) {
                return Err(EmbedError::Config{
                    reason:format!("network {vnet} requested twice in one batch"),
                });
            }
            let network = graph.network(*vnet)?;
            if network.is_substrate() {
                return Err(EmbedError::Config{
                    reason:format!("network {vnet} ({}) is a substrate network",network.name()),
                });
            }
            if network.host().is_some() && !network.is_dirty() {
                return Err(EmbedError::Config{
                    reason:format!("network {vnet} ({}) is already embedded",network.name()),
                });
            }
            for vnode in network.nodes() {
                if graph.node(*vnode)?.demand().sum() == 0 {
                    return Err(EmbedError::Config{
                        reason:format!("virtual node {vnode} demands no resources"),
                    });
                }
            }
        }
        Ok(())
    }

    fn run(&mut self,graph:&mut ResourceGraph,requested:&[NetworkId]) -> Result<EmbedOutcome> {
        // repair first: dirty guests re-enter the optimization before any
        // unrelated new request is accepted
        let mut reentering = graph.dirty_guests(self.substrate);
        for guest in migratable_guests(graph,self.substrate,self.config.migration) {
            if !reentering.contains(&guest) && !requested.contains(&guest) {
                reentering.push(guest);
            }
        }
        let snapshot = snapshot_and_release(graph,&reentering)?;
        let mut batch = reentering;
        for vnet in requested {
            if !batch.contains(vnet) {
                batch.push(*vnet);
            }
        }
        if batch.is_empty() {
            return Ok(EmbedOutcome::default());
        }
        log::info!("embedding batch of {} network(s) onto substrate {}",batch.len(),self.substrate);

        let mut outcome = EmbedOutcome::default();
        let mut remainder = batch;
        if self.config.server_stage {
            let (accepted,rejected,stats) =
                self.run_stage(graph,&remainder,Granularity::Network,&snapshot)?;
            outcome.accepted.extend(accepted);
            outcome.stats.push(stats);
            remainder = rejected;
        }
        if !remainder.is_empty() {
            let (accepted,rejected,stats) =
                self.run_stage(graph,&remainder,Granularity::Element,&snapshot)?;
            outcome.accepted.extend(accepted);
            outcome.stats.push(stats);
            remainder = rejected;
        }
        for vnet in remainder {
            if snapshot.is_restorable(vnet) && restore(graph,&snapshot,vnet)? {
                outcome.restored.push(vnet);
            }else{
                outcome.rejected.push(vnet);
            }
        }
        for vnet in snapshot.released() {
            if !outcome.accepted.contains(vnet) {
                continue;
            }
            let moved = graph.network(*vnet)?.nodes().iter().any(|vnode| {
                let prior = snapshot.prior_node_host(*vnode);
                prior.is_some() && prior != graph.host_of_node(*vnode)
            });
            if moved {
                outcome.migrated.push(*vnet);
            }
        }
        // candidates are ephemeral, the next batch starts from a clean slate
        self.server_matcher.dispose();
        self.element_matcher.dispose();
        debug_assert!(graph.validate().is_ok());
        log::info!(
            "batch done: {} accepted, {} rejected, {} restored, {} migrated",
            outcome.accepted.len(),outcome.rejected.len(),
            outcome.restored.len(),outcome.migrated.len(),
        );
        Ok(outcome)
    }

    // one MATCH -> COMPILE -> SOLVE -> APPLY pass at the given granularity
    fn run_stage(
        &mut self,
        graph:&mut ResourceGraph,
        batch:&[NetworkId],
        granularity:Granularity,
        snapshot:&MappingSnapshot,
    ) -> Result<(Vec<NetworkId>,Vec<NetworkId>,SolveStatistics)> {
        let delta = match granularity {
            Granularity::Network => self.server_matcher.run(graph,batch)?,
            Granularity::Element => self.element_matcher.run(graph,batch)?,
        };
        let penalty = match self.config.migration {
            MigrationPolicy::AlwaysPenalty => Some((snapshot,self.config.migration_penalty)),
            _ => None,
        };
        self.compiler.compile(
            graph,batch,granularity,&delta,self.config.objective,
            penalty,self.config.scale_rejection_cost,&mut self.engine,
        )?;
        let stats = match self.engine.solve(self.config.solve_timeout) {
            Ok(stats) => stats,
            Err(fault) => {
                // release the engine's resources before propagating
                self.engine.dispose();
                return Err(fault.into());
            }
        };
        log::debug!("solve finished with {:?} after {:?}",stats.status,stats.elapsed);
        let applicable = match stats.status {
            SolveStatus::Optimal => true,
            SolveStatus::TimeOut if self.engine.has_solution() => {
                log::warn!("solver timed out, applying the best incumbent");
                true
            }
            SolveStatus::TimeOut => {
                log::warn!("solver timed out without an incumbent, batch rejected");
                false
            }
            SolveStatus::Infeasible | SolveStatus::InfOrUnbd | SolveStatus::Unbounded => {
                log::warn!("solver reported {:?}, batch rejected",stats.status);
                false
            }
        };
        if !applicable {
            // total rejection, the batch's model is discarded and never retried
            self.compiler.purge_networks(graph,batch,&mut self.engine)?;
            return Ok((vec![],batch.to_vec(),stats));
        }
        let (accepted,rejected) = self.apply(graph,batch)?;
        Ok((accepted,rejected,stats))
    }

    fn apply(&mut self,graph:&mut ResourceGraph,batch:&[NetworkId]) -> Result<(Vec<NetworkId>,Vec<NetworkId>)> {
        let (chosen,rejected) = self.compiler.selected(&self.engine)?;
        let mut by_network:std::collections::HashMap<NetworkId,Vec<CandidateMatch>> =
            std::collections::HashMap::new();
        for candidate in chosen {
            let network = owner_network(graph,&candidate).ok_or_else(|| EmbedError::NotFound{
                reason:format!("selected candidate {candidate:?} references an unknown element"),
            })?;
            by_network.entry(network).or_default().push(candidate);
        }
        let mut accepted = vec![];
        for vnet in batch {
            if rejected.contains(vnet) {
                continue;
            }
            let matches = by_network.remove(vnet).unwrap_or_default();
            self.apply_network(graph,*vnet,&matches)?;
            accepted.push(*vnet);
        }
        self.compiler.purge_networks(graph,batch,&mut self.engine)?;
        Ok((accepted,rejected))
    }

    // turn the selected candidates of one accepted network into mappings;
    // nodes first so link targets can be checked against their endpoints,
    // every residual is re-verified by the graph before it is decremented
    fn apply_network(&mut self,graph:&mut ResourceGraph,vnet:NetworkId,matches:&[CandidateMatch]) -> Result<()> {
        for candidate in matches {
            if candidate.kind != MatchKind::NodeToNode {
                continue;
            }
            let (VirtualSide::Node(vnode),Some(SubstrateTarget::Node(snode))) =
                (candidate.virtual_side,candidate.target) else {
                    return Err(EmbedError::NotFound{
                        reason:format!("malformed candidate match {candidate:?}"),
                    });
                };
            graph.embed_node(vnode,snode)?;
        }
        for candidate in matches {
            match (candidate.kind,candidate.virtual_side,candidate.target) {
                (MatchKind::NodeToNode,..) => {}
                (MatchKind::NetworkToServer,VirtualSide::Network(network),Some(SubstrateTarget::Node(snode))) => {
                    debug_assert_eq!(network,vnet);
                    let nodes = graph.network(network)?.nodes().to_vec();
                    let links = graph.network(network)?.links().to_vec();
                    for vnode in nodes {
                        graph.embed_node(vnode,snode)?;
                    }
                    for vlink in links {
                        graph.embed_link(vlink,SubstrateTarget::Node(snode))?;
                    }
                }
                (MatchKind::LinkToLink,VirtualSide::Link(vlink),Some(target))
                | (MatchKind::LinkToPath,VirtualSide::Link(vlink),Some(target)) => {
                    graph.embed_link(vlink,target)?;
                }
                _ => {
                    return Err(EmbedError::NotFound{
                        reason:format!("malformed candidate match {candidate:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::branch_bound::BranchBoundEngine;
    use crate::embedding::config::Objective;
    use crate::resource_graph::{NodeCapacity,NodeId};

    fn two_servers_one_switch(server_cap:u64,link_bw:u64) -> (ResourceGraph,NetworkId,[NodeId;2]) {
        let mut graph = ResourceGraph::new();
        let substrate = graph.add_network("substrate",true);
        let cap = NodeCapacity::new(server_cap,server_cap,server_cap);
        let server_a = graph.add_node(substrate,cap).unwrap();
        let server_b = graph.add_node(substrate,cap).unwrap();
        let switch = graph.add_node(substrate,NodeCapacity::new(0,0,0)).unwrap();
        graph.add_link(substrate,server_a,switch,link_bw).unwrap();
        graph.add_link(substrate,switch,server_b,link_bw).unwrap();
        graph.precompute_paths(substrate,4).unwrap();
        (graph,substrate,[server_a,server_b])
    }

    fn orchestrator(graph:&ResourceGraph,substrate:NetworkId,config:EmbedConfig)
        -> Orchestrator<BranchBoundEngine>
    {
        Orchestrator::new(config,BranchBoundEngine::new(),graph,substrate).unwrap()
    }

    #[test]
    fn test_accepts_two_server_request() {
        let (mut graph,substrate,[server_a,server_b]) = two_servers_one_switch(1,1);
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let vl = graph.add_link(vnet,v0,v1,1).unwrap();

        let mut orchestrator = orchestrator(&graph,substrate,EmbedConfig::default());
        let outcome = orchestrator.embed(&mut graph,&[vnet]).unwrap();
        assert_eq!(outcome.accepted,vec![vnet]);
        assert!(outcome.rejected.is_empty());

        let host0 = graph.host_of_node(v0).unwrap();
        let host1 = graph.host_of_node(v1).unwrap();
        assert_ne!(host0,host1);
        assert!([server_a,server_b].contains(&host0));
        // the virtual link rides the two-hop path through the switch
        let Some(SubstrateTarget::Path(path)) = graph.host_of_link(vl) else {
            panic!("virtual link not mapped to a path");
        };
        assert_eq!(graph.path(path).unwrap().hops(),2);
        assert_eq!(graph.node(server_a).unwrap().residual(),NodeCapacity::new(0,0,0));
        assert_eq!(graph.node(server_b).unwrap().residual(),NodeCapacity::new(0,0,0));
        graph.validate().unwrap();
    }

    #[test]
    fn test_rejects_oversized_request() {
        let (mut graph,substrate,[server_a,server_b]) = two_servers_one_switch(1,1);
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(2,1,1)).unwrap();

        let mut orchestrator = orchestrator(&graph,substrate,EmbedConfig::default());
        let outcome = orchestrator.embed(&mut graph,&[vnet]).unwrap();
        assert_eq!(outcome.rejected,vec![vnet]);
        assert!(outcome.accepted.is_empty());
        assert!(graph.host_of_node(v0).is_none());
        assert_eq!(graph.node(server_a).unwrap().residual(),NodeCapacity::new(1,1,1));
        assert_eq!(graph.node(server_b).unwrap().residual(),NodeCapacity::new(1,1,1));
        graph.validate().unwrap();
    }

    #[test]
    fn test_monotonic_rejection() {
        // rejected under capacity 1, must stay rejected under capacity 0
        for cap in [1,0] {
            let (mut graph,substrate,_) = two_servers_one_switch(cap,1);
            let vnet = graph.add_network("request",false);
            graph.add_node(vnet,NodeCapacity::new(2,1,1)).unwrap();
            let mut orchestrator = orchestrator(&graph,substrate,EmbedConfig::default());
            let outcome = orchestrator.embed(&mut graph,&[vnet]).unwrap();
            assert_eq!(outcome.rejected,vec![vnet],"capacity {cap}");
        }
    }

    fn single_node_request(graph:&mut ResourceGraph,name:&str,demand:u64) -> NetworkId {
        let vnet = graph.add_network(name,false);
        graph.add_node(vnet,NodeCapacity::new(demand,demand,demand)).unwrap();
        vnet
    }

    #[test]
    fn test_migration_admits_request_never_rejects() {
        for policy in [MigrationPolicy::Never,MigrationPolicy::AlwaysFree] {
            let (mut graph,substrate,_) = two_servers_one_switch(6,4);
            let mut config = EmbedConfig::default();
            config.migration = policy;
            config.objective = Objective::CommunicationCostPreferFilled;
            let mut orchestrator = orchestrator(&graph,substrate,config);
            let mut guests = vec![];
            for (name,demand) in [("first",2),("second",2),("third",3)] {
                let vnet = single_node_request(&mut graph,name,demand);
                let outcome = orchestrator.embed(&mut graph,&[vnet]).unwrap();
                assert!(outcome.rejected.is_empty());
                guests.push(vnet);
            }
            // demands 2+2+3 leave at most (3,3,3) free on one server, so a
            // (4,4,4) request only fits after a repack
            let big = single_node_request(&mut graph,"fourth",4);
            let outcome = orchestrator.embed(&mut graph,&[big]).unwrap();
            match policy {
                MigrationPolicy::Never => {
                    assert_eq!(outcome.rejected,vec![big]);
                    assert!(outcome.migrated.is_empty());
                }
                _ => {
                    assert!(outcome.accepted.contains(&big));
                    assert!(outcome.rejected.is_empty());
                    // at least one prior guest had to move
                    assert!(!outcome.migrated.is_empty());
                    for guest in guests.iter() {
                        assert!(graph.network(*guest).unwrap().host().is_some());
                    }
                }
            }
            graph.validate().unwrap();
        }
    }

    #[test]
    fn test_penalty_keeps_placements_when_no_gain() {
        let (mut graph,substrate,_) = two_servers_one_switch(4,4);
        let mut config = EmbedConfig::default();
        config.migration = MigrationPolicy::AlwaysPenalty;
        let mut orchestrator = orchestrator(&graph,substrate,config);
        let first = single_node_request(&mut graph,"first",2);
        orchestrator.embed(&mut graph,&[first]).unwrap();
        let prior = graph.host_of_node(graph.network(first).unwrap().nodes()[0]).unwrap();
        let second = single_node_request(&mut graph,"second",2);
        let outcome = orchestrator.embed(&mut graph,&[second]).unwrap();
        // both fit without moving, the surcharge pins the first in place
        assert!(outcome.migrated.is_empty());
        assert_eq!(graph.host_of_node(graph.network(first).unwrap().nodes()[0]),Some(prior));
        graph.validate().unwrap();
    }

    #[test]
    fn test_repair_after_node_removal() {
        let (mut graph,substrate,[server_a,server_b]) = two_servers_one_switch(2,2);
        let mut config = EmbedConfig::default();
        config.migration = MigrationPolicy::MappingRemoved;
        let mut orchestrator = orchestrator(&graph,substrate,config);
        let vnet = single_node_request(&mut graph,"guest",2);
        orchestrator.embed(&mut graph,&[vnet]).unwrap();
        let vnode = graph.network(vnet).unwrap().nodes()[0];
        let lost_host = graph.host_of_node(vnode).unwrap();
        let survivor = if lost_host == server_a {server_b} else {server_a};

        graph.remove_node(lost_host).unwrap();
        assert!(graph.validate().is_err());
        let outcome = orchestrator.repair(&mut graph).unwrap();
        assert_eq!(outcome.accepted,vec![vnet]);
        assert_eq!(graph.host_of_node(vnode),Some(survivor));
        graph.validate().unwrap();
    }

    #[test]
    fn test_server_stage_takes_small_requests() {
        let (mut graph,substrate,_) = two_servers_one_switch(4,1);
        let mut config = EmbedConfig::default();
        config.server_stage = true;
        let mut orchestrator = orchestrator(&graph,substrate,config);
        let vnet = graph.add_network("request",false);
        let v0 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let v1 = graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let vl = graph.add_link(vnet,v0,v1,3).unwrap();
        let outcome = orchestrator.embed(&mut graph,&[vnet]).unwrap();
        assert_eq!(outcome.accepted,vec![vnet]);
        // the whole request landed on one server, the link is co-located
        // even though its demand exceeds any substrate link
        assert_eq!(graph.host_of_node(v0),graph.host_of_node(v1));
        assert!(matches!(graph.host_of_link(vl),Some(SubstrateTarget::Node(_))));
        // two stages ran at most, only the first was needed
        assert_eq!(outcome.stats.len(),1);
        graph.validate().unwrap();
    }

    #[test]
    fn test_config_errors_at_init() {
        let (mut graph,substrate,_) = two_servers_one_switch(1,1);
        let vnet = graph.add_network("request",false);
        graph.add_node(vnet,NodeCapacity::new(1,1,1)).unwrap();
        let mut orchestrator = orchestrator(&graph,substrate,EmbedConfig::default());
        assert!(matches!(orchestrator.embed(&mut graph,&[]),Err(EmbedError::Config{..})));
        assert!(matches!(orchestrator.embed(&mut graph,&[vnet,vnet]),Err(EmbedError::Config{..})));
        assert!(matches!(orchestrator.embed(&mut graph,&[substrate]),Err(EmbedError::Config{..})));

        // zero-demand virtual node
        let empty = graph.add_network("empty",false);
        graph.add_node(empty,NodeCapacity::new(0,0,0)).unwrap();
        assert!(matches!(orchestrator.embed(&mut graph,&[empty]),Err(EmbedError::Config{..})));

        // bandwidth-aware mode refuses a pathless graph at construction
        let mut bare = ResourceGraph::new();
        let bare_substrate = bare.add_network("bare",true);
        let denied = Orchestrator::new(
            EmbedConfig::default(),BranchBoundEngine::new(),&bare,bare_substrate,
        );
        assert!(matches!(denied,Err(EmbedError::Config{..})));
    }

    #[test]
    fn test_random_batches_keep_invariants() {
        use rand::Rng;
        let mut rng = rand::rng();
        let (mut graph,substrate,_) = two_servers_one_switch(8,8);
        let pristine:Vec<NodeCapacity> = graph.nodes.iter().map(|n| n.residual()).collect();
        let pristine_bw:Vec<u64> = graph.links.iter().map(|l| l.residual_bandwidth()).collect();
        let mut orchestrator = orchestrator(&graph,substrate,EmbedConfig::default());
        let mut accepted = vec![];
        for round in 0..12 {
            let vnet = graph.add_network(&format!("random-{round}"),false);
            let v0 = graph.add_node(vnet,NodeCapacity::new(
                rng.random_range(1..4),rng.random_range(1..4),rng.random_range(1..4),
            )).unwrap();
            let v1 = graph.add_node(vnet,NodeCapacity::new(
                rng.random_range(1..4),rng.random_range(1..4),rng.random_range(1..4),
            )).unwrap();
            graph.add_link(vnet,v0,v1,rng.random_range(0..4)).unwrap();
            let outcome = orchestrator.embed(&mut graph,&[vnet]).unwrap();
            graph.validate().unwrap();
            if outcome.accepted.contains(&vnet) {
                accepted.push(vnet);
            }else{
                assert!(graph.host_of_node(v0).is_none());
            }
        }
        // unembedding everything restores the pristine residuals bit for bit
        for vnet in accepted {
            graph.unembed_network(vnet).unwrap();
        }
        // only the substrate prefix, the virtual arenas grew every round
        let restored:Vec<NodeCapacity> = graph.nodes.iter().take(pristine.len())
            .map(|n| n.residual()).collect();
        let restored_bw:Vec<u64> = graph.links.iter().take(pristine_bw.len())
            .map(|l| l.residual_bandwidth()).collect();
        assert_eq!(pristine,restored);
        assert_eq!(pristine_bw,restored_bw);
        graph.validate().unwrap();
    }
}
