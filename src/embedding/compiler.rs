use crate::resource_graph::{
    Dimension,LinkId,NetworkId,NodeId,ResourceGraph,SubstrateTarget,VirtualElement,DIMENSIONS,
};

use super::EmbedError;
use super::config::Objective;
use super::cost::{match_cost,rejection_cost};
use super::engine::{ConId,OptimizationEngine,VarId};
use super::matches::{owner_network,CandidateMatch,Delta,MatchKind,VirtualSide};
use super::migration::MappingSnapshot;

type HashMap<K,V> = std::collections::hash_map::HashMap<K,V,nohash::BuildNoHashHasher<usize>>;

type Result<T> = std::result::Result<T,EmbedError>;

// assignment/SOS rows are built per element or per whole network,
// depending on the pipeline stage
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub(crate) enum Granularity {
    Element,
    Network,
}

#[derive(Clone,Debug)]
enum VarEntry {
    Decision{candidate:CandidateMatch,consistency:Vec<ConId>},
    Rejection{network:NetworkId},
    Dead,
}

// one capacity row per substrate resource dimension, created lazily the
// first time a candidate touches the resource
#[derive(Clone,Copy,PartialEq,Eq,Hash,Debug)]
enum CapacityKey {
    NodeDim(NodeId,Dimension),
    Link(LinkId),
}

// Maintains the incremental integer program whose feasible solutions are
// exactly the feasible embeddings of the current batch. Variables and
// rows are only added, extended or deleted one at a time, the model is
// never rebuilt from scratch.
pub(crate) struct ConstraintCompiler {
    vars:Vec<VarEntry>,
    var_lookup:std::collections::HashMap<CandidateMatch,VarId>,
    rejection_vars:HashMap<NetworkId,VarId>,
    next_con:ConId,
    assignment_cons:std::collections::HashMap<VirtualSide,ConId>,
    capacity_cons:std::collections::HashMap<CapacityKey,ConId>,
    sos_cons:std::collections::HashMap<VirtualSide,ConId>,
    // alive candidate vars per element in insertion order, feeding the
    // SOS weights
    element_vars:std::collections::HashMap<VirtualSide,Vec<VarId>>,
    sos_dirty:std::collections::HashSet<VirtualSide>,
}

impl ConstraintCompiler {
    pub(crate) fn new() -> Self {
        Self {
            vars:vec![],
            var_lookup:std::collections::HashMap::new(),
            rejection_vars:HashMap::with_hasher(nohash::BuildNoHashHasher::default()),
            next_con:0,
            assignment_cons:std::collections::HashMap::new(),
            capacity_cons:std::collections::HashMap::new(),
            sos_cons:std::collections::HashMap::new(),
            element_vars:std::collections::HashMap::new(),
            sos_dirty:std::collections::HashSet::new(),
        }
    }

    pub(crate) fn variable_count(&self) -> usize {
        self.var_lookup.len() + self.rejection_vars.len()
    }

    fn alloc_con(&mut self) -> ConId {
        let con = self.next_con;
        self.next_con += 1;
        con
    }

    // translate one matcher delta into model mutations and re-align the
    // model with current residuals and objective coefficients
    pub(crate) fn compile<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        batch:&[NetworkId],
        granularity:Granularity,
        delta:&Delta,
        objective:Objective,
        penalty:Option<(&MappingSnapshot,f64)>,
        scale_rejection:bool,
        engine:&mut E,
    ) -> Result<()> {
        for candidate in delta.removed.iter() {
            self.remove_candidate(candidate,engine)?;
        }
        self.ensure_assignment_rows(graph,batch,granularity,scale_rejection,engine)?;
        for candidate in delta.added.iter() {
            self.add_candidate(graph,candidate,objective,penalty,scale_rejection,engine)?;
        }
        self.rebuild_sos(engine)?;
        self.sync_capacity_rhs(graph,engine)?;
        self.refresh_weights(graph,objective,penalty,engine)?;
        Ok(())
    }

    fn ensure_rejection_var<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        network:NetworkId,
        scale_rejection:bool,
        engine:&mut E,
    ) -> Result<VarId> {
        if let Some(var) = self.rejection_vars.get(&network) {
            return Ok(*var);
        }
        let var = self.vars.len();
        self.vars.push(VarEntry::Rejection{network});
        engine.add_variable(var,rejection_cost(graph,network,scale_rejection)?)?;
        self.rejection_vars.insert(network,var);
        Ok(var)
    }

    // every element of the batch gets its assignment row up front; an
    // element that never receives a candidate then pins the network's
    // rejection variable to one
    fn ensure_assignment_rows<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        batch:&[NetworkId],
        granularity:Granularity,
        scale_rejection:bool,
        engine:&mut E,
    ) -> Result<()> {
        for vnet in batch {
            let rejection = self.ensure_rejection_var(graph,*vnet,scale_rejection,engine)?;
            let sides:Vec<VirtualSide> = match granularity {
                Granularity::Network => vec![VirtualSide::Network(*vnet)],
                Granularity::Element => {
                    let network = graph.network(*vnet)?;
                    network.nodes().iter().map(|n| VirtualSide::Node(*n))
                        .chain(network.links().iter().map(|l| VirtualSide::Link(*l)))
                        .collect()
                }
            };
            for side in sides {
                if self.assignment_cons.contains_key(&side) {
                    continue;
                }
                let con = self.alloc_con();
                engine.add_equality_constraint(con,1.0,&[(1.0,rejection)])?;
                self.assignment_cons.insert(side,con);
            }
        }
        Ok(())
    }

    fn add_candidate<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        candidate:&CandidateMatch,
        objective:Objective,
        penalty:Option<(&MappingSnapshot,f64)>,
        scale_rejection:bool,
        engine:&mut E,
    ) -> Result<()> {
        let network = owner_network(graph,candidate).ok_or_else(|| EmbedError::NotFound{
            reason:format!("candidate {candidate:?} references an unknown virtual element"),
        })?;
        if candidate.kind == MatchKind::NetworkReject {
            self.ensure_rejection_var(graph,network,scale_rejection,engine)?;
            return Ok(());
        }
        if self.var_lookup.contains_key(candidate) {
            return Err(EmbedError::NotFound{
                reason:format!("candidate {candidate:?} was added twice"),
            });
        }
        let mut weight = match_cost(graph,objective,candidate)?;
        if let Some((snapshot,surcharge)) = penalty {
            if snapshot.deviates(graph,candidate) {
                weight += surcharge;
            }
        }
        let var = self.vars.len();
        engine.add_variable(var,weight)?;
        let mut consistency = vec![];
        self.attach_assignment_term(candidate.virtual_side,var,engine)?;
        self.attach_capacity_terms(graph,candidate,var,engine)?;
        self.attach_consistency_rows(graph,candidate,var,&mut consistency,engine)?;
        self.vars.push(VarEntry::Decision{candidate:*candidate,consistency});
        self.var_lookup.insert(*candidate,var);
        self.element_vars.entry(candidate.virtual_side).or_default().push(var);
        self.sos_dirty.insert(candidate.virtual_side);
        Ok(())
    }

    fn attach_assignment_term<E:OptimizationEngine>(
        &mut self,
        side:VirtualSide,
        var:VarId,
        engine:&mut E,
    ) -> Result<()> {
        let con = self.assignment_cons.get(&side).ok_or_else(|| EmbedError::NotFound{
            reason:format!("no assignment row for {side:?}, element outside the batch"),
        })?;
        engine.add_constraint_term(*con,1.0,var)?;
        Ok(())
    }

    fn attach_capacity_terms<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        candidate:&CandidateMatch,
        var:VarId,
        engine:&mut E,
    ) -> Result<()> {
        match (candidate.kind,candidate.virtual_side,candidate.target) {
            (MatchKind::NodeToNode,VirtualSide::Node(vnode),Some(SubstrateTarget::Node(snode))) => {
                let demand = graph.node(vnode)?.demand();
                for dimension in DIMENSIONS {
                    if demand.get(dimension) > 0 {
                        self.add_node_capacity_term(graph,snode,dimension,demand.get(dimension),var,engine)?;
                    }
                }
            }
            (MatchKind::NetworkToServer,VirtualSide::Network(vnet),Some(SubstrateTarget::Node(snode))) => {
                let mut demand = crate::resource_graph::NodeCapacity::default();
                for vnode in graph.network(vnet)?.nodes() {
                    demand.add(&graph.node(*vnode)?.demand());
                }
                for dimension in DIMENSIONS {
                    if demand.get(dimension) > 0 {
                        self.add_node_capacity_term(graph,snode,dimension,demand.get(dimension),var,engine)?;
                    }
                }
            }
            (_,VirtualSide::Link(vlink),Some(target)) => {
                let demand = graph.link(vlink)?.demand();
                if demand == 0 {
                    return Ok(());
                }
                match target {
                    // co-located, no substrate bandwidth
                    SubstrateTarget::Node(_) => {}
                    SubstrateTarget::Link(slink) => {
                        self.add_link_capacity_term(graph,slink,demand,var,engine)?;
                    }
                    SubstrateTarget::Path(spath) => {
                        for slink in graph.path(spath)?.links().to_vec() {
                            self.add_link_capacity_term(graph,slink,demand,var,engine)?;
                        }
                    }
                }
            }
            _ => {
                return Err(EmbedError::NotFound{
                    reason:format!("malformed candidate match {candidate:?}"),
                });
            }
        }
        Ok(())
    }

    fn add_node_capacity_term<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        snode:NodeId,
        dimension:Dimension,
        demand:u64,
        var:VarId,
        engine:&mut E,
    ) -> Result<()> {
        let key = CapacityKey::NodeDim(snode,dimension);
        let con = match self.capacity_cons.get(&key) {
            Some(con) => *con,
            None => {
                let con = self.alloc_con();
                let residual = graph.node(snode)?.residual().get(dimension);
                engine.add_less_equal_constraint(con,residual as f64,&[])?;
                self.capacity_cons.insert(key,con);
                con
            }
        };
        engine.add_constraint_term(con,demand as f64,var)?;
        Ok(())
    }

    fn add_link_capacity_term<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        slink:LinkId,
        demand:u64,
        var:VarId,
        engine:&mut E,
    ) -> Result<()> {
        let key = CapacityKey::Link(slink);
        let con = match self.capacity_cons.get(&key) {
            Some(con) => *con,
            None => {
                let con = self.alloc_con();
                let residual = graph.link(slink)?.residual_bandwidth();
                engine.add_less_equal_constraint(con,residual as f64,&[])?;
                self.capacity_cons.insert(key,con);
                con
            }
        };
        engine.add_constraint_term(con,demand as f64,var)?;
        Ok(())
    }

    // a link candidate may only be selected together with the node
    // candidates that place its endpoints on the target's endpoints
    fn attach_consistency_rows<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        candidate:&CandidateMatch,
        var:VarId,
        consistency:&mut Vec<ConId>,
        engine:&mut E,
    ) -> Result<()> {
        let VirtualSide::Link(vlink) = candidate.virtual_side else {
            return Ok(());
        };
        let Some(target) = candidate.target else {
            return Ok(());
        };
        let (u,v) = graph.link(vlink)?.endpoints();
        let (a,b) = match target {
            SubstrateTarget::Node(snode) => (snode,snode),
            SubstrateTarget::Link(slink) => graph.link(slink)?.endpoints(),
            SubstrateTarget::Path(spath) => graph.path(spath)?.endpoints(),
        };
        let (host_u,host_v) = if candidate.flipped {(b,a)} else {(a,b)};
        for (vnode,snode) in [(u,host_u),(v,host_v)] {
            let node_candidate = CandidateMatch {
                kind:MatchKind::NodeToNode,
                virtual_side:VirtualSide::Node(vnode),
                target:Some(SubstrateTarget::Node(snode)),
                flipped:false,
            };
            let node_var = *self.var_lookup.get(&node_candidate).ok_or_else(|| EmbedError::NotFound{
                reason:format!("link candidate {candidate:?} arrived before node candidate {vnode}->{snode}"),
            })?;
            let con = self.alloc_con();
            engine.add_less_equal_constraint(con,0.0,&[(1.0,var),(-1.0,node_var)])?;
            consistency.push(con);
        }
        Ok(())
    }

    // deletes exactly the candidate's variable and the rows it owns
    fn remove_candidate<E:OptimizationEngine>(
        &mut self,
        candidate:&CandidateMatch,
        engine:&mut E,
    ) -> Result<()> {
        if candidate.kind == MatchKind::NetworkReject {
            // rejection variables live until their batch is purged
            return Ok(());
        }
        let var = self.var_lookup.remove(candidate).ok_or_else(|| EmbedError::NotFound{
            reason:format!("removal of unknown candidate {candidate:?}"),
        })?;
        engine.remove_variable(var)?;
        if let VarEntry::Decision{consistency,..} = std::mem::replace(&mut self.vars[var],VarEntry::Dead) {
            for con in consistency {
                engine.remove_constraint(con)?;
            }
        }
        if let Some(members) = self.element_vars.get_mut(&candidate.virtual_side) {
            members.retain(|member| *member != var);
        }
        self.sos_dirty.insert(candidate.virtual_side);
        Ok(())
    }

    // drop and re-add the SOS row of every element whose candidate set
    // changed during this compile
    fn rebuild_sos<E:OptimizationEngine>(&mut self,engine:&mut E) -> Result<()> {
        let dirty:Vec<VirtualSide> = self.sos_dirty.drain().collect();
        for side in dirty {
            if let Some(con) = self.sos_cons.remove(&side) {
                engine.remove_constraint(con)?;
            }
            let members = self.element_vars.get(&side).map(|v| v.as_slice()).unwrap_or(&[]);
            if members.len() < 2 {
                continue;
            }
            // weights follow insertion order, only there to guide branching
            let weighted:Vec<(f64,VarId)> = members.iter().enumerate()
                .map(|(index,var)| ((index + 1) as f64,*var))
                .collect();
            let con = self.alloc_con();
            engine.add_sos1_constraint(con,&weighted)?;
            self.sos_cons.insert(side,con);
        }
        Ok(())
    }

    // capacity rows always bound against the residuals as of this compile;
    // rows whose substrate resource was removed disappear with it
    fn sync_capacity_rhs<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        engine:&mut E,
    ) -> Result<()> {
        let keys:Vec<CapacityKey> = self.capacity_cons.keys().copied().collect();
        for key in keys {
            let residual = match key {
                CapacityKey::NodeDim(node,dimension) => {
                    graph.node(node).ok().map(|n| n.residual().get(dimension))
                }
                CapacityKey::Link(link) => {
                    graph.link(link).ok().map(|l| l.residual_bandwidth())
                }
            };
            let con = self.capacity_cons[&key];
            match residual {
                Some(value) => engine.set_constraint_rhs(con,value as f64)?,
                None => {
                    engine.remove_constraint(con)?;
                    self.capacity_cons.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn refresh_weights<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        objective:Objective,
        penalty:Option<(&MappingSnapshot,f64)>,
        engine:&mut E,
    ) -> Result<()> {
        for (candidate,var) in self.var_lookup.iter() {
            let mut weight = match_cost(graph,objective,candidate)?;
            if let Some((snapshot,surcharge)) = penalty {
                if snapshot.deviates(graph,candidate) {
                    weight += surcharge;
                }
            }
            engine.set_variable_weight(*var,weight)?;
        }
        Ok(())
    }

    // interpret the engine's 0/1 assignment back into candidate matches
    // and the set of rejected networks
    pub(crate) fn selected<E:OptimizationEngine>(
        &self,
        engine:&E,
    ) -> Result<(Vec<CandidateMatch>,Vec<NetworkId>)> {
        let mut chosen = vec![];
        let mut rejected = vec![];
        for (var,entry) in self.vars.iter().enumerate() {
            match entry {
                VarEntry::Decision{candidate,..} => {
                    if engine.solution(var)? {
                        chosen.push(*candidate);
                    }
                }
                VarEntry::Rejection{network} => {
                    if engine.solution(var)? {
                        rejected.push(*network);
                    }
                }
                VarEntry::Dead => {}
            }
        }
        Ok((chosen,rejected))
    }

    // a finished batch leaves the model entirely, capacity rows persist
    // for the next batch
    pub(crate) fn purge_networks<E:OptimizationEngine>(
        &mut self,
        graph:&ResourceGraph,
        nets:&[NetworkId],
        engine:&mut E,
    ) -> Result<()> {
        let side_purged = |side:&VirtualSide| -> bool {
            match side {
                VirtualSide::Network(network) => nets.contains(network),
                VirtualSide::Node(node) => graph.node(*node).ok()
                    .map(|n| nets.contains(&n.network()))
                    .unwrap_or(true),
                VirtualSide::Link(link) => graph.link(*link).ok()
                    .map(|l| nets.contains(&l.network()))
                    .unwrap_or(true),
            }
        };
        let doomed:Vec<(CandidateMatch,VarId)> = self.var_lookup.iter()
            .filter(|(candidate,_)| side_purged(&candidate.virtual_side))
            .map(|(candidate,var)| (*candidate,*var))
            .collect();
        for (candidate,var) in doomed {
            engine.remove_variable(var)?;
            if let VarEntry::Decision{consistency,..} = std::mem::replace(&mut self.vars[var],VarEntry::Dead) {
                for con in consistency {
                    engine.remove_constraint(con)?;
                }
            }
            self.var_lookup.remove(&candidate);
        }
        for network in nets {
            if let Some(var) = self.rejection_vars.remove(network) {
                engine.remove_variable(var)?;
                self.vars[var] = VarEntry::Dead;
            }
        }
        let doomed_rows:Vec<VirtualSide> = self.assignment_cons.keys()
            .filter(|side| side_purged(side))
            .copied()
            .collect();
        for side in doomed_rows {
            if let Some(con) = self.assignment_cons.remove(&side) {
                engine.remove_constraint(con)?;
            }
            if let Some(con) = self.sos_cons.remove(&side) {
                engine.remove_constraint(con)?;
            }
            self.element_vars.remove(&side);
            self.sos_dirty.remove(&side);
        }
        Ok(())
    }
}

// the compiler is addressed through VirtualElement in the public mapping
// api, keep the conversion in one place
impl From<VirtualElement> for VirtualSide {
    fn from(value:VirtualElement) -> Self {
        match value {
            VirtualElement::Node(node) => Self::Node(node),
            VirtualElement::Link(link) => Self::Link(link),
        }
    }
}
