use std::time::{Duration,Instant};

use super::engine::*;

type Result<T> = std::result::Result<T,EngineError>;

const EPS:f64 = 1e-6;

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
enum ConKind {
    Equal,
    LessEqual,
    Sos1,
}

#[derive(Clone,Debug)]
struct ConSlot {
    kind:ConKind,
    rhs:f64,
    terms:Vec<(f64,VarId)>,
}

// Reference engine: depth-first branch and bound over binary variables
// with incumbent tracking and a cooperative deadline. Exists so the crate
// is exercisable end to end, a native solver can replace it behind the
// OptimizationEngine trait.
pub struct BranchBoundEngine {
    vars:Vec<Option<f64>>,
    cons:Vec<Option<ConSlot>>,
    solution:Vec<bool>,
    has_solution:bool,
}

impl Default for BranchBoundEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchBoundEngine {
    pub fn new() -> Self {
        Self {
            vars:vec![],
            cons:vec![],
            solution:vec![],
            has_solution:false,
        }
    }
    fn var_slot(&mut self,var:VarId) -> &mut Option<f64> {
        if var >= self.vars.len() {
            self.vars.resize(var + 1,None);
        }
        &mut self.vars[var]
    }
    fn con_slot(&mut self,con:ConId) -> &mut Option<ConSlot> {
        if con >= self.cons.len() {
            self.cons.resize(con + 1,None);
        }
        &mut self.cons[con]
    }
    fn insert_constraint(&mut self,con:ConId,kind:ConKind,rhs:f64,terms:&[(f64,VarId)]) -> Result<()> {
        for (_,var) in terms {
            if self.vars.get(*var).map(|slot| slot.is_none()).unwrap_or(true) {
                return Err(EngineError::VariableNotFound{var:*var});
            }
        }
        let slot = self.con_slot(con);
        if slot.is_some() {
            return Err(EngineError::DuplicateConstraint{con});
        }
        *slot = Some(ConSlot {kind,rhs,terms:terms.to_vec()});
        Ok(())
    }
}

impl OptimizationEngine for BranchBoundEngine {
    fn add_variable(&mut self,var:VarId,objective_weight:f64) -> Result<()> {
        let slot = self.var_slot(var);
        if slot.is_some() {
            return Err(EngineError::DuplicateVariable{var});
        }
        *slot = Some(objective_weight);
        Ok(())
    }
    fn remove_variable(&mut self,var:VarId) -> Result<()> {
        let slot = self.vars.get_mut(var).ok_or(EngineError::VariableNotFound{var})?;
        if slot.take().is_none() {
            return Err(EngineError::VariableNotFound{var});
        }
        // drop the column wherever it appears
        for con in self.cons.iter_mut().flatten() {
            con.terms.retain(|(_,member)| *member != var);
        }
        Ok(())
    }
    fn set_variable_weight(&mut self,var:VarId,weight:f64) -> Result<()> {
        match self.vars.get_mut(var) {
            Some(Some(slot)) => {
                *slot = weight;
                Ok(())
            }
            _ => Err(EngineError::VariableNotFound{var}),
        }
    }
    fn add_equality_constraint(&mut self,con:ConId,rhs:f64,terms:&[(f64,VarId)]) -> Result<()> {
        self.insert_constraint(con,ConKind::Equal,rhs,terms)
    }
    fn add_less_equal_constraint(&mut self,con:ConId,rhs:f64,terms:&[(f64,VarId)]) -> Result<()> {
        self.insert_constraint(con,ConKind::LessEqual,rhs,terms)
    }
    fn add_constraint_term(&mut self,con:ConId,weight:f64,var:VarId) -> Result<()> {
        if self.vars.get(var).map(|slot| slot.is_none()).unwrap_or(true) {
            return Err(EngineError::VariableNotFound{var});
        }
        match self.cons.get_mut(con) {
            Some(Some(slot)) => {
                slot.terms.push((weight,var));
                Ok(())
            }
            _ => Err(EngineError::ConstraintNotFound{con}),
        }
    }
    fn set_constraint_rhs(&mut self,con:ConId,rhs:f64) -> Result<()> {
        match self.cons.get_mut(con) {
            Some(Some(slot)) => {
                slot.rhs = rhs;
                Ok(())
            }
            _ => Err(EngineError::ConstraintNotFound{con}),
        }
    }
    fn remove_constraint(&mut self,con:ConId) -> Result<()> {
        let slot = self.cons.get_mut(con).ok_or(EngineError::ConstraintNotFound{con})?;
        if slot.take().is_none() {
            return Err(EngineError::ConstraintNotFound{con});
        }
        Ok(())
    }
    fn add_sos1_constraint(&mut self,con:ConId,members:&[(f64,VarId)]) -> Result<()> {
        self.insert_constraint(con,ConKind::Sos1,1.0,members)
    }
    fn solve(&mut self,timeout:Duration) -> Result<SolveStatistics> {
        let started = Instant::now();
        let mut search = Search::build(self,started + timeout);
        search.run();
        let elapsed = started.elapsed();
        let status = match (&search.best,search.timed_out) {
            (_,true) => SolveStatus::TimeOut,
            (Some(_),false) => SolveStatus::Optimal,
            (None,false) => SolveStatus::Infeasible,
        };
        if let Some(best) = search.best {
            self.solution = best;
            self.has_solution = true;
        }else{
            self.solution.clear();
            self.has_solution = false;
        }
        Ok(SolveStatistics {status,elapsed})
    }
    fn has_solution(&self) -> bool {
        self.has_solution
    }
    fn solution(&self,var:VarId) -> Result<bool> {
        if !self.has_solution {
            return Err(EngineError::NoSolution);
        }
        if self.vars.get(var).map(|slot| slot.is_none()).unwrap_or(true) {
            return Err(EngineError::VariableNotFound{var});
        }
        Ok(self.solution.get(var).copied().unwrap_or(false))
    }
    fn dispose(&mut self) {
        self.vars.clear();
        self.cons.clear();
        self.solution.clear();
        self.has_solution = false;
    }
}

struct ConState {
    kind:ConKind,
    rhs:f64,
    // sum over assigned-to-one coefficients
    fixed:f64,
    // achievable extra range over unassigned members
    pool_pos:f64,
    pool_neg:f64,
    ones:usize,
}

impl ConState {
    fn feasible_so_far(&self) -> bool {
        match self.kind {
            ConKind::LessEqual => self.fixed + self.pool_neg <= self.rhs + EPS,
            ConKind::Equal => {
                self.fixed + self.pool_neg <= self.rhs + EPS
                    && self.fixed + self.pool_pos >= self.rhs - EPS
            }
            ConKind::Sos1 => self.ones <= 1,
        }
    }
    fn leaf_satisfied(&self) -> bool {
        debug_assert!(self.pool_pos.abs() < EPS && self.pool_neg.abs() < EPS);
        match self.kind {
            ConKind::LessEqual => self.fixed <= self.rhs + EPS,
            ConKind::Equal => (self.fixed - self.rhs).abs() <= EPS,
            ConKind::Sos1 => self.ones <= 1,
        }
    }
}

struct Search {
    // variable ids ordered cheapest first
    order:Vec<VarId>,
    weights:Vec<f64>,
    // per order position: (constraint index, coefficient) memberships
    memberships:Vec<Vec<(usize,f64)>>,
    states:Vec<ConState>,
    var_count:usize,
    current_cost:f64,
    best_cost:f64,
    best:Option<Vec<bool>>,
    assignment:Vec<bool>,
    deadline:Instant,
    timed_out:bool,
}

impl Search {
    fn build(engine:&BranchBoundEngine,deadline:Instant) -> Self {
        let mut order:Vec<VarId> = engine.vars.iter().enumerate()
            .filter_map(|(var,slot)| slot.map(|_| var))
            .collect();
        order.sort_by(|a,b| {
            let (wa,wb) = (engine.vars[*a].unwrap_or(0.0),engine.vars[*b].unwrap_or(0.0));
            wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut position:std::collections::HashMap<VarId,usize,nohash::BuildNoHashHasher<usize>> =
            std::collections::HashMap::with_capacity_and_hasher(order.len(),nohash::BuildNoHashHasher::default());
        for (index,var) in order.iter().enumerate() {
            position.insert(*var,index);
        }
        let weights:Vec<f64> = order.iter().map(|var| engine.vars[*var].unwrap_or(0.0)).collect();
        let mut memberships:Vec<Vec<(usize,f64)>> = vec![vec![];order.len()];
        let mut states = vec![];
        for slot in engine.cons.iter().flatten() {
            let index = states.len();
            let mut pool_pos = 0.0;
            let mut pool_neg = 0.0;
            for (weight,var) in slot.terms.iter() {
                let Some(pos) = position.get(var) else {continue};
                memberships[*pos].push((index,*weight));
                if *weight > 0.0 {
                    pool_pos += *weight;
                }else{
                    pool_neg += *weight;
                }
            }
            states.push(ConState {
                kind:slot.kind,
                rhs:slot.rhs,
                fixed:0.0,
                pool_pos,
                pool_neg,
                ones:0,
            });
        }
        let var_count = engine.vars.len();
        Self {
            assignment:vec![false;order.len()],
            order,
            weights,
            memberships,
            states,
            var_count,
            current_cost:0.0,
            best_cost:f64::INFINITY,
            best:None,
            deadline,
            timed_out:false,
        }
    }

    fn run(&mut self) {
        self.descend(0);
    }

    fn descend(&mut self,depth:usize) {
        if self.timed_out {
            return;
        }
        if Instant::now() >= self.deadline {
            self.timed_out = true;
            return;
        }
        // bound on the objective: weights are nonnegative costs, so the
        // partial cost only grows downwards
        if self.current_cost >= self.best_cost - EPS {
            return;
        }
        if depth == self.order.len() {
            if self.states.iter().all(|state| state.leaf_satisfied()) {
                self.best_cost = self.current_cost;
                let mut best = vec![false;self.var_count];
                for (index,var) in self.order.iter().enumerate() {
                    best[*var] = self.assignment[index];
                }
                self.best = Some(best);
            }
            return;
        }
        // include first, exclude second
        for value in [true,false] {
            if !self.assign(depth,value) {
                self.undo(depth,value);
                continue;
            }
            self.descend(depth + 1);
            self.undo(depth,value);
            if self.timed_out {
                return;
            }
        }
    }

    // applies the assignment and reports whether every touched constraint
    // is still satisfiable
    fn assign(&mut self,depth:usize,value:bool) -> bool {
        self.assignment[depth] = value;
        if value {
            self.current_cost += self.weights[depth];
        }
        let mut ok = true;
        for (index,weight) in self.memberships[depth].iter() {
            let state = &mut self.states[*index];
            if *weight > 0.0 {
                state.pool_pos -= *weight;
            }else{
                state.pool_neg -= *weight;
            }
            if value {
                state.fixed += *weight;
                if state.kind == ConKind::Sos1 {
                    state.ones += 1;
                }
            }
            if !state.feasible_so_far() {
                ok = false;
            }
        }
        ok && self.current_cost < self.best_cost - EPS
    }

    fn undo(&mut self,depth:usize,value:bool) {
        for (index,weight) in self.memberships[depth].iter() {
            let state = &mut self.states[*index];
            if *weight > 0.0 {
                state.pool_pos += *weight;
            }else{
                state.pool_neg += *weight;
            }
            if value {
                state.fixed -= *weight;
                if state.kind == ConKind::Sos1 {
                    state.ones -= 1;
                }
            }
        }
        if value {
            self.current_cost -= self.weights[depth];
        }
        self.assignment[depth] = false;
    }
}
