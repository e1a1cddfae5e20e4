use std::time::Duration;

use thiserror::Error;

// dense handles allocated by the constraint compiler; the engine grows its
// own storage to fit whatever ids the caller hands it
pub type VarId = usize;
pub type ConId = usize;

#[derive(Error,Debug)]
pub enum EngineError {
    #[error("variable {var} does not exist in the model")]
    VariableNotFound{var:VarId},
    #[error("constraint {con} does not exist in the model")]
    ConstraintNotFound{con:ConId},
    #[error("variable {var} was added twice")]
    DuplicateVariable{var:VarId},
    #[error("constraint {con} was added twice")]
    DuplicateConstraint{con:ConId},
    #[error("no solution available, solve() has not produced an incumbent")]
    NoSolution,
    #[error("engine fault: {reason}")]
    Fault{reason:String},
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    InfOrUnbd,
    Unbounded,
    TimeOut,
}

#[derive(Clone,Copy,Debug)]
pub struct SolveStatistics {
    pub status:SolveStatus,
    pub elapsed:Duration,
}

// Incremental 0-1 integer program surface. Variables and constraints are
// only ever added or extended term by term; removing a variable deletes
// exactly that column and its appearances, never forcing a model rebuild.
pub trait OptimizationEngine {
    fn add_variable(&mut self,var:VarId,objective_weight:f64) -> Result<(),EngineError>;
    fn remove_variable(&mut self,var:VarId) -> Result<(),EngineError>;
    fn set_variable_weight(&mut self,var:VarId,weight:f64) -> Result<(),EngineError>;
    fn add_equality_constraint(&mut self,con:ConId,rhs:f64,terms:&[(f64,VarId)]) -> Result<(),EngineError>;
    fn add_less_equal_constraint(&mut self,con:ConId,rhs:f64,terms:&[(f64,VarId)]) -> Result<(),EngineError>;
    fn add_constraint_term(&mut self,con:ConId,weight:f64,var:VarId) -> Result<(),EngineError>;
    fn set_constraint_rhs(&mut self,con:ConId,rhs:f64) -> Result<(),EngineError>;
    fn remove_constraint(&mut self,con:ConId) -> Result<(),EngineError>;
    // special ordered set of type 1: at most one member nonzero; weights
    // only guide the engine's branching order
    fn add_sos1_constraint(&mut self,con:ConId,members:&[(f64,VarId)]) -> Result<(),EngineError>;
    // must return within the timeout with the best incumbent, never hang
    fn solve(&mut self,timeout:Duration) -> Result<SolveStatistics,EngineError>;
    fn has_solution(&self) -> bool;
    fn solution(&self,var:VarId) -> Result<bool,EngineError>;
    fn dispose(&mut self);
}
