// incremental constraint-based embedding pipeline:
// matcher delta -> ilp mutation -> solve -> apply or reject

pub mod branch_bound;
pub mod compiler;
pub mod config;
pub mod cost;
pub mod engine;
pub mod matches;
pub mod migration;
pub mod orchestrator;

use thiserror::Error;

use crate::resource_graph::GraphError;

#[derive(Error,Debug)]
pub enum EmbedError {
    #[error("configuration error: {reason}")]
    Config{reason:String},
    #[error("model references a missing element: {reason}")]
    NotFound{reason:String},
    #[error("model reported infeasible")]
    Infeasible,
    #[error("solve timed out without an incumbent")]
    Timeout,
    #[error("resource graph inconsistency: {reason}")]
    Inconsistent{reason:String},
    #[error("optimization engine fault: {0}")]
    Engine(#[from] EngineError),
}

impl From<GraphError> for EmbedError {
    fn from(value:GraphError) -> Self {
        match value {
            GraphError::NodeNotFound{..}
            | GraphError::LinkNotFound{..}
            | GraphError::PathNotFound{..}
            | GraphError::NetworkNotFound{..} => Self::NotFound{reason:value.to_string()},
            other => Self::Inconsistent{reason:other.to_string()},
        }
    }
}

pub use branch_bound::BranchBoundEngine;
pub use config::{EmbedConfig,MigrationPolicy,Objective};
pub use engine::{ConId,EngineError,OptimizationEngine,SolveStatistics,SolveStatus,VarId};
pub use matches::{CandidateMatch,CandidateMatcher,Delta,ElementMatcher,MatchKind,ServerMatcher,VirtualSide};
pub use orchestrator::{EmbedOutcome,Orchestrator};
