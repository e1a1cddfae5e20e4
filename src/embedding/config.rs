use std::time::Duration;

use lazy_static::lazy_static;

//free parameters, that can be tweaked
lazy_static! {
    pub(crate) static ref default_solve_timeout:Duration = Duration::from_secs(30);
    // every cost function must stay strictly below this, so any feasible
    // embedding beats rejecting the request
    pub(crate) static ref rejection_base_cost:f64 = 1.0e6;
    pub(crate) static ref default_migration_penalty:f64 = 2.0;
}

// objective selector for the pluggable cost functions
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum Objective {
    // pure hop count
    TotalPathCost,
    // communication cost, cheaper on servers that already host guests
    CommunicationCostPreferFilled,
    // communication cost, cheaper on lightly used servers
    CommunicationCostPreferFree,
    // demand-proportional operating cost
    OperatingCost,
}

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum MigrationPolicy {
    // prior mappings are pinned, excluded from re-optimization
    Never,
    // already-embedded elements may move at no extra cost
    AlwaysFree,
    // moves carry a penalty, so they only happen when the net gain exceeds it
    AlwaysPenalty,
    // only elements whose host was ungracefully removed may move
    MappingRemoved,
}

#[derive(Clone,Debug)]
pub struct EmbedConfig {
    pub objective:Objective,
    pub migration:MigrationPolicy,
    // link demands are matched onto precomputed substrate paths; requires
    // precompute_paths to have run
    pub bandwidth_aware:bool,
    // try matching whole small requests onto single servers before the
    // per-element stage
    pub server_stage:bool,
    // scale the rejection penalty by a request's total demanded resources
    pub scale_rejection_cost:bool,
    pub solve_timeout:Duration,
    pub migration_penalty:f64,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            objective:Objective::TotalPathCost,
            migration:MigrationPolicy::Never,
            bandwidth_aware:true,
            server_stage:false,
            scale_rejection_cost:false,
            solve_timeout:*default_solve_timeout,
            migration_penalty:*default_migration_penalty,
        }
    }
}
