//! Schedule-space exploration and probability accounting.
//!
//! Built on the execution-graph model in `weft-core`: enumerate topological
//! orders exhaustively, fold them into partial-order equivalence classes,
//! and measure how much probability each randomized scheduler assigns to
//! each class.

pub mod account;
pub mod analysis;
pub mod canonical;
pub mod enumerate;
pub mod pct;
pub mod schedulers;

/// Prelude for common exploration types.
pub mod prelude {
    pub use crate::account::{
        account_pos_basic_bound, account_pos_refined_bound, account_random_walk, account_sampled,
        preemption_count, races, ProbabilityTerms,
    };
    pub use crate::analysis::{
        account_pct_exhaustive, account_pct_sampled, exact_mass, ground_truth, run_coverage,
        sampled_mass, ClassMass, ClassReport, CoverageConfig, CoverageError, CoverageReport,
        MassAnalysis, SampleError,
    };
    pub use crate::canonical::{ClassId, ClassNode, ClassTree};
    pub use crate::enumerate::{DfsEnumerator, Schedules};
    pub use crate::pct::{
        pct_bound_term, pct_enumerate, pct_run, pct_sample, PctConfig, PctError, ThreadAssignment,
    };
    pub use crate::schedulers::{pos_basic, pos_dependency, random_walk, rapos, SampleRun};
}
