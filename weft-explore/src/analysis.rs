//! End-to-end analyses over one execution graph.
//!
//! Three drivers compose the enumerator, the class tree, the schedulers and
//! the accountants:
//!
//! * [`ground_truth`]: count equivalence classes by pruned enumeration.
//! * [`exact_mass`]: enumerate every topological order and attribute each
//!   scheduler's probability mass to the class it lands in.
//! * [`run_coverage`]: repeatedly sample a scheduler until every class has
//!   been hit a target number of times, reporting how long that took.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use weft_core::{derive_rng, EventId, ExecutionGraph};

use crate::account::{
    account_pos_basic_bound, account_pos_refined_bound, account_random_walk, account_sampled,
    preemption_count, races, ProbabilityTerms,
};
use crate::canonical::{ClassId, ClassTree};
use crate::enumerate::DfsEnumerator;
use crate::pct::{pct_bound_term, pct_enumerate, pct_sample, PctConfig, ThreadAssignment};
use crate::schedulers::SampleRun;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("sampling needs at least one sample")]
    ZeroSamples,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoverageError {
    #[error("minimum hit target must be at least one")]
    ZeroMinHitTarget,
}

/// Counts equivalence classes by sleep-set-pruned enumeration.
///
/// Every pruned schedule must open a class of its own; that invariant is
/// checked in debug builds.
///
/// # Panics
/// Panics on an empty graph, which has no schedules to classify.
#[must_use]
pub fn ground_truth(graph: &ExecutionGraph) -> u64 {
    assert!(!graph.is_empty(), "nothing to enumerate in an empty graph");

    let mut tree = ClassTree::new();
    let mut enumerator = DfsEnumerator::new(graph);
    let mut order = Vec::new();
    while enumerator.explore(&mut order) {
        let before = tree.size(tree.root());
        tree.add_path(graph, &order);
        debug_assert!(
            tree.size(tree.root()) > before,
            "pruned schedule revisited a class"
        );
        debug_assert_eq!(tree.min_hit(tree.root()), 1);
    }

    let classes = tree.size(tree.root());
    debug!(classes, "ground truth enumerated");
    classes
}

/// Everything the exhaustive analysis learns about one class.
#[derive(Debug)]
pub struct ClassMass {
    pub random_walk: ProbabilityTerms,
    pub pos_basic_bound: ProbabilityTerms,
    pub pos_refined_bound: ProbabilityTerms,
    pub pct: ProbabilityTerms,
    /// Fewest preemptions any schedule in the class needs.
    pub preemptions: usize,
    /// Conflict pairs observed racing in any schedule of the class.
    pub races: BTreeSet<(EventId, EventId)>,
    /// The class's canonical representative.
    pub trace: Vec<EventId>,
}

impl Default for ClassMass {
    fn default() -> Self {
        Self {
            random_walk: ProbabilityTerms::default(),
            pos_basic_bound: ProbabilityTerms::default(),
            pos_refined_bound: ProbabilityTerms::default(),
            pct: ProbabilityTerms::default(),
            preemptions: usize::MAX,
            races: BTreeSet::new(),
            trace: Vec::new(),
        }
    }
}

/// One row of [`MassAnalysis::report`].
#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub class: ClassId,
    pub trace: Vec<EventId>,
    pub random_walk_mass: f64,
    pub pos_basic_mass: f64,
    pub pos_refined_mass: f64,
    pub pct_mass: f64,
    pub preemptions: usize,
    pub race_count: usize,
}

/// Result of [`exact_mass`], extensible by the PCT accountants.
#[derive(Debug)]
pub struct MassAnalysis {
    tree: ClassTree,
    per_class: HashMap<ClassId, ClassMass>,
    total_orders: u64,
}

impl MassAnalysis {
    #[must_use]
    pub fn class_count(&self) -> u64 {
        self.tree.size(self.tree.root())
    }

    /// Distinct topological orders enumerated.
    #[must_use]
    pub fn total_orders(&self) -> u64 {
        self.total_orders
    }

    #[must_use]
    pub fn tree(&self) -> &ClassTree {
        &self.tree
    }

    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&ClassMass> {
        self.per_class.get(&id)
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassMass)> {
        self.per_class.iter().map(|(&id, mass)| (id, mass))
    }

    /// Sums the exact random-walk mass over all classes. A correct
    /// accounting totals one.
    #[must_use]
    pub fn total_random_walk_mass(&self) -> f64 {
        self.per_class.values().map(|c| c.random_walk.mass()).sum()
    }

    /// Largest per-class minimum preemption count, i.e. the `d` a priority
    /// scheduler needs to be able to reach every class.
    #[must_use]
    pub fn max_preemptions(&self) -> usize {
        self.per_class
            .values()
            .map(|c| c.preemptions)
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn max_races(&self) -> usize {
        self.per_class
            .values()
            .map(|c| c.races.len())
            .max()
            .unwrap_or(0)
    }

    /// Per-class rows sorted by class id, for serialization.
    #[must_use]
    pub fn report(&self) -> Vec<ClassReport> {
        let mut rows: Vec<ClassReport> = self
            .per_class
            .iter()
            .map(|(&class, mass)| ClassReport {
                class,
                trace: mass.trace.clone(),
                random_walk_mass: mass.random_walk.mass(),
                pos_basic_mass: mass.pos_basic_bound.mass(),
                pos_refined_mass: mass.pos_refined_bound.mass(),
                pct_mass: mass.pct.mass(),
                preemptions: mass.preemptions,
                race_count: mass.races.len(),
            })
            .collect();
        rows.sort_by_key(|row| row.class);
        rows
    }
}

/// Enumerates every topological order and attributes scheduler mass to
/// classes.
///
/// Random-walk mass is accounted per order, so it is exact. The POS bounds
/// are accounted once per class, on its canonical representative (the first
/// schedule to reach the class, recognized by the leaf hit count being one).
///
/// # Panics
/// Panics on an empty graph.
#[must_use]
pub fn exact_mass(graph: &ExecutionGraph) -> MassAnalysis {
    assert!(!graph.is_empty(), "nothing to enumerate in an empty graph");

    let mut tree = ClassTree::new();
    let mut per_class: HashMap<ClassId, ClassMass> = HashMap::new();
    let mut total_orders = 0u64;

    let mut enumerator = DfsEnumerator::unpruned(graph);
    let mut order = Vec::new();
    while enumerator.explore(&mut order) {
        let class = tree.add_path(graph, &order);
        let first_hit = tree.min_hit(class) == 1;

        let entry = per_class.entry(class).or_default();
        account_random_walk(&mut entry.random_walk, graph, &order);
        entry.preemptions = entry.preemptions.min(preemption_count(graph, &order));
        entry.races.extend(races(graph, &order));

        if first_hit {
            entry.trace = order.clone();
            account_pos_basic_bound(&mut entry.pos_basic_bound, graph, &order);
            account_pos_refined_bound(&mut entry.pos_refined_bound, graph, &order);
        }

        total_orders += 1;
        if total_orders % 1_000_000 == 0 {
            debug!(total_orders, "orders enumerated");
        }
    }

    info!(
        total_orders,
        classes = tree.size(tree.root()),
        "exhaustive accounting finished"
    );

    MassAnalysis {
        tree,
        per_class,
        total_orders,
    }
}

/// Runs every PCT instance for `config` and adds the exhaustive bound term
/// to each class a run lands in.
pub fn account_pct_exhaustive(
    analysis: &mut MassAnalysis,
    graph: &ExecutionGraph,
    threads: &ThreadAssignment,
    config: &PctConfig,
) {
    let term = pct_bound_term(threads.threads(), config);
    let MassAnalysis {
        tree, per_class, ..
    } = analysis;

    pct_enumerate(graph, threads, config, |order| {
        let class = tree.add_path(graph, order);
        per_class.entry(class).or_default().pct.push(term.clone());
    });
}

/// Samples `samples` PCT runs and adds a Monte Carlo term per hit.
pub fn account_pct_sampled(
    analysis: &mut MassAnalysis,
    graph: &ExecutionGraph,
    threads: &ThreadAssignment,
    config: &PctConfig,
    samples: u64,
    master_seed: u64,
) -> Result<(), SampleError> {
    if samples == 0 {
        return Err(SampleError::ZeroSamples);
    }

    let MassAnalysis {
        tree, per_class, ..
    } = analysis;

    pct_sample(graph, threads, config, samples, master_seed, |order| {
        let class = tree.add_path(graph, order);
        account_sampled(&mut per_class.entry(class).or_default().pct, samples);
    });
    Ok(())
}

/// Draws `samples` schedules from `sampler` and returns the Monte Carlo
/// mass estimate per class. Each sample's RNG is derived from `master_seed`
/// and the sample index.
pub fn sampled_mass<F>(
    graph: &ExecutionGraph,
    tree: &mut ClassTree,
    samples: u64,
    master_seed: u64,
    mut sampler: F,
) -> Result<HashMap<ClassId, ProbabilityTerms>, SampleError>
where
    F: FnMut(&ExecutionGraph, &mut StdRng) -> SampleRun,
{
    if samples == 0 {
        return Err(SampleError::ZeroSamples);
    }

    let mut estimates: HashMap<ClassId, ProbabilityTerms> = HashMap::new();
    for index in 0..samples {
        let mut rng = derive_rng(master_seed, index);
        let run = sampler(graph, &mut rng);
        let class = tree.add_path(graph, run.order());
        account_sampled(estimates.entry(class).or_default(), samples);
    }
    Ok(estimates)
}

/// Stopping rule and reporting knobs for [`run_coverage`].
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    /// Keep sampling until every class has been hit this many times.
    pub min_hit_target: u64,
    /// Hard cap on passes; `None` runs until the target is met.
    pub max_passes: Option<u64>,
    /// Log progress every this many passes.
    pub progress_every: Option<u64>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            min_hit_target: 10,
            max_passes: None,
            progress_every: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub classes_found: u64,
    pub ground_truth_classes: u64,
    /// Hits of the least-covered discovered class when sampling stopped.
    pub min_hit: u64,
    pub passes: u64,
}

impl CoverageReport {
    /// Whether sampling stopped because the target was met rather than the
    /// pass cap.
    #[must_use]
    pub fn reached(&self, min_hit_target: u64) -> bool {
        self.classes_found == self.ground_truth_classes && self.min_hit >= min_hit_target
    }
}

/// Samples `sampler` until every class is found and hit at least
/// `min_hit_target` times, or the pass cap is reached. Each pass draws a
/// fresh RNG derived from `master_seed` and the pass index.
///
/// # Panics
/// Panics on an empty graph.
pub fn run_coverage<F>(
    graph: &ExecutionGraph,
    config: &CoverageConfig,
    master_seed: u64,
    mut sampler: F,
) -> Result<CoverageReport, CoverageError>
where
    F: FnMut(&ExecutionGraph, &mut StdRng) -> SampleRun,
{
    if config.min_hit_target == 0 {
        return Err(CoverageError::ZeroMinHitTarget);
    }

    let truth = ground_truth(graph);
    let mut tree = ClassTree::new();
    let mut passes = 0u64;

    while config.max_passes.map_or(true, |cap| passes < cap)
        && (tree.size(tree.root()) < truth || tree.min_hit(tree.root()) < config.min_hit_target)
    {
        if let Some(every) = config.progress_every {
            if (passes + 1) % every == 0 {
                info!(
                    classes = tree.size(tree.root()),
                    truth,
                    min_hit = tree.min_hit(tree.root()),
                    pass = passes + 1,
                    "coverage progress"
                );
            }
        }

        let mut rng = derive_rng(master_seed, passes);
        let run = sampler(graph, &mut rng);
        tree.add_path(graph, run.order());
        passes += 1;
    }

    Ok(CoverageReport {
        classes_found: tree.size(tree.root()),
        ground_truth_classes: truth,
        min_hit: tree.min_hit(tree.root()),
        passes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulers::random_walk;

    fn conflict_pair() -> ExecutionGraph {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        g.add_conflict(a, b);
        g
    }

    #[test]
    fn ground_truth_counts_classes_not_orders() {
        assert_eq!(ground_truth(&conflict_pair()), 2);

        // Two order-free events collapse to a single class.
        let mut g = ExecutionGraph::new();
        g.new_event();
        g.new_event();
        assert_eq!(ground_truth(&g), 1);
    }

    #[test]
    fn exact_mass_conserves_random_walk_probability() {
        let analysis = exact_mass(&conflict_pair());
        assert_eq!(analysis.class_count(), 2);
        assert_eq!(analysis.total_orders(), 2);
        assert!((analysis.total_random_walk_mass() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coverage_rejects_a_zero_target() {
        let g = conflict_pair();
        let config = CoverageConfig {
            min_hit_target: 0,
            ..CoverageConfig::default()
        };
        assert!(matches!(
            run_coverage(&g, &config, 1, random_walk),
            Err(CoverageError::ZeroMinHitTarget)
        ));
    }

    #[test]
    fn pass_cap_stops_sampling_early() {
        let g = conflict_pair();
        let config = CoverageConfig {
            max_passes: Some(1),
            ..CoverageConfig::default()
        };
        let report = run_coverage(&g, &config, 1, random_walk).unwrap();
        assert_eq!(report.passes, 1);
        assert!(!report.reached(config.min_hit_target));
    }
}
