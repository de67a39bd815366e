//! PCT (probabilistic concurrency testing) scheduling.
//!
//! PCT schedules by thread priority rather than per-event randomness: each
//! thread gets a distinct initial priority, the highest-priority ready
//! thread runs, and at `d` chosen steps the running thread's priority drops
//! below every initial one. The whole scheduler is determined by the initial
//! priority permutation and the delay-point steps, so its distribution can
//! be either enumerated exhaustively or sampled.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use weft_core::{derive_rng, EventId, ExecutionGraph, FrontierState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PctError {
    #[error("thread assignment covers {got} events, graph has {expected}")]
    WrongLength { expected: usize, got: usize },
    #[error("priority change points need a non-zero priority range")]
    ZeroPriorityRange,
}

/// Maps every event to the thread that issues it.
#[derive(Debug, Clone)]
pub struct ThreadAssignment {
    thread_of: Vec<usize>,
    threads: usize,
}

impl ThreadAssignment {
    /// `thread_of[e]` is the thread of event `e`. Thread ids need not be
    /// contiguous; the thread count is one past the largest id used.
    pub fn new(graph: &ExecutionGraph, thread_of: Vec<usize>) -> Result<Self, PctError> {
        if thread_of.len() != graph.len() {
            return Err(PctError::WrongLength {
                expected: graph.len(),
                got: thread_of.len(),
            });
        }
        let threads = thread_of.iter().max().map_or(0, |&t| t + 1);
        Ok(Self { thread_of, threads })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    #[must_use]
    pub fn thread_of(&self, event: EventId) -> usize {
        self.thread_of[event.index()]
    }
}

/// Tunables shared by exhaustive and sampled PCT.
#[derive(Debug, Clone)]
pub struct PctConfig {
    /// Number of scheduling steps a delay point can land on (the `n` of
    /// PCT's `1/(k * n^(d-1))` guarantee).
    pub priority_range: usize,
    /// Number of delay points (`d`).
    pub delay_count: usize,
    /// Charge each thread a priority-only warmup step before its first
    /// event, so a delay point can demote a thread that has not run yet.
    pub dummy_start: bool,
}

impl PctConfig {
    pub fn new(priority_range: usize, delay_count: usize) -> Result<Self, PctError> {
        if priority_range == 0 {
            return Err(PctError::ZeroPriorityRange);
        }
        Ok(Self {
            priority_range,
            delay_count,
            dummy_start: true,
        })
    }

    /// The usual instantiation: the priority range is the event count.
    #[must_use]
    pub fn for_graph(graph: &ExecutionGraph, delay_count: usize) -> Self {
        Self {
            priority_range: graph.len().max(1),
            delay_count,
            dummy_start: true,
        }
    }

    /// Largest step index a delay point can take. Dummy starts stretch the
    /// run by one step per thread.
    fn delay_limit(&self, threads: usize) -> usize {
        let extra = if self.dummy_start { threads } else { 0 };
        self.priority_range - 1 + extra
    }
}

/// Runs one fully determined PCT schedule.
///
/// `init_pri` holds each thread's starting priority; higher runs first. At
/// every step whose index appears in `delay_points`, the chosen thread's
/// priority drops to `-(1 + rank_of_that_delay_point)`, below all initial
/// priorities and below earlier-ranked drops. Ties pick the smallest event
/// id.
///
/// # Panics
/// Panics if `init_pri` does not cover every thread.
pub fn pct_run(
    graph: &ExecutionGraph,
    threads: &ThreadAssignment,
    init_pri: &[i64],
    delay_points: &[usize],
    dummy_start: bool,
) -> Vec<EventId> {
    assert_eq!(init_pri.len(), threads.threads(), "one priority per thread");

    let mut pri = init_pri.to_vec();
    let mut started = vec![!dummy_start; threads.threads()];

    let mut frontier = FrontierState::new(graph);
    let mut order = Vec::with_capacity(graph.len());

    let mut step = 0usize;
    while !frontier.ready().is_empty() {
        let mut choice: Option<(EventId, usize)> = None;
        for &v in frontier.ready() {
            let t = threads.thread_of(v);
            if choice.map_or(true, |(_, best)| pri[t] > pri[best]) {
                choice = Some((v, t));
            }
        }
        let (v, t) = choice.expect("frontier is non-empty");

        if let Some(rank) = delay_points.iter().position(|&d| d == step) {
            pri[t] = -(1 + rank as i64);
        }

        if started[t] {
            frontier.commit(graph, v, |_| {});
            order.push(v);
        } else {
            started[t] = true;
        }
        step += 1;
    }
    order
}

/// Visits every schedule PCT can produce for this configuration: all `k!`
/// initial priority permutations crossed with all delay-point placements.
pub fn pct_enumerate(
    graph: &ExecutionGraph,
    threads: &ThreadAssignment,
    config: &PctConfig,
    mut visit: impl FnMut(&[EventId]),
) {
    let k = threads.threads();
    let limit = config.delay_limit(k);
    let mut init_pri: Vec<i64> = (0..k as i64).collect();

    loop {
        let mut dp = vec![0usize; config.delay_count];
        loop {
            let order = pct_run(graph, threads, &init_pri, &dp, config.dummy_start);
            visit(&order);

            // Odometer over delay points, least significant first.
            let mut advanced = false;
            for i in 0..dp.len() {
                if dp[i] < limit {
                    for slot in &mut dp[..i] {
                        *slot = 0;
                    }
                    dp[i] += 1;
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                break;
            }
        }

        if !next_permutation(&mut init_pri) {
            break;
        }
    }
}

/// Draws `samples` independent PCT schedules. Each sample's RNG is derived
/// from `master_seed` and the sample index, so runs are reproducible and
/// order-independent.
pub fn pct_sample(
    graph: &ExecutionGraph,
    threads: &ThreadAssignment,
    config: &PctConfig,
    samples: u64,
    master_seed: u64,
    mut visit: impl FnMut(&[EventId]),
) {
    let k = threads.threads();
    let limit = config.delay_limit(k);

    for index in 0..samples {
        let mut rng = derive_rng(master_seed, index);

        let mut init_pri: Vec<i64> = (0..k as i64).collect();
        init_pri.shuffle(&mut rng);

        let dp: Vec<usize> = (0..config.delay_count)
            .map(|_| rng.gen_range(0..=limit))
            .collect();

        let order = pct_run(graph, threads, &init_pri, &dp, config.dummy_start);
        visit(&order);
    }
}

/// Denominators of the exhaustive enumeration: each run's probability is
/// `1 / (k! * n^d)`, spelled as the factors `1*2*..*k * n*..*n`.
#[must_use]
pub fn pct_bound_term(threads: usize, config: &PctConfig) -> Vec<u64> {
    let mut term: Vec<u64> = (1..=threads as u64).collect();
    term.extend(std::iter::repeat(config.priority_range as u64).take(config.delay_count));
    term
}

/// Rearranges `items` into the next lexicographic permutation, returning
/// false (and leaving them sorted) once the last permutation has passed.
fn next_permutation<T: Ord>(items: &mut [T]) -> bool {
    if items.len() < 2 {
        return false;
    }
    let mut i = items.len() - 1;
    while i > 0 && items[i - 1] >= items[i] {
        i -= 1;
    }
    if i == 0 {
        items.reverse();
        return false;
    }
    let mut j = items.len() - 1;
    while items[j] <= items[i - 1] {
        j -= 1;
    }
    items.swap(i - 1, j);
    items[i..].reverse();
    true
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use weft_core::assert_valid_schedule;

    /// Two chains a0 -> a1 (thread 0) and b0 -> b1 (thread 1).
    fn two_chains() -> (ExecutionGraph, ThreadAssignment, Vec<EventId>) {
        let mut g = ExecutionGraph::new();
        let events: Vec<_> = (0..4).map(|_| g.new_event()).collect();
        g.add_program_order(events[0], events[1]);
        g.add_program_order(events[2], events[3]);
        let threads = ThreadAssignment::new(&g, vec![0, 0, 1, 1]).unwrap();
        (g, threads, events)
    }

    #[test]
    fn assignment_must_cover_every_event() {
        let (g, _, _) = two_chains();
        assert_eq!(
            ThreadAssignment::new(&g, vec![0, 1]).unwrap_err(),
            PctError::WrongLength {
                expected: 4,
                got: 2
            }
        );
    }

    #[test]
    fn zero_priority_range_is_rejected() {
        assert_eq!(PctConfig::new(0, 1).unwrap_err(), PctError::ZeroPriorityRange);
    }

    #[test]
    fn highest_priority_thread_runs_to_completion() {
        let (g, threads, e) = two_chains();
        let order = pct_run(&g, &threads, &[1, 0], &[], false);
        assert_eq!(order, vec![e[0], e[1], e[2], e[3]]);
    }

    #[test]
    fn delay_point_demotes_the_running_thread() {
        let (g, threads, e) = two_chains();
        // Thread 0 leads but is delayed at its first step.
        let order = pct_run(&g, &threads, &[1, 0], &[0], false);
        assert_eq!(order, vec![e[0], e[2], e[3], e[1]]);
    }

    #[test]
    fn dummy_start_lets_a_delay_preempt_an_unstarted_thread() {
        let (g, threads, e) = two_chains();
        // Step 0 is thread 0's warmup; delaying it there hands the whole
        // run to thread 1 before thread 0 commits anything.
        let order = pct_run(&g, &threads, &[1, 0], &[0], true);
        assert_eq!(order, vec![e[2], e[3], e[0], e[1]]);
    }

    #[test]
    fn enumeration_without_delays_is_one_run_per_permutation() {
        let (g, threads, e) = two_chains();
        let config = PctConfig {
            priority_range: g.len(),
            delay_count: 0,
            dummy_start: true,
        };
        let mut orders = Vec::new();
        pct_enumerate(&g, &threads, &config, |o| orders.push(o.to_vec()));
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0], vec![e[2], e[3], e[0], e[1]]);
        assert_eq!(orders[1], vec![e[0], e[1], e[2], e[3]]);
    }

    #[test]
    fn enumeration_run_count_matches_the_bound_denominators() {
        let (g, threads, _) = two_chains();
        let config = PctConfig {
            priority_range: 3,
            delay_count: 2,
            dummy_start: false,
        };
        let mut runs = 0u64;
        pct_enumerate(&g, &threads, &config, |o| {
            assert_valid_schedule(&g, o);
            runs += 1;
        });
        // k! permutations times (limit + 1)^d delay placements.
        assert_eq!(runs, 2 * 3 * 3);
        let term = pct_bound_term(threads.threads(), &config);
        assert_eq!(term, vec![1, 2, 3, 3]);
        let total = runs as f64 * term.iter().map(|&d| 1.0 / d as f64).product::<f64>();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sampling_is_reproducible_and_valid() {
        let (g, threads, _) = two_chains();
        let config = PctConfig::for_graph(&g, 1);
        let mut first = Vec::new();
        pct_sample(&g, &threads, &config, 16, 7, |o| {
            assert_valid_schedule(&g, o);
            first.push(o.to_vec());
        });
        let mut second = Vec::new();
        pct_sample(&g, &threads, &config, 16, 7, |o| second.push(o.to_vec()));
        assert_eq!(first, second);
    }

    #[test]
    fn permutations_cycle_in_lexicographic_order() {
        let mut v = vec![0, 1, 2];
        let mut seen = BTreeSet::new();
        seen.insert(v.clone());
        while next_permutation(&mut v) {
            seen.insert(v.clone());
        }
        assert_eq!(seen.len(), 6);
        // Wrapped back around to sorted.
        assert_eq!(v, vec![0, 1, 2]);
    }
}
