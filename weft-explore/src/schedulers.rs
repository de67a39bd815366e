//! Randomized schedulers over an execution graph.
//!
//! Each scheduler produces one complete topological order per call, drawing
//! from the caller's RNG. They differ only in how a ready event is chosen at
//! each step, which is exactly what the probability accountants in
//! [`crate::account`] model.

use std::collections::{BTreeSet, HashMap};

use rand::Rng;

use weft_core::{EventId, ExecutionGraph, FrontierState};

/// One sampled schedule plus the inverse map from event to step.
#[derive(Debug, Clone)]
pub struct SampleRun {
    order: Vec<EventId>,
    position: Vec<usize>,
}

impl SampleRun {
    fn with_capacity(n: usize) -> Self {
        Self {
            order: Vec::with_capacity(n),
            position: vec![usize::MAX; n],
        }
    }

    fn record(&mut self, event: EventId) {
        self.position[event.index()] = self.order.len();
        self.order.push(event);
    }

    #[must_use]
    pub fn order(&self) -> &[EventId] {
        &self.order
    }

    /// Step at which `event` was committed.
    #[must_use]
    pub fn position_of(&self, event: EventId) -> usize {
        self.position[event.index()]
    }
}

/// Uniform random walk: every step draws a fresh priority for each ready
/// event and commits the maximum. Equivalent to picking uniformly from the
/// frontier.
pub fn random_walk<R: Rng>(graph: &ExecutionGraph, rng: &mut R) -> SampleRun {
    let mut frontier = FrontierState::new(graph);
    let mut run = SampleRun::with_capacity(graph.len());

    while !frontier.ready().is_empty() {
        let mut choice: Option<(EventId, f64)> = None;
        for &v in frontier.ready() {
            let p = rng.gen::<f64>();
            if choice.map_or(true, |(_, best)| best < p) {
                choice = Some((v, p));
            }
        }
        let (v, _) = choice.expect("frontier is non-empty");
        frontier.commit(graph, v, |_| {});
        run.record(v);
    }
    run
}

/// Partial-order sampling, basic flavor: a ready event draws its priority
/// once when it first becomes ready and keeps it until committed.
pub fn pos_basic<R: Rng>(graph: &ExecutionGraph, rng: &mut R) -> SampleRun {
    let mut frontier = FrontierState::new(graph);
    let mut run = SampleRun::with_capacity(graph.len());
    let mut priority: HashMap<EventId, f64> = HashMap::new();

    while !frontier.ready().is_empty() {
        let mut choice: Option<(EventId, f64)> = None;
        for &v in frontier.ready() {
            let p = *priority.entry(v).or_insert_with(|| rng.gen());
            if choice.map_or(true, |(_, best)| best < p) {
                choice = Some((v, p));
            }
        }
        let (v, _) = choice.expect("frontier is non-empty");
        frontier.commit(graph, v, |_| {});
        priority.remove(&v);
        run.record(v);
    }
    run
}

/// Partial-order sampling with dependency-triggered refresh: committing an
/// event discards the cached priorities of its conflict partners, forcing a
/// redraw at the next step.
pub fn pos_dependency<R: Rng>(graph: &ExecutionGraph, rng: &mut R) -> SampleRun {
    let mut frontier = FrontierState::new(graph);
    let mut run = SampleRun::with_capacity(graph.len());
    let mut priority: HashMap<EventId, f64> = HashMap::new();

    while !frontier.ready().is_empty() {
        let mut choice: Option<(EventId, f64)> = None;
        for &v in frontier.ready() {
            let p = *priority.entry(v).or_insert_with(|| rng.gen());
            if choice.map_or(true, |(_, best)| best < p) {
                choice = Some((v, p));
            }
        }
        let (v, _) = choice.expect("frontier is non-empty");
        frontier.commit(graph, v, |partner| {
            priority.remove(&partner);
        });
        priority.remove(&v);
        run.record(v);
    }
    run
}

/// RAPOS: commits a batch of mutually conflict-free events per round. The
/// batch seeds with a uniform pick from the schedulable set, then admits each
/// remaining schedulable event with probability 1/2 if it conflicts with
/// nothing already in the batch. Events left ready but unscheduled in a round
/// stay inactive for the next one unless a batch member conflicted with them.
pub fn rapos<R: Rng>(graph: &ExecutionGraph, rng: &mut R) -> SampleRun {
    let mut frontier = FrontierState::new(graph);
    let mut run = SampleRun::with_capacity(graph.len());

    let mut dep: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();
    for relation in graph.relations() {
        if !relation.is_directed() {
            dep.entry(relation.from()).or_default().insert(relation.to());
        }
    }

    let mut schedulable: Vec<EventId> = frontier.ready().iter().copied().collect();

    while !frontier.ready().is_empty() {
        assert!(!schedulable.is_empty(), "schedulable set drained early");

        let mut scheduled = vec![schedulable[rng.gen_range(0..schedulable.len())]];

        for &candidate in &schedulable {
            debug_assert!(frontier.is_ready(candidate));
            let independent = scheduled.iter().all(|&v| {
                v != candidate && dep.get(&v).map_or(true, |d| !d.contains(&candidate))
            });
            if independent && rng.gen::<f64>() <= 0.5 {
                scheduled.push(candidate);
            }
        }

        let mut inactive: BTreeSet<EventId> = frontier.ready().clone();

        for &choice in &scheduled {
            frontier.commit(graph, choice, |partner| {
                inactive.remove(&partner);
            });
            inactive.remove(&choice);
            run.record(choice);
        }

        schedulable.clear();
        if !frontier.ready().is_empty() {
            let backup_index = rng.gen_range(0..frontier.ready().len());
            let mut backup = None;
            for (index, &v) in frontier.ready().iter().enumerate() {
                if index == backup_index {
                    backup = Some(v);
                }
                if !inactive.contains(&v) {
                    schedulable.push(v);
                }
            }

            // Every ready event can be inactive at once; fall back to a
            // uniform pick so the walk always makes progress.
            if schedulable.is_empty() {
                schedulable.push(backup.expect("index drawn from a non-empty set"));
            }
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use weft_core::assert_valid_schedule;

    fn diamond() -> ExecutionGraph {
        // a -> {b, c} -> d, with b and c in conflict.
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        let c = g.new_event();
        let d = g.new_event();
        g.add_program_order(a, b);
        g.add_program_order(a, c);
        g.add_program_order(b, d);
        g.add_program_order(c, d);
        g.add_conflict(b, c);
        g
    }

    fn check_sampler(sample: fn(&ExecutionGraph, &mut StdRng) -> SampleRun) {
        let g = diamond();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let run = sample(&g, &mut rng);
            assert_valid_schedule(&g, run.order());
            for (step, &v) in run.order().iter().enumerate() {
                assert_eq!(run.position_of(v), step);
            }
        }
    }

    #[test]
    fn random_walk_produces_valid_schedules() {
        check_sampler(random_walk);
    }

    #[test]
    fn pos_basic_produces_valid_schedules() {
        check_sampler(pos_basic);
    }

    #[test]
    fn pos_dependency_produces_valid_schedules() {
        check_sampler(pos_dependency);
    }

    #[test]
    fn rapos_produces_valid_schedules() {
        check_sampler(rapos);
    }

    #[test]
    fn random_walk_reaches_both_interleavings() {
        let g = diamond();
        let mut seen = BTreeSet::new();
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            seen.insert(random_walk(&g, &mut rng).order().to_vec());
        }
        assert_eq!(seen.len(), 2);
    }
}
