//! Probability accounting for the randomized schedulers.
//!
//! Every accountant walks a fixed schedule once and appends one *term* to a
//! [`ProbabilityTerms`]: a product of integer denominators whose reciprocal
//! is (a bound on) the probability that the scheduler in question produces
//! that schedule. Summing a class's terms over its schedules gives the mass
//! the scheduler assigns to the whole equivalence class.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use weft_core::{EventId, ExecutionGraph, FrontierState};

/// A sum of products of reciprocals: `mass = Σ_terms Π_d 1/d`.
///
/// Denominators are kept as integers so terms stay exact and serializable;
/// only [`mass`](Self::mass) converts to floating point.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbabilityTerms {
    terms: Vec<Vec<u64>>,
}

impl ProbabilityTerms {
    pub fn push(&mut self, term: Vec<u64>) {
        self.terms.push(term);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn terms(&self) -> &[Vec<u64>] {
        &self.terms
    }

    /// Evaluates the accumulated terms. An empty denominator list is the
    /// empty product, i.e. probability one.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.terms
            .iter()
            .map(|term| term.iter().fold(1.0, |acc, &d| acc / d as f64))
            .sum()
    }
}

/// Exact probability of `order` under the uniform random walk: one factor
/// per step, the frontier size at that step.
pub fn account_random_walk(acc: &mut ProbabilityTerms, graph: &ExecutionGraph, order: &[EventId]) {
    let mut frontier = FrontierState::new(graph);
    let mut term = Vec::with_capacity(order.len());

    for &choice in order {
        assert!(frontier.is_ready(choice), "order violates readiness");
        term.push(frontier.ready().len() as u64);
        frontier.commit(graph, choice, |_| {});
    }

    assert!(frontier.ready().is_empty());
    acc.push(term);
}

/// Lower bound on the probability of `order` under basic partial-order
/// sampling.
///
/// Each step charges `|priDep| + 1`, where `priDep` is the transitively
/// closed set of events whose priority draws must have straddled the chosen
/// event's draw: committed conflict partners the event did not already start
/// after, plus everything those partners started after.
pub fn account_pos_basic_bound(
    acc: &mut ProbabilityTerms,
    graph: &ExecutionGraph,
    order: &[EventId],
) {
    let mut frontier = FrontierState::new(graph);
    let mut term = Vec::with_capacity(order.len());

    let mut scheduled: HashSet<EventId> = HashSet::new();
    let mut happens_before: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();
    let mut starts_before: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();
    let mut pri_dep: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();

    for &choice in order {
        assert!(frontier.is_ready(choice), "order violates readiness");

        let sb_choice = starts_before.get(&choice).cloned().unwrap_or_default();
        let mut hb_choice = happens_before.remove(&choice).unwrap_or_default();
        let mut pd_choice = pri_dep.remove(&choice).unwrap_or_default();

        for partner in graph.conflict_partners(choice) {
            if scheduled.contains(&partner) && !sb_choice.contains(&partner) {
                pd_choice.insert(partner);
                if let Some(pd) = pri_dep.get(&partner) {
                    pd_choice.extend(pd.iter().copied());
                }
                if let Some(sb) = starts_before.get(&partner) {
                    for &v in sb {
                        if !sb_choice.contains(&v) {
                            pd_choice.insert(v);
                            if let Some(pd) = pri_dep.get(&v) {
                                pd_choice.extend(pd.iter().copied());
                            }
                        }
                    }
                }
                hb_choice.insert(partner);
                if let Some(hb) = happens_before.get(&partner) {
                    hb_choice.extend(hb.iter().copied());
                }
            }
        }

        for relation in graph.outgoing(choice) {
            if relation.is_directed() {
                let entry = happens_before.entry(relation.to()).or_default();
                entry.insert(choice);
                entry.extend(hb_choice.iter().copied());
            }
        }

        let enabled = frontier.commit(graph, choice, |_| {});
        for v in enabled {
            // First moment of readiness pins the starts-before snapshot.
            let hb = happens_before.get(&v).cloned().unwrap_or_default();
            starts_before.insert(v, hb);
        }

        term.push(pd_choice.len() as u64 + 1);

        happens_before.insert(choice, hb_choice);
        pri_dep.insert(choice, pd_choice);
        scheduled.insert(choice);
    }

    acc.push(term);
}

/// Lower bound on the probability of `order` under dependency-refreshed
/// partial-order sampling.
///
/// A step only contributes a factor when it pins fresh conflict partners
/// (`upd > 0`). The charged denominator distributes the straddled set of
/// size `p = |happens-before \ starts-before|` over the `upd` redraws:
/// the product of `upd` bucket sizes, `p % upd` of them `p/upd + 2` and the
/// rest `p/upd + 1`.
pub fn account_pos_refined_bound(
    acc: &mut ProbabilityTerms,
    graph: &ExecutionGraph,
    order: &[EventId],
) {
    let mut frontier = FrontierState::new(graph);
    let mut term = Vec::new();

    let mut scheduled: HashSet<EventId> = HashSet::new();
    let mut happens_before: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();
    let mut starts_before: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();

    for &choice in order {
        assert!(frontier.is_ready(choice), "order violates readiness");

        let sb_choice = starts_before.get(&choice).cloned().unwrap_or_default();
        let mut hb_choice = happens_before.remove(&choice).unwrap_or_default();

        let mut upd: u64 = 0;
        for partner in graph.conflict_partners(choice) {
            if scheduled.contains(&partner) && !sb_choice.contains(&partner) {
                upd += 1;
                hb_choice.insert(partner);
                if let Some(hb) = happens_before.get(&partner) {
                    hb_choice.extend(hb.iter().copied());
                }
            }
        }

        for relation in graph.outgoing(choice) {
            if relation.is_directed() {
                let entry = happens_before.entry(relation.to()).or_default();
                entry.insert(choice);
                entry.extend(hb_choice.iter().copied());
            }
        }

        let enabled = frontier.commit(graph, choice, |_| {});
        for v in enabled {
            let hb = happens_before.get(&v).cloned().unwrap_or_default();
            starts_before.insert(v, hb);
        }

        if upd > 0 {
            let p = hb_choice
                .iter()
                .filter(|v| !sb_choice.contains(v))
                .count() as u64;
            let rem = p % upd;
            let mut d = 1u64;
            for i in 0..upd {
                d *= p / upd + if i < rem { 2 } else { 1 };
            }
            term.push(d);
        }

        happens_before.insert(choice, hb_choice);
        scheduled.insert(choice);
    }

    acc.push(term);
}

/// Monte Carlo estimate contribution: one hit out of `total` samples.
pub fn account_sampled(acc: &mut ProbabilityTerms, total: u64) {
    acc.push(vec![total]);
}

/// Conflict pairs racing in `order`: the partner is still ready when the
/// first of the pair commits, so either could have gone first at that point.
#[must_use]
pub fn races(graph: &ExecutionGraph, order: &[EventId]) -> BTreeSet<(EventId, EventId)> {
    let mut frontier = FrontierState::new(graph);
    let mut found = BTreeSet::new();

    for &choice in order {
        assert!(frontier.is_ready(choice), "order violates readiness");
        let ready = frontier.ready().clone();
        frontier.commit(graph, choice, |partner| {
            if ready.contains(&partner) {
                found.insert((choice, partner));
            }
        });
    }

    assert!(frontier.ready().is_empty());
    found
}

/// Number of preemptive context switches `order` requires: steps that pass
/// over a just-enabled event while one exists.
#[must_use]
pub fn preemption_count(graph: &ExecutionGraph, order: &[EventId]) -> usize {
    let mut frontier = FrontierState::new(graph);
    let mut fresh: BTreeSet<EventId> = frontier.ready().clone();
    let mut count = 0;

    for &choice in order {
        assert!(frontier.is_ready(choice), "order violates readiness");
        if !fresh.is_empty() && !fresh.contains(&choice) {
            count += 1;
        }
        fresh = frontier.commit(graph, choice, |_| {}).into_iter().collect();
    }

    assert!(frontier.ready().is_empty());
    count
}
