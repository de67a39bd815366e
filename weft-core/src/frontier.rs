//! Frontier/in-degree bookkeeping shared by every traversal.
//!
//! Both the exhaustive enumerator and all randomized schedulers walk the
//! graph the same way: keep each event's remaining program-order in-degree,
//! treat the zero-in-degree events as the *ready* frontier, and commit one
//! event at a time. Conflict relations never affect readiness; committing an
//! event merely surfaces its conflict partners to the caller's hook, which is
//! where sleep-set wakeup, priority invalidation, and inactive-set upkeep
//! live.

use std::collections::BTreeSet;

use crate::graph::{EventId, ExecutionGraph};

/// Per-traversal scratch state: remaining in-degrees plus the ready set.
///
/// The ready set iterates in ascending event id, which makes every
/// traversal built on it deterministic for a fixed random stream.
#[derive(Debug, Clone)]
pub struct FrontierState {
    in_degree: Vec<usize>,
    ready: BTreeSet<EventId>,
}

impl FrontierState {
    /// Builds the initial frontier from scratch: in-degree counts only
    /// program-order predecessors.
    #[must_use]
    pub fn new(graph: &ExecutionGraph) -> Self {
        let mut in_degree = Vec::with_capacity(graph.len());
        let mut ready = BTreeSet::new();
        for event in graph.event_ids() {
            let d = graph.in_degree(event);
            in_degree.push(d);
            if d == 0 {
                ready.insert(event);
            }
        }
        Self { in_degree, ready }
    }

    /// Events whose program-order predecessors have all been committed.
    #[must_use]
    pub fn ready(&self) -> &BTreeSet<EventId> {
        &self.ready
    }

    #[must_use]
    pub fn is_ready(&self, event: EventId) -> bool {
        self.ready.contains(&event)
    }

    /// Commits a ready event: decrements its program-order successors'
    /// in-degrees and promotes the ones that reach zero. `on_conflict` is
    /// invoked once per conflict partner of the committed event.
    ///
    /// Returns the events that became ready as a result of this commit.
    ///
    /// # Panics
    /// Panics if `event` is not currently ready (schedule violates program
    /// order, a caller contract violation).
    pub fn commit(
        &mut self,
        graph: &ExecutionGraph,
        event: EventId,
        mut on_conflict: impl FnMut(EventId),
    ) -> Vec<EventId> {
        assert!(
            self.ready.remove(&event),
            "committed event {event:?} is not ready"
        );

        let mut enabled = Vec::new();
        for relation in graph.outgoing(event) {
            if relation.is_directed() {
                let to = relation.to();
                self.in_degree[to.index()] -= 1;
                if self.in_degree[to.index()] == 0 {
                    self.ready.insert(to);
                    enabled.push(to);
                }
            } else {
                on_conflict(relation.to());
            }
        }
        enabled
    }
}

/// Asserts the schedule is a valid topological order of the whole graph:
/// every event exactly once, every program-order predecessor earlier.
///
/// A failure is a bug in the collaborator that produced the schedule, so per
/// the error-handling design this terminates the run instead of returning.
pub fn assert_valid_schedule(graph: &ExecutionGraph, schedule: &[EventId]) {
    assert_eq!(
        schedule.len(),
        graph.len(),
        "schedule covers {} events, graph has {}",
        schedule.len(),
        graph.len()
    );

    let mut position = vec![usize::MAX; graph.len()];
    for (i, &event) in schedule.iter().enumerate() {
        assert!(
            position[event.index()] == usize::MAX,
            "schedule repeats event {event:?}"
        );
        position[event.index()] = i;
    }

    for event in graph.event_ids() {
        for relation in graph.outgoing(event) {
            if relation.is_directed() {
                assert!(
                    position[event.index()] < position[relation.to().index()],
                    "schedule violates program order {:?} -> {:?}",
                    event,
                    relation.to()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> ExecutionGraph {
        let mut g = ExecutionGraph::new();
        let ids: Vec<_> = (0..len).map(|_| g.new_event()).collect();
        for pair in ids.windows(2) {
            g.add_program_order(pair[0], pair[1]);
        }
        g
    }

    #[test]
    fn initial_frontier_is_the_zero_in_degree_set() {
        let g = chain(3);
        let frontier = FrontierState::new(&g);
        assert_eq!(frontier.ready().len(), 1);
        assert!(frontier.is_ready(EventId(0)));
    }

    #[test]
    fn commit_promotes_successors_and_reports_them() {
        let g = chain(3);
        let mut frontier = FrontierState::new(&g);
        let enabled = frontier.commit(&g, EventId(0), |_| {});
        assert_eq!(enabled, vec![EventId(1)]);
        assert!(frontier.is_ready(EventId(1)));
        assert!(!frontier.is_ready(EventId(2)));
    }

    #[test]
    fn commit_surfaces_conflict_partners() {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        g.add_conflict(a, b);

        let mut frontier = FrontierState::new(&g);
        let mut seen = Vec::new();
        frontier.commit(&g, a, |p| seen.push(p));
        assert_eq!(seen, vec![b]);
        // Conflicts never affect readiness.
        assert!(frontier.is_ready(b));
    }

    #[test]
    #[should_panic(expected = "not ready")]
    fn committing_a_blocked_event_panics() {
        let g = chain(2);
        let mut frontier = FrontierState::new(&g);
        frontier.commit(&g, EventId(1), |_| {});
    }

    #[test]
    #[should_panic(expected = "program order")]
    fn out_of_order_schedule_is_rejected() {
        let g = chain(2);
        assert_valid_schedule(&g, &[EventId(1), EventId(0)]);
    }

    #[test]
    #[should_panic(expected = "repeats")]
    fn duplicated_event_is_rejected() {
        let g = chain(2);
        assert_valid_schedule(&g, &[EventId(0), EventId(0)]);
    }
}
