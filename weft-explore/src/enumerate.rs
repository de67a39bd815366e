//! Exhaustive backtracking enumeration of total orders.
//!
//! [`DfsEnumerator`] walks every topological order of the program-order DAG
//! with an explicit stack of *choice frames*, one per depth. A frame records,
//! in discovery order, every event already tried at that depth, so a fixed
//! prefix never repeats a choice. Each [`DfsEnumerator::explore`] call
//! rebuilds the frontier from scratch by replaying the committed prefix, then
//! extends the deepest frame by one untried event.
//!
//! With sleep-set pruning (the default), an event skipped in favor of an
//! earlier sibling at the same frame is not retried deeper in that subtree
//! until scheduling one of its conflict partners wakes it: the classical
//! persistent-set/sleep-set rule. Pruned runs visit at most one order per
//! partial-order equivalence class; unpruned runs visit every topological
//! order, which is what exact probability accounting iterates over.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use weft_core::{EventId, ExecutionGraph, FrontierState};

#[derive(Debug, Default)]
struct Frame {
    index: HashMap<EventId, usize>,
    events: Vec<EventId>,
}

/// Backtracking depth-first enumerator over valid schedules.
pub struct DfsEnumerator<'g> {
    graph: &'g ExecutionGraph,
    stack: Vec<Frame>,
    sleep_sets: bool,
}

impl<'g> DfsEnumerator<'g> {
    /// Enumerator with sleep-set pruning: one schedule per equivalence class.
    #[must_use]
    pub fn new(graph: &'g ExecutionGraph) -> Self {
        Self {
            graph,
            stack: vec![Frame::default()],
            sleep_sets: true,
        }
    }

    /// Enumerator without pruning: every topological order, exactly once.
    #[must_use]
    pub fn unpruned(graph: &'g ExecutionGraph) -> Self {
        Self {
            graph,
            stack: vec![Frame::default()],
            sleep_sets: false,
        }
    }

    /// Produces the next unexplored schedule into `out`.
    ///
    /// Returns `false` once every search path under the pruning policy has
    /// been visited; `out` is left cleared in that case.
    pub fn explore(&mut self, out: &mut Vec<EventId>) -> bool {
        if self.stack.is_empty() {
            return false;
        }

        let prune = self.sleep_sets;
        let mut rejected;
        loop {
            rejected = false;
            out.clear();
            let mut sleep: HashSet<EventId> = HashSet::new();
            let mut frontier = FrontierState::new(self.graph);
            let mut level = 0usize;

            while !frontier.ready().is_empty() {
                let choice = if level == self.stack.len() - 1 {
                    // Deepest frame: pick something untried here, and (when
                    // pruning) not currently asleep.
                    let frame = &self.stack[level];
                    let picked = frontier.ready().iter().copied().find(|v| {
                        !frame.index.contains_key(v) && !(prune && sleep.contains(v))
                    });

                    match picked {
                        None => {
                            // Frame exhausted: backtrack to the parent.
                            self.stack.pop();
                            rejected = true;
                            trace!(level, "frame exhausted, backtracking");
                            break;
                        }
                        Some(v) => {
                            if prune {
                                for &sibling in &self.stack[level].events {
                                    sleep.insert(sibling);
                                }
                            }
                            let frame = &mut self.stack[level];
                            frame.index.insert(v, frame.events.len());
                            frame.events.push(v);
                            self.stack.push(Frame::default());
                            v
                        }
                    }
                } else {
                    // Replay level: earlier siblings of the committed choice
                    // go to sleep.
                    let frame = &self.stack[level];
                    if prune {
                        for &sibling in &frame.events[..frame.events.len() - 1] {
                            sleep.insert(sibling);
                        }
                    }
                    *frame
                        .events
                        .last()
                        .expect("non-leaf frame always holds a committed choice")
                };

                frontier.commit(self.graph, choice, |partner| {
                    if prune {
                        // A conflict got resolved: the partner must be retried.
                        sleep.remove(&partner);
                    }
                });
                level += 1;
                out.push(choice);
            }

            if !(rejected && !self.stack.is_empty()) {
                break;
            }
        }

        if rejected {
            false
        } else {
            // The leaf frame is one full path; it will not be revisited.
            self.stack.pop();
            trace!(len = out.len(), "produced schedule");
            true
        }
    }

    /// Iterator adapter yielding owned schedules until exhaustion.
    #[must_use]
    pub fn schedules(self) -> Schedules<'g> {
        Schedules { inner: self }
    }
}

/// Owned-schedule iterator over a [`DfsEnumerator`].
pub struct Schedules<'g> {
    inner: DfsEnumerator<'g>,
}

impl Iterator for Schedules<'_> {
    type Item = Vec<EventId>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut out = Vec::new();
        self.inner.explore(&mut out).then_some(out)
    }
}
