//! Partial-order canonicalization: a trie of equivalence classes.
//!
//! [`ClassTree::add_path`] reduces an arbitrary valid schedule to its
//! canonical (sleep-set-reduced) representative and inserts that reduced
//! sequence into a persistent prefix tree, returning the class it resolves
//! to. Two schedules land in the same class exactly when one can be turned
//! into the other by repeatedly swapping adjacent non-conflicting events.
//!
//! Nodes are arena-allocated and addressed by [`ClassId`], a stable integer
//! assigned at creation; per-class accounting side-tables key off it.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use weft_core::{assert_valid_schedule, EventId, ExecutionGraph};

/// Stable identity of an equivalence-class node, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(usize);

const ROOT: ClassId = ClassId(0);

/// One node of the class trie. A child edge at depth `d` means "this event
/// is the `d`-th canonical choice."
#[derive(Debug, Default)]
pub struct ClassNode {
    size: u64,
    min_hit: u64,
    index: HashMap<EventId, usize>,
    events: Vec<EventId>,
    children: Vec<ClassId>,
}

impl ClassNode {
    /// Distinct canonical schedules rooted at this node.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Minimum, over this node's subtree path, of how often any visited node
    /// has been reached. "Every class hit at least N times" is
    /// `min_hit >= N` at the root.
    #[must_use]
    pub fn min_hit(&self) -> u64 {
        self.min_hit
    }

    /// Canonical choices recorded at this depth, in discovery order.
    #[must_use]
    pub fn choices(&self) -> &[EventId] {
        &self.events
    }

    #[must_use]
    pub fn children(&self) -> &[ClassId] {
        &self.children
    }
}

/// Prefix tree of equivalence classes with coverage counters.
#[derive(Debug)]
pub struct ClassTree {
    nodes: Vec<ClassNode>,
}

impl Default for ClassTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![ClassNode::default()],
        }
    }

    #[must_use]
    pub fn root(&self) -> ClassId {
        ROOT
    }

    #[must_use]
    pub fn node(&self, id: ClassId) -> &ClassNode {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn size(&self, id: ClassId) -> u64 {
        self.nodes[id.0].size
    }

    #[must_use]
    pub fn min_hit(&self, id: ClassId) -> u64 {
        self.nodes[id.0].min_hit
    }

    /// Node count, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    fn push_node(&mut self) -> ClassId {
        let id = ClassId(self.nodes.len());
        self.nodes.push(ClassNode::default());
        id
    }

    /// Canonicalizes `schedule` and records it, returning its class.
    ///
    /// Pass 1 greedily pulls deferred (slept) events forward: walking the
    /// schedule, each trie descent puts the node's earlier-discovered
    /// siblings to sleep at the current position; hitting a sleeping event
    /// rotates it back to the position it was deferred at and resumes from
    /// there. Scheduling a conflict partner of a sleeping event wakes it.
    /// Pass 2 replays the reduced schedule, materializing missing nodes and
    /// updating `size`/`min_hit` along the touched path.
    ///
    /// # Panics
    /// Panics unless `schedule` is a valid topological order of the whole
    /// graph (caller contract).
    pub fn add_path(&mut self, graph: &ExecutionGraph, schedule: &[EventId]) -> ClassId {
        assert_valid_schedule(graph, schedule);

        let mut reduced: Vec<EventId> = schedule.to_vec();
        let mut partners: HashMap<EventId, BTreeSet<EventId>> = HashMap::new();

        // Pass 1: compute the reduced order without creating nodes.
        {
            let mut pos = 0usize;
            let mut cur: Option<ClassId> = Some(ROOT);
            let mut sleep: HashMap<EventId, usize> = HashMap::new();
            let mut sleep_stack: Vec<Vec<EventId>> = Vec::new();
            let mut node_stack: Vec<ClassId> = vec![ROOT];

            while pos < reduced.len() {
                let v = reduced[pos];

                if let Some(&deferred_at) = sleep.get(&v) {
                    // A previously-skipped sibling is schedulable here after
                    // all: rotate it forward and resume from its deferral
                    // point.
                    trace!(event = v.index(), from = pos, to = deferred_at, "rotating deferred event");
                    for i in (deferred_at + 1..=pos).rev() {
                        reduced.swap(i, i - 1);
                    }
                    while deferred_at < sleep_stack.len() {
                        for w in sleep_stack.pop().expect("loop guard ensures non-empty") {
                            sleep.remove(&w);
                        }
                    }
                    pos = deferred_at;
                    node_stack.truncate(pos + 1);
                    cur = Some(node_stack[pos]);
                    continue;
                }

                if let Some(c) = cur {
                    let found = self.nodes[c.0].index.get(&v).copied();
                    let idx = found.unwrap_or(self.nodes[c.0].children.len());

                    let mut level = Vec::with_capacity(idx);
                    for i in 0..idx {
                        let sibling = self.nodes[c.0].events[i];
                        level.push(sibling);
                        sleep.insert(sibling, pos);
                    }
                    sleep_stack.push(level);

                    match found {
                        None => cur = None,
                        Some(i) => {
                            let child = self.nodes[c.0].children[i];
                            node_stack.push(child);
                            cur = Some(child);
                        }
                    }
                }

                Self::wake_conflicting(graph, &mut partners, &mut sleep, v);
                pos += 1;
            }
        }

        // Pass 2: replay the reduced order, materializing new nodes.
        let mut cur = ROOT;
        let mut node_stack: Vec<ClassId> = vec![ROOT];
        let mut sleep: HashMap<EventId, usize> = HashMap::new();
        let mut new_path = false;

        for (pos, &v) in reduced.iter().enumerate() {
            assert!(
                !sleep.contains_key(&v),
                "reduced schedule re-chooses a deferred event"
            );

            let idx = match self.nodes[cur.0].index.get(&v).copied() {
                Some(i) => i,
                None => {
                    let child = self.push_node();
                    let node = &mut self.nodes[cur.0];
                    let i = node.children.len();
                    node.index.insert(v, i);
                    node.events.push(v);
                    node.children.push(child);
                    new_path = true;
                    i
                }
            };

            for i in 0..idx {
                sleep.insert(self.nodes[cur.0].events[i], pos);
            }
            Self::wake_conflicting(graph, &mut partners, &mut sleep, v);

            cur = self.nodes[cur.0].children[idx];
            node_stack.push(cur);
        }

        let leaf = *node_stack.last().expect("stack holds at least the root");

        // Bookkeeping on the touched path, leaf to root. A node's min_hit is
        // its own hit count clamped to the smallest child min_hit.
        while let Some(id) = node_stack.pop() {
            let min_child = self.nodes[id.0]
                .children
                .iter()
                .map(|c| self.nodes[c.0].min_hit)
                .min();
            let node = &mut self.nodes[id.0];
            if new_path {
                node.size += 1;
            }
            node.min_hit += 1;
            if let Some(m) = min_child {
                if m < node.min_hit {
                    node.min_hit = m;
                }
            }
        }

        leaf
    }

    /// Revokes sleep membership for events whose conflict with `chosen` is
    /// now resolved; they must be retried at the next layer.
    fn wake_conflicting(
        graph: &ExecutionGraph,
        partners: &mut HashMap<EventId, BTreeSet<EventId>>,
        sleep: &mut HashMap<EventId, usize>,
        chosen: EventId,
    ) {
        let mut wake = Vec::new();
        for &sleeping in sleep.keys() {
            let deps = partners
                .entry(sleeping)
                .or_insert_with(|| graph.conflict_partners(sleeping).collect());
            if deps.contains(&chosen) {
                wake.push(sleeping);
            }
        }
        for w in wake {
            sleep.remove(&w);
        }
    }
}
