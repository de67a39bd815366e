//! The execution-graph model: abstract events plus program-order and conflict
//! relations.
//!
//! Events are opaque scheduling units; the graph never executes anything. A
//! *directed* relation is a program-order constraint (`from` must be scheduled
//! before `to` in every valid total order; directed relations must form a DAG,
//! which is a caller contract). A *conflict* is a symmetric "race" relation
//! stored as a pair of mutually-linked records sharing one logical identity
//! and one logical payload; it never constrains enablement, only how schedules
//! are classified afterwards.

use std::any::Any;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Stable, dense event identity. Assigned at creation, usable as an array
/// index for the graph's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub usize);

impl EventId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Dense identity over all relation records.
///
/// A conflict occupies two records; both point at each other through
/// [`Relation::dual`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationId(pub usize);

/// One relation record. Directed iff it has no dual.
#[derive(Debug)]
pub struct Relation {
    from: EventId,
    to: EventId,
    dual: Option<RelationId>,
    payload: Option<Rc<dyn Any>>,
}

impl Relation {
    #[must_use]
    pub fn from(&self) -> EventId {
        self.from
    }

    #[must_use]
    pub fn to(&self) -> EventId {
        self.to
    }

    /// The reverse record of a conflict pair, if this record is one half.
    #[must_use]
    pub fn dual(&self) -> Option<RelationId> {
        self.dual
    }

    /// Program-order relations are directed; conflict records are not.
    #[must_use]
    pub fn is_directed(&self) -> bool {
        self.dual.is_none()
    }

    #[must_use]
    pub fn payload(&self) -> Option<&dyn Any> {
        self.payload.as_deref()
    }
}

/// One event: a creation-order id, an opaque caller payload, and the ids of
/// its incident relation records.
#[derive(Debug)]
pub struct Event {
    id: EventId,
    payload: Option<Box<dyn Any>>,
    incoming: Vec<RelationId>,
    outgoing: Vec<RelationId>,
}

impl Event {
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn payload(&self) -> Option<&dyn Any> {
        self.payload.as_deref()
    }

    #[must_use]
    pub fn incoming(&self) -> &[RelationId] {
        &self.incoming
    }

    #[must_use]
    pub fn outgoing(&self) -> &[RelationId] {
        &self.outgoing
    }
}

/// Owns every event and relation, exposed as creation-order arenas. Nothing
/// is ever removed; ids stay dense and stable until the graph is dropped.
#[derive(Debug, Default)]
pub struct ExecutionGraph {
    events: Vec<Event>,
    relations: Vec<Relation>,
}

impl ExecutionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fresh event; its id equals the event count before the call.
    pub fn new_event(&mut self) -> EventId {
        let id = EventId(self.events.len());
        self.events.push(Event {
            id,
            payload: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    /// Adds a relation between two existing events.
    ///
    /// With `directed = false` this allocates the reverse record as well and
    /// links the two as duals; the returned id is the forward record's.
    ///
    /// # Panics
    /// Panics if either endpoint is not an event of this graph. Creating a
    /// directed cycle is a caller contract violation and is not checked here.
    pub fn add_relation(&mut self, from: EventId, to: EventId, directed: bool) -> RelationId {
        assert!(from.0 < self.events.len(), "unknown `from` event {from:?}");
        assert!(to.0 < self.events.len(), "unknown `to` event {to:?}");

        let forward = RelationId(self.relations.len());
        self.relations.push(Relation {
            from,
            to,
            dual: None,
            payload: None,
        });
        self.events[from.0].outgoing.push(forward);
        self.events[to.0].incoming.push(forward);

        if !directed {
            let reverse = RelationId(self.relations.len());
            self.relations.push(Relation {
                from: to,
                to: from,
                dual: Some(forward),
                payload: None,
            });
            self.events[to.0].outgoing.push(reverse);
            self.events[from.0].incoming.push(reverse);
            self.relations[forward.0].dual = Some(reverse);
        }

        forward
    }

    /// Adds a program-order (must-precede) relation.
    pub fn add_program_order(&mut self, from: EventId, to: EventId) -> RelationId {
        self.add_relation(from, to, true)
    }

    /// Adds a symmetric conflict between two events.
    pub fn add_conflict(&mut self, a: EventId, b: EventId) -> RelationId {
        self.add_relation(a, b, false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id.0]
    }

    #[must_use]
    pub fn relation(&self, id: RelationId) -> &Relation {
        &self.relations[id.0]
    }

    pub fn event_ids(&self) -> impl Iterator<Item = EventId> {
        (0..self.events.len()).map(EventId)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    /// Relations leaving `event`, conflict records included.
    pub fn outgoing(&self, event: EventId) -> impl Iterator<Item = &Relation> {
        self.events[event.0]
            .outgoing
            .iter()
            .map(move |&id| &self.relations[id.0])
    }

    /// Relations entering `event`, conflict records included.
    pub fn incoming(&self, event: EventId) -> impl Iterator<Item = &Relation> {
        self.events[event.0]
            .incoming
            .iter()
            .map(move |&id| &self.relations[id.0])
    }

    /// Targets of `event`'s program-order relations.
    pub fn directed_successors(&self, event: EventId) -> impl Iterator<Item = EventId> + '_ {
        self.outgoing(event)
            .filter(|r| r.is_directed())
            .map(Relation::to)
    }

    /// Events connected to `event` by a conflict relation.
    pub fn conflict_partners(&self, event: EventId) -> impl Iterator<Item = EventId> + '_ {
        self.outgoing(event)
            .filter(|r| !r.is_directed())
            .map(Relation::to)
    }

    /// Count of incoming program-order relations.
    #[must_use]
    pub fn in_degree(&self, event: EventId) -> usize {
        self.incoming(event).filter(|r| r.is_directed()).count()
    }

    pub fn set_event_payload(&mut self, event: EventId, payload: Box<dyn Any>) {
        self.events[event.0].payload = Some(payload);
    }

    /// Attaches a payload to a relation. For conflict pairs the payload is
    /// logically shared: this updates both records, so reading either side
    /// observes the change.
    pub fn set_relation_payload(&mut self, relation: RelationId, payload: Rc<dyn Any>) {
        if let Some(dual) = self.relations[relation.0].dual {
            self.relations[dual.0].payload = Some(Rc::clone(&payload));
        }
        self.relations[relation.0].payload = Some(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_dense_and_stable() {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        assert_eq!(a, EventId(0));
        assert_eq!(b, EventId(1));
        assert_eq!(g.len(), 2);
        assert_eq!(g.event(a).id(), a);
    }

    #[test]
    fn conflict_allocates_linked_dual_records() {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        let fwd = g.add_conflict(a, b);

        let forward = g.relation(fwd);
        assert!(!forward.is_directed());
        let rev = forward.dual().expect("conflict must have a dual");
        let reverse = g.relation(rev);
        assert_eq!(reverse.dual(), Some(fwd));
        assert_eq!(reverse.from(), b);
        assert_eq!(reverse.to(), a);

        assert_eq!(g.conflict_partners(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(g.conflict_partners(b).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn directed_relation_has_no_dual_and_counts_in_degree() {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        g.add_program_order(a, b);
        g.add_conflict(a, b);

        assert_eq!(g.in_degree(a), 0);
        assert_eq!(g.in_degree(b), 1);
        assert_eq!(g.directed_successors(a).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn relation_payload_is_shared_across_a_conflict_pair() {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        let b = g.new_event();
        let fwd = g.add_conflict(a, b);
        let rev = g.relation(fwd).dual().unwrap();

        g.set_relation_payload(fwd, Rc::new(7u32));
        let seen_fwd = g.relation(fwd).payload().and_then(|p| p.downcast_ref::<u32>());
        let seen_rev = g.relation(rev).payload().and_then(|p| p.downcast_ref::<u32>());
        assert_eq!(seen_fwd, Some(&7));
        assert_eq!(seen_rev, Some(&7));
    }

    #[test]
    fn event_payload_round_trips_through_any() {
        let mut g = ExecutionGraph::new();
        let a = g.new_event();
        g.set_event_payload(a, Box::new("tag".to_string()));
        let seen = g.event(a).payload().and_then(|p| p.downcast_ref::<String>());
        assert_eq!(seen.map(String::as_str), Some("tag"));
    }
}
