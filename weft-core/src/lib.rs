//! Core model for interleaving-space analysis of abstract concurrent
//! programs.
//!
//! A concurrent program is represented as an [`ExecutionGraph`]: opaque
//! events related by *program order* (directed, must-precede) and *conflict*
//! (symmetric, "these race") edges. No program is ever executed; the graph
//! is supplied by an external generator and is immutable once analysis
//! starts, so it can be shared freely across parallel sampling instances.
//!
//! This crate holds the pieces every analysis shares:
//!
//! - [`graph`]: the event/relation arenas,
//! - [`frontier`]: the in-degree/ready-set replay state used by the
//!   enumerator and all randomized schedulers,
//! - [`rng`]: master-seed → per-sample sub-generator derivation,
//! - [`logging`]: opt-in `tracing` subscriber setup.
//!
//! The enumerator, canonicalization trie, schedulers, and probability
//! accountants live in `weft-explore`.

pub mod frontier;
pub mod graph;
pub mod logging;
pub mod rng;

pub use frontier::{assert_valid_schedule, FrontierState};
pub use graph::{Event, EventId, ExecutionGraph, Relation, RelationId};
pub use logging::{init_analysis_logging, init_analysis_logging_with_level};
pub use rng::{derive_rng, derive_seed};
