//! # warden-meta
//!
//! Information-flow metadata model for Warden.
//!
//! Every value the interpreter touches carries a [`Metadata`] triple:
//! which tools *produced* it, which consumers may *receive* it, and
//! free-form classification *tags*. Deriving a new value from existing
//! values merges their metadata — producers and tags accumulate (union),
//! consumers narrow (intersection) — so provenance and audience survive
//! arbitrary data flow through a generated program.
//!
//! ## Key invariants
//!
//! - **Merge is a lattice operation**: commutative, associative, and
//!   idempotent. Evaluation order never changes the resulting metadata.
//! - **Universal absorption**: the universal consumer set is the identity
//!   of intersection — merging with it returns the other side verbatim.
//! - **Values are immutable**: every derivation builds a new [`Value`];
//!   nothing rewrites metadata in place.

pub mod meta;
pub mod value;

pub use meta::{ConsumerSet, Metadata, UNIVERSAL_MARKER};
pub use value::{CombineMode, Value};
