//! # warden-session
//!
//! Session state and lifecycle for Warden.
//!
//! A session is the unit of continuity across conversational turns: it
//! holds the metadata written by `session before/after` policy rules, the
//! history of policy-checked steps, and the turn/attempt counters the
//! configured limits apply to.
//!
//! The [`SessionStore`] enforces the concurrency model: sessions are
//! fully independent of each other, and all access to one session goes
//! through its exclusive lock, so overlapping requests against the same
//! session serialize instead of interleaving order-sensitive metadata
//! mutations.

pub mod error;
pub mod state;
pub mod store;

pub use error::SessionError;
pub use state::{SessionState, StepRecord};
pub use store::{SessionHandle, SessionStore};
