// error.rs — Error types for the session subsystem.

use thiserror::Error;

/// Errors raised by session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session does not exist (never created or already destroyed).
    #[error("unknown session '{0}'")]
    Unknown(String),

    /// The session exceeded its idle TTL and has been destroyed.
    #[error("session '{0}' expired")]
    Expired(String),

    /// The session reached its configured turn limit.
    #[error("session '{session_id}' exhausted its {max_turns} turns")]
    TurnsExhausted { session_id: String, max_turns: u32 },

    /// The session's state is unusable (e.g. a panic while its lock was
    /// held). Unretryable — the session must be destroyed.
    #[error("session '{0}' state is corrupted")]
    Corrupted(String),
}
