// error.rs — Error types for configuration resolution.

use thiserror::Error;

/// Errors raised while resolving a request's effective configuration.
///
/// Every variant rejects the whole request — configuration failures are
/// never partially applied (fail closed).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No stored configuration and no preset matched the request key.
    #[error("no configuration preset for ({endpoint}, {provider}, {architecture})")]
    UnknownPreset {
        endpoint: String,
        provider: String,
        architecture: String,
    },

    /// An override document is malformed or incomplete. Names the
    /// offending document and field.
    #[error("invalid {document} override document, field '{field}': {reason}")]
    Validation {
        document: &'static str,
        field: String,
        reason: String,
    },

    /// The requested model is not permitted without a caller credential.
    #[error("model '{0}' is not in the allow list (supply a provider credential to use it)")]
    ModelNotAllowed(String),

    /// The policy override failed to compile.
    #[error("policy override rejected: {0}")]
    Policy(#[from] warden_policy::PolicyError),
}

impl ConfigError {
    pub fn validation(
        document: &'static str,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::Validation {
            document,
            field: field.into(),
            reason: reason.into(),
        }
    }
}
