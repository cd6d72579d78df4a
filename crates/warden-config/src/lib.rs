//! # warden-config
//!
//! Layered session-configuration resolution for Warden.
//!
//! Every request runs under an [`EffectiveConfig`] produced by a strict
//! four-step pipeline ([`Resolver::resolve`]): base lookup (stored config
//! by credential, else preset by endpoint/provider/architecture), deep
//! copy, override application in fixed order (feature → policy →
//! fine-grained), then request-scoped model selection.
//!
//! ## Key invariants
//!
//! - **Presets are never mutated**: resolution clones before applying
//!   anything, so shared presets stay read-only after initialization.
//! - **Fail closed**: a malformed or incomplete override document rejects
//!   the whole request and names the offending field. Unknown fields are
//!   ignored for forward compatibility.

pub mod effective;
pub mod error;
pub mod overrides;
pub mod presets;
pub mod resolver;

pub use effective::{
    Architecture, CacheToolResults, ClearSessionMeta, EffectiveConfig, EndpointType,
    ProgramSupport, ReportOptions,
};
pub use error::ConfigError;
pub use overrides::{FeatureOverride, FineGrainedOverride, PolicyOverride};
pub use presets::{PresetKey, PresetStore};
pub use resolver::{Resolver, ResolveRequest};
