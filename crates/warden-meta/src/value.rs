// value.rs — Immutable value + metadata pairs.
//
// A Value is what flows through the interpreter: the raw JSON payload a
// tool produced or a program literal, plus the Metadata describing where
// it came from and where it may go. Values are never mutated; deriving a
// value from others produces a new Value with merged metadata.

use serde::{Deserialize, Serialize};

use crate::meta::Metadata;

/// How a tool-supplied metadata override combines with the metadata the
/// interpreter computed from the call's argument values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Merge the override with the computed metadata (default).
    #[default]
    Merge,
    /// The override wins; computed metadata is discarded.
    Replace,
    /// The override is discarded; only computed metadata applies.
    Ignore,
}

/// An immutable raw value with attached information-flow metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub raw: serde_json::Value,
    #[serde(default)]
    pub meta: Metadata,
}

impl Value {
    /// A value with fresh (default) metadata.
    pub fn new(raw: serde_json::Value) -> Self {
        Value {
            raw,
            meta: Metadata::new(),
        }
    }

    /// A value with explicit metadata.
    pub fn with_meta(raw: serde_json::Value, meta: Metadata) -> Self {
        Value { raw, meta }
    }

    /// Derive a value from parent values: the result's metadata is the
    /// merge of all parents'.
    pub fn derived<'a, I>(raw: serde_json::Value, parents: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let meta = Metadata::merge_all(parents.into_iter().map(|v| &v.meta));
        Value { raw, meta }
    }

    /// Wrap a raw tool result, combining a tool-supplied metadata override
    /// with the metadata computed from the call's arguments.
    pub fn wrap(
        raw: serde_json::Value,
        explicit: Option<&Metadata>,
        mode: CombineMode,
        auto: Metadata,
    ) -> Self {
        let meta = match (mode, explicit) {
            (CombineMode::Ignore, _) | (_, None) => auto,
            (CombineMode::Merge, Some(explicit)) => explicit.merge(&auto),
            (CombineMode::Replace, Some(explicit)) => explicit.clone(),
        };
        Value { raw, meta }
    }
}
