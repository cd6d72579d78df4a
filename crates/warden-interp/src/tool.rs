// tool.rs — The tool registry and executor seam.
//
// Tool executors are caller-supplied black boxes. The registry pairs
// each executor with a descriptor: whether its results are deterministic
// (cacheable), how its metadata override combines with computed
// metadata, and the override itself if it declares one. The interpreter
// only ever reaches a tool through this registry.

use std::collections::HashMap;
use std::sync::Arc;

use warden_meta::{CombineMode, Metadata};

use crate::error::ToolError;

/// A caller-supplied tool implementation.
///
/// Invocations are blocking; executors are responsible for their own
/// invocation timeouts.
pub trait ToolExecutor: Send + Sync {
    fn call(&self, name: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

impl<F> ToolExecutor for F
where
    F: Fn(&str, &serde_json::Value) -> Result<serde_json::Value, ToolError> + Send + Sync,
{
    fn call(&self, name: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        self(name, args)
    }
}

/// Static facts about a registered tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    /// Same arguments always produce the same result — eligible for the
    /// result cache under the deterministic-only policy.
    pub deterministic: bool,
    /// How `explicit_meta` combines with metadata computed from the
    /// call's arguments.
    pub combine_mode: CombineMode,
    /// Metadata the tool declares for its results, if any.
    pub explicit_meta: Option<Metadata>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        ToolDescriptor {
            name: name.into(),
            deterministic: false,
            combine_mode: CombineMode::Merge,
            explicit_meta: None,
        }
    }

    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    pub fn with_meta(mut self, meta: Metadata, mode: CombineMode) -> Self {
        self.explicit_meta = Some(meta);
        self.combine_mode = mode;
        self
    }
}

/// The closed registry of callable tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, (ToolDescriptor, Arc<dyn ToolExecutor>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor, executor: Arc<dyn ToolExecutor>) {
        self.tools.insert(descriptor.name.clone(), (descriptor, executor));
    }

    pub fn get(&self, name: &str) -> Option<(&ToolDescriptor, &Arc<dyn ToolExecutor>)> {
        self.tools.get(name).map(|(d, e)| (d, e))
    }

    /// Registered tool names, for program validation and policy compile
    /// warnings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}
