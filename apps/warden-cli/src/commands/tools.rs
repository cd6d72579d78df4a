// tools.rs — Canned tool catalogs for offline runs.
//
// A catalog file is a JSON object mapping tool names to descriptors:
//
//   {
//     "get_doc": {
//       "result": {"body": "..."},
//       "deterministic": true,
//       "meta": {"producers": [], "consumers": ["*"], "tags": ["confidential"]},
//       "combine": "merge"
//     }
//   }
//
// Only "result" is required. Each tool always answers with its canned
// result, which is exactly what policy validation and program replay
// need — the real executors live with the caller, not here.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use warden_interp::{ToolDescriptor, ToolRegistry};
use warden_meta::{CombineMode, Metadata};

#[derive(Debug, Deserialize)]
struct CannedTool {
    result: serde_json::Value,
    #[serde(default)]
    deterministic: bool,
    #[serde(default)]
    meta: Option<Metadata>,
    #[serde(default)]
    combine: CombineMode,
}

/// Load a tool catalog into a registry of canned executors. A missing
/// path yields an empty registry.
pub fn load_registry(path: Option<&Path>) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let Some(path) = path else {
        return Ok(registry);
    };

    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read tool catalog {}: {e}", path.display()))?;
    let catalog: BTreeMap<String, CannedTool> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("invalid tool catalog {}: {e}", path.display()))?;

    for (name, canned) in catalog {
        let mut descriptor = ToolDescriptor::new(&name);
        if canned.deterministic {
            descriptor = descriptor.deterministic();
        }
        if let Some(meta) = canned.meta {
            descriptor = descriptor.with_meta(meta, canned.combine);
        }
        let result = canned.result;
        registry.register(
            descriptor,
            Arc::new(move |_: &str, _: &serde_json::Value| Ok(result.clone())),
        );
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn catalog_loads_and_answers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"get_doc": {{"result": {{"body": "hi"}}, "deterministic": true}}}}"#
        )
        .unwrap();

        let registry = load_registry(Some(file.path())).unwrap();
        let (descriptor, executor) = registry.get("get_doc").unwrap();
        assert!(descriptor.deterministic);
        let result = executor
            .call("get_doc", &serde_json::json!({}))
            .unwrap();
        assert_eq!(result, serde_json::json!({"body": "hi"}));
    }

    #[test]
    fn missing_catalog_is_empty() {
        let registry = load_registry(None).unwrap();
        assert!(registry.names().is_empty());
    }

    #[test]
    fn malformed_catalog_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_registry(Some(file.path())).is_err());
    }
}
