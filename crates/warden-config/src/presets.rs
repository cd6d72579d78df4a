// presets.rs — Shared configuration presets and stored configurations.
//
// Presets are read-only after initialization. The resolver looks one up,
// clones it (deep copy — EffectiveConfig owns all its data), and applies
// overrides to the copy. Nothing in the resolve path can mutate this
// store, which is what makes concurrent resolution safe.

use std::collections::HashMap;

use crate::effective::{Architecture, EffectiveConfig, EndpointType};

/// The key a preset is selected by when no stored configuration exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresetKey {
    pub endpoint: EndpointType,
    pub provider: String,
    pub architecture: Architecture,
}

impl PresetKey {
    pub fn new(endpoint: EndpointType, provider: impl Into<String>, architecture: Architecture) -> Self {
        PresetKey {
            endpoint,
            provider: provider.into(),
            architecture,
        }
    }
}

/// Read-only store of presets, per-caller stored configurations, and the
/// model allow-list.
#[derive(Debug, Default)]
pub struct PresetStore {
    presets: HashMap<PresetKey, EffectiveConfig>,
    /// Stored configurations keyed by caller credential.
    stored: HashMap<String, EffectiveConfig>,
    /// Models permitted without a caller-supplied provider credential.
    model_allow_list: Vec<String>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preset. Intended for initialization only; the resolver
    /// never calls this.
    pub fn insert_preset(&mut self, key: PresetKey, config: EffectiveConfig) {
        self.presets.insert(key, config);
    }

    /// Register a stored configuration for a caller credential.
    pub fn insert_stored(&mut self, credential: impl Into<String>, config: EffectiveConfig) {
        self.stored.insert(credential.into(), config);
    }

    pub fn allow_model(&mut self, model: impl Into<String>) {
        self.model_allow_list.push(model.into());
    }

    pub fn preset(&self, key: &PresetKey) -> Option<&EffectiveConfig> {
        self.presets.get(key)
    }

    pub fn stored(&self, credential: &str) -> Option<&EffectiveConfig> {
        self.stored.get(credential)
    }

    pub fn model_allowed(&self, model: &str) -> bool {
        self.model_allow_list.iter().any(|m| m == model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_by_key() {
        let mut store = PresetStore::new();
        let key = PresetKey::new(EndpointType::Chat, "openrouter", Architecture::DualModel);
        store.insert_preset(key.clone(), EffectiveConfig::default());

        assert!(store.preset(&key).is_some());
        let other = PresetKey::new(EndpointType::Agent, "openrouter", Architecture::DualModel);
        assert!(store.preset(&other).is_none());
    }

    #[test]
    fn stored_config_lookup_by_credential() {
        let mut store = PresetStore::new();
        store.insert_stored("caller-key-1", EffectiveConfig::default());
        assert!(store.stored("caller-key-1").is_some());
        assert!(store.stored("caller-key-2").is_none());
    }

    #[test]
    fn model_allow_list() {
        let mut store = PresetStore::new();
        store.allow_model("gpt-5-mini");
        assert!(store.model_allowed("gpt-5-mini"));
        assert!(!store.model_allowed("mystery-model"));
    }
}
