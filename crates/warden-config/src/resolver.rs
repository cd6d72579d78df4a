// resolver.rs — The four-step configuration resolution pipeline.
//
// 1. Base: stored configuration by caller credential, else preset by
//    (endpoint, provider, architecture).
// 2. Deep copy — shared presets are never aliased.
// 3. Overrides, in fixed order: feature → policy → fine-grained. Each is
//    independently optional and fails closed.
// 4. Request-scoped fields: model selection and allow-list validation.
//
// Every failure rejects the whole request; there is no partially
// resolved configuration.

use crate::effective::{Architecture, EffectiveConfig, EndpointType};
use crate::error::ConfigError;
use crate::overrides::{FeatureOverride, FineGrainedOverride, PolicyOverride};
use crate::presets::{PresetKey, PresetStore};

/// Everything a request contributes to resolution.
#[derive(Debug, Default)]
pub struct ResolveRequest<'a> {
    /// Caller credential used to look up a stored configuration.
    pub credential: Option<&'a str>,
    pub provider: &'a str,
    pub architecture: Architecture,
    /// Raw JSON override documents, absent when not supplied.
    pub feature_override: Option<&'a str>,
    pub policy_override: Option<&'a str>,
    pub fine_grained_override: Option<&'a str>,
    /// `"model"` sets planner and quarantined alike;
    /// `"planner,quarantined"` sets them independently.
    pub model: Option<&'a str>,
    /// A caller-supplied provider credential lifts the model allow-list.
    pub provider_credential: Option<&'a str>,
    /// The closed tool registry, for policy compile warnings.
    pub registered_tools: Option<&'a [String]>,
}

/// Resolves effective configurations against a read-only preset store.
pub struct Resolver {
    store: PresetStore,
}

impl Resolver {
    pub fn new(store: PresetStore) -> Self {
        Resolver { store }
    }

    pub fn store(&self) -> &PresetStore {
        &self.store
    }

    /// Resolve one request's effective configuration.
    pub fn resolve(
        &self,
        endpoint: EndpointType,
        request: &ResolveRequest,
    ) -> Result<EffectiveConfig, ConfigError> {
        // Step 1: base lookup. Stored configuration wins over presets.
        let base = request
            .credential
            .and_then(|credential| self.store.stored(credential))
            .or_else(|| {
                self.store.preset(&PresetKey::new(
                    endpoint,
                    request.provider,
                    request.architecture,
                ))
            })
            .ok_or_else(|| ConfigError::UnknownPreset {
                endpoint: endpoint.to_string(),
                provider: request.provider.to_string(),
                architecture: request.architecture.to_string(),
            })?;

        // Step 2: deep copy. EffectiveConfig owns all its data, so Clone
        // severs every tie to the shared preset.
        let mut config = base.clone();

        // Step 3: overrides in fixed order. Parse (and thereby validate)
        // each document before applying it.
        if let Some(raw) = request.feature_override {
            FeatureOverride::parse(raw)?.apply(&mut config);
        }
        if let Some(raw) = request.policy_override {
            PolicyOverride::parse(raw)?.apply(&mut config, request.registered_tools)?;
        }
        if let Some(raw) = request.fine_grained_override {
            FineGrainedOverride::parse(raw)?.apply(&mut config)?;
        }

        // Step 4: request-scoped model selection.
        if let Some(model) = request.model {
            let (planner, quarantined) = split_models(model)?;
            if request.provider_credential.is_none() {
                for name in [planner.as_str(), quarantined.as_str()] {
                    if !self.store.model_allowed(name) {
                        return Err(ConfigError::ModelNotAllowed(name.to_string()));
                    }
                }
            }
            config.planner_model = planner;
            config.quarantined_model = quarantined;
        }

        tracing::debug!(
            endpoint = %endpoint,
            provider = request.provider,
            architecture = %config.architecture,
            planner = %config.planner_model,
            "resolved effective configuration"
        );
        Ok(config)
    }
}

/// Split a request model field: one name for both slots, or a
/// comma-joined pair for (planner, quarantined).
fn split_models(model: &str) -> Result<(String, String), ConfigError> {
    let parts: Vec<&str> = model.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [one] if !one.is_empty() => Ok((one.to_string(), one.to_string())),
        [planner, quarantined] if !planner.is_empty() && !quarantined.is_empty() => {
            Ok((planner.to_string(), quarantined.to_string()))
        }
        _ => Err(ConfigError::validation(
            "request",
            "model",
            format!("expected 'model' or 'planner,quarantined', got '{model}'"),
        )),
    }
}
