//! Model-to-adapter routing with a pluggable mock mode.
//!
//! [`ProviderRouter`] maps a requested model identifier to a capability
//! family, then to the adapter configured for that family. Mock mode is a
//! construction-time strategy substitution: enabling it rebuilds the
//! adapter table from a stub factory, disabling it reconstructs real
//! adapters from the currently configured credentials. Adapters are never
//! mutated in place.

use super::{Capability, ImageAdapter, MockAdapter, ProviderAdapter, TextAdapter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Built-in model → capability family table.
const MODEL_FAMILIES: &[(&str, Capability)] = &[
    ("gpt-4o", Capability::TextCompletion),
    ("gpt-4o-mini", Capability::TextCompletion),
    ("gpt-4.1", Capability::TextCompletion),
    ("claude-sonnet", Capability::TextCompletion),
    ("claude-haiku", Capability::TextCompletion),
    ("llama-3.1-70b", Capability::TextCompletion),
    ("dall-e-3", Capability::ImageGeneration),
    ("sdxl", Capability::ImageGeneration),
    ("flux-pro", Capability::ImageGeneration),
];

/// Credentials and endpoints for the real adapters.
///
/// A family whose API key is absent is left uninitialized; requests for
/// its models resolve to `None` (and a log line saying why).
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub text_base_url: Option<String>,
    pub text_api_key: Option<String>,
    pub image_base_url: Option<String>,
    pub image_api_key: Option<String>,
    /// Additional model → family entries beyond the built-in table.
    pub extra_models: HashMap<String, Capability>,
}

impl RouterConfig {
    /// Read credentials from the process environment.
    ///
    /// `TEXT_PROVIDER_URL` / `TEXT_PROVIDER_API_KEY` and
    /// `IMAGE_PROVIDER_URL` / `IMAGE_PROVIDER_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            text_base_url: std::env::var("TEXT_PROVIDER_URL").ok(),
            text_api_key: std::env::var("TEXT_PROVIDER_API_KEY").ok(),
            image_base_url: std::env::var("IMAGE_PROVIDER_URL").ok(),
            image_api_key: std::env::var("IMAGE_PROVIDER_API_KEY").ok(),
            extra_models: HashMap::new(),
        }
    }

    /// Register an additional model identifier (builder style).
    pub fn with_model(mut self, model: impl Into<String>, family: Capability) -> Self {
        self.extra_models.insert(model.into(), family);
        self
    }

    pub fn text_configured(&self) -> bool {
        self.text_api_key.is_some()
    }

    pub fn image_configured(&self) -> bool {
        self.image_api_key.is_some()
    }
}

/// Routes model identifiers to capability-specific adapters.
///
/// Constructed once at process start and shared by reference; the adapter
/// table sits behind a `RwLock` so concurrent lookups are cheap and mock
/// reconfiguration is atomic.
pub struct ProviderRouter {
    config: RouterConfig,
    adapters: RwLock<HashMap<Capability, Arc<dyn ProviderAdapter>>>,
    mock_mode: AtomicBool,
}

impl ProviderRouter {
    pub fn new(config: RouterConfig) -> Self {
        let adapters = Self::build_real_adapters(&config);
        Self {
            config,
            adapters: RwLock::new(adapters),
            mock_mode: AtomicBool::new(false),
        }
    }

    /// A router with every family mocked -- the deterministic test setup.
    pub fn mocked() -> Self {
        let router = Self::new(RouterConfig::default());
        router.set_mock_mode(true);
        router
    }

    /// Construct real adapters from configured credentials. Families
    /// without a key stay absent from the table.
    fn build_real_adapters(config: &RouterConfig) -> HashMap<Capability, Arc<dyn ProviderAdapter>> {
        let mut adapters: HashMap<Capability, Arc<dyn ProviderAdapter>> = HashMap::new();

        if let Some(ref key) = config.text_api_key {
            let base = config
                .text_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            adapters.insert(
                Capability::TextCompletion,
                Arc::new(TextAdapter::new(base).with_api_key(key.clone())),
            );
        }

        if let Some(ref key) = config.image_api_key {
            let base = config
                .image_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            adapters.insert(
                Capability::ImageGeneration,
                Arc::new(ImageAdapter::new(base).with_api_key(key.clone())),
            );
        }

        adapters
    }

    /// Every family resolves to a deterministic stub in mock mode.
    fn build_mock_adapters() -> HashMap<Capability, Arc<dyn ProviderAdapter>> {
        let mut adapters: HashMap<Capability, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            Capability::TextCompletion,
            Arc::new(MockAdapter::new(Capability::TextCompletion)),
        );
        adapters.insert(
            Capability::ImageGeneration,
            Arc::new(MockAdapter::new(Capability::ImageGeneration)),
        );
        adapters
    }

    /// Look up the capability family for a model identifier.
    pub fn family_for(&self, model: &str) -> Option<Capability> {
        if let Some(family) = self.config.extra_models.get(model) {
            return Some(*family);
        }
        MODEL_FAMILIES
            .iter()
            .find(|(m, _)| *m == model)
            .map(|(_, family)| *family)
    }

    /// Resolve a model to its adapter.
    ///
    /// Returns `None` both for unknown models and for families with no
    /// initialized adapter; the two cases are distinguished in logs, not
    /// in the return type.
    pub fn provider_for(&self, model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        let Some(family) = self.family_for(model) else {
            warn!(model, "no capability family known for model");
            return None;
        };

        let adapters = self.adapters.read().expect("adapter table lock poisoned");
        match adapters.get(&family) {
            Some(adapter) => Some(Arc::clone(adapter)),
            None => {
                warn!(
                    model,
                    family = family.as_str(),
                    "provider family not initialized (missing credential)"
                );
                None
            }
        }
    }

    /// Models whose family currently has an initialized adapter.
    pub fn available_models(&self) -> Vec<String> {
        let adapters = self.adapters.read().expect("adapter table lock poisoned");
        let mut models: Vec<String> = MODEL_FAMILIES
            .iter()
            .filter(|(_, family)| adapters.contains_key(family))
            .map(|(m, _)| m.to_string())
            .collect();
        for (model, family) in &self.config.extra_models {
            if adapters.contains_key(family) && !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Bind a custom adapter for one family, replacing whatever is
    /// installed. Used for scripted adapters in tests and for callers
    /// that bring their own backend.
    pub fn install_adapter(&self, family: Capability, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .write()
            .expect("adapter table lock poisoned")
            .insert(family, adapter);
    }

    /// Swap between the stub factory and real adapters.
    pub fn set_mock_mode(&self, enabled: bool) {
        let table = if enabled {
            Self::build_mock_adapters()
        } else {
            Self::build_real_adapters(&self.config)
        };
        *self.adapters.write().expect("adapter table lock poisoned") = table;
        self.mock_mode.store(enabled, Ordering::Relaxed);
        debug!(enabled, "mock mode switched");
    }

    pub fn is_mock_mode(&self) -> bool {
        self.mock_mode.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("mock_mode", &self.is_mock_mode())
            .field("available_models", &self.available_models().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> RouterConfig {
        RouterConfig {
            text_base_url: Some("https://text.example.com".into()),
            text_api_key: Some("tk".into()),
            image_base_url: Some("https://img.example.com".into()),
            image_api_key: Some("ik".into()),
            extra_models: HashMap::new(),
        }
    }

    #[test]
    fn test_unknown_model_resolves_none() {
        let router = ProviderRouter::new(full_config());
        assert!(router.provider_for("nonexistent-model").is_none());
    }

    #[test]
    fn test_unconfigured_family_resolves_none() {
        let config = RouterConfig {
            text_api_key: Some("tk".into()),
            ..RouterConfig::default()
        };
        let router = ProviderRouter::new(config);
        // Text family works, image family was never initialized.
        assert!(router.provider_for("gpt-4o").is_some());
        assert!(router.provider_for("dall-e-3").is_none());
    }

    #[test]
    fn test_available_models_tracks_initialized_families() {
        let config = RouterConfig {
            text_api_key: Some("tk".into()),
            ..RouterConfig::default()
        };
        let router = ProviderRouter::new(config);
        let models = router.available_models();
        assert!(models.contains(&"gpt-4o".to_string()));
        assert!(!models.contains(&"dall-e-3".to_string()));
    }

    #[test]
    fn test_mock_mode_resolves_every_known_model() {
        let router = ProviderRouter::mocked();
        assert!(router.is_mock_mode());
        let adapter = router.provider_for("gpt-4o").unwrap();
        assert_eq!(adapter.name(), "mock");
        let adapter = router.provider_for("dall-e-3").unwrap();
        assert_eq!(adapter.name(), "mock");
        // Unknown models still fail even in mock mode.
        assert!(router.provider_for("nonexistent").is_none());
    }

    #[test]
    fn test_disabling_mock_restores_real_adapters() {
        let router = ProviderRouter::new(full_config());
        router.set_mock_mode(true);
        assert_eq!(router.provider_for("gpt-4o").unwrap().name(), "mock");

        router.set_mock_mode(false);
        assert!(!router.is_mock_mode());
        assert_eq!(router.provider_for("gpt-4o").unwrap().name(), "text");
        assert_eq!(router.provider_for("sdxl").unwrap().name(), "image");
    }

    #[test]
    fn test_extra_models_routed() {
        let config = RouterConfig {
            text_api_key: Some("tk".into()),
            ..RouterConfig::default()
        }
        .with_model("studio-draft-1", Capability::TextCompletion);
        let router = ProviderRouter::new(config);
        assert!(router.provider_for("studio-draft-1").is_some());
        assert!(router
            .available_models()
            .contains(&"studio-draft-1".to_string()));
    }

    #[test]
    fn test_family_lookup() {
        let router = ProviderRouter::new(RouterConfig::default());
        assert_eq!(
            router.family_for("gpt-4o"),
            Some(Capability::TextCompletion)
        );
        assert_eq!(
            router.family_for("flux-pro"),
            Some(Capability::ImageGeneration)
        );
        assert_eq!(router.family_for("unknown"), None);
    }
}
