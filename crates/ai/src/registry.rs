use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::{ImageGenerator, TextGenerator};
use crate::providers::openai_compatible::{self, OpenAiCompatible};
use crate::result::AiError;

/// Connection settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Registry tag, e.g. `openai_compatible`.
    pub provider: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            api_key: api_key.into(),
            base_url: None,
            model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl core::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

type TextFactory = Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn TextGenerator>, AiError> + Send + Sync>;
type ImageFactory = Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn ImageGenerator>, AiError> + Send + Sync>;

/// Constructs capability implementations from a string tag.
///
/// Adding a vendor means implementing the capability traits and registering a
/// constructor here; nothing else branches on the vendor.
#[derive(Default)]
pub struct ProviderRegistry {
    text: HashMap<String, TextFactory>,
    image: HashMap<String, ImageFactory>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in vendor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_text(openai_compatible::TAG, |cfg| {
            Ok(Arc::new(OpenAiCompatible::new(cfg)?) as Arc<dyn TextGenerator>)
        });
        registry.register_image(openai_compatible::TAG, |cfg| {
            Ok(Arc::new(OpenAiCompatible::new(cfg)?) as Arc<dyn ImageGenerator>)
        });
        registry
    }

    pub fn register_text<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn TextGenerator>, AiError> + Send + Sync + 'static,
    {
        self.text.insert(tag.into(), Box::new(factory));
    }

    pub fn register_image<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn ImageGenerator>, AiError> + Send + Sync + 'static,
    {
        self.image.insert(tag.into(), Box::new(factory));
    }

    pub fn create_text(&self, cfg: &ProviderConfig) -> Result<Arc<dyn TextGenerator>, AiError> {
        let factory = self
            .text
            .get(&cfg.provider)
            .ok_or_else(|| AiError::config(format!("unknown text provider '{}'", cfg.provider)))?;
        ensure_api_key(cfg)?;
        factory(cfg)
    }

    pub fn create_image(&self, cfg: &ProviderConfig) -> Result<Arc<dyn ImageGenerator>, AiError> {
        let factory = self
            .image
            .get(&cfg.provider)
            .ok_or_else(|| AiError::config(format!("unknown image provider '{}'", cfg.provider)))?;
        ensure_api_key(cfg)?;
        factory(cfg)
    }

    /// Registered text provider tags, sorted.
    pub fn text_providers(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.text.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Registered image provider tags, sorted.
    pub fn image_providers(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.image.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

fn ensure_api_key(cfg: &ProviderConfig) -> Result<(), AiError> {
    if cfg.api_key.trim().is_empty() {
        return Err(AiError::config(format!("api key for '{}' is not configured", cfg.provider)));
    }
    Ok(())
}
