//! Capability interfaces the generation core depends on.

use crate::result::{AiError, Generated};

/// Encoded image bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Image {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }
}

impl core::fmt::Debug for Image {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Image")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Extra reference image: either already loaded, or a URL the provider fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Inline(Image),
    Url(String),
}

/// Output shape requested from an image provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    pub aspect_ratio: String,
    pub resolution: String,
}

impl ImageOptions {
    pub fn new(aspect_ratio: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            aspect_ratio: aspect_ratio.into(),
            resolution: resolution.into(),
        }
    }
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self::new("16:9", "2K")
    }
}

/// Text generation capability.
///
/// Calls are blocking; the caller's worker thread is occupied for the full call.
pub trait TextGenerator: Send + Sync + 'static {
    /// Tag the provider was registered under (for logs).
    fn provider(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<Generated<String>, AiError>;
}

/// Image generation and editing capability.
pub trait ImageGenerator: Send + Sync + 'static {
    fn provider(&self) -> &str;

    fn generate(
        &self,
        prompt: &str,
        reference: Option<&Image>,
        extra_refs: &[ImageRef],
        options: &ImageOptions,
    ) -> Result<Generated<Image>, AiError>;

    fn edit(
        &self,
        prompt: &str,
        current: &Image,
        extra_refs: &[ImageRef],
        options: &ImageOptions,
    ) -> Result<Generated<Image>, AiError>;
}
