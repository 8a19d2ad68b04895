//! `deckgen-ai`
//!
//! **Responsibility:** AI provider boundary.
//!
//! The orchestration core only depends on two capability traits:
//! - [`TextGenerator`] for outline/description text
//! - [`ImageGenerator`] for page/material images and edits
//!
//! Vendors implement these traits and are selected at runtime through the
//! [`ProviderRegistry`], keyed by a string tag.

pub mod capability;
pub mod markdown;
pub mod prompts;
pub mod providers;
pub mod registry;
pub mod result;

pub use capability::{Image, ImageGenerator, ImageOptions, ImageRef, TextGenerator};
pub use registry::{ProviderConfig, ProviderRegistry};
pub use result::{AiError, Generated};
