//! Vendor implementations of the capability traits.

pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatible;
