use thiserror::Error;

/// Output of a single AI call together with the tokens it consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    /// Provider-reported token usage (0 when the provider does not report it).
    pub usage_tokens: u64,
}

impl<T> Generated<T> {
    pub fn new(value: T, usage_tokens: u64) -> Self {
        Self { value, usage_tokens }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        Generated {
            value: f(self.value),
            usage_tokens: self.usage_tokens,
        }
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    /// No usable provider for the requested capability (unknown tag, missing key, ...).
    #[error("provider configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider answered, but with an error.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned no content")]
    EmptyResponse,
}

impl AiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}
