//! Generation tuning knobs.

use std::str::FromStr;
use std::time::Duration;

/// Pool sizes and image defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Job Manager worker threads.
    pub max_concurrent_jobs: usize,
    /// Fan-out limit for description jobs.
    pub max_description_workers: usize,
    /// Fan-out limit for image jobs.
    pub max_image_workers: usize,
    pub default_aspect_ratio: String,
    pub default_resolution: String,
    pub signed_url_ttl: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_description_workers: 5,
            max_image_workers: 8,
            default_aspect_ratio: "16:9".to_string(),
            default_resolution: "2K".to_string(),
            signed_url_ttl: Duration::from_secs(3600),
        }
    }
}

impl GenerationConfig {
    /// Defaults overridden by `MAX_CONCURRENT_JOBS`, `MAX_DESCRIPTION_WORKERS`,
    /// `MAX_IMAGE_WORKERS`, `DEFAULT_ASPECT_RATIO` and `DEFAULT_RESOLUTION`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: parse_positive(&lookup, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            max_description_workers: parse_positive(
                &lookup,
                "MAX_DESCRIPTION_WORKERS",
                defaults.max_description_workers,
            ),
            max_image_workers: parse_positive(&lookup, "MAX_IMAGE_WORKERS", defaults.max_image_workers),
            default_aspect_ratio: lookup("DEFAULT_ASPECT_RATIO")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_aspect_ratio),
            default_resolution: lookup("DEFAULT_RESOLUTION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_resolution),
            signed_url_ttl: defaults.signed_url_ttl,
        }
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n;
        self
    }

    pub fn with_max_description_workers(mut self, n: usize) -> Self {
        self.max_description_workers = n;
        self
    }

    pub fn with_max_image_workers(mut self, n: usize) -> Self {
        self.max_image_workers = n;
        self
    }
}

fn parse_positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => v,
        _ => {
            tracing::warn!(key, value = %raw, default = %default, "ignoring invalid configuration value");
            default
        }
    }
}
