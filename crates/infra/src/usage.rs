//! Token usage accounting.
//!
//! One record per successful AI-backed unit. Recording is best effort: a
//! failed write is logged and never fails the unit that produced it.

use deckgen_core::{OwnerId, UsageRecord};

use crate::store::{Store, StoreResult};

/// Persist a usage record. Returns whether the write succeeded.
pub fn record<S: Store + ?Sized>(
    store: &S,
    owner: OwnerId,
    topic: impl Into<String>,
    result_path: Option<&str>,
    tokens: u64,
) -> bool {
    let mut usage = UsageRecord::new(owner, topic, tokens);
    if let Some(path) = result_path {
        usage = usage.with_result_path(path);
    }
    match store.record_usage(usage) {
        Ok(()) => {
            tracing::debug!(owner = %owner, tokens, "usage recorded");
            true
        }
        Err(e) => {
            tracing::error!(owner = %owner, tokens, error = %e, "failed to record usage");
            false
        }
    }
}

/// Sum of tokens recorded for an owner.
pub fn total_tokens<S: Store + ?Sized>(store: &S, owner: OwnerId) -> StoreResult<u64> {
    Ok(store.list_usage(owner)?.iter().map(|r| r.tokens_used).sum())
}
