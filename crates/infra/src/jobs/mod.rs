//! Background generation jobs.
//!
//! ## Components
//!
//! - `Job`: persisted record with status, progress and error/result
//! - `JobManager`: worker pool that owns the job lifecycle and the registry of
//!   active jobs
//!
//! Jobs are polled through the store; there is no push notification.

pub mod manager;
pub mod types;

pub use manager::{JobManager, JobManagerConfig, JobManagerError, JobManagerStats, JobWork};
pub use types::{Job, JobKind, JobStatus, JobTarget, Progress};
