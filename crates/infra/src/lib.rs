//! Infrastructure layer: stores, blob storage, job orchestration, generation work.
//!
//! - `store` / `blob`: owner-scoped document store and blob storage boundaries
//! - `fan_out`: bounded-concurrency fan-out/fan-in over a list of items
//! - `jobs`: job records and the background [`JobManager`](jobs::JobManager)
//! - `versions`: per-page image version ledger
//! - `tasks`: the work function behind each job kind
//! - `service`: the submit/poll surface callers use

pub mod blob;
pub mod config;
pub mod fan_out;
pub mod jobs;
pub mod service;
pub mod store;
pub mod tasks;
pub mod usage;
pub mod versions;

pub use blob::{BlobError, BlobStore, InMemoryBlobStore, LocalBlobStore};
pub use config::GenerationConfig;
pub use fan_out::{FanOut, FanOutReport, ItemError, ProgressCounter};
pub use jobs::{Job, JobKind, JobManager, JobManagerConfig, JobManagerError, JobStatus, JobTarget, Progress};
pub use service::{GenerationService, JobRequest, JobView, ServiceError, ServiceResult};
pub use store::{InMemoryStore, Store, StoreError, StoreResult};
pub use tasks::{ImageJobOptions, JobRef, MaterialRequest, TaskContext, TaskError};
pub use versions::VersionLedger;
