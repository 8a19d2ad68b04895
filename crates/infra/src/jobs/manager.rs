//! Background job manager.
//!
//! A fixed pool of named worker threads pulls submitted work from a shared
//! queue. The manager owns the job lifecycle: it marks a job `Processing`,
//! runs the work with panics caught, then writes the terminal status. The
//! active-job registry entry is released only after that write.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use deckgen_core::{JobId, OwnerId};

use crate::fan_out::panic_message;
use crate::store::Store;

/// Work run for a job. Any error (or panic) fails the job.
pub type JobWork = Box<dyn FnOnce(JobId) -> anyhow::Result<()> + Send + 'static>;

/// Job manager configuration.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Worker threads, clamped to at least 1.
    pub max_concurrent_jobs: usize,
    /// Thread-name prefix and log field.
    pub name: String,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            name: "job-manager".to_string(),
        }
    }
}

impl JobManagerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobManagerError {
    #[error("job {0} is already active")]
    AlreadyActive(JobId),
    #[error("job manager is shut down")]
    ShutDown,
}

/// Manager runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobManagerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_panicked: u64,
    pub current_running: usize,
}

struct QueuedJob {
    owner: OwnerId,
    job_id: JobId,
    work: JobWork,
}

type Registry = Arc<Mutex<HashSet<JobId>>>;

/// Removes a job from the active registry when dropped.
struct RegistryGuard {
    registry: Registry,
    job_id: JobId,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

pub struct JobManager {
    name: String,
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    registry: Registry,
    stats: Arc<Mutex<JobManagerStats>>,
}

impl JobManager {
    /// Spawn the worker pool.
    pub fn start<S: Store + 'static>(store: S, config: JobManagerConfig) -> Self {
        let store = Arc::new(store);
        let (tx, rx) = mpsc::channel::<QueuedJob>();
        let rx = Arc::new(Mutex::new(rx));
        let registry: Registry = Arc::default();
        let stats = Arc::new(Mutex::new(JobManagerStats::default()));

        let size = config.max_concurrent_jobs.max(1);
        let mut workers = Vec::with_capacity(size);
        for n in 0..size {
            let ctx = WorkerContext {
                manager: config.name.clone(),
                store: store.clone(),
                queue: rx.clone(),
                registry: registry.clone(),
                stats: stats.clone(),
            };
            match thread::Builder::new()
                .name(format!("{}-{n}", config.name))
                .spawn(move || worker_loop(ctx))
            {
                Ok(handle) => workers.push(handle),
                Err(e) => error!(manager = %config.name, worker = n, error = %e, "failed to spawn job worker"),
            }
        }
        info!(manager = %config.name, workers = workers.len(), "job manager started");

        Self {
            name: config.name,
            sender: Mutex::new((!workers.is_empty()).then_some(tx)),
            workers: Mutex::new(workers),
            registry,
            stats,
        }
    }

    /// Queue `work` for `job_id` and return immediately.
    ///
    /// The job record must already exist in the store.
    pub fn submit<F>(&self, owner: OwnerId, job_id: JobId, work: F) -> Result<(), JobManagerError>
    where
        F: FnOnce(JobId) -> anyhow::Result<()> + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(JobManagerError::ShutDown);
        };

        if !self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id)
        {
            return Err(JobManagerError::AlreadyActive(job_id));
        }

        let queued = QueuedJob {
            owner,
            job_id,
            work: Box::new(work),
        };
        if sender.send(queued).is_err() {
            self.registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&job_id);
            return Err(JobManagerError::ShutDown);
        }
        debug!(manager = %self.name, job_id = %job_id, "job queued");
        Ok(())
    }

    /// True from submit until the job's terminal status has been written.
    pub fn is_active(&self, job_id: JobId) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&job_id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn stats(&self) -> JobManagerStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stop accepting work and wait for the workers. Jobs already queued still
    /// run to completion.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(manager = %self.name, "job worker exited with a panic");
            }
        }
        info!(manager = %self.name, "job manager stopped");
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobManager")
            .field("name", &self.name)
            .field("active", &self.active_count())
            .finish()
    }
}

struct WorkerContext<S> {
    manager: String,
    store: Arc<S>,
    queue: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    registry: Registry,
    stats: Arc<Mutex<JobManagerStats>>,
}

fn worker_loop<S: Store>(ctx: WorkerContext<S>) {
    loop {
        let next = ctx.queue.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(queued) = next else {
            break;
        };
        run_job(&ctx, queued);
    }
    debug!(manager = %ctx.manager, "job worker stopped");
}

fn run_job<S: Store>(ctx: &WorkerContext<S>, queued: QueuedJob) {
    let QueuedJob { owner, job_id, work } = queued;
    // Declared first so it drops last, after the terminal write.
    let _registered = RegistryGuard {
        registry: ctx.registry.clone(),
        job_id,
    };

    if let Err(e) = ctx.store.update_job(owner, job_id, &mut |job| {
        job.mark_processing();
    }) {
        warn!(manager = %ctx.manager, job_id = %job_id, error = %e, "could not mark job processing");
    }
    ctx.stats.lock().unwrap_or_else(PoisonError::into_inner).current_running += 1;

    let started = Instant::now();
    let mut panicked = false;
    let failure = match panic::catch_unwind(AssertUnwindSafe(|| work(job_id))) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(payload) => {
            panicked = true;
            Some(format!("job panicked: {}", panic_message(payload.as_ref())))
        }
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let written = ctx.store.update_job(owner, job_id, &mut |job| match &failure {
        None => {
            job.mark_completed();
        }
        Some(message) => {
            job.mark_failed(message.clone());
        }
    });
    if let Err(e) = written {
        error!(manager = %ctx.manager, job_id = %job_id, error = %e, "could not record job outcome");
    }

    {
        let mut stats = ctx.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.current_running = stats.current_running.saturating_sub(1);
        stats.jobs_processed += 1;
        match (&failure, panicked) {
            (None, _) => stats.jobs_succeeded += 1,
            (Some(_), true) => {
                stats.jobs_failed += 1;
                stats.jobs_panicked += 1;
            }
            (Some(_), false) => stats.jobs_failed += 1,
        }
    }

    match &failure {
        None => info!(manager = %ctx.manager, job_id = %job_id, elapsed_ms, "job completed"),
        Some(message) => warn!(
            manager = %ctx.manager,
            job_id = %job_id,
            elapsed_ms,
            error = %message,
            "job failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::Context;
    use deckgen_core::ProjectId;

    use crate::jobs::{Job, JobKind, JobStatus, JobTarget};
    use crate::store::InMemoryStore;

    fn setup(workers: usize) -> (Arc<InMemoryStore>, JobManager) {
        let store = Arc::new(InMemoryStore::new());
        let manager = JobManager::start(
            store.clone(),
            JobManagerConfig::default()
                .with_name("test-jobs")
                .with_max_concurrent_jobs(workers),
        );
        (store, manager)
    }

    fn new_job(store: &InMemoryStore, owner: OwnerId) -> JobId {
        let job = Job::new(owner, JobKind::Outline, JobTarget::Project(ProjectId::new()), 1);
        let id = job.id;
        store.insert_job(job).unwrap();
        id
    }

    fn wait_idle(manager: &JobManager, job_id: JobId) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.is_active(job_id) {
            assert!(Instant::now() < deadline, "job {job_id} did not finish");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn successful_work_completes_the_job() {
        let (store, manager) = setup(2);
        let owner = OwnerId::new();
        let id = new_job(&store, owner);

        manager.submit(owner, id, |_| Ok(())).unwrap();
        wait_idle(&manager, id);

        let job = store.get_job(owner, id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());
        assert_eq!(manager.stats().jobs_succeeded, 1);
    }

    #[test]
    fn error_fails_the_job_with_its_context_chain() {
        let (store, manager) = setup(1);
        let owner = OwnerId::new();
        let id = new_job(&store, owner);

        manager
            .submit(owner, id, |_| {
                Err(anyhow::anyhow!("quota exceeded")).context("generating outline")
            })
            .unwrap();
        wait_idle(&manager, id);

        let job = store.get_job(owner, id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("generating outline: quota exceeded"));
    }

    #[test]
    fn panic_fails_the_job_and_releases_the_registry() {
        let (store, manager) = setup(1);
        let owner = OwnerId::new();
        let id = new_job(&store, owner);

        manager.submit(owner, id, |_| panic!("out of cheese")).unwrap();
        wait_idle(&manager, id);

        let job = store.get_job(owner, id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("out of cheese"));
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.stats().jobs_panicked, 1);

        // The worker survives the panic.
        let next = new_job(&store, owner);
        manager.submit(owner, next, |_| Ok(())).unwrap();
        wait_idle(&manager, next);
        assert_eq!(store.get_job(owner, next).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn duplicate_submission_is_rejected_while_active() {
        let (store, manager) = setup(1);
        let owner = OwnerId::new();
        let id = new_job(&store, owner);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        manager
            .submit(owner, id, move |_| {
                release_rx.recv().ok();
                Ok(())
            })
            .unwrap();
        assert!(manager.is_active(id));
        assert_eq!(
            manager.submit(owner, id, |_| Ok(())),
            Err(JobManagerError::AlreadyActive(id))
        );

        release_tx.send(()).unwrap();
        wait_idle(&manager, id);
        assert!(!manager.is_active(id));
    }

    #[test]
    fn work_observes_processing_status() {
        let (store, manager) = setup(1);
        let owner = OwnerId::new();
        let id = new_job(&store, owner);
        let (seen_tx, seen_rx) = mpsc::channel();

        let probe = store.clone();
        manager
            .submit(owner, id, move |job_id| {
                let status = probe.get_job(owner, job_id)?.map(|j| j.status);
                seen_tx.send(status).ok();
                Ok(())
            })
            .unwrap();

        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(JobStatus::Processing)
        );
    }

    #[test]
    fn terminal_status_is_written_before_release() {
        let (store, manager) = setup(4);
        let owner = OwnerId::new();
        let ids: Vec<JobId> = (0..16).map(|_| new_job(&store, owner)).collect();

        for (n, id) in ids.iter().enumerate() {
            manager
                .submit(owner, *id, move |_| {
                    thread::sleep(Duration::from_millis(2));
                    if n % 3 == 0 { anyhow::bail!("unit {n}") } else { Ok(()) }
                })
                .unwrap();
        }

        for id in &ids {
            wait_idle(&manager, *id);
            assert!(store.get_job(owner, *id).unwrap().unwrap().status.is_terminal());
        }
    }

    #[test]
    fn shutdown_drains_queue_and_rejects_new_work() {
        let (store, manager) = setup(1);
        let owner = OwnerId::new();
        let ids: Vec<JobId> = (0..3).map(|_| new_job(&store, owner)).collect();
        for id in &ids {
            manager
                .submit(owner, *id, |_| {
                    thread::sleep(Duration::from_millis(5));
                    Ok(())
                })
                .unwrap();
        }

        manager.shutdown();

        for id in &ids {
            assert_eq!(store.get_job(owner, *id).unwrap().unwrap().status, JobStatus::Completed);
        }
        assert_eq!(
            manager.submit(owner, new_job(&store, owner), |_| Ok(())),
            Err(JobManagerError::ShutDown)
        );
        assert_eq!(manager.active_count(), 0);
    }
}
