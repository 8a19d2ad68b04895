//! Job records and their lifecycle rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use deckgen_core::{Entity, JobId, OwnerId, Owned, PageId, ProjectId};

/// What a job generates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Outline,
    Descriptions,
    Images,
    SingleImage,
    EditImage,
    Material,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Outline => "outline",
            JobKind::Descriptions => "descriptions",
            JobKind::Images => "images",
            JobKind::SingleImage => "single_image",
            JobKind::EditImage => "edit_image",
            JobKind::Material => "material",
        }
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
///
/// `Pending -> Processing -> {Completed | Failed}`; a pending job may also fail
/// directly when it could not be scheduled.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// The record a job works on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum JobTarget {
    Project(ProjectId),
    Page { project: ProjectId, page: PageId },
    Global,
}

impl JobTarget {
    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            JobTarget::Project(id) => Some(*id),
            JobTarget::Page { project, .. } => Some(*project),
            JobTarget::Global => None,
        }
    }
}

/// Unit counters for a job. `completed + failed <= total` always holds.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
        }
    }

    pub fn resolved(&self) -> usize {
        self.completed + self.failed
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.resolved())
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }

    /// Count one success. Returns `false` (and changes nothing) when every unit
    /// is already resolved.
    pub fn record_success(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.completed += 1;
        true
    }

    /// Count one failure, with the same bound as [`Progress::record_success`].
    pub fn record_failure(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.failed += 1;
        true
    }
}

/// A background generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: OwnerId,
    pub target: JobTarget,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Progress,
    pub error: Option<String>,
    /// Kind-specific output (the material job stores `{url, relative_path}`).
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(owner: OwnerId, kind: JobKind, target: JobTarget, total: usize) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner,
            target,
            kind,
            status: JobStatus::Pending,
            progress: Progress::new(total),
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move to `next` if the lifecycle allows it. Backward or repeated
    /// transitions are refused and logged.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                job_id = %self.id,
                from = ?self.status,
                to = ?next,
                "refused job status transition"
            );
            return false;
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        true
    }

    pub fn mark_processing(&mut self) -> bool {
        self.transition(JobStatus::Processing)
    }

    pub fn mark_completed(&mut self) -> bool {
        self.transition(JobStatus::Completed)
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        let moved = self.transition(JobStatus::Failed);
        if moved {
            self.error = Some(error.into());
        }
        moved
    }

    /// Replace the counters, keeping `total` fixed once set.
    pub fn set_progress(&mut self, progress: Progress) -> bool {
        if progress.total != self.progress.total || progress.resolved() > progress.total {
            tracing::warn!(
                job_id = %self.id,
                current = ?self.progress,
                proposed = ?progress,
                "refused progress update"
            );
            return false;
        }
        self.progress = progress;
        self.updated_at = Utc::now();
        true
    }

    /// Re-size the job before any unit has resolved.
    pub fn reset_progress(&mut self, total: usize) -> bool {
        if self.progress.resolved() > 0 {
            return false;
        }
        self.progress = Progress::new(total);
        self.updated_at = Utc::now();
        true
    }

    pub fn set_result(&mut self, result: serde_json::Value) {
        self.result = Some(result);
        self.updated_at = Utc::now();
    }
}

impl Entity for Job {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Job {
    fn owner(&self) -> OwnerId {
        self.owner
    }
}
