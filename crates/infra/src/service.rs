//! Submit/poll surface over projects, jobs and versions.
//!
//! `submit_job` validates synchronously, creates the job record and hands the
//! work to the [`JobManager`]; callers poll [`GenerationService::get_job`] for
//! the outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use deckgen_core::{
    ArtifactVersion, CreationType, JobId, OwnerId, Page, PageId, Project, ProjectId, ProjectStatus, VersionId,
};

use crate::jobs::{Job, JobKind, JobManager, JobManagerConfig, JobManagerError, JobStatus, JobTarget, Progress};
use crate::store::StoreError;
use crate::tasks::{self, ImageJobOptions, JobRef, MaterialRequest, TaskContext};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("job submission failed: {0}")]
    Submit(#[from] JobManagerError),
}

impl ServiceError {
    fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// What to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    Outline,
    Descriptions {
        max_concurrency: Option<usize>,
    },
    Images(ImageJobOptions),
    SingleImage {
        page_id: PageId,
        force_regenerate: bool,
        options: ImageJobOptions,
    },
    EditImage {
        page_id: PageId,
        instruction: String,
        options: ImageJobOptions,
    },
    /// Material filed under the project given to `submit_job`.
    Material(MaterialRequest),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Outline => JobKind::Outline,
            JobRequest::Descriptions { .. } => JobKind::Descriptions,
            JobRequest::Images(_) => JobKind::Images,
            JobRequest::SingleImage { .. } => JobKind::SingleImage,
            JobRequest::EditImage { .. } => JobKind::EditImage,
            JobRequest::Material(_) => JobKind::Material,
        }
    }
}

/// Polling view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Progress,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            error: job.error.clone(),
            result: job.result.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Validated shape of a job about to be created.
struct Plan {
    target: JobTarget,
    total: usize,
    project_status: Option<ProjectStatus>,
}

pub struct GenerationService {
    ctx: TaskContext,
    jobs: Arc<JobManager>,
}

impl GenerationService {
    pub fn new(ctx: TaskContext, jobs: Arc<JobManager>) -> Self {
        Self { ctx, jobs }
    }

    /// Start a dedicated job manager sized from the context's configuration.
    pub fn start(ctx: TaskContext) -> Self {
        let config = JobManagerConfig::default().with_max_concurrent_jobs(ctx.config.max_concurrent_jobs);
        let jobs = Arc::new(JobManager::start(ctx.store.clone(), config));
        Self::new(ctx, jobs)
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.jobs
    }

    /// Validate `request` against the project, create the job and queue it.
    pub fn submit_job(&self, owner: OwnerId, project_id: ProjectId, request: JobRequest) -> ServiceResult<JobId> {
        let project = self.project(owner, project_id)?;
        let request = match request {
            JobRequest::Material(material) => JobRequest::Material(MaterialRequest {
                project_id: Some(project_id),
                ..material
            }),
            other => other,
        };
        let plan = self.plan(owner, &project, &request)?;
        self.launch(owner, request, plan)
    }

    /// Generate a material outside any project.
    pub fn submit_global_material(&self, owner: OwnerId, request: MaterialRequest) -> ServiceResult<JobId> {
        require_text(&request.prompt, "prompt")?;
        let request = JobRequest::Material(MaterialRequest {
            project_id: None,
            ..request
        });
        let plan = Plan {
            target: JobTarget::Global,
            total: 1,
            project_status: None,
        };
        self.launch(owner, request, plan)
    }

    pub fn get_job(&self, owner: OwnerId, job_id: JobId) -> ServiceResult<JobView> {
        self.ctx
            .store
            .get_job(owner, job_id)?
            .map(|job| JobView::from(&job))
            .ok_or_else(|| ServiceError::NotFound(format!("job {job_id}")))
    }

    pub fn is_job_active(&self, job_id: JobId) -> bool {
        self.jobs.is_active(job_id)
    }

    /// Versions of a page, newest first.
    pub fn list_versions(
        &self,
        owner: OwnerId,
        project_id: ProjectId,
        page_id: PageId,
    ) -> ServiceResult<Vec<ArtifactVersion>> {
        self.page(owner, project_id, page_id)?;
        Ok(self.ctx.ledger().list_versions(owner, page_id)?)
    }

    pub fn set_current_version(
        &self,
        owner: OwnerId,
        project_id: ProjectId,
        page_id: PageId,
        version_id: VersionId,
    ) -> ServiceResult<Page> {
        let page = self.ctx.ledger().set_current(owner, project_id, page_id, version_id)?;
        tracing::info!(page_id = %page_id, version_id = %version_id, "current version changed");
        Ok(page)
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub fn shutdown(&self) {
        self.jobs.shutdown();
    }

    fn project(&self, owner: OwnerId, project_id: ProjectId) -> ServiceResult<Project> {
        self.ctx
            .store
            .get_project(owner, project_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("project {project_id}")))
    }

    fn page(&self, owner: OwnerId, project_id: ProjectId, page_id: PageId) -> ServiceResult<Page> {
        self.ctx
            .store
            .get_page(owner, page_id)?
            .filter(|p| p.project_id == project_id)
            .ok_or_else(|| ServiceError::NotFound(format!("page {page_id}")))
    }

    fn plan(&self, owner: OwnerId, project: &Project, request: &JobRequest) -> ServiceResult<Plan> {
        let whole_project = |total, project_status| Plan {
            target: JobTarget::Project(project.id),
            total,
            project_status,
        };

        match request {
            JobRequest::Outline => {
                let (source, what) = match project.creation_type {
                    CreationType::Idea => (&project.idea_prompt, "idea prompt"),
                    CreationType::Outline => (&project.outline_text, "outline text"),
                };
                require_text(source.as_deref().unwrap_or_default(), what)?;
                Ok(whole_project(1, None))
            }
            JobRequest::Descriptions { .. } => {
                let pages = self.ctx.store.list_pages(owner, project.id)?;
                if pages.is_empty() {
                    return Err(ServiceError::validation("project has no pages; generate an outline first"));
                }
                if !project.status.accepts_descriptions() {
                    return Err(ServiceError::validation(format!(
                        "cannot generate descriptions while project is {:?}",
                        project.status
                    )));
                }
                Ok(whole_project(pages.len(), Some(ProjectStatus::GeneratingDescriptions)))
            }
            JobRequest::Images(_) => {
                let pages = self.ctx.store.list_pages(owner, project.id)?;
                if pages.is_empty() {
                    return Err(ServiceError::validation("project has no pages; generate an outline first"));
                }
                require_template(project)?;
                Ok(whole_project(pages.len(), Some(ProjectStatus::GeneratingImages)))
            }
            JobRequest::SingleImage {
                page_id,
                force_regenerate,
                ..
            } => {
                let page = self.page(owner, project.id, *page_id)?;
                require_template(project)?;
                if page.slot.description_text().is_none() {
                    return Err(ServiceError::validation(format!("page {page_id} has no description")));
                }
                if page.slot.image_path.is_some() && !force_regenerate {
                    return Err(ServiceError::validation(format!(
                        "page {page_id} already has an image; set force_regenerate to replace it"
                    )));
                }
                Ok(Plan {
                    target: JobTarget::Page {
                        project: project.id,
                        page: *page_id,
                    },
                    total: 1,
                    project_status: None,
                })
            }
            JobRequest::EditImage {
                page_id, instruction, ..
            } => {
                let page = self.page(owner, project.id, *page_id)?;
                require_text(instruction, "edit instruction")?;
                if page.slot.image_path.is_none() {
                    return Err(ServiceError::validation(format!("page {page_id} has no image to edit")));
                }
                Ok(Plan {
                    target: JobTarget::Page {
                        project: project.id,
                        page: *page_id,
                    },
                    total: 1,
                    project_status: None,
                })
            }
            JobRequest::Material(material) => {
                require_text(&material.prompt, "prompt")?;
                Ok(whole_project(1, None))
            }
        }
    }

    fn launch(&self, owner: OwnerId, request: JobRequest, plan: Plan) -> ServiceResult<JobId> {
        let kind = request.kind();
        let job = Job::new(owner, kind, plan.target, plan.total);
        let job_id = job.id;
        self.ctx.store.insert_job(job)?;

        let mut previous_status = None;
        if let (Some(project_id), Some(status)) = (plan.target.project_id(), plan.project_status) {
            self.ctx.store.update_project(owner, project_id, &mut |p| {
                previous_status = Some(p.status);
                p.set_status(status);
            })?;
        }

        let ctx = self.ctx.clone();
        let project_id = plan.target.project_id();
        let submitted = self.jobs.submit(owner, job_id, move |job_id| {
            let job = JobRef::new(owner, job_id);
            match (request, project_id) {
                (JobRequest::Outline, Some(project_id)) => tasks::generate_outline(&ctx, job, project_id),
                (JobRequest::Descriptions { max_concurrency }, Some(project_id)) => {
                    tasks::generate_descriptions(&ctx, job, project_id, max_concurrency)
                }
                (JobRequest::Images(options), Some(project_id)) => {
                    tasks::generate_images(&ctx, job, project_id, &options)
                }
                (JobRequest::SingleImage { page_id, options, .. }, Some(project_id)) => {
                    tasks::generate_single_image(&ctx, job, project_id, page_id, &options)
                }
                (
                    JobRequest::EditImage {
                        page_id,
                        instruction,
                        options,
                    },
                    Some(project_id),
                ) => tasks::edit_image(&ctx, job, project_id, page_id, &instruction, &options),
                (JobRequest::Material(material), _) => tasks::generate_material(&ctx, job, &material),
                (request, None) => anyhow::bail!("{} job requires a project", request.kind()),
            }
        });

        if let Err(e) = submitted {
            tracing::error!(job_id = %job_id, kind = %kind, error = %e, "job submission failed");
            let reason = e.to_string();
            if let Err(store_err) = self.ctx.store.update_job(owner, job_id, &mut |j| {
                j.mark_failed(reason.clone());
            }) {
                tracing::error!(job_id = %job_id, error = %store_err, "could not mark unsubmitted job failed");
            }
            if let (Some(project_id), Some(status)) = (plan.target.project_id(), previous_status) {
                if let Err(store_err) = self.ctx.store.update_project(owner, project_id, &mut |p| p.set_status(status)) {
                    tracing::error!(project_id = %project_id, error = %store_err, "could not restore project status");
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job_id,
            kind = %kind,
            total = plan.total,
            "job submitted"
        );
        Ok(job_id)
    }
}

impl core::fmt::Debug for GenerationService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GenerationService")
            .field("ctx", &self.ctx)
            .field("jobs", &self.jobs)
            .finish()
    }
}

fn require_text(value: &str, what: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(format!("{what} is required")));
    }
    Ok(())
}

fn require_template(project: &Project) -> ServiceResult<()> {
    if project.template_image_path.is_none() {
        return Err(ServiceError::validation("project has no template image"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use deckgen_core::{CreationType, PageStatus};

    use crate::store::Store;
    use crate::tasks::fakes::{FakeImage, FakeText, Fixture};

    fn service(fx: &Fixture) -> GenerationService {
        GenerationService::start(fx.ctx())
    }

    fn wait_for(service: &GenerationService, owner: OwnerId, job_id: JobId) -> JobView {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let view = service.get_job(owner, job_id).unwrap();
            if view.status.is_terminal() && !service.is_job_active(job_id) {
                return view;
            }
            assert!(Instant::now() < deadline, "job {job_id} did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn outline_then_descriptions() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let service = service(&fx);

        let outline = service.submit_job(fx.owner, fx.project_id, JobRequest::Outline).unwrap();
        assert_eq!(wait_for(&service, fx.owner, outline).status, JobStatus::Completed);

        let descriptions = service
            .submit_job(
                fx.owner,
                fx.project_id,
                JobRequest::Descriptions {
                    max_concurrency: Some(2),
                },
            )
            .unwrap();
        let view = wait_for(&service, fx.owner, descriptions);

        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(
            view.progress,
            Progress {
                total: 3,
                completed: 3,
                failed: 0
            }
        );
        assert_eq!(fx.project().status, ProjectStatus::DescriptionsGenerated);
    }

    #[test]
    fn descriptions_need_pages() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let service = service(&fx);

        let err = service
            .submit_job(fx.owner, fx.project_id, JobRequest::Descriptions { max_concurrency: None })
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(fx.project().status, ProjectStatus::Draft);
    }

    #[test]
    fn descriptions_refused_while_generating_images() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        fx.seed_pages();
        fx.store
            .update_project(fx.owner, fx.project_id, &mut |p| p.set_status(ProjectStatus::GeneratingImages))
            .unwrap();
        let service = service(&fx);

        let err = service
            .submit_job(fx.owner, fx.project_id, JobRequest::Descriptions { max_concurrency: None })
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn outline_project_needs_outline_text() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let project = Project::new(fx.owner, CreationType::Outline);
        let project_id = project.id;
        fx.store.insert_project(project).unwrap();
        let service = service(&fx);

        let err = service.submit_job(fx.owner, project_id, JobRequest::Outline).unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn other_owners_projects_are_not_found() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let service = service(&fx);

        let err = service
            .submit_job(OwnerId::new(), fx.project_id, JobRequest::Outline)
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn single_image_respects_force_regenerate() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let pages = fx.seed_pages();
        fx.describe_all();
        fx.store
            .update_page(fx.owner, pages[0].id, &mut |p| p.set_image("old.png"))
            .unwrap();
        let service = service(&fx);

        let request = |force_regenerate| JobRequest::SingleImage {
            page_id: pages[0].id,
            force_regenerate,
            options: ImageJobOptions::default(),
        };
        let err = service.submit_job(fx.owner, fx.project_id, request(false)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let job_id = service.submit_job(fx.owner, fx.project_id, request(true)).unwrap();
        let view = wait_for(&service, fx.owner, job_id);

        assert_eq!(view.status, JobStatus::Completed);
        let page = fx.store.get_page(fx.owner, pages[0].id).unwrap().unwrap();
        assert_eq!(page.slot.status, PageStatus::Completed);
        assert_ne!(page.slot.image_path.as_deref(), Some("old.png"));
    }

    #[test]
    fn failed_work_is_reported_through_the_job() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new().failing_on("Intro"));
        let pages = fx.seed_pages();
        fx.describe_all();
        let service = service(&fx);

        let job_id = service
            .submit_job(
                fx.owner,
                fx.project_id,
                JobRequest::SingleImage {
                    page_id: pages[0].id,
                    force_regenerate: false,
                    options: ImageJobOptions::default(),
                },
            )
            .unwrap();
        let view = wait_for(&service, fx.owner, job_id);

        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.unwrap().contains("scripted failure"));
        assert!(view.completed_at.is_some());
    }

    #[test]
    fn submit_after_shutdown_fails_the_job() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let service = service(&fx);
        service.shutdown();

        let err = service.submit_job(fx.owner, fx.project_id, JobRequest::Outline).unwrap_err();

        assert!(matches!(err, ServiceError::Submit(JobManagerError::ShutDown)));
    }

    #[test]
    fn failed_submit_leaves_project_status_unchanged() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        fx.seed_pages();
        let service = service(&fx);
        service.shutdown();

        let err = service
            .submit_job(fx.owner, fx.project_id, JobRequest::Descriptions { max_concurrency: Some(2) })
            .unwrap_err();

        assert!(matches!(err, ServiceError::Submit(JobManagerError::ShutDown)));
        assert_eq!(fx.project().status, ProjectStatus::Draft);

        let retry = self::service(&fx);
        let job_id = retry
            .submit_job(fx.owner, fx.project_id, JobRequest::Descriptions { max_concurrency: Some(2) })
            .unwrap();
        assert_eq!(wait_for(&retry, fx.owner, job_id).status, JobStatus::Completed);
    }

    #[test]
    fn global_material_targets_no_project() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let service = service(&fx);

        let job_id = service
            .submit_global_material(
                fx.owner,
                MaterialRequest {
                    prompt: "an icon".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let view = wait_for(&service, fx.owner, job_id);

        assert_eq!(view.status, JobStatus::Completed);
        assert!(view.result.unwrap()["relative_path"].as_str().unwrap().starts_with("global/"));
        let job = fx.store.get_job(fx.owner, job_id).unwrap().unwrap();
        assert_eq!(job.target, JobTarget::Global);
    }
}
