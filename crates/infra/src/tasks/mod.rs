//! Work functions behind each job kind.
//!
//! Every public entry point here runs on a Job Manager worker thread and
//! returns `anyhow::Result<()>`; the manager turns an `Err` into a failed job.
//! Internally each function works with [`TaskError`] so tests and callers can
//! downcast to the typed cause.

mod descriptions;
mod edit;
mod images;
mod material;
mod outline;

pub use descriptions::generate_descriptions;
pub use edit::edit_image;
pub use images::{ImageJobOptions, generate_images, generate_single_image};
pub use material::{MaterialRequest, generate_material};
pub use outline::generate_outline;

use std::sync::Arc;

use deckgen_ai::prompts::PromptContext;
use deckgen_ai::{AiError, Image, ImageGenerator, ImageOptions, ImageRef, TextGenerator};
use deckgen_core::{DomainError, JobId, OwnerId, Page, PageId, PageStatus, Project, ProjectId};

use crate::blob::{BlobError, BlobStore};
use crate::config::GenerationConfig;
use crate::jobs::Progress;
use crate::store::{Store, StoreError};
use crate::versions::VersionLedger;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("provider not configured: {0}")]
    ProviderConfig(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid outline: {0}")]
    Outline(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Ai(AiError),
}

impl TaskError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

impl From<AiError> for TaskError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::Config(msg) => TaskError::ProviderConfig(msg),
            other => TaskError::Ai(other),
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

/// The job a work function reports into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub owner: OwnerId,
    pub job_id: JobId,
}

impl JobRef {
    pub fn new(owner: OwnerId, job_id: JobId) -> Self {
        Self { owner, job_id }
    }
}

/// Everything a work function needs, shared by every job.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub text: Option<Arc<dyn TextGenerator>>,
    pub image: Option<Arc<dyn ImageGenerator>>,
    pub config: GenerationConfig,
}

impl core::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskContext")
            .field("text", &self.text.as_ref().map(|t| t.provider().to_string()))
            .field("image", &self.image.as_ref().map(|i| i.provider().to_string()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, config: GenerationConfig) -> Self {
        Self {
            store,
            blobs,
            text: None,
            image: None,
            config,
        }
    }

    pub fn with_text(mut self, text: Arc<dyn TextGenerator>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_image(mut self, image: Arc<dyn ImageGenerator>) -> Self {
        self.image = Some(image);
        self
    }

    pub(crate) fn text_generator(&self) -> TaskResult<&dyn TextGenerator> {
        self.text
            .as_deref()
            .ok_or_else(|| TaskError::ProviderConfig("no text generation provider configured".into()))
    }

    pub(crate) fn image_generator(&self) -> TaskResult<&dyn ImageGenerator> {
        self.image
            .as_deref()
            .ok_or_else(|| TaskError::ProviderConfig("no image generation provider configured".into()))
    }

    /// Image options with configured defaults filling the gaps.
    pub fn image_options(&self, aspect_ratio: Option<&str>, resolution: Option<&str>) -> ImageOptions {
        ImageOptions::new(
            aspect_ratio.unwrap_or(&self.config.default_aspect_ratio),
            resolution.unwrap_or(&self.config.default_resolution),
        )
    }

    pub(crate) fn ledger(&self) -> VersionLedger<Arc<dyn Store>> {
        VersionLedger::new(self.store.clone())
    }

    pub(crate) fn project(&self, owner: OwnerId, project_id: ProjectId) -> TaskResult<Project> {
        self.store
            .get_project(owner, project_id)?
            .ok_or_else(|| TaskError::NotFound(format!("project {project_id}")))
    }

    pub(crate) fn page(&self, owner: OwnerId, project_id: ProjectId, page_id: PageId) -> TaskResult<Page> {
        self.store
            .get_page(owner, page_id)?
            .filter(|p| p.project_id == project_id)
            .ok_or_else(|| TaskError::NotFound(format!("page {page_id}")))
    }

    /// Re-size the job to the unit count found at run time.
    pub(crate) fn begin(&self, job: JobRef, total: usize) -> TaskResult<()> {
        self.store.update_job(job.owner, job.job_id, &mut |j| {
            if j.progress.total != total {
                j.reset_progress(total);
            }
        })?;
        Ok(())
    }

    /// Persist a progress snapshot. Failures are logged; the unit already ran.
    pub(crate) fn report_progress(&self, job: JobRef, progress: Progress) {
        if let Err(e) = self
            .store
            .update_job(job.owner, job.job_id, &mut |j| {
                j.set_progress(progress);
            })
        {
            tracing::error!(job_id = %job.job_id, error = %e, "failed to persist job progress");
        }
    }

    pub(crate) fn mark_page(&self, owner: OwnerId, page_id: PageId, status: PageStatus) {
        if let Err(e) = self.store.update_page(owner, page_id, &mut |p| p.set_status(status)) {
            tracing::error!(page_id = %page_id, status = ?status, error = %e, "failed to update page status");
        }
    }

    pub(crate) fn load_image(&self, path: &str) -> TaskResult<Image> {
        Ok(Image::png(self.blobs.load(path)?))
    }

    /// Turn description image URLs into reference images. Links to our own
    /// `/files/` endpoint are loaded inline; anything else is passed by URL.
    pub(crate) fn resolve_refs(&self, urls: &[String]) -> Vec<ImageRef> {
        urls.iter()
            .filter_map(|url| match local_blob_path(url) {
                Some(path) => match self.load_image(path) {
                    Ok(image) => Some(ImageRef::Inline(image)),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "skipping unreadable reference image");
                        None
                    }
                },
                None => Some(ImageRef::Url(url.clone())),
            })
            .collect()
    }
}

fn local_blob_path(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("/files/")?;
    let path = rest.split_once('?').map_or(rest, |(path, _)| path);
    (!path.is_empty()).then_some(path)
}

pub(crate) fn prompt_context(project: &Project) -> PromptContext {
    PromptContext {
        idea_prompt: project.idea_prompt.clone(),
        outline_text: project.outline_text.clone(),
        extra_requirements: project.extra_requirements.clone(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::store::InMemoryStore;

    #[test]
    fn config_errors_map_to_provider_config() {
        let err: TaskError = AiError::config("missing api key").into();
        assert!(matches!(err, TaskError::ProviderConfig(_)));

        let err: TaskError = AiError::provider("503").into();
        assert!(matches!(err, TaskError::Ai(_)));
    }

    #[test]
    fn missing_capabilities_are_provider_config_errors() {
        let ctx = TaskContext::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            GenerationConfig::default(),
        );
        assert!(matches!(ctx.text_generator(), Err(TaskError::ProviderConfig(_))));
        assert!(matches!(ctx.image_generator(), Err(TaskError::ProviderConfig(_))));
    }

    #[test]
    fn image_options_fall_back_to_config() {
        let ctx = TaskContext::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            GenerationConfig::default(),
        );
        assert_eq!(ctx.image_options(None, None), ImageOptions::new("16:9", "2K"));
        assert_eq!(ctx.image_options(Some("4:3"), None), ImageOptions::new("4:3", "2K"));
    }

    #[test]
    fn local_file_links_resolve_inline() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        blobs.put("p/materials/m.png", vec![7]);
        let ctx = TaskContext::new(Arc::new(InMemoryStore::new()), blobs, GenerationConfig::default());

        let refs = ctx.resolve_refs(&[
            "/files/p/materials/m.png?expires=1".to_string(),
            "https://img.example/x.png".to_string(),
            "/files/missing.png".to_string(),
        ]);

        assert_eq!(refs.len(), 2);
        assert!(matches!(&refs[0], ImageRef::Inline(img) if img.bytes == vec![7]));
        assert!(matches!(&refs[1], ImageRef::Url(u) if u == "https://img.example/x.png"));
    }
}
