//! Owner-scoped document store boundary.
//!
//! ## Design
//!
//! - Every read and write names the owner; records of other owners are
//!   invisible (reads return `None`, writes return `NotFound`)
//! - Updates take a closure that runs under the store's write lock, so each
//!   read-modify-write is atomic with respect to other writers
//! - Version operations that touch several records (append, set current) are
//!   a single batch

use std::sync::Arc;

use deckgen_core::{
    ArtifactVersion, JobId, Material, OwnerId, Page, PageId, Project, ProjectId, UsageRecord, VersionId,
};

use crate::jobs::Job;

mod in_memory;

pub use in_memory::InMemoryStore;

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(what: impl core::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for projects, pages, jobs, image versions, materials and usage.
pub trait Store: Send + Sync {
    fn insert_project(&self, project: Project) -> StoreResult<()>;

    fn get_project(&self, owner: OwnerId, project_id: ProjectId) -> StoreResult<Option<Project>>;

    fn update_project(
        &self,
        owner: OwnerId,
        project_id: ProjectId,
        f: &mut dyn FnMut(&mut Project),
    ) -> StoreResult<Project>;

    fn insert_page(&self, page: Page) -> StoreResult<()>;

    /// Drop every page of the project and insert `pages` in one write.
    fn replace_pages(&self, owner: OwnerId, project_id: ProjectId, pages: Vec<Page>) -> StoreResult<()>;

    fn get_page(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Option<Page>>;

    /// Pages of a project ordered by `order_index`.
    fn list_pages(&self, owner: OwnerId, project_id: ProjectId) -> StoreResult<Vec<Page>>;

    fn update_page(&self, owner: OwnerId, page_id: PageId, f: &mut dyn FnMut(&mut Page)) -> StoreResult<Page>;

    fn insert_job(&self, job: Job) -> StoreResult<()>;

    fn get_job(&self, owner: OwnerId, job_id: JobId) -> StoreResult<Option<Job>>;

    fn update_job(&self, owner: OwnerId, job_id: JobId, f: &mut dyn FnMut(&mut Job)) -> StoreResult<Job>;

    /// Versions of a page, newest (highest number) first.
    fn list_versions(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Vec<ArtifactVersion>>;

    /// Insert a version numbered `count + 1`, make it current and clear the
    /// previous current flag, all in one write.
    fn append_version(&self, owner: OwnerId, page_id: PageId, image_path: &str) -> StoreResult<ArtifactVersion>;

    /// Flip the current flag to `version_id` in one batch. Unknown versions and
    /// versions of another page are `NotFound`.
    fn set_current_version(
        &self,
        owner: OwnerId,
        page_id: PageId,
        version_id: VersionId,
    ) -> StoreResult<ArtifactVersion>;

    fn insert_material(&self, material: Material) -> StoreResult<()>;

    /// Materials of a project, or global materials when `project_id` is `None`.
    fn list_materials(&self, owner: OwnerId, project_id: Option<ProjectId>) -> StoreResult<Vec<Material>>;

    fn record_usage(&self, record: UsageRecord) -> StoreResult<()>;

    /// Usage records of an owner, newest first.
    fn list_usage(&self, owner: OwnerId) -> StoreResult<Vec<UsageRecord>>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn insert_project(&self, project: Project) -> StoreResult<()> {
        (**self).insert_project(project)
    }

    fn get_project(&self, owner: OwnerId, project_id: ProjectId) -> StoreResult<Option<Project>> {
        (**self).get_project(owner, project_id)
    }

    fn update_project(
        &self,
        owner: OwnerId,
        project_id: ProjectId,
        f: &mut dyn FnMut(&mut Project),
    ) -> StoreResult<Project> {
        (**self).update_project(owner, project_id, f)
    }

    fn insert_page(&self, page: Page) -> StoreResult<()> {
        (**self).insert_page(page)
    }

    fn replace_pages(&self, owner: OwnerId, project_id: ProjectId, pages: Vec<Page>) -> StoreResult<()> {
        (**self).replace_pages(owner, project_id, pages)
    }

    fn get_page(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Option<Page>> {
        (**self).get_page(owner, page_id)
    }

    fn list_pages(&self, owner: OwnerId, project_id: ProjectId) -> StoreResult<Vec<Page>> {
        (**self).list_pages(owner, project_id)
    }

    fn update_page(&self, owner: OwnerId, page_id: PageId, f: &mut dyn FnMut(&mut Page)) -> StoreResult<Page> {
        (**self).update_page(owner, page_id, f)
    }

    fn insert_job(&self, job: Job) -> StoreResult<()> {
        (**self).insert_job(job)
    }

    fn get_job(&self, owner: OwnerId, job_id: JobId) -> StoreResult<Option<Job>> {
        (**self).get_job(owner, job_id)
    }

    fn update_job(&self, owner: OwnerId, job_id: JobId, f: &mut dyn FnMut(&mut Job)) -> StoreResult<Job> {
        (**self).update_job(owner, job_id, f)
    }

    fn list_versions(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Vec<ArtifactVersion>> {
        (**self).list_versions(owner, page_id)
    }

    fn append_version(&self, owner: OwnerId, page_id: PageId, image_path: &str) -> StoreResult<ArtifactVersion> {
        (**self).append_version(owner, page_id, image_path)
    }

    fn set_current_version(
        &self,
        owner: OwnerId,
        page_id: PageId,
        version_id: VersionId,
    ) -> StoreResult<ArtifactVersion> {
        (**self).set_current_version(owner, page_id, version_id)
    }

    fn insert_material(&self, material: Material) -> StoreResult<()> {
        (**self).insert_material(material)
    }

    fn list_materials(&self, owner: OwnerId, project_id: Option<ProjectId>) -> StoreResult<Vec<Material>> {
        (**self).list_materials(owner, project_id)
    }

    fn record_usage(&self, record: UsageRecord) -> StoreResult<()> {
        (**self).record_usage(record)
    }

    fn list_usage(&self, owner: OwnerId) -> StoreResult<Vec<UsageRecord>> {
        (**self).list_usage(owner)
    }
}
