//! In-memory store for tests/dev.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use deckgen_core::{
    ArtifactVersion, Entity, JobId, Material, OwnerId, Owned, Page, PageId, Project, ProjectId, UsageRecord,
    VersionId,
};

use super::{Store, StoreError, StoreResult};
use crate::jobs::Job;

/// Lock order when more than one is held: projects, pages, versions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
    pages: RwLock<HashMap<PageId, Page>>,
    jobs: RwLock<HashMap<JobId, Job>>,
    versions: RwLock<HashMap<PageId, Vec<ArtifactVersion>>>,
    materials: RwLock<Vec<Material>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn insert_new<K, E>(map: &mut HashMap<K, E>, kind: &str, entity: E) -> StoreResult<()>
where
    K: Eq + Hash + Display + Clone,
    E: Owned<Id = K>,
{
    if map.contains_key(entity.id()) {
        return Err(StoreError::AlreadyExists(format!("{kind} {}", entity.id())));
    }
    map.insert(entity.id().clone(), entity);
    Ok(())
}

/// Look up `id`, hiding records that belong to another owner.
fn owned<'a, K, E>(map: &'a HashMap<K, E>, owner: OwnerId, id: &K) -> Option<&'a E>
where
    K: Eq + Hash,
    E: Owned,
{
    map.get(id).filter(|e| e.owner() == owner)
}

fn owned_mut<'a, K, E>(map: &'a mut HashMap<K, E>, owner: OwnerId, id: &K, kind: &str) -> StoreResult<&'a mut E>
where
    K: Eq + Hash + Display,
    E: Owned,
{
    map.get_mut(id)
        .filter(|e| e.owner() == owner)
        .ok_or_else(|| StoreError::not_found(format!("{kind} {id}")))
}

impl Store for InMemoryStore {
    fn insert_project(&self, project: Project) -> StoreResult<()> {
        insert_new(&mut *write(&self.projects), "project", project)
    }

    fn get_project(&self, owner: OwnerId, project_id: ProjectId) -> StoreResult<Option<Project>> {
        Ok(owned(&*read(&self.projects), owner, &project_id).cloned())
    }

    fn update_project(
        &self,
        owner: OwnerId,
        project_id: ProjectId,
        f: &mut dyn FnMut(&mut Project),
    ) -> StoreResult<Project> {
        let mut projects = write(&self.projects);
        let project = owned_mut(&mut *projects, owner, &project_id, "project")?;
        f(project);
        Ok(project.clone())
    }

    fn insert_page(&self, page: Page) -> StoreResult<()> {
        insert_new(&mut *write(&self.pages), "page", page)
    }

    fn replace_pages(&self, owner: OwnerId, project_id: ProjectId, new_pages: Vec<Page>) -> StoreResult<()> {
        let projects = read(&self.projects);
        if owned(&*projects, owner, &project_id).is_none() {
            return Err(StoreError::not_found(format!("project {project_id}")));
        }
        if let Some(stray) = new_pages
            .iter()
            .find(|p| p.project_id != project_id || p.owner != owner)
        {
            return Err(StoreError::Storage(format!(
                "page {} does not belong to project {project_id}",
                stray.id
            )));
        }

        let mut pages = write(&self.pages);
        let removed: Vec<PageId> = pages
            .values()
            .filter(|p| p.project_id == project_id)
            .map(|p| p.id)
            .collect();
        for id in &removed {
            pages.remove(id);
        }
        for page in new_pages {
            pages.insert(page.id, page);
        }

        let mut versions = write(&self.versions);
        for id in &removed {
            versions.remove(id);
        }
        Ok(())
    }

    fn get_page(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Option<Page>> {
        Ok(owned(&*read(&self.pages), owner, &page_id).cloned())
    }

    fn list_pages(&self, owner: OwnerId, project_id: ProjectId) -> StoreResult<Vec<Page>> {
        let mut pages: Vec<Page> = read(&self.pages)
            .values()
            .filter(|p| p.owner == owner && p.project_id == project_id)
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.slot.order_index);
        Ok(pages)
    }

    fn update_page(&self, owner: OwnerId, page_id: PageId, f: &mut dyn FnMut(&mut Page)) -> StoreResult<Page> {
        let mut pages = write(&self.pages);
        let page = owned_mut(&mut *pages, owner, &page_id, "page")?;
        f(page);
        Ok(page.clone())
    }

    fn insert_job(&self, job: Job) -> StoreResult<()> {
        insert_new(&mut *write(&self.jobs), "job", job)
    }

    fn get_job(&self, owner: OwnerId, job_id: JobId) -> StoreResult<Option<Job>> {
        Ok(owned(&*read(&self.jobs), owner, &job_id).cloned())
    }

    fn update_job(&self, owner: OwnerId, job_id: JobId, f: &mut dyn FnMut(&mut Job)) -> StoreResult<Job> {
        let mut jobs = write(&self.jobs);
        let job = owned_mut(&mut *jobs, owner, &job_id, "job")?;
        f(job);
        Ok(job.clone())
    }

    fn list_versions(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Vec<ArtifactVersion>> {
        let mut versions: Vec<ArtifactVersion> = read(&self.versions)
            .get(&page_id)
            .map(|vs| vs.iter().filter(|v| v.owner() == owner).cloned().collect())
            .unwrap_or_default();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    fn append_version(&self, owner: OwnerId, page_id: PageId, image_path: &str) -> StoreResult<ArtifactVersion> {
        let pages = read(&self.pages);
        if owned(&*pages, owner, &page_id).is_none() {
            return Err(StoreError::not_found(format!("page {page_id}")));
        }

        let mut versions = write(&self.versions);
        let list = versions.entry(page_id).or_default();
        let number = u32::try_from(list.len() + 1)
            .map_err(|_| StoreError::Storage(format!("version count overflow on page {page_id}")))?;
        for v in list.iter_mut() {
            v.is_current = false;
        }
        let version = ArtifactVersion::new(owner, page_id, number, image_path);
        list.push(version.clone());
        Ok(version)
    }

    fn set_current_version(
        &self,
        owner: OwnerId,
        page_id: PageId,
        version_id: VersionId,
    ) -> StoreResult<ArtifactVersion> {
        let mut versions = write(&self.versions);
        let list = versions
            .get_mut(&page_id)
            .filter(|vs| vs.iter().any(|v| v.id == version_id && v.owner() == owner))
            .ok_or_else(|| StoreError::not_found(format!("version {version_id} of page {page_id}")))?;

        let mut target = None;
        for v in list.iter_mut() {
            v.is_current = v.id == version_id;
            if v.is_current {
                target = Some(v.clone());
            }
        }
        target.ok_or_else(|| StoreError::not_found(format!("version {version_id}")))
    }

    fn insert_material(&self, material: Material) -> StoreResult<()> {
        let mut materials = write(&self.materials);
        if materials.iter().any(|m| m.id() == material.id()) {
            return Err(StoreError::AlreadyExists(format!("material {}", material.id)));
        }
        materials.push(material);
        Ok(())
    }

    fn list_materials(&self, owner: OwnerId, project_id: Option<ProjectId>) -> StoreResult<Vec<Material>> {
        Ok(read(&self.materials)
            .iter()
            .filter(|m| m.owner() == owner && m.project_id == project_id)
            .cloned()
            .collect())
    }

    fn record_usage(&self, record: UsageRecord) -> StoreResult<()> {
        write(&self.usage).push(record);
        Ok(())
    }

    fn list_usage(&self, owner: OwnerId) -> StoreResult<Vec<UsageRecord>> {
        let mut records: Vec<UsageRecord> = read(&self.usage)
            .iter()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(records)
    }
}
