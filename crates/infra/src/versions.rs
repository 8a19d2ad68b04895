//! Per-page image version ledger.
//!
//! Every generated or edited image of a page is kept as a numbered version;
//! exactly one version per page is current, and the page's `image_path`
//! follows it.

use chrono::Utc;

use deckgen_core::{ArtifactVersion, OwnerId, Page, PageId, ProjectId, VersionId};

use crate::store::{Store, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct VersionLedger<S> {
    store: S,
}

impl<S: Store> VersionLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record `image_path` as the newest version of the page and make it current.
    pub fn create_version(&self, owner: OwnerId, page_id: PageId, image_path: &str) -> StoreResult<ArtifactVersion> {
        let version = self.store.append_version(owner, page_id, image_path)?;
        tracing::debug!(
            page_id = %page_id,
            version = version.version_number,
            "image version created"
        );
        Ok(version)
    }

    /// Make `version_id` current, then point the page's `image_path` at it.
    pub fn set_current(
        &self,
        owner: OwnerId,
        project_id: ProjectId,
        page_id: PageId,
        version_id: VersionId,
    ) -> StoreResult<Page> {
        self.store
            .get_page(owner, page_id)?
            .filter(|p| p.project_id == project_id)
            .ok_or_else(|| StoreError::not_found(format!("page {page_id}")))?;

        let target = self.store.set_current_version(owner, page_id, version_id)?;
        self.store.update_page(owner, page_id, &mut |page| {
            page.slot.image_path = Some(target.image_path.clone());
            page.updated_at = Utc::now();
        })
    }

    /// Newest first.
    pub fn list_versions(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Vec<ArtifactVersion>> {
        self.store.list_versions(owner, page_id)
    }

    pub fn current(&self, owner: OwnerId, page_id: PageId) -> StoreResult<Option<ArtifactVersion>> {
        Ok(self
            .store
            .list_versions(owner, page_id)?
            .into_iter()
            .find(|v| v.is_current))
    }
}
