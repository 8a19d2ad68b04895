//! Historical image versions of a page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Owned};
use crate::id::{OwnerId, PageId, VersionId};

/// One generated image for a page. Exactly one version per page is current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub id: VersionId,
    pub page_id: PageId,
    pub owner: OwnerId,
    /// Positive, strictly increasing per page, starting at 1.
    pub version_number: u32,
    pub image_path: String,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

impl ArtifactVersion {
    pub fn new(owner: OwnerId, page_id: PageId, version_number: u32, image_path: impl Into<String>) -> Self {
        Self {
            id: VersionId::new(),
            page_id,
            owner,
            version_number,
            image_path: image_path.into(),
            is_current: true,
            created_at: Utc::now(),
        }
    }
}

impl Entity for ArtifactVersion {
    type Id = VersionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for ArtifactVersion {
    fn owner(&self) -> OwnerId {
        self.owner
    }
}
