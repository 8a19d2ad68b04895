//! Standalone generated material images.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Owned};
use crate::id::{MaterialId, OwnerId, ProjectId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub owner: OwnerId,
    /// `None` for materials outside any project.
    pub project_id: Option<ProjectId>,
    pub filename: String,
    pub relative_path: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Material {
    pub fn new(
        owner: OwnerId,
        project_id: Option<ProjectId>,
        relative_path: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let relative_path = relative_path.into();
        let filename = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path.as_str())
            .to_string();
        Self {
            id: MaterialId::new(),
            owner,
            project_id,
            filename,
            relative_path,
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Material {
    fn owner(&self) -> OwnerId {
        self.owner
    }
}
