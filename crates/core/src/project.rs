//! Presentation project record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Owned};
use crate::id::{OwnerId, ProjectId};

/// How the project's outline is obtained.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationType {
    /// Outline is generated from a free-form idea prompt.
    #[default]
    Idea,
    /// Outline is parsed out of user-provided outline text.
    Outline,
}

/// Project-level lifecycle status.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    #[default]
    Draft,
    OutlineGenerated,
    GeneratingDescriptions,
    DescriptionsGenerated,
    GeneratingImages,
    Completed,
}

impl ProjectStatus {
    /// Statuses from which a description batch may be started.
    pub fn accepts_descriptions(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Draft | ProjectStatus::OutlineGenerated | ProjectStatus::DescriptionsGenerated
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner: OwnerId,
    pub creation_type: CreationType,
    pub idea_prompt: Option<String>,
    pub outline_text: Option<String>,
    pub extra_requirements: Option<String>,
    /// Blob path of the style template used as the reference image.
    pub template_image_path: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(owner: OwnerId, creation_type: CreationType) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            owner,
            creation_type,
            idea_prompt: None,
            outline_text: None,
            extra_requirements: None,
            template_image_path: None,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_idea_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.idea_prompt = Some(prompt.into());
        self
    }

    pub fn with_outline_text(mut self, text: impl Into<String>) -> Self {
        self.outline_text = Some(text.into());
        self
    }

    pub fn with_extra_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.extra_requirements = Some(requirements.into());
        self
    }

    pub fn with_template(mut self, path: impl Into<String>) -> Self {
        self.template_image_path = Some(path.into());
        self
    }

    pub fn set_status(&mut self, status: ProjectStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

impl Entity for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Project {
    fn owner(&self) -> OwnerId {
        self.owner
    }
}
