//! Flattened page records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Owned};
use crate::id::{OwnerId, PageId, ProjectId};
use crate::outline::PageOutline;

/// Per-page generation status.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageStatus {
    #[default]
    Draft,
    DescriptionGenerated,
    Generating,
    Completed,
    Failed,
}

/// Generated description text for a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionContent {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

impl DescriptionContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generated_at: Utc::now(),
        }
    }
}

/// One flattened, ordered page: outline, description and image state.
///
/// `order_index` is assigned once when the outline is flattened and never
/// changes afterwards, regardless of the order generation work completes in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSlot {
    pub order_index: usize,
    pub part: Option<String>,
    pub outline_content: Option<PageOutline>,
    pub description_content: Option<DescriptionContent>,
    pub image_path: Option<String>,
    pub status: PageStatus,
}

impl PageSlot {
    pub fn draft(order_index: usize, part: Option<String>, outline: PageOutline) -> Self {
        Self {
            order_index,
            part,
            outline_content: Some(outline),
            description_content: None,
            image_path: None,
            status: PageStatus::Draft,
        }
    }

    /// Description text, if one was generated and is non-blank.
    pub fn description_text(&self) -> Option<&str> {
        self.description_content
            .as_ref()
            .map(|d| d.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Persisted page: a [`PageSlot`] plus identity and ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub project_id: ProjectId,
    pub owner: OwnerId,
    #[serde(flatten)]
    pub slot: PageSlot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(project_id: ProjectId, owner: OwnerId, slot: PageSlot) -> Self {
        let now = Utc::now();
        Self {
            id: PageId::new(),
            project_id,
            owner,
            slot,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: PageStatus) {
        self.slot.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_description(&mut self, content: DescriptionContent) {
        self.slot.description_content = Some(content);
        self.slot.status = PageStatus::DescriptionGenerated;
        self.updated_at = Utc::now();
    }

    /// Point the page at a generated image and mark it complete.
    pub fn set_image(&mut self, path: impl Into<String>) {
        self.slot.image_path = Some(path.into());
        self.slot.status = PageStatus::Completed;
        self.updated_at = Utc::now();
    }
}

impl Entity for Page {
    type Id = PageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Page {
    fn owner(&self) -> OwnerId {
        self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_description_is_treated_as_missing() {
        let mut slot = PageSlot::draft(0, None, PageOutline::new("Intro", ["a"]));
        assert_eq!(slot.description_text(), None);

        slot.description_content = Some(DescriptionContent::new("   "));
        assert_eq!(slot.description_text(), None);

        slot.description_content = Some(DescriptionContent::new("Welcome"));
        assert_eq!(slot.description_text(), Some("Welcome"));
    }

    #[test]
    fn page_serializes_slot_fields_inline() {
        let page = Page::new(
            ProjectId::new(),
            OwnerId::new(),
            PageSlot::draft(2, Some("Body".into()), PageOutline::new("P1", ["b"])),
        );
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["order_index"], 2);
        assert_eq!(json["part"], "Body");
        assert_eq!(json["status"], "DRAFT");
    }
}
