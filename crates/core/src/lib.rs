//! Domain building blocks for presentation generation.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the persisted record shapes, and the outline transformer.

pub mod entity;
pub mod error;
pub mod id;
pub mod material;
pub mod outline;
pub mod page;
pub mod project;
pub mod usage;
pub mod version;

pub use entity::{Entity, Owned};
pub use error::{DomainError, DomainResult};
pub use id::{JobId, MaterialId, OwnerId, PageId, ProjectId, VersionId};
pub use material::Material;
pub use outline::{OutlineNode, PageOutline, PartOutline, flatten, outline_text, parse_outline_json, reconstruct};
pub use page::{DescriptionContent, Page, PageSlot, PageStatus};
pub use project::{CreationType, Project, ProjectStatus};
pub use usage::UsageRecord;
pub use version::ArtifactVersion;
