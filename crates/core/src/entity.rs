//! Entity traits: identity + owner scoping.

use crate::id::OwnerId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity visible only to a single owner.
///
/// Stores filter every read and write by this owner.
pub trait Owned: Entity {
    fn owner(&self) -> OwnerId;
}
