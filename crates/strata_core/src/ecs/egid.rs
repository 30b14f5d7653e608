//! # Entity Identity
//!
//! An entity has no standalone record. It is addressed by an [`Egid`]:
//! - Lower 32 bits: the entity id
//! - Upper 32 bits: the group the entity currently lives in
//!
//! Moving an entity to another group changes its `Egid`.

use std::fmt;

/// Caller-assigned entity identifier, unique within a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

/// Caller-assigned partition of entities; the unit of bulk structural changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct GroupId(pub u32);

impl GroupId {
    /// Returns the group `offset` places after this one.
    ///
    /// Used by group ranges to address their members.
    #[inline]
    #[must_use]
    pub const fn offset(self, offset: u32) -> Self {
        Self(self.0 + offset)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// Entity id + group id: globally locates one entity's rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Egid {
    entity: EntityId,
    group: GroupId,
}

impl Egid {
    /// Creates an EGID from its parts.
    #[inline]
    #[must_use]
    pub const fn new(entity: EntityId, group: GroupId) -> Self {
        Self { entity, group }
    }

    /// Creates an EGID from raw ids.
    #[inline]
    #[must_use]
    pub const fn from_raw(entity: u32, group: u32) -> Self {
        Self::new(EntityId(entity), GroupId(group))
    }

    /// Returns the entity portion.
    #[inline]
    #[must_use]
    pub const fn entity(self) -> EntityId {
        self.entity
    }

    /// Returns the group portion.
    #[inline]
    #[must_use]
    pub const fn group(self) -> GroupId {
        self.group
    }

    /// The same entity id placed in another group.
    #[inline]
    #[must_use]
    pub const fn with_group(self, group: GroupId) -> Self {
        Self::new(self.entity, group)
    }

    /// Packs the EGID into a single `u64` (group in the upper half).
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.group.0 as u64) << 32) | (self.entity.0 as u64)
    }

    /// Unpacks an EGID produced by [`Egid::to_bits`].
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_bits(bits: u64) -> Self {
        Self::from_raw(bits as u32, (bits >> 32) as u32)
    }
}

impl fmt::Display for Egid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.entity, self.group)
    }
}
