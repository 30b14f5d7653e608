//! # Group Tags
//!
//! Groups are bare integers to the store. The registry hands out
//! contiguous, named ranges of them so callers can say "the 4 enemy
//! groups" and diagnostics can print a name instead of a number.
//!
//! Tags carry no storage semantics.

use std::fmt;

use super::egid::GroupId;

/// A contiguous, named block of groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupRange {
    name: &'static str,
    start: GroupId,
    len: u32,
}

impl GroupRange {
    /// The tag name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// First group of the range.
    #[inline]
    #[must_use]
    pub const fn first(&self) -> GroupId {
        self.start
    }

    /// Number of groups in the range.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Checks if the range is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `index`-th group of the range.
    #[must_use]
    pub fn group(&self, index: u32) -> Option<GroupId> {
        (index < self.len).then(|| self.start.offset(index))
    }

    /// Checks whether `group` belongs to the range.
    #[inline]
    #[must_use]
    pub fn contains(&self, group: GroupId) -> bool {
        group >= self.start && group.0 - self.start.0 < self.len
    }

    /// Every group of the range, in order.
    pub fn groups(&self) -> impl Iterator<Item = GroupId> {
        let start = self.start;
        (0..self.len).map(move |index| start.offset(index))
    }
}

impl fmt::Display for GroupRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.name, self.start.0, self.start.0 + self.len)
    }
}

/// Allocates named group ranges.
#[derive(Clone, Debug, Default)]
pub struct GroupRegistry {
    next: u32,
    ranges: Vec<GroupRange>,
}

impl GroupRegistry {
    /// Creates a registry starting at group 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose first range starts at `first`.
    ///
    /// Groups below `first` stay free for callers that pick ids by hand.
    #[must_use]
    pub fn starting_at(first: GroupId) -> Self {
        Self {
            next: first.0,
            ranges: Vec::new(),
        }
    }

    /// Reserves `count` consecutive groups tagged `name`.
    ///
    /// Returns `None` if the group id space is exhausted.
    pub fn reserve(&mut self, name: &'static str, count: u32) -> Option<GroupRange> {
        let end = self.next.checked_add(count)?;
        let range = GroupRange {
            name,
            start: GroupId(self.next),
            len: count,
        };
        self.next = end;
        self.ranges.push(range);
        Some(range)
    }

    /// The range containing `group`.
    #[must_use]
    pub fn range_of(&self, group: GroupId) -> Option<&GroupRange> {
        // Ranges are allocated in ascending order.
        let index = self
            .ranges
            .partition_point(|range| range.start.0 + range.len <= group.0);
        self.ranges.get(index).filter(|range| range.contains(group))
    }

    /// The tag of `group`, if it was reserved here.
    #[must_use]
    pub fn name_of(&self, group: GroupId) -> Option<&'static str> {
        self.range_of(group).map(GroupRange::name)
    }

    /// Every reserved range, in allocation order.
    #[must_use]
    pub fn ranges(&self) -> &[GroupRange] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_are_contiguous() {
        let mut registry = GroupRegistry::new();
        let players = registry.reserve("players", 2).unwrap();
        let enemies = registry.reserve("enemies", 4).unwrap();

        assert_eq!(players.first(), GroupId(0));
        assert_eq!(enemies.first(), GroupId(2));
        assert_eq!(enemies.group(3), Some(GroupId(5)));
        assert_eq!(enemies.group(4), None);
        assert_eq!(enemies.groups().count(), 4);
    }

    #[test]
    fn test_name_lookup() {
        let mut registry = GroupRegistry::starting_at(GroupId(100));
        registry.reserve("visible", 1).unwrap();
        registry.reserve("hidden", 3).unwrap();

        assert_eq!(registry.name_of(GroupId(100)), Some("visible"));
        assert_eq!(registry.name_of(GroupId(103)), Some("hidden"));
        assert_eq!(registry.name_of(GroupId(104)), None);
        assert_eq!(registry.name_of(GroupId(3)), None);
    }

    #[test]
    fn test_empty_range_contains_nothing() {
        let mut registry = GroupRegistry::new();
        let empty = registry.reserve("none", 0).unwrap();
        assert!(empty.is_empty());
        assert!(!empty.contains(GroupId(0)));
        assert_eq!(registry.name_of(GroupId(0)), None);
    }

    #[test]
    fn test_exhaustion() {
        let mut registry = GroupRegistry::starting_at(GroupId(u32::MAX - 1));
        assert!(registry.reserve("last", 1).is_some());
        assert!(registry.reserve("overflow", 2).is_none());
    }
}
