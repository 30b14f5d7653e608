//! # Database Error Types
//!
//! All errors that can surface from the entity database.
//!
//! None of these are retried internally. `CyclicSubmission` and
//! `CapacityExceeded` are configuration errors: the fix is in engine logic
//! or consumer sizing, not in catching and continuing.

use std::fmt;

use thiserror::Error;

use crate::ecs::{ComponentId, Egid, EntityId, GroupId};
use crate::sync::OperationTrace;

/// What a failed lookup was looking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityLookup {
    /// A specific entity row.
    Entity(Egid),
    /// The single entity of a component type expected in a group.
    Unique {
        /// The group that was searched.
        group: GroupId,
        /// Name of the component type.
        component: &'static str,
    },
}

impl fmt::Display for EntityLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(egid) => write!(f, "{egid}"),
            Self::Unique { group, component } => write!(f, "unique `{component}` in {group}"),
        }
    }
}

/// Errors that can occur in the entity database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// A lookup expected a row that does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityLookup),

    /// An entity was built or moved onto an EGID that is already occupied.
    #[error("entity already exists: {egid}")]
    DuplicateEntity {
        /// The occupied EGID.
        egid: Egid,
    },

    /// A stream consumer's ring buffer was full when a value was published.
    #[error("consumer `{consumer}` is full (capacity {capacity})")]
    CapacityExceeded {
        /// Name of the consumer that overflowed.
        consumer: String,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// The submission loop did not settle within its iteration bound.
    #[error(
        "entity submission did not settle after {iterations} iterations: \
         a reactive engine keeps enqueuing structural changes"
    )]
    CyclicSubmission {
        /// Iterations executed before giving up.
        iterations: u32,
    },

    /// An operation was requested in an order the database cannot honour.
    #[error("invalid operation ordering on {egid}: {reason}")]
    InvalidOperationOrdering {
        /// The EGID the operation targeted.
        egid: Egid,
        /// What was wrong with the ordering.
        reason: &'static str,
    },

    /// A unique query found more than one match.
    #[error("expected exactly one `{component}` in {group}, found {count}")]
    MultipleUniqueEntities {
        /// The group that was searched.
        group: GroupId,
        /// Name of the component type.
        component: &'static str,
        /// How many entities were found.
        count: usize,
    },

    /// A pending operation failed while being applied; the commit was aborted.
    #[error("submission of {operation} requested at {trace} failed: {source}")]
    SubmissionFailed {
        /// Description of the failing operation.
        operation: String,
        /// Where and when the operation was requested.
        trace: OperationTrace,
        /// The underlying failure.
        #[source]
        source: Box<DbError>,
    },

    /// A descriptor names a component that the registry does not know.
    #[error("component `{name}` is not registered")]
    UnregisteredComponent {
        /// Name of the component type.
        name: &'static str,
    },

    /// Two component types declare the same id.
    #[error("component id {id} is claimed by both `{existing}` and `{incoming}`")]
    ComponentIdCollision {
        /// The contested id.
        id: ComponentId,
        /// The type registered first.
        existing: &'static str,
        /// The type that tried to register second.
        incoming: &'static str,
    },

    /// A table was accessed as the wrong component type.
    #[error("table of `{expected}` accessed as `{found}`")]
    ComponentTypeMismatch {
        /// The type stored in the table.
        expected: &'static str,
        /// The type it was accessed as.
        found: &'static str,
    },

    /// Invalid configuration value or file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DbError {
    /// Shorthand for a missing entity row.
    #[must_use]
    pub fn not_found(egid: Egid) -> Self {
        Self::EntityNotFound(EntityLookup::Entity(egid))
    }

    /// Returns `true` for errors caused by caller configuration or engine
    /// logic rather than by the data being operated on.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::CyclicSubmission { .. }
            | Self::CapacityExceeded { .. }
            | Self::ComponentIdCollision { .. }
            | Self::UnregisteredComponent { .. }
            | Self::InvalidConfig(_) => true,
            Self::SubmissionFailed { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }

    /// Returns the innermost error, unwrapping `SubmissionFailed` layers.
    #[must_use]
    pub fn root_cause(&self) -> &DbError {
        match self {
            Self::SubmissionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Row-level failures reported by type-erased tables.
///
/// Tables do not know which group they belong to; the group store attaches
/// the group when turning these into [`DbError`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableError {
    /// The entity has no row in the table.
    Missing(EntityId),
    /// The entity already has a row in the table.
    Occupied(EntityId),
    /// Two tables of different component types were combined.
    TypeMismatch {
        /// The type stored in the table.
        expected: &'static str,
        /// The type it was combined with.
        found: &'static str,
    },
}

impl TableError {
    /// Converts into a [`DbError`] for a table living in `group`.
    #[must_use]
    pub fn in_group(self, group: GroupId) -> DbError {
        match self {
            Self::Missing(entity) => DbError::not_found(Egid::new(entity, group)),
            Self::Occupied(entity) => DbError::DuplicateEntity {
                egid: Egid::new(entity, group),
            },
            Self::TypeMismatch { expected, found } => {
                DbError::ComponentTypeMismatch { expected, found }
            }
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_flagged() {
        assert!(DbError::CyclicSubmission { iterations: 5 }.is_configuration_error());
        assert!(DbError::CapacityExceeded {
            consumer: "render".into(),
            capacity: 2
        }
        .is_configuration_error());
        assert!(!DbError::not_found(Egid::new(EntityId(1), GroupId(2))).is_configuration_error());
    }

    #[test]
    fn test_table_error_attaches_group() {
        let err = TableError::Occupied(EntityId(7)).in_group(GroupId(3));
        assert_eq!(
            err,
            DbError::DuplicateEntity {
                egid: Egid::new(EntityId(7), GroupId(3))
            }
        );
    }

    #[test]
    fn test_display_mentions_lookup() {
        let err = DbError::not_found(Egid::new(EntityId(4), GroupId(9)));
        let text = err.to_string();
        assert!(text.contains("entity not found"));
        assert!(text.contains('4'));
    }
}
