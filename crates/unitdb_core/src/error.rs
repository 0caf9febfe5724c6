//! Error types for UnitDB core.

use crate::types::UnitOfWorkId;
use thiserror::Error;
use unitdb_store::StoreError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad category of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A mandatory property is unset and has no usable default.
    Configuration,
    /// The operation is not allowed in the current lifecycle state.
    IllegalState,
    /// A storage transaction failed and was rolled back.
    Commit,
    /// The entity model was used inconsistently.
    ModelRuntime,
    /// A value was vetoed by a constraint.
    Constraint,
    /// A store operation outside a commit failed.
    Store,
    /// The unit of work was closed while an operation was in flight.
    Cancelled,
}

/// Errors that can occur in UnitDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Mandatory property unset with no default.
    #[error("configuration error on {entity_type}.{property}: {message}")]
    Configuration {
        /// Entity type.
        entity_type: String,
        /// Property name.
        property: String,
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of why the operation is illegal.
        message: String,
    },

    /// The storage transaction failed; nothing was applied.
    #[error("commit of {unit_of_work} failed: {source}")]
    Commit {
        /// The unit of work that tried to commit.
        unit_of_work: UnitOfWorkId,
        /// The store failure.
        #[source]
        source: StoreError,
    },

    /// An entity with this identity is already in the unit of work.
    #[error("identity collision: {entity_type} {id} already exists in this unit of work")]
    IdentityCollision {
        /// Entity type.
        entity_type: String,
        /// The colliding identity.
        id: String,
    },

    /// A filter cannot be evaluated by the store nor in memory.
    #[error("unsupported predicate: {predicate}")]
    UnsupportedPredicate {
        /// Display form of the predicate.
        predicate: String,
    },

    /// The entity type was never registered.
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType {
        /// Entity type name.
        entity_type: String,
    },

    /// The entity type has no slot with this name and kind.
    #[error("unknown property {entity_type}.{property}")]
    UnknownProperty {
        /// Entity type.
        entity_type: String,
        /// Property name.
        property: String,
    },

    /// A stored value does not convert to the requested type.
    #[error("type mismatch on {entity_type}.{property}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Entity type.
        entity_type: String,
        /// Property name.
        property: String,
        /// Requested Rust type.
        expected: &'static str,
        /// Type of the stored value.
        found: &'static str,
    },

    /// No entity with this identity exists.
    #[error("entity not found: {entity_type} {id}")]
    EntityNotFound {
        /// Entity type.
        entity_type: String,
        /// The identity looked up.
        id: String,
    },

    /// The entity is owned by another unit of work.
    #[error("entity {id} belongs to {owner}")]
    ForeignEntity {
        /// The entity identity.
        id: String,
        /// The owning unit of work.
        owner: UnitOfWorkId,
    },

    /// An entity type description is invalid.
    #[error("invalid model for {entity_type}: {message}")]
    InvalidModel {
        /// Entity type.
        entity_type: String,
        /// Description of the problem.
        message: String,
    },

    /// A constraint vetoed a value.
    #[error("constraint `{constraint}` violated on {entity_type}.{property}")]
    ConstraintViolation {
        /// Entity type.
        entity_type: String,
        /// Property name.
        property: String,
        /// Name of the violated constraint.
        constraint: String,
    },

    /// Store failure outside a commit.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The unit of work was closed while the operation was in flight.
    #[error("operation cancelled: unit of work closed")]
    Cancelled,
}

impl CoreError {
    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(
        entity_type: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            entity_type: entity_type.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint_violation(
        entity_type: impl Into<String>,
        property: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            entity_type: entity_type.into(),
            property: property.into(),
            constraint: constraint.into(),
        }
    }

    /// Creates an invalid model error.
    pub fn invalid_model(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidModel {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::IllegalState { .. } => ErrorKind::IllegalState,
            Self::Commit { .. } => ErrorKind::Commit,
            Self::IdentityCollision { .. }
            | Self::UnsupportedPredicate { .. }
            | Self::UnknownEntityType { .. }
            | Self::UnknownProperty { .. }
            | Self::TypeMismatch { .. }
            | Self::EntityNotFound { .. }
            | Self::ForeignEntity { .. }
            | Self::InvalidModel { .. } => ErrorKind::ModelRuntime,
            Self::ConstraintViolation { .. } => ErrorKind::Constraint,
            Self::Store(_) => ErrorKind::Store,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            CoreError::illegal_state("closed").kind(),
            ErrorKind::IllegalState
        );
        assert_eq!(
            CoreError::configuration("Person", "name", "unset").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CoreError::UnsupportedPredicate {
                predicate: "x".into()
            }
            .kind(),
            ErrorKind::ModelRuntime
        );
        assert_eq!(
            CoreError::from(StoreError::Locked).kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn commit_error_exposes_source() {
        use std::error::Error as _;
        let err = CoreError::Commit {
            unit_of_work: UnitOfWorkId::new(7),
            source: StoreError::backend("disk full"),
        };
        assert!(err.to_string().contains("uow:7"));
        assert!(err.source().is_some());
    }
}
