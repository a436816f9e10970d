use thiserror::Error;

/// Failures reported by a persistence session.
///
/// The engines never interpret these; they are propagated unchanged so the
/// caller can decide whether to retry, surface a conflict or abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Entity of type '{0}' is not attached to the session")]
    NotAttached(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Session error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error(
        "Entity '{entity_type}' is marked Deleted but has an Added descendant through '{property}'"
    )]
    DeletedWithAddedChildren {
        entity_type: String,
        property: String,
    },

    #[error("Entity '{entity_type}' was already visited in this traversal")]
    AlreadyVisited { entity_type: String },

    #[error("Entity '{entity_type}' has no navigation property '{property}'")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },

    #[error("Property '{property}' expects '{expected}' but got '{found}'")]
    TypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    #[error("Collection '{property}' has no element at index {index}")]
    IndexOutOfRange { property: String, index: usize },

    #[error("Entity '{entity_type}' has no correlation key")]
    MissingCorrelationKey { entity_type: String },

    #[error("Lock error: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

impl<T> From<std::sync::PoisonError<T>> for TrackingError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_pass_through_transparently() {
        let err: TrackingError = SessionError::ConcurrencyConflict("row version 3".into()).into();
        assert_eq!(err.to_string(), "Concurrency conflict: row version 3");
        assert!(matches!(
            err,
            TrackingError::Session(SessionError::ConcurrencyConflict(_))
        ));
    }

    #[test]
    fn deleted_with_added_message_names_the_property() {
        let err = TrackingError::DeletedWithAddedChildren {
            entity_type: "Order".into(),
            property: "order_details".into(),
        };
        assert!(err.to_string().contains("order_details"));
    }
}
