use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// Unified error type for every engine operation.
///
/// Validation and business-rule variants are deterministic for a given input
/// and carry no side effects; `DatabaseError` means the enclosing atomic unit
/// rolled back, so the caller may safely retry.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Already cancelled: {0}")]
    AlreadyCancelled(String),

    #[error("Not cancellable: {0}")]
    NotCancellable(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code a boundary layer should answer with.
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => 500,
            Self::NotFound(_) => 404,
            Self::ValidationError(_) => 400,
            Self::InsufficientStock(_) => 422,
            Self::AlreadyCancelled(_) | Self::NotCancellable(_) => 409,
        }
    }

    /// True when the failure is transient and the operation may be retried
    /// with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError(_))
    }

    /// Returns the message suitable for callers outside the engine.
    ///
    /// Storage and internal failures are opaque: the caller gets a triage
    /// reference while the underlying detail goes to the log, never across
    /// the boundary.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(err) => {
                let reference = Uuid::new_v4().simple().to_string();
                error!(%reference, error = %err, "storage error surfaced to caller");
                format!("A storage error occurred (reference {})", reference)
            }
            Self::InternalError(detail) => {
                let reference = Uuid::new_v4().simple().to_string();
                error!(%reference, %detail, "internal error surfaced to caller");
                format!("An internal error occurred (reference {})", reference)
            }
            Self::Other(err) => {
                let reference = Uuid::new_v4().simple().to_string();
                error!(%reference, error = %err, "unexpected error surfaced to caller");
                format!("An internal error occurred (reference {})", reference)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::error::DbErr;

    #[test]
    fn db_errors_convert_through_from() {
        let err: ServiceError = DbErr::Custom("connection closed".into()).into();
        assert!(matches!(err, ServiceError::DatabaseError(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ServiceError::ValidationError("x".into()).status_code(), 400);
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            422
        );
        assert_eq!(
            ServiceError::AlreadyCancelled("x".into()).status_code(),
            409
        );
        assert_eq!(ServiceError::NotCancellable("x".into()).status_code(), 409);
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("x".into())).status_code(),
            500
        );
        assert_eq!(ServiceError::InternalError("x".into()).status_code(), 500);
    }

    #[test]
    fn response_message_hides_storage_details() {
        let err = ServiceError::DatabaseError(DbErr::Custom("connection reset by peer".into()));
        let message = err.response_message();
        assert!(message.starts_with("A storage error occurred"));
        assert!(!message.contains("connection reset"));

        // Business errors keep their message verbatim.
        assert_eq!(
            ServiceError::InsufficientStock("only 5 left".into()).response_message(),
            "Insufficient stock: only 5 left"
        );
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(ServiceError::DatabaseError(DbErr::Custom("timeout".into())).is_retryable());
        assert!(!ServiceError::ValidationError("x".into()).is_retryable());
        assert!(!ServiceError::AlreadyCancelled("x".into()).is_retryable());
    }

    #[test]
    fn validator_errors_convert_to_validation_error() {
        use validator::Validate;

        #[derive(Validate)]
        struct Input {
            #[validate(range(min = 1))]
            quantity: i64,
        }

        let err = Input { quantity: 0 }.validate().unwrap_err();
        assert!(matches!(
            ServiceError::from(err),
            ServiceError::ValidationError(_)
        ));
    }
}
