use thiserror::Error;

/// Error taxonomy for case lifecycle and stage-progress operations.
///
/// Business-rule and not-found failures are synchronous and abort the
/// operation before any write. Storage errors cover the narrow typed-cast
/// fallback path in the persistence adapter; exhaustion of that path is a
/// system error surfaced to the caller. Background side-effect failures are
/// never represented here - they are logged by the queue workers and
/// intentionally have no propagation channel back to the primary mutation.
#[derive(Debug, Error)]
pub enum CaseflowError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("business rule violation: {0}")]
    BusinessRule(String),

    #[error("operator is not permitted to modify case {case_id}")]
    PermissionDenied { case_id: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CaseflowError {
    /// Whether the failure is a caller mistake rather than a system fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::BusinessRule(_)
                | Self::PermissionDenied { .. }
                | Self::InvalidInput(_)
        )
    }
}

/// Helper for business rule violations.
pub fn business_rule(msg: impl Into<String>) -> CaseflowError {
    CaseflowError::BusinessRule(msg.into())
}

/// Helper for not-found failures.
pub fn not_found(entity: &'static str, id: i64) -> CaseflowError {
    CaseflowError::NotFound { entity, id }
}

pub type Result<T> = std::result::Result<T, CaseflowError>;
