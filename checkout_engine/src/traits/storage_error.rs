use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("The order already has an active refund request")]
    ActiveRefundExists,
    #[error("A refund request with idempotency id {0} already exists")]
    DuplicateIdempotencyId(String),
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: String },
    #[error("The requested update would result in a no-op.")]
    NoOp,
    #[error("The audit log is append-only")]
    AuditLogImmutable,
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}
