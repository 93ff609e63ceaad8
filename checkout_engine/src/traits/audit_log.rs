use crate::{
    db_types::{AuditEntry, NewAuditEntry},
    traits::StorageError,
};

/// Append-only. Entries cannot be modified or removed through this trait, and the SQLite backend rejects such writes
/// with triggers.
#[allow(async_fn_in_trait)]
pub trait AuditLog: Clone {
    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, StorageError>;

    async fn fetch_audit_entries(&self, resource_type: &str, resource_id: &str)
        -> Result<Vec<AuditEntry>, StorageError>;
}
