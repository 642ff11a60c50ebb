//! Audit sink kept in process memory

use crate::audit::{AuditRecord, AuditSink};
use crate::errors::Result;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    fn records_for(&self, root_task_id: &str) -> Result<Vec<AuditRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.root_task_id.as_deref() == Some(root_task_id))
            .cloned()
            .collect())
    }
}
