//! Day-partitioned JSONL audit log
//!
//! Files: `{decisions,outcomes,memory,interactions}_{YYYYMMDD}.jsonl`, one
//! record per line, partitioned by the record's UTC day. Reports are saved
//! next to them as `report_{task}_{YYYYMMDD_HHMMSS}.json`.

use crate::audit::{AuditRecord, AuditSink, TransparencyReport};
use crate::errors::{Result, SymphonyError};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct JsonlAuditLog {
    dir: PathBuf,
    /// Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    /// Open (and create if needed) the log directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            SymphonyError::Audit(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, record: &AuditRecord) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.jsonl",
            record.kind.file_prefix(),
            record.timestamp.format("%Y%m%d")
        ))
    }

    /// Generate the report for `root_task_id` and write it to disk
    pub fn save_report(&self, root_task_id: &str) -> Result<(TransparencyReport, PathBuf)> {
        let report = self.report(root_task_id)?;
        let path = self.dir.join(format!(
            "report_{}_{}.json",
            root_task_id,
            report.generated_at.format("%Y%m%d_%H%M%S")
        ));

        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&path, json)
            .map_err(|e| SymphonyError::Audit(format!("Failed to write report: {}", e)))?;

        info!(task_id = %root_task_id, path = %path.display(), "transparency report generated");
        Ok((report, path))
    }

    fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let path = self.file_for(record);

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SymphonyError::Audit(format!("Failed to open {}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| SymphonyError::Audit(format!("Failed to append record: {}", e)))?;

        debug!(kind = record.kind.file_prefix(), "audit record appended");
        Ok(())
    }

    fn records_for(&self, root_task_id: &str) -> Result<Vec<AuditRecord>> {
        let mut records = Vec::new();

        for path in self.log_files()? {
            let contents = fs::read_to_string(&path)?;
            for (number, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AuditRecord>(line) {
                    Ok(record) if record.root_task_id.as_deref() == Some(root_task_id) => {
                        records.push(record)
                    }
                    Ok(_) => {}
                    Err(e) => warn!(
                        file = %path.display(),
                        line = number + 1,
                        error = %e,
                        "skipping malformed audit line"
                    ),
                }
            }
        }

        Ok(records)
    }
}
