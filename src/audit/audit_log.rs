use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::audit_record::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only JSON Lines file, one record per dispatch attempt.
///
/// Every record is stamped, encoded and written with a single `write_all`
/// while the file lock is held, so concurrent workers never interleave
/// within a line and file order matches timestamp order.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(path = %path.display(), "audit log opened (append mode)");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `record` stamped with the time it reached the file.
    pub fn append(&self, mut record: AuditRecord) -> Result<AuditRecord, AuditError> {
        {
            let mut file = self.file.lock();
            record.stamp(Utc::now());

            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            file.write_all(&line)?;
            file.flush()?;
        }

        debug!(
            order_id = %record.order_id,
            timestamp = %record.timestamp,
            "audit record written"
        );

        Ok(record)
    }

    /// Most recent `limit` records, oldest first.
    pub fn tail(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = Self::read_records(&self.path)?;
        let skip = records.len().saturating_sub(limit);

        Ok(records.split_off(skip))
    }

    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => records.push(record),
                /* NOTE: a torn tail from a crash only costs that one line */
                Err(error) => warn!(line = index + 1, %error, "skipping unreadable audit line"),
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::execution::dispatch_result::DispatchResult;
    use crate::types::order::{Order, Side};

    fn record(symbol: &str, worker: usize) -> AuditRecord {
        let order = Order::new(symbol, Side::Sell, 0.5).unwrap();
        AuditRecord::new(&order, &DispatchResult::failure("no broker configured"), worker)
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("executor_audit.log");

        let log = AuditLog::open(&path).unwrap();
        log.append(record("EURUSD", 0)).unwrap();

        assert!(path.exists());
        assert_eq!(AuditLog::read_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append(record("EURUSD", 0)).unwrap();
            log.append(record("GBPUSD", 1)).unwrap();
        }

        let log = AuditLog::open(&path).unwrap();
        log.append(record("USDJPY", 0)).unwrap();

        let symbols: Vec<_> = AuditLog::read_records(&path)
            .unwrap()
            .into_iter()
            .map(|r| r.symbol)
            .collect();
        assert_eq!(symbols, vec!["EURUSD", "GBPUSD", "USDJPY"]);
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = Arc::new(AuditLog::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.append(record(&format!("SYM{worker}_{i}"), worker))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 800);
        for line in raw.lines() {
            serde_json::from_str::<AuditRecord>(line).unwrap();
        }

        let records = AuditLog::read_records(&path).unwrap();
        assert!(
            records
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        );

        let ids: HashSet<_> = records.into_iter().map(|r| r.order_id).collect();
        assert_eq!(ids.len(), 800);
    }

    #[test]
    fn file_order_follows_write_time_not_build_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();

        let order = Order::new("EURUSD", Side::Buy, 0.1).unwrap();
        let result = DispatchResult::success("DRY-1");
        let built_late = AuditRecord::at(
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            &order,
            &result,
            0,
        );
        let built_early = AuditRecord::at(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            &order,
            &result,
            1,
        );

        let first = log.append(built_late).unwrap();
        let second = log.append(built_early).unwrap();
        assert!(!first.timestamp.starts_with("2030"));
        assert!(first.timestamp <= second.timestamp);

        let records = AuditLog::read_records(&path).unwrap();
        assert_eq!(records[0].worker, 0);
        assert_eq!(records[1].worker, 1);
        assert!(records[0].timestamp <= records[1].timestamp);
    }

    #[test]
    fn skips_torn_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();
        log.append(record("EURUSD", 0)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"timestamp\":\"2024-").unwrap();

        assert_eq!(AuditLog::read_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn tail_returns_latest_records() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
        for symbol in ["A", "B", "C", "D"] {
            log.append(record(symbol, 0)).unwrap();
        }

        let tail: Vec<_> = log.tail(2).unwrap().into_iter().map(|r| r.symbol).collect();
        assert_eq!(tail, vec!["C", "D"]);
        assert_eq!(log.tail(10).unwrap().len(), 4);
    }
}
