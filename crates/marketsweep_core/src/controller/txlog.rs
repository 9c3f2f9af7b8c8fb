//! Per-run transaction log (tab-separated, one row per trade)

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::RunError;
use crate::model::TransactionRecord;

pub const TRANSACTION_LOG_HEADER: [&str; 9] = [
    "Tick",
    "TrdID",
    "TrdPrice",
    "TrdTime",
    "TrdQuant",
    "TrdWhoBid",
    "TrdWhoAsk",
    "TrdWhoBidType",
    "TrdWhoAskType",
];

/// Append-only log owned exclusively by one run
pub struct TransactionLog {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl TransactionLog {
    /// File name qualified by run index and seed so concurrent runs never
    /// share a file
    pub fn file_name(prefix: &str, run_index: usize, seed: u64, suffix: &str) -> String {
        format!("{prefix}{run_index}_{seed}.{suffix}")
    }

    /// Create the log and write its header row
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, RunError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        writer.write_record(TRANSACTION_LOG_HEADER)?;
        tracing::info!(path = %path.display(), "opened transaction log");
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn append(&mut self, record: &TransactionRecord) -> Result<(), RunError> {
        self.writer.serialize(record)?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and close the log, returning the number of rows written
    pub fn finish(mut self) -> Result<usize, RunError> {
        self.writer.flush()?;
        tracing::info!(path = %self.path.display(), rows = self.rows, "closed transaction log");
        Ok(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(tick: i64, id: i64) -> TransactionRecord {
        TransactionRecord {
            tick,
            id,
            price: 100.5,
            time: tick as f64,
            quantity: 3,
            buyer_id: 1,
            seller_id: 2,
            buyer_type: "LiqDem".to_string(),
            seller_type: "LiqSup".to_string(),
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("tx.tsv");
        let mut log = TransactionLog::create(&path).unwrap();
        log.append(&trade(5, 0)).unwrap();
        log.append(&trade(5, 1)).unwrap();
        assert_eq!(log.finish().unwrap(), 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TRANSACTION_LOG_HEADER.join("\t"));
        assert_eq!(lines[1], "5\t0\t100.5\t5.0\t3\t1\t2\tLiqDem\tLiqSup");
    }

    #[test]
    fn test_empty_log_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tsv");
        let log = TransactionLog::create(&path).unwrap();
        assert_eq!(log.finish().unwrap(), 0);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            TransactionLog::file_name("LMtransact_", 4, 12345, "tsv"),
            "LMtransact_4_12345.tsv"
        );
    }
}
