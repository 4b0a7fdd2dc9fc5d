use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use serde::Serialize;

use crate::error::BenchError;
use crate::ledger::LedgerSnapshot;

pub const PROCESSED_FILE: &str = "processed_transactions.json";
pub const BALANCES_FILE: &str = "balances.json";

/// Destination for the end-of-run ledger snapshot.
pub trait ReportSink {
    fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), BenchError>;
}

/// Writes the processed list and the balance table as two pretty-printed
/// JSON files under `out_dir`.
#[derive(Clone, Debug)]
pub struct JsonReportSink {
    out_dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn processed_path(&self) -> PathBuf {
        self.out_dir.join(PROCESSED_FILE)
    }

    pub fn balances_path(&self) -> PathBuf {
        self.out_dir.join(BALANCES_FILE)
    }
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), BenchError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

impl ReportSink for JsonReportSink {
    fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), BenchError> {
        fs::create_dir_all(&self.out_dir)?;
        write_pretty(&self.processed_path(), &snapshot.processed)?;
        write_pretty(&self.balances_path(), &snapshot.balances)?;
        info!(
            "saved {} processed transactions and {} balances to {}",
            snapshot.processed.len(),
            snapshot.balances.len(),
            self.out_dir.display()
        );
        Ok(())
    }
}

/// Discards snapshots.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn write_snapshot(&self, _snapshot: &LedgerSnapshot) -> Result<(), BenchError> {
        Ok(())
    }
}
