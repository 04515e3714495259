//! One-shot ledger to QIF export: build, sort, write.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use chrono::NaiveDate;

use crate::{
    analysis::LedgerAnalysis,
    builder::{build_data, BuildReport},
    config::ExportConfig,
    errors::{QifError, Result},
    io::{Progress, QifWriter, WriteOutcome},
    ledger::Ledger,
    qif::{QifFile, QifFormat},
    utils::persistence::tmp_path,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub report: BuildReport,
    pub outcome: WriteOutcome,
}

/// Cutoff used when the configuration names none: the last transaction date.
pub fn default_cutoff(ledger: &Ledger) -> NaiveDate {
    ledger
        .transactions
        .iter()
        .map(|txn| txn.date)
        .max()
        .unwrap_or(ledger.start_date)
        .max(ledger.start_date)
}

/// Builds the sorted file model for `ledger`.
pub fn build_file(ledger: &Ledger, config: &ExportConfig) -> Result<(QifFile, BuildReport)> {
    let analysis = LedgerAnalysis::compute(ledger);
    let cutoff = config.cutoff.unwrap_or_else(|| default_cutoff(ledger));
    let mut file = QifFile::new(config.file_type);
    let report = build_data(&mut file, ledger, &analysis, config.capabilities(), cutoff)?;
    Ok((file, report))
}

/// Builds and writes `ledger` to `out`.
pub fn export_ledger<W: Write>(
    ledger: &Ledger,
    config: &ExportConfig,
    out: W,
    progress: &mut dyn Progress,
) -> Result<ExportSummary> {
    let (file, report) = build_file(ledger, config)?;
    let mut writer = QifWriter::new(out, QifFormat::new(config.date_format));
    let outcome = writer.write_file(&file, progress)?;
    Ok(ExportSummary { report, outcome })
}

/// Exports to `path` through a temporary sibling file. A cancelled or
/// failed write leaves no file behind.
pub fn export_to_path(
    ledger: &Ledger,
    config: &ExportConfig,
    path: &Path,
    progress: &mut dyn Progress,
) -> Result<ExportSummary> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_path(path);
    let result = File::create(&tmp)
        .map_err(QifError::from)
        .and_then(|file| export_ledger(ledger, config, BufWriter::new(file), progress));
    match result {
        Ok(summary) if summary.outcome == WriteOutcome::Completed => {
            fs::rename(&tmp, path)?;
            tracing::info!(path = %path.display(), "QIF export written");
            Ok(summary)
        }
        Ok(summary) => {
            let _ = fs::remove_file(&tmp);
            Ok(summary)
        }
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}
