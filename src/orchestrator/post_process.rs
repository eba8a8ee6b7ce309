//! Post-run processing utilities.
//!
//! Handles auto-save and exports after a batch finishes.

use crate::model::BatchReport;
use crate::storage;
use std::path::Path;

/// Where a finished report should go.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReportTargets<'a> {
    pub auto_save: bool,
    pub export_json: Option<&'a Path>,
    pub export_csv: Option<&'a Path>,
}

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub messages: Vec<String>,
    pub auto_saved_path: Option<std::path::PathBuf>,
}

/// Process a finished batch: auto-save and export. Failures become messages,
/// never errors, so a broken export cannot hide the batch outcome.
pub(crate) fn process_run_completion(targets: &ReportTargets<'_>, report: &BatchReport) -> ProcessedRun {
    let mut messages = Vec::new();

    let auto_saved_path = if targets.auto_save {
        match storage::save_report(report) {
            Ok(p) => {
                messages.push(format!("Saved: {}", p.display()));
                Some(p)
            }
            Err(e) => {
                tracing::warn!(error = %e, "auto-save failed");
                messages.push(format!("Save failed: {e:#}"));
                None
            }
        }
    } else {
        None
    };

    if let Some(export_path) = targets.export_json {
        match storage::export_json(export_path, report) {
            Ok(_) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = targets.export_csv {
        match storage::export_csv(export_path, report) {
            Ok(_) => messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => messages.push(format!("Export CSV failed: {e:#}")),
        }
    }

    ProcessedRun {
        messages,
        auto_saved_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchOutcome, Pacing};

    #[test]
    fn exports_without_auto_save() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("out").join("report.json");
        let csv = dir.path().join("report.csv");
        let report = BatchReport {
            started_at_utc: "2024-01-01T00:00:00Z".into(),
            finished_at_utc: "2024-01-01T00:01:00Z".into(),
            message: "oi".into(),
            pacing: Pacing::fixed_secs(0),
            total_contacts: 0,
            success_count: 0,
            failure_count: 0,
            outcome: BatchOutcome::Completed,
            results: vec![],
        };

        let processed = process_run_completion(
            &ReportTargets {
                auto_save: false,
                export_json: Some(&json),
                export_csv: Some(&csv),
            },
            &report,
        );

        assert!(processed.auto_saved_path.is_none());
        assert_eq!(processed.messages.len(), 2);
        assert!(json.exists());
        assert!(csv.exists());
    }
}
