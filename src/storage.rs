//! Batch report persistence and export.
//!
//! Reports are saved as one JSON file per run under the user data directory.

use crate::model::BatchReport;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

fn base_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("no user data directory")?;
    Ok(base.join("prospect-manager"))
}

pub fn runs_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("runs"))
}

fn report_file_name(report: &BatchReport) -> String {
    let stamp = if report.started_at_utc.is_empty() {
        crate::model::now_rfc3339()
    } else {
        report.started_at_utc.clone()
    };
    format!("batch-{}.json", stamp.replace(':', "-"))
}

/// Save a report to the default runs directory.
pub fn save_report(report: &BatchReport) -> Result<PathBuf> {
    save_report_in(&runs_dir()?, report)
}

pub fn save_report_in(dir: &Path, report: &BatchReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(report_file_name(report));
    export_json(&path, report)?;
    tracing::debug!(path = %path.display(), "report saved");
    Ok(path)
}

/// Load up to `limit` saved reports, newest first.
pub fn load_recent(limit: usize) -> Result<Vec<BatchReport>> {
    load_recent_in(&runs_dir()?, limit)
}

pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<BatchReport>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    // File names embed an RFC 3339 stamp, so lexical order is chronological.
    files.sort();
    files.reverse();

    let mut out = Vec::new();
    for path in files.into_iter().take(limit) {
        let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        match serde_json::from_str::<BatchReport>(&data) {
            Ok(r) => out.push(r),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable report"),
        }
    }
    Ok(out)
}

pub fn export_json(path: &Path, report: &BatchReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(report)?;
    fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// One CSV row per send result.
pub fn export_csv(path: &Path, report: &BatchReport) -> Result<()> {
    fs::write(path, render_csv(report)).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn render_csv(report: &BatchReport) -> String {
    let mut out = String::from("index,id,display_name,phone,success,error,elapsed_ms\n");
    for (i, r) in report.results.iter().enumerate() {
        let row = [
            i.to_string(),
            csv_field(&r.contact.id),
            csv_field(&r.contact.display_name),
            csv_field(&r.contact.phone),
            r.success.to_string(),
            csv_field(r.error.as_deref().unwrap_or("")),
            r.elapsed_ms.map(|ms| ms.to_string()).unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchOutcome, ContactSnapshot, Pacing, SendResult};

    fn report(started: &str, results: Vec<SendResult>) -> BatchReport {
        BatchReport {
            started_at_utc: started.into(),
            finished_at_utc: started.into(),
            message: "oi".into(),
            pacing: Pacing::fixed_secs(30),
            total_contacts: results.len(),
            success_count: results.iter().filter(|r| r.success).count(),
            failure_count: results.iter().filter(|r| !r.success).count(),
            outcome: BatchOutcome::Completed,
            results,
        }
    }

    fn result(id: &str, name: &str, error: Option<&str>) -> SendResult {
        SendResult {
            success: error.is_none(),
            contact: ContactSnapshot {
                id: id.into(),
                display_name: name.into(),
                phone: "5511999990000".into(),
                normalized_phone_e164: None,
                national_phone_number: None,
            },
            error: error.map(Into::into),
            elapsed_ms: Some(120),
        }
    }

    #[test]
    fn save_and_load_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        save_report_in(dir.path(), &report("2024-01-01T10:00:00Z", vec![])).unwrap();
        save_report_in(dir.path(), &report("2024-03-01T10:00:00Z", vec![])).unwrap();
        save_report_in(dir.path(), &report("2024-02-01T10:00:00Z", vec![])).unwrap();

        let loaded = load_recent_in(dir.path(), 2).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].started_at_utc, "2024-03-01T10:00:00Z");
        assert_eq!(loaded[1].started_at_utc, "2024-02-01T10:00:00Z");
    }

    #[test]
    fn missing_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_recent_in(&dir.path().join("nope"), 10).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn unreadable_reports_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("batch-broken.json"), "{not json").unwrap();
        save_report_in(dir.path(), &report("2024-01-01T10:00:00Z", vec![])).unwrap();
        assert_eq!(load_recent_in(dir.path(), 10).unwrap().len(), 1);
    }

    #[test]
    fn csv_quotes_fields_with_commas() {
        let r = report(
            "2024-01-01T10:00:00Z",
            vec![
                result("1", "Bar, Restaurante", None),
                result("2", "Loja \"Top\"", Some("invalid phone")),
            ],
        );
        let csv = render_csv(&r);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "0,1,\"Bar, Restaurante\",5511999990000,true,,120"
        );
        assert_eq!(
            lines[2],
            "1,2,\"Loja \"\"Top\"\"\",5511999990000,false,invalid phone,120"
        );
    }
}
