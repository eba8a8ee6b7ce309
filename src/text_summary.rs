//! Text summary builder for CLI output.
//!
//! This module computes metrics and formats human-readable lines for text mode.

use crate::metrics;
use crate::model::{BatchOutcome, BatchPhase, BatchReport, BatchState};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished batch report.
pub(crate) fn build_text_summary(report: &BatchReport) -> TextSummary {
    let mut lines = Vec::new();

    let outcome = match report.outcome {
        BatchOutcome::Completed => "completed",
        BatchOutcome::Cancelled => "cancelled by user",
    };
    lines.push(format!("Batch {outcome} ({})", report.pacing.describe()));
    lines.push(format!(
        "Sent: {} ok / {} failed of {} contacts",
        report.success_count, report.failure_count, report.total_contacts
    ));

    let processed = report.success_count + report.failure_count;
    if processed < report.total_contacts {
        lines.push(format!(
            "Not processed: {}",
            report.total_contacts - processed
        ));
    }
    if let Some(rate) = report.success_rate() {
        lines.push(format!("Success rate: {:.1}%", rate * 100.0));
    }

    let latencies = metrics::dispatch_latencies_ms(&report.results);
    if let Some((mean, median, p25, p75)) = metrics::compute_metrics(&latencies) {
        lines.push(format!(
            "Dispatch time: avg {:.0} med {:.0} p25 {:.0} p75 {:.0} ms",
            mean, median, p25, p75
        ));
    }

    let failed: Vec<_> = report.results.iter().filter(|r| !r.success).collect();
    if !failed.is_empty() {
        lines.push("Failures:".into());
        for r in failed {
            lines.push(format!(
                "  {} ({}): {}",
                r.contact.display_name,
                r.contact.phone,
                r.error.as_deref().unwrap_or(crate::engine::UNKNOWN_ERROR)
            ));
        }
    }

    TextSummary { lines }
}

/// Progress lines for the transition between two published states.
pub(crate) fn progress_lines(prev: &BatchState, cur: &BatchState) -> Vec<String> {
    let mut lines = Vec::new();

    for (i, r) in cur.results.iter().enumerate().skip(prev.results.len()) {
        let pos = format!("[{}/{}]", i + 1, cur.total_contacts);
        if r.success {
            lines.push(format!("{pos} sent to {} ({})", r.contact.display_name, r.contact.phone));
        } else {
            lines.push(format!(
                "{pos} FAILED {} ({}): {}",
                r.contact.display_name,
                r.contact.phone,
                r.error.as_deref().unwrap_or(crate::engine::UNKNOWN_ERROR)
            ));
        }
    }

    let wait_started = cur.phase == BatchPhase::Waiting
        && cur.current_index > 0
        && cur.countdown_secs > 0
        && (prev.phase != BatchPhase::Waiting || prev.current_index != cur.current_index);
    if wait_started {
        lines.push(format!(
            "Waiting {}s before next send…",
            cur.countdown_secs
        ));
    }

    if cur.cancel_requested && !prev.cancel_requested {
        lines.push("Cancelling…".into());
    }

    lines
}
