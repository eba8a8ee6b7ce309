use crate::model::{BatchPhase, BatchReport, BatchState, Pacing};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::time::{Duration, Instant};

pub const TAB_DASHBOARD: usize = 0;
pub const TAB_RESULTS: usize = 1;
pub const TAB_HELP: usize = 2;

pub struct UiState {
    pub tab: usize,
    pub batch: BatchState,
    pub pacing: Pacing,
    pub info: String,
    pub auto_save: bool,
    pub run_start: Instant,
    // Set when the batch reaches Completed/Cancelled; stops the elapsed clock.
    pub finished_at: Option<Instant>,

    // Dispatch time per processed contact, in ms, for the sparkline.
    pub dispatch_series: Vec<u64>,

    pub report: Option<BatchReport>,
    // Set once auto-save/exports ran for `report`.
    pub completion_handled: bool,
    pub last_saved_path: Option<String>,

    pub results_selected: usize,
    pub results_scroll_offset: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: TAB_DASHBOARD,
            batch: BatchState::default(),
            pacing: Pacing::default(),
            info: String::new(),
            auto_save: true,
            run_start: Instant::now(),
            finished_at: None,
            dispatch_series: Vec::new(),
            report: None,
            completion_handled: false,
            last_saved_path: None,
            results_selected: 0,
            results_scroll_offset: 0,
        }
    }
}

impl UiState {
    pub fn push_series(series: &mut Vec<u64>, v: u64) {
        const MAX: usize = 120;
        series.push(v);
        if series.len() > MAX {
            let _ = series.drain(0..(series.len() - MAX));
        }
    }

    /// Take a freshly published orchestrator state.
    pub fn apply_batch(&mut self, next: BatchState) {
        for r in next.results.iter().skip(self.batch.results.len()) {
            Self::push_series(&mut self.dispatch_series, r.elapsed_ms.unwrap_or(0));
        }
        if next.cancel_requested && !self.batch.cancel_requested {
            self.info = "Cancelling… the current send finishes first".into();
        }
        if !next.is_running() && next.phase != BatchPhase::Idle && self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
        }
        self.batch = next;
        if self.results_selected >= self.batch.results.len() {
            self.results_selected = self.batch.results.len().saturating_sub(1);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.run_start)
    }

    pub fn select_prev(&mut self) {
        if self.results_selected > 0 {
            self.results_selected -= 1;
            if self.results_selected < self.results_scroll_offset {
                self.results_scroll_offset = self.results_selected;
            }
        }
    }

    pub fn select_next(&mut self, visible_rows: usize) {
        if self.results_selected + 1 < self.batch.results.len() {
            self.results_selected += 1;
            let visible_rows = visible_rows.max(1);
            if self.results_selected >= self.results_scroll_offset + visible_rows {
                self.results_scroll_offset = self.results_selected + 1 - visible_rows;
            }
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Borders take 2 chars on each side
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContactSnapshot, SendResult};

    fn result(id: &str, ms: Option<u64>) -> SendResult {
        SendResult {
            success: true,
            contact: ContactSnapshot {
                id: id.into(),
                display_name: id.into(),
                phone: "5511999990000".into(),
                normalized_phone_e164: None,
                national_phone_number: None,
            },
            error: None,
            elapsed_ms: ms,
        }
    }

    #[test]
    fn apply_batch_extends_series_with_new_results_only() {
        let mut state = UiState::default();
        state.apply_batch(BatchState {
            results: vec![result("a", Some(120))],
            ..Default::default()
        });
        state.apply_batch(BatchState {
            results: vec![result("a", Some(120)), result("b", None)],
            cancel_requested: true,
            ..Default::default()
        });
        assert_eq!(state.dispatch_series, vec![120, 0]);
        assert!(state.info.starts_with("Cancelling"));
    }

    #[test]
    fn elapsed_stops_when_the_batch_ends() {
        let mut state = UiState::default();
        state.apply_batch(BatchState {
            phase: BatchPhase::Waiting,
            ..Default::default()
        });
        assert!(state.finished_at.is_none());
        state.apply_batch(BatchState {
            phase: BatchPhase::Completed,
            ..Default::default()
        });
        let frozen = state.elapsed();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(state.elapsed(), frozen);
    }

    #[test]
    fn selection_scrolls_with_window() {
        let mut state = UiState::default();
        state.apply_batch(BatchState {
            results: (0..5).map(|i| result(&i.to_string(), None)).collect(),
            ..Default::default()
        });
        for _ in 0..4 {
            state.select_next(2);
        }
        assert_eq!(state.results_selected, 4);
        assert_eq!(state.results_scroll_offset, 3);
        state.select_next(2);
        assert_eq!(state.results_selected, 4);
        for _ in 0..4 {
            state.select_prev();
        }
        assert_eq!(state.results_scroll_offset, 0);
    }

    #[test]
    fn wrapped_status_splits_long_values() {
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Info", "abcdefghij", 12);
        assert_eq!(out.len(), 3);
        push_wrapped_status_kv(&mut out, "Empty", "  ", 12);
        assert_eq!(out.len(), 3);
    }
}
