mod export;
mod help;
mod state;

use crate::cli::SendArgs;
use crate::engine::{BatchHandle, SendingOrchestrator};
use crate::model::{BatchPhase, BatchReport, BatchState, SendResult};
use crate::orchestrator::{self, ReportTargets, UiCommand, UiEvent};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Sparkline, Tabs},
    Terminal,
};
use state::{push_wrapped_status_kv, UiState, TAB_DASHBOARD, TAB_HELP, TAB_RESULTS};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

/// What the UI thread leaves behind for the async side.
struct UiExit {
    completion_handled: bool,
    auto_save: bool,
}

pub async fn run(orchestrator: SendingOrchestrator, handle: BatchHandle, args: SendArgs) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let state_rx = orchestrator.subscribe();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, state_rx, event_rx, cmd_tx));

    let res = orchestrator::run_controller(orchestrator, handle, event_tx, cmd_rx).await;

    let exit = match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(Ok(exit))) => exit,
        Ok(Ok(Err(e))) => return Err(e),
        Ok(Err(_)) => return Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => return Err(anyhow::anyhow!("TUI join failed: {e}")),
    };

    let Some(report) = res? else {
        return Ok(());
    };
    // Quitting mid-batch leaves the UI before the report exists.
    if !exit.completion_handled {
        let targets = ReportTargets {
            auto_save: exit.auto_save,
            ..args.report_targets()
        };
        for m in orchestrator::process_run_completion(&targets, &report).messages {
            eprintln!("{m}");
        }
    }
    for line in crate::text_summary::build_text_summary(&report).lines {
        println!("{line}");
    }
    Ok(())
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: SendArgs,
    mut state_rx: watch::Receiver<BatchState>,
    mut event_rx: UnboundedReceiver<UiEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<UiExit> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only.
    let mut state = UiState {
        pacing: args.pacing(),
        auto_save: args.auto_save,
        ..Default::default()
    };
    state.apply_batch(state_rx.borrow_and_update().clone());

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        if state_rx.has_changed().unwrap_or(false) {
            let next = state_rx.borrow_and_update().clone();
            state.apply_batch(next);
        }
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                UiEvent::Info(msg) => state.info = msg,
                UiEvent::RunFinished(report) => handle_run_finished(&args, &mut state, *report),
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(k)) = event::read() else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }
        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break;
            }
            (_, KeyCode::Char('c')) | (_, KeyCode::Esc) => {
                if !state.batch.is_running() {
                    state.info = "No batch running.".into();
                } else if !state.batch.cancel_requested {
                    let _ = cmd_tx.send(UiCommand::Cancel);
                    state.info = "Cancel requested…".into();
                }
            }
            (_, KeyCode::Char('s')) => {
                if let Some(report) = state.report.clone() {
                    export::save_and_show_path(&report, &mut state);
                } else {
                    state.info = "Batch still running; nothing to save yet.".into();
                }
            }
            (_, KeyCode::Char('a')) => {
                state.auto_save = !state.auto_save;
                state.info = match (state.auto_save, state.completion_handled) {
                    (true, false) => "Auto-save enabled".into(),
                    (false, false) => "Auto-save disabled".into(),
                    (_, true) => "Batch already processed; press s to save".into(),
                };
            }
            (_, KeyCode::Char('y')) => match export::failed_phones_text(&state.batch.results) {
                Some(text) => {
                    let count = text.split(',').count();
                    state.info = match export::copy_to_clipboard(&text) {
                        Ok(()) => format!("✓ Copied {count} failed phone(s) to clipboard"),
                        Err(e) => format!("Clipboard copy failed: {e:#}"),
                    };
                }
                None => state.info = "No failed sends to copy.".into(),
            },
            (_, KeyCode::Tab) => {
                state.tab = (state.tab + 1) % 3;
            }
            (_, KeyCode::Char('?')) => {
                state.tab = TAB_HELP;
            }
            (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                if state.tab == TAB_RESULTS {
                    state.select_prev();
                }
            }
            (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                if state.tab == TAB_RESULTS {
                    let rows = terminal
                        .size()
                        .map(|size| results_rows(size.height))
                        .unwrap_or(20);
                    state.select_next(rows);
                }
            }
            _ => {}
        }
    }

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    if state.batch.is_running() {
        eprintln!("Stopping batch; waiting for the current send to finish…");
    }
    Ok(UiExit {
        completion_handled: state.completion_handled,
        auto_save: state.auto_save,
    })
}

fn handle_run_finished(args: &SendArgs, state: &mut UiState, report: BatchReport) {
    let targets = ReportTargets {
        auto_save: state.auto_save,
        ..args.report_targets()
    };
    let processed = orchestrator::process_run_completion(&targets, &report);
    if let Some(path) = processed.auto_saved_path.as_ref() {
        state.last_saved_path = Some(path.to_string_lossy().to_string());
    }
    state.info = if processed.messages.is_empty() {
        "Batch finished. Press q to exit.".into()
    } else {
        format!("{} | q to exit", processed.messages.join("; "))
    };
    state.report = Some(report);
    state.completion_handled = true;
}

/// Rows available to the results list: tabs (3), borders (2) and header (1).
fn results_rows(height: u16) -> usize {
    (height as usize).saturating_sub(6)
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Dashboard"),
        Line::from("Results"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("prospect-manager"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_DASHBOARD => draw_dashboard(chunks[1], f, state),
        TAB_RESULTS => draw_results(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
}

fn phase_color(phase: BatchPhase) -> Color {
    match phase {
        BatchPhase::Idle => Color::Gray,
        BatchPhase::Waiting => Color::Yellow,
        BatchPhase::Sending => Color::Cyan,
        BatchPhase::Completed => Color::Green,
        BatchPhase::Cancelled => Color::Red,
    }
}

fn progress_gauge(state: &UiState) -> Gauge<'static> {
    let b = &state.batch;
    let pct = b.progress_percent().clamp(0.0, 100.0);
    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(phase_color(b.phase)))
        .ratio(pct / 100.0)
        .label(format!("{}/{} ({pct:.0}%)", b.processed(), b.total_contacts))
}

fn counts_lines(state: &UiState) -> Vec<Line<'static>> {
    let b = &state.batch;
    let elapsed = humantime::format_duration(Duration::from_secs(state.elapsed().as_secs()));
    vec![
        Line::from(vec![
            Span::raw("Sent:      "),
            Span::styled(b.success_count.to_string(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Failed:    "),
            Span::styled(b.failure_count.to_string(), Style::default().fg(Color::Red)),
        ]),
        Line::from(format!("Remaining: {}", b.remaining())),
        Line::from(format!("Elapsed:   {elapsed}")),
    ]
}

fn current_lines(state: &UiState) -> Vec<Line<'static>> {
    let b = &state.batch;
    let mut lines = vec![Line::from(vec![
        Span::raw("Phase:   "),
        Span::styled(
            b.phase.label().to_string(),
            Style::default()
                .fg(phase_color(b.phase))
                .add_modifier(Modifier::BOLD),
        ),
    ])];
    if let Some(c) = b.current_contact.as_ref().filter(|_| b.is_running()) {
        lines.push(Line::from(format!("Contact: {}", c.display_name)));
        lines.push(Line::from(format!(
            "Phone:   {}",
            c.dispatch_phone().unwrap_or_else(|| "-".into())
        )));
    }
    if b.phase == BatchPhase::Waiting && b.countdown_secs > 0 {
        lines.push(Line::from(vec![
            Span::raw("Next in: "),
            Span::styled(
                format!("{}s", b.countdown_secs),
                Style::default().fg(Color::Yellow),
            ),
        ]));
    }
    lines.push(Line::from(format!("Pacing:  {}", state.pacing.describe())));
    lines
}

fn result_line(index: usize, r: &SendResult, selected: bool) -> Line<'static> {
    let (mark, color) = if r.success {
        ("✓", Color::Green)
    } else {
        ("✗", Color::Red)
    };
    let mut spans = vec![
        Span::raw(format!("{:>4} ", index + 1)),
        Span::styled(mark, Style::default().fg(color)),
        Span::raw(format!(" {:<32} +{}", r.contact.display_name, r.contact.phone)),
    ];
    if let Some(ms) = r.elapsed_ms {
        spans.push(Span::styled(
            format!("  {ms} ms"),
            Style::default().fg(Color::Gray),
        ));
    }
    if let Some(err) = r.error.as_deref() {
        spans.push(Span::styled(format!("  {err}"), Style::default().fg(Color::Red)));
    }
    let line = Line::from(spans);
    if selected {
        line.style(Style::default().add_modifier(Modifier::REVERSED))
    } else {
        line
    }
}

fn status_lines(state: &UiState, width: u16) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    push_wrapped_status_kv(&mut lines, "Step", &state.batch.step, width);
    push_wrapped_status_kv(&mut lines, "Info", &state.info, width);
    if let Some(path) = state.last_saved_path.as_deref() {
        push_wrapped_status_kv(&mut lines, "Saved", path, width);
    }
    lines
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    if area.height < 26 {
        return draw_dashboard_compact(area, f, state);
    }

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3), // Progress gauge
                Constraint::Length(7), // Counts + current contact
                Constraint::Length(6), // Dispatch time sparkline
                Constraint::Min(0),    // Recent results
                Constraint::Length(5), // Status
            ]
            .as_ref(),
        )
        .split(area);

    f.render_widget(progress_gauge(state), main[0]);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(main[1]);
    f.render_widget(
        Paragraph::new(counts_lines(state))
            .block(Block::default().borders(Borders::ALL).title("Counts")),
        cards[0],
    );
    f.render_widget(
        Paragraph::new(current_lines(state))
            .block(Block::default().borders(Borders::ALL).title("Current")),
        cards[1],
    );

    let latencies = crate::metrics::dispatch_latencies_ms(&state.batch.results);
    let spark_title = match crate::metrics::compute_metrics(&latencies) {
        Some((mean, median, _, _)) => Line::from(vec![
            Span::raw("Dispatch time (avg "),
            Span::styled(format!("{mean:.0}"), Style::default().fg(Color::Cyan)),
            Span::raw(" / med "),
            Span::styled(format!("{median:.0}"), Style::default().fg(Color::Cyan)),
            Span::raw(" ms)"),
        ]),
        None => Line::from("Dispatch time"),
    };
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(spark_title))
            .data(&state.dispatch_series)
            .style(Style::default().fg(Color::Cyan)),
        main[2],
    );

    // Newest results at the bottom, as many as fit.
    let rows = main[3].height.saturating_sub(2) as usize;
    let results = &state.batch.results;
    let start = results.len().saturating_sub(rows);
    let recent: Vec<Line> = results[start..]
        .iter()
        .enumerate()
        .map(|(i, r)| result_line(start + i, r, false))
        .collect();
    f.render_widget(
        Paragraph::new(recent).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Recent sends ({})", results.len())),
        ),
        main[3],
    );

    let mut status = status_lines(state, main[4].width);
    status.push(Line::from(vec![
        Span::styled("c", Style::default().fg(Color::Magenta)),
        Span::raw(" cancel  "),
        Span::styled("q", Style::default().fg(Color::Magenta)),
        Span::raw(" quit  "),
        Span::styled("?", Style::default().fg(Color::Magenta)),
        Span::raw(" help"),
    ]));
    f.render_widget(
        Paragraph::new(status).block(Block::default().borders(Borders::ALL).title("Status")),
        main[4],
    );
}

fn draw_dashboard_compact(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let content = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    f.render_widget(progress_gauge(state), content[0]);

    let row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(content[1]);

    let mut left = counts_lines(state);
    left.extend(status_lines(state, row[0].width));
    f.render_widget(
        Paragraph::new(left).block(Block::default().borders(Borders::ALL).title("Status")),
        row[0],
    );
    f.render_widget(
        Paragraph::new(current_lines(state))
            .block(Block::default().borders(Borders::ALL).title("Current")),
        row[1],
    );
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let results = &state.batch.results;
    if results.is_empty() {
        f.render_widget(
            Paragraph::new("No sends yet.")
                .block(Block::default().borders(Borders::ALL).title("Results")),
            area,
        );
        return;
    }

    let rows = area.height.saturating_sub(3) as usize;
    let mut lines = vec![Line::from(Span::styled(
        format!("{:>4}   {:<32} {}", "#", "Contact", "Phone"),
        Style::default().fg(Color::Gray),
    ))];
    lines.extend(
        results
            .iter()
            .enumerate()
            .skip(state.results_scroll_offset)
            .take(rows)
            .map(|(i, r)| result_line(i, r, i == state.results_selected)),
    );
    let title = format!(
        "Results ({} ok / {} failed)",
        state.batch.success_count, state.batch.failure_count
    );
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Contact, ContactSnapshot};
    use ratatui::backend::TestBackend;

    fn rendered(state: &UiState, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f.area(), f, state)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn waiting_state() -> UiState {
        let mut state = UiState::default();
        state.apply_batch(BatchState {
            phase: BatchPhase::Waiting,
            step: "Preparing send to Padaria".into(),
            current_index: 1,
            current_contact: Some(Contact {
                id: "2".into(),
                display_name: "Padaria".into(),
                normalized_phone_e164: Some("+5511988887777".into()),
                national_phone_number: None,
                google_place_id: None,
            }),
            total_contacts: 2,
            countdown_secs: 12,
            success_count: 1,
            results: vec![SendResult {
                success: true,
                contact: ContactSnapshot {
                    id: "1".into(),
                    display_name: "Mercado".into(),
                    phone: "5511999990000".into(),
                    normalized_phone_e164: None,
                    national_phone_number: None,
                },
                error: None,
                elapsed_ms: Some(240),
            }],
            ..Default::default()
        });
        state
    }

    #[test]
    fn dashboard_shows_countdown_and_current_contact() {
        let screen = rendered(&waiting_state(), 100, 32);
        assert!(screen.contains("1/2 (50%)"));
        assert!(screen.contains("Next in: 12s"));
        assert!(screen.contains("Contact: Padaria"));
        assert!(screen.contains("Mercado"));
    }

    #[test]
    fn compact_dashboard_on_small_terminal() {
        let screen = rendered(&waiting_state(), 100, 16);
        assert!(screen.contains("1/2 (50%)"));
        assert!(screen.contains("Phase:   waiting"));
        assert!(!screen.contains("Recent sends"));
    }

    #[test]
    fn results_tab_lists_every_send() {
        let mut state = waiting_state();
        state.tab = TAB_RESULTS;
        let screen = rendered(&state, 100, 20);
        assert!(screen.contains("Results (1 ok / 0 failed)"));
        assert!(screen.contains("+5511999990000"));
    }
}
