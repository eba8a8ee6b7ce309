//! Batch lifecycle controller.
//!
//! Owns cancel/quit handling for an active batch and emits events for presentation layers.

use crate::engine::{BatchHandle, SendingOrchestrator};
use crate::model::BatchReport;
use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by UI layers to control the running batch.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Cancel,
    Quit,
}

/// Events sent back to UI layers. Live progress travels through the
/// orchestrator's state channel; these cover everything else.
#[derive(Debug, Clone)]
pub(crate) enum UiEvent {
    Info(String),
    RunFinished(Box<BatchReport>),
}

/// Drive one batch to completion, forwarding UI commands to the orchestrator.
/// Returns the final report once the batch ended and the UI asked to quit.
pub(crate) async fn run_controller(
    orchestrator: SendingOrchestrator,
    handle: BatchHandle,
    event_tx: UnboundedSender<UiEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<Option<BatchReport>> {
    let mut handle = Some(handle);
    let mut report = None;
    let mut quit_pending = false;
    // Cancel watchdog: a send already in flight delays the stop; keep the user informed.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Cancel) => {
                        if handle.is_some() {
                            orchestrator.cancel();
                            let _ = event_tx.send(UiEvent::Info("Cancelling…".into()));
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the batch to stop so the report is complete.
                        quit_pending = true;
                        if handle.is_some() {
                            orchestrator.cancel();
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        } else {
                            break Ok(report.take());
                        }
                    }
                }
            }
            // Keep the handle in place until this branch wins; dropping it early would
            // lose the completion.
            maybe_done = async {
                if let Some(h) = handle.as_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    handle = None;
                    cancel_deadline = None;
                    match join_res {
                        Ok(r) => {
                            let _ = event_tx.send(UiEvent::RunFinished(Box::new(r.clone())));
                            report = Some(r);
                        }
                        Err(e) => {
                            let _ = event_tx.send(UiEvent::Info(format!("Batch task failed: {e}")));
                            if quit_pending {
                                break Err(anyhow::anyhow!("batch task failed: {e}"));
                            }
                        }
                    }
                    if quit_pending {
                        break Ok(report.take());
                    }
                }
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline && handle.is_some() {
                        let _ = event_tx.send(UiEvent::Info(
                            "Still cancelling… waiting for the current send to finish".into(),
                        ));
                        cancel_deadline = None;
                    }
                }
            }
        }
    };

    res
}
