//! Batch sending orchestrator.
//!
//! Sends one message per eligible contact, strictly in order, pausing between
//! sends. State is published through a `watch` channel so any number of
//! observers can render it; the run loop is the only writer apart from the
//! `cancel_requested` latch.

mod cancel;
mod pacing;

use crate::model::{
    now_rfc3339, BatchOutcome, BatchPhase, BatchReport, BatchState, Contact, ContactSnapshot,
    Pacing, SendMessagePayload, SendMessageResponse, SendResult,
};
use async_trait::async_trait;
use cancel::CancelSignal;
use pacing::WaitOutcome;
use rand::SeedableRng;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const UNKNOWN_ERROR: &str = "unknown error";

/// Delivers one WhatsApp message. `payload.number` is already digits only.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn send_message(&self, payload: &SendMessagePayload)
        -> anyhow::Result<SendMessageResponse>;
}

/// Per-contact failure, recorded into [`SendResult::error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("invalid phone")]
    InvalidPhone,
    #[error("{0}")]
    Dispatch(String),
}

/// Reasons a batch cannot begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("a batch is already running")]
    AlreadyRunning,
}

/// Completion of a started batch. Resolves to the final report.
pub struct BatchHandle {
    handle: JoinHandle<BatchReport>,
}

impl Future for BatchHandle {
    type Output = Result<BatchReport, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Shared handle to the sending orchestrator. Clones share one state.
#[derive(Clone)]
pub struct SendingOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    dispatcher: Arc<dyn MessageDispatcher>,
    state_tx: watch::Sender<BatchState>,
    // Some while a run is active.
    active: Mutex<Option<Arc<CancelSignal>>>,
}

impl SendingOrchestrator {
    pub fn new(dispatcher: Arc<dyn MessageDispatcher>) -> Self {
        let (state_tx, _) = watch::channel(BatchState::default());
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                state_tx,
                active: Mutex::new(None),
            }),
        }
    }

    /// Receive every published state change.
    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.inner.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> BatchState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_active().is_some()
    }

    /// Start a batch with a fixed interval between sends.
    pub fn start(
        &self,
        contacts: Vec<Contact>,
        message: impl Into<String>,
        interval_secs: u64,
    ) -> Result<BatchHandle, StartError> {
        self.start_with_pacing(contacts, message, Pacing::fixed_secs(interval_secs))
    }

    /// Reset state, keep the eligible contacts and spawn the run loop.
    /// Must be called from within a Tokio runtime.
    pub fn start_with_pacing(
        &self,
        contacts: Vec<Contact>,
        message: impl Into<String>,
        pacing: Pacing,
    ) -> Result<BatchHandle, StartError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(StartError::EmptyMessage);
        }

        let signal = {
            let mut active = self.inner.lock_active();
            if active.is_some() {
                return Err(StartError::AlreadyRunning);
            }
            let signal = Arc::new(CancelSignal::default());
            *active = Some(signal.clone());
            signal
        };

        let submitted = contacts.len();
        let eligible: Vec<Contact> = contacts.into_iter().filter(Contact::is_eligible).collect();
        if eligible.len() < submitted {
            debug!(
                skipped = submitted - eligible.len(),
                "contacts without a usable phone skipped"
            );
        }

        self.inner.state_tx.send_replace(BatchState {
            phase: BatchPhase::Waiting,
            step: "Starting batch".into(),
            total_contacts: eligible.len(),
            ..Default::default()
        });

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run(eligible, message, pacing, signal).await });
        Ok(BatchHandle { handle })
    }

    /// Request cancellation of the active run. Idempotent; a no-op when idle.
    pub fn cancel(&self) {
        let active = self.inner.lock_active();
        let Some(signal) = active.as_ref() else {
            return;
        };
        if !signal.cancel() {
            return;
        }
        info!("batch cancel requested");
        self.inner.state_tx.send_if_modified(|s| {
            if s.cancel_requested {
                return false;
            }
            s.cancel_requested = true;
            s.step = "Cancelling".into();
            true
        });
    }
}

/// Clears the active slot if the run task dies before its normal finish.
/// Only clears its own signal, never a slot taken by a later run.
struct ActiveGuard {
    inner: Arc<Inner>,
    signal: Arc<CancelSignal>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.inner.lock_active();
        if active
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, &self.signal))
        {
            *active = None;
        }
    }
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, Option<Arc<CancelSignal>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, f: impl FnOnce(&mut BatchState)) {
        self.state_tx.send_modify(f);
    }

    async fn run(
        self: Arc<Self>,
        contacts: Vec<Contact>,
        message: String,
        pacing: Pacing,
        cancel: Arc<CancelSignal>,
    ) -> BatchReport {
        let _guard = ActiveGuard {
            inner: self.clone(),
            signal: cancel.clone(),
        };
        let started_at_utc = now_rfc3339();
        let mut rng = rand::rngs::StdRng::from_entropy();
        info!(
            total = contacts.len(),
            pacing = %pacing.describe(),
            "batch started"
        );

        let mut cancelled = false;
        for (i, contact) in contacts.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.publish(|s| {
                s.current_index = i;
                s.current_contact = Some(contact.clone());
                s.step = format!("Preparing send to {}", contact.display_name);
            });

            if i > 0 {
                let secs = pacing.next_wait_secs(&mut rng);
                let waited = pacing::countdown(secs, &cancel, |remaining| {
                    self.publish(|s| {
                        s.phase = BatchPhase::Waiting;
                        s.countdown_secs = remaining;
                    })
                })
                .await;
                if waited == WaitOutcome::Cancelled {
                    cancelled = true;
                    break;
                }
            }

            self.publish(|s| {
                s.phase = BatchPhase::Sending;
                s.countdown_secs = 0;
                s.step = format!("Sending message to {}", contact.display_name);
            });

            let result = self.send_one(contact, &message).await;
            self.publish(move |s| {
                if result.success {
                    s.success_count += 1;
                } else {
                    s.failure_count += 1;
                }
                s.results.push(result);
            });
        }

        let outcome = if cancelled {
            BatchOutcome::Cancelled
        } else {
            BatchOutcome::Completed
        };
        // Terminal state and slot release happen under one lock: once an
        // observer sees Completed/Cancelled, start() succeeds and cancel() is a no-op.
        let state = {
            let mut active = self.lock_active();
            self.publish(|s| {
                s.countdown_secs = 0;
                match outcome {
                    BatchOutcome::Completed => {
                        s.phase = BatchPhase::Completed;
                        s.step = "Batch finished".into();
                    }
                    BatchOutcome::Cancelled => {
                        s.phase = BatchPhase::Cancelled;
                        s.step = "Batch stopped by user".into();
                    }
                }
            });
            *active = None;
            self.state_tx.borrow().clone()
        };
        info!(
            success = state.success_count,
            failure = state.failure_count,
            ?outcome,
            "batch finished"
        );
        BatchReport {
            started_at_utc,
            finished_at_utc: now_rfc3339(),
            message,
            pacing,
            total_contacts: state.total_contacts,
            success_count: state.success_count,
            failure_count: state.failure_count,
            outcome,
            results: state.results,
        }
    }

    async fn send_one(&self, contact: &Contact, message: &str) -> SendResult {
        let Some(number) = contact.dispatch_phone() else {
            warn!(contact = %contact.id, "no usable phone at send time");
            return failure(
                ContactSnapshot::new(contact, contact.raw_phone()),
                SendError::InvalidPhone,
                None,
            );
        };

        let payload = SendMessagePayload {
            text: message.to_string(),
            number: number.clone(),
            google_place_id: contact.google_place_id.clone(),
        };
        let started = Instant::now();
        let outcome = self.dispatcher.send_message(&payload).await;
        let elapsed_ms = Some(started.elapsed().as_millis() as u64);
        let snapshot = ContactSnapshot::new(contact, number);

        match outcome {
            Ok(SendMessageResponse { success: true, .. }) => {
                debug!(contact = %contact.id, "message sent");
                SendResult {
                    success: true,
                    contact: snapshot,
                    error: None,
                    elapsed_ms,
                }
            }
            Ok(resp) => {
                let reason = resp
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.into());
                warn!(contact = %contact.id, %reason, "send rejected");
                failure(snapshot, SendError::Dispatch(reason), elapsed_ms)
            }
            Err(e) => {
                let mut reason = format!("{e:#}");
                if reason.trim().is_empty() {
                    reason = UNKNOWN_ERROR.into();
                }
                warn!(contact = %contact.id, %reason, "send failed");
                failure(snapshot, SendError::Dispatch(reason), elapsed_ms)
            }
        }
    }
}

fn failure(contact: ContactSnapshot, err: SendError, elapsed_ms: Option<u64>) -> SendResult {
    SendResult {
        success: false,
        contact,
        error: Some(err.to_string()),
        elapsed_ms,
    }
}
