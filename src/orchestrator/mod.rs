//! Application-level orchestration utilities.
//!
//! This module owns batch lifecycle control (cancel/quit) and post-run processing
//! such as auto-save and exports. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand, UiEvent};
pub(crate) use post_process::{process_run_completion, ReportTargets};
