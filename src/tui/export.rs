use crate::model::{BatchReport, SendResult};
use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Clipboard manager channel, initialized on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Save the finished report to the history directory and update `state.info`.
pub fn save_and_show_path(report: &BatchReport, state: &mut UiState) {
    match crate::storage::save_report(report) {
        Ok(path) => {
            state.info = format!("Saved: {}", path.display());
            state.last_saved_path = Some(path.to_string_lossy().to_string());
        }
        Err(e) => {
            state.info = format!("Save failed: {e:#}");
        }
    }
}

/// Phones of failed sends, comma separated, in send order. Only numbers taken
/// from the E.164 field get a `+`; national fallbacks are copied as digits.
pub fn failed_phones_text(results: &[SendResult]) -> Option<String> {
    let phones: Vec<String> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            if r.contact.dispatched_via_e164() {
                format!("+{}", r.contact.phone)
            } else {
                r.contact.phone.clone()
            }
        })
        .collect();
    if phones.is_empty() {
        None
    } else {
        Some(phones.join(","))
    }
}

/// Start the clipboard thread once. Each copy keeps its clipboard instance alive
/// for a moment so clipboard managers on Linux can read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
