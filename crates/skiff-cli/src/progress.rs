//! Transfer progress display with progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use skiff_core::TransferEvent;
use tokio::sync::mpsc::UnboundedReceiver;

const BAR_TEMPLATE: &str = "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{msg}\n{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

/// Transfer progress tracker
pub struct TransferProgress {
    bar: ProgressBar,
    sized: bool,
}

impl TransferProgress {
    /// Create a new progress tracker; an unknown total shows a spinner
    #[must_use]
    pub fn new(total_bytes: Option<u64>, label: &str) -> Self {
        let bar = match total_bytes {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        let progress = Self {
            bar,
            sized: total_bytes.is_some(),
        };
        progress.apply_style();
        progress.bar.set_message(label.to_string());
        progress
    }

    fn apply_style(&self) {
        let template = if self.sized {
            BAR_TEMPLATE
        } else {
            SPINNER_TEMPLATE
        };
        let style = ProgressStyle::with_template(template)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        self.bar.set_style(style);
    }

    /// Switch to a sized bar once the total becomes known
    pub fn set_total(&mut self, total_bytes: Option<u64>) {
        if let (false, Some(total)) = (self.sized, total_bytes) {
            self.sized = true;
            self.bar.set_length(total);
            self.apply_style();
        }
    }

    /// Update progress
    pub fn update(&self, transferred_bytes: u64) {
        self.bar.set_position(transferred_bytes);
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    /// Abandon the progress bar (for errors)
    pub fn abandon_with_message(&self, msg: String) {
        self.bar.abandon_with_message(msg);
    }
}

/// Render events until the sender side is dropped
///
/// Returns the bar, if any event created one.
pub async fn render(
    mut events: UnboundedReceiver<TransferEvent>,
    label: String,
) -> Option<TransferProgress> {
    let mut progress: Option<TransferProgress> = None;

    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::DownloadBegin {
                status_code,
                content_length,
                ..
            } => {
                tracing::debug!("Response {} ({:?} bytes)", status_code, content_length);
                progress = Some(TransferProgress::new(content_length, &label));
            }
            TransferEvent::DownloadProgress {
                content_length,
                bytes_written,
                ..
            } => {
                let bar =
                    progress.get_or_insert_with(|| TransferProgress::new(content_length, &label));
                bar.set_total(content_length);
                bar.update(bytes_written);
            }
            TransferEvent::UploadBegin { .. } => {
                progress = Some(TransferProgress::new(None, &label));
            }
            TransferEvent::UploadProgress {
                total_bytes_expected_to_send,
                total_bytes_sent,
                ..
            } => {
                let bar = progress.get_or_insert_with(|| {
                    TransferProgress::new(total_bytes_expected_to_send, &label)
                });
                bar.set_total(total_bytes_expected_to_send);
                bar.update(total_bytes_sent);
            }
        }
    }

    progress
}

/// Format bytes in human-readable format
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}
