//! Terminal progress bars for byte transfers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use ferry_transfer::Reporter;

/// Bar over `total` bytes, or a byte-counting spinner when the total is
/// unknown (`0`).
pub fn bytes_bar(message: &str, total: u64) -> ProgressBar {
    let bar = if total > 0 {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
        {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bar
    } else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("  {spinner:.green} {msg} {bytes} ({bytes_per_sec})")
        {
            bar.set_style(style);
        }
        bar
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Moves a bar to each reported total.
pub struct BarReporter(ProgressBar);

impl BarReporter {
    pub fn new(bar: ProgressBar) -> Self {
        Self(bar)
    }
}

impl Reporter for BarReporter {
    fn progress(&self, cumulative: u64) {
        self.0.set_position(cumulative);
    }
}

/// Drive `bar` from a progress channel until the sender side closes.
pub fn follow(bar: ProgressBar, mut rx: UnboundedReceiver<u64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(total) = rx.recv().await {
            bar.set_position(total);
        }
        bar.finish_and_clear();
    })
}
