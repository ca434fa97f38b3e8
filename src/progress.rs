//! Progress reporting for the watch loop: a spinner-style counter since the
//! total amount of history is unknown up front.

use indicatif::{ProgressBar, ProgressStyle};

/// A small, ergonomic wrapper around an `indicatif` spinner.
/// - `inc_items(delta)` counts scanned items
/// - `set_status(msg)` updates the label (cycle number, new-row count)
/// - `finish(msg)` finalizes the bar with a message
pub struct WatchProgress {
    pb: ProgressBar,
}

impl WatchProgress {
    pub fn spinner<T: Into<String>>(label: T) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.green} {msg} {pos} items  it/s: {per_sec}  elapsed: {elapsed_precise}",
        )
        .unwrap();
        pb.set_style(style);
        pb.set_message(label.into());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    #[inline]
    pub fn inc_items(&self, delta: u64) {
        self.pb.inc(delta);
    }

    pub fn set_status<T: Into<String>>(&self, msg: T) {
        self.pb.set_message(msg.into());
    }

    pub fn finish<T: Into<String>>(&self, msg: T) {
        self.pb.finish_with_message(msg.into());
    }
}
