//! The fetcher seam between the run controller and remote sources.

use crate::record::Item;

/// Result of one fetch cycle. `Exhausted` and `Failed` are deliberately kept
/// apart: the remote answering "no more data" is not the same thing as the
/// remote being unreachable after every retry, even though both end a
/// historical run.
#[derive(Clone, Debug)]
pub enum FetchOutcome {
    /// A page of candidate items (posts, optionally followed by their comments).
    Items(Vec<Item>),
    /// The remote answered successfully with zero items.
    Exhausted,
    /// Transport error or non-success status after all retries.
    Failed,
}

impl FetchOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchOutcome::Exhausted | FetchOutcome::Failed)
    }
}

/// One batch of candidate items, bounded by a timestamp cursor and a page size.
///
/// `cursor` is the current watermark: fetch items strictly older than it when
/// backfilling, strictly newer when forward-filling. `None` means "no history
/// yet, start from the source's natural edge".
pub trait Fetcher {
    fn fetch(&mut self, cursor: Option<i64>, page_size: usize) -> FetchOutcome;
}
