use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which way the crawl pages through time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrawlDirection {
    /// Page toward older items; the watermark is the oldest timestamp seen.
    Backfill,
    /// Page toward newer items; the watermark is the newest timestamp seen.
    ForwardFill,
}

/// Granularity of the dedup key used by the accumulator and the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupKey {
    /// One row per item id; later mentions of the same item overwrite earlier ones.
    PerItem,
    /// One row per (item id, mention) pair.
    PerItemMention,
}

/// Row ordering of the persisted file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOrder {
    /// Rows already in the file first, rows added this run after them.
    Append,
    /// Rows added this run first, so the file reads newest-first.
    Prepend,
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub subreddit: String,              // normalized lowercase, no "r/"
    pub refs_path: PathBuf,             // the TSV the harvest lives in
    pub direction: CrawlDirection,
    pub dedup_key: DedupKey,
    pub write_order: WriteOrder,
    pub page_size: usize,               // items per fetch
    pub fetch_comments: bool,           // also scan comments of fetched posts
    pub fresh_start: bool,              // ignore any existing file on load
    pub keep_duplicates: bool,          // keep repeated mentions within one text
    pub context_width: usize,           // chars of snippet context on each side
    pub cycle_sleep: Duration,          // pacing delay between cycles
    pub run_limit: Option<Duration>,    // wall-clock budget; None = until exhaustion
    pub commit_after: Option<Duration>, // force a flush+commit once this elapses
    pub git_sync: bool,                 // commit/push the file after each flush
    pub commit_message: String,
    pub progress: bool,                 // show a live counter while running
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            subreddit: String::new(),
            refs_path: PathBuf::from("subreddit_refs.tsv"),
            direction: CrawlDirection::Backfill,
            dedup_key: DedupKey::PerItemMention,
            write_order: WriteOrder::Append,
            page_size: 100,
            fetch_comments: true,
            fresh_start: false,
            keep_duplicates: false,
            context_width: 100,
            cycle_sleep: Duration::from_secs(2),
            run_limit: None,
            commit_after: None,
            git_sync: false,
            commit_message: "update subreddit refs".to_string(),
            progress: true,
        }
    }
}

impl WatchOptions {
    pub fn with_subreddit(mut self, sub: impl AsRef<str>) -> Self {
        let mut s = sub.as_ref().trim().to_lowercase();
        if let Some(rest) = s.strip_prefix("r/") {
            s = rest.to_string();
        }
        self.subreddit = s;
        self
    }
    pub fn with_refs_path(mut self, path: impl AsRef<Path>) -> Self {
        self.refs_path = path.as_ref().to_path_buf();
        self
    }
    pub fn with_direction(mut self, dir: CrawlDirection) -> Self {
        self.direction = dir;
        self
    }
    pub fn with_dedup_key(mut self, key: DedupKey) -> Self {
        self.dedup_key = key;
        self
    }
    pub fn with_write_order(mut self, order: WriteOrder) -> Self {
        self.write_order = order;
        self
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }
    pub fn with_fetch_comments(mut self, yes: bool) -> Self {
        self.fetch_comments = yes;
        self
    }
    pub fn with_fresh_start(mut self, yes: bool) -> Self {
        self.fresh_start = yes;
        self
    }
    pub fn with_keep_duplicates(mut self, yes: bool) -> Self {
        self.keep_duplicates = yes;
        self
    }
    pub fn with_context_width(mut self, chars: usize) -> Self {
        self.context_width = chars;
        self
    }
    pub fn with_cycle_sleep(mut self, d: Duration) -> Self {
        self.cycle_sleep = d;
        self
    }
    pub fn with_run_limit(mut self, d: Option<Duration>) -> Self {
        self.run_limit = d;
        self
    }
    pub fn with_commit_after(mut self, d: Option<Duration>) -> Self {
        self.commit_after = d;
        self
    }
    pub fn with_git_sync(mut self, yes: bool) -> Self {
        self.git_sync = yes;
        self
    }
    pub fn with_commit_message(mut self, msg: impl Into<String>) -> Self {
        self.commit_message = msg.into();
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
}
