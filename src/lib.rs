mod accumulate;
mod config;
mod extract;
mod fetch;
mod git_sync;
mod progress;
mod pushshift;
mod record;
mod reddit;
mod store;
mod util;
mod watch;

pub use crate::config::{CrawlDirection, DedupKey, WatchOptions, WriteOrder};
pub use crate::record::{Item, ItemKind, RefRecord, COLUMNS};
pub use crate::watch::{RunOutcome, RunSummary, SubWatch};

// Expose the fetcher seam so callers can plug in their own sources.
pub use crate::fetch::{FetchOutcome, Fetcher};
pub use crate::pushshift::PushshiftClient;
pub use crate::reddit::{RedditClient, RedditCredentials};

// Expose the building blocks for direct use and for integration tests.
pub use crate::accumulate::RefAccumulator;
pub use crate::extract::{Mention, MentionScanner};
pub use crate::git_sync::GitSync;
pub use crate::store::{fold_watermark, LoadedRefs, RefStore};

// Tracing init + cancellation wiring so binaries can import from the crate root.
pub use crate::util::{cancel_on_eof, init_tracing_once};
