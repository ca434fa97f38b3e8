//! The run controller: wires store, scanner, accumulator, fetcher and sink
//! into the crawl-dedup-persist cycle, bounded by wall clock and exhaustion.

use crate::accumulate::RefAccumulator;
use crate::config::{CrawlDirection, DedupKey, WatchOptions, WriteOrder};
use crate::extract::MentionScanner;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::git_sync::GitSync;
use crate::progress::WatchProgress;
use crate::record::{ItemKind, RefRecord};
use crate::store::{fold_watermark, RefStore};
use crate::util::init_tracing_once;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source answered with zero items: backfill/forward-fill complete.
    Exhausted,
    /// A fetch failed after all retries. Distinct from `Exhausted` so a
    /// scheduler can tell an outage from a finished crawl.
    Failed,
    /// The wall-clock run limit elapsed.
    TimeBudget,
    /// The cancel flag was raised (operator interruption).
    Cancelled,
    /// A page did not move the cursor; looping further would refetch it.
    CursorStall,
}

/// What one run accomplished.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub cycles: u64,
    pub items_seen: u64,
    pub new_records: u64,
    pub total_records: u64,
    pub outcome: RunOutcome,
}

/// Loop state. `FlushPending` is entered when the force-commit threshold
/// elapses and left once the flush lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Running,
    FlushPending,
    Terminated(RunOutcome),
}

/// Builder + run controller for one watched subreddit.
///
/// ```no_run
/// use subwatch::{SubWatch, PushshiftClient, CrawlDirection};
/// use std::time::Duration;
///
/// let watch = SubWatch::new()
///     .subreddit("ofcoursethatsasub")
///     .refs_path("subreddit_refs.tsv")
///     .run_limit(Some(Duration::from_secs(5 * 60 * 60)))
///     .commit_after(Some(Duration::from_secs(4 * 60 * 60)));
/// let mut fetcher = PushshiftClient::new("ofcoursethatsasub", CrawlDirection::Backfill)
///     .fetch_comments(true);
/// let summary = watch.run(&mut fetcher).unwrap();
/// println!("{summary:?}");
/// ```
pub struct SubWatch {
    pub(crate) opts: WatchOptions,
    cancel: Arc<AtomicBool>,
}

impl Default for SubWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SubWatch {
    pub fn new() -> Self {
        Self { opts: WatchOptions::default(), cancel: Arc::new(AtomicBool::new(false)) }
    }

    // -------- Builder methods --------
    pub fn subreddit(mut self, sub: impl AsRef<str>) -> Self { self.opts = self.opts.with_subreddit(sub); self }
    pub fn refs_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_refs_path(path); self }
    pub fn direction(mut self, dir: CrawlDirection) -> Self { self.opts = self.opts.with_direction(dir); self }
    pub fn dedup_key(mut self, key: DedupKey) -> Self { self.opts = self.opts.with_dedup_key(key); self }
    pub fn write_order(mut self, order: WriteOrder) -> Self { self.opts = self.opts.with_write_order(order); self }
    pub fn page_size(mut self, n: usize) -> Self { self.opts = self.opts.with_page_size(n); self }
    pub fn fetch_comments(mut self, yes: bool) -> Self { self.opts = self.opts.with_fetch_comments(yes); self }
    pub fn fresh_start(mut self, yes: bool) -> Self { self.opts = self.opts.with_fresh_start(yes); self }
    pub fn keep_duplicates(mut self, yes: bool) -> Self { self.opts = self.opts.with_keep_duplicates(yes); self }
    pub fn context_width(mut self, chars: usize) -> Self { self.opts = self.opts.with_context_width(chars); self }
    pub fn cycle_sleep(mut self, d: Duration) -> Self { self.opts = self.opts.with_cycle_sleep(d); self }
    pub fn run_limit(mut self, d: Option<Duration>) -> Self { self.opts = self.opts.with_run_limit(d); self }
    pub fn commit_after(mut self, d: Option<Duration>) -> Self { self.opts = self.opts.with_commit_after(d); self }
    pub fn git_sync(mut self, yes: bool) -> Self { self.opts = self.opts.with_git_sync(yes); self }
    pub fn commit_message(mut self, msg: impl Into<String>) -> Self { self.opts = self.opts.with_commit_message(msg); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }

    /// Shared flag for cooperative interruption. Raise it from a signal
    /// handler or another thread; the loop checks it at cycle boundaries only.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run the crawl-dedup-persist loop to termination and return a summary.
    /// The accumulated rows are flushed (and git-synced, if enabled) one final
    /// time on every exit path, including fetch failure and cancellation.
    pub fn run(self, fetcher: &mut dyn Fetcher) -> Result<RunSummary> {
        init_tracing_once();
        if self.opts.subreddit.is_empty() {
            return Err(anyhow!("subreddit is required"));
        }
        if let (Some(commit), Some(limit)) = (self.opts.commit_after, self.opts.run_limit) {
            if commit >= limit {
                tracing::warn!(
                    "commit_after >= run_limit; the forced flush may never fire before the budget ends"
                );
            }
        }

        if let Some(parent) = self.opts.refs_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }

        let store = RefStore::new(&self.opts.refs_path, self.opts.direction, self.opts.dedup_key);
        let loaded = store.load(self.opts.fresh_start)?;
        let mut watermark = loaded.watermark;
        log_resume_point(watermark, self.opts.direction);

        let scanner = MentionScanner::new(
            &self.opts.subreddit,
            self.opts.keep_duplicates,
            self.opts.context_width,
        );
        let mut acc = RefAccumulator::new(self.opts.dedup_key);
        acc.seed(loaded.records);

        let git = self.opts.git_sync.then(|| {
            let repo_dir = self
                .opts
                .refs_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            GitSync::new(repo_dir, &self.opts.commit_message)
        });
        let pb = self
            .opts
            .progress
            .then(|| WatchProgress::spinner(format!("Watching r/{}", self.opts.subreddit)));

        let started = Instant::now();
        let mut last_flush = Instant::now();
        let mut cycles: u64 = 0;
        let mut items_seen: u64 = 0;
        let mut new_records: u64 = 0;
        let mut state = RunState::Running;

        let outcome = loop {
            match state {
                RunState::Terminated(outcome) => break outcome,
                RunState::FlushPending => {
                    if let Err(e) = flush_and_sync(&store, &acc, self.opts.write_order, git.as_ref()) {
                        tracing::warn!(error = %e, "mid-run flush failed; rows stay in memory until the next flush");
                    } else {
                        last_flush = Instant::now();
                    }
                    state = RunState::Running;
                }
                RunState::Running => {
                    // Cycle-boundary checks: cancellation, then the time budget.
                    if self.cancel.load(Ordering::Relaxed) {
                        state = RunState::Terminated(RunOutcome::Cancelled);
                        continue;
                    }
                    if let Some(limit) = self.opts.run_limit {
                        if started.elapsed() >= limit {
                            state = RunState::Terminated(RunOutcome::TimeBudget);
                            continue;
                        }
                    }

                    match fetcher.fetch(watermark, self.opts.page_size) {
                        FetchOutcome::Failed => {
                            tracing::warn!("fetch failed after retries; ending run");
                            state = RunState::Terminated(RunOutcome::Failed);
                        }
                        FetchOutcome::Exhausted => {
                            tracing::info!("source exhausted; ending run");
                            state = RunState::Terminated(RunOutcome::Exhausted);
                        }
                        FetchOutcome::Items(items) => {
                            cycles += 1;
                            items_seen += items.len() as u64;
                            if let Some(pb) = &pb {
                                pb.inc_items(items.len() as u64);
                            }

                            let mut page_mark: Option<i64> = None;
                            for item in &items {
                                // Only post timestamps drive the cursor; comment
                                // timestamps trail their post and would drag it.
                                if item.kind == ItemKind::Post {
                                    if let Some(ts) = item.created_utc {
                                        page_mark =
                                            Some(fold_watermark(self.opts.direction, page_mark, ts));
                                    }
                                }
                                for (mention, context) in scanner.scan_item(item) {
                                    let rec = RefRecord {
                                        id: item.id.clone(),
                                        kind: item.kind,
                                        context,
                                        subreddit: format!("r/{}", self.opts.subreddit),
                                        author: item.author.clone(),
                                        created_utc: item.created_utc,
                                        mention,
                                    };
                                    if acc.insert(rec) {
                                        new_records += 1;
                                    }
                                }
                            }

                            match advance_watermark(self.opts.direction, watermark, page_mark) {
                                Some(next) => watermark = Some(next),
                                None => {
                                    tracing::warn!(
                                        cursor = ?watermark,
                                        "page did not move the cursor; ending run"
                                    );
                                    state = RunState::Terminated(RunOutcome::CursorStall);
                                    continue;
                                }
                            }

                            if let Some(pb) = &pb {
                                pb.set_status(format!(
                                    "Watching r/{} (cycle {}, {} new rows)",
                                    self.opts.subreddit, cycles, new_records
                                ));
                            }

                            if let Some(commit_after) = self.opts.commit_after {
                                if last_flush.elapsed() >= commit_after {
                                    state = RunState::FlushPending;
                                    continue;
                                }
                            }
                            std::thread::sleep(self.opts.cycle_sleep);
                        }
                    }
                }
            }
        };

        // Best-effort final flush on every exit path.
        flush_and_sync(&store, &acc, self.opts.write_order, git.as_ref())
            .with_context(|| format!("final flush of {}", self.opts.refs_path.display()))?;

        let summary = RunSummary {
            cycles,
            items_seen,
            new_records,
            total_records: acc.len() as u64,
            outcome,
        };
        if let Some(pb) = &pb {
            pb.finish(format!(
                "done: {} new rows, {} total, {:?}",
                summary.new_records, summary.total_records, summary.outcome
            ));
        }
        tracing::info!(
            cycles = summary.cycles,
            items = summary.items_seen,
            new_rows = summary.new_records,
            total_rows = summary.total_records,
            outcome = ?summary.outcome,
            "run finished"
        );
        Ok(summary)
    }
}

/// Next cursor value, or `None` when the page failed to move it (stall).
/// Movement must be strictly away from the starting point: lower for
/// backfill, higher for forward-fill.
fn advance_watermark(
    direction: CrawlDirection,
    current: Option<i64>,
    page_mark: Option<i64>,
) -> Option<i64> {
    let page = page_mark?;
    match current {
        None => Some(page),
        Some(cur) => {
            let folded = fold_watermark(direction, Some(cur), page);
            if folded == cur {
                None
            } else {
                Some(folded)
            }
        }
    }
}

fn flush_and_sync(
    store: &RefStore,
    acc: &RefAccumulator,
    order: WriteOrder,
    git: Option<&GitSync>,
) -> Result<()> {
    store.flush_ordered(acc, order)?;
    if let Some(git) = git {
        git.sync(store.path());
    }
    Ok(())
}

fn log_resume_point(watermark: Option<i64>, direction: CrawlDirection) {
    match watermark {
        None => tracing::info!("no existing data; starting from the source's edge"),
        Some(ts) => {
            let human = OffsetDateTime::from_unix_timestamp(ts)
                .ok()
                .and_then(|dt| dt.format(&Rfc3339).ok())
                .unwrap_or_else(|| "invalid timestamp".to_string());
            tracing::info!(watermark = ts, at = %human, direction = ?direction, "resuming from persisted watermark");
        }
    }
}
