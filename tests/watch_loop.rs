#[path = "common/mod.rs"]
mod common;

use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use subwatch::{CrawlDirection, DedupKey, FetchOutcome, RefStore, RunOutcome};

/// The canonical first-cycle scenario: no watermark yet, one page with one
/// mentioning post (ts 100) and one silent post (ts 90). After the run the
/// file holds exactly one row, for `p1` with mention `r/foo`, and the
/// persisted watermark is 90 (the oldest timestamp of the page).
#[test]
fn first_cycle_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![
        post("p1", "see r/foo", 100),
        post("p2", "no mention", 90),
    ])]);

    let summary = quiet_watch(&path).run(&mut fetcher).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Exhausted);
    assert_eq!(summary.new_records, 1);

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("p1\t"));
    assert!(rows[0].ends_with("\tr/foo"));

    let store = RefStore::new(&path, CrawlDirection::Backfill, DedupKey::PerItemMention);
    assert_eq!(store.load(false).unwrap().watermark, Some(90));
    // First fetch had no cursor, second resumed from the new watermark.
    assert_eq!(fetcher.cursors, vec![None, Some(90)]);
}

/// A fetcher that is already exhausted ends the run within one cycle, without
/// any run limit configured.
#[test]
fn exhaustion_terminates_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Exhausted]);
    let summary = quiet_watch(&path).run(&mut fetcher).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Exhausted);
    assert_eq!(summary.cycles, 0);
    assert_eq!(fetcher.cursors.len(), 1);
    // The final flush still writes the (empty) file with its header.
    assert_eq!(read_lines(&path).len(), 1);
}

/// A fetch that failed after retries is reported as `Failed`, not folded into
/// exhaustion, and the rows gathered so far are still flushed.
#[test]
fn failure_is_distinct_from_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![
        FetchOutcome::Items(vec![post("p1", "see r/foo", 100)]),
        FetchOutcome::Failed,
    ]);
    let summary = quiet_watch(&path).run(&mut fetcher).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.new_records, 1);
    assert_eq!(read_rows(&path).len(), 1, "partial harvest survives the failure");
}

/// Across successive backfill cycles the cursor only moves toward older
/// timestamps.
#[test]
fn backfill_watermark_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![
        FetchOutcome::Items(vec![post("a", "x", 100), post("b", "x", 90)]),
        FetchOutcome::Items(vec![post("c", "x", 80), post("d", "x", 70)]),
        FetchOutcome::Items(vec![post("e", "x", 60)]),
    ]);
    let summary = quiet_watch(&path).run(&mut fetcher).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Exhausted);
    assert_eq!(fetcher.cursors, vec![None, Some(90), Some(70), Some(60)]);
    let marks: Vec<i64> = fetcher.cursors.iter().flatten().copied().collect();
    assert!(marks.windows(2).all(|w| w[1] <= w[0]));
}

/// A page that fails to move the cursor ends the run instead of refetching the
/// same page forever.
#[test]
fn cursor_stall_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let same_page = FetchOutcome::Items(vec![post("p1", "see r/foo", 100)]);
    let mut fetcher = ScriptedFetcher::new(vec![same_page.clone(), same_page]);
    let summary = quiet_watch(&path).run(&mut fetcher).unwrap();

    assert_eq!(summary.outcome, RunOutcome::CursorStall);
    assert_eq!(fetcher.cursors, vec![None, Some(100)]);
    assert_eq!(read_rows(&path).len(), 1, "the duplicate page added no rows");
}

/// Re-running over an already-harvested stretch is idempotent end to end: the
/// number of unique keys on file never exceeds the number of unique items
/// observed, and a second run over the same data adds nothing.
#[test]
fn rerun_adds_no_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let page = FetchOutcome::Items(vec![
        post("p1", "see r/foo and r/bar", 100),
        post("p2", "see r/foo", 90),
    ]);

    let mut first = ScriptedFetcher::new(vec![page.clone()]);
    let s1 = quiet_watch(&path).run(&mut first).unwrap();
    assert_eq!(s1.new_records, 3);

    // Second run resumes at watermark 90; the source replays the same page.
    let mut second = ScriptedFetcher::new(vec![page]);
    let s2 = quiet_watch(&path).run(&mut second).unwrap();
    assert_eq!(s2.new_records, 0);
    assert_eq!(read_rows(&path).len(), 3);
}

/// Comment timestamps ride along with their post's page and never drive the
/// cursor; only post timestamps do.
#[test]
fn comments_do_not_move_the_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![
        post("p1", "see r/foo", 100),
        comment("c1", "also see r/bar", 150),
    ])]);
    let summary = quiet_watch(&path)
        .direction(CrawlDirection::ForwardFill)
        .run(&mut fetcher)
        .unwrap();

    assert_eq!(summary.new_records, 2);
    assert_eq!(
        fetcher.cursors,
        vec![None, Some(100)],
        "the comment's newer timestamp must not advance the cursor"
    );
}

/// With a zero force-commit threshold the file is flushed after the first
/// cycle, before the next fetch, not only at termination.
#[test]
fn force_commit_flushes_mid_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![
        FetchOutcome::Items(vec![post("p1", "see r/foo", 100)]),
        FetchOutcome::Items(vec![post("p2", "see r/bar", 90)]),
    ])
    .probing(&path);

    let summary = quiet_watch(&path)
        .commit_after(Some(Duration::from_millis(0)))
        .run(&mut fetcher)
        .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Exhausted);

    // Probe at fetch #2 already sees the header and p1's row on disk.
    assert_eq!(fetcher.probed_lines[0], 0);
    assert!(fetcher.probed_lines[1] >= 2);
}

/// Raising the cancel flag stops the loop at the next cycle boundary with a
/// best-effort final flush.
#[test]
fn cancellation_stops_at_cycle_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let watch = quiet_watch(&path);
    watch.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![post("p1", "x", 100)])]);
    let summary = watch.run(&mut fetcher).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert_eq!(summary.cycles, 0);
    assert!(fetcher.cursors.is_empty(), "cancellation is checked before fetching");
    assert_eq!(read_lines(&path).len(), 1, "final flush still writes the header");
}

/// A non-interactive input that is at EOF from the start (a deployed run with
/// stdin detached) must never arm the EOF watcher: the flag stays down and the
/// run fetches to exhaustion instead of cancelling before the first cycle.
#[test]
fn detached_stdin_never_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let watch = quiet_watch(&path);
    let armed = subwatch::cancel_on_eof(std::io::Cursor::new(Vec::new()), false, watch.cancel_flag());
    assert!(!armed);

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![post(
        "p1",
        "see r/foo",
        100,
    )])]);
    let summary = watch.run(&mut fetcher).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Exhausted);
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.new_records, 1);
}

/// On an interactive input, end-of-input is a stop request: the watcher drains
/// the reader and raises the flag.
#[test]
fn interactive_eof_raises_the_flag() {
    let flag = Arc::new(AtomicBool::new(false));
    let input = std::io::Cursor::new(b"one line\n".to_vec());
    assert!(subwatch::cancel_on_eof(input, true, flag.clone()));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.load(Ordering::Relaxed) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(flag.load(Ordering::Relaxed));
}

/// A zero run limit terminates on the time budget before any fetch.
#[test]
fn run_limit_bounds_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![post("p1", "x", 100)])]);
    let summary = quiet_watch(&path)
        .run_limit(Some(Duration::from_secs(0)))
        .run(&mut fetcher)
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::TimeBudget);
    assert_eq!(summary.cycles, 0);
}

/// Self-references never reach the file: a post that only mentions the
/// monitored subreddit produces no record.
#[test]
fn self_references_produce_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![post(
        "p1",
        "meta post about r/watched itself",
        100,
    )])]);
    let summary = quiet_watch(&path).run(&mut fetcher).unwrap();

    assert_eq!(summary.new_records, 0);
    assert_eq!(read_rows(&path).len(), 0);
}

/// Per-item dedup keeps one row per item even when it mentions several
/// subreddits.
#[test]
fn per_item_dedup_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refs.tsv");

    let mut fetcher = ScriptedFetcher::new(vec![FetchOutcome::Items(vec![post(
        "p1",
        "see r/foo and r/bar",
        100,
    )])]);
    let summary = quiet_watch(&path)
        .dedup_key(DedupKey::PerItem)
        .run(&mut fetcher)
        .unwrap();

    assert_eq!(summary.new_records, 1);
    let rows = read_rows(&path);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].ends_with("\tr/bar"), "the later mention wins under PerItem");
}
