use anyhow::Result;
use std::io::IsTerminal;
use std::time::Duration;
use subwatch::{CrawlDirection, PushshiftClient, SubWatch};

const SUBREDDIT: &str = "ofcoursethatsasub";
const REFS_FILE: &str = "./subreddit_refs.tsv";

// Budgets sized for a 6-hour CI job slot: stop fetching at 5h30m and make
// sure at least one commit lands well before that.
const RUN_LIMIT: Duration = Duration::from_secs(5 * 3600 + 30 * 60);
const COMMIT_AFTER: Duration = Duration::from_secs(30 * 60);

fn main() -> Result<()> {
    subwatch::init_tracing_once();

    let watch = SubWatch::new()
        .subreddit(SUBREDDIT)
        .refs_path(REFS_FILE)
        .direction(CrawlDirection::Backfill)
        .fetch_comments(true)
        .run_limit(Some(RUN_LIMIT))
        .commit_after(Some(COMMIT_AFTER))
        .git_sync(true)
        .commit_message("update subreddit refs")
        .progress(true);

    // Ctrl-D on an interactive session stops the run at the next cycle
    // boundary. CI runs with stdin detached, so the watcher stays unarmed
    // there and the loop runs to its budget.
    let cancel = watch.cancel_flag();
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    subwatch::cancel_on_eof(std::io::BufReader::new(stdin), interactive, cancel);

    let mut fetcher =
        PushshiftClient::new(SUBREDDIT, CrawlDirection::Backfill).fetch_comments(true);

    let summary = watch.run(&mut fetcher)?;
    println!(
        "Done: {} cycles, {} items scanned, {} new rows ({} total), outcome {:?}",
        summary.cycles, summary.items_seen, summary.new_records, summary.total_records, summary.outcome
    );
    Ok(())
}
