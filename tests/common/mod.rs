use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use subwatch::{FetchOutcome, Fetcher, Item, ItemKind, SubWatch};

/// A fetcher driven by a pre-recorded script of outcomes. Each call serves the
/// next entry; once the script runs out it reports exhaustion. The cursor of
/// every call is recorded so tests can assert on watermark movement, and an
/// optional probe path records how many lines the refs file had at each call
/// (to observe mid-run flushes).
pub struct ScriptedFetcher {
    script: Vec<FetchOutcome>,
    next: usize,
    pub cursors: Vec<Option<i64>>,
    pub probe_path: Option<PathBuf>,
    pub probed_lines: Vec<usize>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<FetchOutcome>) -> Self {
        Self { script, next: 0, cursors: Vec::new(), probe_path: None, probed_lines: Vec::new() }
    }

    pub fn probing(mut self, path: impl AsRef<Path>) -> Self {
        self.probe_path = Some(path.as_ref().to_path_buf());
        self
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&mut self, cursor: Option<i64>, _page_size: usize) -> FetchOutcome {
        self.cursors.push(cursor);
        if let Some(p) = &self.probe_path {
            self.probed_lines.push(read_lines(p).len());
        }
        let out = self
            .script
            .get(self.next)
            .cloned()
            .unwrap_or(FetchOutcome::Exhausted);
        self.next += 1;
        out
    }
}

/// A post with a title to scan and a creation timestamp.
pub fn post(id: &str, title: &str, ts: i64) -> Item {
    Item {
        id: id.to_string(),
        kind: ItemKind::Post,
        title: Some(title.to_string()),
        body: None,
        author: Some("alice".to_string()),
        subreddit: Some("watched".to_string()),
        created_utc: Some(ts),
    }
}

/// A comment with a body to scan.
pub fn comment(id: &str, body: &str, ts: i64) -> Item {
    Item {
        id: id.to_string(),
        kind: ItemKind::Comment,
        title: None,
        body: Some(body.to_string()),
        author: Some("bob".to_string()),
        subreddit: Some("watched".to_string()),
        created_utc: Some(ts),
    }
}

/// Read a text file line-by-line into strings; missing file reads as empty.
pub fn read_lines(path: &Path) -> Vec<String> {
    let Ok(f) = File::open(path) else {
        return Vec::new();
    };
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Data rows of the refs file (everything after the header).
pub fn read_rows(path: &Path) -> Vec<String> {
    let lines = read_lines(path);
    lines.into_iter().skip(1).collect()
}

/// A watch with test-friendly defaults: quiet, no pacing delay, no git.
pub fn quiet_watch(refs_path: &Path) -> SubWatch {
    SubWatch::new()
        .subreddit("watched")
        .refs_path(refs_path)
        .progress(false)
        .git_sync(false)
        .cycle_sleep(Duration::from_millis(0))
}
