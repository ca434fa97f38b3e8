//! Historical-mode fetcher backed by the Pushshift search API.
//!
//! Pages arbitrarily far back (or forward) through a subreddit's submissions
//! by timestamp cursor, optionally expanding each submission into its comment
//! tree. Transient failures are retried with exponential backoff; a request
//! that still fails after every retry surfaces as `FetchOutcome::Failed`, not
//! as a silent empty page.

use crate::config::CrawlDirection;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::record::{Item, ItemKind};
use serde::Deserialize;
use std::thread::sleep;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.pushshift.io";
const DEFAULT_MAX_RETRIES: usize = 5;
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire envelope: every Pushshift search response wraps its hits in `data`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<PsItem>,
}

/// Minimal per-hit schema; extra fields are ignored. `created_utc` arrives as
/// an integer or a float depending on API era, so it is parsed as f64.
#[derive(Debug, Deserialize)]
struct PsItem {
    id: Option<String>,
    author: Option<String>,
    subreddit: Option<String>,
    created_utc: Option<f64>,
    title: Option<String>,    // submissions
    selftext: Option<String>, // submissions
    body: Option<String>,     // comments
}

impl PsItem {
    fn into_item(self, kind: ItemKind) -> Option<Item> {
        let id = self.id?;
        Some(Item {
            id,
            kind,
            title: self.title,
            body: match kind {
                ItemKind::Post => self.selftext,
                ItemKind::Comment => self.body,
            },
            author: self.author,
            subreddit: self.subreddit,
            created_utc: self.created_utc.map(|t| t as i64),
        })
    }
}

pub struct PushshiftClient {
    http: reqwest::blocking::Client,
    base_url: String,
    subreddit: String,
    direction: CrawlDirection,
    fetch_comments: bool,
    max_retries: usize,
    retry_base: Duration,
}

impl PushshiftClient {
    pub fn new(subreddit: impl Into<String>, direction: CrawlDirection) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("subwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            subreddit: subreddit.into(),
            direction,
            fetch_comments: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
    pub fn fetch_comments(mut self, yes: bool) -> Self {
        self.fetch_comments = yes;
        self
    }
    pub fn retry(mut self, max_retries: usize, base: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_base = base;
        self
    }

    /// GET with bounded retries and doubling backoff. `None` means the request
    /// is a lost cause for this cycle.
    fn get_data(&self, url: &str) -> Option<Vec<PsItem>> {
        let mut delay = self.retry_base;
        for attempt in 1..=self.max_retries {
            match self.http.get(url).send() {
                Ok(resp) if resp.status().is_success() => match resp.json::<Envelope>() {
                    Ok(env) => return Some(env.data),
                    Err(e) => {
                        tracing::warn!(url, attempt, error = %e, "bad response body, retrying");
                    }
                },
                Ok(resp) => {
                    tracing::warn!(url, attempt, status = %resp.status(), "bad response, retrying");
                }
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "request failed, retrying");
                }
            }
            if attempt < self.max_retries {
                sleep(delay);
                delay *= 2;
            }
        }
        tracing::warn!(url, "giving up after {} attempts", self.max_retries);
        None
    }

    fn submission_url(&self, cursor: Option<i64>, page_size: usize) -> String {
        let (bound, sort) = match self.direction {
            CrawlDirection::Backfill => ("before", "desc"),
            CrawlDirection::ForwardFill => ("after", "asc"),
        };
        let mut url = format!(
            "{}/reddit/submission/search/?subreddit={}&size={}&sort={}",
            self.base_url, self.subreddit, page_size, sort
        );
        if let Some(ts) = cursor {
            url.push_str(&format!("&{bound}={ts}"));
        }
        url
    }

    /// All comments under one submission, paging forward by `created_utc`
    /// until a short page. A failed page ends the walk with what we have.
    fn comments_for(&self, post_id: &str, page_size: usize) -> Vec<Item> {
        let mut out = Vec::new();
        let mut after: i64 = 0;
        loop {
            let url = format!(
                "{}/reddit/comment/search/?link_id={}&after={}&size={}&sort=asc",
                self.base_url, post_id, after, page_size
            );
            let Some(batch) = self.get_data(&url) else {
                tracing::warn!(post_id, "comment page failed, keeping partial comment set");
                break;
            };
            let n = batch.len();
            let last_ts = batch.iter().rev().find_map(|c| c.created_utc).map(|t| t as i64);
            out.extend(
                batch
                    .into_iter()
                    .filter_map(|c| c.into_item(ItemKind::Comment)),
            );
            if n < page_size {
                break;
            }
            match last_ts {
                // No timestamps at all in a full page: cannot advance, stop.
                None => break,
                Some(ts) if ts <= after => break,
                Some(ts) => after = ts,
            }
        }
        out
    }
}

impl Fetcher for PushshiftClient {
    fn fetch(&mut self, cursor: Option<i64>, page_size: usize) -> FetchOutcome {
        let url = self.submission_url(cursor, page_size);
        let Some(posts) = self.get_data(&url) else {
            return FetchOutcome::Failed;
        };
        if posts.is_empty() {
            return FetchOutcome::Exhausted;
        }

        let mut items: Vec<Item> = Vec::with_capacity(posts.len());
        for p in posts {
            let Some(item) = p.into_item(ItemKind::Post) else { continue };
            let post_id = item.id.clone();
            items.push(item);
            if self.fetch_comments {
                items.extend(self.comments_for(&post_id, page_size));
            }
        }
        FetchOutcome::Items(items)
    }
}
