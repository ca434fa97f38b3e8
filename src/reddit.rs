//! Live-mode fetcher: one bounded page of the monitored subreddit's newest
//! posts straight from the Reddit API (OAuth password grant), optionally with
//! each post's comment tree.
//!
//! Live mode does not paginate: the first `fetch` serves the page, every
//! subsequent call reports `Exhausted`.

use crate::fetch::{FetchOutcome, Fetcher};
use crate::record::{Item, ItemKind};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::thread::sleep;
use std::time::Duration;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const OAUTH_BASE: &str = "https://oauth.reddit.com";
const DEFAULT_MAX_RETRIES: usize = 5;
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Script-app credentials, read from the environment. Which variables hold
/// them is the whole configuration surface of live mode.
#[derive(Clone, Debug)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl RedditCredentials {
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| anyhow!("missing env var {name}"))
        };
        Ok(Self {
            client_id: var("SUBWATCH_CLIENT_ID")?,
            client_secret: var("SUBWATCH_CLIENT_SECRET")?,
            username: var("SUBWATCH_USERNAME")?,
            password: var("SUBWATCH_PASSWORD")?,
            user_agent: var("SUBWATCH_USER_AGENT")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: ChildData,
}

#[derive(Debug, Deserialize)]
struct ChildData {
    id: Option<String>,
    title: Option<String>,
    selftext: Option<String>,
    author: Option<String>,
    subreddit: Option<String>,
    created_utc: Option<f64>,
}

pub struct RedditClient {
    http: reqwest::blocking::Client,
    creds: RedditCredentials,
    subreddit: String,
    fetch_comments: bool,
    max_retries: usize,
    retry_base: Duration,
    token: Option<String>,
    served: bool,
}

impl RedditClient {
    pub fn new(subreddit: impl Into<String>, creds: RedditCredentials) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(creds.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            http,
            creds,
            subreddit: subreddit.into(),
            fetch_comments: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            token: None,
            served: false,
        }
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

    fn ensure_token(&mut self) -> Result<String> {
        if let Some(t) = &self.token {
            return Ok(t.clone());
        }
        let params = [
            ("grant_type", "password"),
            ("username", self.creds.username.as_str()),
            ("password", self.creds.password.as_str()),
        ];
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&params)
            .send()
            .context("token request")?
            .error_for_status()
            .context("token response")?;
        let tok: TokenResponse = resp.json().context("token body")?;
        self.token = Some(tok.access_token.clone());
        Ok(tok.access_token)
    }

    /// Authenticated GET with bounded retries and doubling backoff.
    fn get_json(&mut self, url: &str) -> Option<Value> {
        let mut delay = self.retry_base;
        for attempt in 1..=self.max_retries {
            let token = match self.ensure_token() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "token fetch failed, retrying");
                    if attempt < self.max_retries {
                        sleep(delay);
                        delay *= 2;
                    }
                    continue;
                }
            };
            match self.http.get(url).bearer_auth(&token).send() {
                Ok(resp) if resp.status().is_success() => match resp.json::<Value>() {
                    Ok(v) => return Some(v),
                    Err(e) => tracing::warn!(url, attempt, error = %e, "bad response body, retrying"),
                },
                Ok(resp) => {
                    // An expired token comes back as 401; drop it and re-auth.
                    if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                        self.token = None;
                    }
                    tracing::warn!(url, attempt, status = %resp.status(), "bad response, retrying");
                }
                Err(e) => tracing::warn!(url, attempt, error = %e, "request failed, retrying"),
            }
            if attempt < self.max_retries {
                sleep(delay);
                delay *= 2;
            }
        }
        tracing::warn!(url, "giving up after {} attempts", self.max_retries);
        None
    }

    /// Comments for one post. The comments endpoint returns a two-element
    /// array [post listing, comment listing]; replies nest arbitrarily, so the
    /// tree is walked as raw JSON.
    fn comments_for(&mut self, post_id: &str) -> Vec<Item> {
        let url = format!("{OAUTH_BASE}/r/{}/comments/{}?limit=500&depth=10", self.subreddit, post_id);
        let Some(v) = self.get_json(&url) else {
            tracing::warn!(post_id, "comment fetch failed, keeping partial comment set");
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(comment_listing) = v.get(1) {
            collect_comments(comment_listing, &mut out);
        }
        out
    }
}

/// Recursively collect `t1` comments from a listing subtree.
fn collect_comments(listing: &Value, out: &mut Vec<Item>) {
    let Some(children) = listing.pointer("/data/children").and_then(|c| c.as_array()) else {
        return;
    };
    for child in children {
        if child.get("kind").and_then(|k| k.as_str()) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else { continue };
        if let Some(id) = data.get("id").and_then(|v| v.as_str()) {
            out.push(Item {
                id: id.to_string(),
                kind: ItemKind::Comment,
                title: None,
                body: data.get("body").and_then(|v| v.as_str()).map(str::to_string),
                author: data.get("author").and_then(|v| v.as_str()).map(str::to_string),
                subreddit: data.get("subreddit").and_then(|v| v.as_str()).map(str::to_string),
                created_utc: data.get("created_utc").and_then(|v| v.as_f64()).map(|t| t as i64),
            });
        }
        // `replies` is either a nested listing or an empty string.
        if let Some(replies) = data.get("replies").filter(|r| r.is_object()) {
            collect_comments(replies, out);
        }
    }
}

impl Fetcher for RedditClient {
    fn fetch(&mut self, _cursor: Option<i64>, page_size: usize) -> FetchOutcome {
        if self.served {
            return FetchOutcome::Exhausted;
        }
        let url = format!("{OAUTH_BASE}/r/{}/new?limit={}", self.subreddit, page_size);
        let Some(v) = self.get_json(&url) else {
            return FetchOutcome::Failed;
        };
        let listing: Listing = match serde_json::from_value(v) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "unexpected listing shape");
                return FetchOutcome::Failed;
            }
        };
        self.served = true;
        if listing.data.children.is_empty() {
            return FetchOutcome::Exhausted;
        }

        let mut items = Vec::with_capacity(listing.data.children.len());
        let mut post_ids = Vec::new();
        for child in listing.data.children {
            let d = child.data;
            let Some(id) = d.id else { continue };
            post_ids.push(id.clone());
            items.push(Item {
                id,
                kind: ItemKind::Post,
                title: d.title,
                body: d.selftext,
                author: d.author,
                subreddit: d.subreddit,
                created_utc: d.created_utc.map(|t| t as i64),
            });
        }
        if self.fetch_comments {
            for id in post_ids {
                let comments = self.comments_for(&id);
                items.extend(comments);
            }
        }
        FetchOutcome::Items(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_creds() -> RedditCredentials {
        RedditCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            username: "user".into(),
            password: "pass".into(),
            user_agent: "subwatch-tests".into(),
        }
    }

    /// Live mode serves exactly one page: once served, every further call is
    /// `Exhausted` and never touches the network again.
    #[test]
    fn served_page_reports_exhausted() {
        let mut client = RedditClient::new("watched", test_creds());
        client.served = true;
        assert!(matches!(client.fetch(None, 25), FetchOutcome::Exhausted));
        assert!(matches!(client.fetch(Some(100), 25), FetchOutcome::Exhausted));
    }

    /// The /new listing shape decodes into posts; unknown fields are ignored.
    #[test]
    fn listing_decodes_new_page() {
        let body = r#"{"kind":"Listing","data":{"children":[
            {"kind":"t3","data":{"id":"p1","title":"t","selftext":"s","author":"alice",
             "subreddit":"watched","created_utc":100.0,"ups":3}}
        ]}}"#;
        let listing: Listing = serde_json::from_str(body).unwrap();
        assert_eq!(listing.data.children.len(), 1);
        let d = &listing.data.children[0].data;
        assert_eq!(d.id.as_deref(), Some("p1"));
        assert_eq!(d.title.as_deref(), Some("t"));
        assert_eq!(d.created_utc, Some(100.0));
    }

    /// The comment-tree walk flattens nested replies, skips non-comment
    /// children ("more" stubs), and tolerates `replies` arriving as `""`.
    #[test]
    fn collect_comments_flattens_replies() {
        let tree = serde_json::json!({
            "kind": "Listing",
            "data": { "children": [
                { "kind": "t1", "data": {
                    "id": "c1", "body": "see r/foo", "author": "alice",
                    "subreddit": "watched", "created_utc": 100.0,
                    "replies": { "kind": "Listing", "data": { "children": [
                        { "kind": "t1", "data": {
                            "id": "c2", "body": "nested", "author": "bob",
                            "subreddit": "watched", "created_utc": 110,
                            "replies": ""
                        }}
                    ]}}
                }},
                { "kind": "more", "data": { "id": "stub" } }
            ]}
        });

        let mut out = Vec::new();
        collect_comments(&tree, &mut out);

        let ids: Vec<&str> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
        assert!(out.iter().all(|i| i.kind == ItemKind::Comment));
        assert_eq!(out[1].created_utc, Some(110));
    }
}
