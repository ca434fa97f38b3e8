//! Data model: fetched items, persisted rows, and the TSV row codec.

use crate::config::DedupKey;

/// Kind of a fetched item. Posts and comments share one id namespace on some
/// sources, which is why the dedup key can carry more than the bare id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Post,
    Comment,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Post => "post",
            ItemKind::Comment => "comment",
        }
    }
    /// Tolerant parse: older files used "submission" for posts.
    pub fn parse(s: &str) -> ItemKind {
        match s {
            "comment" => ItemKind::Comment,
            _ => ItemKind::Post,
        }
    }
}

/// One unit of work from a fetcher: a post or a comment with the text fields
/// worth scanning. `text_fields()` yields them in scan order.
#[derive(Clone, Debug)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub created_utc: Option<i64>,
}

impl Item {
    /// Title then body, skipping absent fields.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.title.as_deref().into_iter().chain(self.body.as_deref())
    }

    /// Concatenated scan text (what context snippets are cut from).
    pub fn full_text(&self) -> String {
        let mut s = String::new();
        if let Some(t) = self.title.as_deref() {
            s.push_str(t);
        }
        if let Some(b) = self.body.as_deref() {
            if !s.is_empty() {
                s.push('\n');
            }
            s.push_str(b);
        }
        s
    }
}

/// Column order of the persisted file. Kept in one place so the header and the
/// row codec can never drift apart.
pub const COLUMNS: [&str; 7] = [
    "id",
    "type",
    "context",
    "subreddit",
    "author",
    "timestamp",
    "mention",
];

/// One persisted row: an item that mentioned at least one other subreddit.
/// Never mutated after creation; re-observing the same key overwrites it wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefRecord {
    pub id: String,
    pub kind: ItemKind,
    pub context: String,
    pub subreddit: String,
    pub author: Option<String>,
    pub created_utc: Option<i64>,
    pub mention: String,
}

impl RefRecord {
    /// Dedup key under the configured granularity.
    pub fn dedup_key(&self, key: DedupKey) -> String {
        match key {
            DedupKey::PerItem => self.id.clone(),
            DedupKey::PerItemMention => format!("{}_{}", self.id, self.mention.to_lowercase()),
        }
    }

    /// Encode as one TSV line (no trailing newline). Free-text fields are
    /// sanitized; the format has no quoting, so embedded delimiters become spaces.
    pub fn encode(&self) -> String {
        let ts = self
            .created_utc
            .map(|t| t.to_string())
            .unwrap_or_default();
        [
            sanitize_field(&self.id),
            self.kind.as_str().to_string(),
            sanitize_field(&self.context),
            sanitize_field(&self.subreddit),
            sanitize_field(self.author.as_deref().unwrap_or("")),
            ts,
            sanitize_field(&self.mention),
        ]
        .join("\t")
    }

    /// Decode one TSV line. Short rows are padded with empty fields and a
    /// malformed timestamp becomes `None` — a bad row never fails the load.
    pub fn decode(line: &str) -> RefRecord {
        let mut fields: Vec<&str> = line.split('\t').collect();
        fields.resize(COLUMNS.len(), "");
        RefRecord {
            id: fields[0].to_string(),
            kind: ItemKind::parse(fields[1]),
            context: fields[2].to_string(),
            subreddit: fields[3].to_string(),
            author: if fields[4].is_empty() { None } else { Some(fields[4].to_string()) },
            created_utc: fields[5].trim().parse::<i64>().ok(),
            mention: fields[6].to_string(),
        }
    }
}

/// Replace TSV-hostile characters with spaces. The file format has no
/// escaping, so this is the only defense against free text.
pub fn sanitize_field(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}
