//! Mention scanning: find `r/<name>` tokens in item text, drop self-references,
//! and cut fixed-width context snippets around each hit.

use crate::record::Item;
use regex::Regex;

/// A detected reference to another subreddit within scanned text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mention {
    /// The matched token as written, e.g. `r/cats`.
    pub text: String,
    /// Byte offset of the first occurrence in the scanned text.
    pub offset: usize,
}

/// Reusable scanner bound to one monitored subreddit.
pub struct MentionScanner {
    re: Regex,
    exclude: String, // lowercase bare name, no "r/"
    keep_duplicates: bool,
    context_width: usize,
}

impl MentionScanner {
    /// `exclude` is the monitored subreddit (with or without an `r/` prefix);
    /// matches equal to it are self-references and are dropped.
    pub fn new(exclude: impl AsRef<str>, keep_duplicates: bool, context_width: usize) -> Self {
        let mut ex = exclude.as_ref().trim().to_lowercase();
        if let Some(rest) = ex.strip_prefix("r/") {
            ex = rest.to_string();
        }
        // Unwrap is fine: the pattern is a compile-time constant.
        let re = Regex::new(r"(?i)\br/([A-Za-z0-9_]+)\b").unwrap();
        Self { re, exclude: ex, keep_duplicates, context_width }
    }

    /// All mentions in `text`, in order of first appearance. Self-references
    /// are excluded case-insensitively. With `keep_duplicates` off, repeats of
    /// the same subreddit within one text collapse to the first occurrence.
    pub fn scan(&self, text: &str) -> Vec<Mention> {
        let mut out: Vec<Mention> = Vec::new();
        for caps in self.re.captures_iter(text) {
            let whole = caps.get(0).unwrap(); // group 0 always exists
            let name = &caps[1];
            if name.eq_ignore_ascii_case(&self.exclude) {
                continue;
            }
            if !self.keep_duplicates {
                let name_low = name.to_lowercase();
                if out.iter().any(|m| m.text[2..].to_lowercase() == name_low) {
                    continue;
                }
            }
            out.push(Mention { text: whole.as_str().to_string(), offset: whole.start() });
        }
        out
    }

    /// Convenience: just the matched strings.
    pub fn mentions(&self, text: &str) -> Vec<String> {
        self.scan(text).into_iter().map(|m| m.text).collect()
    }

    /// Fixed-width window around a mention, `context_width` chars each side,
    /// with embedded newlines/tabs normalized to spaces.
    pub fn snippet(&self, text: &str, mention: &Mention) -> String {
        let start = floor_char_boundary(text, mention.offset.saturating_sub(self.context_width));
        let end_target = mention.offset + mention.text.len() + self.context_width;
        let end = ceil_char_boundary(text, end_target.min(text.len()));
        crate::record::sanitize_field(text[start..end].trim())
    }

    /// Scan an item's text fields (title then body) and pair each mention with
    /// its context snippet.
    pub fn scan_item(&self, item: &Item) -> Vec<(String, String)> {
        let text = item.full_text();
        self.scan(&text)
            .into_iter()
            .map(|m| {
                let ctx = self.snippet(&text, &m);
                (m.text, ctx)
            })
            .collect()
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
