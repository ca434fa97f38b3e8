//! The flat-file store: loads seen keys + the pagination watermark at startup
//! and rewrites the whole file on every flush (temp file, atomic replace), so
//! the header can never end up mismatched with the body.

use crate::config::{CrawlDirection, DedupKey, WriteOrder};
use crate::record::{RefRecord, COLUMNS};
use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic_backoff};
use ahash::AHashSet;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Everything the run controller needs from a cold start.
pub struct LoadedRefs {
    /// Rows in file order (deduplication happens in the accumulator).
    pub records: Vec<RefRecord>,
    /// Dedup keys of all loaded rows.
    pub seen_keys: AHashSet<String>,
    /// Oldest (backfill) or newest (forward-fill) timestamp on file.
    pub watermark: Option<i64>,
}

pub struct RefStore {
    path: PathBuf,
    direction: CrawlDirection,
    key_mode: DedupKey,
}

impl RefStore {
    pub fn new(path: impl AsRef<Path>, direction: CrawlDirection, key_mode: DedupKey) -> Self {
        Self { path: path.as_ref().to_path_buf(), direction, key_mode }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted file if present. A missing file or `fresh_start`
    /// yields an empty state. Malformed rows are padded/tolerated and bytes
    /// that aren't valid UTF-8 are decoded lossily — a bad row never fails the
    /// load. Rows with an unparseable timestamp still load but don't move the
    /// watermark.
    pub fn load(&self, fresh_start: bool) -> Result<LoadedRefs> {
        let mut out = LoadedRefs {
            records: Vec::new(),
            seen_keys: AHashSet::new(),
            watermark: None,
        };
        if fresh_start || !self.path.exists() {
            return Ok(out);
        }

        let f = open_with_backoff(&self.path, 16, 50)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut rdr = BufReader::new(f);

        let mut first = true;
        let mut raw: Vec<u8> = Vec::new();
        loop {
            raw.clear();
            let n = rdr
                .read_until(b'\n', &mut raw)
                .with_context(|| format!("read {}", self.path.display()))?;
            if n == 0 {
                break;
            }
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\n', '\r']);
            if first {
                // Header row; tolerate files that lost it by detecting our own id column.
                first = false;
                if line.split('\t').next() == Some(COLUMNS[0]) {
                    continue;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
            let rec = RefRecord::decode(line);
            if let Some(ts) = rec.created_utc {
                out.watermark = Some(fold_watermark(self.direction, out.watermark, ts));
            }
            out.seen_keys.insert(rec.dedup_key(self.key_mode));
            out.records.push(rec);
        }
        Ok(out)
    }

    /// Full rewrite: header plus every row, written to a temp file and
    /// atomically promoted. Callers pass rows already in the desired order
    /// (see `RefAccumulator::rows_for`).
    pub fn flush<'a>(&self, rows: impl Iterator<Item = &'a RefRecord>) -> Result<()> {
        let tmp = self.path.with_extension("tsv.inprogress");
        let f = create_with_backoff(&tmp, 16, 50)
            .with_context(|| format!("create {}", tmp.display()))?;
        let mut w = BufWriter::with_capacity(256 * 1024, f);

        writeln!(w, "{}", COLUMNS.join("\t"))?;
        for rec in rows {
            writeln!(w, "{}", rec.encode())?;
        }
        w.flush().with_context(|| format!("flush {}", tmp.display()))?;
        drop(w);
        replace_file_atomic_backoff(&tmp, &self.path)
    }

    /// Convenience for tests and one-shot writes.
    pub fn flush_ordered(&self, acc: &crate::accumulate::RefAccumulator, order: WriteOrder) -> Result<()> {
        self.flush(acc.rows_for(order))
    }
}

/// Fold one timestamp into the watermark: `min` when backfilling,
/// `max` when forward-filling.
pub fn fold_watermark(direction: CrawlDirection, current: Option<i64>, ts: i64) -> i64 {
    match (direction, current) {
        (_, None) => ts,
        (CrawlDirection::Backfill, Some(w)) => w.min(ts),
        (CrawlDirection::ForwardFill, Some(w)) => w.max(ts),
    }
}
