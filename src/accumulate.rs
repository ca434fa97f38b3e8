//! Keyed, insertion-ordered accumulation of rows. Re-processing an item is
//! idempotent: the same key overwrites in place instead of growing the set.

use crate::config::{DedupKey, WriteOrder};
use crate::record::RefRecord;
use ahash::AHashMap;

/// Insertion-ordered map of dedup key -> row, split into the rows that were
/// loaded from disk and the rows added during this run so the sink can write
/// either append-order or prepend-order without re-sorting.
pub struct RefAccumulator {
    key_mode: DedupKey,
    rows: Vec<RefRecord>,
    index: AHashMap<String, usize>,
    loaded: usize, // rows[..loaded] came from disk
}

impl RefAccumulator {
    pub fn new(key_mode: DedupKey) -> Self {
        Self { key_mode, rows: Vec::new(), index: AHashMap::new(), loaded: 0 }
    }

    /// Seed with rows loaded from the store, in file order. Call once, before
    /// any `insert`.
    pub fn seed(&mut self, loaded_rows: Vec<RefRecord>) {
        debug_assert!(self.rows.is_empty());
        for rec in loaded_rows {
            let key = rec.dedup_key(self.key_mode);
            if let Some(&i) = self.index.get(&key) {
                self.rows[i] = rec;
            } else {
                self.index.insert(key, self.rows.len());
                self.rows.push(rec);
            }
        }
        self.loaded = self.rows.len();
    }

    /// Insert one row. Returns true if the key was new.
    pub fn insert(&mut self, rec: RefRecord) -> bool {
        let key = rec.dedup_key(self.key_mode);
        if let Some(&i) = self.index.get(&key) {
            self.rows[i] = rec;
            false
        } else {
            self.index.insert(key, self.rows.len());
            self.rows.push(rec);
            true
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows added since `seed`.
    pub fn new_count(&self) -> usize {
        self.rows.len() - self.loaded
    }

    /// Rows in the order the sink should write them.
    pub fn rows_for(&self, order: WriteOrder) -> impl Iterator<Item = &RefRecord> + '_ {
        let (first, second) = match order {
            WriteOrder::Append => (&self.rows[..self.loaded], &self.rows[self.loaded..]),
            WriteOrder::Prepend => (&self.rows[self.loaded..], &self.rows[..self.loaded]),
        };
        first.iter().chain(second.iter())
    }

    /// All rows in insertion order (loaded first).
    pub fn rows(&self) -> &[RefRecord] {
        &self.rows
    }
}
