//! Per-session upload cache: file name to uploaded bytes.
//!
//! The cache is unbounded. Nothing is spilled to disk or evicted apart from
//! an explicit [`UploadCache::clear`], so a session that uploads more than
//! the process can hold fails outright rather than degrading.

use std::collections::HashMap;

use crate::logging::log_cache_merge;
use crate::model::{DatasetId, RawBlob};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Default, Clone)]
pub struct UploadCache {
    order: Vec<DatasetId>,
    blobs: HashMap<DatasetId, RawBlob>,
}

/// Outcome of one [`UploadCache::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: Vec<DatasetId>,
    pub replaced: Vec<DatasetId>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty()
    }
}

impl UploadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite entries. Keys absent from `entries` are untouched and an
    /// overwritten key keeps its original position.
    pub fn merge<I>(&mut self, entries: I) -> MergeReport
    where
        I: IntoIterator<Item = (DatasetId, RawBlob)>,
    {
        let mut report = MergeReport::default();
        for (id, blob) in entries {
            if self.blobs.insert(id.clone(), blob).is_some() {
                if !report.replaced.contains(&id) && !report.added.contains(&id) {
                    report.replaced.push(id);
                }
            } else {
                self.order.push(id.clone());
                report.added.push(id);
            }
        }
        if !report.is_empty() {
            let (count, total) = self.size();
            log_cache_merge(report.added.len(), report.replaced.len(), count, total);
        }
        report
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.blobs.clear();
    }

    /// `(entry count, total bytes)`
    pub fn size(&self) -> (usize, u64) {
        (self.blobs.len(), self.blobs.values().map(RawBlob::len).sum())
    }

    pub fn total_mb(&self) -> f64 {
        self.size().1 as f64 / MB
    }

    pub fn get(&self, id: &DatasetId) -> Option<&RawBlob> {
        self.blobs.get(id)
    }

    pub fn contains(&self, id: &DatasetId) -> bool {
        self.blobs.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Keys in first-upload order.
    pub fn keys(&self) -> &[DatasetId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatasetId, &RawBlob)> {
        self.order
            .iter()
            .filter_map(|id| self.blobs.get(id).map(|blob| (id, blob)))
    }

    /// Content digests currently held.
    pub fn digests(&self) -> impl Iterator<Item = &str> {
        self.blobs.values().map(RawBlob::digest)
    }
}

pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / MB
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, len: usize) -> (DatasetId, RawBlob) {
        (DatasetId::new(name), RawBlob::new(vec![7u8; len]))
    }

    #[test]
    fn merge_adds_and_overwrites() {
        let mut cache = UploadCache::new();
        let report = cache.merge([entry("a.parquet", 10), entry("b.parquet", 20)]);
        assert_eq!(report.added.len(), 2);
        assert_eq!(cache.size(), (2, 30));

        let report = cache.merge([entry("a.parquet", 5)]);
        assert_eq!(report.replaced, vec![DatasetId::new("a.parquet")]);
        assert_eq!(cache.size(), (2, 25));
        assert_eq!(
            cache.keys(),
            &[DatasetId::new("a.parquet"), DatasetId::new("b.parquet")]
        );
    }

    #[test]
    fn last_write_wins_within_one_batch() {
        let mut cache = UploadCache::new();
        cache.merge([entry("a.parquet", 10), entry("a.parquet", 3)]);
        assert_eq!(cache.size(), (1, 3));
        assert_eq!(cache.keys().len(), 1);
    }

    #[test]
    fn reupload_keeps_first_position() {
        let mut cache = UploadCache::new();
        cache.merge([entry("a.parquet", 1), entry("b.parquet", 1)]);
        cache.merge([entry("c.parquet", 1), entry("a.parquet", 2)]);
        let names: Vec<_> = cache.keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["a.parquet", "b.parquet", "c.parquet"]);
    }

    #[test]
    fn empty_merge_is_a_no_op() {
        let mut cache = UploadCache::new();
        cache.merge([entry("a.parquet", 4)]);
        let before = cache.size();
        let report = cache.merge(Vec::new());
        assert!(report.is_empty());
        assert_eq!(cache.size(), before);
        assert_eq!(cache.keys().len(), 1);
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = UploadCache::new();
        cache.merge([entry("a.parquet", 4)]);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), (0, 0));
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn sizes_in_megabytes() {
        let mut cache = UploadCache::new();
        cache.merge([entry("a.parquet", 1024 * 1024)]);
        assert!((cache.total_mb() - 1.0).abs() < 1e-12);
        assert!((megabytes(512 * 1024) - 0.5).abs() < 1e-12);
    }
}
