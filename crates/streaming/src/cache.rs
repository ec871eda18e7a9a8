use std::collections::BTreeMap;
use std::sync::Arc;

use formats::RegionFeature;

#[derive(Debug, Clone)]
struct CacheEntry {
    feature: Arc<RegionFeature>,
    inserted_tick: u64,
}

/// In-memory store of every region geometry fetched so far.
///
/// Features are never evicted or mutated; callers receive shared handles and
/// translate copies. Entries are keyed in a `BTreeMap` for stable traversal,
/// and each remembers when it was first inserted so reverse lookups resolve
/// duplicates to the earliest entry.
#[derive(Debug, Default)]
pub struct FeatureCache {
    tick: u64,
    entries: BTreeMap<String, CacheEntry>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<RegionFeature>> {
        self.entries.get(key).map(|e| e.feature.clone())
    }

    /// Stores `feature` under `key` and returns the shared handle.
    ///
    /// Re-putting a key replaces the geometry but keeps its original
    /// insertion position.
    pub fn put(&mut self, key: impl Into<String>, feature: RegionFeature) -> Arc<RegionFeature> {
        let feature = Arc::new(feature);
        self.tick += 1;
        let tick = self.tick;
        self.entries
            .entry(key.into())
            .and_modify(|e| e.feature = feature.clone())
            .or_insert_with(|| CacheEntry {
                feature: feature.clone(),
                inserted_tick: tick,
            });
        feature
    }

    /// Maps a secondary (alpha-3) code back to the primary key it is cached
    /// under. Comparison ignores ASCII case; when several entries carry the
    /// same code the earliest inserted one wins.
    pub fn find_key_by_secondary_code(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| {
                e.feature
                    .secondary_code()
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
            })
            .min_by_key(|(_, e)| e.inserted_tick)
            .map(|(k, _)| k.as_str())
    }
}
