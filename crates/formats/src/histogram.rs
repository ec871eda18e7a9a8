use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Client count per region code.
///
/// Counts are unsigned so the non-negative invariant holds by construction.
/// Entries are kept sorted by code, which gives every batch built from the
/// same histogram the same step order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histogram {
    counts: BTreeMap<String, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn insert(&mut self, code: impl Into<String>, count: u64) {
        self.counts.insert(code.into(), count);
    }

    pub fn get(&self, code: &str) -> u64 {
        self.counts.get(code).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Entries worth fetching and drawing; zero counts are skipped.
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, u64)> {
        self.iter().filter(|(_, count)| *count > 0)
    }

    pub fn max_count(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }

    /// `count / max_count` for `code`, in `[0, 1]`.
    pub fn relative(&self, code: &str) -> f64 {
        let max = self.max_count();
        if max == 0 {
            return 0.0;
        }
        self.get(code) as f64 / max as f64
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Histogram {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Histogram;

    #[test]
    fn nonzero_skips_empty_regions() {
        let h: Histogram = [("us", 10), ("de", 0), ("fr", 4)].into_iter().collect();
        let codes: Vec<_> = h.nonzero().map(|(code, _)| code).collect();
        assert_eq!(codes, vec!["fr", "us"]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn relative_counts_use_the_max() {
        let h: Histogram = [("us", 10), ("fr", 4)].into_iter().collect();
        assert_eq!(h.max_count(), 10);
        assert_eq!(h.relative("fr"), 0.4);
        assert_eq!(h.relative("missing"), 0.0);
        assert_eq!(Histogram::new().relative("us"), 0.0);
    }

    #[test]
    fn parses_plain_json_object() {
        let h = Histogram::from_json_str(r#"{"us": 1200, "ca": 0}"#).expect("parse");
        assert_eq!(h.get("us"), 1200);
        assert_eq!(h.nonzero().count(), 1);
        assert!(Histogram::from_json_str(r#"{"us": -1}"#).is_err());
    }
}
