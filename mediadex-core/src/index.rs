use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mediadex_model::{AssetFragment, AssetRecord, AssetType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;

/// Stable asset id: the first 16 hex characters of SHA-256(`src`).
pub fn asset_id(src: &str) -> String {
    let digest = Sha256::digest(src.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(16);
    id
}

/// Counts produced by one [`AssetIndex::merge`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Deduplicated asset index keyed by normalized `src`.
///
/// Merging is commutative and idempotent in `used_in` and `last_seen_at`:
/// `used_in` only grows and `last_seen_at` never moves backwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AssetRecord>", into = "Vec<AssetRecord>")]
pub struct AssetIndex {
    records: BTreeMap<String, AssetRecord>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, src: &str) -> Option<&AssetRecord> {
        self.records.get(src)
    }

    pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
        self.records.values()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Folds the fragments extracted from `document_path` into the index.
    pub fn merge(
        &mut self,
        document_path: &str,
        fragments: &[AssetFragment],
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for fragment in fragments {
            match self.records.get_mut(&fragment.src) {
                Some(record) => {
                    merge_used_in(
                        &mut record.used_in,
                        document_path,
                        &fragment.used_in,
                    );
                    if now > record.last_seen_at {
                        record.last_seen_at = now;
                    }
                    if record.alt.is_empty() && !fragment.alt.is_empty() {
                        record.alt = fragment.alt.clone();
                    }
                    if record.dimensions.is_none() {
                        record.dimensions = fragment.dimensions;
                    }
                    record.is_external |= fragment.is_external;
                    outcome.updated += 1;
                }
                None => {
                    let mut used_in = Vec::new();
                    merge_used_in(&mut used_in, document_path, &fragment.used_in);
                    self.records.insert(
                        fragment.src.clone(),
                        AssetRecord {
                            id: asset_id(&fragment.src),
                            src: fragment.src.clone(),
                            name: AssetRecord::name_from_src(&fragment.src),
                            asset_type: AssetType::from_src(&fragment.src),
                            alt: fragment.alt.clone(),
                            used_in,
                            is_external: fragment.is_external,
                            dimensions: fragment.dimensions,
                            context: fragment.context,
                            last_seen_at: now,
                        },
                    );
                    outcome.inserted += 1;
                }
            }
        }
        trace!(
            target: "scan::index",
            path = %document_path,
            inserted = outcome.inserted,
            updated = outcome.updated,
            "merged fragments"
        );
        outcome
    }
}

fn merge_used_in(used_in: &mut Vec<String>, document: &str, extra: &[String]) {
    used_in.push(document.to_string());
    used_in.extend(extra.iter().cloned());
    used_in.sort();
    used_in.dedup();
}

impl From<Vec<AssetRecord>> for AssetIndex {
    fn from(records: Vec<AssetRecord>) -> Self {
        let mut index = AssetIndex::new();
        for record in records {
            match index.records.get_mut(&record.src) {
                Some(existing) => {
                    existing.used_in.extend(record.used_in);
                    existing.used_in.sort();
                    existing.used_in.dedup();
                    existing.last_seen_at =
                        existing.last_seen_at.max(record.last_seen_at);
                }
                None => {
                    index.records.insert(record.src.clone(), record);
                }
            }
        }
        index
    }
}

impl From<AssetIndex> for Vec<AssetRecord> {
    fn from(index: AssetIndex) -> Self {
        index.records.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mediadex_model::{AssetContext, Dimensions};

    use super::*;

    fn fragment(src: &str, page: &str) -> AssetFragment {
        AssetFragment::new(src, page, AssetContext::Image)
    }

    #[test]
    fn ids_are_stable_sha256_prefixes() {
        let id = asset_id("/media/hero.png");
        assert_eq!(id.len(), 16);
        assert_eq!(id, asset_id("/media/hero.png"));
        assert_ne!(id, asset_id("/media/other.png"));
    }

    #[test]
    fn merge_is_idempotent() {
        let now = Utc::now();
        let fragments = vec![fragment("/a.png", "/p.html")];
        let mut once = AssetIndex::new();
        once.merge("/p.html", &fragments, now);
        let mut twice = once.clone();
        twice.merge("/p.html", &fragments, now);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_commutative_across_documents() {
        let now = Utc::now();
        let a = vec![fragment("/a.png", "/one.html")];
        let b = vec![fragment("/a.png", "/two.html")];

        let mut left = AssetIndex::new();
        left.merge("/one.html", &a, now);
        left.merge("/two.html", &b, now);

        let mut right = AssetIndex::new();
        right.merge("/two.html", &b, now);
        right.merge("/one.html", &a, now);

        assert_eq!(left, right);
        assert_eq!(
            left.get("/a.png").unwrap().used_in,
            vec!["/one.html".to_string(), "/two.html".to_string()]
        );
    }

    #[test]
    fn last_seen_is_monotonic_and_missing_fields_fill_in() {
        let now = Utc::now();
        let mut index = AssetIndex::new();
        index.merge("/p.html", &[fragment("/a.png", "/p.html")], now);
        let enriched = fragment("/a.png", "/q.html")
            .with_alt("A")
            .with_dimensions(Some(Dimensions {
                width: 10,
                height: 20,
            }));
        index.merge("/q.html", &[enriched], now - Duration::hours(1));

        let record = index.get("/a.png").unwrap();
        assert_eq!(record.last_seen_at, now);
        assert_eq!(record.alt, "A");
        assert_eq!(record.dimensions.map(|d| d.width), Some(10));
        assert_eq!(record.asset_type, AssetType::Image);
        assert_eq!(record.name, "a.png");
    }

    #[test]
    fn src_stays_unique_through_serialization() {
        let now = Utc::now();
        let mut index = AssetIndex::new();
        index.merge("/p.html", &[fragment("/a.png", "/p.html")], now);
        index.merge("/q.html", &[fragment("/b.mp4", "/q.html")], now);

        let json = serde_json::to_string(&index).unwrap();
        let decoded: AssetIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.len(), 2);
    }
}
