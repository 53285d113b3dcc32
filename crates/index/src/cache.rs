//! Append-only cache of resolved file metadata.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::query::{Hit, MetadataQuery};
use crate::source::{IndexEndpoint, IndexSource};
use crate::types::MetadataEntry;

/// Resolves file ids to metadata and remembers the answers.
///
/// Entries are never overwritten: the first hit for an id wins, whether it
/// came from the active or the legacy index. Lookup failures are logged and
/// leave the cache unchanged; callers treat unresolved ids as unknown.
pub struct MetadataCache<S: IndexSource> {
    source: S,
    entries: HashMap<String, MetadataEntry>,
}

impl<S: IndexSource> MetadataCache<S> {
    /// Create an empty cache backed by `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    /// Resolve `ids`, querying only the ones not cached yet.
    ///
    /// One query covering every missing id is sent to the active index and
    /// then the legacy index; hits from both are merged.
    ///
    /// # Returns
    /// The whole cache, including entries from earlier calls.
    pub async fn resolve(&mut self, ids: &[String]) -> &HashMap<String, MetadataEntry> {
        let mut seen: HashSet<&str> = HashSet::new();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !self.entries.contains_key(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            return &self.entries;
        }

        let query: MetadataQuery = MetadataQuery::for_ids(&missing);
        let mut hits: Vec<Hit> = Vec::new();
        for endpoint in IndexEndpoint::ALL {
            match self.source.query(endpoint, &query).await {
                Ok(found) => hits.extend(found),
                Err(e) => log::warn!("Metadata query against {} failed: {}", endpoint, e),
            }
        }

        if hits.is_empty() {
            log::debug!(
                "Unable to retrieve file metadata information, \
                 continuing as if they were large files"
            );
            return &self.entries;
        }

        let inserted: usize = hits
            .into_iter()
            .map(|hit| self.insert(hit.id, hit.entry))
            .filter(|added| *added)
            .count();
        log::debug!(
            "Resolved metadata for {} of {} requested files",
            inserted,
            missing.len()
        );

        &self.entries
    }

    /// Insert an entry unless `id` is already cached.
    ///
    /// # Returns
    /// True if the entry was added.
    pub fn insert(&mut self, id: String, entry: MetadataEntry) -> bool {
        match self.entries.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Cached metadata for `id`.
    pub fn get(&self, id: &str) -> Option<&MetadataEntry> {
        self.entries.get(id)
    }

    /// True if `id` has been resolved.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All resolved entries.
    pub fn entries(&self) -> &HashMap<String, MetadataEntry> {
        &self.entries
    }

    /// Number of resolved ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use biotransfer_common::AccessClass;

    use crate::error::IndexError;

    /// Answers from fixed per-endpoint tables and records every query.
    #[derive(Default)]
    struct StaticSource {
        active: Vec<Hit>,
        legacy: Vec<Hit>,
        fail_active: bool,
        queries: Mutex<Vec<(IndexEndpoint, MetadataQuery)>>,
    }

    #[async_trait]
    impl IndexSource for StaticSource {
        async fn query(
            &self,
            endpoint: IndexEndpoint,
            query: &MetadataQuery,
        ) -> Result<Vec<Hit>, IndexError> {
            self.queries.lock().unwrap().push((endpoint, query.clone()));
            match endpoint {
                IndexEndpoint::Active if self.fail_active => Err(IndexError::Status {
                    url: "https://api.example.org/v0/files".into(),
                    status: 502,
                }),
                IndexEndpoint::Active => Ok(self.active.clone()),
                IndexEndpoint::Legacy => Ok(self.legacy.clone()),
            }
        }
    }

    fn hit(id: &str, size: u64, access: AccessClass) -> Hit {
        Hit {
            id: id.to_string(),
            entry: MetadataEntry {
                size: Some(size),
                access: Some(access),
                ..Default::default()
            },
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolve_merges_both_endpoints() {
        let source = StaticSource {
            active: vec![hit("a", 1, AccessClass::Open)],
            legacy: vec![hit("b", 2, AccessClass::Controlled)],
            ..Default::default()
        };
        let mut cache = MetadataCache::new(source);

        let resolved = cache.resolve(&ids(&["a", "b", "c"])).await;

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["b"].access, Some(AccessClass::Controlled));
        assert!(!cache.contains("c"));

        let queries = cache.source.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].0, IndexEndpoint::Active);
        assert_eq!(queries[1].0, IndexEndpoint::Legacy);
        assert_eq!(queries[0].1.size, "3");
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let source = StaticSource {
            active: vec![hit("a", 1, AccessClass::Open)],
            legacy: vec![hit("a", 99, AccessClass::Controlled)],
            ..Default::default()
        };
        let mut cache = MetadataCache::new(source);
        cache.resolve(&ids(&["a"])).await;

        assert_eq!(cache.get("a").unwrap().size, Some(1));
        assert!(!cache.insert("a".into(), MetadataEntry::default()));
        assert_eq!(cache.get("a").unwrap().size, Some(1));
    }

    #[tokio::test]
    async fn test_cached_ids_are_not_requeried() {
        let source = StaticSource {
            active: vec![hit("a", 1, AccessClass::Open)],
            ..Default::default()
        };
        let mut cache = MetadataCache::new(source);

        cache.resolve(&ids(&["a"])).await;
        cache.resolve(&ids(&["a", "a"])).await;

        assert_eq!(cache.source.queries.lock().unwrap().len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_query_contains_only_missing_ids_once() {
        let mut cache = MetadataCache::new(StaticSource::default());
        cache.insert("a".into(), MetadataEntry::default());

        cache.resolve(&ids(&["a", "b", "b", "c"])).await;

        let queries = cache.source.queries.lock().unwrap();
        assert_eq!(queries[0].1, MetadataQuery::for_ids(&ids(&["b", "c"])));
    }

    #[tokio::test]
    async fn test_failure_is_not_fatal() {
        let source = StaticSource {
            legacy: vec![hit("b", 2, AccessClass::Open)],
            fail_active: true,
            ..Default::default()
        };
        let mut cache = MetadataCache::new(source);
        cache.insert("a".into(), MetadataEntry::default());

        let resolved = cache.resolve(&ids(&["a", "b"])).await;

        assert_eq!(resolved.len(), 2);
        assert!(cache.contains("b"));
    }

    #[tokio::test]
    async fn test_empty_answer_leaves_cache_unchanged() {
        let mut cache = MetadataCache::new(StaticSource::default());
        let resolved = cache.resolve(&ids(&["x"])).await;
        assert!(resolved.is_empty());
        assert!(cache.is_empty());
    }
}
