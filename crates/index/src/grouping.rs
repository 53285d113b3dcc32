//! Download bundle planning.
//!
//! Files are split into "bigs", fetched one by one, and bundles of small
//! files fetched together. Each bundle holds a single access class and never
//! exceeds the chunk size.

use std::collections::{HashMap, HashSet};

use biotransfer_common::{AccessClass, DEFAULT_BUNDLE_SIZE};

use crate::cache::MetadataCache;
use crate::source::IndexSource;
use crate::types::MetadataEntry;

/// Options for bundle planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingOptions {
    /// Maximum aggregate size of one bundle in bytes.
    pub chunk_size: u64,
    /// Files with index or metadata files are fetched individually.
    pub consider_related: bool,
    /// Files with annotations are fetched individually.
    pub consider_annotations: bool,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_BUNDLE_SIZE,
            consider_related: false,
            consider_annotations: false,
        }
    }
}

impl GroupingOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bundle size limit.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Route files with related files to bigs.
    pub fn with_related(mut self, consider: bool) -> Self {
        self.consider_related = consider;
        self
    }

    /// Route files with annotations to bigs.
    pub fn with_annotations(mut self, consider: bool) -> Self {
        self.consider_annotations = consider;
        self
    }
}

/// Small files of one access class fetched together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Access class shared by every file.
    pub access: AccessClass,
    /// File ids in input order.
    pub ids: Vec<String>,
    /// Aggregate size in bytes.
    pub size: u64,
}

/// Result of planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingPlan {
    /// Files fetched individually, in input order.
    pub bigs: Vec<String>,
    /// Open bundles first, then controlled.
    pub bundles: Vec<Bundle>,
}

impl GroupingPlan {
    /// Ids of every bundle, in plan order.
    pub fn bundle_ids(&self) -> Vec<Vec<String>> {
        self.bundles.iter().map(|b| b.ids.clone()).collect()
    }

    /// Number of ids routed anywhere.
    pub fn routed(&self) -> usize {
        self.bigs.len() + self.bundles.iter().map(|b| b.ids.len()).sum::<usize>()
    }
}

/// Why a file skips bundling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BigReason {
    Unresolved,
    UnknownSize,
    UnknownAccess,
    RelatedFiles,
    Annotations,
    OverChunkSize,
}

/// Greedy packer for one access class.
struct BundleStream {
    access: AccessClass,
    chunk_size: u64,
    bundles: Vec<Bundle>,
}

impl BundleStream {
    fn new(access: AccessClass, chunk_size: u64) -> Self {
        Self {
            access,
            chunk_size,
            bundles: Vec::new(),
        }
    }

    /// Append a file no larger than the chunk size.
    fn push(&mut self, id: &str, size: u64) {
        let needs_new: bool = match self.bundles.last() {
            Some(current) => {
                !current.ids.is_empty() && current.size.saturating_add(size) > self.chunk_size
            }
            None => true,
        };
        if needs_new {
            self.bundles.push(Bundle {
                access: self.access,
                ids: Vec::new(),
                size: 0,
            });
        }
        if let Some(current) = self.bundles.last_mut() {
            current.ids.push(id.to_string());
            current.size = current.size.saturating_add(size);
        }
    }

    fn finish(self) -> Vec<Bundle> {
        self.bundles
    }
}

/// Partitions file ids into bigs and bundles.
#[derive(Debug, Clone, Default)]
pub struct GroupingPlanner {
    options: GroupingOptions,
}

impl GroupingPlanner {
    /// Create a planner.
    pub fn new(options: GroupingOptions) -> Self {
        Self { options }
    }

    /// Planner options.
    pub fn options(&self) -> &GroupingOptions {
        &self.options
    }

    /// Resolve metadata for `ids` and plan.
    ///
    /// # Arguments
    /// * `cache` - Metadata cache; unresolved ids are looked up first
    /// * `ids` - Files to plan, in the order they should be processed
    pub async fn plan<S: IndexSource>(
        &self,
        cache: &mut MetadataCache<S>,
        ids: &[String],
    ) -> GroupingPlan {
        let entries: &HashMap<String, MetadataEntry> = cache.resolve(ids).await;
        self.partition(ids, entries)
    }

    /// Plan from already resolved metadata.
    ///
    /// Ids are visited in input order; repeated ids count once. Every unique
    /// id ends up in exactly one of bigs or a bundle.
    pub fn partition(
        &self,
        ids: &[String],
        entries: &HashMap<String, MetadataEntry>,
    ) -> GroupingPlan {
        let chunk_size: u64 = self.options.chunk_size;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut bigs: Vec<String> = Vec::new();
        let mut open: BundleStream = BundleStream::new(AccessClass::Open, chunk_size);
        let mut controlled: BundleStream = BundleStream::new(AccessClass::Controlled, chunk_size);

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.classify(entries.get(id)) {
                Err(reason) => {
                    log::debug!("File {} handled individually: {:?}", id, reason);
                    bigs.push(id.clone());
                }
                Ok((AccessClass::Open, size)) => open.push(id, size),
                Ok((AccessClass::Controlled, size)) => controlled.push(id, size),
            }
        }

        let bundles: Vec<Bundle> = open
            .finish()
            .into_iter()
            .chain(controlled.finish())
            .filter(|b| !b.ids.is_empty())
            .collect();
        let plan: GroupingPlan = GroupingPlan { bigs, bundles };

        let routed: usize = plan.routed();
        if routed < seen.len() {
            log::warn!("There are less files to download than originally given");
            log::warn!("Number of files originally given: {}", seen.len());
        }
        log::debug!("{} total number of files to download", routed);
        log::debug!("{} groupings of files", plan.bundles.len());

        plan
    }

    /// Bundle class and size of a file, or why it cannot be bundled.
    fn classify(&self, entry: Option<&MetadataEntry>) -> Result<(AccessClass, u64), BigReason> {
        let entry: &MetadataEntry = entry.ok_or(BigReason::Unresolved)?;
        if self.options.consider_related && entry.has_related_files() {
            return Err(BigReason::RelatedFiles);
        }
        if self.options.consider_annotations && entry.has_annotations() {
            return Err(BigReason::Annotations);
        }
        let size: u64 = entry
            .size
            .filter(|s| *s > 0)
            .ok_or(BigReason::UnknownSize)?;
        let access: AccessClass = entry.access.ok_or(BigReason::UnknownAccess)?;
        if size > self.options.chunk_size {
            return Err(BigReason::OverChunkSize);
        }
        Ok((access, size))
    }
}
