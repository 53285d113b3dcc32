//! Metadata lookup and bundle planning for downloads.
//!
//! Small files are cheaper to fetch in combined bundles than one by one.
//! [`GroupingPlanner`] decides which files are handled individually and which
//! are packed together, using metadata resolved through a [`MetadataCache`].

mod cache;
mod error;
mod grouping;
mod query;
mod source;
mod types;

pub use cache::MetadataCache;
pub use error::IndexError;
pub use grouping::{Bundle, GroupingOptions, GroupingPlan, GroupingPlanner};
pub use query::{parse_hits, Hit, MetadataQuery, METADATA_FIELDS};
pub use source::{HttpIndexSource, IndexEndpoint, IndexSource};
pub use types::MetadataEntry;
