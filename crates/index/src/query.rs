//! Metadata query body and hit decoding.

use biotransfer_common::AccessClass;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::types::MetadataEntry;

/// Fields requested for every file.
pub const METADATA_FIELDS: &str = "file_id,file_size,md5sum,annotations.annotation_id,\
                                   metadata_files.file_id,index_files.file_id,access";

/// Body of a metadata POST.
///
/// The API expects `filters` as a JSON-encoded string and `from`/`size` as
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataQuery {
    pub fields: String,
    pub filters: String,
    pub from: String,
    pub size: String,
}

impl MetadataQuery {
    /// One query selecting every id in `ids`.
    pub fn for_ids(ids: &[String]) -> Self {
        let filters: Value = json!({
            "op": "and",
            "content": [{
                "op": "in",
                "content": {
                    "field": "files.file_id",
                    "value": ids,
                }
            }]
        });

        Self {
            fields: METADATA_FIELDS.to_string(),
            filters: filters.to_string(),
            from: "0".to_string(),
            size: ids.len().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationRef {
    annotation_id: String,
}

/// One file in a metadata response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub id: String,
    pub entry: MetadataEntry,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    id: String,
    #[serde(default, deserialize_with = "lenient_size")]
    file_size: Option<u64>,
    #[serde(default)]
    md5sum: Option<String>,
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    annotations: Vec<AnnotationRef>,
    #[serde(default)]
    index_files: Vec<FileRef>,
    #[serde(default)]
    metadata_files: Vec<FileRef>,
}

impl From<RawHit> for Hit {
    fn from(raw: RawHit) -> Self {
        let related_files: Vec<String> = raw
            .index_files
            .into_iter()
            .chain(raw.metadata_files)
            .map(|f| f.file_id)
            .collect();
        let access: Option<AccessClass> = raw.access.as_deref().and_then(|a| a.parse().ok());

        Hit {
            id: raw.id,
            entry: MetadataEntry {
                size: raw.file_size,
                access,
                md5sum: raw.md5sum,
                related_files,
                annotations: raw.annotations.into_iter().map(|a| a.annotation_id).collect(),
            },
        }
    }
}

/// Sizes arrive as numbers, numeric strings or null.
fn lenient_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Decode the hits of a `{data: {hits: [...]}}` response.
///
/// A missing or malformed document yields no hits. Individual hits that do
/// not decode are skipped.
pub fn parse_hits(body: &str) -> Vec<Hit> {
    let document: Value = match serde_json::from_str(body) {
        Ok(document) => document,
        Err(e) => {
            log::debug!("Metadata response is not JSON: {}", e);
            return Vec::new();
        }
    };

    let Some(hits) = document
        .get("data")
        .and_then(|data| data.get("hits"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    hits.iter()
        .filter_map(|hit| match RawHit::deserialize(hit) {
            Ok(raw) => Some(Hit::from(raw)),
            Err(e) => {
                log::debug!("Skipping malformed metadata hit: {}", e);
                None
            }
        })
        .collect()
}
