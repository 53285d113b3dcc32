//! XML codec for the backend's multipart messages.
//!
//! Responses are namespaced (`xmlns="http://s3.amazonaws.com/doc/2006-03-01/"`),
//! so elements are matched by local name only.

use std::collections::BTreeSet;

use quick_xml::escape::{escape, resolve_predefined_entity};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::StorageError;

/// A part reported by a list-parts response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// Entity tag exactly as the backend reported it (quotes included).
    pub etag: String,
}

/// Extract the session id from an initiate-multipart response.
///
/// # Errors
/// Returns `StorageError::Protocol` if the document is malformed or has no
/// `UploadId` directly under the root element.
pub fn parse_initiate(xml: &str) -> Result<String, StorageError> {
    let mut upload_id: Option<String> = None;

    visit_elements(xml, |path, text| {
        if path.len() == 2 && path[1] == b"UploadId" {
            upload_id = Some(text.trim().to_string());
        }
        Ok(())
    })?;

    upload_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| protocol_error("initiate response has no UploadId"))
}

/// Extract `{part number, entity tag}` pairs from a list-parts response.
///
/// Parts are returned in document order.
///
/// # Errors
/// Returns `StorageError::Protocol` for malformed XML, a `Part` without
/// `PartNumber`/`ETag`, or a non-numeric part number.
pub fn parse_list_parts(xml: &str) -> Result<Vec<ListedPart>, StorageError> {
    let mut parts: Vec<ListedPart> = Vec::new();
    let mut part_number: Option<u32> = None;
    let mut etag: Option<String> = None;

    visit_elements(xml, |path, text| {
        if path.len() < 2 || path[1] != b"Part" {
            return Ok(());
        }
        match (path.len(), path.last().map(Vec::as_slice)) {
            (3, Some(b"PartNumber")) => {
                let number: u32 = text.trim().parse().map_err(|_| {
                    protocol_error(format!("invalid PartNumber: {}", text.trim()))
                })?;
                part_number = Some(number);
            }
            (3, Some(b"ETag")) => etag = Some(text.trim().to_string()),
            (2, _) => {
                let (Some(number), Some(tag)) = (part_number.take(), etag.take()) else {
                    return Err(protocol_error("Part element without PartNumber or ETag"));
                };
                parts.push(ListedPart {
                    part_number: number,
                    etag: tag,
                });
            }
            _ => {}
        }
        Ok(())
    })?;

    Ok(parts)
}

/// Part numbers present in a listing.
pub fn listed_part_numbers(parts: &[ListedPart]) -> BTreeSet<u32> {
    parts.iter().map(|p| p.part_number).collect()
}

/// Serialize the complete-upload manifest.
///
/// Parts are emitted in ascending part-number order whatever order they
/// arrive in; the backend rejects unordered manifests.
pub fn complete_manifest_xml(parts: &[ListedPart]) -> String {
    let mut ordered: Vec<&ListedPart> = parts.iter().collect();
    ordered.sort_by_key(|p| p.part_number);

    let mut xml: String = String::from("<CompleteMultipartUpload>");
    for part in ordered {
        xml.push_str("<Part><PartNumber>");
        xml.push_str(&part.part_number.to_string());
        xml.push_str("</PartNumber><ETag>");
        xml.push_str(&escape(part.etag.as_str()));
        xml.push_str("</ETag></Part>");
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// Walk a document, calling `on_end` with the local-name path and the text of
/// every element as it closes.
fn visit_elements<F>(xml: &str, mut on_end: F) -> Result<(), StorageError>
where
    F: FnMut(&[Vec<u8>], &str) -> Result<(), StorageError>,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text: String = String::new();
    let mut saw_root: bool = false;
    let mut buf: Vec<u8> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                saw_root = true;
                path.push(e.local_name().as_ref().to_vec());
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                saw_root = true;
                path.push(e.local_name().as_ref().to_vec());
                on_end(&path, "")?;
                path.pop();
            }
            Ok(Event::Text(ref e)) => text.push_str(&String::from_utf8_lossy(e)),
            Ok(Event::CData(ref e)) => text.push_str(&String::from_utf8_lossy(e)),
            Ok(Event::GeneralRef(ref e)) => {
                let name: String = String::from_utf8_lossy(e).into_owned();
                let resolved: String = resolve_reference(&name)
                    .ok_or_else(|| protocol_error(format!("unknown entity &{};", name)))?;
                text.push_str(&resolved);
            }
            Ok(Event::End(_)) => {
                on_end(&path, &text)?;
                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(protocol_error(format!(
                    "malformed XML at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(protocol_error("empty XML document"));
    }
    Ok(())
}

/// Resolve a predefined entity or a character reference.
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value: u32 = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    resolve_predefined_entity(name).map(String::from)
}

fn protocol_error(message: impl Into<String>) -> StorageError {
    StorageError::Protocol {
        message: message.into(),
    }
}
