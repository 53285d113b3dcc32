//! Part planning for multipart uploads.
//!
//! Pure logic: how a file is split and which upload path it takes.
//! No I/O operations.

use crate::types::PartRecord;

/// Upload path chosen for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One streamed PUT of the whole file.
    SimplePut,
    /// Backend multipart protocol, one request per part.
    Multipart,
}

/// Determine the upload path for a file.
///
/// # Arguments
/// * `size` - File size in bytes
/// * `part_size` - Configured part size
/// * `multipart` - Whether multipart uploads are enabled at all
pub fn upload_strategy(size: u64, part_size: u64, multipart: bool) -> UploadStrategy {
    if multipart && part_size > 0 && size >= part_size {
        UploadStrategy::Multipart
    } else {
        UploadStrategy::SimplePut
    }
}

/// Calculate the number of parts for a file: `ceil(size / part_size)`.
pub fn expected_part_count(size: u64, part_size: u64) -> usize {
    if part_size == 0 || size == 0 {
        return 0;
    }
    size.div_ceil(part_size) as usize
}

/// Split a file of `size` bytes into parts of `part_size` bytes.
///
/// Part numbers run 1..=N; the last part may be shorter.
///
/// # Arguments
/// * `size` - Total file size in bytes
/// * `part_size` - Size of each part
pub fn plan_parts(size: u64, part_size: u64) -> Vec<PartRecord> {
    if part_size == 0 {
        return Vec::new();
    }

    let mut parts: Vec<PartRecord> = Vec::with_capacity(expected_part_count(size, part_size));
    let mut offset: u64 = 0;
    let mut part_number: u32 = 1;

    while offset < size {
        let length: u64 = std::cmp::min(part_size, size - offset);
        parts.push(PartRecord {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }

    parts
}
