//! Read-only, memory-mapped view of one byte range of a file.
//!
//! Parts are read straight from the page cache instead of being buffered,
//! so many large parts can be in flight at once. `memmap2` picks the
//! platform mapping and aligns unaligned offsets internally.

use std::fs::File;
use std::path::Path;

use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};

use crate::error::StorageError;

/// A read-only view of `length` bytes starting at `offset`.
#[derive(Debug)]
pub struct ReadOnlyByteRangeView {
    /// `None` for zero-length ranges, which cannot be mapped.
    map: Option<Mmap>,
    offset: u64,
}

impl ReadOnlyByteRangeView {
    /// Map a byte range of a file.
    ///
    /// # Arguments
    /// * `path` - File to map
    /// * `offset` - Start of the range
    /// * `length` - Length of the range
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the file cannot be opened or mapped, or
    /// if the range reaches past the end of the file.
    pub fn open(path: &Path, offset: u64, length: u64) -> Result<Self, StorageError> {
        let display: String = path.display().to_string();
        let file: File = File::open(path).map_err(|e| StorageError::io(&display, e))?;
        let file_len: u64 = file
            .metadata()
            .map_err(|e| StorageError::io(&display, e))?
            .len();

        let in_bounds: bool = offset
            .checked_add(length)
            .is_some_and(|end| end <= file_len);
        if !in_bounds {
            return Err(StorageError::Io {
                path: display,
                message: format!(
                    "range {}+{} is outside a file of {} bytes",
                    offset, length, file_len
                ),
            });
        }

        if length == 0 {
            return Ok(Self { map: None, offset });
        }

        let len: usize = usize::try_from(length).map_err(|_| StorageError::Io {
            path: display.clone(),
            message: format!("range of {} bytes cannot be mapped", length),
        })?;

        // SAFETY: the mapping is read-only. The file must not be truncated
        // while the view is alive; the uploader never writes to its inputs.
        let map: Mmap = unsafe { MmapOptions::new().offset(offset).len(len).map(&file) }
            .map_err(|e| StorageError::io(&display, e))?;

        Ok(Self {
            map: Some(map),
            offset,
        })
    }

    /// Offset of the view within the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True for a zero-length view.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Hand the mapping to a request body without copying it.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from_owner(self)
    }
}

impl AsRef<[u8]> for ReadOnlyByteRangeView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
