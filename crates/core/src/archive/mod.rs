//! Archive access: list entries, read an entry as text by name.
//!
//! The loader only ever talks to [`ArchiveReader`]. [`ZipArchiveReader`] backs it
//! with a real EPUB container, [`MemoryArchive`] with a name → text map.

mod memory;
mod zip_reader;

pub use memory::MemoryArchive;
pub use zip_reader::ZipArchiveReader;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, SecurityError};
use crate::security;

/// One named file inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    /// Decompressed size in bytes.
    pub size: u64,
}

/// Read-only view of an archive. The entry list never changes after the
/// reader is built, so any number of `read_text` calls may be in flight.
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    fn entries(&self) -> &[ArchiveEntry];

    fn contains(&self, name: &str) -> bool {
        self.entries().iter().any(|entry| entry.name == name)
    }

    /// Read an entry decoded as text. Fails with [`ArchiveError::NotFound`]
    /// when no entry has this exact name.
    async fn read_text(&self, name: &str) -> Result<String, ArchiveError>;
}

/// Decode entry bytes as UTF-8, dropping a leading BOM. Invalid sequences are
/// replaced rather than rejected.
pub(crate) fn decode_text(bytes: Vec<u8>) -> String {
    let bytes = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
        Some(rest) => rest.to_vec(),
        None => bytes,
    };
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Entry is not valid UTF-8, decoding lossily: {}", e);
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Directory part of an entry path including the trailing slash ("" at root).
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i + 1]).unwrap_or("")
}

/// Resolve a manifest href against the directory of the document declaring it.
/// The fragment is dropped and `.`/`..` segments are collapsed.
pub fn resolve_href(base_dir: &str, href: &str) -> Result<String, SecurityError> {
    let href = href.split('#').next().unwrap_or_default();
    if href.starts_with('/') || href.starts_with('\\') {
        security::check_entry_path(href)?;
    }

    let joined = format!("{base_dir}{href}");
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(SecurityError::PathTraversal { path: joined.clone() });
                }
            }
            other => segments.push(other),
        }
    }

    let resolved = segments.join("/");
    security::check_entry_path(&resolved)?;
    Ok(resolved)
}
