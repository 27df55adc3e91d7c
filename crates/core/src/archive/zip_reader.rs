use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use zip::result::ZipError;

use super::{decode_text, ArchiveEntry, ArchiveReader};
use crate::error::ArchiveError;
use crate::security::{self, SecurityLimits};

/// ZIP-backed archive holding the whole container in memory.
///
/// Each read clones the parsed central directory (shared behind an `Arc` by
/// the zip crate) and inflates on a blocking thread, so concurrent reads
/// never contend on a lock.
#[derive(Clone)]
pub struct ZipArchiveReader {
    archive: zip::ZipArchive<Cursor<Arc<[u8]>>>,
    entries: Vec<ArchiveEntry>,
    limits: SecurityLimits,
}

impl ZipArchiveReader {
    pub fn from_bytes(
        bytes: impl Into<Arc<[u8]>>,
        limits: &SecurityLimits,
    ) -> Result<Self, ArchiveError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.into()))
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

        security::check_file_count(archive.len() as u64, limits)?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
            if file.is_dir() {
                continue;
            }
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                size: file.size(),
            });
        }

        tracing::debug!("Opened ZIP archive with {} entries", entries.len());

        Ok(Self {
            archive,
            entries,
            limits: limits.clone(),
        })
    }

    /// Read a ZIP file from disk.
    pub async fn open(
        path: impl AsRef<Path>,
        limits: &SecurityLimits,
    ) -> Result<Self, ArchiveError> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Self::from_bytes(bytes, limits)
    }
}

impl std::fmt::Debug for ZipArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchiveReader")
            .field("entries", &self.entries.len())
            .field("limits", &self.limits)
            .finish()
    }
}

#[async_trait]
impl ArchiveReader for ZipArchiveReader {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    async fn read_text(&self, name: &str) -> Result<String, ArchiveError> {
        let mut archive = self.archive.clone();
        let limits = self.limits.clone();
        let owned = name.to_string();

        tokio::task::spawn_blocking(move || read_entry(&mut archive, &owned, &limits))
            .await
            .map_err(|e| ArchiveError::ReadFailed {
                name: name.to_string(),
                detail: e.to_string(),
            })?
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    limits: &SecurityLimits,
) -> Result<String, ArchiveError> {
    let mut file = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => ArchiveError::NotFound {
            name: name.to_string(),
        },
        other => ArchiveError::ReadFailed {
            name: name.to_string(),
            detail: other.to_string(),
        },
    })?;

    security::check_entry_size(name, file.compressed_size(), file.size(), limits)?;

    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| ArchiveError::ReadFailed {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
    Ok(decode_text(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in files {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_lists_and_reads_entries() {
        let bytes = build_zip(&[
            ("mimetype", "application/epub+zip"),
            ("content.opf", "<package/>"),
        ]);
        let reader = ZipArchiveReader::from_bytes(bytes, &SecurityLimits::default()).unwrap();

        let names: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["mimetype", "content.opf"]);
        assert!(reader.contains("content.opf"));
        assert_eq!(reader.read_text("content.opf").await.unwrap(), "<package/>");
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let bytes = build_zip(&[("content.opf", "<package/>")]);
        let reader = ZipArchiveReader::from_bytes(bytes, &SecurityLimits::default()).unwrap();

        match reader.read_text("toc.ncx").await.unwrap_err() {
            ArchiveError::NotFound { name } => assert_eq!(name, "toc.ncx"),
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_zip_bytes() {
        let err = ZipArchiveReader::from_bytes(b"not a zip".to_vec(), &SecurityLimits::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive(_)));
    }

    #[test]
    fn test_file_count_limit_applies() {
        let bytes = build_zip(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let limits = SecurityLimits {
            max_file_count: 2,
            ..Default::default()
        };
        let err = ZipArchiveReader::from_bytes(bytes, &limits).unwrap_err();
        assert!(matches!(err, ArchiveError::Security(_)));
    }
}
