//! Archive hardening: ZIP bomb and oversized entry guards, path escapes, DRM detection.

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum decompression ratio before flagging an entry as a ZIP bomb.
    pub max_compression_ratio: u64,
    /// Maximum number of entries allowed in an archive.
    pub max_file_count: u64,
    /// Maximum decompressed size of a single entry in bytes.
    pub max_entry_size_bytes: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100,
            max_file_count: 10_000,
            max_entry_size_bytes: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// Reject manifest paths that climb above the archive root or are absolute.
pub fn check_entry_path(path: &str) -> Result<(), SecurityError> {
    let absolute = path.starts_with('/')
        || path.starts_with('\\')
        || (path.len() >= 2 && path.as_bytes()[1] == b':');
    if absolute || path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(SecurityError::PathTraversal {
            path: path.to_string(),
        });
    }
    Ok(())
}

pub fn check_file_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_file_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_file_count,
        });
    }
    Ok(())
}

/// Check one archive entry's decompressed size and compression ratio.
pub fn check_entry_size(
    name: &str,
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if uncompressed_size > limits.max_entry_size_bytes {
        return Err(SecurityError::OversizedEntry {
            name: name.to_string(),
            size_mb: uncompressed_size / (1024 * 1024),
            limit_mb: limits.max_entry_size_bytes / (1024 * 1024),
        });
    }

    // Tiny entries compress absurdly well without being dangerous.
    if uncompressed_size < 1024 * 1024 {
        return Ok(());
    }

    let ratio = if compressed_size == 0 {
        u64::MAX
    } else {
        uncompressed_size / compressed_size
    };
    if ratio > limits.max_compression_ratio {
        return Err(SecurityError::ZipBomb {
            name: name.to_string(),
            ratio,
            limit: limits.max_compression_ratio,
        });
    }
    Ok(())
}

/// Check an EPUB's `META-INF/encryption.xml` for DRM.
/// Font obfuscation is not DRM and passes.
pub fn check_epub_drm(encryption_xml: &str) -> Result<(), SecurityError> {
    let drm_type = if encryption_xml.contains("http://ns.adobe.com/adept")
        || encryption_xml.contains("http://ns.adobe.com/digitaleditions")
    {
        Some("Adobe DRM")
    } else if encryption_xml.contains("http://www.apple.com/ibooks")
        || encryption_xml.contains("sinf")
    {
        Some("Apple FairPlay")
    } else if encryption_xml.contains("http://urms.org") {
        Some("Sony URMS")
    } else if encryption_xml.contains("EncryptedData")
        && !(encryption_xml.contains("http://www.idpf.org/2008/embedding")
            || encryption_xml.contains("http://ns.adobe.com/pdf/enc#RC"))
    {
        Some("Unknown DRM")
    } else {
        None
    };

    match drm_type {
        Some(drm_type) => Err(SecurityError::DrmProtected {
            drm_type: drm_type.to_string(),
        }),
        None => Ok(()),
    }
}
