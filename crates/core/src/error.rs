/// Top-level error type. All public load operations return this.
#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Malformed XML in {entry}: {source}")]
    Xml {
        entry: String,
        #[source]
        source: XmlError,
    },

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EpubError {
    /// True when the load failed because a named archive entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Archive(ArchiveError::NotFound { .. }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Entry not found in archive: {name}")]
    NotFound { name: String },

    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Failed to read entry {name}: {detail}")]
    ReadFailed { name: String, detail: String },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("at byte {position}: {detail}")]
    Malformed { position: u64, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("ZIP bomb detected in {name}: decompression ratio {ratio}:1 exceeds limit {limit}:1")]
    ZipBomb { name: String, ratio: u64, limit: u64 },

    #[error("Path traversal detected in archive path: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Entry {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedEntry {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("DRM protected EPUB ({drm_type})")]
    DrmProtected { drm_type: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
