use std::collections::HashMap;

use async_trait::async_trait;

use super::{ArchiveEntry, ArchiveReader};
use crate::error::ArchiveError;

/// In-memory archive of already-decoded text entries. Entry order is
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
    contents: HashMap<String, String>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        let size = text.len() as u64;
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.size = size,
            None => self.entries.push(ArchiveEntry {
                name: name.clone(),
                size,
            }),
        }
        self.contents.insert(name, text);
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.retain(|entry| entry.name != name);
        self.contents.remove(name)
    }
}

impl<N: Into<String>, T: Into<String>> FromIterator<(N, T)> for MemoryArchive {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut archive = Self::new();
        for (name, text) in iter {
            archive.insert(name, text);
        }
        archive
    }
}

#[async_trait]
impl ArchiveReader for MemoryArchive {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn contains(&self, name: &str) -> bool {
        self.contents.contains_key(name)
    }

    async fn read_text(&self, name: &str) -> Result<String, ArchiveError> {
        self.contents
            .get(name)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound {
                name: name.to_string(),
            })
    }
}
