pub mod archive;
pub mod config;
pub mod content;
pub mod document;
pub mod error;
pub mod loader;
pub mod navigation;
pub mod package;
pub mod progress;
pub mod security;
pub mod xml;

pub use loader::{Epub, LoadOptions};

pub mod prelude {
    pub use crate::archive::{ArchiveReader, MemoryArchive, ZipArchiveReader};
    pub use crate::content::{ExtractOptions, ExtractionPolicy};
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::loader::{Epub, LoadOptions};
    pub use crate::navigation::NavigationDepth;
}
