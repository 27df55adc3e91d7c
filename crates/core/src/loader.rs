//! The [`Epub`] facade: locate, fetch and parse the package and navigation
//! documents, then map them to a book, chapters and pages.

use std::path::Path;

use serde_json::Value;

use crate::archive::{parent_dir, resolve_href, ArchiveReader, ZipArchiveReader};
use crate::content::{self, ExtractOptions};
use crate::document::{Book, Chapter, Diagnostic, Diagnostics, Page};
use crate::error::{ArchiveError, EpubError};
use crate::navigation::{self, NavigationDepth};
use crate::package;
use crate::progress::{emit_progress, ProgressHandler, LOAD_OPERATION, LOAD_STAGES};
use crate::security::{self, SecurityLimits};
use crate::xml::{self, as_sequence, attribute, path, ParseOptions};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";
pub const DEFAULT_PACKAGE_PATH: &str = "content.opf";
/// Looked up in the package document's directory.
pub const DEFAULT_NAVIGATION_NAME: &str = "toc.ncx";

const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOptions {
    /// Archive entry of the package document. Skips container lookup.
    pub package_path: Option<String>,
    /// Archive entry of the NCX document. Skips the spine lookup.
    pub navigation_path: Option<String>,
    pub navigation_depth: NavigationDepth,
    pub extraction: ExtractOptions,
    /// Applied by [`Epub::open`] when reading the ZIP file.
    pub security: SecurityLimits,
}

/// A fully loaded EPUB. Construction either succeeds completely or fails;
/// everything is read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Epub {
    package_path: String,
    navigation_path: String,
    package_tree: Option<Value>,
    navigation_tree: Option<Value>,
    book: Option<Book>,
    chapters: Vec<Chapter>,
    pages: Vec<Page>,
    diagnostics: Vec<Diagnostic>,
}

impl Epub {
    pub async fn load<A: ArchiveReader + ?Sized>(archive: &A) -> Result<Self, EpubError> {
        Self::load_with(archive, &LoadOptions::default(), None).await
    }

    pub async fn load_with<A: ArchiveReader + ?Sized>(
        archive: &A,
        opts: &LoadOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Self, EpubError> {
        emit_progress(progress, LOAD_OPERATION, 0, Some(LOAD_STAGES), Some("Locating documents"));

        if let Some(encryption) = read_optional(archive, ENCRYPTION_PATH).await? {
            security::check_epub_drm(&encryption)?;
        }

        let package_path = locate_package(archive, opts).await?;
        let package_dir = parent_dir(&package_path);
        let candidate_nav = match &opts.navigation_path {
            Some(p) => p.clone(),
            None => format!("{package_dir}{DEFAULT_NAVIGATION_NAME}"),
        };
        tracing::debug!(
            "Loading EPUB package '{}' (navigation candidate '{}')",
            package_path,
            candidate_nav
        );

        let (package_text, candidate_text) = tokio::try_join!(
            read_optional(archive, &package_path),
            read_optional(archive, &candidate_nav),
        )?;

        let package_tree = package_text
            .map(|text| parse_entry(&package_path, &text))
            .transpose()?;
        emit_progress(
            progress,
            LOAD_OPERATION,
            1,
            Some(LOAD_STAGES),
            Some("Package document parsed"),
        );

        // The spine may point somewhere other than the conventional name.
        let spine_nav = match (&opts.navigation_path, &package_tree) {
            (None, Some(tree)) => spine_navigation_path(tree, package_dir),
            _ => None,
        };
        let (navigation_path, navigation_text) = match spine_nav {
            Some(p) if p != candidate_nav => match read_optional(archive, &p).await? {
                Some(text) => (p, Some(text)),
                None => {
                    tracing::warn!("Spine toc entry '{}' is missing, using '{}'", p, candidate_nav);
                    (candidate_nav, candidate_text)
                }
            },
            _ => (candidate_nav, candidate_text),
        };
        let navigation_tree = navigation_text
            .map(|text| parse_entry(&navigation_path, &text))
            .transpose()?;
        emit_progress(
            progress,
            LOAD_OPERATION,
            2,
            Some(LOAD_STAGES),
            Some("Navigation document parsed"),
        );

        let mut diagnostics = Diagnostics::new();

        let book = package::map_book(package_tree.as_ref(), &mut diagnostics);
        emit_progress(progress, LOAD_OPERATION, 3, Some(LOAD_STAGES), Some("Book metadata mapped"));

        let chapters = navigation::map_chapters(
            navigation_tree.as_ref(),
            opts.navigation_depth,
            &mut diagnostics,
        );
        emit_progress(progress, LOAD_OPERATION, 4, Some(LOAD_STAGES), Some("Chapters mapped"));

        let pages = content::extract_pages(
            archive,
            package_tree.as_ref(),
            package_dir,
            &opts.extraction,
            progress,
            &mut diagnostics,
        )
        .await?;
        emit_progress(progress, LOAD_OPERATION, 5, Some(LOAD_STAGES), Some("Pages extracted"));

        tracing::debug!(
            "Loaded EPUB: {} chapters, {} pages, {} diagnostics",
            chapters.len(),
            pages.len(),
            diagnostics.len()
        );

        Ok(Self {
            package_path,
            navigation_path,
            package_tree,
            navigation_tree,
            book,
            chapters,
            pages,
            diagnostics: diagnostics.into_vec(),
        })
    }

    /// Open a ZIP file from disk and load it with default options.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EpubError> {
        Self::open_with(path, &LoadOptions::default(), None).await
    }

    pub async fn open_with(
        path: impl AsRef<Path>,
        opts: &LoadOptions,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<Self, EpubError> {
        let archive = ZipArchiveReader::open(path, &opts.security).await?;
        Self::load_with(&archive, opts, progress).await
    }

    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    pub fn navigation_path(&self) -> &str {
        &self.navigation_path
    }

    /// Parsed package document, `None` when the archive has no such entry.
    pub fn package_tree(&self) -> Option<&Value> {
        self.package_tree.as_ref()
    }

    /// Parsed NCX document, `None` when it could not be located.
    pub fn navigation_tree(&self) -> Option<&Value> {
        self.navigation_tree.as_ref()
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    /// Sorted by play order.
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// In manifest order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Read an entry, treating a missing one as absent rather than an error.
async fn read_optional<A: ArchiveReader + ?Sized>(
    archive: &A,
    name: &str,
) -> Result<Option<String>, EpubError> {
    match archive.read_text(name).await {
        Ok(text) => Ok(Some(text)),
        Err(ArchiveError::NotFound { .. }) => {
            tracing::debug!("No '{}' entry in archive", name);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_entry(name: &str, text: &str) -> Result<Value, EpubError> {
    xml::parse(text, &ParseOptions::default()).map_err(|source| EpubError::Xml {
        entry: name.to_string(),
        source,
    })
}

async fn locate_package<A: ArchiveReader + ?Sized>(
    archive: &A,
    opts: &LoadOptions,
) -> Result<String, EpubError> {
    if let Some(p) = &opts.package_path {
        return Ok(p.clone());
    }

    if let Some(text) = read_optional(archive, CONTAINER_PATH).await? {
        let tree = parse_entry(CONTAINER_PATH, &text)?;
        let full_path = as_sequence(path(&tree, &["container", "rootfiles", "rootfile"]))
            .into_iter()
            .filter(|rootfile| {
                attribute(rootfile, "media-type").map_or(true, |m| m == PACKAGE_MEDIA_TYPE)
            })
            .find_map(|rootfile| attribute(rootfile, "full-path"))
            .filter(|p| !p.is_empty());
        if let Some(full_path) = full_path {
            security::check_entry_path(full_path)?;
            return Ok(full_path.to_string());
        }
        tracing::warn!("{} names no package document", CONTAINER_PATH);
    }

    Ok(DEFAULT_PACKAGE_PATH.to_string())
}

/// Entry of the manifest item the spine's `toc` attribute refers to. An
/// unusable reference yields `None` so the conventional name is tried.
fn spine_navigation_path(tree: &Value, package_dir: &str) -> Option<String> {
    let toc_id = path(tree, &["package", "spine"]).and_then(|spine| attribute(spine, "toc"))?;

    let href = as_sequence(path(tree, &["package", "manifest", "item"]))
        .into_iter()
        .find(|item| attribute(item, "id") == Some(toc_id))
        .and_then(|item| attribute(item, "href"));

    let Some(href) = href else {
        tracing::warn!("Spine toc '{}' matches no manifest item", toc_id);
        return None;
    };
    match resolve_href(package_dir, href) {
        Ok(name) => Some(name),
        Err(e) => {
            tracing::warn!("Ignoring spine toc '{}': {}", href, e);
            None
        }
    }
}
