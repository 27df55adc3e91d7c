//! XHTML content documents → [`Page`] fragments.
//!
//! Content documents are not guaranteed to be well-formed XML, so head and
//! body are cut out with text patterns instead of the tree parser.

use std::sync::LazyLock;

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::{resolve_href, ArchiveReader};
use crate::document::{DiagnosticKind, Diagnostics, Page};
use crate::error::EpubError;
use crate::progress::{emit_progress, ProgressHandler, EXTRACT_OPERATION};
use crate::xml::{as_sequence, attribute, path};

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Opening tag attributes on one line, inner markup up to the last closing tag.
static HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<head.*?>([\s\S]*)</head>").unwrap());

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<body.*?>([\s\S]*)</body>").unwrap());

/// What to do when a content document cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionPolicy {
    /// The first failed fetch aborts the whole extraction.
    #[default]
    Strict,
    /// Failed entries are skipped and reported as diagnostics.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub policy: ExtractionPolicy,
    /// Upper bound on fetches in flight at once.
    pub max_concurrent_fetches: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            policy: ExtractionPolicy::Strict,
            max_concurrent_fetches: 16,
        }
    }
}

/// Raw inner markup of the first `<head>` element, empty when absent.
pub fn head_markup(document: &str) -> String {
    inner_markup(&HEAD_RE, document)
}

/// Raw inner markup of the first `<body>` element, empty when absent.
pub fn body_markup(document: &str) -> String {
    inner_markup(&BODY_RE, document)
}

fn inner_markup(pattern: &Regex, document: &str) -> String {
    pattern
        .captures(document)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Hrefs of the manifest's XHTML items, in declaration order.
pub fn xhtml_hrefs(tree: &Value) -> Vec<&str> {
    as_sequence(path(tree, &["package", "manifest", "item"]))
        .into_iter()
        .filter(|item| attribute(item, "media-type") == Some(XHTML_MEDIA_TYPE))
        .filter_map(|item| {
            let href = attribute(item, "href");
            if href.is_none() {
                tracing::warn!(
                    "Manifest item '{}' has no href",
                    attribute(item, "id").unwrap_or("?")
                );
            }
            href
        })
        .collect()
}

/// Fetch every XHTML manifest item concurrently and cut out head and body.
///
/// Hrefs are resolved against `base_dir`, the package document's directory.
/// Pages come back in manifest order regardless of fetch completion order.
pub async fn extract_pages<A: ArchiveReader + ?Sized>(
    archive: &A,
    tree: Option<&Value>,
    base_dir: &str,
    opts: &ExtractOptions,
    progress: Option<&dyn ProgressHandler>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Page>, EpubError> {
    let Some(tree) = tree else {
        return Ok(Vec::new());
    };

    let mut targets = Vec::new();
    for href in xhtml_hrefs(tree) {
        match resolve_href(base_dir, href) {
            Ok(name) => targets.push(name),
            Err(e) if opts.policy == ExtractionPolicy::BestEffort => {
                tracing::warn!("Skipping content document '{}': {}", href, e);
                diagnostics.push(
                    "manifest@href",
                    href,
                    DiagnosticKind::SkippedEntry {
                        reason: e.to_string(),
                    },
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    let total = targets.len() as u64;
    tracing::debug!("Extracting {} content documents", total);

    let mut fetches = stream::iter(targets.into_iter().enumerate())
        .map(|(index, name)| async move {
            let result = archive.read_text(&name).await;
            (index, name, result)
        })
        .buffer_unordered(opts.max_concurrent_fetches.max(1));

    let mut pages: Vec<(usize, Page)> = Vec::with_capacity(total as usize);
    let mut done = 0;
    while let Some((index, name, result)) = fetches.next().await {
        done += 1;
        match result {
            Ok(text) => {
                emit_progress(progress, EXTRACT_OPERATION, done, Some(total), Some(name.as_str()));
                pages.push((
                    index,
                    Page {
                        head: head_markup(&text),
                        body: body_markup(&text),
                        href: name,
                    },
                ));
            }
            Err(e) if opts.policy == ExtractionPolicy::BestEffort => {
                tracing::warn!("Skipping content document '{}': {}", name, e);
                diagnostics.push(
                    "manifest@href",
                    &name,
                    DiagnosticKind::SkippedEntry {
                        reason: e.to_string(),
                    },
                );
            }
            // Dropping the stream abandons the fetches still in flight.
            Err(e) => return Err(e.into()),
        }
    }

    pages.sort_by_key(|(index, _)| *index);
    Ok(pages.into_iter().map(|(_, page)| page).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEntry, MemoryArchive};
    use crate::error::ArchiveError;
    use crate::xml::{parse, ParseOptions};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn manifest(items: &str) -> Value {
        let opf = format!(
            r#"<package version="2.0"><metadata/><manifest>{items}</manifest><spine toc="ncx"/></package>"#
        );
        parse(&opf, &ParseOptions::default()).unwrap()
    }

    fn xhtml(title: &str, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head>\n<title>{title}</title>\n</head>\n<body class=\"calibre\">{body}</body>\n</html>"
        )
    }

    #[test]
    fn test_head_and_body_markup() {
        let doc = xhtml("One", "<p>First</p>\n<p>Second</p>");
        assert_eq!(head_markup(&doc), "\n<title>One</title>\n");
        assert_eq!(body_markup(&doc), "<p>First</p>\n<p>Second</p>");
    }

    #[test]
    fn test_missing_tags_yield_empty() {
        assert_eq!(head_markup("<html><body>x</body></html>"), "");
        assert_eq!(body_markup("<html><head></head></html>"), "");
        assert_eq!(body_markup("not markup at all"), "");
    }

    #[test]
    fn test_body_extends_to_last_closing_tag() {
        let doc = "<body><p>a</p></body><body><p>b</p></body>";
        assert_eq!(body_markup(doc), "<p>a</p></body><body><p>b</p>");
    }

    #[test]
    fn test_xhtml_hrefs_filters_media_type() {
        let tree = manifest(
            r#"<item id="css" href="style.css" media-type="text/css"/>
<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
<item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>"#,
        );
        assert_eq!(xhtml_hrefs(&tree), vec!["c1.xhtml", "c2.xhtml"]);

        let single =
            manifest(r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>"#);
        assert_eq!(xhtml_hrefs(&single), vec!["c1.xhtml"]);
    }

    /// Archive whose later entries finish first.
    struct StaggeredArchive {
        inner: MemoryArchive,
    }

    #[async_trait]
    impl ArchiveReader for StaggeredArchive {
        fn entries(&self) -> &[ArchiveEntry] {
            self.inner.entries()
        }

        async fn read_text(&self, name: &str) -> Result<String, ArchiveError> {
            let position = self.entries().iter().position(|e| e.name == name).unwrap_or(0);
            for _ in 0..(self.entries().len() - position) * 3 {
                tokio::task::yield_now().await;
            }
            self.inner.read_text(name).await
        }
    }

    #[tokio::test]
    async fn test_pages_follow_manifest_order() {
        let mut inner = MemoryArchive::new();
        let mut items = String::new();
        for i in 0..6 {
            inner.insert(format!("c{i}.xhtml"), xhtml(&format!("T{i}"), &format!("<p>{i}</p>")));
            items.push_str(&format!(
                r#"<item id="c{i}" href="c{i}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
        }
        let archive = StaggeredArchive { inner };
        let tree = manifest(&items);

        let pages = extract_pages(
            &archive,
            Some(&tree),
            "",
            &ExtractOptions::default(),
            None,
            &mut Diagnostics::new(),
        )
        .await
        .unwrap();

        let bodies: Vec<&str> = pages.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(
            bodies,
            vec!["<p>0</p>", "<p>1</p>", "<p>2</p>", "<p>3</p>", "<p>4</p>", "<p>5</p>"]
        );
    }

    #[tokio::test]
    async fn test_hrefs_resolved_against_package_dir() {
        let archive =
            MemoryArchive::new().with_entry("OEBPS/Text/c1.xhtml", xhtml("One", "<p>1</p>"));
        let tree = manifest(
            r#"<item id="c1" href="Text/c1.xhtml#top" media-type="application/xhtml+xml"/>"#,
        );

        let pages = extract_pages(
            &archive,
            Some(&tree),
            "OEBPS/",
            &ExtractOptions::default(),
            None,
            &mut Diagnostics::new(),
        )
        .await
        .unwrap();
        assert_eq!(pages[0].href, "OEBPS/Text/c1.xhtml");
        assert_eq!(pages[0].body, "<p>1</p>");
    }

    #[tokio::test]
    async fn test_strict_policy_fails_on_missing_entry() {
        let archive = MemoryArchive::new().with_entry("c1.xhtml", xhtml("One", "<p>1</p>"));
        let tree = manifest(
            r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
<item id="c2" href="missing.xhtml" media-type="application/xhtml+xml"/>"#,
        );

        let err = extract_pages(
            &archive,
            Some(&tree),
            "",
            &ExtractOptions::default(),
            None,
            &mut Diagnostics::new(),
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_best_effort_policy_skips_and_reports() {
        let archive = MemoryArchive::new().with_entry("c1.xhtml", xhtml("One", "<p>1</p>"));
        let tree = manifest(
            r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
<item id="c2" href="missing.xhtml" media-type="application/xhtml+xml"/>
<item id="c3" href="../escape.xhtml" media-type="application/xhtml+xml"/>"#,
        );
        let opts = ExtractOptions {
            policy: ExtractionPolicy::BestEffort,
            ..Default::default()
        };
        let mut diagnostics = Diagnostics::new();

        let pages = extract_pages(&archive, Some(&tree), "", &opts, None, &mut diagnostics)
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        let skipped: Vec<&str> = diagnostics.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(skipped, vec!["../escape.xhtml", "missing.xhtml"]);
    }

    #[tokio::test]
    async fn test_absent_tree_or_manifest() {
        let archive = MemoryArchive::new();
        let opts = ExtractOptions::default();
        let none = extract_pages(&archive, None, "", &opts, None, &mut Diagnostics::new())
            .await
            .unwrap();
        assert!(none.is_empty());

        let tree = parse("<package><metadata/></package>", &ParseOptions::default()).unwrap();
        let empty = extract_pages(&archive, Some(&tree), "", &opts, None, &mut Diagnostics::new())
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
