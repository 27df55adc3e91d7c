use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Book metadata from the package document. One per archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: Option<String>,
    /// Always a sequence, even when the package names a single creator.
    pub authors: Vec<String>,
    pub contributor: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    /// Always a sequence, even when the package declares a single identifier.
    pub identifiers: Vec<Identifier>,
    pub date: Option<DateTime<Utc>>,
    pub subjects: Vec<String>,
    pub language: Option<String>,

    // Calibre extension metadata
    pub title_sort: Option<String>,
    pub series: Option<String>,
    /// `calibre:series_index`
    pub volume: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub scheme: Option<String>,
    pub content: Option<String>,
}

/// One NCX navigation point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub label: Option<String>,
    /// Relative path plus optional anchor into a content document.
    pub content: Option<String>,
    pub id: Option<String>,
    /// `playOrder` verbatim; 0 when absent or not an integer.
    pub order: i64,
}

/// Raw head/body markup of one XHTML content document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Archive entry the page was read from.
    pub href: String,
    pub head: String,
    pub body: String,
}

/// A field- or entry-level problem recovered during load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source field (`calibre:rating`, `navPoint@playOrder`) or entry name.
    pub field: String,
    /// The offending raw value.
    pub value: String,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    InvalidNumber,
    InvalidDate,
    SkippedEntry { reason: String },
}

/// Collector passed through the mappers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        field: impl Into<String>,
        value: impl Into<String>,
        kind: DiagnosticKind,
    ) {
        let diagnostic = Diagnostic {
            field: field.into(),
            value: value.into(),
            kind,
        };
        tracing::debug!(
            "Recovered {:?} for {} ({:?})",
            diagnostic.kind,
            diagnostic.field,
            diagnostic.value
        );
        self.items.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
