//! Package (OPF) document tree → [`Book`].
//!
//! Never fails: a missing node becomes an absent field, an unparseable
//! number or date becomes an absent field plus a diagnostic.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::document::{Book, DiagnosticKind, Diagnostics, Identifier};
use crate::xml::{as_sequence, attribute, path, text_key_of, text_of};

pub const CALIBRE_TITLE_SORT: &str = "calibre:title_sort";
pub const CALIBRE_SERIES: &str = "calibre:series";
pub const CALIBRE_SERIES_INDEX: &str = "calibre:series_index";
pub const CALIBRE_TIMESTAMP: &str = "calibre:timestamp";
pub const CALIBRE_RATING: &str = "calibre:rating";

/// Build the book from a parsed package tree. `None` when there is no tree.
pub fn map_book(tree: Option<&Value>, diagnostics: &mut Diagnostics) -> Option<Book> {
    let tree = tree?;
    let Some(metadata) = path(tree, &["package", "metadata"]) else {
        tracing::debug!("Package document has no metadata element");
        return Some(Book::default());
    };
    let field = |name: &str| metadata.get(name);
    let texts = |name: &str| -> Vec<String> {
        as_sequence(field(name)).into_iter().filter_map(text_of).collect()
    };

    let mut book = Book {
        title: field("dc:title").and_then(text_of),
        authors: texts("dc:creator"),
        contributor: field("dc:contributor").and_then(text_key_of),
        description: field("dc:description").and_then(text_of),
        publisher: field("dc:publisher").and_then(text_of),
        identifiers: as_sequence(field("dc:identifier"))
            .into_iter()
            .map(identifier)
            .collect(),
        subjects: texts("dc:subject"),
        language: field("dc:language").and_then(text_of),
        ..Default::default()
    };

    if let Some(raw) = field("dc:date").and_then(text_of) {
        book.date = date_field("dc:date", &raw, diagnostics);
    }

    for meta in as_sequence(field("meta")) {
        apply_calibre_meta(&mut book, meta, diagnostics);
    }

    Some(book)
}

fn identifier(node: &Value) -> Identifier {
    Identifier {
        scheme: attribute(node, "opf:scheme").map(str::to_string),
        content: text_of(node),
    }
}

/// Later entries overwrite earlier ones with the same name.
fn apply_calibre_meta(book: &mut Book, meta: &Value, diagnostics: &mut Diagnostics) {
    let (Some(name), Some(content)) = (attribute(meta, "name"), attribute(meta, "content")) else {
        return;
    };
    match name {
        CALIBRE_TITLE_SORT => book.title_sort = Some(content.to_string()),
        CALIBRE_SERIES => book.series = Some(content.to_string()),
        CALIBRE_SERIES_INDEX => book.volume = number_field(name, content, diagnostics),
        CALIBRE_TIMESTAMP => book.timestamp = date_field(name, content, diagnostics),
        CALIBRE_RATING => book.rating = number_field(name, content, diagnostics),
        _ => {}
    }
}

fn number_field(name: &str, raw: &str, diagnostics: &mut Diagnostics) -> Option<f64> {
    let parsed = parse_number(raw);
    if parsed.is_none() {
        diagnostics.push(name, raw, DiagnosticKind::InvalidNumber);
    }
    parsed
}

fn date_field(name: &str, raw: &str, diagnostics: &mut Diagnostics) -> Option<DateTime<Utc>> {
    let parsed = parse_point_in_time(raw);
    if parsed.is_none() {
        diagnostics.push(name, raw, DiagnosticKind::InvalidDate);
    }
    parsed
}

/// A finite decimal number; surrounding whitespace is ignored.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse the date forms found in OPF files: RFC 3339 / RFC 2822, naive
/// date-times (read as UTC), `YYYY-MM-DD`, `YYYY-MM` and `YYYY`.
pub fn parse_point_in_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }

    // Partial dates: YYYY-MM and YYYY
    let (year, month) = match raw.split_once('-') {
        Some((year, month)) => (year, Some(month)),
        None => (raw, None),
    };
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month = match month {
        Some(m) if m.len() == 2 => m.parse::<u32>().ok()?,
        Some(_) => return None,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
}
