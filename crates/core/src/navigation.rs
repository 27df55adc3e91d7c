//! NCX navigation tree → ordered [`Chapter`] list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Chapter, DiagnosticKind, Diagnostics};
use crate::xml::{as_sequence, attribute, path, text_of};

/// Which navPoints become chapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationDepth {
    /// Only the direct children of `navMap`.
    #[default]
    TopLevel,
    /// Every navPoint, nested ones included (depth-first).
    Flatten,
}

/// Map the navigation tree to chapters sorted by `playOrder`.
/// An absent tree or an empty navMap yields no chapters.
pub fn map_chapters(
    tree: Option<&Value>,
    depth: NavigationDepth,
    diagnostics: &mut Diagnostics,
) -> Vec<Chapter> {
    let Some(tree) = tree else {
        return Vec::new();
    };

    let mut chapters = Vec::new();
    for nav_point in as_sequence(path(tree, &["ncx", "navMap", "navPoint"])) {
        collect(nav_point, depth, &mut chapters, diagnostics);
    }

    // Stable: equal orders keep document order.
    chapters.sort_by_key(|chapter| chapter.order);
    chapters
}

fn collect(
    nav_point: &Value,
    depth: NavigationDepth,
    chapters: &mut Vec<Chapter>,
    diagnostics: &mut Diagnostics,
) {
    chapters.push(chapter(nav_point, diagnostics));

    if depth == NavigationDepth::Flatten {
        for child in as_sequence(nav_point.get("navPoint")) {
            collect(child, depth, chapters, diagnostics);
        }
    }
}

fn chapter(nav_point: &Value, diagnostics: &mut Diagnostics) -> Chapter {
    Chapter {
        label: path(nav_point, &["navLabel", "text"]).and_then(text_of),
        content: nav_point
            .get("content")
            .and_then(|content| attribute(content, "src"))
            .map(str::to_string),
        id: attribute(nav_point, "id").map(str::to_string),
        order: play_order(nav_point, diagnostics),
    }
}

fn play_order(nav_point: &Value, diagnostics: &mut Diagnostics) -> i64 {
    let Some(raw) = attribute(nav_point, "playOrder") else {
        return 0;
    };
    match raw.trim().parse::<i64>() {
        Ok(order) => order,
        Err(_) => {
            diagnostics.push("navPoint@playOrder", raw, DiagnosticKind::InvalidNumber);
            0
        }
    }
}
