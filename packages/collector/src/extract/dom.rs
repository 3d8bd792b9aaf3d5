//! CSS selection over HTML documents.
//!
//! Follows the same tolerance rules as the JSON dialect: invalid
//! selectors and misses yield empty results, never errors. Item
//! fragments are carried as owned HTML strings so records can be
//! assembled without holding parsed-tree borrows across awaits.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(selector, error = %e, "invalid CSS selector, extracting nothing");
            None
        }
    }
}

/// Outer HTML of every element matching the selector.
pub fn select_fragments(markup: &str, selector: &str) -> Vec<String> {
    let Some(sel) = parse_selector(selector) else {
        return Vec::new();
    };
    let doc = Html::parse_document(markup);
    doc.select(&sel).map(|el| el.html()).collect()
}

/// Extract values from every element matching the selector.
///
/// `attribute` is `"text"` for the joined text content, `"html"` for
/// inner markup, or an attribute name.
pub fn select_values(markup: &str, selector: &str, attribute: &str) -> Vec<Value> {
    let Some(sel) = parse_selector(selector) else {
        return Vec::new();
    };
    let doc = Html::parse_document(markup);
    doc.select(&sel)
        .filter_map(|el| element_value(&el, attribute))
        .collect()
}

fn element_value(el: &ElementRef, attribute: &str) -> Option<Value> {
    match attribute {
        "text" => Some(Value::String(el.text().collect::<String>())),
        "html" => Some(Value::String(el.inner_html())),
        attr => el.value().attr(attr).map(|v| Value::String(v.to_string())),
    }
}

/// Number of elements matching the selector.
pub fn count_matches(markup: &str, selector: &str) -> usize {
    let Some(sel) = parse_selector(selector) else {
        return 0;
    };
    let doc = Html::parse_document(markup);
    doc.select(&sel).count()
}
