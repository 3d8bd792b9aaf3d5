//! Dual-dialect extraction over fetched documents.
//!
//! The dialect is picked by the document kind: JSON documents use the
//! small path grammar in [`json`], HTML documents use CSS selectors
//! via [`dom`]. Both are miss-tolerant by contract.

pub mod dom;
pub mod json;

use serde_json::Value;

use crate::types::config::SelectorList;
use crate::types::document::Document;

/// Split a document into item sub-documents.
///
/// The container selector narrows the document first, then the item
/// selector runs within each container match. Misses at either level
/// yield zero items.
pub fn extract_items(
    document: &Document,
    container_selector: &str,
    item_selector: &str,
) -> Vec<Document> {
    match document {
        Document::Json(root) => json::evaluate(root, container_selector)
            .iter()
            .flat_map(|container| json::evaluate(container, item_selector))
            .map(Document::Json)
            .collect(),
        Document::Html(markup) => dom::select_fragments(markup, container_selector)
            .iter()
            .flat_map(|container| dom::select_fragments(container, item_selector))
            .map(Document::Html)
            .collect(),
    }
}

/// Extract a field's raw values from an item document.
///
/// Fallback selectors are tried in order; the first that produces
/// anything wins. `attribute` only applies to the HTML dialect.
pub fn extract_field(item: &Document, selectors: &SelectorList, attribute: &str) -> Vec<Value> {
    for selector in selectors.candidates() {
        let values = match item {
            Document::Json(value) => json::evaluate(value, selector),
            Document::Html(markup) => dom::select_values(markup, selector, attribute),
        };
        if !values.is_empty() {
            return values;
        }
    }
    Vec::new()
}

/// Count selector matches in a document, for condition evaluation.
pub fn count_matches(document: &Document, selector: &str) -> usize {
    match document {
        Document::Json(value) => json::evaluate(value, selector).len(),
        Document::Html(markup) => dom::count_matches(markup, selector),
    }
}
