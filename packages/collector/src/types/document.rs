//! Document types - fetched content the engine extracts from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Dialect of a fetched document. Drives extraction path selection:
/// JSON documents use path expressions, HTML documents use CSS selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Html,
    Json,
}

/// A document body in one of the two supported dialects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Document {
    /// Raw HTML (or plain text) markup
    Html(String),
    /// A parsed JSON value
    Json(Value),
}

impl Document {
    /// Wrap raw HTML markup.
    pub fn html(markup: impl Into<String>) -> Self {
        Document::Html(markup.into())
    }

    /// Wrap an already-parsed JSON value.
    pub fn json_value(value: Value) -> Self {
        Document::Json(value)
    }

    /// Parse text as JSON; invalid JSON degrades to an HTML document
    /// so extraction misses instead of the run failing.
    pub fn json_text(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Document::Json(value),
            Err(_) => Document::Html(text.to_string()),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Html(_) => DocumentKind::Html,
            Document::Json(_) => DocumentKind::Json,
        }
    }

    /// Whether the document has no extractable content.
    pub fn is_empty(&self) -> bool {
        match self {
            Document::Html(markup) => markup.trim().is_empty(),
            Document::Json(value) => value.is_null(),
        }
    }
}

/// A fetched document together with its response metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDocument {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code (200 for rendered browser content)
    pub status: u16,

    /// The document body
    pub document: Document,

    /// Response headers of interest
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// When the document was fetched
    pub fetched_at: DateTime<Utc>,
}

impl ResponseDocument {
    /// Create a response document with a 200 status and no headers.
    pub fn new(url: impl Into<String>, document: Document) -> Self {
        Self {
            url: url.into(),
            status: 200,
            document,
            headers: HashMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a response header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_text_parses_valid_json() {
        let doc = Document::json_text(r#"{"id": 1}"#);
        assert_eq!(doc.kind(), DocumentKind::Json);
    }

    #[test]
    fn test_json_text_degrades_to_html() {
        let doc = Document::json_text("<html>not json</html>");
        assert_eq!(doc.kind(), DocumentKind::Html);
    }

    #[test]
    fn test_empty_detection() {
        assert!(Document::html("   ").is_empty());
        assert!(Document::json_value(Value::Null).is_empty());
        assert!(!Document::html("<p>hi</p>").is_empty());
        assert!(!Document::json_value(serde_json::json!([])).is_empty());
    }
}
