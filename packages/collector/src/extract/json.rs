//! Path evaluation over JSON documents.
//!
//! Supports a deliberately small grammar: `$` (root), `.key` access,
//! `[n]` array index, and `[*]` array wildcard. Anything the parser
//! does not understand evaluates to nothing; extraction never errors.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let rest = path.strip_prefix('$')?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut key = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                if key.is_empty() {
                    return None;
                }
                segments.push(Segment::Key(key));
            }
            '[' => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(ch) => inner.push(ch),
                        None => return None,
                    }
                }
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    segments.push(Segment::Index(inner.parse().ok()?));
                }
            }
            _ => return None,
        }
    }

    Some(segments)
}

/// Evaluate a path against a JSON value.
///
/// Misses and malformed paths yield the empty vec.
pub fn evaluate(root: &Value, path: &str) -> Vec<Value> {
    let Some(segments) = parse_path(path.trim()) else {
        tracing::debug!(path, "unparseable JSON path, extracting nothing");
        return Vec::new();
    };

    let mut current: Vec<&Value> = vec![root];
    for segment in &segments {
        let mut next = Vec::new();
        for value in current {
            match segment {
                Segment::Key(key) => {
                    if let Some(v) = value.get(key) {
                        next.push(v);
                    }
                }
                Segment::Index(i) => {
                    if let Some(v) = value.get(i) {
                        next.push(v);
                    }
                }
                Segment::Wildcard => {
                    if let Some(array) = value.as_array() {
                        next.extend(array.iter());
                    }
                }
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }

    current.into_iter().cloned().collect()
}
