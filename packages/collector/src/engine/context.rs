//! Execution context threaded through the instruction tree.

use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::types::document::ResponseDocument;
use crate::types::record::{FailureKind, RunFailure, ScrapedRecord};

/// Mutable state of a run: the current document, variable bindings,
/// accumulated records, and the failure manifest.
pub struct ExecutionContext {
    pub document: ResponseDocument,

    /// Bindings available for `{{name}}` interpolation. Loop handlers
    /// bind `loop_index`, `option_value`, and `option_label`.
    pub variables: HashMap<String, Value>,

    pub records: Vec<ScrapedRecord>,

    pub failures: Vec<RunFailure>,

    started: Instant,
    deadline: Instant,
}

impl ExecutionContext {
    pub fn new(document: ResponseDocument, budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            document,
            variables: HashMap::new(),
            records: Vec::new(),
            failures: Vec::new(),
            started,
            deadline: started + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Record a recoverable failure and keep going.
    pub fn fail(&mut self, at: impl Into<String>, kind: FailureKind, message: impl Into<String>) {
        let failure = RunFailure::new(at, kind, message);
        warn!(at = %failure.at, kind = ?failure.kind, message = %failure.message, "instruction failed");
        self.failures.push(failure);
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Replace `{{name}}` placeholders with bound variables. Unknown
    /// placeholders are left as-is.
    pub fn interpolate(&self, template: &str) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }

        let mut out = template.to_string();
        for (name, value) in &self.variables {
            let needle = format!("{{{{{name}}}}}");
            if out.contains(&needle) {
                let replacement = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&needle, &replacement);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::Document;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            ResponseDocument::new("https://x.test", Document::html("")),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_interpolation() {
        let mut ctx = ctx();
        ctx.bind("loop_index", json!(3));
        ctx.bind("option_value", json!("nba"));

        assert_eq!(
            ctx.interpolate("https://x.test/page/{{loop_index}}?league={{option_value}}"),
            "https://x.test/page/3?league=nba"
        );
        assert_eq!(ctx.interpolate("{{unknown}}"), "{{unknown}}");
        assert_eq!(ctx.interpolate("plain"), "plain");
    }

    #[test]
    fn test_deadline() {
        let ctx = ExecutionContext::new(
            ResponseDocument::new("https://x.test", Document::html("")),
            Duration::ZERO,
        );
        assert!(ctx.expired());

        let roomy = ExecutionContext::new(
            ResponseDocument::new("https://x.test", Document::html("")),
            Duration::from_secs(5),
        );
        assert!(!roomy.expired());
    }
}
