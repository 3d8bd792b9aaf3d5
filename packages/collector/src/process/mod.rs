//! Field processors - named value transforms applied after extraction.
//!
//! Processors are pure functions behind a trait object, looked up by
//! name in a [`Registry`]. Configs reference them by name; the
//! registry is checked at validation time so a typo never survives to
//! a run. Chains compose left to right and short-circuit on the first
//! failure, at which point the field falls back to its default.

mod builtins;

pub use builtins::register_builtins;

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult, ProcessorFailure};
use crate::types::config::ProcessorSpec;

/// A single value transform.
///
/// Implementations must be pure: same input, same output, no I/O.
pub trait Processor: Send + Sync {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure>;
}

/// Typed accessors over a processor's free-form argument map.
pub struct ProcessorArgs<'a> {
    map: &'a serde_json::Map<String, Value>,
}

impl<'a> ProcessorArgs<'a> {
    pub fn new(map: &'a serde_json::Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.map.get(key).and_then(Value::as_u64)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.map.get(key).and_then(Value::as_i64)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.map.get(key).and_then(Value::as_f64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).and_then(Value::as_bool)
    }
}

/// Name → processor lookup table.
///
/// Append-only: registering a name twice is a config error, so custom
/// processors cannot silently shadow built-ins.
pub struct Registry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl Registry {
    /// An empty registry with no processors at all.
    pub fn empty() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// A registry preloaded with every built-in processor.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        register_builtins(&mut registry);
        registry
    }

    /// Register a processor under a name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> ConfigResult<()> {
        let name = name.into();
        if self.processors.contains_key(&name) {
            return Err(ConfigError::DuplicateProcessor { name });
        }
        self.processors.insert(name, processor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    /// Registered names, sorted for stable display.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::with_builtins);

/// The shared built-in registry.
pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

struct ChainStep {
    name: String,
    processor: Arc<dyn Processor>,
    args: serde_json::Map<String, Value>,
}

/// A field's processor chain, resolved against a registry once.
///
/// Resolution happens per collect execution rather than per record,
/// so the hot path is just a vec walk.
pub struct ProcessorChain {
    steps: Vec<ChainStep>,
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field(
                "steps",
                &self.steps.iter().map(|s| &s.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProcessorChain {
    pub fn resolve(specs: &[ProcessorSpec], registry: &Registry) -> ConfigResult<Self> {
        let mut steps = Vec::with_capacity(specs.len());
        for spec in specs {
            let processor = registry
                .get(&spec.name)
                .ok_or_else(|| ConfigError::UnknownProcessor {
                    name: spec.name.clone(),
                })?;
            steps.push(ChainStep {
                name: spec.name.clone(),
                processor,
                args: spec.args.clone(),
            });
        }
        Ok(Self { steps })
    }

    /// Run the chain left to right, stopping at the first failure.
    pub fn run(&self, value: Value) -> Result<Value, ProcessorFailure> {
        let mut current = value;
        for step in &self.steps {
            let args = ProcessorArgs::new(&step.args);
            current = step.processor.apply(current, &args).map_err(|e| {
                tracing::debug!(processor = %step.name, reason = %e.reason, "processor failed");
                e
            })?;
        }
        Ok(current)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fail;
    impl Processor for Fail {
        fn apply(&self, _: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
            Err(ProcessorFailure::new("fail", "always fails"))
        }
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = Registry::with_builtins();
        let err = registry.register("trim", Arc::new(Fail)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProcessor { .. }));
    }

    #[test]
    fn test_custom_processor_registration() {
        let mut registry = Registry::with_builtins();
        registry.register("always_fail", Arc::new(Fail)).unwrap();
        assert!(registry.get("always_fail").is_some());
        assert!(registry.names().contains(&"always_fail"));
    }

    #[test]
    fn test_chain_resolution_fails_on_unknown_name() {
        let specs = vec![ProcessorSpec::named("definitely_not_real")];
        let err = ProcessorChain::resolve(&specs, global_registry()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProcessor { .. }));
    }

    #[test]
    fn test_chain_composes_left_to_right() {
        let specs = vec![
            ProcessorSpec::named("trim"),
            ProcessorSpec::named("uppercase"),
        ];
        let chain = ProcessorChain::resolve(&specs, global_registry()).unwrap();
        assert_eq!(chain.run(json!("  yes  ")).unwrap(), json!("YES"));
    }

    #[test]
    fn test_chain_short_circuits_on_failure() {
        let mut registry = Registry::with_builtins();
        registry.register("always_fail", Arc::new(Fail)).unwrap();

        let specs = vec![
            ProcessorSpec::named("trim"),
            ProcessorSpec::named("always_fail"),
            ProcessorSpec::named("uppercase"),
        ];
        let chain = ProcessorChain::resolve(&specs, &registry).unwrap();
        let err = chain.run(json!(" x ")).unwrap_err();
        assert_eq!(err.processor, "fail");
    }
}
