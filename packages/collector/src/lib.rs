//! Declarative Market Data Collection Engine
//!
//! A config-driven scraping library for collecting odds and market
//! data from bookmakers, exchanges, and prediction markets. A scrape
//! is a YAML document, not code: where to fetch, how to fetch it, an
//! instruction tree to walk, and where records go.
//!
//! # Design Philosophy
//!
//! **"Configs describe, the engine interprets"**
//!
//! - Declarative instruction trees, not per-site code
//! - One extraction model over HTML and JSON documents
//! - Recoverable failures go to a manifest, the run keeps going
//! - Pluggable fetch strategies behind one trait
//! - Library handles mechanics, app handles analysis
//!
//! # Usage
//!
//! ```rust,ignore
//! use collector::{Pipeline, ScrapeConfig};
//! use collector::sinks::{build_sink, target_for};
//!
//! let config = ScrapeConfig::from_path("configs/polymarket.yaml")?;
//! let outcome = Pipeline::new().run(&config).await?;
//!
//! if let Some(sink_config) = &config.sink {
//!     let sink = build_sink(sink_config).await?;
//!     sink.persist(&outcome.records, &target_for(sink_config)).await?;
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`] - Config model, documents, records, outcomes
//! - [`extract`] - Dual-dialect extraction (JSON paths, CSS selectors)
//! - [`process`] - Named field processors and chains
//! - [`fetch`] - Fetch strategies and the domain policy
//! - [`engine`] - The instruction interpreter
//! - [`pipeline`] - Run orchestration
//! - [`sinks`] - Persistence (memory, jsonl, sqlite)
//! - [`testing`] - Mock fetchers and drivers for testing

pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod sinks;
pub mod testing;
pub mod types;

// Re-export core types at crate root
pub use error::{
    ConfigError, EngineError, FetchError, PolicyViolation, ProcessorFailure, SinkError,
};
pub use types::{
    config::{
        AuthConfig, ClickSpec, CollectSpec, FetcherConfig, FetcherKind, FieldMap, FieldSpec,
        IfSpec, Instruction, LoopKind, LoopSpec, MetaConfig, ProcessorSpec, ScrapeConfig,
        ScrollDirection, SelectChoice, SelectorList, SinkConfig, ValidationReport, Violation,
        WaitCondition,
    },
    document::{Document, DocumentKind, ResponseDocument},
    record::{
        FailureKind, FieldOutcome, RunFailure, RunStatus, ScrapeOutcome, ScrapedRecord,
    },
};

pub use engine::{ExecutionContext, Executor};
pub use fetch::{
    build_fetcher, ApiFetcher, BrowserFetcher, DomainPolicy, DriverFactory, FetchRequest, Fetcher,
    InteractiveFetcher, PageAction, PageDriver, StaticFetcher,
};
pub use pipeline::Pipeline;
pub use process::{global_registry, Processor, ProcessorArgs, ProcessorChain, Registry};
pub use sinks::{
    build_sink, target_for, JsonlSink, MemorySink, PersistOutcome, PersistTarget, RecordSink,
};

#[cfg(feature = "sqlite")]
pub use sinks::SqliteSink;

#[cfg(feature = "browser")]
pub use fetch::cdp::CdpDriver;

// Re-export testing utilities
pub use testing::{MockFetcher, PageState, ScriptedDriver};
