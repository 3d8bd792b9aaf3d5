//! The instruction engine: execution context plus the interpreter
//! that walks a config's instruction tree.

pub mod context;
pub mod executor;

pub use context::ExecutionContext;
pub use executor::Executor;
