//! Data types for the collection engine.

pub mod config;
pub mod document;
pub mod record;
