//! Adapter implementations
//!
//! Adapters connect the engine to concrete technologies:
//! - DuckDB as the target database
//! - Migration files on the local filesystem
//! - Advisory file locks serializing runner instances

pub mod duckdb;
pub mod filesystem;
pub mod lock;
