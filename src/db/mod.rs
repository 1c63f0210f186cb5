//! Database access layer.
//!
//! This module provides:
//! - Connection pool management with session statement timeouts
//! - The sanitize-then-execute query primitive
//! - PostgreSQL type mappings for JSON results

pub mod executor;
pub mod pool;
pub mod types;

pub use executor::{QueryExecutor, QueryOptions, QueryOutcome, QueryParam};
pub use pool::{PoolManager, PoolStats};
