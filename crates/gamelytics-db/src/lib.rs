//! Database layer for Gamelytics.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. Every table the collection service reads or
//! writes is created through versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: a single-node store. WAL mode allows
//!   concurrent readers with a single writer, which matches the ingestion
//!   pattern (many small batch inserts, occasional dashboard reads).
//! - **`r2d2` connection pool**: bounded connection reuse; every request
//!   holds at most one pooled connection at a time.
//! - **Foreign keys on every connection**: deletion cascades
//!   (account → game → session → event) live in the schema, not in
//!   application code.

mod migrations;
mod pool;

pub use migrations::run_migrations;
pub use migrations::MigrationError;
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
