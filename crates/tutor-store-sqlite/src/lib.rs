//! SQLite backend for the tutoring-centre registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The progression ledger is guarded
//! twice: the registry checks promotions before writing, and the schema
//! refuses deletes, rewrites and a second open entry per student.

mod encode;
mod identity;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
