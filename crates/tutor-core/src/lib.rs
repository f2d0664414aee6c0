//! Core types and business rules for the tutoring-centre registry.
//!
//! This crate is free of HTTP and database dependencies. It owns the access
//! scope resolver, the student and attempt state machines, the progression
//! ledger checks, assessment scoring and the storage traits; backends and
//! the API crate depend on it.

// Native `async fn` in traits; the store traits spell out `Send` futures
// explicitly.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod assessment;
pub mod attempt;
pub mod centre;
pub mod error;
pub mod ledger;
pub mod level;
pub mod lifecycle;
pub mod notification;
pub mod principal;
pub mod registry;
pub mod store;
pub mod student;

pub use error::{Error, Result};
pub use registry::Registry;
