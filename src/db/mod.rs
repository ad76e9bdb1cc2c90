//! Database module for the local ledger.
//!
//! This module provides:
//! - SQLite initialization (pragmas + idempotent schema)
//! - The `Repository` implementing the ledger contract

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
