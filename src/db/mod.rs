//! SQLite chain store.
//!
//! This module provides:
//! - Database initialization and idempotent schema
//! - SQLite pragma configuration
//! - Repository for materialized chains and refresh runs

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{RefreshRun, Repository, RunStatus};
