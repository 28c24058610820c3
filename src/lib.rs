//! catalog-toolkit: snapshot, compare and re-apply the metadata of an
//! analytics catalog environment.
//!
//! ## Flow
//! Catalog -> [`reader`] -> snapshot -> [`storage`] -> [`push`] -> target catalog
//!
//! Every command talks to an environment through
//! [`catalog_client::CatalogClient`]; per-object failures are collected in a
//! [`report::ExceptionReport`] and only [`ToolkitError`] aborts a command.

// Ambient
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod report;

// Snapshot capture and persistence
pub mod reader;
pub mod storage;

// Reconciliation and write-back
pub mod push;

// Peer utilities
pub mod diff;
pub mod rebuild;
pub mod sql;

pub use error::{Result, ToolkitError};
