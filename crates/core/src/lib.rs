//! Core types for sqlworker
//!
//! This crate defines the foundational types shared by the worker and the
//! transaction coordinator:
//! - DatabaseIdentity: Stable key grouping all transactions on one logical database
//! - HandleId: Process-unique id of one open database connection
//! - TransactionId: Process-unique id of one transaction
//! - TransactionMode: Read-only or read-write
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{AbortReason, Error, Result};
pub use types::{DatabaseIdentity, HandleId, TransactionId, TransactionMode, TransactionOutcome};
