//! End-to-End Tests
//!
//! Drive a database thread the way a page does: open handles, run
//! transactions on the worker, then tear everything down.

#[path = "../common/mod.rs"]
mod common;

mod configuration;
mod page_lifecycle;
mod transactions;
