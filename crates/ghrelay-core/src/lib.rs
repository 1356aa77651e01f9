//! Core domain + application logic for the GitHub activity relay.
//!
//! This crate is intentionally framework-agnostic. GitHub and Telegram live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod poller;
pub mod rate_limit;
pub mod source;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
