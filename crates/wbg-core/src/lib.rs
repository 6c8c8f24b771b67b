//! Core domain + application logic for the WhatsApp bot gateway.
//!
//! This crate is intentionally framework-agnostic. The WhatsApp Web bridge and the
//! response service live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod relay;
pub mod responder;
pub mod session;
pub mod utils;

pub use errors::{Error, Result};
