//! Core domain + application logic for the panel-control Telegram bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the panel
//! HTTP API live behind ports (traits) implemented in adapter crates.

pub mod actions;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod panel;
pub mod presenter;
pub mod prompts;
pub mod relay;

pub use errors::{Error, Result};
