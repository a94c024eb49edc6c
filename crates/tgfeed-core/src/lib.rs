//! Core domain and application logic for the Telegram-to-RSS feed service.
//!
//! This crate is framework-agnostic. Telegram and HTTP live in adapter crates;
//! persistence sits behind the ports in [`store`].

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod filter;
pub mod formatting;
pub mod ingest;
pub mod logging;
pub mod monitor;
pub mod security;
pub mod store;

pub use errors::{Error, Result};
