//! # HomeVault Common Library
//!
//! Shared code for the HomeVault services including:
//! - Error types
//! - Event types (VaultEvent enum) and the EventBus
//! - Configuration loading and root folder resolution
//! - Database initialization
//! - SSE helpers and timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
