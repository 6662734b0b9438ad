//! # Dungeon Lab Common Library
//!
//! Shared code for Dungeon Lab services including:
//! - Common error and result types
//! - Configuration loading and root folder resolution
//! - Event types (DlabEvent enum) and the EventBus
//! - Settings table helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
