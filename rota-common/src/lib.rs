//! # Rota Common Library
//!
//! Shared code for the Rota services including:
//! - Domain records (volunteers, shifts, assignments, assets, custody, activity)
//! - Required-groups parsing at the import boundary
//! - Store change notifications (RotaEvent / EventBus)
//! - Configuration loading
//! - Database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod required_groups;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use required_groups::RequiredGroups;
