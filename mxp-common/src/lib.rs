//! # MXP Common Library
//!
//! Shared code for the MXP preview workspace including:
//! - Error types
//! - Event types (PreviewEvent enum) and the EventBus
//! - Configuration file discovery

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PreviewEvent};
