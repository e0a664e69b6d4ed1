//! Core shared types for huddle
//!
//! This crate contains the types shared between the huddle server and any
//! embedding process: node addresses and discovery configuration.

pub mod address;
pub mod config;

pub use address::NodeAddress;
pub use config::{ConfigError, DiscoveryConfig};
