//! Store Error Shape
//!
//! Unifies the two failure kinds the protocol distinguishes: logical
//! errors the store answered with (a code), and transport failures where
//! no structured answer arrived. The state machines treat a handful of
//! logical codes as expected protocol events and everything else as
//! retry-after-delay.

use thiserror::Error;

/// Failure of a single store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key (or directory) already exists.
    #[error("key already exists")]
    NodeExists,

    /// The key (or directory) does not exist.
    #[error("key not found")]
    KeyNotFound,

    /// A compare-and-set condition did not hold.
    #[error("compare failed")]
    TestFailed,

    /// Connection, timeout, or serialization failure; no structured
    /// response from the store.
    #[error("store transport failure: {0}")]
    Transport(#[from] anyhow::Error),
}

impl StoreError {
    /// True for structured responses from the store, false for transport
    /// failures.
    pub fn is_logical(&self) -> bool {
        !matches!(self, StoreError::Transport(_))
    }

    /// Convenience constructor for transport failures.
    pub fn transport(msg: impl Into<String>) -> Self {
        StoreError::Transport(anyhow::anyhow!(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_codes_are_not_transport() {
        assert!(StoreError::NodeExists.is_logical());
        assert!(StoreError::KeyNotFound.is_logical());
        assert!(StoreError::TestFailed.is_logical());
        assert!(!StoreError::transport("connection refused").is_logical());
    }
}
