// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for analog tile operations

use crate::backend::Backend;
use thiserror::Error;

/// Result type alias for analog tile operations
pub type Result<T> = std::result::Result<T, TileError>;

/// Errors that can occur while configuring, programming or moving a tile
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TileError {
    /// An array handed to the tile does not match its shape
    #[error("Shape mismatch for {what}: expected {expected}, got {got}")]
    Shape {
        /// Which array was rejected (weights, bias, input, ...)
        what: &'static str,
        /// Expected element count or dimension
        expected: usize,
        /// Received element count or dimension
        got: usize,
    },

    /// Requested backend is not compiled into this build
    #[error("Backend not available: {backend} (not compiled in this build)")]
    BackendUnavailable {
        /// Backend that was requested
        backend: Backend,
    },

    /// Tile configuration is inconsistent
    #[error("Invalid tile configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// Operation is not valid in the current state
    #[error("Invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// A packed tile state could not be decoded
    #[error("Corrupt tile state: {reason}")]
    CorruptState {
        /// Reason for rejection
        reason: String,
    },
}

impl TileError {
    /// Create a shape mismatch error
    pub fn shape(what: &'static str, expected: usize, got: usize) -> Self {
        Self::Shape {
            what,
            expected,
            got,
        }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(backend: Backend) -> Self {
        Self::BackendUnavailable { backend }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Create a corrupt state error
    pub fn corrupt_state(reason: impl Into<String>) -> Self {
        Self::CorruptState {
            reason: reason.into(),
        }
    }

    /// Whether this is a shape mismatch
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }
}

/// Check that `got` matches `expected`, naming the array on failure.
pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(TileError::shape(what, expected, got))
    }
}
