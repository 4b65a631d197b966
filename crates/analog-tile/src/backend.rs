// SPDX-License-Identifier: AGPL-3.0-only

//! Compute backend identity
//!
//! A tile lives on exactly one backend. The CPU backend is always present;
//! the CUDA backend exists only when the crate is built with the `cuda`
//! feature. Nothing here queries hardware: availability is a property of the
//! build, the same way a tile class either was or was not compiled in.

use crate::error::TileError;
use std::fmt;
use std::str::FromStr;

/// Backend a tile's storage lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Host memory
    Cpu,

    /// Accelerator memory (simulated CUDA tile)
    Cuda,
}

impl Backend {
    /// Every backend this crate knows about, compiled or not
    pub const ALL: [Backend; 2] = [Backend::Cpu, Backend::Cuda];

    /// Whether a tile for this backend is compiled into this build
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Cuda => cfg!(feature = "cuda"),
        }
    }

    /// Short lowercase name (`"cpu"`, `"cuda"`)
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }

    /// Wire tag used in packed tile states
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Cpu => 0,
            Self::Cuda => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Cpu),
            1 => Some(Self::Cuda),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" | "host" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(TileError::invalid_config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Backends compiled into this build, CPU first
pub fn available_backends() -> Vec<Backend> {
    Backend::ALL.into_iter().filter(|b| b.is_compiled()).collect()
}

/// Fail with `BackendUnavailable` unless `backend` is compiled in.
///
/// # Errors
///
/// Returns `TileError::BackendUnavailable` for a backend missing from this build.
pub fn ensure_compiled(backend: Backend) -> crate::Result<()> {
    if backend.is_compiled() {
        Ok(())
    } else {
        Err(TileError::backend_unavailable(backend))
    }
}
