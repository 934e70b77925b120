//! Error types for pflock.
//!
//! Every condition in here is terminal for the whole distributed run: the
//! simulation's value rests on exact conservation of boids, so nothing is
//! retried and no rank is allowed to carry on alone.

use glam::DVec2;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = FlockError> = std::result::Result<T, E>;

/// Errors raised while producing or validating a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for a `Config`.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The `.ini`/`.toml` configuration file is not valid `key = value` text.
    #[error("failed to parse config file {path}: {source}")]
    ParseKeyValue {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
    /// A parameter is outside its valid range.
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Errors raised by the rank-to-rank transport.
#[derive(Debug, Error)]
pub enum CommError {
    /// A message was addressed to a rank outside the communicator.
    #[error("rank {rank} is outside a communicator of size {size}")]
    InvalidRank { rank: usize, size: usize },
    /// A peer failed and tore the run down.
    #[error("rank {rank} aborted the run")]
    PeerAborted { rank: usize },
    /// The mailbox of a rank is gone; the peer thread no longer exists.
    #[error("mailbox of rank {rank} is disconnected")]
    Disconnected { rank: usize },
    /// A payload did not have the size its header promised.
    #[error("malformed payload from rank {source_rank}: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        source_rank: usize,
        expected: usize,
        actual: usize,
    },
    /// A rank thread panicked instead of returning.
    #[error("rank {rank} panicked")]
    Panicked { rank: usize },
    /// The MPI runtime is unavailable or was already initialized.
    #[error("failed to initialize MPI")]
    InitFailed,
}

/// Errors raised by the rank-grid geometry.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The number of ranks cannot be laid out as a square power-of-4 grid.
    #[error("number of ranks needs to be a power of 4, got {num_ranks}")]
    NotPowerOfFour { num_ranks: usize },
    /// A rank id does not exist in the grid.
    #[error("rank {rank} is outside a grid of {num_ranks} ranks")]
    RankOutOfRange { rank: usize, num_ranks: usize },
    /// The domain side length is unusable.
    #[error("domain side length must be positive and finite, got {side_len}")]
    InvalidSideLength { side_len: f64 },
    /// A boid tried to move further than one tile in a single tick.
    #[error(
        "boid {id} moved outside the neighbors of rank {rank}: \
         {from} -> {to} is owned by rank {target}"
    )]
    NonNeighborMove {
        id: u64,
        rank: usize,
        target: usize,
        from: DVec2,
        to: DVec2,
    },
}

/// Post-tick consistency failures. These indicate a decomposition bug.
#[derive(Debug, Error)]
pub enum InvariantError {
    /// Boids were created, lost or duplicated somewhere in the run.
    #[error("tick {tick}: {actual} boids exist across all ranks, expected {expected}")]
    Conservation {
        tick: u64,
        expected: u64,
        actual: u64,
    },
    /// A boid lives on a rank that does not own its position.
    #[error("tick {tick}: boid {id} at {position} is outside the tile of rank {rank}")]
    Locality {
        tick: u64,
        rank: usize,
        id: u64,
        position: DVec2,
    },
    /// A boid left the periodic domain.
    #[error("tick {tick}: boid {id} at {position} is outside the domain")]
    Containment { tick: u64, id: u64, position: DVec2 },
    /// A boid's speed drifted away from the configured speed.
    #[error("tick {tick}: boid {id} has speed {speed}, expected {expected}")]
    Speed {
        tick: u64,
        id: u64,
        speed: f64,
        expected: f64,
    },
}

/// Errors raised while writing simulation frames.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write frame to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for a simulation run.
#[derive(Debug, Error)]
pub enum FlockError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl FlockError {
    /// True when this error was caused by another rank failing first.
    ///
    /// Used to report only the root cause of a distributed failure.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            FlockError::Comm(CommError::PeerAborted { .. } | CommError::Disconnected { .. })
        )
    }

    /// True when every rank hits this error identically during setup, such
    /// as a rank count that is not a power of 4 or an invalid parameter.
    pub fn is_shared(&self) -> bool {
        matches!(
            self,
            FlockError::Config(ConfigError::Invalid { .. })
                | FlockError::Topology(
                    TopologyError::NotPowerOfFour { .. } | TopologyError::InvalidSideLength { .. }
                )
        )
    }

    /// Whether `rank` should report this error. Secondary errors are never
    /// reported, and shared errors only by rank 0.
    pub fn reported_by(&self, rank: usize) -> bool {
        !self.is_secondary() && (rank == 0 || !self.is_shared())
    }
}
