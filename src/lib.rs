//! # pflock - Parallel Flocking
//!
//! A distributed Vicsek-style boid simulation. The square periodic domain
//! is split into a grid of tiles, one per rank, and every rank advances only
//! the boids inside its own tile. All cross-rank visibility goes through
//! explicit messages.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pflock::prelude::*;
//!
//! fn main() -> pflock::Result<()> {
//!     let config = Config {
//!         num_boids: 1_000,
//!         side_len: 20.0,
//!         ..Config::default()
//!     };
//!     let summary = Simulation::new(config)
//!         .with_ranks(16)
//!         .with_output("frames.txt")
//!         .run()?;
//!     println!("order parameter: {:.3}", summary.order_parameter);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Ranks and tiles
//!
//! The number of ranks must be a power of 4 so the tiles form a square
//! grid. Rank `r` owns the tile at `(r mod side, r div side)`; see
//! [`RankTopology`].
//!
//! ### A tick
//!
//! Every rank runs the same sequence each tick:
//!
//! 1. [`halo::exchange_halo`]: swap local boids with every neighbor
//! 2. write the frame for this tick
//! 3. [`flocking::update_velocities`]: align with neighbors, add noise
//! 4. [`flocking::integrate_positions`]: move and wrap on the torus
//! 5. [`migration::migrate`]: hand boids to their new owners
//! 6. [`invariants`]: locality, speed and conservation checks
//!
//! ### Wire records
//!
//! Boids cross rank boundaries as plain-old-data records. Derive [`Wire`]
//! on a struct to get a `{Name}Wire` companion with explicit padding and a
//! [`WireRecord`] implementation.

extern crate self as pflock;

pub mod boid;
pub mod comm;
pub mod config;
pub mod decomposition;
pub mod error;
pub mod flocking;
pub mod halo;
pub mod invariants;
pub mod migration;
pub mod output;
pub mod random;
mod simulation;
pub mod time;
pub mod topology;

pub use boid::Boid;
pub use bytemuck;
pub use comm::{Communicator, LocalCluster, LocalComm};
#[cfg(feature = "mpi")]
pub use comm::MpiComm;
pub use config::{Config, ConfigSource, DefaultSource, FileSource, Overrides};
pub use error::{
    CommError, ConfigError, FlockError, InvariantError, OutputError, Result, TopologyError,
};
pub use glam;
pub use glam::DVec2 as Vec2d;
pub use halo::HaloSet;
pub use migration::{MigrationPlan, MigrationStats};
pub use output::{FrameWriter, NullWriter, SharedFileWriter};
pub use pflock_derive::Wire;
pub use random::{RandomStream, SeededStream};
pub use simulation::{RankSimulation, RankSummary, RunSummary, Simulation, TickReport};
pub use topology::{RankTopology, TileBounds};

/// Trait automatically implemented by `#[derive(Wire)]`.
///
/// Bridges a Rust struct to a fixed, padded byte layout that can be copied
/// into a message payload and read back on another rank.
///
/// # Do Not Implement Manually
///
/// The derive macro computes alignment and padding; a hand-written layout
/// that disagrees with it will corrupt every exchange.
pub trait WireRecord: Sized {
    /// Plain-old-data representation with explicit padding.
    type Wire: bytemuck::Pod;

    /// Field names in declaration order.
    const FIELD_NAMES: &'static [&'static str];

    fn to_wire(&self) -> Self::Wire;

    fn from_wire(wire: &Self::Wire) -> Self;
}

/// Convenient re-exports for common usage.
///
/// ```
/// use pflock::prelude::*;
/// ```
pub mod prelude {
    pub use crate::boid::Boid;
    pub use crate::comm::{Communicator, LocalCluster};
    pub use crate::config::{Config, ConfigSource, DefaultSource, FileSource, Overrides};
    pub use crate::error::{FlockError, Result};
    pub use crate::simulation::{RankSimulation, RunSummary, Simulation};
    pub use crate::time::RunTimer;
    pub use crate::topology::RankTopology;
    pub use crate::Vec2d;
    pub use crate::{Wire, WireRecord};
}
