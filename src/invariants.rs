//! Post-tick consistency checks.
//!
//! These never repair anything. A failed check means the decomposition or
//! the exchange protocol is broken, and the run is torn down.

use crate::boid::Boid;
use crate::comm::Communicator;
use crate::error::{InvariantError, Result};
use crate::topology::RankTopology;

/// Every local boid lies inside the domain and inside this rank's tile.
pub fn verify_locality(tick: u64, topology: &RankTopology, local: &[Boid]) -> Result<()> {
    let side = topology.side_len();
    for boid in local {
        let p = boid.position;
        if !(p.x >= 0.0 && p.x < side && p.y >= 0.0 && p.y < side) {
            return Err(InvariantError::Containment {
                tick,
                id: boid.id,
                position: p,
            }
            .into());
        }
        if topology.position_to_rank(p) != topology.rank() {
            return Err(InvariantError::Locality {
                tick,
                rank: topology.rank(),
                id: boid.id,
                position: p,
            }
            .into());
        }
    }
    Ok(())
}

/// Every local boid moves at `v` up to a relative tolerance of 1e-6.
pub fn verify_speed(tick: u64, v: f64, local: &[Boid]) -> Result<()> {
    let tolerance = 1e-6 * v;
    for boid in local {
        let speed = boid.speed();
        if (speed - v).abs() > tolerance {
            return Err(InvariantError::Speed {
                tick,
                id: boid.id,
                speed,
                expected: v,
            }
            .into());
        }
    }
    Ok(())
}

/// The sum of local counts over all ranks equals the configured population.
/// Collective: every rank must call it.
pub fn verify_conservation<C: Communicator + ?Sized>(
    comm: &C,
    tick: u64,
    expected: u64,
    local: &[Boid],
) -> Result<u64> {
    let actual = comm.all_reduce_sum_u64(local.len() as u64)?;
    if actual != expected {
        return Err(InvariantError::Conservation {
            tick,
            expected,
            actual,
        }
        .into());
    }
    Ok(actual)
}
