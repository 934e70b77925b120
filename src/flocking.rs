//! Vicsek-style velocity update and position integration.

use crate::boid::{from_heading, heading, wrap_position, Boid};
use crate::comm::Communicator;
use crate::config::Config;
use crate::error::{Result, TopologyError};
use crate::halo::HaloSet;
use crate::migration::MigrationPlan;
use crate::random::RandomStream;
use crate::topology::RankTopology;
use glam::DVec2;

/// Mean velocity of every boid in `local ∪ halo` strictly within `cutoff`
/// of `boid`. The boid itself is always counted.
pub fn mean_neighbor_velocity(boid: &Boid, local: &[Boid], halo: &[Boid], cutoff: f64) -> DVec2 {
    let mut sum = DVec2::ZERO;
    let mut count = 0usize;
    for other in local.iter().chain(halo) {
        if boid.distance(other) < cutoff {
            sum += other.velocity;
            count += 1;
        }
    }
    if count == 0 {
        // Only reachable with a zero cutoff; keep the current heading.
        return boid.velocity;
    }
    sum / count as f64
}

/// Align every local boid with its neighborhood.
///
/// The new heading is the angle of the mean neighbor velocity plus a
/// uniform perturbation `noise × (u − 0.5)`; the speed is reset to `v`.
/// Every boid reads the velocities as they were before this call.
pub fn update_velocities(
    local: &mut [Boid],
    halo: &HaloSet,
    config: &Config,
    stream: &mut dyn RandomStream,
) {
    let headings: Vec<f64> = local
        .iter()
        .map(|boid| {
            let mean = mean_neighbor_velocity(boid, local, halo.boids(), config.cutoff);
            heading(mean) + config.noise * (stream.next_f64() - 0.5)
        })
        .collect();

    for (boid, angle) in local.iter_mut().zip(headings) {
        boid.velocity = from_heading(angle, config.v);
    }
}

/// Advance every boid by `velocity × dt`, wrap it onto the torus and record
/// which neighbor, if any, now owns it.
///
/// A boid that lands on a rank outside `neighbors` has moved more than one
/// tile in a tick, which the exchange protocol cannot express.
pub fn integrate_positions(
    local: &mut [Boid],
    config: &Config,
    topology: &RankTopology,
    neighbors: &[usize],
) -> Result<MigrationPlan> {
    let mut plan = MigrationPlan::with_capacity(local.len(), neighbors.len());
    for boid in local.iter_mut() {
        let from = boid.position;
        boid.position = wrap_position(from + boid.velocity * config.dt, config.side_len);

        let owner = topology.position_to_rank(boid.position);
        if owner == topology.rank() {
            plan.keep();
            continue;
        }
        match neighbors.iter().position(|&r| r == owner) {
            Some(slot) => plan.send_to(slot),
            None => {
                return Err(TopologyError::NonNeighborMove {
                    id: boid.id,
                    rank: topology.rank(),
                    target: owner,
                    from,
                    to: boid.position,
                }
                .into())
            }
        }
    }
    Ok(plan)
}

/// Sum of the velocities of `boids`.
pub fn velocity_sum(boids: &[Boid]) -> DVec2 {
    boids.iter().map(|b| b.velocity).sum()
}

/// Global alignment `|Σ v| / (N · v)`, in `[0, 1]`; 1 means every boid
/// heads the same way. Collective: every rank must call it.
pub fn order_parameter<C: Communicator + ?Sized>(
    comm: &C,
    local: &[Boid],
    config: &Config,
) -> Result<f64> {
    let sum = velocity_sum(local);
    let total = comm.all_reduce_sum_f64(&[sum.x, sum.y])?;
    Ok(normalized_alignment(
        DVec2::new(total[0], total[1]),
        config.num_boids,
        config.v,
    ))
}

/// `|sum| / (count · speed)` clamped into `[0, 1]` against rounding.
pub fn normalized_alignment(sum: DVec2, count: u64, speed: f64) -> f64 {
    if count == 0 || speed <= 0.0 {
        return 0.0;
    }
    (sum.length() / (count as f64 * speed)).clamp(0.0, 1.0)
}
