//! One-time initial placement and scatter of boids to their owning ranks.

use crate::boid::{from_heading, Boid};
use crate::comm::{
    decode_count, decode_records, encode_count, encode_records, Communicator, Phase, Tag, ROOT,
};
use crate::config::Config;
use crate::error::Result;
use crate::random::{RandomStream, SeededStream};
use crate::topology::RankTopology;
use glam::DVec2;
use std::f64::consts::TAU;
use tracing::{debug, info};

/// Draw `num_boids` positions uniformly over the domain, x then y per boid.
pub fn initial_positions(config: &Config, stream: &mut dyn RandomStream) -> Vec<DVec2> {
    (0..config.num_boids)
        .map(|_| {
            let x = stream.next_f64() * config.side_len;
            let y = stream.next_f64() * config.side_len;
            DVec2::new(x, y)
        })
        .collect()
}

/// Owning rank of every position, in the same order.
pub fn assign_ranks(positions: &[DVec2], topology: &RankTopology) -> Vec<usize> {
    positions
        .iter()
        .map(|&p| topology.position_to_rank(p))
        .collect()
}

/// Number of boids each rank will own.
pub fn boids_per_rank(ranks: &[usize], num_ranks: usize) -> Vec<usize> {
    let mut counts = vec![0; num_ranks];
    for &rank in ranks {
        counts[rank] += 1;
    }
    counts
}

/// Place the whole population and group it by owning rank.
///
/// Ids are the global generation index. Headings are drawn after all
/// positions, rank by rank, so the layout depends only on the stream.
pub fn place_boids(
    config: &Config,
    topology: &RankTopology,
    stream: &mut dyn RandomStream,
) -> Vec<Vec<Boid>> {
    let positions = initial_positions(config, stream);
    let owners = assign_ranks(&positions, topology);
    let counts = boids_per_rank(&owners, topology.num_ranks());

    let mut per_rank: Vec<Vec<Boid>> = counts.iter().map(|&n| Vec::with_capacity(n)).collect();
    for (rank, boids) in per_rank.iter_mut().enumerate() {
        for (id, (&position, &owner)) in positions.iter().zip(&owners).enumerate() {
            if owner != rank {
                continue;
            }
            let velocity = from_heading(stream.next_f64() * TAU, config.v);
            boids.push(Boid::new(position, velocity, id as u64));
        }
    }
    per_rank
}

/// Hand every rank its initial boids.
///
/// The root places the population and sends each other rank its count, then
/// its records; it keeps its own share without a round-trip. Every other
/// rank blocks until both messages arrive.
pub fn scatter<C: Communicator + ?Sized>(
    comm: &C,
    config: &Config,
    topology: &RankTopology,
) -> Result<Vec<Boid>> {
    let count_tag = Tag::new(0, Phase::ScatterCount);
    let boids_tag = Tag::new(0, Phase::ScatterBoids);

    if comm.rank() != ROOT {
        let count = decode_count(ROOT, &comm.recv(ROOT, count_tag)?)?;
        let bytes = comm.recv(ROOT, boids_tag)?;
        let boids = decode_records::<Boid>(ROOT, &bytes, count)?;
        debug!(count, "received initial boids");
        return Ok(boids);
    }

    let mut stream = SeededStream::placement(config.seed);
    let mut per_rank = place_boids(config, topology, &mut stream);

    for (rank, boids) in per_rank.iter().enumerate().skip(1) {
        comm.isend(rank, count_tag, encode_count(boids.len()))?;
        comm.isend(rank, boids_tag, encode_records(boids))?;
    }

    info!(
        boids = config.num_boids,
        ranks = topology.num_ranks(),
        "scattered initial placement"
    );
    Ok(std::mem::take(&mut per_rank[ROOT]))
}
