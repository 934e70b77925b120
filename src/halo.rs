//! Per-tick sharing of neighboring ranks' boids.
//!
//! Before the velocity update every rank needs to see the boids living just
//! across its borders. Each rank sends a snapshot of its whole local state to
//! every neighbor and receives theirs in return; the received copies form the
//! [`HaloSet`] for that tick and are never migrated or mutated.

use crate::boid::Boid;
use crate::comm::{
    decode_count, decode_records, encode_count, encode_records, Communicator, Phase, Round, Tag,
};
use crate::error::Result;
use std::ops::Range;

/// Read-only copies of neighboring boids for one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HaloSet {
    boids: Vec<Boid>,
    origins: Vec<(usize, Range<usize>)>,
}

impl HaloSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `boids` received from `rank`.
    pub fn extend_from(&mut self, rank: usize, boids: Vec<Boid>) {
        let start = self.boids.len();
        self.boids.extend(boids);
        self.origins.push((rank, start..self.boids.len()));
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    /// Boids that came from `rank`, empty when `rank` is not a neighbor.
    pub fn from_rank(&self, rank: usize) -> &[Boid] {
        self.origins
            .iter()
            .find(|(origin, _)| *origin == rank)
            .map(|(_, range)| &self.boids[range.clone()])
            .unwrap_or(&[])
    }

    /// Origin ranks in the order their boids were appended.
    pub fn origins(&self) -> impl Iterator<Item = usize> + '_ {
        self.origins.iter().map(|(rank, _)| *rank)
    }
}

/// Swap local snapshots with every neighbor for tick `tick`.
///
/// Counts go first so every receive can be sized; both rounds post all of
/// their sends and receives before waiting on any of them.
pub fn exchange_halo<C: Communicator + ?Sized>(
    comm: &C,
    tick: u64,
    neighbors: &[usize],
    local: &[Boid],
) -> Result<HaloSet> {
    let mut counts = Round::new(comm, Tag::new(tick, Phase::HaloCount));
    for &rank in neighbors {
        counts.post_send(rank, encode_count(local.len()))?;
        counts.post_recv(rank);
    }
    let incoming = counts
        .wait_all()?
        .into_iter()
        .map(|(source, bytes)| Ok((source, decode_count(source, &bytes)?)))
        .collect::<Result<Vec<_>>>()?;

    let snapshot = encode_records(local);
    let mut records = Round::new(comm, Tag::new(tick, Phase::HaloBoids));
    for &rank in neighbors {
        records.post_send(rank, snapshot.clone())?;
        records.post_recv(rank);
    }

    let mut halo = HaloSet::new();
    for ((source, bytes), &(_, count)) in records.wait_all()?.into_iter().zip(&incoming) {
        halo.extend_from(source, decode_records::<Boid>(source, &bytes, count)?);
    }
    Ok(halo)
}
