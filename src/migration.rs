//! Handing boids that crossed a tile border to their new owner.
//!
//! After integration every rank knows, per boid, whether it stayed or which
//! neighbor now owns it. Migration is two rounds against every neighbor:
//! first outgoing counts, then the records themselves. Neighbors with
//! nothing to send still send a zero count and an empty payload, so every
//! posted receive is always matched.

use crate::boid::Boid;
use crate::comm::{
    decode_count, decode_records, encode_count, encode_records, Communicator, Phase, Round, Tag,
};
use crate::error::Result;
use tracing::trace;

/// Per-boid destination decided during integration.
///
/// `targets[i]` is `None` when boid `i` stays, or the index into the
/// neighbor list of the rank that now owns it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    targets: Vec<Option<usize>>,
    outgoing: Vec<usize>,
}

impl MigrationPlan {
    pub fn with_capacity(num_boids: usize, num_neighbors: usize) -> Self {
        Self {
            targets: Vec::with_capacity(num_boids),
            outgoing: vec![0; num_neighbors],
        }
    }

    /// The next boid stays on this rank.
    pub fn keep(&mut self) {
        self.targets.push(None);
    }

    /// The next boid moves to neighbor slot `slot`.
    pub fn send_to(&mut self, slot: usize) {
        if slot >= self.outgoing.len() {
            self.outgoing.resize(slot + 1, 0);
        }
        self.outgoing[slot] += 1;
        self.targets.push(Some(slot));
    }

    pub fn target(&self, index: usize) -> Option<usize> {
        self.targets.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of boids leaving for each neighbor slot.
    pub fn outgoing_counts(&self) -> &[usize] {
        &self.outgoing
    }

    pub fn total_outgoing(&self) -> usize {
        self.outgoing.iter().sum()
    }

    /// Split `local` into the boids that stay and one outgoing batch per
    /// neighbor slot. Relative order is preserved in both.
    pub fn split(&self, local: Vec<Boid>) -> (Vec<Boid>, Vec<Vec<Boid>>) {
        let mut stayers = Vec::with_capacity(local.len().saturating_sub(self.total_outgoing()));
        let mut batches: Vec<Vec<Boid>> = self
            .outgoing
            .iter()
            .map(|&n| Vec::with_capacity(n))
            .collect();
        for (i, boid) in local.into_iter().enumerate() {
            match self.target(i) {
                Some(slot) => batches[slot].push(boid),
                None => stayers.push(boid),
            }
        }
        (stayers, batches)
    }
}

/// How many boids crossed this rank's borders in one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub sent: usize,
    pub received: usize,
}

/// Move every planned boid to its new owner and absorb the boids arriving
/// from neighbors.
///
/// Afterwards `local` holds the stayers in their previous order followed by
/// the arrivals in neighbor order.
pub fn migrate<C: Communicator + ?Sized>(
    comm: &C,
    tick: u64,
    neighbors: &[usize],
    local: &mut Vec<Boid>,
    plan: &MigrationPlan,
) -> Result<MigrationStats> {
    let (mut stayers, batches) = plan.split(std::mem::take(local));
    let counts = plan.outgoing_counts();

    let mut count_round = Round::new(comm, Tag::new(tick, Phase::MigrateCount));
    for (slot, &rank) in neighbors.iter().enumerate() {
        count_round.post_send(rank, encode_count(counts.get(slot).copied().unwrap_or(0)))?;
        count_round.post_recv(rank);
    }
    let incoming = count_round
        .wait_all()?
        .into_iter()
        .map(|(source, bytes)| Ok((source, decode_count(source, &bytes)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut record_round = Round::new(comm, Tag::new(tick, Phase::MigrateBoids));
    for (slot, &rank) in neighbors.iter().enumerate() {
        let batch = batches.get(slot).map(Vec::as_slice).unwrap_or(&[]);
        record_round.post_send(rank, encode_records(batch))?;
        record_round.post_recv(rank);
    }

    let sent = plan.total_outgoing();
    let mut received = 0;
    for ((source, bytes), &(_, count)) in record_round.wait_all()?.into_iter().zip(&incoming) {
        let arrivals = decode_records::<Boid>(source, &bytes, count)?;
        if count > 0 {
            trace!(tick, source, count, "boids arrived");
        }
        received += arrivals.len();
        stayers.extend(arrivals);
    }

    *local = stayers;
    Ok(MigrationStats { sent, received })
}
