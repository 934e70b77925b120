//! MPI transport: one process per rank, started by `mpirun`.

use super::{Communicator, Tag};
use crate::error::CommError;
use mpi::environment::Universe;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::{Rank, SimpleCommunicator};
use mpi::traits::Communicator as _;
use std::cell::Cell;

/// This process's endpoint in `MPI_COMM_WORLD`.
///
/// `isend` is a standard-mode send and may wait until the peer receives.
/// That is safe for the root-to-rank and rank-to-root patterns of scatter and
/// the collectives. Neighbor rounds go through [`Communicator::exchange`],
/// which posts non-blocking sends before receiving.
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    collective_seq: Cell<u64>,
}

impl MpiComm {
    /// Initialize MPI and wrap the world communicator.
    ///
    /// MPI is finalized when the returned [`Universe`] is dropped, so keep it
    /// alive for as long as the communicator is used.
    pub fn initialize() -> Result<(Universe, Self), CommError> {
        let universe = mpi::initialize().ok_or(CommError::InitFailed)?;
        let comm = Self::new(universe.world());
        Ok((universe, comm))
    }

    pub fn new(world: SimpleCommunicator) -> Self {
        Self {
            rank: world.rank() as usize,
            size: world.size() as usize,
            world,
            collective_seq: Cell::new(0),
        }
    }

    fn check_rank(&self, rank: usize) -> Result<Rank, CommError> {
        if rank >= self.size {
            return Err(CommError::InvalidRank {
                rank,
                size: self.size,
            });
        }
        Ok(rank as Rank)
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<(), CommError> {
        let dest = self.check_rank(dest)?;
        self.world
            .process_at_rank(dest)
            .send_with_tag(&payload[..], tag.wire());
        Ok(())
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>, CommError> {
        let source = self.check_rank(source)?;
        let (message, _status) = self
            .world
            .process_at_rank(source)
            .matched_probe_with_tag(tag.wire());
        let (payload, _status) = message.matched_receive_vec::<u8>();
        Ok(payload)
    }

    fn next_collective(&self) -> u64 {
        let seq = self.collective_seq.get();
        self.collective_seq.set(seq + 1);
        seq
    }

    fn abort(&self) {
        self.world.abort(1)
    }

    fn exchange(
        &self,
        tag: Tag,
        sends: Vec<(usize, Vec<u8>)>,
        sources: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>, CommError> {
        let wire = tag.wire();
        let dests = sends
            .iter()
            .map(|(dest, _)| self.check_rank(*dest))
            .collect::<Result<Vec<_>, _>>()?;
        let sources_mpi = sources
            .iter()
            .map(|&source| self.check_rank(source))
            .collect::<Result<Vec<_>, _>>()?;

        let received = mpi::request::scope(|scope| {
            let pending: Vec<_> = dests
                .iter()
                .zip(&sends)
                .map(|(&dest, (_, payload))| {
                    self.world
                        .process_at_rank(dest)
                        .immediate_send_with_tag(scope, &payload[..], wire)
                })
                .collect();

            let received: Vec<Vec<u8>> = sources_mpi
                .iter()
                .map(|&source| {
                    let (message, _status) = self
                        .world
                        .process_at_rank(source)
                        .matched_probe_with_tag(wire);
                    message.matched_receive_vec::<u8>().0
                })
                .collect();

            for request in pending {
                request.wait();
            }
            received
        });

        Ok(sources.iter().copied().zip(received).collect())
    }
}
