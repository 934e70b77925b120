//! Rank-to-rank message passing.
//!
//! Ranks never share memory: everything one rank learns about another goes
//! through a copied byte payload addressed by `(source, tag)`. The
//! [`Communicator`] trait carries the point-to-point primitives; collectives
//! (barrier, reductions, scans) are provided methods layered on top of them
//! with rank 0 as root.
//!
//! Two transports implement it: [`LocalCluster`] runs every rank as a thread
//! of the current process, and `MpiComm` (behind the `mpi` feature) runs one
//! process per rank under `mpirun`.

mod local;
#[cfg(feature = "mpi")]
mod mpi_world;

pub use local::{LocalCluster, LocalComm};
#[cfg(feature = "mpi")]
pub use mpi_world::MpiComm;

use crate::error::CommError;
use crate::WireRecord;

/// Which logical transfer a message belongs to.
///
/// Several distinct transfers happen between the same pair of ranks within
/// one tick; the phase keeps them apart even when their tick matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    ScatterCount,
    ScatterBoids,
    HaloCount,
    HaloBoids,
    MigrateCount,
    MigrateBoids,
    Gather,
    Release,
}

impl Phase {
    pub const COUNT: u32 = 8;

    pub const fn index(self) -> u32 {
        match self {
            Phase::ScatterCount => 0,
            Phase::ScatterBoids => 1,
            Phase::HaloCount => 2,
            Phase::HaloBoids => 3,
            Phase::MigrateCount => 4,
            Phase::MigrateBoids => 5,
            Phase::Gather => 6,
            Phase::Release => 7,
        }
    }
}

/// Largest tag value every MPI implementation must accept.
pub const MAX_WIRE_TAG: i32 = 32767;

/// Number of consecutive sequence numbers with distinct wire tags.
pub const WIRE_SEQ_WINDOW: u64 = (MAX_WIRE_TAG as u64 + 1) / Phase::COUNT as u64;

/// Message correlation tag.
///
/// For per-tick traffic `seq` is the tick number; collectives use their own
/// monotonically increasing sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    pub seq: u64,
    pub phase: Phase,
}

impl Tag {
    pub const fn new(seq: u64, phase: Phase) -> Self {
        Self { seq, phase }
    }

    /// Integer tag for transports with a bounded tag space.
    ///
    /// `seq` wraps every [`WIRE_SEQ_WINDOW`] values. Every round completes
    /// before the next one starts, so a wrapped tag never meets a stale
    /// message with the same value.
    pub fn wire(self) -> i32 {
        let slot = self.seq % WIRE_SEQ_WINDOW;
        (slot * Phase::COUNT as u64 + self.phase.index() as u64) as i32
    }
}

/// Root rank for collectives and initial placement.
pub const ROOT: usize = 0;

/// Point-to-point transport between the ranks of one run.
///
/// Messages between a fixed `(source, dest, tag)` triple are delivered in
/// the order they were sent; messages with different tags may be received in
/// any order.
pub trait Communicator {
    /// This rank's id, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the run.
    fn size(&self) -> usize;

    /// Non-blocking send. The payload is moved into the transport and the
    /// call returns as soon as it is queued.
    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<(), CommError>;

    /// Block until the next message from `source` carrying `tag` arrives.
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>, CommError>;

    /// Sequence number for the next collective call.
    ///
    /// Every rank must issue collectives in the same order, so the counters
    /// stay aligned across ranks without any coordination.
    fn next_collective(&self) -> u64;

    /// Tell every peer that this rank is going down.
    fn abort(&self);

    /// Send each `(dest, payload)` and receive one message from each of
    /// `sources`, all under `tag`. Results come back in `sources` order.
    ///
    /// No send may wait for a matching receive, or ranks exchanging with
    /// each other deadlock. Transports whose `isend` can block override this.
    fn exchange(
        &self,
        tag: Tag,
        sends: Vec<(usize, Vec<u8>)>,
        sources: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>, CommError> {
        for (dest, payload) in sends {
            self.isend(dest, tag, payload)?;
        }
        sources
            .iter()
            .map(|&source| Ok((source, self.recv(source, tag)?)))
            .collect()
    }

    /// Gather one payload per rank on the root. Returns `Some` on the root
    /// only, indexed by rank.
    fn gather_bytes(
        &self,
        seq: u64,
        payload: Vec<u8>,
    ) -> Result<Option<Vec<Vec<u8>>>, CommError> {
        let tag = Tag::new(seq, Phase::Gather);
        if self.rank() != ROOT {
            self.isend(ROOT, tag, payload)?;
            return Ok(None);
        }

        let mut all = Vec::with_capacity(self.size());
        all.push(payload);
        for source in 1..self.size() {
            all.push(self.recv(source, tag)?);
        }
        Ok(Some(all))
    }

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce_sum_u64(0).map(|_| ())
    }

    /// Sum of `value` over all ranks, available on every rank.
    fn all_reduce_sum_u64(&self, value: u64) -> Result<u64, CommError> {
        let seq = self.next_collective();
        let gathered = self.gather_bytes(seq, encode_u64(value))?;
        let release = match gathered {
            Some(all) => {
                let mut total = 0u64;
                for (source, bytes) in all.iter().enumerate() {
                    total += decode_u64(source, bytes)?;
                }
                Some(vec![encode_u64(total); self.size()])
            }
            None => None,
        };
        let bytes = self.release_bytes(seq, release)?;
        decode_u64(ROOT, &bytes)
    }

    /// Element-wise sum of `values` over all ranks, available on every rank.
    ///
    /// Every rank must pass a slice of the same length.
    fn all_reduce_sum_f64(&self, values: &[f64]) -> Result<Vec<f64>, CommError> {
        let seq = self.next_collective();
        let gathered = self.gather_bytes(seq, encode_f64s(values))?;
        let release = match gathered {
            Some(all) => {
                let mut total = vec![0.0; values.len()];
                for (source, bytes) in all.iter().enumerate() {
                    let part = decode_f64s(source, bytes, values.len())?;
                    for (acc, x) in total.iter_mut().zip(part) {
                        *acc += x;
                    }
                }
                Some(vec![encode_f64s(&total); self.size()])
            }
            None => None,
        };
        let bytes = self.release_bytes(seq, release)?;
        decode_f64s(ROOT, &bytes, values.len())
    }

    /// Collect one value per rank on the root. `Some` on the root only.
    fn gather_f64(&self, value: f64) -> Result<Option<Vec<f64>>, CommError> {
        let seq = self.next_collective();
        match self.gather_bytes(seq, encode_f64s(&[value]))? {
            Some(all) => {
                let mut values = Vec::with_capacity(all.len());
                for (source, bytes) in all.iter().enumerate() {
                    values.push(decode_f64s(source, bytes, 1)?[0]);
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    /// Sum of `value` over all ranks strictly below this one.
    fn exclusive_scan_u64(&self, value: u64) -> Result<u64, CommError> {
        let seq = self.next_collective();
        let release = match self.gather_bytes(seq, encode_u64(value))? {
            Some(all) => {
                let mut prefixes = Vec::with_capacity(all.len());
                let mut running = 0u64;
                for (source, bytes) in all.iter().enumerate() {
                    prefixes.push(encode_u64(running));
                    running += decode_u64(source, bytes)?;
                }
                Some(prefixes)
            }
            None => None,
        };
        let bytes = self.release_bytes(seq, release)?;
        decode_u64(ROOT, &bytes)
    }

    /// Hand each rank its entry of `per_rank` from the root; the root keeps
    /// its own entry. Non-root ranks pass `None`.
    fn release_bytes(
        &self,
        seq: u64,
        per_rank: Option<Vec<Vec<u8>>>,
    ) -> Result<Vec<u8>, CommError> {
        let tag = Tag::new(seq, Phase::Release);
        match per_rank {
            Some(per_rank) => {
                let mut own = Vec::new();
                for (dest, payload) in per_rank.into_iter().enumerate() {
                    if dest == self.rank() {
                        own = payload;
                    } else {
                        self.isend(dest, tag, payload)?;
                    }
                }
                Ok(own)
            }
            None => self.recv(ROOT, tag),
        }
    }
}

/// One communication round: every send and receive is posted before any
/// wait, so the round takes as long as its slowest peer rather than the sum
/// over peers. Buffers live exactly as long as the round.
pub struct Round<'c, C: Communicator + ?Sized> {
    comm: &'c C,
    tag: Tag,
    sends: Vec<(usize, Vec<u8>)>,
    receives: Vec<usize>,
}

impl<'c, C: Communicator + ?Sized> Round<'c, C> {
    pub fn new(comm: &'c C, tag: Tag) -> Self {
        Self {
            comm,
            tag,
            sends: Vec::new(),
            receives: Vec::new(),
        }
    }

    pub fn post_send(&mut self, dest: usize, payload: Vec<u8>) -> Result<(), CommError> {
        if dest >= self.comm.size() {
            return Err(CommError::InvalidRank {
                rank: dest,
                size: self.comm.size(),
            });
        }
        self.sends.push((dest, payload));
        Ok(())
    }

    /// Post a receive from `source`. Returns its slot in [`wait_all`](Self::wait_all)'s result.
    pub fn post_recv(&mut self, source: usize) -> usize {
        self.receives.push(source);
        self.receives.len() - 1
    }

    /// Wait for every posted receive. Payloads come back in posting order,
    /// paired with their source rank.
    pub fn wait_all(self) -> Result<Vec<(usize, Vec<u8>)>, CommError> {
        self.comm.exchange(self.tag, self.sends, &self.receives)
    }
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_u64(source: usize, bytes: &[u8]) -> Result<u64, CommError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| CommError::MalformedPayload {
        source_rank: source,
        expected: 8,
        actual: bytes.len(),
    })?;
    Ok(u64::from_le_bytes(raw))
}

/// Encode a record count.
pub fn encode_count(count: usize) -> Vec<u8> {
    encode_u64(count as u64)
}

pub fn decode_count(source: usize, bytes: &[u8]) -> Result<usize, CommError> {
    decode_u64(source, bytes).map(|n| n as usize)
}

fn encode_f64s(values: &[f64]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

fn decode_f64s(source: usize, bytes: &[u8], count: usize) -> Result<Vec<f64>, CommError> {
    let expected = count * std::mem::size_of::<f64>();
    if bytes.len() != expected {
        return Err(CommError::MalformedPayload {
            source_rank: source,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(std::mem::size_of::<f64>())
        .map(bytemuck::pod_read_unaligned::<f64>)
        .collect())
}

/// Pack records into one opaque byte block.
pub fn encode_records<T: WireRecord>(records: &[T]) -> Vec<u8> {
    let wire: Vec<T::Wire> = records.iter().map(WireRecord::to_wire).collect();
    bytemuck::cast_slice(&wire).to_vec()
}

/// Unpack exactly `count` records from a byte block received from `source`.
pub fn decode_records<T: WireRecord>(
    source: usize,
    bytes: &[u8],
    count: usize,
) -> Result<Vec<T>, CommError> {
    let size = std::mem::size_of::<T::Wire>();
    let expected = count * size;
    if bytes.len() != expected {
        return Err(CommError::MalformedPayload {
            source_rank: source,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| T::from_wire(&bytemuck::pod_read_unaligned::<T::Wire>(chunk)))
        .collect())
}
