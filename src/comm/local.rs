//! In-process transport: every rank is a thread with its own mailbox.

use super::{Communicator, Tag};
use crate::error::{CommError, FlockError};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{debug, info_span, warn};

enum Message {
    Data {
        source: usize,
        tag: Tag,
        payload: Vec<u8>,
    },
    Abort {
        source: usize,
    },
}

/// One rank's endpoint of a [`LocalCluster`].
///
/// Sends go straight into the destination's unbounded mailbox, so `isend`
/// never blocks. Receives pull from the mailbox and park any message that
/// does not match the requested `(source, tag)` until someone asks for it.
pub struct LocalComm {
    rank: usize,
    size: usize,
    peers: Vec<Option<Sender<Message>>>,
    mailbox: Receiver<Message>,
    stash: RefCell<HashMap<(usize, Tag), VecDeque<Vec<u8>>>>,
    aborted_by: Cell<Option<usize>>,
    collective_seq: Cell<u64>,
}

impl LocalComm {
    fn take_stashed(&self, source: usize, tag: Tag) -> Option<Vec<u8>> {
        let mut stash = self.stash.borrow_mut();
        let queue = stash.get_mut(&(source, tag))?;
        let payload = queue.pop_front();
        if queue.is_empty() {
            stash.remove(&(source, tag));
        }
        payload
    }

    fn stash(&self, source: usize, tag: Tag, payload: Vec<u8>) {
        self.stash
            .borrow_mut()
            .entry((source, tag))
            .or_default()
            .push_back(payload);
    }

    /// Number of received messages nobody has asked for yet.
    pub fn pending(&self) -> usize {
        self.stash.borrow().values().map(VecDeque::len).sum()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<(), CommError> {
        if dest >= self.size {
            return Err(CommError::InvalidRank {
                rank: dest,
                size: self.size,
            });
        }
        match &self.peers[dest] {
            Some(sender) => sender
                .send(Message::Data {
                    source: self.rank,
                    tag,
                    payload,
                })
                .map_err(|_| CommError::Disconnected { rank: dest }),
            None => {
                self.stash(self.rank, tag, payload);
                Ok(())
            }
        }
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>, CommError> {
        if source >= self.size {
            return Err(CommError::InvalidRank {
                rank: source,
                size: self.size,
            });
        }
        if let Some(payload) = self.take_stashed(source, tag) {
            return Ok(payload);
        }
        if let Some(rank) = self.aborted_by.get() {
            return Err(CommError::PeerAborted { rank });
        }

        loop {
            match self.mailbox.recv() {
                Ok(Message::Data {
                    source: from,
                    tag: got,
                    payload,
                }) => {
                    if from == source && got == tag {
                        return Ok(payload);
                    }
                    self.stash(from, got, payload);
                }
                Ok(Message::Abort { source: from }) => {
                    self.aborted_by.set(Some(from));
                    return Err(CommError::PeerAborted { rank: from });
                }
                Err(_) => return Err(CommError::Disconnected { rank: source }),
            }
        }
    }

    fn next_collective(&self) -> u64 {
        let seq = self.collective_seq.get();
        self.collective_seq.set(seq + 1);
        seq
    }

    fn abort(&self) {
        for sender in self.peers.iter().flatten() {
            // A peer that already exited has nothing left to wake up.
            let _ = sender.send(Message::Abort { source: self.rank });
        }
    }
}

/// A fixed set of ranks running as threads of the current process.
#[derive(Clone, Copy, Debug)]
pub struct LocalCluster {
    size: usize,
}

impl LocalCluster {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Build the fully connected set of endpoints, indexed by rank.
    pub fn communicators(&self) -> Vec<LocalComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..self.size).map(|_| mpsc::channel::<Message>()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, mailbox)| LocalComm {
                rank,
                size: self.size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| (dest != rank).then(|| tx.clone()))
                    .collect(),
                mailbox,
                stash: RefCell::new(HashMap::new()),
                aborted_by: Cell::new(None),
                collective_seq: Cell::new(0),
            })
            .collect()
    }

    /// Run `body` once per rank, each on its own thread, and collect the
    /// per-rank results in rank order.
    ///
    /// A rank that fails or panics aborts every peer, so ranks blocked on it
    /// fail with [`CommError::PeerAborted`] instead of hanging. Failures are
    /// returned, not printed; the caller reports the one that matters.
    pub fn run<T, F>(&self, body: F) -> Vec<Result<T, FlockError>>
    where
        T: Send,
        F: Fn(&LocalComm) -> Result<T, FlockError> + Sync,
    {
        let body = &body;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .communicators()
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let rank = comm.rank();
                        let _span = info_span!("rank", rank).entered();
                        match panic::catch_unwind(AssertUnwindSafe(|| body(&comm))) {
                            Ok(Ok(value)) => {
                                let pending = comm.pending();
                                if pending > 0 {
                                    warn!(pending, "rank finished with unreceived messages");
                                }
                                Ok(value)
                            }
                            Ok(Err(err)) => {
                                if err.reported_by(rank) {
                                    debug!(%err, "rank failed");
                                }
                                comm.abort();
                                Err(err)
                            }
                            Err(_) => {
                                comm.abort();
                                Err(CommError::Panicked { rank }.into())
                            }
                        }
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(CommError::Panicked { rank }.into()))
                })
                .collect()
        })
    }
}
