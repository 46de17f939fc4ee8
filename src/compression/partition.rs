//! Splitting one input among a fixed group of workers.
//!
//! Rank 0 is the coordinator. It is the only rank that sends, so each other rank holds just the
//! receiving end of its own channel. The group moves through its phases in lock step: every
//! barrier is a WaitGroup cloned into each rank, and a rank passes a barrier once every other
//! rank has either reached it or gone away.
//!
//! A rank that leaves early (error or panic) raises the group's abort flag before its barrier
//! handles and channel ends are dropped. The others are released from whatever they are waiting
//! on and stop with `RleError::Aborted` at their next barrier or receive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use log::trace;

use crate::error::RleError;

/// The rank that owns the input file and hands out the chunks.
pub const COORDINATOR: usize = 0;

/// Barriers in one compression pass: names computed, sizes distributed, buffers allocated,
/// buffers transferred, fragments written.
pub const PHASES: usize = 5;

/// Byte counts for each rank: `file_size / workers` each, with the last rank also taking the
/// remainder.
pub fn chunk_sizes(file_size: u64, workers: usize) -> Vec<u64> {
    if workers == 0 {
        return Vec::new();
    }
    let chunk = file_size / workers as u64;
    let mut sizes = vec![chunk; workers];
    sizes[workers - 1] += file_size % workers as u64;
    sizes
}

/// What the coordinator sends. The two variants stand in for the two message tags of the
/// protocol.
#[derive(Debug)]
pub enum Message {
    ChunkSize(u64),
    Chunk(Vec<u8>),
}

impl Message {
    fn tag(&self) -> &'static str {
        match self {
            Message::ChunkSize(_) => "chunk size",
            Message::Chunk(_) => "chunk",
        }
    }
}

/// One rank's view of the group.
pub struct Endpoint {
    rank: usize,
    size: usize,
    /// Senders to every rank, indexed by rank. Only the coordinator has them.
    outboxes: Vec<Option<Sender<Message>>>,
    inbox: Option<Receiver<Message>>,
    barriers: VecDeque<WaitGroup>,
    abort: Arc<AtomicBool>,
    finished: bool,
}

/// Build the endpoints for a group of `size` ranks, each with `phases` barriers.
pub fn group(size: usize, phases: usize) -> Vec<Endpoint> {
    let abort = Arc::new(AtomicBool::new(false));
    let mut senders = Vec::with_capacity(size);
    let mut receivers = Vec::with_capacity(size);
    for rank in 0..size {
        if rank == COORDINATOR {
            senders.push(None);
            receivers.push(None);
        } else {
            let (tx, rx) = unbounded();
            senders.push(Some(tx));
            receivers.push(Some(rx));
        }
    }

    let phase_groups: Vec<WaitGroup> = (0..phases).map(|_| WaitGroup::new()).collect();
    let mut outboxes = Some(senders);
    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| Endpoint {
            rank,
            size,
            outboxes: if rank == COORDINATOR {
                outboxes.take().unwrap_or_default()
            } else {
                Vec::new()
            },
            inbox,
            barriers: phase_groups.iter().cloned().collect(),
            abort: Arc::clone(&abort),
            finished: false,
        })
        .collect()
    // `phase_groups` drops here, leaving the endpoints as the only holders.
}

impl Endpoint {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR
    }

    fn check_abort(&self) -> Result<(), RleError> {
        if self.abort.load(Ordering::SeqCst) {
            Err(RleError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Wait for the rest of the group at the next barrier.
    pub fn barrier(&mut self) -> Result<(), RleError> {
        self.check_abort()?;
        let phase = PHASES.saturating_sub(self.barriers.len());
        match self.barriers.pop_front() {
            Some(wg) => wg.wait(),
            None => {
                return Err(RleError::Protocol {
                    rank: self.rank,
                    reason: "no barriers left".to_string(),
                })
            }
        }
        trace!("Rank {} passed barrier {}", self.rank, phase);
        self.check_abort()
    }

    /// Send a message to `to`. Blocks only as long as the channel does (never, it is unbounded).
    pub fn send(&self, to: usize, msg: Message) -> Result<(), RleError> {
        let outbox = self.outboxes.get(to).and_then(Option::as_ref).ok_or_else(|| {
            RleError::Protocol {
                rank: self.rank,
                reason: format!("no route to rank {}", to),
            }
        })?;
        outbox.send(msg).map_err(|_| {
            if self.abort.load(Ordering::SeqCst) {
                RleError::Aborted
            } else {
                RleError::Protocol {
                    rank: self.rank,
                    reason: format!("rank {} hung up", to),
                }
            }
        })
    }

    /// Block until the coordinator's next message arrives.
    pub fn recv(&self) -> Result<Message, RleError> {
        let inbox = self.inbox.as_ref().ok_or_else(|| RleError::Protocol {
            rank: self.rank,
            reason: "the coordinator has no inbox".to_string(),
        })?;
        inbox.recv().map_err(|_| {
            if self.abort.load(Ordering::SeqCst) {
                RleError::Aborted
            } else {
                RleError::Protocol {
                    rank: self.rank,
                    reason: "coordinator hung up".to_string(),
                }
            }
        })
    }

    pub fn recv_chunk_size(&self) -> Result<u64, RleError> {
        match self.recv()? {
            Message::ChunkSize(size) => Ok(size),
            other => Err(self.unexpected(&other, "chunk size")),
        }
    }

    pub fn recv_chunk(&self) -> Result<Vec<u8>, RleError> {
        match self.recv()? {
            Message::Chunk(bytes) => Ok(bytes),
            other => Err(self.unexpected(&other, "chunk")),
        }
    }

    fn unexpected(&self, got: &Message, wanted: &str) -> RleError {
        RleError::Protocol {
            rank: self.rank,
            reason: format!("expected a {} message, got a {} message", wanted, got.tag()),
        }
    }

    /// Mark this rank as done. An endpoint dropped without this aborts the group.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if !self.finished {
            self.abort.store(true, Ordering::SeqCst);
        }
    }
}
