//! Blocking point-to-point and collective message passing between ranks.
//!
//! [`SerialComm`] is the single-rank communicator; [`ChannelComm`] connects
//! ranks running on separate threads of one process.

use std::{
    cell::{Cell, RefCell},
    sync::mpsc::{channel, Receiver, Sender},
};

use crate::error::CommError;

const COLLECTIVE_TAG: u32 = 1 << 31;

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Buffered send; never blocks.
    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<(), CommError>;

    /// Blocks until a message with `tag` from `source` is available.
    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>, CommError>;

    /// Every rank's `local`, indexed by rank.
    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError>;

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<(), CommError> {
        self.all_reduce_with(values, |a, b| a + b)
    }

    fn all_reduce_max(&self, values: &mut [f64]) -> Result<(), CommError> {
        self.all_reduce_with(values, f64::max)
    }

    fn all_reduce_min(&self, values: &mut [f64]) -> Result<(), CommError> {
        self.all_reduce_with(values, f64::min)
    }

    /// Reduction in rank order, so every rank computes a bit-identical result.
    fn all_reduce_with(
        &self,
        values: &mut [f64],
        op: fn(f64, f64) -> f64,
    ) -> Result<(), CommError> {
        if self.size() == 1 {
            return Ok(());
        }
        let all = self.all_gather(values)?;
        for (rank, contribution) in all.iter().enumerate() {
            if contribution.len() != values.len() {
                return Err(CommError::LengthMismatch {
                    rank,
                    expected: values.len(),
                    got: contribution.len(),
                });
            }
        }
        for (k, v) in values.iter_mut().enumerate() {
            *v = all
                .iter()
                .map(|c| c[k])
                .reduce(op)
                .unwrap_or(*v);
        }
        Ok(())
    }
}

struct Message {
    source: usize,
    tag: u32,
    data: Vec<f64>,
}

/// Single-rank communicator. Messages sent to self are queued, which is what
/// periodic halo links on one rank rely on.
#[derive(Default)]
pub struct SerialComm {
    pending: RefCell<Vec<(u32, Vec<f64>)>>,
}

impl SerialComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<(), CommError> {
        if dest != 0 {
            return Err(CommError::InvalidRank(dest, 1));
        }
        self.pending.borrow_mut().push((tag, data));
        Ok(())
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>, CommError> {
        if source != 0 {
            return Err(CommError::InvalidRank(source, 1));
        }
        let mut pending = self.pending.borrow_mut();
        match pending.iter().position(|(t, _)| *t == tag) {
            Some(k) => Ok(pending.remove(k).1),
            // nobody else can ever send it
            None => Err(CommError::Disconnected(0)),
        }
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError> {
        Ok(vec![local.to_vec()])
    }
}

/// One rank of a group of communicators joined by channels, see
/// [`ChannelComm::group`].
///
/// A rank holds no sender to itself, so once every peer is dropped a
/// blocked receive fails with [`CommError::Disconnected`]. Messages to
/// self go straight to the pending queue.
pub struct ChannelComm {
    rank: usize,
    senders: Vec<Option<Sender<Message>>>,
    receiver: Receiver<Message>,
    pending: RefCell<Vec<Message>>,
    collective_seq: Cell<u32>,
}

impl ChannelComm {
    /// Creates `size` connected ranks; move each one to its own thread.
    pub fn group(size: usize) -> Vec<ChannelComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ChannelComm {
                rank,
                senders: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, s)| (dest != rank).then(|| s.clone()))
                    .collect(),
                receiver,
                pending: RefCell::new(Vec::new()),
                collective_seq: Cell::new(0),
            })
            .collect()
    }

    fn take_pending(&self, source: usize, tag: u32) -> Option<Vec<f64>> {
        let mut pending = self.pending.borrow_mut();
        pending
            .iter()
            .position(|m| m.source == source && m.tag == tag)
            .map(|k| pending.remove(k).data)
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<(), CommError> {
        let message = Message {
            source: self.rank,
            tag,
            data,
        };
        match self.senders.get(dest) {
            None => Err(CommError::InvalidRank(dest, self.senders.len())),
            Some(None) => {
                self.pending.borrow_mut().push(message);
                Ok(())
            }
            Some(Some(sender)) => sender.send(message).map_err(|_| CommError::Disconnected(dest)),
        }
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>, CommError> {
        if source >= self.size() {
            return Err(CommError::InvalidRank(source, self.size()));
        }
        if let Some(data) = self.take_pending(source, tag) {
            return Ok(data);
        }
        if source == self.rank {
            return Err(CommError::Disconnected(source));
        }
        loop {
            let message = self
                .receiver
                .recv()
                .map_err(|_| CommError::Disconnected(source))?;
            if message.source == source && message.tag == tag {
                return Ok(message.data);
            }
            self.pending.borrow_mut().push(message);
        }
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError> {
        let seq = self.collective_seq.get();
        self.collective_seq.set(seq.wrapping_add(1) & !COLLECTIVE_TAG);
        let tag = COLLECTIVE_TAG | seq;

        for dest in (0..self.size()).filter(|&r| r != self.rank) {
            self.send(dest, tag, local.to_vec())?;
        }
        (0..self.size())
            .map(|source| {
                if source == self.rank {
                    Ok(local.to_vec())
                } else {
                    self.recv(source, tag)
                }
            })
            .collect()
    }
}
