//! Cooperative producer-consumer pool.
//!
//! A fixed set of reusable buffers cycles between a free queue and a ready
//! queue (two bounded channels). There is no dedicated reader thread: a
//! consumer that finds the ready queue empty tries to take the single
//! producer token (a `try_lock` on the parser state), refills one buffer,
//! and goes back to consuming. At most one thread produces at a time, and
//! the pool scales uniformly from one worker to many.
//!
//! When the producer reports exhaustion (or fails), the ready queue's
//! sender is dropped; consumers drain what is left and then see the
//! disconnect as end of input. Failures land in the shared first-error
//! slot that the driver inspects after joining the workers.

use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::error::{FirstError, Result};

/// One chunk of normalized sequence handed to a worker.
///
/// `data[start..end]` holds bases (`A`/`C`/`G`/`T`) and `N` break marks;
/// the first k−1 bytes repeat the tail of the previous chunk of the same
/// record so windows straddle chunk boundaries. `end_of_record` marks the
/// final chunk of a record.
#[derive(Debug)]
pub struct SeqBuffer {
    pub data: Vec<u8>,
    pub start: usize,
    pub end: usize,
    pub end_of_record: bool,
    cap: usize,
}

impl SeqBuffer {
    pub(crate) fn with_capacity(cap: usize) -> SeqBuffer {
        SeqBuffer {
            data: Vec::with_capacity(cap),
            start: 0,
            end: 0,
            end_of_record: false,
            cap,
        }
    }

    /// Fill target for the producer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.start = 0;
        self.end = 0;
        self.end_of_record = false;
    }
}

/// Source of buffers; held behind the producer token.
pub trait Producer: Send {
    /// Refill `buf`. `Ok(true)` = one chunk produced, `Ok(false)` = input
    /// exhausted.
    fn produce(&mut self, buf: &mut SeqBuffer) -> Result<bool>;
}

struct ProducerSlot {
    producer: Option<Box<dyn Producer>>,
    ready_tx: Option<Sender<SeqBuffer>>,
}

pub struct CooperativePool {
    free_tx: Sender<SeqBuffer>,
    free_rx: Receiver<SeqBuffer>,
    ready_rx: Receiver<SeqBuffer>,
    slot: Mutex<ProducerSlot>,
    errors: Arc<FirstError>,
}

impl CooperativePool {
    /// A pool of `n_buffers` buffers of `buf_capacity` bytes over `producer`.
    pub fn new(
        producer: Box<dyn Producer>,
        n_buffers: usize,
        buf_capacity: usize,
        errors: Arc<FirstError>,
    ) -> CooperativePool {
        let n_buffers = n_buffers.max(2);
        let (free_tx, free_rx) = bounded(n_buffers);
        let (ready_tx, ready_rx) = bounded(n_buffers);
        for _ in 0..n_buffers {
            free_tx.send(SeqBuffer::with_capacity(buf_capacity)).unwrap();
        }
        CooperativePool {
            free_tx,
            free_rx,
            ready_rx,
            slot: Mutex::new(ProducerSlot {
                producer: Some(producer),
                ready_tx: Some(ready_tx),
            }),
            errors,
        }
    }

    /// Next filled buffer, or `None` when the input is exhausted (or the
    /// run is aborting). Opportunistically becomes the producer when the
    /// ready queue runs dry.
    pub fn next(&self) -> Option<PoolJob<'_>> {
        loop {
            match self.ready_rx.try_recv() {
                Ok(buf) => return Some(PoolJob {
                    pool: self,
                    buf: Some(buf),
                }),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {}
            }
            if self.errors.aborted() {
                return None;
            }
            if let Ok(mut slot) = self.slot.try_lock() {
                if !self.produce_one(&mut slot) {
                    // No free buffer right now; let consumers finish theirs.
                    std::thread::yield_now();
                }
                continue;
            }
            // Another thread holds the producer token; wait for its output.
            match self.ready_rx.recv_timeout(Duration::from_millis(1)) {
                Ok(buf) => return Some(PoolJob {
                    pool: self,
                    buf: Some(buf),
                }),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Refill one buffer while holding the producer token. Returns `false`
    /// when no progress could be made (no free buffer).
    fn produce_one(&self, slot: &mut ProducerSlot) -> bool {
        let Some(producer) = slot.producer.as_mut() else {
            return true; // closed counts as progress; recv sees the disconnect
        };
        let Ok(mut buf) = self.free_rx.try_recv() else {
            return false; // every buffer is in flight; consumers will free one
        };
        buf.reset();
        match producer.produce(&mut buf) {
            Ok(true) => {
                let tx = slot.ready_tx.as_ref().expect("ready sender lives with producer");
                tx.send(buf).expect("pool receiver lives as long as the pool");
            }
            Ok(false) => {
                let _ = self.free_tx.send(buf);
                slot.producer = None;
                slot.ready_tx = None; // disconnects consumers once drained
            }
            Err(e) => {
                let _ = self.free_tx.send(buf);
                self.errors.record(e);
                slot.producer = None;
                slot.ready_tx = None;
            }
        }
        true
    }
}

/// A checked-out buffer; returns to the free queue on drop.
pub struct PoolJob<'p> {
    pool: &'p CooperativePool,
    buf: Option<SeqBuffer>,
}

impl Deref for PoolJob<'_> {
    type Target = SeqBuffer;

    fn deref(&self) -> &SeqBuffer {
        self.buf.as_ref().expect("buffer present until drop")
    }
}

impl Drop for PoolJob<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let _ = self.pool.free_tx.send(buf);
        }
    }
}
