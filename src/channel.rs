//! Bounded handoff of sealed sample blocks from the sampling thread to the controller.
//!
//! Backed by a crossbeam bounded channel. The sending half keeps a clone of the receiver
//! so it can evict the oldest pending block when the consumer falls behind. That clone
//! keeps crossbeam from ever seeing the consumer leave, so [`BlockReceiver`] clears a
//! shared liveness flag when it's dropped and the sender checks that instead.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use tracing::{debug, trace};

use crate::{Error, SampleBlock};

/// How often a blocked send wakes up to check that the consumer is still there
const LIVENESS_POLL: Duration = Duration::from_millis(50);

/// What the producer does when the channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for the consumer, however long that takes
    Block,
    /// Wait up to the timeout, then throw away the oldest pending block
    DropOldest(Duration),
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropOldest(Duration::from_millis(100))
    }
}

/// Outcome of a successful [`BlockSender::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Enqueued,
    /// Enqueued after evicting this many stale blocks
    DroppedOldest(usize),
}

/// Create a block channel holding at most `capacity` sealed blocks
pub fn channel(capacity: usize, policy: OverflowPolicy) -> (BlockSender, BlockReceiver) {
    let (tx, rx) = bounded(capacity);
    let consumer = Arc::new(AtomicBool::new(true));
    (
        BlockSender {
            tx,
            evict: rx.clone(),
            consumer: consumer.clone(),
            policy,
        },
        BlockReceiver { rx, consumer },
    )
}

pub struct BlockSender {
    tx: Sender<SampleBlock>,
    evict: Receiver<SampleBlock>,
    consumer: Arc<AtomicBool>,
    policy: OverflowPolicy,
}

impl BlockSender {
    /// Hand a sealed block to the channel, applying the overflow policy if it's full.
    ///
    /// Fails with [`Error::ChannelDisconnected`] once the [`BlockReceiver`] is dropped,
    /// including while waiting on a full channel.
    pub fn submit(&self, block: SampleBlock) -> Result<Submitted, Error> {
        self.check_consumer()?;
        match self.policy {
            OverflowPolicy::Block => {
                let mut block = block;
                loop {
                    match self.tx.send_timeout(block, LIVENESS_POLL) {
                        Ok(()) => return Ok(Submitted::Enqueued),
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err(Error::ChannelDisconnected)
                        }
                        Err(SendTimeoutError::Timeout(b)) => {
                            self.check_consumer()?;
                            block = b;
                        }
                    }
                }
            }
            OverflowPolicy::DropOldest(timeout) => match self.tx.send_timeout(block, timeout) {
                Ok(()) => Ok(Submitted::Enqueued),
                Err(SendTimeoutError::Disconnected(_)) => Err(Error::ChannelDisconnected),
                Err(SendTimeoutError::Timeout(block)) => self.evict_and_push(block),
            },
        }
    }

    /// Whether the receiving half is still around
    pub fn is_connected(&self) -> bool {
        self.consumer.load(Ordering::Acquire)
    }

    fn check_consumer(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::ChannelDisconnected)
        }
    }

    fn evict_and_push(&self, mut block: SampleBlock) -> Result<Submitted, Error> {
        let mut dropped = 0;
        loop {
            self.check_consumer()?;
            // The consumer may have freed a slot since the timeout, so an empty evict is fine
            match self.evict.try_recv() {
                Ok(stale) => {
                    debug!(seq = stale.seq(), "Channel full, dropping oldest block");
                    dropped += 1;
                }
                Err(_) => {}
            }
            match self.tx.try_send(block) {
                Ok(()) => return Ok(Submitted::DroppedOldest(dropped)),
                Err(TrySendError::Full(b)) => block = b,
                Err(TrySendError::Disconnected(_)) => return Err(Error::ChannelDisconnected),
            }
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

pub struct BlockReceiver {
    rx: Receiver<SampleBlock>,
    consumer: Arc<AtomicBool>,
}

impl Drop for BlockReceiver {
    fn drop(&mut self) {
        self.consumer.store(false, Ordering::Release);
    }
}

impl BlockReceiver {
    /// Block until the oldest pending block is available
    pub fn receive(&self) -> Result<SampleBlock, Error> {
        self.rx.recv().map_err(|_| Error::ChannelDisconnected)
    }

    /// Like [`receive`](Self::receive), but gives up after `timeout`
    pub fn receive_timeout(&self, timeout: Duration) -> Result<SampleBlock, Error> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::ChannelTimeout,
            RecvTimeoutError::Disconnected => Error::ChannelDisconnected,
        })
    }

    /// Throw away everything currently queued, returning how many blocks were dropped
    pub fn discard_pending(&self) -> usize {
        let n = self.rx.try_iter().count();
        if n > 0 {
            trace!(n, "Discarded pending blocks");
        }
        n
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_SIZE;
    use std::{collections::HashSet, thread};

    fn block(seq: u64) -> SampleBlock {
        SampleBlock::from_array(seq, [seq as u16; BLOCK_SIZE])
    }

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = channel(2, OverflowPolicy::Block);
        tx.submit(block(1)).unwrap();
        tx.submit(block(2)).unwrap();
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.receive().unwrap().seq(), 1);
        assert_eq!(rx.receive().unwrap().seq(), 2);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let (tx, rx) = channel(2, OverflowPolicy::DropOldest(Duration::ZERO));
        assert_eq!(tx.submit(block(1)).unwrap(), Submitted::Enqueued);
        assert_eq!(tx.submit(block(2)).unwrap(), Submitted::Enqueued);
        assert_eq!(tx.submit(block(3)).unwrap(), Submitted::DroppedOldest(1));
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.receive().unwrap().seq(), 2);
        assert_eq!(rx.receive().unwrap().seq(), 3);
    }

    #[test]
    fn test_drop_oldest_waits_for_consumer() {
        let (tx, rx) = channel(1, OverflowPolicy::DropOldest(Duration::from_secs(5)));
        tx.submit(block(1)).unwrap();
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            rx.receive().unwrap().seq()
        });
        // Consumer frees the slot well within the timeout, so nothing is dropped
        assert_eq!(tx.submit(block(2)).unwrap(), Submitted::Enqueued);
        assert_eq!(consumer.join().unwrap(), 1);
    }

    #[test]
    fn test_receive_timeout() {
        let (_tx, rx) = channel(2, OverflowPolicy::default());
        assert_eq!(
            rx.receive_timeout(Duration::from_millis(5)),
            Err(Error::ChannelTimeout)
        );
    }

    #[test]
    fn test_disconnected_after_sender_dropped() {
        let (tx, rx) = channel(2, OverflowPolicy::default());
        tx.submit(block(7)).unwrap();
        drop(tx);
        assert_eq!(rx.receive().unwrap().seq(), 7);
        assert_eq!(rx.receive(), Err(Error::ChannelDisconnected));
    }

    #[test]
    fn test_submit_fails_after_receiver_dropped() {
        let (tx, rx) = channel(2, OverflowPolicy::DropOldest(Duration::ZERO));
        assert!(tx.is_connected());
        drop(rx);
        assert!(!tx.is_connected());
        for seq in 0..4 {
            assert_eq!(tx.submit(block(seq)), Err(Error::ChannelDisconnected));
        }

        let (tx, rx) = channel(2, OverflowPolicy::Block);
        tx.submit(block(1)).unwrap();
        tx.submit(block(2)).unwrap();
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(rx);
        });
        // Full channel: the wait ends once the consumer goes away instead of hanging
        assert_eq!(tx.submit(block(3)), Err(Error::ChannelDisconnected));
        consumer.join().unwrap();
    }

    #[test]
    fn test_discard_pending() {
        let (tx, rx) = channel(2, OverflowPolicy::default());
        tx.submit(block(1)).unwrap();
        tx.submit(block(2)).unwrap();
        assert_eq!(rx.discard_pending(), 2);
        assert!(rx.is_empty());
        assert_eq!(rx.discard_pending(), 0);
    }

    #[test]
    fn test_each_block_delivered_once() {
        let (tx, rx) = channel(2, OverflowPolicy::Block);
        let rx = std::sync::Arc::new(rx);
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Ok(b) = rx.receive_timeout(Duration::from_millis(200)) {
                        assert_eq!(b.samples().len(), BLOCK_SIZE);
                        seen.push(b.seq());
                    }
                    seen
                })
            })
            .collect();
        for seq in 0..100 {
            tx.submit(block(seq)).unwrap();
        }
        let mut all = Vec::new();
        for c in consumers {
            all.extend(c.join().unwrap());
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 100);
        assert_eq!(unique.len(), 100);
    }
}
