//! In this module, we implement the monitoring counters for the sampling pipeline.
//! The sampler bumps these from its own thread, the controller reads snapshots for logging.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    samples_read: AtomicU64,
    blocks_sealed: AtomicU64,
    blocks_enqueued: AtomicU64,
    blocks_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub samples_read: u64,
    pub blocks_sealed: u64,
    pub blocks_enqueued: u64,
    pub blocks_dropped: u64,
}

impl PipelineStats {
    pub fn sample_read(&self) {
        self.samples_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn block_sealed(&self) {
        self.blocks_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn block_enqueued(&self) {
        self.blocks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_dropped(&self, n: u64) {
        self.blocks_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_read: self.samples_read.load(Ordering::Relaxed),
            blocks_sealed: self.blocks_sealed.load(Ordering::Relaxed),
            blocks_enqueued: self.blocks_enqueued.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = PipelineStats::default();
        stats.sample_read();
        stats.sample_read();
        stats.block_sealed();
        stats.block_enqueued();
        stats.blocks_dropped(3);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                samples_read: 2,
                blocks_sealed: 1,
                blocks_enqueued: 1,
                blocks_dropped: 3,
            }
        );
    }
}
