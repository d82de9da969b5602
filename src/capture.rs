//! This module contains all the sampling logic

// The sampling thread does one thing: read the ADC at a fixed cadence, and nothing else.
// Completed blocks are moved through the block channel to be processed on the controller
// thread. It never looks at what the controller is doing.

use std::{
    f64::consts::PI,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::{
    channel::{BlockSender, Submitted},
    monitoring::PipelineStats,
    Error, SampleBlock, ADC_MAX, BLOCK_SIZE,
};

/// Anything that can hand us one raw ADC reading at a time
pub trait AnalogSource {
    fn read_sample(&mut self) -> u16;
}

/// Simulated analog front end: a tone riding on a mid-scale bias, plus uniform noise
pub struct SineSource {
    tone_hz: f64,
    amplitude: f64,
    bias: f64,
    noise: f64,
    sample_rate: f64,
    n: u64,
}

impl SineSource {
    pub fn new(tone_hz: f64, sample_rate: u32) -> Self {
        Self {
            tone_hz,
            amplitude: 1000.0,
            bias: 2048.0,
            noise: 0.0,
            sample_rate: sample_rate as f64,
            n: 0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Peak amplitude (in ADC counts) of uniform noise added to each sample.
    /// Anything that isn't a finite number turns the noise off.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = if noise.is_finite() { noise.abs() } else { 0.0 };
        self
    }
}

impl AnalogSource for SineSource {
    fn read_sample(&mut self) -> u16 {
        let t = self.n as f64 / self.sample_rate;
        self.n += 1;
        let mut v = self.bias + self.amplitude * (2.0 * PI * self.tone_hz * t).sin();
        if self.noise > 0.0 {
            v += rand::thread_rng().gen_range(-self.noise..=self.noise);
        }
        v.round().clamp(0.0, ADC_MAX as f64) as u16
    }
}

/// The in-progress block. Owned by the producer and never shared until it's sealed.
pub struct BlockAccumulator {
    buf: Box<[u16; BLOCK_SIZE]>,
    idx: usize,
    next_seq: u64,
}

impl Default for BlockAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u16; BLOCK_SIZE]),
            idx: 0,
            next_seq: 0,
        }
    }

    /// Append a sample, returning the sealed block if this one filled it
    pub fn push(&mut self, sample: u16) -> Option<SampleBlock> {
        self.buf[self.idx] = sample;
        self.idx += 1;
        if self.idx < BLOCK_SIZE {
            return None;
        }
        self.idx = 0;
        let full = std::mem::replace(&mut self.buf, Box::new([0u16; BLOCK_SIZE]));
        let block = SampleBlock::new(self.next_seq, full);
        self.next_seq += 1;
        Some(block)
    }

    /// Samples in the current unsealed block
    pub fn filled(&self) -> usize {
        self.idx
    }
}

/// Runs an [`AnalogSource`] at a fixed sample rate and feeds the block channel
pub struct SampleProducer<S> {
    source: S,
    period: Duration,
    acc: BlockAccumulator,
    sender: BlockSender,
    stats: Arc<PipelineStats>,
}

impl<S: AnalogSource> SampleProducer<S> {
    pub fn new(
        source: S,
        sample_rate: u32,
        sender: BlockSender,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            source,
            period: Duration::from_secs_f64(1.0 / sample_rate.max(1) as f64),
            acc: BlockAccumulator::new(),
            sender,
            stats,
        }
    }

    /// Read one sample and submit the block if it's now complete.
    ///
    /// Only fails if the consumer is gone, see [`BlockSender::submit`].
    pub fn tick(&mut self) -> Result<(), Error> {
        let sample = self.source.read_sample();
        self.stats.sample_read();
        let block = match self.acc.push(sample) {
            Some(b) => b,
            None => return Ok(()),
        };
        let seq = block.seq();
        self.stats.block_sealed();
        match self.sender.submit(block)? {
            Submitted::Enqueued => self.stats.block_enqueued(),
            Submitted::DroppedOldest(n) => {
                debug!(seq, dropped = n, "Consumer behind, evicted stale blocks");
                self.stats.block_enqueued();
                self.stats.blocks_dropped(n as u64);
            }
        }
        Ok(())
    }

    /// Sample until `stop` is raised or the channel goes away
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        info!(period_us = self.period.as_micros() as u64, "Starting sampler");
        let mut next = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.tick() {
                warn!("Sampler stopping - {}", e);
                return;
            }
            next += self.period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else if now - next > self.period {
                // Fell more than a tick behind, don't try to catch up in a burst
                next = now;
            }
        }
        info!("Sampler stopped");
    }
}
