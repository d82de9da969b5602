//! Acquisition-to-spectrum pipeline with a touch-driven capture state machine.
//!
//! A sampling thread ([`capture`]) fills fixed-size blocks and hands them over a bounded
//! [`channel`]. The [`fsm::Controller`] decides when one of those blocks is run through
//! the [`f_engine::SpectrumEngine`] and what the display should show.

use std::fmt;

pub mod capture;
pub mod channel;
pub mod display;
pub mod f_engine;
pub mod fsm;
pub mod input;
pub mod monitoring;

/// Samples per block (and FFT length)
pub const BLOCK_SIZE: usize = 1024;
/// Number of unique magnitude bins for a real-valued block
pub const SPECTRUM_BINS: usize = BLOCK_SIZE / 2;
/// Largest value a 12-bit ADC can produce
pub const ADC_MAX: u16 = 4095;
/// Default sampling rate in Hz
pub const SAMPLE_RATE_HZ: u32 = 1000;
/// Blocks the channel may hold before the overflow policy kicks in
pub const CHANNEL_CAPACITY: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A peripheral or thread failed to come up. Not recoverable without a restart.
    Init(String),
    /// A bounded wait on the block channel elapsed
    ChannelTimeout,
    /// The other end of the block channel is gone
    ChannelDisconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init(what) => write!(f, "initialization failed: {}", what),
            Error::ChannelTimeout => write!(f, "timed out waiting on block channel"),
            Error::ChannelDisconnected => write!(f, "block channel disconnected"),
        }
    }
}

impl std::error::Error for Error {}

/// A sealed block of [`BLOCK_SIZE`] raw ADC samples.
///
/// The only ways to get one are a complete array or a full
/// [`BlockAccumulator`](capture::BlockAccumulator), so a partially filled block can't exist
/// outside the producer. There is no mutable access once sealed.
#[derive(Debug, PartialEq, Eq)]
pub struct SampleBlock {
    seq: u64,
    samples: Box<[u16; BLOCK_SIZE]>,
}

impl SampleBlock {
    pub fn new(seq: u64, samples: Box<[u16; BLOCK_SIZE]>) -> Self {
        Self { seq, samples }
    }

    /// Build a block from a complete array, mostly useful for tests and benches
    pub fn from_array(seq: u64, samples: [u16; BLOCK_SIZE]) -> Self {
        Self::new(seq, Box::new(samples))
    }

    /// Sequence number assigned by the producer when the block was sealed
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn samples(&self) -> &[u16; BLOCK_SIZE] {
        &self.samples
    }
}
