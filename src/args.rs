//! Argument parsing for running the simulated capture loop from the command line

use std::time::Duration;

use clap::{Parser, ValueEnum};
use spectrum_fsm::{
    channel::OverflowPolicy,
    fsm::{ControllerConfig, TriggerMode},
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    /// Wait for a bounded time, then drop the oldest pending block
    DropOldest,
    /// Wait for the consumer indefinitely
    Block,
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// ADC sample rate in Hz
    #[clap(long, default_value_t = 1000)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..))]
    pub sample_rate: u32,
    /// How long to stay in capture before a touch can move on (ms)
    #[clap(long, default_value_t = 5000)]
    pub capture_ms: u64,
    /// Touch readings strictly above this count as a press
    #[clap(short, long, default_value_t = 24000)]
    pub threshold: u32,
    /// Minimum time between accepted touches (ms)
    #[clap(long, default_value_t = 300)]
    pub settle_ms: u64,
    /// Only count a touch when the reading first crosses the threshold
    #[clap(long)]
    pub rising_edge: bool,
    /// Control loop period (ms)
    #[clap(long, default_value_t = 50)]
    pub poll_ms: u64,
    /// Longest a poll waits for a sample block while processing (ms)
    #[clap(long, default_value_t = 100)]
    pub block_wait_ms: u64,
    /// What the sampler does when the block channel is full
    #[clap(long, value_enum, default_value_t = Overflow::DropOldest)]
    pub overflow: Overflow,
    /// How long the sampler waits on a full channel before dropping (ms)
    #[clap(long, default_value_t = 100)]
    pub overflow_timeout_ms: u64,
    /// Highest frequency shown on the spectrum (Hz)
    #[clap(long, default_value_t = 60.0)]
    pub max_freq: f64,
    /// Frequency of the simulated input tone (Hz)
    #[clap(long, default_value_t = 10.0)]
    pub tone_hz: f64,
    /// Peak uniform noise on the simulated input (ADC counts)
    #[clap(long, default_value_t = 50.0)]
    pub noise: f64,
    /// Press automatically at this interval instead of reading Enter from stdin (ms)
    #[clap(long)]
    pub auto_ms: Option<u64>,
    /// Width of the spectrum plot in characters
    #[clap(long, default_value_t = 128)]
    pub width: usize,
    /// Height of the spectrum plot in lines
    #[clap(long, default_value_t = 16)]
    pub height: usize,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

impl Args {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            sample_rate: self.sample_rate,
            capture_duration: Duration::from_millis(self.capture_ms),
            threshold: self.threshold,
            settle: Duration::from_millis(self.settle_ms),
            block_wait: Duration::from_millis(self.block_wait_ms),
            max_display_freq: self.max_freq,
            trigger: if self.rising_edge {
                TriggerMode::RisingEdge
            } else {
                TriggerMode::Level
            },
        }
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        match self.overflow {
            Overflow::Block => OverflowPolicy::Block,
            Overflow::DropOldest => {
                OverflowPolicy::DropOldest(Duration::from_millis(self.overflow_timeout_ms))
            }
        }
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
