//! The capture controller: Idle -> Capturing -> Processing -> Result -> Idle, forever.
//!
//! The controller owns all of its state and is only ever driven from one loop. Each
//! [`Controller::poll`] takes the current time and the raw activation reading, updates the
//! state and hands back the [`DisplayCommand`]s for the caller to apply. Nothing in here
//! sleeps, other than the bounded wait for a block while processing.

use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing::{debug, info, trace, warn};

use crate::{
    channel::BlockReceiver,
    display::{DisplayCommand, SpectrumView, MAX_DISPLAY_FREQ_HZ},
    f_engine::{SpectrumEngine, SpectrumResult},
    Error, SAMPLE_RATE_HZ,
};

/// Label shown once the spectrum for this cycle has been computed
pub const READY_LABEL: &str = "Ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Capturing,
    Processing,
    Result,
}

impl State {
    /// The state an accepted activation moves us to, if its guard allows it
    pub fn next(self) -> Self {
        match self {
            State::Idle => State::Capturing,
            State::Capturing => State::Processing,
            State::Processing => State::Result,
            State::Result => State::Idle,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::Capturing => "Capturing",
            State::Processing => "Processing",
            State::Result => "Result",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the activation reading turns into an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Any poll above threshold counts (a held touch keeps advancing, one settle apart)
    Level,
    /// Only the poll where the reading first crosses the threshold counts
    RisingEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub sample_rate: u32,
    /// Minimum time in Capturing before an activation can move on
    pub capture_duration: Duration,
    /// Activation readings strictly above this are "touched"
    pub threshold: u32,
    /// Activations within this long of the last transition are ignored
    pub settle: Duration,
    /// Longest a single poll will wait for a block while processing
    pub block_wait: Duration,
    /// Upper end of the spectrum view, clamped to Nyquist
    pub max_display_freq: f64,
    pub trigger: TriggerMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_HZ,
            capture_duration: Duration::from_millis(5000),
            threshold: 24_000,
            settle: Duration::from_millis(300),
            block_wait: Duration::from_millis(100),
            max_display_freq: MAX_DISPLAY_FREQ_HZ,
            trigger: TriggerMode::Level,
        }
    }
}

/// One trip around the cycle, from entering Capturing to leaving Result
#[derive(Debug)]
pub struct CaptureSession {
    started_at: Instant,
    spectrum: Option<SpectrumResult>,
}

impl CaptureSession {
    fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            spectrum: None,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Whether this cycle's spectrum has been computed
    pub fn is_ready(&self) -> bool {
        self.spectrum.is_some()
    }

    pub fn spectrum(&self) -> Option<&SpectrumResult> {
        self.spectrum.as_ref()
    }
}

pub struct Controller {
    config: ControllerConfig,
    engine: SpectrumEngine,
    state: State,
    session: Option<CaptureSession>,
    last_transition: Option<Instant>,
    was_active: bool,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            engine: SpectrumEngine::new(config.sample_rate),
            config,
            state: State::Idle,
            session: None,
            last_transition: None,
            was_active: false,
        }
    }

    /// What to show before the first poll
    pub fn start(&self) -> Vec<DisplayCommand> {
        vec![DisplayCommand::Text(self.state.label())]
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// The current cycle's spectrum. Gone as soon as the next capture starts.
    pub fn spectrum(&self) -> Option<&SpectrumResult> {
        self.session.as_ref().and_then(|s| s.spectrum())
    }

    /// Run one iteration of the control loop
    pub fn poll(
        &mut self,
        now: Instant,
        activation: u32,
        blocks: &BlockReceiver,
    ) -> Vec<DisplayCommand> {
        let mut out = Vec::new();
        if self.accept_activation(now, activation) {
            if let Some(next) = self.guarded_next(now) {
                self.enter(next, now, blocks, &mut out);
            }
        }
        if self.state == State::Processing {
            self.process(blocks, &mut out);
        }
        out
    }

    fn accept_activation(&mut self, now: Instant, magnitude: u32) -> bool {
        let active = magnitude > self.config.threshold;
        let rising = active && !self.was_active;
        self.was_active = active;
        trace!(magnitude, active, "Activation");
        let triggered = match self.config.trigger {
            TriggerMode::Level => active,
            TriggerMode::RisingEdge => rising,
        };
        let settled = self
            .last_transition
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.settle);
        triggered && settled
    }

    /// Where an accepted activation takes us from here, or `None` if the guard says stay
    fn guarded_next(&self, now: Instant) -> Option<State> {
        let session = self.session.as_ref();
        let allowed = match self.state {
            State::Idle | State::Result => true,
            State::Capturing => {
                session.map_or(false, |s| s.elapsed(now) >= self.config.capture_duration)
            }
            State::Processing => session.map_or(false, CaptureSession::is_ready),
        };
        if allowed {
            Some(self.state.next())
        } else {
            debug!(state = %self.state, "Activation ignored");
            None
        }
    }

    fn enter(
        &mut self,
        next: State,
        now: Instant,
        blocks: &BlockReceiver,
        out: &mut Vec<DisplayCommand>,
    ) {
        info!(from = %self.state, to = %next, "Transition");
        self.state = next;
        self.last_transition = Some(now);
        match next {
            State::Idle => {
                self.session = None;
                out.push(DisplayCommand::Text(next.label()));
            }
            State::Capturing => {
                // Anything queued was sampled before this capture started
                let stale = blocks.discard_pending();
                if stale > 0 {
                    debug!(stale, "Dropped blocks from before capture");
                }
                self.session = Some(CaptureSession::new(now));
                out.push(DisplayCommand::Text(next.label()));
            }
            State::Processing => {
                if let Some(session) = self.session.as_mut() {
                    session.spectrum = None;
                }
                out.push(DisplayCommand::Text(next.label()));
            }
            State::Result => {
                if let Some(spectrum) = self.spectrum() {
                    out.push(DisplayCommand::Spectrum(SpectrumView::new(
                        spectrum,
                        self.config.max_display_freq,
                    )));
                }
            }
        }
    }

    /// Compute this cycle's spectrum if it hasn't been yet. A missing block just means
    /// we try again next poll.
    fn process(&mut self, blocks: &BlockReceiver, out: &mut Vec<DisplayCommand>) {
        let session = match self.session.as_mut() {
            Some(s) if !s.is_ready() => s,
            _ => return,
        };
        match blocks.receive_timeout(self.config.block_wait) {
            Ok(block) => {
                let spectrum = self.engine.compute(&block);
                if let Some((bin, hz, magnitude)) = spectrum.peak() {
                    info!(seq = block.seq(), bin, hz, magnitude, "Spectrum ready");
                }
                session.spectrum = Some(spectrum);
                out.push(DisplayCommand::Text(READY_LABEL));
            }
            Err(Error::ChannelTimeout) => trace!("No block yet, retrying next poll"),
            Err(e) => warn!("No block to process - {}", e),
        }
    }
}
