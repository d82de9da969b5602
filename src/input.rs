//! Touch input sources. The controller compares whatever these return against its threshold.

use std::{
    io::{self, BufRead},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver};
use tracing::debug;

use crate::Error;

/// Raw magnitude read from the touch sensor (or anything pretending to be one)
pub trait ActivationInput {
    fn read_activation(&mut self) -> u32;
}

/// Every line on stdin counts as one touch.
///
/// A press reads as held for `hold` afterwards, like a finger resting on the pad. With a
/// hold of at least the controller's settle interval plus one poll period, a press that
/// lands inside the settle window is still seen once the window closes.
pub struct KeyboardActivation {
    presses: Receiver<()>,
    level: u32,
    hold: Duration,
    held_until: Option<Instant>,
}

impl KeyboardActivation {
    /// Spawn the stdin reader thread. `level` is the magnitude reported while a press is
    /// held.
    pub fn spawn(level: u32, hold: Duration) -> Result<Self, Error> {
        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || {
                let stdin = io::stdin();
                for _ in stdin.lock().lines() {
                    if tx.send(()).is_err() {
                        break;
                    }
                }
                debug!("stdin closed");
            })
            .map_err(|e| Error::Init(format!("keyboard reader: {}", e)))?;
        Ok(Self::from_presses(rx, level, hold))
    }

    fn from_presses(presses: Receiver<()>, level: u32, hold: Duration) -> Self {
        Self {
            presses,
            level,
            hold,
            held_until: None,
        }
    }
}

impl ActivationInput for KeyboardActivation {
    fn read_activation(&mut self) -> u32 {
        let now = Instant::now();
        if self.presses.try_iter().count() > 0 {
            self.held_until = Some(now + self.hold);
        }
        match self.held_until {
            Some(until) if now < until => self.level,
            _ => {
                self.held_until = None;
                0
            }
        }
    }
}

/// Presses on its own every `period`, for running without anyone at the keyboard
pub struct IntervalActivation {
    period: Duration,
    level: u32,
    last: Instant,
}

impl IntervalActivation {
    pub fn new(period: Duration, level: u32) -> Self {
        Self {
            period,
            level,
            last: Instant::now(),
        }
    }
}

impl ActivationInput for IntervalActivation {
    fn read_activation(&mut self) -> u32 {
        if self.last.elapsed() >= self.period {
            self.last = Instant::now();
            self.level
        } else {
            0
        }
    }
}
