//! What the controller wants shown, and the sink that shows it.
//!
//! The controller only ever emits [`DisplayCommand`]s. Turning a [`SpectrumView`] into
//! pixels (or terminal cells) is the adapter's business.

use std::io::{self, Write};

use tracing::info;

use crate::{f_engine::SpectrumResult, BLOCK_SIZE, SPECTRUM_BINS};

/// Default upper bound of the spectrum view in Hz
pub const MAX_DISPLAY_FREQ_HZ: f64 = 60.0;

/// Bars ready to draw: bins `first_bin..first_bin + heights.len()` scaled to `0.0..=1.0`
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumView {
    pub first_bin: usize,
    pub heights: Vec<f64>,
    /// Width of one bin in Hz
    pub bin_width: f64,
    /// Upper frequency actually shown, after clamping to Nyquist
    pub max_frequency: f64,
    /// Magnitude that maps to a full-height bar
    pub full_scale: f64,
}

impl SpectrumView {
    /// Select the bins up to `max_frequency` (skipping DC) and scale them linearly
    /// against the largest magnitude in that range.
    pub fn new(spectrum: &SpectrumResult, max_frequency: f64) -> Self {
        let nyquist = spectrum.sample_rate() / 2.0;
        let max_frequency = max_frequency.clamp(0.0, nyquist);
        let max_bin = ((max_frequency / spectrum.sample_rate()) * BLOCK_SIZE as f64) as usize;
        let max_bin = max_bin.min(SPECTRUM_BINS);
        let shown = spectrum.magnitudes().get(1..max_bin).unwrap_or(&[]);
        // Floor of 1 so a flat spectrum draws nothing instead of dividing by zero
        let full_scale = shown.iter().copied().fold(1.0, f64::max);
        Self {
            first_bin: 1,
            heights: shown.iter().map(|m| m / full_scale).collect(),
            bin_width: spectrum.bin_width(),
            max_frequency,
            full_scale,
        }
    }

    /// Frequency of the `i`th bar
    pub fn frequency(&self, i: usize) -> f64 {
        (self.first_bin + i) as f64 * self.bin_width
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCommand {
    Text(&'static str),
    Spectrum(SpectrumView),
}

/// Sink for the controller's output
pub trait DisplayAdapter {
    fn show_text(&mut self, label: &str);
    fn show_spectrum(&mut self, view: &SpectrumView);

    fn apply(&mut self, commands: &[DisplayCommand]) {
        for cmd in commands {
            match cmd {
                DisplayCommand::Text(label) => self.show_text(label),
                DisplayCommand::Spectrum(view) => self.show_spectrum(view),
            }
        }
    }
}

/// Draws into stdout, standing in for a small monochrome panel
pub struct TerminalDisplay<W> {
    out: W,
    width: usize,
    height: usize,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout(width: usize, height: usize) -> Self {
        Self::new(io::stdout(), width, height)
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, width: usize, height: usize) -> Self {
        Self {
            out,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Lay the bars out as rows of cells, top row first.
    ///
    /// Bar `i` lands in column `i * (width - 1) / (n - 1)` and is `1 + h * (height - 1)`
    /// cells tall, so even an empty bin shows as a dot on the bottom row.
    pub fn raster(&self, view: &SpectrumView) -> Vec<String> {
        let mut cols = vec![0usize; self.width];
        let n = view.heights.len();
        for (i, h) in view.heights.iter().enumerate() {
            let x = if n > 1 {
                i * (self.width - 1) / (n - 1)
            } else {
                0
            };
            let y = (h.clamp(0.0, 1.0) * (self.height - 1) as f64) as usize + 1;
            cols[x] = cols[x].max(y);
        }
        (0..self.height)
            .rev()
            .map(|row| {
                cols.iter()
                    .map(|&c| if c > row { '|' } else { ' ' })
                    .collect::<String>()
                    .trim_end()
                    .to_owned()
            })
            .collect()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplayAdapter for TerminalDisplay<W> {
    fn show_text(&mut self, label: &str) {
        info!(label, "Display");
        // Best effort, a broken stdout isn't worth stopping the controller for
        let _ = writeln!(self.out, "[ {} ]", label);
        let _ = self.out.flush();
    }

    fn show_spectrum(&mut self, view: &SpectrumView) {
        info!(
            bars = view.heights.len(),
            max_hz = view.max_frequency,
            full_scale = view.full_scale,
            "Display spectrum"
        );
        let mut frame = self.raster(view);
        frame.push("-".repeat(self.width));
        frame.push(format!(
            "{:.1} Hz{:>w$}",
            view.frequency(0),
            format!("{:.1} Hz", view.max_frequency),
            w = self.width.saturating_sub(8)
        ));
        for line in frame {
            let _ = writeln!(self.out, "{}", line);
        }
        let _ = self.out.flush();
    }
}
