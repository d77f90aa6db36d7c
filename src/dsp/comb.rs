//! # Comb Notch Filter (Hum Removal)
//!
//! Mains hum is not a single tone: a 60 Hz hum brings 120, 180, 240 Hz ...
//! along with it. A comb filter places a notch on a fundamental and on
//! every one of its harmonics at once.
//!
//! ## The Difference Equation
//!
//! Written in Direct Form II with an intermediate signal `v`:
//!
//! ```text
//! v[n] = α·v[n-k] + β·x[n]
//! y[n] = v[n] - v[n-k]
//! ```
//!
//! which is the transfer function
//!
//! ```text
//!          β (1 - z^-k)
//! H(z) = ---------------
//!          1 - α z^-k
//! ```
//!
//! The zeros of `1 - z^-k` sit at every multiple of `sample_rate / k`, so
//! with `k = round(sample_rate / cut_frequency)` the notches land on the
//! cut frequency and its harmonics. The poles, just inside the unit circle
//! at the same angles, keep each notch narrow.
//!
//! ## Coefficients from Bandwidth
//!
//! ```text
//! γ = cos(π · bandwidth · k / sample_rate)
//! α = (1 - sqrt(1 - γ²)) / γ
//! β = (1 + α) / 2
//! ```
//!
//! `β` normalizes the gain halfway between two notches to exactly 1.
//!
//! `γ == 0` makes `α` a division by zero. In that case (and for any input
//! that cannot produce a finite delay) the filter falls back to a flat
//! pass-through.

use std::f32::consts::PI;

use nih_plug::{nih_debug_assert_eq, nih_warn};

use super::ring_buffer::RingDelayLine;
use super::Stage;

/// Second-order recursive comb filter removing a fundamental and its
/// harmonics.
pub struct CombNotchFilter {
    /// Holds `v[n]`, the intermediate Direct Form II signal.
    ring: RingDelayLine,
    k: usize,
    alpha: f32,
    beta: f32,
    /// Set when the coefficients are degenerate; `filter()` then copies.
    passthrough: bool,
}

impl Default for CombNotchFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CombNotchFilter {
    /// An uninitialized filter passes audio through unchanged until
    /// [`init()`](Self::init) is called.
    pub fn new() -> Self {
        Self {
            ring: RingDelayLine::with_max_delay(0),
            k: 0,
            alpha: 0.0,
            beta: 1.0,
            passthrough: true,
        }
    }

    /// Derive the delay and coefficients, and allocate the ring.
    ///
    /// # Arguments
    /// * `sample_rate` - in Hz, e.g. 48000
    /// * `cut_frequency` - fundamental to remove, e.g. 60.0 for mains hum
    /// * `bandwidth_hz` - width of each notch, e.g. 6.0
    pub fn init(&mut self, sample_rate: u32, cut_frequency: f32, bandwidth_hz: f32) {
        let sample_rate_f = sample_rate as f32;
        let delay = if cut_frequency > 0.0 {
            (sample_rate_f / cut_frequency).round()
        } else {
            0.0
        };

        if !delay.is_finite() || delay < 1.0 {
            nih_warn!(
                "comb notch: cut frequency {cut_frequency} Hz gives no usable delay at {sample_rate} Hz, passing through"
            );
            self.set_passthrough();
            return;
        }

        self.k = delay as usize;
        self.ring = RingDelayLine::with_max_delay(self.k);

        let gamma = (bandwidth_hz * PI * self.k as f32 / sample_rate_f).cos();
        if !gamma.is_finite() || gamma.abs() < f32::EPSILON {
            nih_warn!(
                "comb notch: degenerate bandwidth {bandwidth_hz} Hz for k = {}, passing through",
                self.k
            );
            self.set_passthrough();
            return;
        }

        self.alpha = (1.0 - (1.0 - gamma * gamma).sqrt()) / gamma;
        self.beta = (1.0 + self.alpha) / 2.0;
        self.passthrough = false;
    }

    fn set_passthrough(&mut self) {
        self.k = 0;
        self.alpha = 0.0;
        self.beta = 1.0;
        self.passthrough = true;
    }

    /// Delay in samples between the notch and its harmonics' period.
    pub fn delay(&self) -> usize {
        self.k
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Filter `input` into `output`. Both must have the same length.
    pub fn filter(&mut self, input: &[f32], output: &mut [f32]) {
        nih_debug_assert_eq!(input.len(), output.len());

        if self.passthrough {
            output.copy_from_slice(input);
            return;
        }

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let v_delayed = self.ring.read(self.k);
            let v = self.alpha * v_delayed + self.beta * *x;
            self.ring.write(v);
            *y = v - v_delayed;
            self.ring.advance();
        }
    }

    /// Silence the filter's memory.
    pub fn reset(&mut self) {
        self.ring.clear();
    }
}

impl Stage for CombNotchFilter {
    fn apply(&mut self, input: &[f32], output: &mut [f32]) {
        self.filter(input, output);
    }

    fn reset(&mut self) {
        CombNotchFilter::reset(self);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
