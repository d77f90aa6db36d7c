//! # Feedback Reverberator
//!
//! The simplest reverberator there is: a single recursive delay tap.
//!
//! ```text
//! y[n] = α·y[n-k] + (1 - α)·x[n]
//! ```
//!
//! Each pass around the loop returns the signal `k` samples later, scaled
//! by `α`, so one input sample turns into a train of echoes:
//!
//! ```text
//! n:     0        k          2k          3k
//! y:   (1-α)   α(1-α)     α²(1-α)     α³(1-α)   ...
//! ```
//!
//! - `α = 0` → `y[n] = x[n]`, the filter is transparent.
//! - `0 < |α| < 1` → echoes decay geometrically.
//! - `α = 1` → the input is ignored and whatever is already in the loop
//!   recirculates forever at constant level.
//!
//! ## Buffer Sizing
//!
//! The ring is sized once per sample rate for the longest allowed delay,
//! [`MAX_DELAY_MS`]. Changing the delay afterwards only moves the read tap;
//! nothing is reallocated. There is no crossfade: a delay or feedback
//! change takes effect on the next sample and can be heard as a jump.

use nih_plug::nih_debug_assert_eq;

use super::ring_buffer::RingDelayLine;
use super::Stage;

/// Longest supported delay, in milliseconds.
///
/// At 48 kHz this needs 192001 slots, rounded up to a 262144-sample ring
/// (1 MiB of `f32`).
pub const MAX_DELAY_MS: f32 = 4000.0;

/// Single feedback-tap delay filter.
pub struct Reverberator {
    ring: RingDelayLine,
    /// Delay in samples, always ≥ 1.
    k: usize,
    /// Feedback coefficient, always in `[-1, 1]`.
    alpha: f32,
    sample_rate: u32,
}

impl Default for Reverberator {
    fn default() -> Self {
        Self::new()
    }
}

impl Reverberator {
    /// An uninitialized reverberator with `α = 0`, i.e. a pass-through.
    pub fn new() -> Self {
        Self {
            ring: RingDelayLine::with_max_delay(1),
            k: 1,
            alpha: 0.0,
            sample_rate: 0,
        }
    }

    /// Prepare the filter for a sample rate and set its delay and feedback.
    ///
    /// The ring is only reallocated when `sample_rate` differs from the
    /// previous call; otherwise it is silenced and rewound.
    pub fn init(&mut self, sample_rate: u32, delay_ms: f32, alpha: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            let max_delay = (MAX_DELAY_MS * sample_rate as f32 / 1000.0) as usize;
            self.ring = RingDelayLine::with_max_delay(max_delay.max(1));
        } else {
            self.ring.rewind();
        }

        self.set_delay(delay_ms);
        self.set_alpha(alpha);
    }

    /// Set the feedback coefficient, clamped to `[-1, 1]`.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = if alpha.is_nan() {
            0.0
        } else {
            alpha.clamp(-1.0, 1.0)
        };
    }

    /// Set the echo delay in milliseconds.
    ///
    /// Clamped to `[1 sample, MAX_DELAY_MS]` at the current sample rate.
    pub fn set_delay(&mut self, delay_ms: f32) {
        let delay_ms = delay_ms.min(MAX_DELAY_MS);
        let samples = (delay_ms * self.sample_rate as f32 / 1000.0).round();

        let k = if samples.is_finite() && samples >= 1.0 {
            samples as usize
        } else {
            1
        };
        self.k = k.min(self.ring.max_delay().max(1));
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Delay in use, in milliseconds (quantized to whole samples).
    pub fn delay(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        1000.0 * self.k as f32 / self.sample_rate as f32
    }

    /// Delay in use, in samples.
    pub fn delay_samples(&self) -> usize {
        self.k
    }

    /// Filter `input` into `output`. Both must have the same length.
    pub fn filter(&mut self, input: &[f32], output: &mut [f32]) {
        nih_debug_assert_eq!(input.len(), output.len());

        let alpha = self.alpha;
        let dry = 1.0 - alpha;

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let out = alpha * self.ring.read(self.k) + dry * *x;
            self.ring.write(out);
            *y = out;
            self.ring.advance();
        }
    }

    /// Silence the echo loop. Delay and feedback are kept.
    pub fn reset(&mut self) {
        self.ring.clear();
    }
}

impl Stage for Reverberator {
    fn apply(&mut self, input: &[f32], output: &mut [f32]) {
        self.filter(input, output);
    }

    fn reset(&mut self) {
        Reverberator::reset(self);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 256;

    fn impulse(len: usize) -> Vec<f32> {
        let mut v = vec![0.0; len];
        v[0] = 1.0;
        v
    }

    fn run_blocks(reverb: &mut Reverberator, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        for (x, y) in input.chunks(BLOCK).zip(output.chunks_mut(BLOCK)) {
            reverb.filter(x, y);
        }
        output
    }

    #[test]
    fn test_ring_sized_for_max_delay() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 1000.0, 0.5);
        assert_eq!(reverb.ring.len(), 262_144);

        reverb.init(44_100, 1000.0, 0.5);
        // 176400 + 1 → 262144
        assert_eq!(reverb.ring.len(), 262_144);

        reverb.init(8_000, 1000.0, 0.5);
        // 32000 + 1 → 32768
        assert_eq!(reverb.ring.len(), 32_768);
    }

    /// With α = 0 the reverberator must be exactly transparent.
    #[test]
    fn test_alpha_zero_is_identity() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 10.0, 0.0);

        let input: Vec<f32> = (0..BLOCK * 8).map(|n| ((n * 37) % 101) as f32 / 50.0 - 1.0).collect();
        let output = run_blocks(&mut reverb, &input);
        assert_eq!(input, output);
    }

    #[test]
    fn test_echo_train_decays_geometrically() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 10.0, 0.5);
        let k = reverb.delay_samples();
        assert_eq!(k, 480);

        let output = run_blocks(&mut reverb, &impulse(BLOCK * 8));

        assert!((output[0] - 0.5).abs() < 1e-6);
        assert!((output[k] - 0.25).abs() < 1e-6);
        assert!((output[2 * k] - 0.125).abs() < 1e-6);
        assert!(output[1..k].iter().all(|s| s.abs() < 1e-9));
    }

    /// With α = 1 nothing new enters the loop, and what is already there
    /// comes back every `k` samples at full level, indefinitely.
    #[test]
    fn test_alpha_one_recirculates_forever() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 10.0, 0.5);
        reverb.reset();
        let k = reverb.delay_samples();

        // First block: the impulse enters the loop at half level.
        let mut first = vec![0.0; BLOCK];
        let mut input = vec![0.0; BLOCK];
        input[0] = 1.0;
        reverb.filter(&input, &mut first);
        assert!((first[0] - 0.5).abs() < 1e-6);

        reverb.set_alpha(1.0);
        let tail = run_blocks(&mut reverb, &vec![0.25; k * 100]);

        for period in 1..100 {
            let idx = period * k - BLOCK;
            assert!(
                (tail[idx] - 0.5).abs() < 1e-6,
                "echo {period} should still be 0.5, got {}",
                tail[idx]
            );
        }
        // The 0.25 input is ignored entirely.
        assert!(tail[k / 2].abs() < 1e-9);
    }

    #[test]
    fn test_alpha_is_clamped() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 100.0, 0.5);

        reverb.set_alpha(1.5);
        assert_eq!(reverb.alpha(), 1.0);
        reverb.set_alpha(-3.0);
        assert_eq!(reverb.alpha(), -1.0);
        reverb.set_alpha(0.3);
        assert!((reverb.alpha() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_delay_is_clamped() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 100.0, 0.5);

        reverb.set_delay(10_000.0);
        assert!((reverb.delay() - MAX_DELAY_MS).abs() < 1e-3);
        assert_eq!(reverb.delay_samples(), 192_000);

        reverb.set_delay(0.0);
        assert_eq!(reverb.delay_samples(), 1);

        reverb.set_delay(-5.0);
        assert_eq!(reverb.delay_samples(), 1);

        reverb.set_delay(250.0);
        assert!((reverb.delay() - 250.0).abs() < 1e-3);
    }

    /// Changing the delay moves the tap only; the ring and its contents
    /// stay where they are.
    #[test]
    fn test_set_delay_does_not_reallocate() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 10.0, 0.5);
        let len = reverb.ring.len();
        run_blocks(&mut reverb, &impulse(BLOCK));

        reverb.set_delay(3000.0);
        assert_eq!(reverb.ring.len(), len);
        // The first output (0.5) is still stored BLOCK samples back.
        assert!((reverb.ring.read(BLOCK) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reset_keeps_coefficients() {
        let mut reverb = Reverberator::new();
        reverb.init(48_000, 10.0, 0.7);
        run_blocks(&mut reverb, &impulse(BLOCK));

        reverb.reset();
        assert!((reverb.alpha() - 0.7).abs() < 1e-6);
        assert_eq!(reverb.delay_samples(), 480);

        let output = run_blocks(&mut reverb, &vec![0.0; BLOCK * 4]);
        assert!(output.iter().all(|s| s.abs() < 1e-9), "echoes survived reset");
    }

    #[test]
    fn test_uninitialized_passes_through() {
        let mut reverb = Reverberator::new();
        let input = [0.1, 0.2, -0.3];
        let mut output = [0.0; 3];
        reverb.filter(&input, &mut output);
        assert_eq!(input, output);
    }
}
