//! # Block Convolver (Overlap-Save)
//!
//! Applies the equalizer's FIR filter to the stream one block at a time,
//! in the frequency domain.
//!
//! ## Why a Transform Twice the Block
//!
//! Multiplying two spectra of size `N` is a *circular* convolution: the
//! tail of the result wraps around to the start. With an impulse response
//! of length `L` and a block of `B` samples, the first `L - 1` outputs of
//! each transform are wrapped garbage and the next `B` are correct, as
//! long as `N ≥ B + L - 1`. The pipeline uses `N = 2B` and `L = 3B/4`.
//!
//! ## One Block
//!
//! ```text
//!  history (N samples)
//!  ┌──────────────────┬──────────────────────┬─────────┐
//!  │ last L-1 inputs  │  new B-sample block  │  zeros  │
//!  └──────────────────┴──────────────────────┴─────────┘
//!          │ FFT, × response, IFFT
//!          ▼
//!  ┌──────────────────┬──────────────────────┬─────────┐
//!  │  wrapped (drop)  │    output block      │ (drop)  │
//!  └──────────────────┴──────────────────────┴─────────┘
//!   0              L-1                L-1+B
//! ```
//!
//! The `L - 1` most recent inputs are carried into the next block, which
//! is what makes the result identical to a plain time-domain FIR.

use std::sync::Arc;

use nih_plug::{nih_debug_assert, nih_debug_assert_eq, nih_debug_assert_failure};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;

use super::Stage;

/// FFT-based FIR filter for fixed-size blocks.
pub struct BlockConvolver {
    block_size: usize,
    transform_size: usize,
    /// Length of the impulse response the current response came from.
    /// Zero until a filter is set; the convolver passes audio through.
    impulse_len: usize,

    /// Bins `0..=N/2`, pre-divided by `N`.
    response: Vec<Complex32>,
    /// `[last L-1 inputs | current block | zeros]`, length `N`.
    history: Vec<f32>,

    /// Copy of `history` for the forward transform, which destroys it.
    time_work: Vec<f32>,
    spectrum: Vec<Complex32>,
    output_window: Vec<f32>,

    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
}

impl BlockConvolver {
    /// A convolver for blocks of `block_size` samples, with no filter yet.
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let transform_size = 2 * block_size;

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(transform_size);
        let inverse = planner.plan_fft_inverse(transform_size);

        Self {
            block_size,
            transform_size,
            impulse_len: 0,
            response: forward.make_output_vec(),
            history: vec![0.0; transform_size],
            time_work: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            output_window: inverse.make_output_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            forward,
            inverse,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    pub fn impulse_len(&self) -> usize {
        self.impulse_len
    }

    /// Whether a filter has been set.
    pub fn is_configured(&self) -> bool {
        self.impulse_len > 0
    }

    /// Install a response designed by the
    /// [`SpectrumDesigner`](super::equalizer::SpectrumDesigner).
    ///
    /// `response` holds bins `0..=transform_size / 2`, already divided by
    /// `transform_size`. It is copied as-is. Buffers are only reallocated
    /// when `transform_size` or `impulse_len` differ from the current ones,
    /// so on the audio thread this is a plain copy.
    pub fn set_frequency_response(
        &mut self,
        response: &[Complex32],
        impulse_len: usize,
        transform_size: usize,
    ) {
        nih_debug_assert_eq!(response.len(), transform_size / 2 + 1);
        nih_debug_assert!(transform_size >= self.block_size + impulse_len.saturating_sub(1));

        self.reconfigure(impulse_len, transform_size);
        let bins = self.response.len().min(response.len());
        self.response[..bins].copy_from_slice(&response[..bins]);
        self.response[bins..].fill(Complex32::default());
    }

    /// Install a filter from its time-domain impulse response. The
    /// transform size stays at twice the block size.
    pub fn set_impulse_response(&mut self, impulse: &[f32]) {
        let transform_size = self.transform_size;
        let len = impulse.len().min(transform_size);
        nih_debug_assert!(transform_size >= self.block_size + len.saturating_sub(1));

        self.reconfigure(len, transform_size);

        self.time_work[..len].copy_from_slice(&impulse[..len]);
        self.time_work[len..].fill(0.0);
        if let Err(err) = self.forward.process_with_scratch(
            &mut self.time_work,
            &mut self.response,
            &mut self.forward_scratch,
        ) {
            nih_debug_assert_failure!("convolver forward FFT failed: {}", err);
        }

        let scale = 1.0 / transform_size as f32;
        for bin in self.response.iter_mut() {
            *bin *= scale;
        }
    }

    /// Re-plan only when the geometry changes.
    fn reconfigure(&mut self, impulse_len: usize, transform_size: usize) {
        if transform_size != self.transform_size {
            let mut planner = RealFftPlanner::<f32>::new();
            self.transform_size = transform_size;
            self.forward = planner.plan_fft_forward(transform_size);
            self.inverse = planner.plan_fft_inverse(transform_size);
            self.response = self.forward.make_output_vec();
            self.history = vec![0.0; transform_size];
            self.time_work = self.forward.make_input_vec();
            self.spectrum = self.forward.make_output_vec();
            self.output_window = self.inverse.make_output_vec();
            self.forward_scratch = self.forward.make_scratch_vec();
            self.inverse_scratch = self.inverse.make_scratch_vec();
        } else if impulse_len != self.impulse_len {
            self.history.fill(0.0);
        }
        self.impulse_len = impulse_len;
    }

    /// Convolve one block. `input` and `output` must both be
    /// `block_size` long; anything else is copied through unchanged.
    pub fn filter(&mut self, input: &[f32], output: &mut [f32]) {
        nih_debug_assert_eq!(input.len(), self.block_size);
        nih_debug_assert_eq!(output.len(), self.block_size);

        let block = self.block_size;
        let carry = self.impulse_len.saturating_sub(1);

        if !self.is_configured()
            || input.len() != block
            || output.len() != block
            || carry + block > self.transform_size
        {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            return;
        }

        // Slide the previous tail to the front and append the new block.
        self.history.copy_within(block..block + carry, 0);
        self.history[carry..carry + block].copy_from_slice(input);

        self.time_work.copy_from_slice(&self.history);
        if let Err(err) = self.forward.process_with_scratch(
            &mut self.time_work,
            &mut self.spectrum,
            &mut self.forward_scratch,
        ) {
            nih_debug_assert_failure!("convolver forward FFT failed: {}", err);
        }

        for (bin, h) in self.spectrum.iter_mut().zip(&self.response) {
            *bin *= *h;
        }
        // A real signal's DC and Nyquist bins are real.
        if let Some(first) = self.spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.spectrum.last_mut() {
            last.im = 0.0;
        }

        if let Err(err) = self.inverse.process_with_scratch(
            &mut self.spectrum,
            &mut self.output_window,
            &mut self.inverse_scratch,
        ) {
            nih_debug_assert_failure!("convolver inverse FFT failed: {}", err);
        }

        output.copy_from_slice(&self.output_window[carry..carry + block]);
    }

    /// Forget past input. The installed response is kept.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.output_window.fill(0.0);
    }
}

impl Stage for BlockConvolver {
    fn apply(&mut self, input: &[f32], output: &mut [f32]) {
        self.filter(input, output);
    }

    fn reset(&mut self) {
        BlockConvolver::reset(self);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::equalizer::SpectrumDesigner;
    use super::*;

    const BLOCK: usize = 256;

    fn designed(gain: f32) -> (BlockConvolver, usize) {
        let mut designer = SpectrumDesigner::new(16, 3 * BLOCK / 4, 2 * BLOCK);
        for i in 0..16 {
            designer.set_band(i, gain);
        }
        let len = designer.create_filter();

        let mut convolver = BlockConvolver::new(BLOCK);
        convolver.set_frequency_response(
            designer.frequency_response(),
            len,
            designer.transform_size(),
        );
        (convolver, designer.group_delay())
    }

    fn run(convolver: &mut BlockConvolver, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        for (x, y) in input.chunks(BLOCK).zip(output.chunks_mut(BLOCK)) {
            convolver.filter(x, y);
        }
        output
    }

    /// Deterministic pseudo-random input in [-1, 1).
    fn noise(len: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1 << 23) as f32 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_unconfigured_passes_through() {
        let mut convolver = BlockConvolver::new(BLOCK);
        assert!(!convolver.is_configured());

        let input = noise(BLOCK);
        let output = run(&mut convolver, &input);
        assert_eq!(input, output);
    }

    /// A flat equalizer is a pure delay of `L/2` samples across block
    /// boundaries.
    #[test]
    fn test_flat_response_is_pure_delay() {
        let (mut convolver, delay) = designed(1.0);
        assert_eq!(delay, 96);

        let input = noise(BLOCK * 6);
        let output = run(&mut convolver, &input);

        for n in delay..input.len() {
            assert!(
                (output[n] - input[n - delay]).abs() < 1e-3,
                "sample {n}: {} vs {}",
                output[n],
                input[n - delay]
            );
        }
        assert!(output[..delay].iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn test_half_gain_halves_amplitude() {
        let (mut convolver, delay) = designed(0.5);

        let input = noise(BLOCK * 4);
        let output = run(&mut convolver, &input);
        for n in BLOCK..input.len() {
            assert!((output[n] - 0.5 * input[n - delay]).abs() < 1e-3);
        }
    }

    /// A 1 kHz sine at 48 kHz keeps its amplitude within 5% after the
    /// first block.
    #[test]
    fn test_sine_amplitude_preserved() {
        let (mut convolver, _) = designed(1.0);

        let input: Vec<f32> = (0..BLOCK * 8)
            .map(|n| (std::f32::consts::TAU * 1000.0 * n as f32 / 48_000.0).sin())
            .collect();
        let output = run(&mut convolver, &input);

        let peak = output[BLOCK..].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 0.05, "peak {peak}");
    }

    /// Time-domain installation matches direct FIR convolution.
    #[test]
    fn test_impulse_response_matches_direct_convolution() {
        let taps = [0.5, 0.25, -0.125, 0.0625];
        let mut convolver = BlockConvolver::new(BLOCK);
        convolver.set_impulse_response(&taps);
        assert_eq!(convolver.impulse_len(), 4);

        let input = noise(BLOCK * 3);
        let output = run(&mut convolver, &input);

        for n in 0..input.len() {
            let expected: f32 = taps
                .iter()
                .enumerate()
                .filter(|(i, _)| *i <= n)
                .map(|(i, h)| h * input[n - i])
                .sum();
            assert!((output[n] - expected).abs() < 1e-4, "sample {n}");
        }
    }

    #[test]
    fn test_reset_clears_history() {
        let mut convolver = BlockConvolver::new(BLOCK);
        convolver.set_impulse_response(&[0.0, 0.0, 1.0]);

        run(&mut convolver, &noise(BLOCK));
        convolver.reset();

        let output = run(&mut convolver, &vec![0.0; BLOCK]);
        assert!(output.iter().all(|s| s.abs() < 1e-6), "history leaked after reset");
        assert!(convolver.is_configured());
    }

    /// Re-installing a response of the same geometry keeps the history:
    /// the tail of the previous block still comes out of the next one.
    #[test]
    fn test_same_geometry_keeps_history() {
        let (mut convolver, delay) = designed(1.0);
        let input = noise(BLOCK);
        run(&mut convolver, &input);

        let (fresh, _) = designed(1.0);
        convolver.set_frequency_response(&fresh.response, 3 * BLOCK / 4, 2 * BLOCK);
        assert_eq!(convolver.transform_size(), 2 * BLOCK);
        assert_eq!(convolver.impulse_len(), 3 * BLOCK / 4);

        let output = run(&mut convolver, &vec![0.0; BLOCK]);
        for n in 0..delay {
            let carried = input[BLOCK - delay + n];
            assert!((output[n] - carried).abs() < 1e-3, "sample {n}: {} vs {carried}", output[n]);
        }
        assert!(output[delay..].iter().all(|s| s.abs() < 1e-3));
    }
}
