//! # Graphic Equalizer Designer
//!
//! Turns a handful of band gains (one per slider) into the frequency
//! response the [`BlockConvolver`](super::convolver::BlockConvolver)
//! applies to the live stream.
//!
//! ## Design Steps
//!
//! 1. **Band positions.** The top band sits one bin below Nyquist; every
//!    band below it is an octave lower (position ÷ 2, rounded to a bin).
//!    When there are too many bands for octaves to fit in the half
//!    spectrum, the ratio becomes `(N/2)^(1/bands)` instead.
//! 2. **Interpolation.** Gains are joined with straight lines between
//!    band positions, held flat below the first and above the last band,
//!    and mirrored onto the negative-frequency bins (`N - j`). A mirrored
//!    magnitude with zero phase is the spectrum of a real signal.
//! 3. **Linear phase.** Multiplying bin `k` by `(-1)^k` is the same as
//!    delaying the impulse response by `N/2` samples, which moves it from
//!    straddling `n = 0` to the middle of the transform window.
//! 4. **Inverse transform** to get `h(n)`, centred at `N/2`.
//! 5. **Window and truncate.** Keep only the centred `impulse_len`
//!    samples, weighted by the window, and move them to the front of the
//!    buffer. The rest is zero, so `h(n)` has support `[0, impulse_len)`
//!    and zero-padded block convolution does not alias.
//! 6. **Forward transform** of the truncated `h(n)`, which is the final
//!    response.
//!
//! ## Scaling
//!
//! `realfft`'s inverse transform is not normalized: `ifft(fft(x)) = N·x`.
//! The final response is therefore stored divided by `N`, so the
//! convolver can multiply and inverse-transform without rescaling.
//!
//! ## Spectrum Layout
//!
//! Only bins `0..=N/2` of the response are stored. The remaining bins are
//! the complex conjugates of these (Hermitian symmetry) and the real
//! transforms never need them.

use std::f32::consts::PI;
use std::sync::Arc;

use nih_plug::{nih_debug_assert, nih_debug_assert_failure};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;

/// Spacing between neighbouring bands when they fit: one octave.
pub const OCTAVE_RATIO: f32 = 2.0;

/// Window applied to the impulse response before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowKind {
    /// Raised cosine, `0.5 (1 - cos(2πn / L))`. Smooth response, mild
    /// smearing of sharp gain changes.
    #[default]
    Hann,
    /// Plain truncation. Sharper, but rings (Gibbs ripple) around steep
    /// gain changes.
    Rectangular,
}

/// Band settings for the classic 16-band layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandPreset {
    Mute,
    Flat,
    Bass,
    Treble,
    Mid,
}

impl BandPreset {
    /// Gains for bands 0 (lowest) to 15 (highest).
    pub fn gains(self) -> [f32; 16] {
        match self {
            Self::Mute => [0.0; 16],
            Self::Flat => [1.0; 16],
            Self::Bass => [
                1.0, 1.0, 1.0, 0.7, 0.5, 0.3, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ],
            Self::Treble => [
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.3, 0.5, 0.7, 1.0, 1.0, 1.0,
            ],
            Self::Mid => [
                0.0, 0.0, 0.1, 0.3, 0.5, 0.7, 1.0, 1.0, 1.0, 1.0, 0.7, 0.5, 0.3, 0.1, 0.0, 0.0,
            ],
        }
    }
}

/// Holds the band gains and designs the equalizer's frequency response.
///
/// All buffers and FFT plans are created in [`new()`](Self::new);
/// [`create_filter()`](Self::create_filter) does not allocate.
pub struct SpectrumDesigner {
    gains: Vec<f32>,
    /// Normalized band centre frequencies (cycles/sample), lowest first.
    center_freqs: Vec<f32>,
    /// Bin index of each band centre, lowest first.
    positions: Vec<usize>,

    impulse_len: usize,
    transform_size: usize,

    window_kind: WindowKind,
    /// Length `transform_size`, non-zero only on the centred
    /// `impulse_len` region.
    window: Vec<f32>,

    /// Interpolated, mirrored magnitude. Length `transform_size`.
    magnitude: Vec<f32>,
    /// Windowed, truncated `h(n)`. Length `transform_size`.
    impulse: Vec<f32>,
    /// Final response, bins `0..=transform_size / 2`.
    response: Vec<Complex32>,

    /// Time-domain buffer the transforms are free to overwrite.
    work: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
}

impl SpectrumDesigner {
    /// Create a designer with every band at unity gain.
    ///
    /// # Arguments
    /// * `bands` - number of equalizer bands (at least one is used)
    /// * `impulse_len` - length of the truncated impulse response
    /// * `transform_size` - FFT size; must be even and ≥ `impulse_len`
    pub fn new(bands: usize, impulse_len: usize, transform_size: usize) -> Self {
        nih_debug_assert!(transform_size >= 2 && transform_size % 2 == 0);
        nih_debug_assert!(impulse_len <= transform_size);

        let bands = bands.max(1);
        let transform_size = transform_size.max(2);
        let impulse_len = impulse_len.min(transform_size);

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(transform_size);
        let inverse = planner.plan_fft_inverse(transform_size);

        let mut designer = Self {
            gains: vec![1.0; bands],
            center_freqs: vec![0.0; bands],
            positions: vec![0; bands],
            impulse_len,
            transform_size,
            window_kind: WindowKind::default(),
            window: vec![0.0; transform_size],
            magnitude: vec![0.0; transform_size],
            impulse: vec![0.0; transform_size],
            response: forward.make_output_vec(),
            work: forward.make_input_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            forward,
            inverse,
        };
        designer.compute_window();
        designer.compute_band_positions();
        designer
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        self.gains.len()
    }

    /// Set the gain of band `idx` (0 = lowest). Out-of-range indices are
    /// ignored. Gains are not clamped; 0.0 to 2.0 is the intended range.
    pub fn set_band(&mut self, idx: usize, gain: f32) {
        if let Some(band) = self.gains.get_mut(idx) {
            *band = gain;
        }
    }

    /// Gain of band `idx`, or `None` if there is no such band.
    pub fn band(&self, idx: usize) -> Option<f32> {
        self.gains.get(idx).copied()
    }

    pub fn gains(&self) -> &[f32] {
        &self.gains
    }

    /// Load a preset. Bands the preset does not cover are left alone.
    pub fn apply_preset(&mut self, preset: BandPreset) {
        for (idx, gain) in preset.gains().into_iter().enumerate() {
            self.set_band(idx, gain);
        }
    }

    /// Band centre frequencies in cycles per sample (multiply by the
    /// sample rate for Hz). The top band is `0.5 - 1/N`.
    pub fn center_frequencies(&self) -> &[f32] {
        &self.center_freqs
    }

    /// Band centre positions as FFT bin indices.
    pub fn band_positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn impulse_len(&self) -> usize {
        self.impulse_len
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Delay introduced by the linear-phase impulse response, in samples.
    pub fn group_delay(&self) -> usize {
        self.impulse_len / 2
    }

    pub fn window_kind(&self) -> WindowKind {
        self.window_kind
    }

    /// Switch the truncation window. Takes effect on the next
    /// [`create_filter()`](Self::create_filter).
    pub fn set_window(&mut self, kind: WindowKind) {
        if kind != self.window_kind {
            self.window_kind = kind;
            self.compute_window();
        }
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// The response from the last [`create_filter()`](Self::create_filter),
    /// bins `0..=N/2`, already divided by `N`.
    pub fn frequency_response(&self) -> &[Complex32] {
        &self.response
    }

    /// The interpolated magnitude from the last design, all `N` bins.
    pub fn magnitude(&self) -> &[f32] {
        &self.magnitude
    }

    /// The windowed impulse response from the last design. Non-zero only
    /// on `[0, impulse_len)`.
    pub fn impulse_response(&self) -> &[f32] {
        &self.impulse
    }

    /// Recompute the frequency response from the current band gains and
    /// return the impulse response length.
    ///
    /// Always a full redesign; calling it twice with the same gains gives
    /// the same response.
    pub fn create_filter(&mut self) -> usize {
        let n = self.transform_size;
        let len = self.impulse_len;
        let scale = 1.0 / n as f32;

        self.interpolate();

        // Linear phase: (-1)^k delays h(n) by N/2.
        for (k, bin) in self.response.iter_mut().enumerate() {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            *bin = Complex32::new(self.magnitude[k] * sign, 0.0);
        }

        if let Err(err) =
            self.inverse
                .process_with_scratch(&mut self.response, &mut self.work, &mut self.inverse_scratch)
        {
            nih_debug_assert_failure!("equalizer inverse FFT failed: {}", err);
        }

        // Keep the centred region, windowed, and shift it to the front.
        let offset = (n - len) / 2;
        for (i, h) in self.impulse[..len].iter_mut().enumerate() {
            *h = self.window[offset + i] * self.work[offset + i] * scale;
        }
        self.impulse[len..].fill(0.0);

        self.work.copy_from_slice(&self.impulse);
        if let Err(err) =
            self.forward
                .process_with_scratch(&mut self.work, &mut self.response, &mut self.forward_scratch)
        {
            nih_debug_assert_failure!("equalizer forward FFT failed: {}", err);
        }

        for bin in self.response.iter_mut() {
            *bin *= scale;
        }

        len
    }

    fn compute_window(&mut self) {
        let len = self.impulse_len;
        let offset = (self.transform_size - len) / 2;

        self.window.fill(0.0);
        let region = &mut self.window[offset..offset + len];
        match self.window_kind {
            WindowKind::Hann => {
                for (i, w) in region.iter_mut().enumerate() {
                    *w = 0.5 * (1.0 - (2.0 * PI * i as f32 / len as f32).cos());
                }
            }
            WindowKind::Rectangular => region.fill(1.0),
        }
    }

    fn compute_band_positions(&mut self) {
        let n = self.transform_size;
        let half = n / 2;
        let bands = self.gains.len();

        let ratio = if (n as f32) / 2.0_f32.powi(bands as i32) < 1.0 {
            (half as f32).powf(1.0 / bands as f32)
        } else {
            OCTAVE_RATIO
        };

        self.positions[bands - 1] = half - 1;
        let mut pf = half as f32;
        for i in 1..bands {
            pf /= ratio;
            let p = (pf + 0.5) as usize;
            self.positions[bands - 1 - i] = p.saturating_sub(1);
        }

        for (freq, &pos) in self.center_freqs.iter_mut().zip(&self.positions) {
            *freq = pos as f32 / n as f32;
        }
    }

    /// Piecewise-linear magnitude over `0..=N/2`, mirrored to `N - j`.
    fn interpolate(&mut self) {
        let n = self.transform_size;
        let half = n / 2;
        let gains = &self.gains;
        let pos = &self.positions;
        let magnitude = &mut self.magnitude;

        let mut paint = |j: usize, value: f32| {
            magnitude[j] = value;
            if j > 0 {
                magnitude[n - j] = value;
            }
        };

        let first = gains[0];
        for j in 0..=pos[0] {
            paint(j, first);
        }

        for i in 1..gains.len() {
            let (from, to) = (pos[i - 1], pos[i]);
            if to <= from {
                continue;
            }
            let slope = (gains[i] - gains[i - 1]) / (to - from) as f32;
            for j in from..to {
                paint(j, gains[i - 1] + slope * (j - from) as f32);
            }
        }

        let last = gains[gains.len() - 1];
        for j in pos[pos.len() - 1]..=half {
            paint(j, last);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
