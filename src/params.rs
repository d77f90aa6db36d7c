//! # Plugin Parameters
//!
//! Parameters are the knobs and sliders the user sees in the DAW. Each
//! parameter has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to
//!   save and recall presets. Once published, never change these IDs
//!   or existing presets will break.
//! - A **human-readable name** shown in the DAW's UI.
//! - A **range** and a **default value**.
//!
//! ## No Smoothing
//!
//! None of the chain's controls ramp. The equalizer bands trigger a full
//! redesign on a background thread, and the reverb applies delay and
//! feedback changes at the next block, which can be heard as a jump.
//! Values are therefore read once per buffer with `.value()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nih_plug::prelude::*;

use crate::dsp::pipeline::{DEFAULT_REVERB_DELAY_MS, DEFAULT_REVERB_FEEDBACK, EQ_BANDS};
use crate::dsp::reverb::MAX_DELAY_MS;
use crate::strip::ChainSettings;

/// All user-facing parameters for the Loveless FX Chain plugin.
#[derive(Params)]
pub struct PluginParams {
    /// **Equalizer** on/off. Adds the equalizer's group delay to the
    /// reported latency while on.
    #[id = "eq_on"]
    pub equalizer_on: BoolParam,

    /// One linear gain per graphic equalizer band, lowest band first.
    ///
    /// The band IDs are generated from the array index (`gain_1` ...
    /// `gain_16`).
    #[nested(array, group = "Band")]
    pub bands: [BandParams; EQ_BANDS],

    /// **Reverb** on/off.
    #[id = "rev_on"]
    pub reverb_on: BoolParam,

    /// **Reverb Delay**: time between echoes.
    ///
    /// Range: 1 ms to 4000 ms, skewed so the short delays get most of the
    /// travel.
    #[id = "rev_dly"]
    pub reverb_delay: FloatParam,

    /// **Reverb Feedback**: level of each echo relative to the last.
    ///
    /// - 0% = no echoes, the reverb is transparent
    /// - 50% = each echo at half the level of the one before
    /// - 100% = the loop holds its content forever and ignores new input
    ///
    /// Negative values flip the polarity of every other echo.
    #[id = "rev_fb"]
    pub reverb_feedback: FloatParam,

    /// **Hum Notch** on/off. Removes 60 Hz and its harmonics.
    #[id = "notch_on"]
    pub notch_on: BoolParam,

    /// **Sample Tap** on/off. Logs peak/RMS of the signal after the
    /// reverb about once a second.
    #[id = "tap_on"]
    pub tap_on: BoolParam,
}

#[derive(Params)]
pub struct BandParams {
    /// Linear gain, 0.0 (silence) to 2.0 (+6 dB).
    #[id = "gain"]
    pub gain: FloatParam,
}

impl PluginParams {
    /// Build the parameters. Every band change sets `equalizer_dirty`,
    /// which the audio thread polls to schedule a redesign.
    pub fn new(equalizer_dirty: Arc<AtomicBool>) -> Self {
        Self {
            equalizer_on: BoolParam::new("Equalizer", true),

            bands: std::array::from_fn(|_| {
                let dirty = equalizer_dirty.clone();
                BandParams {
                    gain: FloatParam::new("Gain", 1.0, FloatRange::Linear { min: 0.0, max: 2.0 })
                        .with_step_size(0.02)
                        .with_value_to_string(formatters::v2s_f32_rounded(2))
                        .with_callback(Arc::new(move |_| dirty.store(true, Ordering::Release))),
                }
            }),

            reverb_on: BoolParam::new("Reverb", false),

            reverb_delay: FloatParam::new(
                "Reverb Delay",
                DEFAULT_REVERB_DELAY_MS,
                FloatRange::Skewed {
                    min: 1.0,
                    max: MAX_DELAY_MS,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            .with_step_size(1.0),

            reverb_feedback: FloatParam::new(
                "Reverb Feedback",
                DEFAULT_REVERB_FEEDBACK,
                FloatRange::Linear { min: -1.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            notch_on: BoolParam::new("Hum Notch", false),

            tap_on: BoolParam::new("Sample Tap", false),
        }
    }

    /// Current band gains, lowest band first.
    pub fn band_gains(&self) -> [f32; EQ_BANDS] {
        std::array::from_fn(|i| self.bands[i].gain.value())
    }

    /// Snapshot of everything the audio thread applies per buffer.
    pub fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            reverb: self.reverb_on.value(),
            reverb_delay_ms: self.reverb_delay.value(),
            reverb_feedback: self.reverb_feedback.value(),
            sample_tap: self.tap_on.value(),
            equalizer: self.equalizer_on.value(),
            notch: self.notch_on.value(),
        }
    }
}

impl Default for PluginParams {
    fn default() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = PluginParams::default();
        assert_eq!(params.band_gains(), [1.0; EQ_BANDS]);

        let settings = params.chain_settings();
        assert!(settings.equalizer);
        assert!(!settings.reverb && !settings.notch && !settings.sample_tap);
        assert!((settings.reverb_delay_ms - 1000.0).abs() < 1e-3);
        assert!((settings.reverb_feedback - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_band_ranges() {
        let params = PluginParams::default();
        for band in &params.bands {
            assert!(band.gain.preview_plain(0.0).abs() < 1e-6);
            assert!((band.gain.preview_plain(1.0) - 2.0).abs() < 1e-4);
        }
        assert!((params.reverb_delay.preview_plain(1.0) - MAX_DELAY_MS).abs() < 1e-2);
        assert!((params.reverb_feedback.preview_plain(0.0) + 1.0).abs() < 1e-6);
    }
}
