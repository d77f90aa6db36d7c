//! # Channel Strip
//!
//! Hosts hand `process()` buffers of whatever size they like, and the
//! size can change from one call to the next. The pipeline wants fixed
//! blocks: the equalizer's overlap-save geometry is derived from the
//! block size.
//!
//! Each channel therefore gets a strip that collects incoming samples
//! into a fixed block, runs the pipeline once the block is full, and
//! plays the processed block back while the next one fills:
//!
//! ```text
//! host samples ──► [input block  ] ──(full)──► pipeline ──► [output block] ──► host
//!                   pos advances                             read at pos
//! ```
//!
//! A sample written at `pos` comes back out at `pos` one block later, so
//! the strip adds exactly one block of latency on top of the pipeline's
//! own.

use nih_plug::nih_debug_assert;

use crate::dsp::pipeline::{BlockProcessor, Pipeline, StageKind};

/// Block size the pipeline runs at, independent of the host's buffer
/// size.
pub const ENGINE_BLOCK_SIZE: usize = 256;

/// Per-buffer control values, read from the host parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    pub reverb: bool,
    pub reverb_delay_ms: f32,
    pub reverb_feedback: f32,
    pub sample_tap: bool,
    pub equalizer: bool,
    pub notch: bool,
}

impl ChainSettings {
    fn stage_flags(&self) -> [(StageKind, bool); 4] {
        [
            (StageKind::Reverb, self.reverb),
            (StageKind::SampleTap, self.sample_tap),
            (StageKind::Equalizer, self.equalizer),
            (StageKind::Notch, self.notch),
        ]
    }
}

/// One channel's pipeline plus its fixed-block adapter.
pub struct ChannelStrip {
    pipeline: Pipeline,
    input: Vec<f32>,
    output: Vec<f32>,
    pos: usize,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStrip {
    pub fn new() -> Self {
        Self {
            pipeline: Pipeline::new(),
            input: Vec::new(),
            output: Vec::new(),
            pos: 0,
        }
    }

    /// Allocate the block buffers and initialize the pipeline.
    pub fn init(&mut self, sample_rate: u32, block_size: usize) -> bool {
        self.input = vec![0.0; block_size];
        self.output = vec![0.0; block_size];
        self.pos = 0;
        self.pipeline.init(sample_rate, block_size)
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Push the control values into the pipeline. Only stages whose state
    /// actually changes are touched, so calling this every buffer is
    /// cheap.
    pub fn apply_settings(&mut self, settings: &ChainSettings) {
        let pipeline = &mut self.pipeline;
        for (kind, on) in settings.stage_flags() {
            if pipeline.is_stage_enabled(kind) != on {
                pipeline.set_stage(kind, on);
            }
        }
        if pipeline.reverb_delay() != settings.reverb_delay_ms {
            pipeline.set_reverb_delay(settings.reverb_delay_ms);
        }
        if pipeline.reverb_feedback() != settings.reverb_feedback {
            pipeline.set_reverb_feedback(settings.reverb_feedback);
        }
    }

    /// Feed one sample in and get the sample from one block ago out.
    #[inline]
    pub fn process_sample(&mut self, sample: f32) -> f32 {
        if self.input.is_empty() {
            return sample;
        }

        let out = self.output[self.pos];
        self.input[self.pos] = sample;
        self.pos += 1;

        if self.pos == self.input.len() {
            let ok = self.pipeline.process(&self.input, &mut self.output);
            nih_debug_assert!(ok, "pipeline rejected a full block");
            self.pos = 0;
        }
        out
    }

    /// Total latency in samples: one block for the adapter plus the
    /// pipeline's.
    pub fn latency(&self) -> usize {
        self.input.len() + self.pipeline.latency()
    }

    /// Silence the block buffers and every stage.
    pub fn reset(&mut self) {
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.pos = 0;
        self.pipeline.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChainSettings {
        ChainSettings {
            reverb: false,
            reverb_delay_ms: 1000.0,
            reverb_feedback: 0.5,
            sample_tap: false,
            equalizer: false,
            notch: false,
        }
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|n| n as f32 / len as f32).collect()
    }

    /// With every stage off, the strip is a pure one-block delay.
    #[test]
    fn test_bypass_delays_by_one_block() {
        let mut strip = ChannelStrip::new();
        assert!(strip.init(48_000, ENGINE_BLOCK_SIZE));
        strip.apply_settings(&settings());
        assert_eq!(strip.latency(), ENGINE_BLOCK_SIZE);

        let input = ramp(ENGINE_BLOCK_SIZE * 3);
        let output: Vec<f32> = input.iter().map(|x| strip.process_sample(*x)).collect();

        assert!(output[..ENGINE_BLOCK_SIZE].iter().all(|s| *s == 0.0));
        for n in ENGINE_BLOCK_SIZE..input.len() {
            assert_eq!(output[n], input[n - ENGINE_BLOCK_SIZE], "sample {n}");
        }
    }

    /// The flat equalizer adds its group delay on top of the block.
    #[test]
    fn test_equalizer_latency_is_reported() {
        let mut strip = ChannelStrip::new();
        assert!(strip.init(48_000, ENGINE_BLOCK_SIZE));
        strip.apply_settings(&ChainSettings {
            equalizer: true,
            ..settings()
        });

        let delay = strip.latency();
        assert_eq!(delay, ENGINE_BLOCK_SIZE + 3 * ENGINE_BLOCK_SIZE / 8);

        let input = ramp(ENGINE_BLOCK_SIZE * 4);
        let output: Vec<f32> = input.iter().map(|x| strip.process_sample(*x)).collect();
        for n in delay..input.len() {
            assert!((output[n] - input[n - delay]).abs() < 1e-3, "sample {n}");
        }
    }

    #[test]
    fn test_apply_settings() {
        let mut strip = ChannelStrip::new();
        assert!(strip.init(48_000, ENGINE_BLOCK_SIZE));
        strip.apply_settings(&ChainSettings {
            reverb: true,
            reverb_delay_ms: 20.0,
            reverb_feedback: -0.25,
            notch: true,
            ..settings()
        });

        let pipeline = strip.pipeline_mut();
        assert!(pipeline.is_stage_enabled(StageKind::Reverb));
        assert!(pipeline.is_stage_enabled(StageKind::Notch));
        assert!(!pipeline.is_stage_enabled(StageKind::Equalizer));
        assert_eq!(pipeline.reverberator().delay_samples(), 960);
        assert!((pipeline.reverb_feedback() + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_uninitialized_strip_passes_through() {
        let mut strip = ChannelStrip::new();
        assert_eq!(strip.process_sample(0.3), 0.3);
        assert_eq!(strip.latency(), 0);
    }

    #[test]
    fn test_reset_silences_pending_block() {
        let mut strip = ChannelStrip::new();
        assert!(strip.init(48_000, ENGINE_BLOCK_SIZE));
        for _ in 0..ENGINE_BLOCK_SIZE + 10 {
            strip.process_sample(1.0);
        }
        strip.reset();

        let out: Vec<f32> = (0..ENGINE_BLOCK_SIZE).map(|_| strip.process_sample(0.0)).collect();
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
