//! # Processing Pipeline
//!
//! Owns one instance of every stage and runs the enabled ones over a
//! block, always in the same order:
//!
//! ```text
//! input → [Reverb] → [SampleTap] → [Equalizer] → [Notch] → output
//! ```
//!
//! ## Buffer Ping-Pong
//!
//! Each stage reads the previous stage's block and writes a new one. The
//! first stage reads the caller's input and writes the caller's output;
//! after that the stages alternate between the output and one scratch
//! block allocated at init. If the last stage wrote to scratch (or no
//! stage ran at all) one final copy lands the result in the output.
//!
//! ```text
//! stages run:   0        1         2          3
//! result in:  input   output   scratch    output
//! ```
//!
//! Nothing is allocated in [`process()`](BlockProcessor::process). Every
//! buffer, ring and FFT plan is created in
//! [`init()`](BlockProcessor::init), which the host calls off the audio
//! thread.

use nih_plug::{nih_log, nih_warn};
use rustfft::num_complex::Complex32;

use super::comb::CombNotchFilter;
use super::convolver::BlockConvolver;
use super::equalizer::{BandPreset, SpectrumDesigner, WindowKind};
use super::reverb::Reverberator;
use super::tap::{SampleTap, TapReader};
use super::Stage;

/// Number of graphic equalizer bands.
pub const EQ_BANDS: usize = 16;

/// Mains hum fundamental removed by the notch stage.
pub const NOTCH_FREQUENCY_HZ: f32 = 60.0;

/// Width of each notch.
pub const NOTCH_BANDWIDTH_HZ: f32 = 6.0;

pub const DEFAULT_REVERB_DELAY_MS: f32 = 1000.0;
pub const DEFAULT_REVERB_FEEDBACK: f32 = 0.5;

/// Seconds of audio the sample tap holds. The plugin drains it about
/// once a second, so the reader always has a full interval of slack.
pub const TAP_CAPACITY_SECONDS: usize = 2;

/// Equalizer `(impulse_len, transform_size)` for a block size.
///
/// A `2B` transform with a `3B/4` impulse satisfies the overlap-save
/// condition `N ≥ B + L - 1` with room to spare.
pub fn equalizer_geometry(block_size: usize) -> (usize, usize) {
    (3 * block_size / 4, 2 * block_size)
}

/// The lifecycle a host-side driver uses to run a block processor.
///
/// Methods report success with a `bool`; there is nothing a caller could
/// recover from mid-stream, so a `false` from `process()` means the
/// stream should be stopped or the processor re-initialized.
pub trait BlockProcessor {
    /// Allocate everything for `sample_rate` and `block_size`-sample
    /// blocks.
    fn init(&mut self, sample_rate: u32, block_size: usize) -> bool;

    /// Process one block. `input` and `output` must both be exactly the
    /// block size given to `init()`.
    fn process(&mut self, input: &[f32], output: &mut [f32]) -> bool;

    fn shutdown(&mut self) -> bool;

    /// The driver's block size changed.
    fn set_buffer_size(&mut self, block_size: usize) -> bool;

    /// The driver's sample rate changed.
    fn set_sample_rate(&mut self, sample_rate: u32) -> bool;
}

/// The stages of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Reverb,
    SampleTap,
    Equalizer,
    Notch,
}

impl StageKind {
    /// Order in which enabled stages run.
    pub const ORDER: [StageKind; 4] = [
        StageKind::Reverb,
        StageKind::SampleTap,
        StageKind::Equalizer,
        StageKind::Notch,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reverb => "reverb",
            Self::SampleTap => "sample tap",
            Self::Equalizer => "equalizer",
            Self::Notch => "notch",
        }
    }
}

/// Where the current block lives while folding over the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Input,
    Output,
    Scratch,
}

struct Stages {
    reverb: Reverberator,
    /// Created at init, together with its reader.
    tap: Option<SampleTap>,
    equalizer: BlockConvolver,
    notch: CombNotchFilter,
}

impl Stages {
    fn get_mut(&mut self, kind: StageKind) -> Option<&mut dyn Stage> {
        match kind {
            StageKind::Reverb => Some(&mut self.reverb),
            StageKind::SampleTap => self.tap.as_mut().map(|tap| tap as &mut dyn Stage),
            StageKind::Equalizer => Some(&mut self.equalizer),
            StageKind::Notch => Some(&mut self.notch),
        }
    }
}

/// Reverb, sample tap, graphic equalizer and hum notch, in that order.
pub struct Pipeline {
    sample_rate: u32,
    block_size: usize,
    initialized: bool,

    enabled: [bool; 4],
    stages: Stages,
    designer: SpectrumDesigner,

    /// Second block for the ping-pong, `block_size` long.
    scratch: Vec<f32>,
    tap_reader: Option<TapReader>,

    reverb_delay_ms: f32,
    notch_frequency: f32,
    notch_bandwidth: f32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// An uninitialized pipeline with every stage off. Call
    /// [`init()`](BlockProcessor::init) before processing.
    pub fn new() -> Self {
        let mut reverb = Reverberator::new();
        reverb.set_alpha(DEFAULT_REVERB_FEEDBACK);

        Self {
            sample_rate: 0,
            block_size: 0,
            initialized: false,
            enabled: [false; 4],
            stages: Stages {
                reverb,
                tap: None,
                equalizer: BlockConvolver::new(1),
                notch: CombNotchFilter::new(),
            },
            designer: SpectrumDesigner::new(EQ_BANDS, 0, 2),
            scratch: Vec::new(),
            tap_reader: None,
            reverb_delay_ms: DEFAULT_REVERB_DELAY_MS,
            notch_frequency: NOTCH_FREQUENCY_HZ,
            notch_bandwidth: NOTCH_BANDWIDTH_HZ,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    // ── Stage toggles ────────────────────────────────────────────────

    /// Turn a stage on or off. Turning the equalizer off clears its
    /// history so re-enabling it doesn't replay a stale tail.
    pub fn set_stage(&mut self, kind: StageKind, on: bool) {
        if kind == StageKind::Equalizer && !on {
            self.stages.equalizer.reset();
        }
        self.enabled[kind.index()] = on;
    }

    pub fn is_stage_enabled(&self, kind: StageKind) -> bool {
        self.enabled[kind.index()]
    }

    /// Samples of delay the chain currently adds: the equalizer's group
    /// delay while it runs, otherwise none.
    pub fn latency(&self) -> usize {
        if self.initialized && self.is_stage_enabled(StageKind::Equalizer) {
            self.designer.group_delay()
        } else {
            0
        }
    }

    // ── Equalizer ────────────────────────────────────────────────────

    /// Set band `idx` (0 = lowest). Takes effect on the next
    /// [`update_equalizer()`](Self::update_equalizer).
    pub fn set_band(&mut self, idx: usize, gain: f32) {
        self.designer.set_band(idx, gain);
    }

    pub fn band(&self, idx: usize) -> Option<f32> {
        self.designer.band(idx)
    }

    pub fn apply_preset(&mut self, preset: BandPreset) {
        self.designer.apply_preset(preset);
    }

    pub fn set_window(&mut self, kind: WindowKind) {
        self.designer.set_window(kind);
    }

    pub fn designer(&self) -> &SpectrumDesigner {
        &self.designer
    }

    /// Redesign the equalizer from the current bands and install it.
    ///
    /// Runs two FFTs and must not overlap with
    /// [`process()`](BlockProcessor::process); the plugin designs off
    /// the audio thread and uses
    /// [`set_equalizer_response()`](Self::set_equalizer_response)
    /// instead.
    pub fn update_equalizer(&mut self) {
        if !self.initialized {
            return;
        }
        let impulse_len = self.designer.create_filter();
        self.stages.equalizer.set_frequency_response(
            self.designer.frequency_response(),
            impulse_len,
            self.designer.transform_size(),
        );
    }

    /// Install a response designed elsewhere for this pipeline's geometry
    /// (`2 · block_size` transform, `3/4 · block_size` impulse). Returns
    /// `false` and keeps the old response if the length doesn't match.
    pub fn set_equalizer_response(&mut self, response: &[Complex32]) -> bool {
        let transform_size = self.designer.transform_size();
        if !self.initialized || response.len() != transform_size / 2 + 1 {
            return false;
        }
        self.stages.equalizer.set_frequency_response(
            response,
            self.designer.impulse_len(),
            transform_size,
        );
        true
    }

    // ── Reverb ───────────────────────────────────────────────────────

    pub fn set_reverb_delay(&mut self, delay_ms: f32) {
        self.reverb_delay_ms = delay_ms;
        self.stages.reverb.set_delay(delay_ms);
    }

    pub fn reverb_delay(&self) -> f32 {
        self.reverb_delay_ms
    }

    pub fn set_reverb_feedback(&mut self, alpha: f32) {
        self.stages.reverb.set_alpha(alpha);
    }

    pub fn reverb_feedback(&self) -> f32 {
        self.stages.reverb.alpha()
    }

    pub fn reverberator(&self) -> &Reverberator {
        &self.stages.reverb
    }

    // ── Notch ────────────────────────────────────────────────────────

    /// Retune the hum notch. Reallocates its ring; call off the audio
    /// thread.
    pub fn set_notch(&mut self, cut_frequency: f32, bandwidth_hz: f32) {
        self.notch_frequency = cut_frequency;
        self.notch_bandwidth = bandwidth_hz;
        if self.initialized {
            self.stages
                .notch
                .init(self.sample_rate, cut_frequency, bandwidth_hz);
        }
    }

    pub fn notch(&self) -> &CombNotchFilter {
        &self.stages.notch
    }

    // ── Sample tap ───────────────────────────────────────────────────

    /// Hand out the reader for the tap created by the last `init()`.
    /// Returns `None` if it was already taken.
    pub fn take_tap_reader(&mut self) -> Option<TapReader> {
        self.tap_reader.take()
    }

    /// Clear every stage's signal history.
    pub fn reset(&mut self) {
        for kind in StageKind::ORDER {
            if let Some(stage) = self.stages.get_mut(kind) {
                stage.reset();
            }
        }
    }
}

impl BlockProcessor for Pipeline {
    fn init(&mut self, sample_rate: u32, block_size: usize) -> bool {
        if sample_rate == 0 || block_size == 0 {
            nih_warn!("pipeline: cannot run at {sample_rate} Hz with {block_size}-sample blocks");
            return false;
        }

        self.sample_rate = sample_rate;
        self.block_size = block_size;

        let (impulse_len, transform_size) = equalizer_geometry(block_size);

        // Carry the band gains and window over to the new geometry.
        let mut designer = SpectrumDesigner::new(EQ_BANDS, impulse_len, transform_size);
        designer.set_window(self.designer.window_kind());
        for (idx, gain) in self.designer.gains().iter().enumerate() {
            designer.set_band(idx, *gain);
        }
        self.designer = designer;

        self.stages.equalizer = BlockConvolver::new(block_size);

        let feedback = self.stages.reverb.alpha();
        self.stages
            .reverb
            .init(sample_rate, self.reverb_delay_ms, feedback);

        self.stages
            .notch
            .init(sample_rate, self.notch_frequency, self.notch_bandwidth);

        let (tap, reader) = SampleTap::new(TAP_CAPACITY_SECONDS * sample_rate as usize);
        self.stages.tap = Some(tap);
        self.tap_reader = Some(reader);

        self.scratch = vec![0.0; block_size];
        self.initialized = true;

        self.update_equalizer();

        nih_log!(
            "pipeline: {sample_rate} Hz, {block_size}-sample blocks, {impulse_len}-tap equalizer on a {transform_size}-point transform"
        );
        true
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) -> bool {
        let len = input.len();
        if !self.initialized || len != self.block_size || output.len() != len {
            return false;
        }

        let enabled = self.enabled;
        let stages = &mut self.stages;
        let scratch = &mut self.scratch[..len];

        let last = StageKind::ORDER
            .into_iter()
            .filter(|kind| enabled[kind.index()])
            .fold(Slot::Input, |slot, kind| {
                let Some(stage) = stages.get_mut(kind) else {
                    return slot;
                };
                match slot {
                    Slot::Input => {
                        stage.apply(input, output);
                        Slot::Output
                    }
                    Slot::Output => {
                        stage.apply(output, scratch);
                        Slot::Scratch
                    }
                    Slot::Scratch => {
                        stage.apply(scratch, output);
                        Slot::Output
                    }
                }
            });

        match last {
            Slot::Input => output.copy_from_slice(input),
            Slot::Scratch => output.copy_from_slice(scratch),
            Slot::Output => {}
        }
        true
    }

    fn shutdown(&mut self) -> bool {
        if self.initialized {
            nih_log!("pipeline: shutting down");
        }
        self.initialized = false;
        self.stages.tap = None;
        self.tap_reader = None;
        self.reset();
        true
    }

    fn set_buffer_size(&mut self, block_size: usize) -> bool {
        if self.initialized && block_size == self.block_size {
            return true;
        }
        if self.sample_rate == 0 {
            self.block_size = block_size;
            return true;
        }
        self.init(self.sample_rate, block_size)
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> bool {
        if self.initialized && sample_rate == self.sample_rate {
            return true;
        }
        if self.block_size == 0 {
            self.sample_rate = sample_rate;
            return true;
        }
        self.init(sample_rate, self.block_size)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
