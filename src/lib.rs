//! # Loveless FX Chain — An AU/VST3/CLAP Effects Chain Plugin
//!
//! A reverb, graphic equalizer and hum-notch chain built with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug) for learning DSP.
//! Outputs Audio Unit (AUv2), VST3, and CLAP formats from a single
//! codebase. The processing engine lives in [`dsp`] and can be driven
//! without a host.
//!
//! ## Signal Flow
//!
//! ```text
//!                 ┌──────────────── one pipeline per channel ────────────────┐
//!                 │                                                          │
//! Input ──► [256-sample block] ──► Reverb ──► Tap ──► Equalizer ──► Notch ──► [block out] ──► Output
//!                 │                 (echo)    (log)   (16-band FIR)  (60 Hz)  │
//!                 └──────────────────────────────────────────────────────────┘
//!                                                 ▲
//!                          band change ──► background redesign ──► rtrb handoff
//! ```
//!
//! Every stage can be switched off; a switched-off stage costs nothing.

pub mod dsp;

mod background;
mod params;
mod strip;

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use background::{response_channel, Background, ResponseReceiver, Task};
use nih_plug::prelude::*;
use parking_lot::Mutex;
use params::PluginParams;
use strip::{ChannelStrip, ENGINE_BLOCK_SIZE};

/// The main plugin struct.
///
/// Parameters are shared with the host via `Arc` and may be read from
/// any thread. The channel strips are owned by the audio thread. The
/// only state shared with the background executor sits behind a mutex
/// the audio thread never takes.
struct LovelessFxChain {
    params: Arc<PluginParams>,

    /// Set by the band parameters' callbacks, cleared by `process()` when
    /// it schedules a redesign.
    equalizer_dirty: Arc<AtomicBool>,

    /// Designer, response sender and tap readers, used by the background
    /// task executor.
    background: Arc<Mutex<Background>>,

    /// Audio-thread end of the equalizer handoff.
    responses: ResponseReceiver,

    /// One pipeline per audio channel.
    strips: Vec<ChannelStrip>,

    sample_rate: f32,

    /// Latency last reported to the host, in samples.
    latency: u32,

    /// Samples processed since the taps were last reported.
    since_tap_report: usize,
}

impl Default for LovelessFxChain {
    fn default() -> Self {
        let equalizer_dirty = Arc::new(AtomicBool::new(false));
        let (sender, responses) = response_channel();

        Self {
            params: Arc::new(PluginParams::new(equalizer_dirty.clone())),
            equalizer_dirty,
            background: Arc::new(Mutex::new(Background::new(sender))),
            responses,
            // Empty until initialize() knows the channel count.
            strips: Vec::new(),
            sample_rate: 44100.0,
            latency: 0,
            since_tap_report: 0,
        }
    }
}

impl Plugin for LovelessFxChain {
    const NAME: &'static str = "Loveless FX Chain";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first: most DAW tracks are stereo. Each channel runs through
    // its own pipeline.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Parameters are applied once per buffer, so there is nothing to gain
    // from splitting buffers at automation points.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = Task;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        let background = self.background.clone();
        let params = self.params.clone();
        Box::new(move |task| background.lock().run(task, &params))
    }

    /// Build one pipeline per channel for the host's sample rate.
    ///
    /// The pipelines always run 256-sample blocks, whatever the host's
    /// buffer size, so only the sample rate and channel count matter
    /// here.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;
        let sample_rate = buffer_config.sample_rate.round() as u32;

        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        let gains = self.params.band_gains();
        let settings = self.params.chain_settings();

        let mut strips = Vec::with_capacity(num_channels);
        let mut readers = Vec::with_capacity(num_channels);
        for _ in 0..num_channels {
            let mut strip = ChannelStrip::new();
            for (idx, gain) in gains.iter().enumerate() {
                strip.pipeline_mut().set_band(idx, *gain);
            }
            if !strip.init(sample_rate, ENGINE_BLOCK_SIZE) {
                nih_warn!("cannot initialize the chain at {sample_rate} Hz");
                return false;
            }
            strip.apply_settings(&settings);
            readers.extend(strip.pipeline_mut().take_tap_reader());
            strips.push(strip);
        }
        self.strips = strips;
        self.background.lock().set_tap_readers(readers);

        // The pipelines were just designed from the current gains.
        self.equalizer_dirty.store(false, Ordering::Release);
        self.since_tap_report = 0;

        self.latency = self.current_latency();
        context.set_latency_samples(self.latency);

        nih_log!(
            "initialized {num_channels} channel(s) at {sample_rate} Hz, latency {} samples",
            self.latency
        );
        true
    }

    /// Called when playback stops or the plugin is bypassed. Clears every
    /// echo, filter history and half-filled block.
    fn reset(&mut self) {
        for strip in &mut self.strips {
            strip.reset();
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // ─── Equalizer: schedule a redesign, install finished ones ───
        if self.equalizer_dirty.swap(false, Ordering::AcqRel) {
            context.execute_background(Task::RedesignEqualizer);
        }
        let strips = &mut self.strips;
        self.responses.receive(|response| {
            for strip in strips.iter_mut() {
                strip.pipeline_mut().set_equalizer_response(response);
            }
        });

        // ─── Per-buffer settings ───
        let settings = self.params.chain_settings();
        for strip in &mut self.strips {
            strip.apply_settings(&settings);
        }

        let latency = self.current_latency();
        if latency != self.latency {
            self.latency = latency;
            context.set_latency_samples(latency);
        }

        // ─── Audio ───
        for mut channel_samples in buffer.iter_samples() {
            for (channel_idx, sample) in channel_samples.iter_mut().enumerate() {
                let Some(strip) = self.strips.get_mut(channel_idx) else {
                    continue;
                };
                *sample = strip.process_sample(*sample);
            }
        }

        // ─── Tap report, about once a second ───
        if settings.sample_tap {
            self.since_tap_report += buffer.samples();
            if self.since_tap_report as f32 >= self.sample_rate {
                self.since_tap_report = 0;
                context.execute_background(Task::ReportTaps);
            }
        }

        // Keep the host calling process() after the input goes silent:
        // the block adapter and equalizer still hold audio, and the
        // reverb rings on. Each echo is attenuated by |feedback|, so
        // after N echoes the level is |feedback|^N. Solving for -60 dB:
        //
        //   N = log10(0.001) / log10(|feedback|) = -3 / log10(|feedback|)
        let feedback = settings.reverb_feedback.abs();
        if settings.reverb && feedback >= 0.999 {
            return ProcessStatus::KeepAlive;
        }
        let echo_tail = if settings.reverb && feedback > 0.001 {
            let delay_samples = settings.reverb_delay_ms * self.sample_rate / 1000.0;
            let repeats = -3.0 / feedback.log10();
            (repeats * delay_samples) as u32
        } else {
            0
        };

        ProcessStatus::Tail(self.latency + echo_tail)
    }
}

impl LovelessFxChain {
    fn current_latency(&self) -> u32 {
        self.strips
            .first()
            .map(|strip| strip.latency() as u32)
            .unwrap_or(0)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for LovelessFxChain {
    const CLAP_ID: &'static str = "com.loveless-audio.loveless-fx-chain-v1";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Reverb, 16-band graphic EQ and hum notch, built for learning DSP");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Equalizer,
        ClapFeature::Reverb,
    ];
}

impl Vst3Plugin for LovelessFxChain {
    // 16 ASCII bytes; see the VST3 docs for why this must be unique.
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssFxChain_v01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Eq,
        Vst3SubCategory::Reverb,
    ];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// nih_export_clap! exports the `clap_entry` symbol for CLAP hosts.
// nih_export_vst3! exports `GetPluginFactory` for VST3 hosts.
// clap_wrapper re-exports the CLAP entry point as AUv2 so Logic Pro
// (Audio Units only) can load it.

nih_export_clap!(LovelessFxChain);
nih_export_vst3!(LovelessFxChain);

clap_wrapper::export_auv2!();
