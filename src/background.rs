//! # Background Work
//!
//! Designing the equalizer takes two FFTs and a few passes over the
//! spectrum. That is cheap, but it only needs to happen when a band
//! moves, and it has no business on the audio thread. The plugin runs it
//! on nih-plug's background task executor and hands the result over
//! without locks:
//!
//! ```text
//!  background thread                          audio thread
//!  ─────────────────                          ────────────
//!  design ──► Box<[Complex32]> ──responses──► copy into each pipeline
//!     ▲                                               │
//!     └───────────────── recycled ◄───────────────────┘
//! ```
//!
//! Both queues are `rtrb` single-producer/single-consumer rings. The
//! audio thread only takes a response when it can return the box right
//! away, so it never frees memory; the background side reuses returned
//! boxes and only allocates when none are waiting.
//!
//! The same executor drains the sample taps and logs what they saw.

use nih_plug::{nih_debug_assert_failure, nih_log};
use rtrb::{Consumer, Producer, RingBuffer};
use rustfft::num_complex::Complex32;

use crate::dsp::equalizer::SpectrumDesigner;
use crate::dsp::pipeline::{equalizer_geometry, EQ_BANDS};
use crate::dsp::tap::TapReader;
use crate::params::PluginParams;
use crate::strip::ENGINE_BLOCK_SIZE;

/// Responses that can be in flight at once.
const HANDOFF_DEPTH: usize = 4;

/// Work the audio thread can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Band gains changed; design and send a new response.
    RedesignEqualizer,
    /// Drain the sample taps and log their statistics.
    ReportTaps,
}

/// Background half of the equalizer handoff.
pub struct ResponseSender {
    responses: Producer<Box<[Complex32]>>,
    recycled: Consumer<Box<[Complex32]>>,
}

/// Audio-thread half of the equalizer handoff.
pub struct ResponseReceiver {
    responses: Consumer<Box<[Complex32]>>,
    recycle: Producer<Box<[Complex32]>>,
}

/// Create a connected sender/receiver pair.
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    let (responses_tx, responses_rx) = RingBuffer::new(HANDOFF_DEPTH);
    let (recycle_tx, recycle_rx) = RingBuffer::new(HANDOFF_DEPTH);
    (
        ResponseSender {
            responses: responses_tx,
            recycled: recycle_rx,
        },
        ResponseReceiver {
            responses: responses_rx,
            recycle: recycle_tx,
        },
    )
}

impl ResponseSender {
    /// Queue a copy of `response`. Returns `false` if the audio thread
    /// has fallen behind and the queue is full.
    pub fn send(&mut self, response: &[Complex32]) -> bool {
        let buffer = match self.recycled.pop() {
            Ok(mut buffer) if buffer.len() == response.len() => {
                buffer.copy_from_slice(response);
                buffer
            }
            _ => response.to_vec().into_boxed_slice(),
        };
        self.responses.push(buffer).is_ok()
    }
}

impl ResponseReceiver {
    /// Call `apply` with every queued response, oldest first, and send
    /// the buffers back. Never allocates or frees.
    pub fn receive(&mut self, mut apply: impl FnMut(&[Complex32])) -> usize {
        let mut received = 0;
        while self.recycle.slots() > 0 {
            let Ok(response) = self.responses.pop() else {
                break;
            };
            apply(&response);
            if self.recycle.push(response).is_err() {
                nih_debug_assert_failure!("recycle queue full after a slot check");
            }
            received += 1;
        }
        received
    }
}

/// State owned by the background task executor.
pub struct Background {
    designer: SpectrumDesigner,
    sender: ResponseSender,
    tap_readers: Vec<TapReader>,
}

impl Background {
    pub fn new(sender: ResponseSender) -> Self {
        let (impulse_len, transform_size) = equalizer_geometry(ENGINE_BLOCK_SIZE);
        Self {
            designer: SpectrumDesigner::new(EQ_BANDS, impulse_len, transform_size),
            sender,
            tap_readers: Vec::new(),
        }
    }

    /// Replace the tap readers after the pipelines were re-initialized,
    /// one per channel.
    pub fn set_tap_readers(&mut self, readers: Vec<TapReader>) {
        self.tap_readers = readers;
    }

    pub fn run(&mut self, task: Task, params: &PluginParams) {
        match task {
            Task::RedesignEqualizer => {
                self.redesign(&params.band_gains());
            }
            Task::ReportTaps => self.report_taps(),
        }
    }

    /// Design a response for `gains` and queue it for the audio thread.
    pub fn redesign(&mut self, gains: &[f32]) -> bool {
        for (idx, gain) in gains.iter().enumerate() {
            self.designer.set_band(idx, *gain);
        }
        self.designer.create_filter();

        let sent = self.sender.send(self.designer.frequency_response());
        if !sent {
            nih_log!("equalizer: audio thread busy, dropping a redesign");
        }
        sent
    }

    pub fn report_taps(&mut self) {
        for (channel, reader) in self.tap_readers.iter_mut().enumerate() {
            let stats = reader.drain();
            if stats.samples > 0 || stats.dropped > 0 {
                nih_log!("tap ch{channel}: {stats}");
            }
        }
    }
}
