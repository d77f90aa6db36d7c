//! # Sample Tap
//!
//! A pass-through stage that copies every block it sees into a lock-free
//! single-producer/single-consumer ring, so the signal at that point of
//! the chain can be inspected off the audio thread.
//!
//! The audio side never blocks: when the ring is full the remaining
//! samples of the block are counted as dropped and skipped. The reader
//! side drains whatever has arrived and reduces it to a few numbers that
//! are cheap to log.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nih_plug::nih_debug_assert_eq;
use rtrb::{Consumer, Producer, RingBuffer};

use super::Stage;

/// Audio-thread half. Owned by the pipeline.
pub struct SampleTap {
    producer: Producer<f32>,
    dropped: Arc<AtomicU64>,
}

/// Background half, returned by [`SampleTap::new()`].
pub struct TapReader {
    consumer: Consumer<f32>,
    dropped: Arc<AtomicU64>,
}

/// Summary of the samples drained in one [`TapReader::drain()`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TapStats {
    pub samples: usize,
    pub peak: f32,
    pub rms: f32,
    /// Samples the audio thread could not enqueue since the last drain.
    pub dropped: u64,
}

impl SampleTap {
    /// Create a tap holding up to `capacity` samples between drains.
    pub fn new(capacity: usize) -> (Self, TapReader) {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        (
            Self {
                producer,
                dropped: dropped.clone(),
            },
            TapReader { consumer, dropped },
        )
    }

    /// Copy `input` to `output` and enqueue it for the reader.
    pub fn filter(&mut self, input: &[f32], output: &mut [f32]) {
        nih_debug_assert_eq!(input.len(), output.len());
        output.copy_from_slice(input);

        for (i, sample) in input.iter().enumerate() {
            if self.producer.push(*sample).is_err() {
                let lost = (input.len() - i) as u64;
                self.dropped.fetch_add(lost, Ordering::Relaxed);
                break;
            }
        }
    }

    /// Whether the reader half still exists.
    pub fn is_connected(&self) -> bool {
        !self.producer.is_abandoned()
    }
}

impl Stage for SampleTap {
    fn apply(&mut self, input: &[f32], output: &mut [f32]) {
        self.filter(input, output);
    }
}

impl TapReader {
    /// Samples waiting to be drained.
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }

    /// Pull everything currently queued and summarize it.
    pub fn drain(&mut self) -> TapStats {
        let mut samples = 0;
        let mut peak = 0.0_f32;
        let mut sum_sq = 0.0_f64;

        while let Ok(sample) = self.consumer.pop() {
            samples += 1;
            peak = peak.max(sample.abs());
            sum_sq += f64::from(sample) * f64::from(sample);
        }

        let rms = if samples > 0 {
            (sum_sq / samples as f64).sqrt() as f32
        } else {
            0.0
        };

        TapStats {
            samples,
            peak,
            rms,
            dropped: self.dropped.swap(0, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for TapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples, peak {:.4}, rms {:.4}, {} dropped",
            self.samples, self.peak, self.rms, self.dropped
        )
    }
}
