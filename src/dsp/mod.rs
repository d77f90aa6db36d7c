//! # DSP (Digital Signal Processing) Engine
//!
//! This module contains the whole effects chain. Nothing in here knows
//! about the plugin host; every type can be created and driven directly,
//! which is how the tests use them.
//!
//! - **`ring_buffer`**: A power-of-two ring buffer with bitmask indexing,
//!   shared by both recursive filters.
//!
//! - **`comb`**: A comb notch filter that removes a fundamental (mains hum)
//!   together with all of its harmonics.
//!
//! - **`reverb`**: A single feedback tap that turns each sample into a
//!   decaying train of echoes.
//!
//! - **`equalizer`**: Designs a linear-phase FIR from graphic-EQ band
//!   gains and hands back its frequency response.
//!
//! - **`convolver`**: Applies that frequency response to the stream with
//!   overlap-save FFT convolution.
//!
//! - **`tap`**: A pass-through stage that copies audio to a lock-free
//!   queue for off-thread inspection.
//!
//! - **`pipeline`**: Owns one of each stage and runs the enabled ones, in
//!   a fixed order, over fixed-size blocks.

pub mod comb;
pub mod convolver;
pub mod equalizer;
pub mod pipeline;
pub mod reverb;
pub mod ring_buffer;
pub mod tap;

/// One step of the chain: reads a block, writes a block of the same
/// length.
///
/// Implementations must not allocate, lock or block in
/// [`apply()`](Stage::apply); it runs on the audio thread.
pub trait Stage: Send {
    fn apply(&mut self, input: &[f32], output: &mut [f32]);

    /// Forget any signal history. Parameters are kept.
    fn reset(&mut self) {}
}
