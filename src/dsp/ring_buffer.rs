//! # Ring Delay Line (Power-of-Two Ring Buffer)
//!
//! Both recursive filters in the chain (the hum notch and the
//! reverberator) need to look `k` samples into the past, once per sample.
//! They share this ring buffer.
//!
//! ## The Bitmask Trick
//!
//! A ring buffer normally wraps its index with a modulo:
//!
//! ```text
//! read_index = (write_pos + len - k) % len
//! ```
//!
//! When `len` is a power of two, `x % len` is the same as `x & (len - 1)`,
//! and the AND is a single cheap instruction. It also works with wrapping
//! subtraction, so we never need the `+ len` guard:
//!
//! ```text
//! len  = 8           mask = 0b0111
//! pos  = 2, k = 5    (2 - 5) wraps to ...11111101
//!                    ...11111101 & 0b0111 = 0b0101 = 5
//! ```
//!
//! Position 5 is indeed 5 steps behind position 2 on a ring of 8.
//!
//! That is why the buffer is always sized to the next power of two that
//! can hold the largest delay plus the sample being written.

/// A ring buffer whose length is always a power of two.
///
/// Allocated once (at `init()` time of the owning filter); reading,
/// writing and advancing never allocate.
pub struct RingDelayLine {
    buffer: Vec<f32>,

    /// Where the next sample will be written.
    write_pos: usize,

    /// `buffer.len() - 1`. Valid as a modulo mask because the length is a
    /// power of two.
    mask: usize,
}

impl RingDelayLine {
    /// Create a ring that can delay by up to `max_delay` samples.
    ///
    /// The length is `(max_delay + 1).next_power_of_two()`: one extra slot
    /// for the sample currently being written, then rounded up so the
    /// bitmask works.
    ///
    /// Examples:
    /// - `max_delay = 800` (60 Hz at 48 kHz) → 1024 slots
    /// - `max_delay = 192000` (4 s at 48 kHz) → 262144 slots
    pub fn with_max_delay(max_delay: usize) -> Self {
        let len = (max_delay + 1).next_power_of_two();
        Self {
            buffer: vec![0.0; len],
            write_pos: 0,
            mask: len - 1,
        }
    }

    /// Number of slots in the ring (a power of two).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Largest delay that can be read back without aliasing onto the slot
    /// being written.
    pub fn max_delay(&self) -> usize {
        self.mask
    }

    /// Read the sample written `delay` steps ago.
    ///
    /// `read(0)` returns whatever currently sits at the write position,
    /// which is the sample written `len` steps ago.
    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        self.buffer[self.write_pos.wrapping_sub(delay) & self.mask]
    }

    /// Store a sample at the current write position.
    ///
    /// Does NOT advance; call [`advance()`](Self::advance) once the
    /// current sample is complete. Reading `k` back before writing is
    /// what the recursive filters rely on.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
    }

    /// Move the write position forward by one, wrapping with the mask.
    #[inline]
    pub fn advance(&mut self) {
        self.write_pos = (self.write_pos + 1) & self.mask;
    }

    /// Zero every slot. The write position is left alone, so the filter's
    /// coefficients and delay stay valid.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }

    /// Zero every slot and rewind the write position to the start.
    pub fn rewind(&mut self) {
        self.clear();
        self.write_pos = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// The ring length must always be a power of two ≥ max_delay + 1.
    #[test]
    fn test_length_is_next_power_of_two() {
        assert_eq!(RingDelayLine::with_max_delay(0).len(), 1);
        assert_eq!(RingDelayLine::with_max_delay(7).len(), 8);
        assert_eq!(RingDelayLine::with_max_delay(8).len(), 16);
        assert_eq!(RingDelayLine::with_max_delay(800).len(), 1024);
        assert_eq!(RingDelayLine::with_max_delay(192_000).len(), 262_144);

        for max_delay in [1, 3, 100, 1023, 1024, 44_100] {
            let ring = RingDelayLine::with_max_delay(max_delay);
            assert!(ring.len().is_power_of_two());
            assert!(ring.max_delay() >= max_delay);
        }
    }

    #[test]
    fn test_write_and_read_exact() {
        let mut ring = RingDelayLine::with_max_delay(100);

        ring.write(0.75);
        ring.advance();

        let result = ring.read(1);
        assert!((result - 0.75).abs() < 1e-6, "Expected 0.75, got {result}");
    }

    /// Reading behind position 0 must wrap to the end of the ring
    /// through the mask, not underflow.
    #[test]
    fn test_wrapping_read_behind_start() {
        let mut ring = RingDelayLine::with_max_delay(3); // 4 slots

        for i in 0..6 {
            ring.write(i as f32);
            ring.advance();
        }

        // write_pos = 6 & 3 = 2, buffer = [4, 5, 2, 3]
        assert!((ring.read(1) - 5.0).abs() < 1e-6);
        assert!((ring.read(2) - 4.0).abs() < 1e-6);
        assert!((ring.read(3) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_fifo_sequence() {
        let mut ring = RingDelayLine::with_max_delay(10);

        for i in 1..=5 {
            ring.write(i as f32);
            ring.advance();
        }

        for k in 1..=5 {
            let expected = (6 - k) as f32;
            let got = ring.read(k);
            assert!((got - expected).abs() < 1e-6, "k={k}: expected {expected}, got {got}");
        }
    }

    /// `clear()` silences the ring but keeps the write position, so the
    /// owning filter keeps streaming from the same cursor.
    #[test]
    fn test_clear_keeps_position() {
        let mut ring = RingDelayLine::with_max_delay(10);

        for _ in 0..3 {
            ring.write(0.5);
            ring.advance();
        }
        ring.clear();

        for k in 0..ring.len() {
            assert!(ring.read(k).abs() < 1e-6, "slot {k} not cleared");
        }

        ring.write(1.0);
        ring.advance();
        assert!((ring.read(1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_in_silence_out() {
        let ring = RingDelayLine::with_max_delay(100);

        for delay in [1, 10, 50, 99] {
            let result = ring.read(delay);
            assert!(
                result.abs() < 1e-6,
                "Expected silence at delay {delay}, got {result}"
            );
        }
    }
}
