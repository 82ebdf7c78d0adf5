//! Moving-average envelope of the rectified, filtered signal.
//!
//! Magnitudes are stored as unsigned fixed-point counts so the running sum
//! can be maintained incrementally without drift: after every update it is
//! exactly the sum of the window slots.  Magnitudes above
//! `MAX_ENVELOPE_MAGNITUDE` are clamped to it.

/// Fractional bits of the fixed-point magnitude representation.
pub const ENVELOPE_FRACTION_BITS: u32 = 8;

const ENVELOPE_SCALE: f32 = (1u32 << ENVELOPE_FRACTION_BITS) as f32;

/// Largest magnitude a window slot can hold (2^40).  Filtered full-scale
/// i32 input stays several orders of magnitude below it.
pub const MAX_ENVELOPE_MAGNITUDE: f32 = 1_099_511_627_776.0;

/// Number of window slots for a smoothing duration at a sample rate.
/// Integer arithmetic, truncating: 100 ms at 512 Hz is 51 slots.
pub fn window_len_for(duration_ms: u32, sample_rate_hz: u32) -> usize {
    (duration_ms as u64 * sample_rate_hz as u64 / 1000) as usize
}

/// Fixed-length moving average of |sample|.
#[derive(Debug, Clone)]
pub struct EnvelopeTracker {
    window: Box<[u64]>,
    index: usize,
    running_sum: u128,
}

impl EnvelopeTracker {
    /// Create a tracker with `window_len` slots (at least one).
    pub fn new(window_len: usize) -> Self {
        Self {
            window: vec![0; window_len.max(1)].into_boxed_slice(),
            index: 0,
            running_sum: 0,
        }
    }

    /// Push one filtered sample and return the current envelope value.
    #[inline]
    pub fn update(&mut self, sample: f32) -> f32 {
        let magnitude = to_fixed(sample.abs());
        let leaving = self.window[self.index];
        self.running_sum = self.running_sum - leaving as u128 + magnitude as u128;
        self.window[self.index] = magnitude;
        self.index = (self.index + 1) % self.window.len();
        self.value()
    }

    /// Current envelope value (mean magnitude over the window).
    pub fn value(&self) -> f32 {
        self.running_sum as f32 / ENVELOPE_SCALE / self.window.len() as f32
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Incrementally maintained sum of the window, in fixed-point counts.
    pub fn running_sum(&self) -> u128 {
        self.running_sum
    }

    /// Sum of the window slots recomputed from scratch.
    pub fn recomputed_sum(&self) -> u128 {
        self.window.iter().map(|&m| m as u128).sum()
    }
}

/// Clamped conversion of a non-negative magnitude to fixed point.
/// NaN maps to zero.
fn to_fixed(magnitude: f32) -> u64 {
    (magnitude.clamp(0.0, MAX_ENVELOPE_MAGNITUDE) * ENVELOPE_SCALE).round() as u64
}
