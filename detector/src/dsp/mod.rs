//! Signal conditioning — mains notch, baseline high-pass, and the
//! rectified moving-average envelope used as the blink statistic.

pub mod biquad;
pub mod envelope;
pub mod filter_stage;

pub use biquad::{coefficients_for, BiquadCoefficients, BiquadSection, MainsFrequency};
pub use envelope::EnvelopeTracker;
pub use filter_stage::FilterStage;
