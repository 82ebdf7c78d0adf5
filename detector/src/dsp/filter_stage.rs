//! Two cascaded biquad sections: mains notch, then 5 Hz high-pass.

use super::biquad::{BiquadCoefficients, BiquadSection};

/// Notch followed by high-pass, each section owning its own delay state.
#[derive(Debug, Clone)]
pub struct FilterStage {
    notch: BiquadSection,
    highpass: BiquadSection,
}

impl FilterStage {
    pub fn new(notch: BiquadCoefficients, highpass: BiquadCoefficients) -> Self {
        Self {
            notch: BiquadSection::new(notch),
            highpass: BiquadSection::new(highpass),
        }
    }

    /// Condition one raw ADC sample.
    #[inline]
    pub fn process(&mut self, raw: i32) -> f32 {
        self.highpass.process(self.notch.process(raw as f32))
    }

    pub fn notch(&self) -> &BiquadSection {
        &self.notch
    }

    pub fn highpass(&self) -> &BiquadSection {
        &self.highpass
    }
}
