//! Second-order IIR sections with fixed, offline-designed coefficients.
//!
//! Each `BiquadSection` runs the transposed direct-form-II recurrence and
//! owns its two delay registers.  Coefficient tables cover the supported
//! sample rates; nothing is designed at runtime.

// ── Mains frequency ─────────────────────────────────────────

/// Local power-line frequency the notch section rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainsFrequency {
    /// 50 Hz mains (stopband 48–52 Hz).
    Hz50,
    /// 60 Hz mains (stopband 58–62 Hz).
    Hz60,
}

impl MainsFrequency {
    pub fn as_hz(&self) -> u32 {
        match self {
            Self::Hz50 => 50,
            Self::Hz60 => 60,
        }
    }

    /// Parse a mains frequency from its value in hertz.
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            50 => Some(Self::Hz50),
            60 => Some(Self::Hz60),
            _ => None,
        }
    }
}

// ── Coefficients ────────────────────────────────────────────

/// Normalized biquad coefficients (a0 == 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

/// Butterworth band-stop, 48–52 Hz at 512 Hz.
pub const NOTCH_50HZ_AT_512: BiquadCoefficients = BiquadCoefficients {
    b0: 0.976_039_57,
    b1: -1.596_471_09,
    b2: 0.976_039_57,
    a1: -1.596_471_09,
    a2: 0.952_079_15,
};

/// Butterworth band-stop, 58–62 Hz at 512 Hz.
pub const NOTCH_60HZ_AT_512: BiquadCoefficients = BiquadCoefficients {
    b0: 0.976_039_57,
    b1: -1.446_831_00,
    b2: 0.976_039_57,
    a1: -1.446_831_00,
    a2: 0.952_079_15,
};

/// Butterworth high-pass, 5 Hz at 512 Hz.
pub const HIGHPASS_5HZ_AT_512: BiquadCoefficients = BiquadCoefficients {
    b0: 0.957_539_83,
    b1: -1.915_079_67,
    b2: 0.957_539_83,
    a1: -1.913_275_99,
    a2: 0.916_883_35,
};

/// Butterworth band-stop, 48–52 Hz at 500 Hz.
pub const NOTCH_50HZ_AT_500: BiquadCoefficients = BiquadCoefficients {
    b0: 0.975_478_39,
    b1: -1.578_855_81,
    b2: 0.975_478_39,
    a1: -1.578_855_81,
    a2: 0.950_956_78,
};

/// Butterworth band-stop, 58–62 Hz at 500 Hz.
pub const NOTCH_60HZ_AT_500: BiquadCoefficients = BiquadCoefficients {
    b0: 0.975_478_39,
    b1: -1.422_635_57,
    b2: 0.975_478_39,
    a1: -1.422_635_57,
    a2: 0.950_956_78,
};

/// Butterworth high-pass, 5 Hz at 500 Hz.
pub const HIGHPASS_5HZ_AT_500: BiquadCoefficients = BiquadCoefficients {
    b0: 0.956_543_23,
    b1: -1.913_086_45,
    b2: 0.956_543_23,
    a1: -1.911_197_07,
    a2: 0.914_975_83,
};

/// Sample rates with a designed coefficient table.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [500, 512];

/// Look up the (notch, high-pass) pair for a sample rate and mains frequency.
/// Returns None when no table was designed for `sample_rate_hz`.
pub fn coefficients_for(
    sample_rate_hz: u32,
    mains: MainsFrequency,
) -> Option<(BiquadCoefficients, BiquadCoefficients)> {
    match (sample_rate_hz, mains) {
        (512, MainsFrequency::Hz50) => Some((NOTCH_50HZ_AT_512, HIGHPASS_5HZ_AT_512)),
        (512, MainsFrequency::Hz60) => Some((NOTCH_60HZ_AT_512, HIGHPASS_5HZ_AT_512)),
        (500, MainsFrequency::Hz50) => Some((NOTCH_50HZ_AT_500, HIGHPASS_5HZ_AT_500)),
        (500, MainsFrequency::Hz60) => Some((NOTCH_60HZ_AT_500, HIGHPASS_5HZ_AT_500)),
        _ => None,
    }
}

// ── Section ─────────────────────────────────────────────────

/// One second-order section with private running state.
#[derive(Debug, Clone)]
pub struct BiquadSection {
    coeffs: BiquadCoefficients,
    z1: f32,
    z2: f32,
}

impl BiquadSection {
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Filter one sample (transposed direct form II).
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let x = input - c.a1 * self.z1 - c.a2 * self.z2;
        let output = c.b0 * x + c.b1 * self.z1 + c.b2 * self.z2;
        self.z2 = self.z1;
        self.z1 = x;
        output
    }

    /// Delay registers as (z1, z2).
    pub fn state(&self) -> (f32, f32) {
        (self.z1, self.z2)
    }
}
