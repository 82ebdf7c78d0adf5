//! Pipeline configuration — defaults, validation, and s-expression files.
//!
//! All values are fixed for the lifetime of a pipeline; nothing is
//! reconfigured at runtime.

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use lexpr::Value;

use crate::classifier::ClassifierConfig;
use crate::dsp::biquad::{coefficients_for, BiquadCoefficients, MainsFrequency, SUPPORTED_SAMPLE_RATES};
use crate::dsp::envelope::window_len_for;
use crate::sexp::get_keyword;

/// Everything needed to build a `Pipeline`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Nominal acquisition rate (Hz).  Must have a coefficient table.
    pub sample_rate_hz: u32,
    /// Mains frequency rejected by the notch section.
    pub mains: MainsFrequency,
    /// Envelope smoothing duration (ms).
    pub envelope_window_ms: u32,
    /// Blink band, debounce, and sequence windows.
    pub classifier: ClassifierConfig,
    /// Sample queue capacity.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 512,
            mains: MainsFrequency::Hz50,
            envelope_window_ms: 100,
            classifier: ClassifierConfig::default(),
            queue_capacity: 64,
        }
    }
}

impl PipelineConfig {
    /// Check every constraint the pipeline relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if coefficients_for(self.sample_rate_hz, self.mains).is_none() {
            bail!(
                "no filter coefficients for a {} Hz sample rate (supported: {:?})",
                self.sample_rate_hz,
                SUPPORTED_SAMPLE_RATES
            );
        }
        if self.envelope_window_len() == 0 {
            bail!(
                "envelope window of {}ms is shorter than one sample at {} Hz",
                self.envelope_window_ms,
                self.sample_rate_hz
            );
        }
        let c = &self.classifier;
        if !c.blink_lower.is_finite() || !c.blink_upper.is_finite() {
            bail!("blink band bounds must be finite");
        }
        if c.blink_lower < 0.0 {
            bail!("blink-lower must be non-negative, got {}", c.blink_lower);
        }
        if c.blink_lower >= c.blink_upper {
            bail!(
                "blink band is empty: lower {} must be below upper {}",
                c.blink_lower,
                c.blink_upper
            );
        }
        if c.double_blink_ms == 0 || c.triple_blink_ms == 0 {
            bail!("double-blink-ms and triple-blink-ms must be positive");
        }
        if self.queue_capacity == 0 {
            bail!("queue-capacity must be at least 1");
        }
        Ok(())
    }

    /// Envelope window length in samples.
    pub fn envelope_window_len(&self) -> usize {
        window_len_for(self.envelope_window_ms, self.sample_rate_hz)
    }

    /// (notch, high-pass) coefficients for this rate and mains frequency.
    pub fn filter_coefficients(&self) -> anyhow::Result<(BiquadCoefficients, BiquadCoefficients)> {
        coefficients_for(self.sample_rate_hz, self.mains).ok_or_else(|| {
            anyhow!(
                "no filter coefficients for {} Hz sampling with {} Hz mains",
                self.sample_rate_hz,
                self.mains.as_hz()
            )
        })
    }

    /// Sample period in microseconds (rounded down).
    pub fn sample_period_us(&self) -> u64 {
        1_000_000 / self.sample_rate_hz.max(1) as u64
    }

    /// Parse a plist, overriding defaults with any keys present.
    pub fn from_sexp(raw: &str) -> anyhow::Result<Self> {
        let value = lexpr::from_str(raw).map_err(|e| anyhow!("malformed config s-expression: {e}"))?;
        let mut config = Self::default();
        config.apply_sexp(&value)?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_sexp(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    fn apply_sexp(&mut self, value: &Value) -> anyhow::Result<()> {
        if let Some(v) = parse_field(value, "sample-rate-hz")? {
            self.sample_rate_hz = v;
        }
        if let Some(hz) = parse_field::<u32>(value, "mains-hz")? {
            self.mains = MainsFrequency::from_hz(hz)
                .ok_or_else(|| anyhow!("mains-hz must be 50 or 60, got {}", hz))?;
        }
        if let Some(v) = parse_field(value, "envelope-window-ms")? {
            self.envelope_window_ms = v;
        }
        if let Some(v) = parse_field(value, "blink-lower")? {
            self.classifier.blink_lower = v;
        }
        if let Some(v) = parse_field(value, "blink-upper")? {
            self.classifier.blink_upper = v;
        }
        if let Some(v) = parse_field(value, "debounce-ms")? {
            self.classifier.debounce_ms = v;
        }
        if let Some(v) = parse_field(value, "double-blink-ms")? {
            self.classifier.double_blink_ms = v;
        }
        if let Some(v) = parse_field(value, "triple-blink-ms")? {
            self.classifier.triple_blink_ms = v;
        }
        if let Some(v) = parse_field(value, "queue-capacity")? {
            self.queue_capacity = v;
        }
        Ok(())
    }

    /// Render the effective configuration as a plist.
    pub fn config_sexp(&self) -> String {
        let c = &self.classifier;
        format!(
            "(:sample-rate-hz {} :mains-hz {} :envelope-window-ms {} :envelope-window-samples {} :blink-lower {} :blink-upper {} :debounce-ms {} :double-blink-ms {} :triple-blink-ms {} :queue-capacity {})",
            self.sample_rate_hz,
            self.mains.as_hz(),
            self.envelope_window_ms,
            self.envelope_window_len(),
            c.blink_lower,
            c.blink_upper,
            c.debounce_ms,
            c.double_blink_ms,
            c.triple_blink_ms,
            self.queue_capacity,
        )
    }
}

/// Look up `key` and parse it, failing if present but malformed.
fn parse_field<T: FromStr>(value: &Value, key: &str) -> anyhow::Result<Option<T>> {
    match get_keyword(value, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("invalid value for :{}: {:?}", key, raw)),
    }
}
