//! Sample sources — where raw ADC amplitudes come from.
//!
//! The acquisition primitive on real hardware is out of reach here, so the
//! host build ships two stand-ins: a text replay reader and a deterministic
//! synthetic EOG generator.

use std::f64::consts::PI;
use std::io::BufRead;

use anyhow::{anyhow, Context};
use tracing::{debug, warn};

/// Inbound contract: one raw amplitude per call at the nominal rate.
pub trait SampleSource {
    /// Next raw sample, or None once the stream has ended.
    fn acquire(&mut self) -> anyhow::Result<Option<i32>>;
}

// ── Replay ──────────────────────────────────────────────────

/// Reads one integer sample per line.  Blank lines and lines starting
/// with `#` are skipped.
pub struct ReplaySource<R: BufRead> {
    reader: R,
    line: String,
    line_number: u64,
    samples_read: u64,
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            samples_read: 0,
        }
    }
}

impl<R: BufRead> SampleSource for ReplaySource<R> {
    fn acquire(&mut self) -> anyhow::Result<Option<i32>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .with_context(|| format!("failed to read sample line {}", self.line_number + 1))?;
            if n == 0 {
                debug!("Replay source exhausted after {} samples", self.samples_read);
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let sample = trimmed.parse::<i32>().map_err(|e| {
                anyhow!("line {}: invalid sample {:?}: {}", self.line_number, trimmed, e)
            })?;
            self.samples_read += 1;
            return Ok(Some(sample));
        }
    }
}

// ── Synthetic ───────────────────────────────────────────────

/// Shape of the synthetic waveform.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Output sample rate (Hz).
    pub sample_rate_hz: u32,
    /// Mains hum frequency (Hz).
    pub mains_hz: f64,
    /// Mains hum amplitude (ADC counts).
    pub hum_amplitude: f64,
    /// Baseline drift amplitude (ADC counts).
    pub drift_amplitude: f64,
    /// Baseline drift frequency (Hz).
    pub drift_hz: f64,
    /// Peak blink burst amplitude (ADC counts).
    pub blink_amplitude: f64,
    /// Blink burst carrier frequency (Hz).
    pub blink_hz: f64,
    /// Blink burst duration (ms).
    pub blink_duration_ms: f64,
    /// Blink onsets (ms from stream start).
    pub blink_onsets_ms: Vec<u64>,
    /// Total stream length (ms); None runs forever.
    pub duration_ms: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 512,
            mains_hz: 50.0,
            hum_amplitude: 30.0,
            drift_amplitude: 40.0,
            drift_hz: 0.3,
            blink_amplitude: 100.0,
            blink_hz: 12.0,
            blink_duration_ms: 150.0,
            blink_onsets_ms: Vec::new(),
            duration_ms: None,
        }
    }
}

impl SyntheticConfig {
    /// A repeating demo script: double, triple, lone single, every 8 s.
    pub fn demo(sample_rate_hz: u32, mains_hz: f64, duration_ms: Option<u64>) -> Self {
        let horizon = duration_ms.unwrap_or(3_600_000);
        let mut onsets = Vec::new();
        let mut base = 1_000;
        while base < horizon {
            onsets.extend_from_slice(&[base, base + 400, base + 3_000, base + 3_350, base + 3_700, base + 6_000]);
            base += 8_000;
        }
        Self {
            sample_rate_hz,
            mains_hz,
            blink_onsets_ms: onsets,
            duration_ms,
            ..Self::default()
        }
    }
}

/// Deterministic EOG-like waveform: drift + mains hum + windowed blink
/// bursts at scripted onsets.
pub struct SyntheticSource {
    config: SyntheticConfig,
    sample_index: u64,
    next_blink: usize,
}

impl SyntheticSource {
    pub fn new(mut config: SyntheticConfig) -> Self {
        config.blink_onsets_ms.sort_unstable();
        if config.sample_rate_hz == 0 {
            warn!("Synthetic source configured with 0 Hz, using 512 Hz");
            config.sample_rate_hz = 512;
        }
        Self {
            config,
            sample_index: 0,
            next_blink: 0,
        }
    }

    /// Sample value at index `n`.
    fn value_at(&mut self, n: u64) -> f64 {
        let c = &self.config;
        let t = n as f64 / c.sample_rate_hz as f64;
        let t_ms = t * 1000.0;

        let mut v = c.drift_amplitude * (2.0 * PI * c.drift_hz * t).sin()
            + c.hum_amplitude * (2.0 * PI * c.mains_hz * t).sin();

        // Retire bursts that have fully elapsed
        while let Some(&onset) = c.blink_onsets_ms.get(self.next_blink) {
            if t_ms >= onset as f64 + c.blink_duration_ms {
                self.next_blink += 1;
            } else {
                break;
            }
        }
        for &onset in &c.blink_onsets_ms[self.next_blink..] {
            let tau = t_ms - onset as f64;
            if tau < 0.0 {
                break;
            }
            let window = 0.5 * (1.0 - (2.0 * PI * tau / c.blink_duration_ms).cos());
            v += c.blink_amplitude * window * (2.0 * PI * c.blink_hz * tau / 1000.0).sin();
        }
        v
    }
}

impl SampleSource for SyntheticSource {
    fn acquire(&mut self) -> anyhow::Result<Option<i32>> {
        let n = self.sample_index;
        if let Some(limit) = self.config.duration_ms {
            if n * 1000 >= limit * self.config.sample_rate_hz as u64 {
                return Ok(None);
            }
        }
        self.sample_index += 1;
        Ok(Some(self.value_at(n).round() as i32))
    }
}
