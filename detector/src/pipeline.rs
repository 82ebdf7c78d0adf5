//! The detector pipeline: filter stage → sample queue → envelope →
//! blink classifier, owned by one value and driven one cycle at a time.
//!
//! Acquisition (`acquire`) and processing (`process`) are separate calls so
//! a fixed-rate sampler can feed the queue without waiting on the
//! classifier.  Neither allocates.

use tracing::{info, warn};

use crate::classifier::{BlinkClassifier, BlinkPattern, SequenceState};
use crate::config::PipelineConfig;
use crate::dsp::{EnvelopeTracker, FilterStage};
use crate::queue::SampleQueue;

/// Log the first overflow and then every Nth.
const OVERFLOW_LOG_EVERY: u64 = 1000;

/// Sample counters for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Raw samples filtered and queued.
    pub acquired: u64,
    /// Samples taken off the queue and fed to the envelope.
    pub processed: u64,
}

pub struct Pipeline {
    filter: FilterStage,
    queue: SampleQueue,
    envelope: EnvelopeTracker,
    classifier: BlinkClassifier,
    stats: PipelineStats,
    last_envelope: f32,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: &PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let (notch, highpass) = config.filter_coefficients()?;
        info!(
            "Pipeline initialized: {} Hz, {} Hz notch, envelope {} samples, queue {}",
            config.sample_rate_hz,
            config.mains.as_hz(),
            config.envelope_window_len(),
            config.queue_capacity
        );
        Ok(Self {
            filter: FilterStage::new(notch, highpass),
            queue: SampleQueue::new(config.queue_capacity),
            envelope: EnvelopeTracker::new(config.envelope_window_len()),
            classifier: BlinkClassifier::new(config.classifier.clone()),
            stats: PipelineStats::default(),
            last_envelope: 0.0,
        })
    }

    /// Filter one raw sample and queue it.  Never blocks; a full queue
    /// loses its oldest sample.
    pub fn acquire(&mut self, raw: i32) {
        let filtered = self.filter.process(raw);
        self.stats.acquired += 1;
        if self.queue.push(filtered) {
            let dropped = self.queue.dropped();
            if dropped == 1 || dropped % OVERFLOW_LOG_EVERY == 0 {
                warn!(
                    "Sample queue overflow: {} sample(s) dropped so far (capacity {})",
                    dropped,
                    self.queue.capacity()
                );
            }
        }
    }

    /// One processing cycle: consume at most one queued sample, then let
    /// the classifier evaluate events and timeouts at `now_ms`.
    pub fn process(&mut self, now_ms: u64) -> Option<BlinkPattern> {
        let envelope = self.queue.pop().map(|sample| {
            self.stats.processed += 1;
            self.last_envelope = self.envelope.update(sample);
            self.last_envelope
        });
        self.classifier.update(envelope, now_ms)
    }

    /// Acquire (if a sample is available) and process in one step.
    pub fn cycle(&mut self, raw: Option<i32>, now_ms: u64) -> Option<BlinkPattern> {
        if let Some(raw) = raw {
            self.acquire(raw);
        }
        self.process(now_ms)
    }

    /// Drain the queue at `now_ms`, then advance time in 1 ms steps until
    /// any pending sequence resolves.  Used at end of stream.
    pub fn flush(&mut self, now_ms: u64) -> Vec<(u64, BlinkPattern)> {
        let mut resolved = Vec::new();
        while !self.queue.is_empty() {
            if let Some(p) = self.process(now_ms) {
                resolved.push((now_ms, p));
            }
        }

        let cfg = self.classifier.config();
        let deadline = now_ms + cfg.double_blink_ms.max(cfg.triple_blink_ms) + 1;
        let mut t = now_ms;
        while self.classifier.state() != SequenceState::Idle && t < deadline {
            t += 1;
            if let Some(p) = self.classifier.update(None, t) {
                resolved.push((t, p));
            }
        }
        resolved
    }

    /// Unread samples in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn classifier(&self) -> &BlinkClassifier {
        &self.classifier
    }

    /// Status plist for logging and diagnostics.
    pub fn status_sexp(&self) -> String {
        let c = self.classifier.stats();
        format!(
            "(:acquired {} :processed {} :dropped {} :pending {} :envelope {:.1} :state \"{}\" :blinks {} :debounced {} :restarts {} :discarded-singles {} :doubles {} :triples {})",
            self.stats.acquired,
            self.stats.processed,
            self.queue.dropped(),
            self.queue.len(),
            self.last_envelope,
            self.classifier.state().as_str(),
            c.accepted_blinks,
            c.debounced,
            c.restarts,
            c.discarded_singles,
            c.doubles,
            c.triples,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SampleSource, SyntheticConfig, SyntheticSource};

    /// Replay a synthetic recording through a fresh pipeline on a simulated
    /// clock and return every emitted pattern.
    fn replay(onsets: &[u64], duration_ms: u64) -> Vec<(u64, BlinkPattern)> {
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(&config).unwrap();
        let mut source = SyntheticSource::new(SyntheticConfig {
            blink_onsets_ms: onsets.to_vec(),
            duration_ms: Some(duration_ms),
            ..SyntheticConfig::default()
        });
        let mut out = Vec::new();
        let mut n = 0u64;
        while let Some(raw) = source.acquire().unwrap() {
            let now_ms = n * 1000 / config.sample_rate_hz as u64;
            if let Some(p) = pipeline.cycle(Some(raw), now_ms) {
                out.push((now_ms, p));
            }
            n += 1;
        }
        out.extend(pipeline.flush(n * 1000 / config.sample_rate_hz as u64));
        out
    }

    fn kinds(patterns: &[(u64, BlinkPattern)]) -> Vec<BlinkPattern> {
        patterns.iter().map(|&(_, p)| p).collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            sample_rate_hz: 44_100,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(&config).is_err());
    }

    #[test]
    fn test_quiet_signal_emits_nothing() {
        assert!(replay(&[], 5000).is_empty());
    }

    #[test]
    fn test_single_blink_is_discarded() {
        assert!(replay(&[1000], 4000).is_empty());
    }

    #[test]
    fn test_double_blink_end_to_end() {
        let out = replay(&[1000, 1400], 4000);
        assert_eq!(kinds(&out), vec![BlinkPattern::Double]);
        // Resolved one triple window after the second blink
        let (at, _) = out[0];
        assert!((2000..2300).contains(&at), "double resolved at {}ms", at);
    }

    #[test]
    fn test_triple_blink_end_to_end() {
        let out = replay(&[1000, 1350, 1700], 4000);
        assert_eq!(kinds(&out), vec![BlinkPattern::Triple]);
        let (at, _) = out[0];
        assert!((1700..1900).contains(&at), "triple resolved at {}ms", at);
    }

    #[test]
    fn test_mixed_sequence_end_to_end() {
        let out = replay(&[1000, 1400, 3000, 3350, 3700, 5000], 7000);
        assert_eq!(kinds(&out), vec![BlinkPattern::Double, BlinkPattern::Triple]);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let onsets = [500, 900, 2500, 2850, 3200, 4800, 6000, 6400];
        let first = replay(&onsets, 9000);
        let second = replay(&onsets, 9000);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_flush_resolves_pending_double() {
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(&config).unwrap();
        // Put the classifier straight into AwaitingThird
        pipeline.classifier.update(Some(40.0), 0);
        pipeline.classifier.update(Some(40.0), 300);
        let resolved = pipeline.flush(300);
        assert_eq!(resolved, vec![(901, BlinkPattern::Double)]);
        assert_eq!(pipeline.classifier().state(), SequenceState::Idle);
    }

    #[test]
    fn test_backpressure_drops_oldest_samples() {
        let config = PipelineConfig {
            queue_capacity: 4,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(&config).unwrap();
        for raw in 0..10 {
            pipeline.acquire(raw * 10);
        }
        assert_eq!(pipeline.pending(), 4);
        assert_eq!(pipeline.dropped(), 6);
        assert_eq!(pipeline.stats().acquired, 10);

        let mut processed = 0;
        while pipeline.pending() > 0 {
            pipeline.process(0);
            processed += 1;
        }
        assert_eq!(processed, 4);
        assert_eq!(pipeline.stats().processed, 4);
    }

    #[test]
    fn test_process_without_samples_still_times_out() {
        let mut pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();
        pipeline.classifier.update(Some(40.0), 0);
        assert_eq!(pipeline.process(600), None);
        assert!(matches!(pipeline.classifier().state(), SequenceState::AwaitingSecond { .. }));
        pipeline.process(601);
        assert_eq!(pipeline.classifier().state(), SequenceState::Idle);
    }

    #[test]
    fn test_status_sexp_fields() {
        let mut pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();
        pipeline.cycle(Some(5), 0);
        let s = pipeline.status_sexp();
        assert!(s.contains(":acquired 1"));
        assert!(s.contains(":processed 1"));
        assert!(s.contains(":state \"idle\""));
        assert!(s.contains(":restarts 0"));
    }

    #[test]
    fn test_status_sexp_reports_restarts() {
        let mut pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();
        pipeline.classifier.update(Some(40.0), 0);
        // Second blink arrives after the double window in the same cycle
        // that would have timed the first one out
        pipeline.classifier.update(Some(40.0), 700);
        assert_eq!(pipeline.classifier().stats().restarts, 1);
        assert!(pipeline.status_sexp().contains(":restarts 1"));
    }
}
