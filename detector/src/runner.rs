//! Runner loops — drive a `Pipeline` from a source into a sink.
//!
//! `run_replay` uses a simulated clock derived from the sample index and runs
//! as fast as the source delivers.  `run_live` paces acquisition by the wall
//! clock through a `SampleClock`, with graceful signal handling, an optional
//! exit timer, and periodic status logging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::sink::PatternSink;
use crate::source::SampleSource;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

// ── Sample clock ────────────────────────────────────────────

/// Converts elapsed wall-clock time into a count of due samples.
///
/// Time is accumulated in units of `µs × rate`, so a sample costs exactly
/// 1_000_000 units and the remainder carries across calls without drift.
#[derive(Debug, Clone)]
pub struct SampleClock {
    sample_rate_hz: u64,
    budget: u64,
    max_catchup: usize,
    dropped: u64,
}

const UNITS_PER_SAMPLE: u64 = 1_000_000;

impl SampleClock {
    pub fn new(sample_rate_hz: u32, max_catchup: usize) -> Self {
        Self {
            sample_rate_hz: sample_rate_hz.max(1) as u64,
            budget: 0,
            max_catchup: max_catchup.max(1),
            dropped: 0,
        }
    }

    /// Account for `elapsed_us` and return how many samples are due now.
    /// At most `max_catchup` are returned; the excess is counted as dropped.
    pub fn advance(&mut self, elapsed_us: u64) -> usize {
        self.budget += elapsed_us * self.sample_rate_hz;
        let due = self.budget / UNITS_PER_SAMPLE;
        self.budget %= UNITS_PER_SAMPLE;

        let cap = self.max_catchup as u64;
        if due > cap {
            self.dropped += due - cap;
            cap as usize
        } else {
            due as usize
        }
    }

    /// Samples skipped because acquisition fell too far behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// ── Summary ─────────────────────────────────────────────────

/// What a run did, for the shutdown log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub samples: u64,
    pub patterns: u64,
    pub queue_dropped: u64,
    pub clock_dropped: u64,
    pub end_ms: u64,
}

impl RunSummary {
    fn from_pipeline(pipeline: &Pipeline, patterns: u64, clock_dropped: u64, end_ms: u64) -> Self {
        Self {
            samples: pipeline.stats().acquired,
            patterns,
            queue_dropped: pipeline.dropped(),
            clock_dropped,
            end_ms,
        }
    }
}

// ── Replay ──────────────────────────────────────────────────

/// Feed every sample through the pipeline on a simulated clock
/// (`now = n / rate`), then resolve any sequence still pending.
pub fn run_replay(
    config: &PipelineConfig,
    source: &mut dyn SampleSource,
    sink: &mut dyn PatternSink,
) -> anyhow::Result<RunSummary> {
    let mut pipeline = Pipeline::new(config)?;
    let rate = config.sample_rate_hz as u64;
    let mut patterns = 0u64;
    let mut n = 0u64;

    info!("Replay started at {} Hz", config.sample_rate_hz);
    while let Some(raw) = source.acquire()? {
        let now_ms = n * 1000 / rate;
        if let Some(pattern) = pipeline.cycle(Some(raw), now_ms) {
            sink.on_pattern(pattern, now_ms)?;
            patterns += 1;
        }
        n += 1;
    }

    let end_ms = n * 1000 / rate;
    for (at_ms, pattern) in pipeline.flush(end_ms) {
        debug!("Resolved {} after end of stream", pattern.as_str());
        sink.on_pattern(pattern, at_ms)?;
        patterns += 1;
    }

    let summary = RunSummary::from_pipeline(&pipeline, patterns, 0, end_ms);
    info!(
        "Replay finished: {} sample(s), {} pattern(s), {}ms of signal",
        summary.samples, summary.patterns, summary.end_ms
    );
    info!("Final status: {}", pipeline.status_sexp());
    Ok(summary)
}

// ── Live ────────────────────────────────────────────────────

/// Live loop settings.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Exit after this long (for CI).
    pub exit_after: Option<Duration>,
    /// Interval between status log lines.
    pub status_interval: Duration,
    /// Upper bound on samples acquired in one loop iteration.
    pub max_catchup: usize,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            exit_after: None,
            status_interval: Duration::from_secs(60),
            max_catchup: 64,
        }
    }
}

/// Run the pipeline paced by the wall clock until the source ends, a
/// signal arrives, or the exit timer fires.
pub fn run_live(
    config: &PipelineConfig,
    source: &mut dyn SampleSource,
    sink: &mut dyn PatternSink,
    options: LiveOptions,
) -> anyhow::Result<RunSummary> {
    let mut pipeline = Pipeline::new(config)?;
    let mut clock = SampleClock::new(config.sample_rate_hz, options.max_catchup);
    let period = Duration::from_micros(config.sample_period_us());
    let mut patterns = 0u64;
    let mut reported_clock_drops = 0u64;

    install_signal_handlers();

    let start_time = Instant::now();
    let mut last_tick = start_time;
    let mut last_status_log = start_time;
    let mut source_ended = false;

    info!(
        "Live loop started (period {}us, catch-up {} samples)",
        period.as_micros(),
        options.max_catchup
    );

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            break;
        }

        if let Some(dur) = options.exit_after {
            if start_time.elapsed() >= dur {
                info!("Exit timer fired after {}s", dur.as_secs());
                break;
            }
        }

        let now = Instant::now();
        let due = clock.advance(now.duration_since(last_tick).as_micros() as u64);
        last_tick = now;
        if clock.dropped() > reported_clock_drops {
            warn!(
                "Acquisition fell behind: {} sample(s) skipped so far",
                clock.dropped()
            );
            reported_clock_drops = clock.dropped();
        }

        for _ in 0..due {
            match source.acquire()? {
                Some(raw) => pipeline.acquire(raw),
                None => {
                    source_ended = true;
                    break;
                }
            }
        }

        // Process whatever is queued; always at least one cycle so timeouts
        // advance while the source is idle.
        let now_ms = start_time.elapsed().as_millis() as u64;
        let mut budget = pipeline.queue_capacity();
        loop {
            if let Some(pattern) = pipeline.process(now_ms) {
                sink.on_pattern(pattern, now_ms)?;
                patterns += 1;
            }
            budget -= 1;
            if pipeline.pending() == 0 || budget == 0 {
                break;
            }
        }

        if source_ended {
            info!("Sample source ended");
            for (at_ms, pattern) in pipeline.flush(now_ms) {
                sink.on_pattern(pattern, at_ms)?;
                patterns += 1;
            }
            break;
        }

        if last_status_log.elapsed() >= options.status_interval {
            info!("Status: {}", pipeline.status_sexp());
            last_status_log = Instant::now();
        }

        std::thread::sleep(period);
    }

    let end_ms = start_time.elapsed().as_millis() as u64;
    let summary = RunSummary::from_pipeline(&pipeline, patterns, clock.dropped(), end_ms);
    info!(
        "Live loop shutting down ({} sample(s), {} pattern(s), {} queue drop(s), {} clock drop(s))",
        summary.samples, summary.patterns, summary.queue_dropped, summary.clock_dropped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::BlinkPattern;
    use crate::sink::RecordingSink;
    use crate::source::{ReplaySource, SyntheticConfig, SyntheticSource};
    use std::io::Cursor;

    #[test]
    fn test_clock_carries_remainder() {
        let mut clock = SampleClock::new(512, 64);
        // 1953us is just under one period at 512 Hz
        assert_eq!(clock.advance(1953), 0);
        assert_eq!(clock.advance(1), 1);
        // One second in 1ms steps yields exactly 512 samples
        let mut clock = SampleClock::new(512, 64);
        let total: usize = (0..1000).map(|_| clock.advance(1000)).sum();
        assert_eq!(total, 512);
        assert_eq!(clock.dropped(), 0);
    }

    #[test]
    fn test_clock_bounds_catchup() {
        let mut clock = SampleClock::new(500, 10);
        // A 100ms stall makes 50 samples due
        assert_eq!(clock.advance(100_000), 10);
        assert_eq!(clock.dropped(), 40);
        assert_eq!(clock.advance(2_000), 1);
        assert_eq!(clock.dropped(), 40);
    }

    #[test]
    fn test_replay_synthetic_demo() {
        let config = PipelineConfig::default();
        let mut source = SyntheticSource::new(SyntheticConfig::demo(512, 50.0, Some(8_000)));
        let mut sink = RecordingSink::default();
        let summary = run_replay(&config, &mut source, &mut sink).unwrap();

        assert_eq!(summary.samples, 8 * 512);
        assert_eq!(summary.queue_dropped, 0);
        let kinds: Vec<BlinkPattern> = sink.patterns.iter().map(|&(_, p)| p).collect();
        assert_eq!(kinds, vec![BlinkPattern::Double, BlinkPattern::Triple]);
        assert_eq!(summary.patterns, 2);
        // Timestamps are non-decreasing
        assert!(sink.patterns.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_replay_flushes_pending_sequence() {
        // Stream ends 100ms after the second blink; the double must still
        // be reported.
        let config = PipelineConfig::default();
        let mut source = SyntheticSource::new(SyntheticConfig {
            blink_onsets_ms: vec![1000, 1400],
            duration_ms: Some(1650),
            ..SyntheticConfig::default()
        });
        let mut sink = RecordingSink::default();
        run_replay(&config, &mut source, &mut sink).unwrap();
        assert_eq!(sink.patterns.len(), 1);
        assert_eq!(sink.patterns[0].1, BlinkPattern::Double);
        assert!(sink.patterns[0].0 > 1650);
    }

    #[test]
    fn test_replay_text_input() {
        let mut text = String::from("# flat line\n");
        for _ in 0..1024 {
            text.push_str("0\n");
        }
        let mut source = ReplaySource::new(Cursor::new(text));
        let mut sink = RecordingSink::default();
        let summary = run_replay(&PipelineConfig::default(), &mut source, &mut sink).unwrap();
        assert_eq!(summary.samples, 1024);
        assert_eq!(summary.end_ms, 2000);
        assert!(sink.patterns.is_empty());
    }

    #[test]
    fn test_replay_propagates_source_errors() {
        let mut source = ReplaySource::new(Cursor::new("1\n2\nbogus\n"));
        let mut sink = RecordingSink::default();
        assert!(run_replay(&PipelineConfig::default(), &mut source, &mut sink).is_err());
    }

    #[test]
    fn test_live_runs_until_source_ends() {
        let config = PipelineConfig::default();
        let mut source = SyntheticSource::new(SyntheticConfig {
            duration_ms: Some(300),
            ..SyntheticConfig::default()
        });
        let mut sink = RecordingSink::default();
        let options = LiveOptions {
            exit_after: Some(Duration::from_secs(10)),
            ..LiveOptions::default()
        };
        let summary = run_live(&config, &mut source, &mut sink, options).unwrap();
        // 300ms at 512 Hz
        assert_eq!(summary.samples, 154);
        assert!(sink.patterns.is_empty());
    }
}
