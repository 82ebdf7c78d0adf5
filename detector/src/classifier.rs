//! Blink pattern classification — turn debounced envelope threshold
//! crossings into single/double/triple blink patterns.
//!
//! `transition` is the whole state machine as a pure function; the
//! `BlinkClassifier` wrapper adds blink-band detection, debounce, and
//! bookkeeping.  Event transitions are applied before timeouts in every
//! cycle, and a gap equal to a window is still inside it.

use tracing::{debug, info, trace};

// ── Pattern types ───────────────────────────────────────────

/// A resolved blink sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlinkPattern {
    Single,
    Double,
    Triple,
}

impl BlinkPattern {
    /// String representation for events and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single-blink",
            Self::Double => "double-blink",
            Self::Triple => "triple-blink",
        }
    }

    /// Parse a pattern from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "single-blink" | "single" => Some(Self::Single),
            "double-blink" | "double" => Some(Self::Double),
            "triple-blink" | "triple" => Some(Self::Triple),
            _ => None,
        }
    }
}

// ── Sequence state ──────────────────────────────────────────

/// Progress through a candidate multi-blink sequence.  Timestamps are
/// milliseconds on the caller's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// No blink pending.
    Idle,
    /// One blink seen; waiting for a second within the double window.
    AwaitingSecond { first_ms: u64 },
    /// Two blinks seen; waiting for a third within the triple window.
    AwaitingThird { first_ms: u64, second_ms: u64 },
}

impl SequenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingSecond { .. } => "awaiting-second",
            Self::AwaitingThird { .. } => "awaiting-third",
        }
    }

    /// Blinks accumulated in the current sequence.
    pub fn blink_count(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::AwaitingSecond { .. } => 1,
            Self::AwaitingThird { .. } => 2,
        }
    }
}

// ── Config ──────────────────────────────────────────────────

/// Detection band and timing windows for blink classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Envelope must be strictly above this to count as a blink.
    pub blink_lower: f32,
    /// Envelope must be strictly below this to count as a blink.
    pub blink_upper: f32,
    /// Minimum spacing between accepted blink ticks (ms).
    pub debounce_ms: u64,
    /// Maximum gap from first to second blink (ms).
    pub double_blink_ms: u64,
    /// Maximum gap from second to third blink (ms).
    pub triple_blink_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            blink_lower: 30.0,
            blink_upper: 50.0,
            debounce_ms: 250,
            double_blink_ms: 600,
            triple_blink_ms: 600,
        }
    }
}

impl ClassifierConfig {
    /// Whether an envelope value lies inside the open blink band.
    pub fn in_band(&self, envelope: f32) -> bool {
        envelope > self.blink_lower && envelope < self.blink_upper
    }
}

// ── Transition function ─────────────────────────────────────

/// Advance the sequence state by one cycle.
///
/// `blink` is true when an accepted blink tick occurred at `now_ms`.
/// Returns the next state and the pattern resolved in this cycle, if any.
pub fn transition(
    state: SequenceState,
    blink: bool,
    now_ms: u64,
    config: &ClassifierConfig,
) -> (SequenceState, Option<BlinkPattern>) {
    let state = if blink {
        match state {
            SequenceState::Idle => SequenceState::AwaitingSecond { first_ms: now_ms },
            SequenceState::AwaitingSecond { first_ms } => {
                if now_ms.saturating_sub(first_ms) <= config.double_blink_ms {
                    SequenceState::AwaitingThird {
                        first_ms,
                        second_ms: now_ms,
                    }
                } else {
                    SequenceState::AwaitingSecond { first_ms: now_ms }
                }
            }
            SequenceState::AwaitingThird { second_ms, .. } => {
                if now_ms.saturating_sub(second_ms) <= config.triple_blink_ms {
                    return (SequenceState::Idle, Some(BlinkPattern::Triple));
                }
                SequenceState::AwaitingSecond { first_ms: now_ms }
            }
        }
    } else {
        state
    };

    match state {
        SequenceState::AwaitingSecond { first_ms }
            if now_ms.saturating_sub(first_ms) > config.double_blink_ms =>
        {
            (SequenceState::Idle, None)
        }
        SequenceState::AwaitingThird { second_ms, .. }
            if now_ms.saturating_sub(second_ms) > config.triple_blink_ms =>
        {
            (SequenceState::Idle, Some(BlinkPattern::Double))
        }
        other => (other, None),
    }
}

// ── Classifier ──────────────────────────────────────────────

/// Counters kept by the classifier for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    /// Blink ticks that passed the band and debounce checks.
    pub accepted_blinks: u64,
    /// In-band envelope values rejected by the debounce interval.
    pub debounced: u64,
    /// Sequences restarted because a blink arrived outside its window.
    pub restarts: u64,
    /// Single blinks that timed out without a follow-up.
    pub discarded_singles: u64,
    pub doubles: u64,
    pub triples: u64,
}

/// Debounced blink detector driving the sequence state machine.
#[derive(Debug)]
pub struct BlinkClassifier {
    state: SequenceState,
    config: ClassifierConfig,
    last_blink_ms: Option<u64>,
    stats: ClassifierStats,
}

impl BlinkClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            state: SequenceState::Idle,
            config,
            last_blink_ms: None,
            stats: ClassifierStats::default(),
        }
    }

    /// Run one processing cycle.  `envelope` is the newest envelope value,
    /// or None when no sample was processed this cycle; timeouts are
    /// evaluated either way.
    pub fn update(&mut self, envelope: Option<f32>, now_ms: u64) -> Option<BlinkPattern> {
        let blink = envelope.map_or(false, |e| self.accept_blink(e, now_ms));

        let before = self.state;
        let (after, pattern) = transition(before, blink, now_ms, &self.config);
        self.record(before, after, blink, pattern, now_ms);
        self.state = after;
        pattern
    }

    /// Band and debounce check.  Records the tick time when accepted.
    fn accept_blink(&mut self, envelope: f32, now_ms: u64) -> bool {
        trace!(envelope, now_ms, "envelope");
        if !self.config.in_band(envelope) {
            return false;
        }
        if let Some(last) = self.last_blink_ms {
            if now_ms.saturating_sub(last) < self.config.debounce_ms {
                self.stats.debounced += 1;
                return false;
            }
        }
        self.last_blink_ms = Some(now_ms);
        self.stats.accepted_blinks += 1;
        debug!(
            "Blink tick at {}ms (envelope {:.1}, sequence {})",
            now_ms,
            envelope,
            self.state.as_str()
        );
        true
    }

    fn record(
        &mut self,
        before: SequenceState,
        after: SequenceState,
        blink: bool,
        pattern: Option<BlinkPattern>,
        now_ms: u64,
    ) {
        match pattern {
            Some(BlinkPattern::Double) => {
                self.stats.doubles += 1;
                info!("Double blink at {}ms", now_ms);
            }
            Some(BlinkPattern::Triple) => {
                self.stats.triples += 1;
                info!("Triple blink at {}ms", now_ms);
            }
            Some(BlinkPattern::Single) | None => {}
        }

        if blink && before != SequenceState::Idle && after.blink_count() == 1 {
            self.stats.restarts += 1;
            debug!(
                "Blink outside {} window at {}ms, restarting sequence",
                before.as_str(),
                now_ms
            );
        }
        if !blink
            && pattern.is_none()
            && matches!(before, SequenceState::AwaitingSecond { .. })
            && after == SequenceState::Idle
        {
            self.stats.discarded_singles += 1;
            debug!("Single blink timed out at {}ms, discarded", now_ms);
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn stats(&self) -> &ClassifierStats {
        &self.stats
    }}
