//! Action sinks — consumers of classified blink patterns.
//!
//! The real dispatcher (key-press emulation) lives outside this crate.
//! `SexpSink` stands in for it: it maps each pattern to a bound action name
//! and writes one event s-expression per accepted pattern, enforcing a
//! minimum interval between actions.

use std::io::Write;

use anyhow::Context;
use tracing::{debug, warn};

use crate::classifier::BlinkPattern;
use crate::sexp::{escape_string, format_event};

/// Outbound contract: called at most once per resolved sequence.
pub trait PatternSink {
    fn on_pattern(&mut self, pattern: BlinkPattern, at_ms: u64) -> anyhow::Result<()>;
}

// ── Bindings ────────────────────────────────────────────────

/// Action names bound to each pattern.  Unbound patterns still produce an
/// event, with `:action nil`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBindings {
    single: Option<String>,
    double: Option<String>,
    triple: Option<String>,
}

impl Default for ActionBindings {
    fn default() -> Self {
        Self {
            single: None,
            double: Some("space".to_string()),
            triple: Some("enter".to_string()),
        }
    }
}

impl ActionBindings {
    pub fn action_for(&self, pattern: BlinkPattern) -> Option<&str> {
        match pattern {
            BlinkPattern::Single => self.single.as_deref(),
            BlinkPattern::Double => self.double.as_deref(),
            BlinkPattern::Triple => self.triple.as_deref(),
        }
    }

    /// Bind (or with None, unbind) an action.
    pub fn set(&mut self, pattern: BlinkPattern, action: Option<String>) {
        let slot = match pattern {
            BlinkPattern::Single => &mut self.single,
            BlinkPattern::Double => &mut self.double,
            BlinkPattern::Triple => &mut self.triple,
        };
        *slot = action;
    }

    /// Render all bindings as a plist.
    pub fn bindings_sexp(&self) -> String {
        let render = |a: Option<&str>| match a {
            Some(name) => format!("\"{}\"", escape_string(name)),
            None => "nil".to_string(),
        };
        format!(
            "(:single-blink {} :double-blink {} :triple-blink {})",
            render(self.single.as_deref()),
            render(self.double.as_deref()),
            render(self.triple.as_deref()),
        )
    }
}

// ── S-expression sink ───────────────────────────────────────

/// Writes one event line per pattern to `out`, rate-limited by a cooldown.
pub struct SexpSink<W: Write> {
    out: W,
    bindings: ActionBindings,
    /// Minimum time between two written events (ms).
    cooldown_ms: u64,
    last_action_ms: Option<u64>,
    written: u64,
    suppressed: u64,
}

impl<W: Write> SexpSink<W> {
    pub fn new(out: W, bindings: ActionBindings, cooldown_ms: u64) -> Self {
        Self {
            out,
            bindings,
            cooldown_ms,
            last_action_ms: None,
            written: 0,
            suppressed: 0,
        }
    }

    /// Format the event line for `pattern` without writing it.
    pub fn event_sexp(&self, pattern: BlinkPattern, at_ms: u64) -> String {
        let ts = at_ms.to_string();
        let action = match self.bindings.action_for(pattern) {
            Some(name) => format!("\"{}\"", escape_string(name)),
            None => "nil".to_string(),
        };
        format_event(pattern.as_str(), &[("timestamp-ms", &ts), ("action", &action)])
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PatternSink for SexpSink<W> {
    fn on_pattern(&mut self, pattern: BlinkPattern, at_ms: u64) -> anyhow::Result<()> {
        if let Some(last) = self.last_action_ms {
            let since = at_ms.saturating_sub(last);
            if since < self.cooldown_ms {
                self.suppressed += 1;
                warn!(
                    "{} at {}ms suppressed: {}ms since last action (cooldown {}ms)",
                    pattern.as_str(),
                    at_ms,
                    since,
                    self.cooldown_ms
                );
                return Ok(());
            }
        }

        let line = self.event_sexp(pattern, at_ms);
        writeln!(self.out, "{}", line).context("failed to write pattern event")?;
        self.out.flush().context("failed to flush pattern event")?;
        self.last_action_ms = Some(at_ms);
        self.written += 1;
        debug!("Dispatched {}", line);
        Ok(())
    }
}

// ── Recording sink ──────────────────────────────────────────

/// Keeps every pattern in memory; used for replay summaries and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub patterns: Vec<(u64, BlinkPattern)>,
}

impl PatternSink for RecordingSink {
    fn on_pattern(&mut self, pattern: BlinkPattern, at_ms: u64) -> anyhow::Result<()> {
        self.patterns.push((at_ms, pattern));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(sink: SexpSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_event_line_format() {
        let mut sink = SexpSink::new(Vec::new(), ActionBindings::default(), 0);
        sink.on_pattern(BlinkPattern::Double, 1200).unwrap();
        assert_eq!(
            output(sink),
            "(:type :event :event :double-blink :timestamp-ms 1200 :action \"space\")\n"
        );
    }

    #[test]
    fn test_unbound_pattern_reports_nil_action() {
        let sink = SexpSink::new(Vec::new(), ActionBindings::default(), 0);
        let line = sink.event_sexp(BlinkPattern::Single, 5);
        assert!(line.contains(":single-blink"));
        assert!(line.ends_with(":action nil)"));
    }

    #[test]
    fn test_cooldown_suppresses_close_actions() {
        let mut sink = SexpSink::new(Vec::new(), ActionBindings::default(), 1000);
        sink.on_pattern(BlinkPattern::Double, 1000).unwrap();
        sink.on_pattern(BlinkPattern::Triple, 1500).unwrap();
        sink.on_pattern(BlinkPattern::Triple, 2000).unwrap();
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.suppressed(), 1);
        let out = output(sink);
        assert_eq!(out.lines().count(), 2);
        assert!(out.lines().nth(1).unwrap().contains(":timestamp-ms 2000"));
    }

    #[test]
    fn test_bindings_set_and_render() {
        let mut b = ActionBindings::default();
        b.set(BlinkPattern::Single, Some("tab".to_string()));
        b.set(BlinkPattern::Triple, None);
        assert_eq!(b.action_for(BlinkPattern::Single), Some("tab"));
        assert_eq!(b.action_for(BlinkPattern::Triple), None);
        assert_eq!(
            b.bindings_sexp(),
            "(:single-blink \"tab\" :double-blink \"space\" :triple-blink nil)"
        );
    }

    #[test]
    fn test_action_names_are_escaped() {
        let mut b = ActionBindings::default();
        b.set(BlinkPattern::Double, Some("say \"hi\"".to_string()));
        let sink = SexpSink::new(Vec::new(), b, 0);
        assert!(sink
            .event_sexp(BlinkPattern::Double, 0)
            .contains(":action \"say \\\"hi\\\"\""));
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let mut sink = RecordingSink::default();
        sink.on_pattern(BlinkPattern::Triple, 10).unwrap();
        sink.on_pattern(BlinkPattern::Double, 20).unwrap();
        assert_eq!(
            sink.patterns,
            vec![(10, BlinkPattern::Triple), (20, BlinkPattern::Double)]
        );
    }
}
