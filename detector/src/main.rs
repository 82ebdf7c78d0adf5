//! eog-blink — detect double and triple blinks in an EOG sample stream
//! and emit one s-expression event per pattern on stdout.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use eog_blink::classifier::BlinkPattern;
use eog_blink::config::PipelineConfig;
use eog_blink::dsp::MainsFrequency;
use eog_blink::runner::{self, LiveOptions};
use eog_blink::sink::{ActionBindings, SexpSink};
use eog_blink::source::{ReplaySource, SampleSource, SyntheticConfig, SyntheticSource};

/// Synthetic replay length when no exit timer is given.
const DEFAULT_SYNTHETIC_SECS: u64 = 24;

#[derive(Parser, Debug)]
#[command(name = "eog-blink", about = "EOG blink pattern detector")]
struct Cli {
    /// S-expression config file (plist)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run mode: replay (simulated clock) or live (wall-clock paced)
    #[arg(long, default_value = "replay")]
    mode: String,

    /// Sample file, one integer per line ("-" for stdin)
    #[arg(long)]
    input: Option<String>,

    /// Use the built-in synthetic EOG generator instead of --input
    #[arg(long)]
    synthetic: bool,

    /// Exit after N seconds (live mode), or synthetic replay length.
    /// Rejected when replaying --input, which always runs to end of stream.
    #[arg(long)]
    exit_after: Option<u64>,

    /// Seconds between status log lines in live mode
    #[arg(long, default_value_t = 60)]
    status_interval: u64,

    /// Minimum interval between emitted actions (ms)
    #[arg(long, default_value_t = 1000)]
    cooldown_ms: u64,

    /// Action bound to a single blink (unbound by default)
    #[arg(long)]
    single_action: Option<String>,

    /// Action bound to a double blink ("none" to unbind)
    #[arg(long)]
    double_action: Option<String>,

    /// Action bound to a triple blink ("none" to unbind)
    #[arg(long)]
    triple_action: Option<String>,

    /// Sample rate override (Hz)
    #[arg(long)]
    sample_rate_hz: Option<u32>,

    /// Mains frequency override: 50 or 60
    #[arg(long)]
    mains_hz: Option<u32>,

    /// Blink band lower bound (exclusive)
    #[arg(long)]
    blink_lower: Option<f32>,

    /// Blink band upper bound (exclusive)
    #[arg(long)]
    blink_upper: Option<f32>,

    /// Minimum spacing between accepted blinks (ms)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Maximum gap between first and second blink (ms)
    #[arg(long)]
    double_blink_ms: Option<u64>,

    /// Maximum gap between second and third blink (ms)
    #[arg(long)]
    triple_blink_ms: Option<u64>,

    /// Sample queue capacity
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    /// Load the config file (if any) and apply flag overrides.
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.sample_rate_hz {
            config.sample_rate_hz = v;
        }
        if let Some(hz) = self.mains_hz {
            config.mains = MainsFrequency::from_hz(hz)
                .with_context(|| format!("--mains-hz must be 50 or 60, got {}", hz))?;
        }
        if let Some(v) = self.blink_lower {
            config.classifier.blink_lower = v;
        }
        if let Some(v) = self.blink_upper {
            config.classifier.blink_upper = v;
        }
        if let Some(v) = self.debounce_ms {
            config.classifier.debounce_ms = v;
        }
        if let Some(v) = self.double_blink_ms {
            config.classifier.double_blink_ms = v;
        }
        if let Some(v) = self.triple_blink_ms {
            config.classifier.triple_blink_ms = v;
        }
        if let Some(v) = self.queue_capacity {
            config.queue_capacity = v;
        }
        config.validate()?;
        Ok(config)
    }

    fn action_bindings(&self) -> ActionBindings {
        let mut bindings = ActionBindings::default();
        let overrides = [
            (BlinkPattern::Single, &self.single_action),
            (BlinkPattern::Double, &self.double_action),
            (BlinkPattern::Triple, &self.triple_action),
        ];
        for (pattern, action) in overrides {
            if let Some(name) = action {
                let action = (name != "none").then(|| name.clone());
                bindings.set(pattern, action);
            }
        }
        bindings
    }

    fn sample_source(&self, config: &PipelineConfig, live: bool) -> anyhow::Result<Box<dyn SampleSource>> {
        if self.synthetic {
            if self.input.is_some() {
                bail!("--synthetic and --input are mutually exclusive");
            }
            let duration_ms = match (live, self.exit_after) {
                (true, _) => None,
                (false, secs) => Some(secs.unwrap_or(DEFAULT_SYNTHETIC_SECS) * 1000),
            };
            info!("source: synthetic ({:?}ms)", duration_ms);
            let demo = SyntheticConfig::demo(
                config.sample_rate_hz,
                config.mains.as_hz() as f64,
                duration_ms,
            );
            return Ok(Box::new(SyntheticSource::new(demo)));
        }

        if !live && self.exit_after.is_some() {
            bail!("--exit-after has no effect when replaying --input; use --mode live or --synthetic");
        }

        match self.input.as_deref() {
            None | Some("-") => {
                info!("source: stdin");
                Ok(Box::new(ReplaySource::new(std::io::stdin().lock())))
            }
            Some(path) => {
                info!("source: {}", path);
                let file = File::open(path)
                    .with_context(|| format!("failed to open sample file {}", path))?;
                Ok(Box::new(ReplaySource::new(BufReader::new(file))))
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("eog-blink {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing (stderr; stdout carries events)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eog_blink=info".into()),
        )
        .init();

    let config = cli.pipeline_config()?;

    if cli.print_config {
        println!("{}", config.config_sexp());
        return Ok(());
    }

    info!("eog-blink v{} starting", env!("CARGO_PKG_VERSION"));
    info!("mode: {}", cli.mode);
    info!("config: {}", config.config_sexp());

    let live = match cli.mode.as_str() {
        "replay" => false,
        "live" => true,
        other => bail!("unknown mode: {other}. Use: replay or live"),
    };

    let mut source = cli.sample_source(&config, live)?;
    let bindings = cli.action_bindings();
    info!("bindings: {}", bindings.bindings_sexp());
    let mut sink = SexpSink::new(std::io::stdout().lock(), bindings, cli.cooldown_ms);

    if live {
        let options = LiveOptions {
            exit_after: cli.exit_after.map(Duration::from_secs),
            status_interval: Duration::from_secs(cli.status_interval.max(1)),
            max_catchup: config.queue_capacity,
        };
        runner::run_live(&config, source.as_mut(), &mut sink, options)?;
    } else {
        runner::run_replay(&config, source.as_mut(), &mut sink)?;
    }

    info!(
        "{} event(s) written, {} suppressed by the action cooldown",
        sink.written(),
        sink.suppressed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("eog-blink").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_exit_after_rejected_for_replayed_input() {
        let cli = cli(&["--input", "capture.txt", "--exit-after", "5"]);
        let Err(err) = cli.sample_source(&PipelineConfig::default(), false) else {
            panic!("--exit-after with replayed input should be rejected");
        };
        assert!(err.to_string().contains("--exit-after"), "unexpected error: {}", err);
    }

    #[test]
    fn test_exit_after_sets_synthetic_replay_length() {
        let cli = cli(&["--synthetic", "--exit-after", "1"]);
        let mut source = cli.sample_source(&PipelineConfig::default(), false).unwrap();
        let mut count = 0;
        while source.acquire().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 512);
    }

    #[test]
    fn test_action_overrides() {
        let bindings = cli(&["--single-action", "tab", "--triple-action", "none"]).action_bindings();
        assert_eq!(bindings.action_for(BlinkPattern::Single), Some("tab"));
        assert_eq!(bindings.action_for(BlinkPattern::Double), Some("space"));
        assert_eq!(bindings.action_for(BlinkPattern::Triple), None);
    }

    #[test]
    fn test_flag_overrides_and_validation() {
        let config = cli(&["--mains-hz", "60", "--blink-lower", "25.5"]).pipeline_config().unwrap();
        assert_eq!(config.mains, MainsFrequency::Hz60);
        assert_eq!(config.classifier.blink_lower, 25.5);
        assert!(cli(&["--mains-hz", "55"]).pipeline_config().is_err());
        assert!(cli(&["--blink-lower", "60"]).pipeline_config().is_err());
    }
}
