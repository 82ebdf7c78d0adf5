//! eog-blink — real-time EOG blink detector.
//!
//! Raw electrode samples pass through a mains notch and a baseline
//! high-pass (`dsp`), are queued (`queue`), reduced to a rectified
//! moving-average envelope, and classified into double and triple blink
//! patterns (`classifier`).  `pipeline` owns one of each; `runner` drives a
//! pipeline from a `source` into a `sink`.

pub mod classifier;
pub mod config;
pub mod dsp;
pub mod pipeline;
pub mod queue;
pub mod runner;
pub mod sexp;
pub mod sink;
pub mod source;

pub use classifier::{BlinkClassifier, BlinkPattern, ClassifierConfig, SequenceState};
pub use config::PipelineConfig;
pub use pipeline::Pipeline;
