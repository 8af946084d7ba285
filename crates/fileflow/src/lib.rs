pub mod cancel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod result;
pub mod sanitize;
pub mod step;
pub mod steps;
pub mod storage;
pub mod worker;

pub use cancel::CancellationToken;
pub use config::{load_options, Options, ParamValue, Parameters, ValidationResult};
pub use error::{ConfigError, FlowError, Result, StepError, StorageError, WorkerError};
pub use executor::Executor;
pub use logging::LogFormat;
pub use plan::{Plan, PlannedAction, PlannedOperation, Planner};
pub use progress::{BroadcastProgress, NoopProgress, ProgressSink, ProgressUpdate};
pub use result::{Outcome, OutcomeKind, PipelineResult, StepResult};
pub use step::{OutputKind, Step, StepOptions, StepProgress};
pub use steps::{CopyStep, UnzipStep, ZipStep};
