use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::parameters::{ParamValue, Parameters};
use crate::step::StepOptions;

/// Hard ceiling on concurrently running files.
pub const MAX_PARALLELISM: usize = 64;

/// Run configuration. Built once per invocation; the planner and executor
/// only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// A file, a directory, or a `dir/pattern` glob.
    pub input: String,
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub recursive: bool,
    /// File-name glob applied during discovery.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub parameters: Parameters,
}

fn default_max_parallelism() -> usize {
    num_cpus::get().clamp(1, MAX_PARALLELISM)
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "*".to_string()
}

impl Options {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output_directory: None,
            max_parallelism: default_max_parallelism(),
            overwrite: false,
            continue_on_error: true,
            dry_run: false,
            recursive: false,
            filter: default_filter(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.set(key, value);
        self
    }

    /// The subset of options a step is allowed to see.
    pub fn step_options(&self) -> StepOptions {
        StepOptions {
            output_directory: self.output_directory.clone(),
            overwrite: self.overwrite,
            parameters: self.parameters.clone(),
        }
    }
}
