//! Scripted steps for driving the executor through specific paths.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fileflow::config::ValidationResult;
use fileflow::{CancellationToken, Step, StepOptions, StepProgress, StepResult};

/// What a [`ScriptedStep`] does when executed.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Copies the input to the output.
    Copy,
    /// Sleeps, then copies. Ignores cancellation while sleeping.
    SleepThenCopy(Duration),
    /// Writes half an output, then reports failure.
    FailAfterPartialWrite,
    /// Writes half an output, then panics.
    PanicAfterPartialWrite,
    /// Reports success without writing anything.
    NoOutput,
}

/// Test step appending `suffix` to the file stem, keeping the extension.
pub struct ScriptedStep {
    id: String,
    extensions: Vec<String>,
    suffix: String,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedStep {
    pub fn new(id: &str, extensions: &[&str], script: Script) -> Self {
        Self {
            id: id.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            suffix: format!("_{}", id),
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn shared(id: &str, extensions: &[&str], script: Script) -> Arc<Self> {
        Arc::new(Self::new(id, extensions, script))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Step for ScriptedStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn validate(&self, _options: &StepOptions) -> ValidationResult {
        ValidationResult::valid()
    }

    fn derive_output_path(&self, input: &Path, options: &StepOptions) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        options
            .output_dir_for(input)
            .join(format!("{}{}{}", stem, self.suffix, ext))
    }

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        _options: &StepOptions,
        _progress: Option<StepProgress<'_>>,
        _cancel: &CancellationToken,
    ) -> StepResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = match std::fs::read(input) {
            Ok(data) => data,
            Err(e) => return StepResult::failed(input, e.to_string()),
        };

        match self.script {
            Script::Copy => write_all(input, output, &data),
            Script::SleepThenCopy(delay) => {
                std::thread::sleep(delay);
                write_all(input, output, &data)
            }
            Script::FailAfterPartialWrite => {
                let _ = std::fs::write(output, &data[..data.len() / 2]);
                StepResult::failed(input, "simulated failure").with_detail("disk on fire")
            }
            Script::PanicAfterPartialWrite => {
                let _ = std::fs::write(output, &data[..data.len() / 2]);
                panic!("simulated panic in {}", self.id);
            }
            Script::NoOutput => StepResult::succeeded(input, output, 0, 0),
        }
    }
}

fn write_all(input: &Path, output: &Path, data: &[u8]) -> StepResult {
    match std::fs::write(output, data) {
        Ok(()) => StepResult::succeeded(input, output, data.len() as u64, data.len() as u64),
        Err(e) => StepResult::failed(input, e.to_string()),
    }
}

/// Upcasts for `Executor::new`.
pub fn chain(steps: &[&Arc<ScriptedStep>]) -> Vec<Arc<dyn Step>> {
    steps
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn Step>)
        .collect()
}
