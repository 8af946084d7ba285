use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, info_span, trace, warn};

use crate::cancel::CancellationToken;
use crate::error::{error_chain, panic_message};
use crate::plan::{REASON_DIRECTORY_NOT_LAST, REASON_UNSUPPORTED};
use crate::result::{Outcome, OutcomeKind, StepResult};
use crate::sanitize;
use crate::step::{OutputKind, Step, StepOptions, StepProgress};
use crate::storage::{ensure_directory, output_size, StagingArea};
use crate::worker::job::Job;

pub const MESSAGE_NO_OUTPUT: &str = "no output produced";

/// Runs the step chain of one file.
///
/// Every file-producing step writes into a fresh [`StagingArea`] beside the
/// final output. Intermediate outputs feed the next step and are discarded
/// with their area; only the last step's output is published.
pub struct ChainRunner {
    options: StepOptions,
    cancel: CancellationToken,
}

impl ChainRunner {
    pub fn new(options: StepOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn run(&self, job: &Job) -> StepResult {
        let started = Instant::now();
        let _span = info_span!("file",
            seq = job.sequence,
            file = %sanitize::redact_path(job.input_path()),
            steps = job.steps.len(),
        )
        .entered();

        let result = self.run_chain(job).with_elapsed(started.elapsed());

        match result.kind() {
            OutcomeKind::Succeeded => info!(
                bytes = result.output_bytes(),
                elapsed_ms = result.elapsed().as_millis() as u64,
                "File processed"
            ),
            OutcomeKind::Failed => warn!(
                error = result.message().unwrap_or_default(),
                "File failed"
            ),
            OutcomeKind::Skipped | OutcomeKind::Cancelled => debug!(
                outcome = %result.kind(),
                reason = result.message().unwrap_or_default(),
                "File not completed"
            ),
        }
        result
    }

    fn run_chain(&self, job: &Job) -> StepResult {
        let op = &job.operation;
        let input = op.input_path.as_path();

        let input_bytes = match std::fs::metadata(input) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return StepResult::failed(input, "input is no longer a regular file"),
            Err(e) => {
                return StepResult::failed(input, "input file is no longer readable")
                    .with_detail(e.to_string())
            }
        };

        let Some((final_step, leading)) = job.steps.split_last() else {
            return StepResult::skipped(input, REASON_UNSUPPORTED).with_input_bytes(input_bytes);
        };

        let mut current = input.to_path_buf();
        let mut derived = input.to_path_buf();
        // Keeps the previous step's output alive until the next step has read it.
        let mut held: Option<StagingArea> = None;

        for step in leading {
            if let Some(stopped) = self.check_cancelled(step.as_ref(), input, input_bytes) {
                return stopped;
            }
            if step.output_kind() == OutputKind::Directory {
                let message = format!("step '{}': {}", step.id(), REASON_DIRECTORY_NOT_LAST);
                return StepResult::failed(input, message).with_input_bytes(input_bytes);
            }

            let _step_span = info_span!("step", id = step.id()).entered();
            derived = step.derive_output_path(&derived, &self.options);

            let area = match StagingArea::beside(&op.output_path) {
                Ok(area) => area,
                Err(e) => return storage_failure(input, input_bytes, &e),
            };
            let staged = area.file_for(&derived);

            let result = self.invoke(step.as_ref(), &current, &staged);
            if let Some(stopped) = halt(step.as_ref(), result, input, input_bytes) {
                return stopped;
            }
            if !staged.exists() {
                debug!(step = step.id(), "Intermediate step produced no output");
                return StepResult::succeeded(input, &op.output_path, input_bytes, 0)
                    .with_message(MESSAGE_NO_OUTPUT);
            }

            current = staged;
            held = Some(area);
        }

        if let Some(stopped) = self.check_cancelled(final_step.as_ref(), input, input_bytes) {
            return stopped;
        }

        let _step_span = info_span!("step", id = final_step.id()).entered();
        let result = match final_step.output_kind() {
            OutputKind::File => {
                self.finish_file(final_step.as_ref(), &current, job, input_bytes)
            }
            OutputKind::Directory => {
                self.finish_directory(final_step.as_ref(), &current, job, input_bytes)
            }
        };
        drop(held);
        result
    }

    fn finish_file(
        &self,
        step: &dyn Step,
        current: &Path,
        job: &Job,
        input_bytes: u64,
    ) -> StepResult {
        let op = &job.operation;
        let input = op.input_path.as_path();

        let area = match StagingArea::beside(&op.output_path) {
            Ok(area) => area,
            Err(e) => return storage_failure(input, input_bytes, &e),
        };
        let staged = area.file_for(&op.output_path);

        let result = self.invoke(step, current, &staged);
        if let Some(stopped) = halt(step, result, input, input_bytes) {
            return stopped;
        }
        if !staged.exists() {
            return StepResult::succeeded(input, &op.output_path, input_bytes, 0)
                .with_message(MESSAGE_NO_OUTPUT);
        }

        let replace = op.overwrite || op.output_path == op.input_path;
        match area.publish(&staged, &op.output_path, replace) {
            Ok(bytes) => StepResult::succeeded(input, &op.output_path, input_bytes, bytes),
            Err(e) => storage_failure(input, input_bytes, &e),
        }
    }

    /// Directory outputs are written in place; a failure part-way may leave
    /// some files behind.
    fn finish_directory(
        &self,
        step: &dyn Step,
        current: &Path,
        job: &Job,
        input_bytes: u64,
    ) -> StepResult {
        let op = &job.operation;
        let input = op.input_path.as_path();

        if let Some(parent) = op.output_path.parent() {
            if let Err(e) = ensure_directory(parent) {
                return storage_failure(input, input_bytes, &e);
            }
        }

        let result = self.invoke(step, current, &op.output_path);
        if let Some(stopped) = halt(step, result, input, input_bytes) {
            return stopped;
        }

        match output_size(&op.output_path) {
            Some(bytes) => StepResult::succeeded(input, &op.output_path, input_bytes, bytes),
            None => StepResult::succeeded(input, &op.output_path, input_bytes, 0)
                .with_message(MESSAGE_NO_OUTPUT),
        }
    }

    fn check_cancelled(
        &self,
        next: &dyn Step,
        input: &Path,
        input_bytes: u64,
    ) -> Option<StepResult> {
        if !self.cancel.is_cancelled() {
            return None;
        }
        Some(
            StepResult::cancelled(input)
                .with_message(format!("cancelled before step '{}'", next.id()))
                .with_input_bytes(input_bytes),
        )
    }

    /// Calls the step, turning a panic into a failed result.
    fn invoke(&self, step: &dyn Step, input: &Path, output: &Path) -> StepResult {
        let id = step.id();
        let report: StepProgress<'_> = &|fraction: f32| {
            trace!(step = id, fraction = f64::from(fraction), "Step progress");
        };

        panic::catch_unwind(AssertUnwindSafe(|| {
            step.execute(input, output, &self.options, Some(report), &self.cancel)
        }))
        .unwrap_or_else(|payload| {
            let detail = panic_message(payload.as_ref());
            warn!(step = id, panic = %detail, "Step panicked");
            StepResult::failed(input, "panicked").with_detail(detail)
        })
    }
}

/// Maps a step result onto the file's outcome. `None` means the step
/// succeeded and the chain continues.
fn halt(step: &dyn Step, result: StepResult, input: &Path, input_bytes: u64) -> Option<StepResult> {
    let id = step.id();
    let stopped = match result.into_outcome() {
        Outcome::Succeeded { .. } => return None,
        Outcome::Failed { message, detail } => {
            let failed = StepResult::failed(input, format!("step '{}': {}", id, message));
            match detail {
                Some(detail) => failed.with_detail(detail),
                None => failed,
            }
        }
        Outcome::Skipped { reason } => {
            StepResult::skipped(input, format!("step '{}': {}", id, reason))
        }
        Outcome::Cancelled { message } => StepResult::cancelled(input)
            .with_message(message.unwrap_or_else(|| format!("cancelled during step '{}'", id))),
    };
    Some(stopped.with_input_bytes(input_bytes))
}

fn storage_failure(input: &Path, input_bytes: u64, err: &crate::error::StorageError) -> StepResult {
    StepResult::failed(input, err.to_string())
        .with_detail(error_chain(err))
        .with_input_bytes(input_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationResult;
    use crate::plan::{PlannedAction, PlannedOperation};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behavior {
        Upper,
        Fail,
        Panic,
        Nothing,
        Skip,
    }

    struct TestStep {
        id: &'static str,
        suffix: &'static str,
        behavior: Behavior,
        exts: Vec<String>,
    }

    impl TestStep {
        fn new(id: &'static str, suffix: &'static str, behavior: Behavior) -> Arc<dyn Step> {
            Arc::new(Self {
                id,
                suffix,
                behavior,
                exts: vec!["*".to_string()],
            })
        }
    }

    impl Step for TestStep {
        fn id(&self) -> &str {
            self.id
        }

        fn supported_extensions(&self) -> &[String] {
            &self.exts
        }

        fn validate(&self, _options: &StepOptions) -> ValidationResult {
            ValidationResult::valid()
        }

        fn derive_output_path(&self, input: &Path, options: &StepOptions) -> PathBuf {
            let stem = input.file_stem().unwrap().to_string_lossy();
            options
                .output_dir_for(input)
                .join(format!("{}{}.txt", stem, self.suffix))
        }

        fn execute(
            &self,
            input: &Path,
            output: &Path,
            _options: &StepOptions,
            progress: Option<StepProgress<'_>>,
            _cancel: &CancellationToken,
        ) -> StepResult {
            match self.behavior {
                Behavior::Upper => {
                    let text = std::fs::read_to_string(input).unwrap();
                    std::fs::write(output, text.to_uppercase()).unwrap();
                    if let Some(report) = progress {
                        report(1.0);
                    }
                    StepResult::succeeded(input, output, 0, 0)
                }
                Behavior::Fail => {
                    std::fs::write(output, b"partial").unwrap();
                    StepResult::failed(input, "bad input").with_detail("line 3")
                }
                Behavior::Panic => {
                    std::fs::write(output, b"partial").unwrap();
                    panic!("kaboom")
                }
                Behavior::Nothing => StepResult::succeeded(input, output, 0, 0),
                Behavior::Skip => StepResult::skipped(input, "not interesting"),
            }
        }
    }

    fn job(input: &Path, output: PathBuf, steps: Vec<Arc<dyn Step>>) -> Job {
        Job {
            sequence: 0,
            operation: PlannedOperation {
                input_path: input.to_path_buf(),
                output_path: output,
                action: PlannedAction::Process,
                input_bytes: 0,
                overwrite: false,
                steps: steps.iter().map(|s| s.id().to_string()).collect(),
            },
            steps,
        }
    }

    fn runner(out: &Path) -> ChainRunner {
        ChainRunner::new(
            StepOptions {
                output_directory: Some(out.to_path_buf()),
                ..StepOptions::default()
            },
            CancellationToken::new(),
        )
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.txt");
        std::fs::write(&input, "hello").unwrap();
        let out = tmp.path().join("out");
        (tmp, input, out)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|rd| {
                rd.map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn test_single_step_publishes_output() {
        let (_tmp, input, out) = setup();
        let result = runner(&out).run(&job(
            &input,
            out.join("a_u.txt"),
            vec![TestStep::new("upper", "_u", Behavior::Upper)],
        ));

        assert!(result.is_success(), "{:?}", result);
        assert_eq!(result.input_bytes(), 5);
        assert_eq!(result.output_bytes(), 5);
        assert_eq!(std::fs::read_to_string(out.join("a_u.txt")).unwrap(), "HELLO");
        assert_eq!(entries(&out), vec!["a_u.txt"]);
    }

    #[test]
    fn test_chain_feeds_intermediate_outputs_and_cleans_them() {
        let (_tmp, input, out) = setup();
        let steps = vec![
            TestStep::new("first", "_1", Behavior::Upper),
            TestStep::new("second", "_2", Behavior::Upper),
        ];
        let result = runner(&out).run(&job(&input, out.join("a_1_2.txt"), steps));

        assert!(result.is_success());
        assert_eq!(entries(&out), vec!["a_1_2.txt"]);
    }

    #[test]
    fn test_failure_is_prefixed_and_leaves_nothing() {
        let (_tmp, input, out) = setup();
        let steps = vec![
            TestStep::new("first", "_1", Behavior::Upper),
            TestStep::new("broken", "_2", Behavior::Fail),
        ];
        let result = runner(&out).run(&job(&input, out.join("a_1_2.txt"), steps));

        assert_eq!(result.kind(), OutcomeKind::Failed);
        assert_eq!(result.message(), Some("step 'broken': bad input"));
        assert_eq!(result.detail(), Some("line 3"));
        assert!(entries(&out).is_empty());
    }

    #[test]
    fn test_panic_becomes_failure() {
        let (_tmp, input, out) = setup();
        let result = runner(&out).run(&job(
            &input,
            out.join("a_p.txt"),
            vec![TestStep::new("explode", "_p", Behavior::Panic)],
        ));

        assert_eq!(result.kind(), OutcomeKind::Failed);
        assert_eq!(result.message(), Some("step 'explode': panicked"));
        assert_eq!(result.detail(), Some("kaboom"));
        assert!(entries(&out).is_empty());
    }

    #[test]
    fn test_no_output_is_success_with_zero_bytes() {
        let (_tmp, input, out) = setup();
        let result = runner(&out).run(&job(
            &input,
            out.join("a_n.txt"),
            vec![TestStep::new("nothing", "_n", Behavior::Nothing)],
        ));

        assert!(result.is_success());
        assert_eq!(result.output_bytes(), 0);
        assert_eq!(result.message(), Some(MESSAGE_NO_OUTPUT));
        assert!(!out.join("a_n.txt").exists());
    }

    #[test]
    fn test_step_skip_stops_chain() {
        let (_tmp, input, out) = setup();
        let result = runner(&out).run(&job(
            &input,
            out.join("a_s.txt"),
            vec![TestStep::new("picky", "_s", Behavior::Skip)],
        ));

        assert_eq!(result.kind(), OutcomeKind::Skipped);
        assert_eq!(result.message(), Some("step 'picky': not interesting"));
    }

    #[test]
    fn test_cancelled_before_first_step() {
        let (_tmp, input, out) = setup();
        let runner = runner(&out);
        runner.cancel_token().cancel();

        let result = runner.run(&job(
            &input,
            out.join("a_u.txt"),
            vec![TestStep::new("upper", "_u", Behavior::Upper)],
        ));

        assert_eq!(result.kind(), OutcomeKind::Cancelled);
        assert!(!out.join("a_u.txt").exists());
    }

    #[test]
    fn test_vanished_input_fails() {
        let (_tmp, input, out) = setup();
        std::fs::remove_file(&input).unwrap();

        let result = runner(&out).run(&job(
            &input,
            out.join("a_u.txt"),
            vec![TestStep::new("upper", "_u", Behavior::Upper)],
        ));

        assert_eq!(result.kind(), OutcomeKind::Failed);
        assert_eq!(result.message(), Some("input file is no longer readable"));
    }

    #[test]
    fn test_existing_output_not_replaced_without_authorization() {
        let (_tmp, input, out) = setup();
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("a_u.txt"), "keep").unwrap();

        let result = runner(&out).run(&job(
            &input,
            out.join("a_u.txt"),
            vec![TestStep::new("upper", "_u", Behavior::Upper)],
        ));

        assert_eq!(result.kind(), OutcomeKind::Failed);
        assert_eq!(std::fs::read_to_string(out.join("a_u.txt")).unwrap(), "keep");
        assert_eq!(entries(&out), vec!["a_u.txt"]);
    }
}
