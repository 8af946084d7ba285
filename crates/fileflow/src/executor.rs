//! Runs a plan on a pool of workers and aggregates what comes back.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, info_span, warn};

use crate::cancel::CancellationToken;
use crate::config::Options;
use crate::error::panic_message;
use crate::pipeline::ChainRunner;
use crate::plan::{Plan, PlannedAction, PlannedOperation, Planner};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::result::{OutcomeKind, PipelineResult, StepResult, CANCELLED_REASON};
use crate::step::Step;
use crate::worker::{Job, WorkerPool};

/// Plans and executes runs for a fixed chain of steps.
///
/// Steps are applied to a file in registration order, restricted to those
/// that support it. One `Executor` can serve any number of runs.
#[derive(Clone)]
pub struct Executor {
    planner: Planner,
}

impl Executor {
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self {
            planner: Planner::new(steps),
        }
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        self.planner.steps()
    }

    /// What [`Executor::execute`] would do, without touching the filesystem.
    pub fn plan(&self, options: &Options) -> Plan {
        self.planner.plan(options)
    }

    /// Plans afresh and runs every `Process` operation.
    ///
    /// Returns [`PipelineResult::empty`] for a dry run or when the options
    /// are rejected; call [`Executor::plan`] to see why. Never fails as a
    /// whole: every per-file problem ends up in that file's result.
    pub fn execute(
        &self,
        options: &Options,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&CancellationToken>,
    ) -> PipelineResult {
        let plan = self.planner.plan(options);
        if !plan.is_valid() {
            warn!(errors = %plan.errors.join("; "), "Plan rejected, nothing executed");
            return PipelineResult::empty();
        }
        if options.dry_run {
            info!(
                operations = plan.operations.len(),
                "Dry run, nothing executed"
            );
            return PipelineResult::empty();
        }

        let cancel = cancel.cloned().unwrap_or_default();
        let started_at = Utc::now();
        let clock = Instant::now();
        let _span = info_span!("execute", files = plan.operations.len()).entered();

        let total = plan.operations.len();
        let (process, skipped): (Vec<_>, Vec<_>) = plan
            .operations
            .into_iter()
            .partition(PlannedOperation::is_process);

        let mut aggregator = Aggregator::new(total, progress, options.continue_on_error);

        if !process.is_empty() {
            self.run_pool(process, options, &cancel, &mut aggregator);
        }

        for op in skipped {
            let reason = match op.action {
                PlannedAction::Skip { reason } => reason,
                PlannedAction::Process => continue,
            };
            aggregator.record(
                StepResult::skipped(op.input_path, reason).with_input_bytes(op.input_bytes),
            );
        }

        let was_cancelled = aggregator.saw_cancellation();
        let result = PipelineResult::new(
            aggregator.into_results(),
            clock.elapsed(),
            was_cancelled,
            started_at,
        );
        info!("{}", result.summary_line());
        result
    }

    fn run_pool(
        &self,
        operations: Vec<PlannedOperation>,
        options: &Options,
        cancel: &CancellationToken,
        aggregator: &mut Aggregator<'_>,
    ) {
        let worker_count = options.max_parallelism.min(operations.len()).max(1);
        let runner = Arc::new(ChainRunner::new(options.step_options(), cancel.clone()));

        let mut pool = match WorkerPool::new(runner, worker_count) {
            Ok(pool) => pool,
            Err(e) => {
                error!(error = %e, "Could not start workers");
                for op in operations {
                    aggregator.record(
                        StepResult::failed(op.input_path, e.to_string())
                            .with_input_bytes(op.input_bytes),
                    );
                }
                return;
            }
        };

        for (sequence, op) in operations.into_iter().enumerate() {
            let job = Job::resolve(sequence, op, self.planner.steps());
            let input = job.operation.input_path.clone();
            let input_bytes = job.operation.input_bytes;
            if let Err(e) = pool.submit(job) {
                error!(error = %e, "Could not queue file");
                aggregator.record(
                    StepResult::failed(input, e.to_string()).with_input_bytes(input_bytes),
                );
            }
        }
        pool.close();

        while let Some(result) = pool.recv_result() {
            aggregator.record(result);
        }
        pool.wait();
    }
}

/// Owns the result list and the completion counter for one run. Lives on
/// the calling thread only.
struct Aggregator<'a> {
    results: Vec<StepResult>,
    total: usize,
    sink: Option<&'a dyn ProgressSink>,
    continue_on_error: bool,
    failure_seen: bool,
    cancellation_seen: bool,
}

impl<'a> Aggregator<'a> {
    fn new(total: usize, sink: Option<&'a dyn ProgressSink>, continue_on_error: bool) -> Self {
        Self {
            results: Vec::with_capacity(total),
            total,
            sink,
            continue_on_error,
            failure_seen: false,
            cancellation_seen: false,
        }
    }

    fn record(&mut self, result: StepResult) {
        if result.kind() == OutcomeKind::Failed && !self.failure_seen {
            self.failure_seen = true;
            if !self.continue_on_error {
                warn!(
                    file = %result.input_path().display(),
                    "First failure with continue_on_error=false; \
                     remaining files are still attempted"
                );
            }
        }

        if result.kind() == OutcomeKind::Cancelled
            || (result.kind() == OutcomeKind::Skipped && result.message() == Some(CANCELLED_REASON))
        {
            self.cancellation_seen = true;
        }

        let update = ProgressUpdate {
            completed: self.results.len() + 1,
            total: self.total,
            current_file: result.input_path().to_path_buf(),
            outcome: result.kind(),
        };
        self.results.push(result);

        if let Some(sink) = self.sink {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.report(&update))) {
                warn!(panic = %panic_message(payload.as_ref()), "Progress sink panicked");
            }
        }
    }

    /// Whether any file was stopped by cancellation. A token cancelled after
    /// the last file finished does not count.
    fn saw_cancellation(&self) -> bool {
        self.cancellation_seen
    }

    fn into_results(self) -> Vec<StepResult> {
        self.results
    }
}
