//! Per-file outcomes and the aggregate returned by a run.
//!
//! Counts and byte totals on [`PipelineResult`] are computed from the result
//! list every time they are asked for, so they cannot disagree with it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Reason attached to queued files that never started because the run was
/// cancelled.
pub const CANCELLED_REASON: &str = "Cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Succeeded => write!(f, "Succeeded"),
            OutcomeKind::Failed => write!(f, "Failed"),
            OutcomeKind::Skipped => write!(f, "Skipped"),
            OutcomeKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What happened to one file. Each variant carries exactly the data that
/// outcome requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        output_path: PathBuf,
        output_bytes: u64,
        message: Option<String>,
    },
    Failed {
        message: String,
        detail: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Cancelled {
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    input_path: PathBuf,
    input_bytes: u64,
    elapsed: Duration,
    #[serde(flatten)]
    outcome: Outcome,
}

impl StepResult {
    pub fn succeeded(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        input_bytes: u64,
        output_bytes: u64,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            input_bytes,
            elapsed: Duration::ZERO,
            outcome: Outcome::Succeeded {
                output_path: output_path.into(),
                output_bytes,
                message: None,
            },
        }
    }

    pub fn failed(input_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            input_bytes: 0,
            elapsed: Duration::ZERO,
            outcome: Outcome::Failed {
                message: message.into(),
                detail: None,
            },
        }
    }

    pub fn skipped(input_path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            input_bytes: 0,
            elapsed: Duration::ZERO,
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn cancelled(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            input_bytes: 0,
            elapsed: Duration::ZERO,
            outcome: Outcome::Cancelled { message: None },
        }
    }

    /// Attaches a captured failure detail. No effect on other outcomes.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        if let Outcome::Failed { detail: slot, .. } = &mut self.outcome {
            *slot = Some(detail.into());
        }
        self
    }

    /// Attaches a human message to a succeeded or cancelled result.
    /// Failed and skipped results already carry their mandatory text.
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        match &mut self.outcome {
            Outcome::Succeeded { message, .. } | Outcome::Cancelled { message } => {
                *message = Some(text.into());
            }
            Outcome::Failed { .. } | Outcome::Skipped { .. } => {}
        }
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_input_bytes(mut self, input_bytes: u64) -> Self {
        self.input_bytes = input_bytes;
        self
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn input_bytes(&self) -> u64 {
        self.input_bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    pub fn kind(&self) -> OutcomeKind {
        match self.outcome {
            Outcome::Succeeded { .. } => OutcomeKind::Succeeded,
            Outcome::Failed { .. } => OutcomeKind::Failed,
            Outcome::Skipped { .. } => OutcomeKind::Skipped,
            Outcome::Cancelled { .. } => OutcomeKind::Cancelled,
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        match &self.outcome {
            Outcome::Succeeded { output_path, .. } => Some(output_path),
            _ => None,
        }
    }

    pub fn output_bytes(&self) -> u64 {
        match self.outcome {
            Outcome::Succeeded { output_bytes, .. } => output_bytes,
            _ => 0,
        }
    }

    /// The failure message, skip reason, or optional success/cancel note.
    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Succeeded { message, .. } | Outcome::Cancelled { message } => {
                message.as_deref()
            }
            Outcome::Failed { message, .. } => Some(message),
            Outcome::Skipped { reason } => Some(reason),
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failed { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind() == OutcomeKind::Succeeded
    }
}

/// Terminal summary of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    results: Vec<StepResult>,
    duration: Duration,
    was_cancelled: bool,
    started_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn new(
        results: Vec<StepResult>,
        duration: Duration,
        was_cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            results,
            duration,
            was_cancelled,
            started_at,
        }
    }

    /// No results, zero duration. Returned for dry runs and invalid plans.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::ZERO, false, Utc::now())
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn was_cancelled(&self) -> bool {
        self.was_cancelled
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn count(&self, kind: OutcomeKind) -> usize {
        self.results.iter().filter(|r| r.kind() == kind).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(OutcomeKind::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(OutcomeKind::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(OutcomeKind::Skipped)
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(OutcomeKind::Cancelled)
    }

    pub fn total_input_bytes(&self) -> u64 {
        self.results.iter().map(StepResult::input_bytes).sum()
    }

    pub fn total_output_bytes(&self) -> u64 {
        self.results.iter().map(StepResult::output_bytes).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results
            .iter()
            .filter(|r| r.kind() == OutcomeKind::Failed)
    }

    /// Nothing failed and the run was not cut short.
    pub fn is_success(&self) -> bool {
        !self.was_cancelled && self.failed_count() == 0
    }

    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} succeeded, {} failed, {} skipped, {} cancelled in {:.2}s",
            self.succeeded_count(),
            self.failed_count(),
            self.skipped_count(),
            self.cancelled_count(),
            self.duration.as_secs_f64()
        );
        if self.was_cancelled {
            line.push_str(" (run cancelled)");
        }
        line
    }
}
