//! Dry-run planning: what a run would do, computed without touching any file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::config::{validate, Options, ValidationResult};
use crate::discovery::discover;
use crate::step::{OutputKind, Step, StepOptions};

pub const REASON_UNSUPPORTED: &str = "no step supports this file type";
pub const REASON_OUTPUT_EXISTS: &str = "output exists";
pub const REASON_DIRECTORY_NOT_LAST: &str =
    "directory output must be the last step in the chain";
/// Prefix of the skip reason given to a file whose output path is already
/// claimed by an earlier file in the same plan.
pub const REASON_OUTPUT_COLLIDES: &str = "output collides with";
pub const WARNING_NO_FILES: &str = "no files found";
pub const WARNING_NOTHING_TO_PROCESS: &str = "nothing to process: every file was skipped";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Process,
    Skip { reason: String },
}

/// What the executor will do with one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedOperation {
    pub input_path: PathBuf,
    /// Final location after every matching step; the input itself for
    /// files no step supports.
    pub output_path: PathBuf,
    pub action: PlannedAction,
    pub input_bytes: u64,
    /// The output exists and replacing it was authorized.
    pub overwrite: bool,
    /// Ids of the steps applied, in chain order.
    pub steps: Vec<String>,
}

impl PlannedOperation {
    pub fn is_process(&self) -> bool {
        self.action == PlannedAction::Process
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.action {
            PlannedAction::Skip { reason } => Some(reason),
            PlannedAction::Process => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub operations: Vec<PlannedOperation>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub options: Options,
}

impl Plan {
    fn rejected(options: &Options, errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            operations: Vec::new(),
            errors,
            warnings,
            options: options.clone(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn process_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_process()).count()
    }

    pub fn skip_count(&self) -> usize {
        self.operations.len() - self.process_count()
    }

    pub fn total_input_bytes(&self) -> u64 {
        self.operations.iter().map(|op| op.input_bytes).sum()
    }
}

/// Computes plans for a fixed, ordered chain of steps.
#[derive(Clone)]
pub struct Planner {
    steps: Vec<Arc<dyn Step>>,
}

impl Planner {
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    /// Builds a plan from `options` and the current filesystem state.
    pub fn plan(&self, options: &Options) -> Plan {
        let _span =
            info_span!("plan", input = %options.input, steps = self.steps.len()).entered();

        let (errors, mut warnings) = validate(options).into_parts();
        if !errors.is_empty() {
            warn!("Options rejected: {}", errors.join("; "));
            return Plan::rejected(options, errors, warnings);
        }

        let files = discover(options);

        let step_options = options.step_options();
        let (errors, step_warnings) = self.validate_steps(&step_options).into_parts();
        warnings.extend(step_warnings);
        if !errors.is_empty() {
            warn!("Step validation failed: {}", errors.join("; "));
            return Plan::rejected(options, errors, warnings);
        }

        let mut operations: Vec<PlannedOperation> = files
            .iter()
            .map(|file| self.plan_file(file, options, &step_options))
            .collect();

        let collisions = skip_colliding_outputs(&mut operations);
        if collisions > 0 {
            warnings.push(format!(
                "{} skipped: another file produces the same output",
                collisions
            ));
        }

        if operations.is_empty() {
            warnings.push(WARNING_NO_FILES.to_string());
        } else if operations.iter().all(|op| !op.is_process()) {
            warnings.push(WARNING_NOTHING_TO_PROCESS.to_string());
        }

        let plan = Plan {
            operations,
            errors: Vec::new(),
            warnings,
            options: options.clone(),
        };

        info!(
            "Planned {} files: {} to process, {} skipped",
            plan.operations.len(),
            plan.process_count(),
            plan.skip_count()
        );
        plan
    }

    fn validate_steps(&self, step_options: &StepOptions) -> ValidationResult {
        self.steps
            .iter()
            .fold(ValidationResult::valid(), |acc, step| {
                let (errors, warnings) = step.validate(step_options).into_parts();
                let mut prefixed = if errors.is_empty() {
                    ValidationResult::valid()
                } else {
                    ValidationResult::invalid(
                        errors
                            .into_iter()
                            .map(|e| format!("step '{}': {}", step.id(), e)),
                    )
                };
                for w in warnings {
                    prefixed = prefixed.with_warning(format!("step '{}': {}", step.id(), w));
                }
                acc.merge(prefixed)
            })
    }

    fn plan_file(
        &self,
        file: &Path,
        options: &Options,
        step_options: &StepOptions,
    ) -> PlannedOperation {
        let input_bytes = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        let matching: Vec<&Arc<dyn Step>> =
            self.steps.iter().filter(|s| s.supports(file)).collect();

        let skip = |output_path: PathBuf, steps: Vec<String>, reason: &str| PlannedOperation {
            input_path: file.to_path_buf(),
            output_path,
            action: PlannedAction::Skip {
                reason: reason.to_string(),
            },
            input_bytes,
            overwrite: false,
            steps,
        };

        if matching.is_empty() {
            debug!("No step supports {}", file.display());
            return skip(file.to_path_buf(), Vec::new(), REASON_UNSUPPORTED);
        }

        let step_ids: Vec<String> = matching.iter().map(|s| s.id().to_string()).collect();

        let mut output_path = file.to_path_buf();
        for step in &matching {
            output_path = step.derive_output_path(&output_path, step_options);
        }

        let last = matching.len() - 1;
        if matching[..last]
            .iter()
            .any(|s| s.output_kind() == OutputKind::Directory)
        {
            return skip(output_path, step_ids, REASON_DIRECTORY_NOT_LAST);
        }

        let mut overwrite = false;
        if output_path != file && output_path.exists() {
            if !options.overwrite {
                debug!("Output exists for {}", file.display());
                return skip(output_path, step_ids, REASON_OUTPUT_EXISTS);
            }
            overwrite = true;
        }

        PlannedOperation {
            input_path: file.to_path_buf(),
            output_path,
            action: PlannedAction::Process,
            input_bytes,
            overwrite,
            steps: step_ids,
        }
    }
}

/// Turns every process operation whose output path was already claimed by an
/// earlier one into a skip. Returns how many were skipped.
fn skip_colliding_outputs(operations: &mut [PlannedOperation]) -> usize {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut collisions = 0;

    for op in operations.iter_mut().filter(|op| op.is_process()) {
        match claimed.get(&op.output_path) {
            Some(first) => {
                debug!(
                    "Output {} of {} already claimed by {}",
                    op.output_path.display(),
                    op.input_path.display(),
                    first.display()
                );
                op.action = PlannedAction::Skip {
                    reason: format!("{} {}", REASON_OUTPUT_COLLIDES, first.display()),
                };
                op.overwrite = false;
                collisions += 1;
            }
            None => {
                claimed.insert(op.output_path.clone(), op.input_path.clone());
            }
        }
    }
    collisions
}
