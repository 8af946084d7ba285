use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::plan::PlannedOperation;
use crate::step::Step;

/// One planned file handed to a worker, together with the resolved chain of
/// steps that apply to it.
#[derive(Clone)]
pub struct Job {
    /// Position in the plan, used only for log correlation.
    pub sequence: usize,
    pub operation: PlannedOperation,
    pub steps: Vec<Arc<dyn Step>>,
}

impl Job {
    /// Picks the steps of `registry` that support the operation's input,
    /// in registration order. This is the same selection the planner made.
    pub fn resolve(
        sequence: usize,
        operation: PlannedOperation,
        registry: &[Arc<dyn Step>],
    ) -> Self {
        let steps = registry
            .iter()
            .filter(|s| s.supports(&operation.input_path))
            .cloned()
            .collect();

        Self {
            sequence,
            operation,
            steps,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.operation.input_path
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("sequence", &self.sequence)
            .field("input", &self.operation.input_path)
            .field("output", &self.operation.output_path)
            .field("steps", &self.operation.steps)
            .finish()
    }
}
