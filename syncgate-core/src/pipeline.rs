//! Ordered step pipelines.
//!
//! A workflow declares its steps as a fixed slice of a step enum and
//! executes them one at a time against its own state. The driver folds
//! over the slice: a fatal outcome stops the fold and becomes the result,
//! a soft outcome is logged and recorded as a [`StepWarning`], and the
//! workflow's output is produced only after the last step.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

/// Result of one step.
#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    /// Failed, but later steps still run.
    Soft(GatewayError),
    /// Failed; remaining steps are skipped.
    Fatal(GatewayError),
}

impl StepOutcome {
    /// Any error is fatal.
    pub fn fatal_on_err(result: GatewayResult<()>) -> Self {
        match result {
            Ok(()) => StepOutcome::Continue,
            Err(e) => StepOutcome::Fatal(e),
        }
    }

    /// Errors are fatal only when `strict` is set.
    pub fn tolerate(result: GatewayResult<()>, strict: bool) -> Self {
        match result {
            Ok(()) => StepOutcome::Continue,
            Err(e) if strict => StepOutcome::Fatal(e),
            Err(e) => StepOutcome::Soft(e),
        }
    }
}

/// A recorded soft failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepWarning {
    pub workflow: &'static str,
    pub step: &'static str,
    pub message: String,
}

impl fmt::Display for StepWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// A step identifier.
pub trait PipelineStep: Copy + fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
}

/// A workflow run by [`run`].
#[async_trait]
pub trait Workflow: Send {
    type Step: PipelineStep;
    type Output: Send;

    /// Workflow name used in logs and warnings.
    fn name(&self) -> &'static str;

    /// Steps in execution order.
    fn steps(&self) -> &'static [Self::Step];

    async fn run_step(&mut self, step: Self::Step) -> StepOutcome;

    /// Produces the output once every step has run.
    fn finish(self) -> GatewayResult<Self::Output>;
}

/// Output of a completed workflow plus any soft failures along the way.
#[derive(Debug)]
pub struct Completed<T> {
    pub output: T,
    pub warnings: Vec<StepWarning>,
}

impl<T> Completed<T> {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Runs `workflow` to completion or to its first fatal step.
pub async fn run<W: Workflow>(mut workflow: W) -> GatewayResult<Completed<W::Output>> {
    let mut warnings = Vec::new();
    let workflow_name = workflow.name();

    for &step in workflow.steps() {
        let name = step.name();
        debug!(workflow = workflow_name, step = name, "running step");

        match workflow.run_step(step).await {
            StepOutcome::Continue => {}
            StepOutcome::Soft(err) => {
                warn!(workflow = workflow_name, step = name, error = %err, "step failed, continuing");
                warnings.push(StepWarning {
                    workflow: workflow_name,
                    step: name,
                    message: err.to_string(),
                });
            }
            StepOutcome::Fatal(err) => {
                debug!(workflow = workflow_name, step = name, error = %err, "step failed, aborting");
                return Err(err);
            }
        }
    }

    let output = workflow.finish()?;
    Ok(Completed { output, warnings })
}
