//! Workflow engine for executing steps.

use crate::step::{Step, StepOutcome};
use marx_core::{Abort, Context, Value, WorkflowError};
use std::fmt;
use std::ops::Add;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handles an error raised by a step. Its return value is the run's result.
pub type ErrorHandler =
    Arc<dyn Fn(WorkflowError, &mut Context) -> Result<RunOutput, WorkflowError> + Send + Sync>;

/// Handles an abort raised by a step. Its return value is the run's result.
pub type AbortHandler =
    Arc<dyn Fn(&mut Context, Abort) -> Result<RunOutput, WorkflowError> + Send + Sync>;

/// Observes every reply made on the context during a run.
pub type ReplyHandler = marx_core::ReplyHook;

/// What a workflow run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// The context passed to [`Workflow::execute`], now holding the run's
    /// effects.
    Context,
    /// A value a handler returned in place of the context.
    Value(Value),
}

impl RunOutput {
    pub fn is_context(&self) -> bool {
        matches!(self, RunOutput::Context)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            RunOutput::Value(value) => Some(value),
            RunOutput::Context => None,
        }
    }
}

fn default_on_error(error: WorkflowError, _ctx: &mut Context) -> Result<RunOutput, WorkflowError> {
    Err(error)
}

fn default_on_abort(_ctx: &mut Context, _abort: Abort) -> Result<RunOutput, WorkflowError> {
    Ok(RunOutput::Context)
}

fn default_on_reply(_reply: &Value, _ctx: &Context) {}

/// An ordered sequence of steps run against one context.
///
/// Steps run one at a time, in order. A skipped step moves the run on; an
/// abort or an error stops it and hands control to the matching handler.
/// The default abort handler returns the context, the default error handler
/// returns the original error, and the default reply handler does nothing.
///
/// # Examples
///
/// ```
/// use marx::prelude::*;
///
/// # tokio_test::block_on(async {
/// let greet = Step::builder(FnCallable::with_context("greet", |ctx, _kwargs| {
///     ctx.reply("hello");
///     Ok(Value::Null)
/// }));
///
/// let workflow = Workflow::builder().name("greeting").step(greet).build();
///
/// let mut ctx = Context::new();
/// let output = workflow.execute(&mut ctx).await.expect("workflow failed");
/// assert!(output.is_context());
/// assert_eq!(ctx.replies(), vec![Value::from("hello")]);
/// # });
/// ```
#[derive(Clone)]
pub struct Workflow {
    name: Option<String>,
    steps: Vec<Step>,
    on_error: ErrorHandler,
    on_abort: AbortHandler,
    on_reply: ReplyHandler,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(Step::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
            on_error: Arc::new(default_on_error),
            on_abort: Arc::new(default_on_abort),
            on_reply: Arc::new(default_on_reply),
        }
    }
}

impl Workflow {
    /// Creates a workflow with the default handlers.
    pub fn new<S: Into<Step>>(steps: impl IntoIterator<Item = S>) -> Self {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Creates a new workflow builder.
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Mutable access to this workflow's own step list.
    pub fn steps_mut(&mut self) -> &mut Vec<Step> {
        &mut self.steps
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Appends a step.
    pub fn add_step(&mut self, step: impl Into<Step>) -> &mut Self {
        self.steps.push(step.into());
        self
    }

    /// Returns a new workflow running this workflow's steps followed by
    /// `other`'s, with this workflow's name and handlers.
    ///
    /// Neither operand is changed. `+` does the same.
    pub fn combine(&self, other: impl IntoSteps) -> Workflow {
        let mut combined = self.clone();
        combined.steps.extend(other.into_steps());
        combined
    }

    /// Runs every step against `ctx`.
    ///
    /// Returns [`RunOutput::Context`] on completion; after an abort or an
    /// error, returns whatever the corresponding handler returns.
    pub async fn execute(&self, ctx: &mut Context) -> Result<RunOutput, WorkflowError> {
        ctx.bind_workflow(self.name.as_deref(), Arc::clone(&self.on_reply));
        let label = self.name.as_deref().unwrap_or("workflow");
        info!("Workflow '{}' started with {} steps", label, self.steps.len());

        for step in &self.steps {
            match step.execute(ctx).await {
                StepOutcome::Continue => {}
                StepOutcome::Skip => {
                    debug!("Step '{}' skipped", step.name());
                }
                StepOutcome::Abort(abort) => {
                    info!("Workflow '{}' {} at step '{}'", label, abort, step.name());
                    return (self.on_abort)(ctx, abort);
                }
                StepOutcome::Error(e) => {
                    warn!("Step '{}' failed: {}", step.name(), e);
                    return (self.on_error)(e, ctx);
                }
            }
        }

        info!("Workflow '{}' completed in {:?}", label, ctx.elapsed());
        Ok(RunOutput::Context)
    }
}

/// Anything that can be appended to a workflow: a step or another
/// workflow's step list.
pub trait IntoSteps {
    fn into_steps(self) -> Vec<Step>;
}

impl IntoSteps for Step {
    fn into_steps(self) -> Vec<Step> {
        vec![self]
    }
}

impl IntoSteps for &Step {
    fn into_steps(self) -> Vec<Step> {
        vec![self.clone()]
    }
}

impl IntoSteps for Workflow {
    fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

impl IntoSteps for &Workflow {
    fn into_steps(self) -> Vec<Step> {
        self.steps.clone()
    }
}

impl IntoSteps for Vec<Step> {
    fn into_steps(self) -> Vec<Step> {
        self
    }
}

impl<T: IntoSteps> Add<T> for Workflow {
    type Output = Workflow;

    fn add(mut self, other: T) -> Workflow {
        self.steps.extend(other.into_steps());
        self
    }
}

impl<T: IntoSteps> Add<T> for &Workflow {
    type Output = Workflow;

    fn add(self, other: T) -> Workflow {
        self.combine(other)
    }
}

/// Builder for constructing [`Workflow`] instances.
#[derive(Default)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("workflow", &self.workflow)
            .finish()
    }
}

impl WorkflowBuilder {
    /// Creates a new empty workflow builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.workflow.name = Some(name.into());
        self
    }

    /// Appends a step.
    pub fn step(mut self, step: impl Into<Step>) -> Self {
        self.workflow.steps.push(step.into());
        self
    }

    /// Appends several steps, or another workflow's steps.
    pub fn steps(mut self, steps: impl IntoSteps) -> Self {
        self.workflow.steps.extend(steps.into_steps());
        self
    }

    pub fn on_error(
        mut self,
        handler: impl Fn(WorkflowError, &mut Context) -> Result<RunOutput, WorkflowError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.workflow.on_error = Arc::new(handler);
        self
    }

    pub fn on_abort(
        mut self,
        handler: impl Fn(&mut Context, Abort) -> Result<RunOutput, WorkflowError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.workflow.on_abort = Arc::new(handler);
        self
    }

    pub fn on_reply(mut self, handler: impl Fn(&Value, &Context) + Send + Sync + 'static) -> Self {
        self.workflow.on_reply = Arc::new(handler);
        self
    }

    /// Builds the workflow.
    pub fn build(self) -> Workflow {
        self.workflow
    }
}
