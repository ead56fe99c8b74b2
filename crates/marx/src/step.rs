//! Steps: a callable bound into a pipeline position.

use marx_core::{
    Abort, ArgMap, Callable, Context, Interrupt, Kwargs, LogicUnit, ResultMap, Unit, Value,
    WorkflowError,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one step execution, inspected by the workflow loop.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step finished and its results were mapped onto the context.
    Continue,
    /// The step asked to be skipped. Context changes made before the signal
    /// are kept.
    Skip,
    /// The step asked to halt the run.
    Abort(Abort),
    /// The step failed.
    Error(WorkflowError),
}

impl StepOutcome {
    /// Returns `true` if the workflow should move on to the next step.
    pub fn proceeds(&self) -> bool {
        matches!(self, StepOutcome::Continue | StepOutcome::Skip)
    }
}

impl From<Result<(), Interrupt>> for StepOutcome {
    fn from(result: Result<(), Interrupt>) -> Self {
        match result {
            Ok(()) => StepOutcome::Continue,
            Err(Interrupt::Skip) => StepOutcome::Skip,
            Err(Interrupt::Abort(abort)) => StepOutcome::Abort(abort),
            Err(Interrupt::Error(e)) => StepOutcome::Error(e),
        }
    }
}

struct StepInner {
    name: String,
    callable: Arc<dyn Callable>,
    arg_map: ArgMap,
    result_map: ResultMap,
    extra_kwargs: Kwargs,
    wants_context: bool,
    docs: Option<String>,
}

/// A callable bound to argument and result mappings.
///
/// Steps are cheap handles: cloning shares the same configuration, and two
/// steps compare equal only if they are the same handle.
///
/// # Examples
///
/// ```
/// use marx::{Context, FnCallable, Kwargs, ResultMap, Step, StepOutcome, Value};
///
/// # tokio_test::block_on(async {
/// let step = Step::builder(FnCallable::new("returns_bar", |_kwargs: Kwargs| {
///     let mut result = Kwargs::new();
///     result.insert("returned".to_string(), Value::from("bar"));
///     Ok(Value::Map(result))
/// }))
/// .result_map(ResultMap::new().entry("baz", "returned"))
/// .build();
///
/// let mut ctx = Context::new();
/// assert!(matches!(step.execute(&mut ctx).await, StepOutcome::Continue));
/// assert_eq!(ctx.get("baz").ok(), Some(&Value::from("bar")));
/// # });
/// ```
#[derive(Clone)]
pub struct Step {
    inner: Arc<StepInner>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.inner.name)
            .field("arg_map", &self.inner.arg_map)
            .field("result_map", &self.inner.result_map)
            .field("extra_kwargs", &self.inner.extra_kwargs)
            .field("wants_context", &self.inner.wants_context)
            .finish()
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Step {}

impl Step {
    /// Creates a step builder for a callable.
    pub fn builder(callable: impl Callable + 'static) -> StepBuilder {
        StepBuilder::new(Arc::new(callable))
    }

    /// Creates a step builder for a shared callable.
    pub fn shared(callable: Arc<dyn Callable>) -> StepBuilder {
        StepBuilder::new(callable)
    }

    /// Creates a step for a logic unit that reads its arguments from
    /// like-named context fields.
    pub fn auto<U: LogicUnit + 'static>(unit: U) -> StepBuilder {
        let unit = Unit::new(unit);
        let arg_map = unit.auto_map();
        Step::builder(unit).arg_map(arg_map)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn docs(&self) -> Option<&str> {
        self.inner.docs.as_deref()
    }

    pub fn callable(&self) -> &Arc<dyn Callable> {
        &self.inner.callable
    }

    pub fn wants_context(&self) -> bool {
        self.inner.wants_context
    }

    pub fn arg_map(&self) -> &ArgMap {
        &self.inner.arg_map
    }

    pub fn result_map(&self) -> &ResultMap {
        &self.inner.result_map
    }

    pub fn extra_kwargs(&self) -> &Kwargs {
        &self.inner.extra_kwargs
    }

    /// Builds kwargs from the context, invokes the callable and maps its
    /// result back onto the context.
    ///
    /// Extra kwargs take precedence over mapped arguments.
    pub async fn call(&self, ctx: &mut Context) -> Result<(), Interrupt> {
        let inner = &*self.inner;
        let mut kwargs = inner.arg_map.apply(ctx)?;
        kwargs.extend(
            inner
                .extra_kwargs
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        let context = if inner.wants_context {
            Some(&mut *ctx)
        } else {
            None
        };
        let result: Value = inner.callable.call(context, kwargs).await?;
        inner.result_map.apply(&result, ctx)
    }

    /// Runs the step and classifies how it ended.
    pub async fn execute(&self, ctx: &mut Context) -> StepOutcome {
        debug!("Step '{}' started", self.inner.name);
        let outcome = StepOutcome::from(self.call(ctx).await);
        debug!("Step '{}' finished: {:?}", self.inner.name, outcome);
        outcome
    }
}

/// Builder for [`Step`].
pub struct StepBuilder {
    name: Option<String>,
    callable: Arc<dyn Callable>,
    arg_map: ArgMap,
    result_map: ResultMap,
    extra_kwargs: Kwargs,
    docs: Option<String>,
}

impl fmt::Debug for StepBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepBuilder")
            .field("name", &self.name)
            .field("callable", &self.callable)
            .finish()
    }
}

impl StepBuilder {
    pub fn new(callable: Arc<dyn Callable>) -> Self {
        Self {
            name: None,
            callable,
            arg_map: ArgMap::Empty,
            result_map: ResultMap::new(),
            extra_kwargs: Kwargs::new(),
            docs: None,
        }
    }

    /// Overrides the step name. Defaults to the callable's name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arg_map(mut self, arg_map: impl Into<ArgMap>) -> Self {
        self.arg_map = arg_map.into();
        self
    }

    pub fn result_map(mut self, result_map: ResultMap) -> Self {
        self.result_map = result_map;
        self
    }

    /// Fixed kwargs passed on every call.
    pub fn extra_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.extra_kwargs = kwargs;
        self
    }

    pub fn extra_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_kwargs.insert(name.into(), value.into());
        self
    }

    pub fn docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = Some(docs.into());
        self
    }

    pub fn build(self) -> Step {
        let wants_context = self.callable.wants_context();
        let name = self.name.unwrap_or_else(|| self.callable.name());
        Step {
            inner: Arc::new(StepInner {
                name,
                callable: self.callable,
                arg_map: self.arg_map,
                result_map: self.result_map,
                extra_kwargs: self.extra_kwargs,
                wants_context,
                docs: self.docs,
            }),
        }
    }
}

impl From<StepBuilder> for Step {
    fn from(builder: StepBuilder) -> Self {
        builder.build()
    }
}
