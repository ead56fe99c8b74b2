//! The callable seam between steps and the code they run.

use crate::context::Context;
use crate::error::WorkflowError;
use crate::signal::Interrupt;
use crate::value::{Map, Value};
use async_trait::async_trait;
use std::fmt;

/// Keyword arguments for one call.
pub type Kwargs = Map;

/// Anything a step can invoke: a logic unit, a plain function, or a
/// registry entry.
///
/// Implement this directly for asynchronous callables; synchronous closures
/// are wrapped with [`FnCallable`].
#[async_trait]
pub trait Callable: Send + Sync + fmt::Debug {
    /// Invokes the callable.
    ///
    /// `context` is `Some` exactly when [`wants_context`](Self::wants_context)
    /// returned `true` at step construction.
    async fn call(&self, context: Option<&mut Context>, kwargs: Kwargs)
        -> Result<Value, Interrupt>;

    /// Whether the running context should be passed along with the kwargs.
    fn wants_context(&self) -> bool {
        false
    }

    /// Name used for logging and default step names.
    fn name(&self) -> String;
}

type PlainFn = dyn Fn(Kwargs) -> Result<Value, Interrupt> + Send + Sync;
type ContextFn = dyn Fn(&mut Context, Kwargs) -> Result<Value, Interrupt> + Send + Sync;

enum Body {
    Plain(Box<PlainFn>),
    WithContext(Box<ContextFn>),
}

/// A synchronous closure exposed as a [`Callable`].
///
/// # Examples
///
/// ```
/// use marx_core::{FnCallable, Callable, Kwargs, Value};
///
/// let plain = FnCallable::new("returns_bar", |_kwargs: Kwargs| {
///     let mut result = Kwargs::new();
///     result.insert("returned".to_string(), Value::from("bar"));
///     Ok(Value::Map(result))
/// });
/// assert!(!plain.wants_context());
///
/// let with_context = FnCallable::with_context("greet", |ctx, _kwargs| {
///     ctx.reply("hello");
///     Ok(Value::Null)
/// });
/// assert!(with_context.wants_context());
/// ```
pub struct FnCallable {
    name: String,
    body: Body,
}

impl fmt::Debug for FnCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallable")
            .field("name", &self.name)
            .field("wants_context", &self.wants_context())
            .finish()
    }
}

impl FnCallable {
    /// Wraps a closure that only sees its kwargs.
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(Kwargs) -> Result<Value, Interrupt> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Body::Plain(Box::new(body)),
        }
    }

    /// Wraps a closure that also receives the running context.
    pub fn with_context(
        name: impl Into<String>,
        body: impl Fn(&mut Context, Kwargs) -> Result<Value, Interrupt> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Body::WithContext(Box::new(body)),
        }
    }
}

#[async_trait]
impl Callable for FnCallable {
    async fn call(
        &self,
        context: Option<&mut Context>,
        kwargs: Kwargs,
    ) -> Result<Value, Interrupt> {
        match &self.body {
            Body::Plain(body) => body(kwargs),
            Body::WithContext(body) => {
                let ctx =
                    context.ok_or_else(|| WorkflowError::ContextUnavailable(self.name.clone()))?;
                body(ctx, kwargs)
            }
        }
    }

    fn wants_context(&self) -> bool {
        matches!(self.body, Body::WithContext(_))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
