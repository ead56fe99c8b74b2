//! # Marx
//!
//! A micro-framework for composing small, typed units of business logic into
//! workflows.
//!
//! A [`Workflow`] runs an ordered list of [`Step`]s against one [`Context`].
//! Each step reads context fields into keyword arguments, invokes a
//! [`Callable`] (usually a [`LogicUnit`] wrapped in a [`Unit`]) and writes the
//! mapped results back onto the context.
//!
//! ## Features
//!
//! - **Typed contracts**: [`ArgSpec`] and [`ResultSpec`] are checked on every call
//! - **Explicit control flow**: callables skip, abort or fail through [`Interrupt`]
//! - **Composable**: `workflow + step` and `workflow + workflow` build new workflows
//! - **Async First**: Built with `async-trait` for asynchronous units
//!
//! ## Quick Start
//!
//! ```rust
//! use marx::prelude::*;
//! use async_trait::async_trait;
//!
//! define_unit!(MakePie { MAKER = "maker", PIE = "pie" });
//!
//! #[async_trait]
//! impl LogicUnit for MakePie {
//!     fn signature(&self) -> Signature {
//!         Signature::new()
//!             .arg(ArgSpec::new(Self::MAKER).types(ValueType::Str))
//!             .result(ResultSpec::new(Self::PIE).types(ValueType::Str))
//!     }
//!
//!     async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
//!         let maker = call.arg(Self::MAKER)?.as_str().unwrap_or_default().to_string();
//!         call.set(Self::PIE, format!("{}'s lemon", maker))?;
//!         Ok(None)
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let pie = Unit::new(MakePie);
//! let workflow = Workflow::builder()
//!     .step(Step::builder(pie.clone()).arg_map(pie.auto_map()).result_map(
//!         ResultMap::new().entry("pie", MakePie::PIE),
//!     ))
//!     .build();
//!
//! let mut ctx = Context::new();
//! ctx.set("maker", "bob").expect("open context");
//! workflow.execute(&mut ctx).await.expect("workflow failed");
//!
//! assert_eq!(ctx.get("pie").ok(), Some(&Value::from("bob's lemon")));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Without custom handlers, an error from any step ends the run and is
//! returned unchanged:
//!
//! ```rust
//! use marx::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let strict = Step::builder(FnCallable::new("strict", |_kwargs: Kwargs| {
//!     Err(WorkflowError::NotFound("lemon".to_string()).into())
//! }));
//! let workflow = Workflow::builder().step(strict).build();
//!
//! let mut ctx = Context::new();
//! match workflow.execute(&mut ctx).await {
//!     Err(WorkflowError::NotFound(name)) => assert_eq!(name, "lemon"),
//!     other => unreachable!("unexpected outcome: {:?}", other),
//! }
//! # }
//! ```

mod registry;
mod step;
mod workflow;

// Re-export core types
pub use marx_core::*;

pub use registry::Registry;
pub use step::{Step, StepBuilder, StepOutcome};
pub use workflow::{
    AbortHandler, ErrorHandler, IntoSteps, ReplyHandler, RunOutput, Workflow, WorkflowBuilder,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        define_unit, field_names, Abort, ArgMap, ArgSpec, AutoMap, Callable, Context, Field,
        FnCallable, Interrupt, Kwargs, LogicUnit, Registry, ResultMap, ResultSpec, RunOutput,
        Schema, Signature, Step, StepOutcome, Unit, UnitCall, Value, ValueType, Workflow,
        WorkflowBuilder, WorkflowError,
    };
}
