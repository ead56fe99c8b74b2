//! Core types for the marx workflow framework.
//!
//! This crate holds everything a logic unit author needs, with no executor
//! attached. The `marx` crate builds steps and workflows on top of it.
//!
//! # Core Types
//!
//! - [`Context`] - Shared, schema-typed state threaded through a workflow run
//! - [`LogicUnit`] / [`Unit`] - Declaratively typed business logic
//! - [`ArgSpec`] / [`ResultSpec`] - Parameter and result contracts
//! - [`Callable`] - Anything a step can invoke
//! - [`ArgMap`] / [`ResultMap`] - Context to kwargs, and result to context
//! - [`Interrupt`] - Skip, abort and error signals raised by callables
//! - [`WorkflowError`] - Error types for unit validation and workflow runs

mod callable;
mod context;
mod error;
mod mapping;
mod signal;
mod spec;
mod unit;
mod value;

pub use callable::{Callable, FnCallable, Kwargs};
pub use context::{Context, Field, ReplyHook, Schema, SchemaBuilder};
pub use error::WorkflowError;
pub use mapping::{ArgFn, ArgMap, AutoMap, ResultFn, ResultMap, ResultMapperFn, ResultSource};
pub use signal::{Abort, Interrupt};
pub use spec::{ArgSpec, Normalizer, ResultSpec};
pub use unit::{LogicUnit, ResultBuilder, Signature, Unit, UnitCall};
pub use value::{Map, Object, TypeSet, Value, ValueType};

/// Defines a unit struct for a [`LogicUnit`] with its name and field names as
/// constants.
///
/// The generated struct derives `Debug`, `Default`, `Clone` and `Copy`, and
/// carries `const NAME: &'static str`. Each `CONST = "field"` pair becomes an
/// associated constant, so signatures and bodies share one spelling of every
/// argument and result name.
///
/// # Example
///
/// ```rust
/// use marx_core::define_unit;
///
/// define_unit!(ThrowThing { THROWER = "thrower", HIT = "hit" });
/// assert_eq!(ThrowThing::NAME, "ThrowThing");
/// assert_eq!(ThrowThing::HIT, "hit");
///
/// define_unit!(Noop);
/// assert_eq!(Noop::NAME, "Noop");
/// ```
#[macro_export]
macro_rules! define_unit {
    ($name:ident) => {
        $crate::define_unit!($name {});
    };
    ($name:ident { $($konst:ident = $field:literal),* $(,)? }) => {
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl $name {
            /// Unit name as a compile-time constant
            #[allow(dead_code)]
            pub const NAME: &'static str = stringify!($name);

            $(
                #[allow(dead_code)]
                pub const $konst: &'static str = $field;
            )*
        }
    };
}

/// Adds argument and field name constants to an existing type.
///
/// Use this for units that carry bound configuration and so cannot be
/// declared with [`define_unit!`], or for context schemas.
///
/// # Example
///
/// ```rust
/// use marx_core::field_names;
///
/// #[derive(Debug)]
/// struct Greeter {
///     greeting: String,
/// }
///
/// field_names!(Greeter { USER = "user", MESSAGE = "message" });
/// assert_eq!(Greeter::USER, "user");
/// ```
#[macro_export]
macro_rules! field_names {
    ($ty:ty { $($konst:ident = $field:literal),* $(,)? }) => {
        impl $ty {
            $(
                #[allow(dead_code)]
                pub const $konst: &'static str = $field;
            )*
        }
    };
}
