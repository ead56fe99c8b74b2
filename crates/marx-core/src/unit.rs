//! Logic units: reusable operations with a frozen, typed call signature.

use crate::callable::{Callable, Kwargs};
use crate::context::{Context, Schema};
use crate::error::WorkflowError;
use crate::mapping::{AutoMap, ResultMap};
use crate::signal::Interrupt;
use crate::spec::{ArgSpec, ResultSpec};
use crate::value::{short_type_name, Map, Value, ValueType};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The declared call signature of a logic unit.
///
/// Parameters and result fields keep their declaration order. A parameter
/// declared with [`param`](Self::param) accepts any value and is required; use
/// [`arg`](Self::arg) with an [`ArgSpec`] to constrain it.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<ArgSpec>,
    results: Vec<ResultSpec>,
    accepts_context: bool,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter. Redeclaring a name replaces it in place.
    pub fn arg(mut self, spec: ArgSpec) -> Self {
        match self.params.iter_mut().find(|p| p.name() == spec.name()) {
            Some(existing) => *existing = spec,
            None => self.params.push(spec),
        }
        self
    }

    /// Declares an unconstrained, required parameter.
    pub fn param(self, name: impl Into<String>) -> Self {
        self.arg(ArgSpec::new(name))
    }

    /// Declares a result field. Redeclaring a name replaces it in place.
    pub fn result(mut self, spec: ResultSpec) -> Self {
        match self.results.iter_mut().find(|r| r.name() == spec.name()) {
            Some(existing) => *existing = spec,
            None => self.results.push(spec),
        }
        self
    }

    /// Declares an unconstrained result field.
    pub fn output(self, name: impl Into<String>) -> Self {
        self.result(ResultSpec::new(name))
    }

    /// The unit body receives the running context.
    pub fn with_context(mut self) -> Self {
        self.accepts_context = true;
        self
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    pub fn params(&self) -> &[ArgSpec] {
        &self.params
    }

    pub fn results(&self) -> &[ResultSpec] {
        &self.results
    }

    pub fn arg_spec(&self, name: &str) -> Option<&ArgSpec> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn result_spec(&self, name: &str) -> Option<&ResultSpec> {
        self.results.iter().find(|r| r.name() == name)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(ArgSpec::name)
    }

    pub fn result_names(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(ResultSpec::name)
    }

    /// Validates call kwargs against the declared parameters, filling in
    /// defaults. Unknown keywords are rejected.
    pub fn bind(&self, owner: &str, mut kwargs: Kwargs) -> Result<Kwargs, WorkflowError> {
        if let Some(unexpected) = kwargs.keys().find(|k| self.arg_spec(k).is_none()) {
            return Err(WorkflowError::UnexpectedArgument {
                unit: owner.to_string(),
                argument: unexpected.clone(),
            });
        }
        for spec in &self.params {
            spec.bind(owner, &mut kwargs)?;
        }
        Ok(kwargs)
    }
}

/// Call-scoped carrier for a unit's result fields.
///
/// One builder is allocated per invocation, so concurrent calls to the same
/// unit never observe each other's partial results.
#[derive(Debug)]
pub struct ResultBuilder {
    owner: String,
    signature: Arc<Signature>,
    values: Map,
}

impl ResultBuilder {
    pub fn new(owner: impl Into<String>, signature: Arc<Signature>) -> Self {
        Self {
            owner: owner.into(),
            signature,
            values: Map::new(),
        }
    }

    /// Assigns a declared result field after checking its type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), WorkflowError> {
        let value = value.into();
        let spec = self
            .signature
            .result_spec(name)
            .ok_or_else(|| WorkflowError::UnknownField {
                owner: self.owner.clone(),
                field: name.to_string(),
            })?;
        spec.check(&self.owner, &value)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// The assigned value, or the field's default if unset.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.signature.result_spec(name).map(ResultSpec::default_value))
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Every declared field, defaulted where unset, as a map value.
    pub fn snapshot(&self) -> Value {
        let map = self
            .signature
            .results()
            .iter()
            .map(|spec| {
                let value = self
                    .values
                    .get(spec.name())
                    .unwrap_or_else(|| spec.default_value());
                (spec.name().to_string(), value.clone())
            })
            .collect();
        Value::Map(map)
    }

    pub fn finish(self) -> Value {
        self.snapshot()
    }
}

/// Everything a unit body sees during one invocation.
pub struct UnitCall<'a> {
    unit: &'a str,
    kwargs: Kwargs,
    result: ResultBuilder,
    context: Option<&'a mut Context>,
}

impl fmt::Debug for UnitCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitCall")
            .field("unit", &self.unit)
            .field("kwargs", &self.kwargs)
            .field("result", &self.result)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

impl<'a> UnitCall<'a> {
    pub fn new(
        unit: &'a str,
        kwargs: Kwargs,
        result: ResultBuilder,
        context: Option<&'a mut Context>,
    ) -> Self {
        Self {
            unit,
            kwargs,
            result,
            context,
        }
    }

    /// The validated value of a declared parameter.
    pub fn arg(&self, name: &str) -> Result<&Value, WorkflowError> {
        self.kwargs
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownField {
                owner: self.unit.to_string(),
                field: name.to_string(),
            })
    }

    /// The domain object passed for a parameter.
    pub fn object<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, WorkflowError> {
        let value = self.arg(name)?;
        value
            .to_object::<T>()
            .ok_or_else(|| WorkflowError::TypeMismatch {
                owner: self.unit.to_string(),
                name: name.to_string(),
                expected: ValueType::of::<T>().into(),
                found: value.value_type(),
            })
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Assigns a result field on this call's carrier.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), WorkflowError> {
        self.result.set(name, value)
    }

    pub fn result(&self) -> &ResultBuilder {
        &self.result
    }

    /// The running context; only available to units whose signature
    /// declares it.
    pub fn context(&mut self) -> Result<&mut Context, WorkflowError> {
        self.context
            .as_deref_mut()
            .ok_or_else(|| WorkflowError::ContextUnavailable(self.unit.to_string()))
    }

    pub fn into_result(self) -> ResultBuilder {
        self.result
    }
}

/// A reusable, declaratively typed unit of business logic.
///
/// The unit's struct fields are its bound configuration; per-call input
/// arrives through [`UnitCall`]. Wrap an instance in [`Unit`] to get
/// argument and result validation.
///
/// # Examples
///
/// ```
/// use marx_core::{define_unit, LogicUnit, Signature, ArgSpec, ResultSpec, UnitCall};
/// use marx_core::{Interrupt, Value, ValueType};
/// use async_trait::async_trait;
///
/// define_unit!(MakePie { MAKER = "maker", PIE = "pie" });
///
/// #[async_trait]
/// impl LogicUnit for MakePie {
///     fn signature(&self) -> Signature {
///         Signature::new()
///             .arg(ArgSpec::new(Self::MAKER).types(ValueType::Str))
///             .result(ResultSpec::new(Self::PIE).types(ValueType::Str))
///     }
///
///     async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
///         call.set(Self::PIE, "lemon")?;
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait LogicUnit: Send + Sync + fmt::Debug {
    /// Declares the call signature. Called once, when the unit is wrapped.
    fn signature(&self) -> Signature;

    /// Runs the unit body. Returning `None` makes the call's result carrier
    /// the result.
    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt>;

    /// Returns the unit name. By default, the type name.
    fn name(&self) -> String {
        short_type_name::<Self>().to_string()
    }
}

/// A logic unit with its signature frozen, validating every invocation.
///
/// `Unit` is a cheap handle: clones share the unit instance and signature.
#[derive(Debug)]
pub struct Unit<U> {
    inner: Arc<U>,
    signature: Arc<Signature>,
    name: String,
}

impl<U> Clone for Unit<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            signature: Arc::clone(&self.signature),
            name: self.name.clone(),
        }
    }
}

impl<U: LogicUnit> Unit<U> {
    pub fn new(unit: U) -> Self {
        let signature = Arc::new(unit.signature());
        let name = unit.name();
        Self {
            inner: Arc::new(unit),
            signature,
            name,
        }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates `kwargs`, runs the body with a fresh result carrier and
    /// returns the body's value or the carrier's fields.
    pub async fn invoke(
        &self,
        context: Option<&mut Context>,
        kwargs: Kwargs,
    ) -> Result<Value, Interrupt> {
        let kwargs = self.signature.bind(&self.name, kwargs)?;
        let context = if self.signature.accepts_context() {
            context
        } else {
            None
        };
        let result = ResultBuilder::new(self.name.clone(), Arc::clone(&self.signature));
        let mut call = UnitCall::new(&self.name, kwargs, result, context);

        match self.inner.call(&mut call).await? {
            Some(value) => Ok(value),
            None => Ok(call.into_result().finish()),
        }
    }

    /// Argument mapping binding like-named context fields to parameters.
    pub fn auto_map(&self) -> AutoMap {
        AutoMap::new(self.name.clone(), Arc::clone(&self.signature))
    }

    /// Result mapping copying result fields to like-named fields `schema`
    /// declares.
    pub fn result_map(&self, schema: &Schema) -> ResultMap {
        ResultMap::matching(&self.signature, schema)
    }

    /// Like [`result_map`](Self::result_map), with explicit
    /// `(result field, context field)` overrides.
    pub fn result_map_with<R, C>(
        &self,
        schema: &Schema,
        overrides: impl IntoIterator<Item = (R, C)>,
    ) -> ResultMap
    where
        R: Into<String>,
        C: Into<String>,
    {
        ResultMap::matching_with(&self.signature, schema, overrides)
    }
}

#[async_trait]
impl<U: LogicUnit + 'static> Callable for Unit<U> {
    async fn call(
        &self,
        context: Option<&mut Context>,
        kwargs: Kwargs,
    ) -> Result<Value, Interrupt> {
        self.invoke(context, kwargs).await
    }

    fn wants_context(&self) -> bool {
        self.signature.accepts_context()
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
