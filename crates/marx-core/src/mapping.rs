//! Mappings between context fields and a callable's kwargs and results.

use crate::callable::Kwargs;
use crate::context::{Context, Schema};
use crate::error::WorkflowError;
use crate::signal::Interrupt;
use crate::unit::Signature;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Custom argument mapping: builds kwargs from the context.
pub type ArgFn = Arc<dyn Fn(&Context) -> Result<Kwargs, Interrupt> + Send + Sync>;

/// Custom result value: derives one context value from the raw result.
pub type ResultFn = Arc<dyn Fn(&Value, &Context) -> Result<Value, Interrupt> + Send + Sync>;

/// Custom result mapping: applies the raw result to the context.
pub type ResultMapperFn = Arc<dyn Fn(&Value, &mut Context) -> Result<(), Interrupt> + Send + Sync>;

/// How a step builds its callable's kwargs from the context.
#[derive(Clone, Default)]
pub enum ArgMap {
    /// No mapped arguments.
    #[default]
    Empty,
    /// `(parameter, context field)` pairs.
    Fields(Vec<(String, String)>),
    /// Like-named binding derived from a unit signature.
    Auto(AutoMap),
    /// Arbitrary logic.
    Custom(ArgFn),
}

impl fmt::Debug for ArgMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgMap::Empty => write!(f, "Empty"),
            ArgMap::Fields(pairs) => f.debug_tuple("Fields").field(pairs).finish(),
            ArgMap::Auto(auto) => f.debug_tuple("Auto").field(auto).finish(),
            ArgMap::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl ArgMap {
    /// Binds each parameter to a context field.
    ///
    /// ```
    /// use marx_core::{ArgMap, Context, Value};
    ///
    /// let map = ArgMap::fields([("user", "thrower")]);
    /// let mut ctx = Context::new();
    /// ctx.set("thrower", "bob").expect("open field");
    ///
    /// let kwargs = map.apply(&ctx).expect("field present");
    /// assert_eq!(kwargs.get("user"), Some(&Value::from("bob")));
    /// ```
    pub fn fields<P, F>(pairs: impl IntoIterator<Item = (P, F)>) -> Self
    where
        P: Into<String>,
        F: Into<String>,
    {
        ArgMap::Fields(
            pairs
                .into_iter()
                .map(|(param, field)| (param.into(), field.into()))
                .collect(),
        )
    }

    pub fn from_fn(
        f: impl Fn(&Context) -> Result<Kwargs, Interrupt> + Send + Sync + 'static,
    ) -> Self {
        ArgMap::Custom(Arc::new(f))
    }

    pub fn apply(&self, ctx: &Context) -> Result<Kwargs, Interrupt> {
        match self {
            ArgMap::Empty => Ok(Kwargs::new()),
            ArgMap::Fields(pairs) => {
                let mut kwargs = Kwargs::new();
                for (param, field) in pairs {
                    kwargs.insert(param.clone(), ctx.get(field)?.clone());
                }
                Ok(kwargs)
            }
            ArgMap::Auto(auto) => Ok(auto.apply(ctx)?),
            ArgMap::Custom(f) => f(ctx),
        }
    }
}

impl From<AutoMap> for ArgMap {
    fn from(auto: AutoMap) -> Self {
        ArgMap::Auto(auto)
    }
}

/// Convention-based argument mapping derived from a unit signature.
///
/// Each parameter reads the context field of the same name, unless an
/// override names another field. A parameter whose field is absent falls back
/// to its default; without one the mapping fails with
/// [`WorkflowError::MissingArgument`].
#[derive(Debug, Clone)]
pub struct AutoMap {
    unit: String,
    signature: Arc<Signature>,
    overrides: HashMap<String, String>,
}

impl AutoMap {
    pub fn new(unit: impl Into<String>, signature: Arc<Signature>) -> Self {
        Self {
            unit: unit.into(),
            signature,
            overrides: HashMap::new(),
        }
    }

    /// Reads `param` from context field `field` instead of its own name.
    pub fn rename(mut self, param: impl Into<String>, field: impl Into<String>) -> Self {
        self.overrides.insert(param.into(), field.into());
        self
    }

    pub fn overrides<P, F>(self, pairs: impl IntoIterator<Item = (P, F)>) -> Self
    where
        P: Into<String>,
        F: Into<String>,
    {
        pairs
            .into_iter()
            .fold(self, |auto, (param, field)| auto.rename(param, field))
    }

    pub fn apply(&self, ctx: &Context) -> Result<Kwargs, WorkflowError> {
        let mut kwargs = Kwargs::new();
        for spec in self.signature.params() {
            let field = self
                .overrides
                .get(spec.name())
                .map(String::as_str)
                .unwrap_or_else(|| spec.name());
            if ctx.contains(field) {
                kwargs.insert(spec.name().to_string(), ctx.get(field)?.clone());
            } else if !spec.has_default() {
                return Err(WorkflowError::MissingArgument {
                    unit: self.unit.clone(),
                    argument: spec.name().to_string(),
                });
            }
        }
        Ok(kwargs)
    }
}

/// Where one mapped context value comes from.
#[derive(Clone)]
pub enum ResultSource {
    /// A key of the raw result.
    Key(String),
    /// Successive keys into nested maps or lists.
    Path(Vec<String>),
    /// A function of the raw result and the context.
    Func(ResultFn),
}

impl fmt::Debug for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Key(key) => f.debug_tuple("Key").field(key).finish(),
            ResultSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ResultSource::Func(_) => write!(f, "Func(..)"),
        }
    }
}

impl ResultSource {
    pub fn func(
        f: impl Fn(&Value, &Context) -> Result<Value, Interrupt> + Send + Sync + 'static,
    ) -> Self {
        ResultSource::Func(Arc::new(f))
    }

    pub fn resolve(&self, result: &Value, ctx: &Context) -> Result<Value, Interrupt> {
        match self {
            ResultSource::Key(key) => Ok(lookup(result, key)?.clone()),
            ResultSource::Path(path) => {
                let value = path
                    .iter()
                    .try_fold(result, |value, key| lookup(value, key))?;
                Ok(value.clone())
            }
            ResultSource::Func(f) => f(result, ctx),
        }
    }
}

fn lookup<'v>(value: &'v Value, key: &str) -> Result<&'v Value, WorkflowError> {
    value
        .lookup(key)
        .ok_or_else(|| WorkflowError::MissingResultKey {
            key: key.to_string(),
        })
}

impl From<&str> for ResultSource {
    fn from(key: &str) -> Self {
        ResultSource::Key(key.to_string())
    }
}

impl From<String> for ResultSource {
    fn from(key: String) -> Self {
        ResultSource::Key(key)
    }
}

impl From<Vec<&str>> for ResultSource {
    fn from(path: Vec<&str>) -> Self {
        ResultSource::Path(path.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ResultSource {
    fn from(path: [&str; N]) -> Self {
        ResultSource::Path(path.iter().map(|k| k.to_string()).collect())
    }
}

/// How a step writes its callable's raw result back onto the context.
///
/// Entries are applied in declaration order; each assigns one context field.
/// A whole-result mapper, if set, runs after the entries.
///
/// # Examples
///
/// ```
/// use marx_core::{Context, ResultMap, Value};
///
/// let map = ResultMap::new()
///     .entry("baz", "returned")
///     .entry("first", ["items", "0"]);
///
/// let raw: Value = Value::Map(
///     [
///         ("returned".to_string(), Value::from("bar")),
///         ("items".to_string(), Value::from(vec!["a", "b"])),
///     ]
///     .into_iter()
///     .collect(),
/// );
///
/// let mut ctx = Context::new();
/// map.apply(&raw, &mut ctx).expect("keys present");
/// assert_eq!(ctx.get("baz").ok(), Some(&Value::from("bar")));
/// assert_eq!(ctx.get("first").ok(), Some(&Value::from("a")));
/// ```
#[derive(Clone, Default)]
pub struct ResultMap {
    entries: Vec<(String, ResultSource)>,
    mapper: Option<ResultMapperFn>,
}

impl fmt::Debug for ResultMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultMap")
            .field("entries", &self.entries)
            .field("mapper", &self.mapper.is_some())
            .finish()
    }
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns context `field` from `source`. Re-mapping a field replaces
    /// its earlier entry.
    pub fn entry(mut self, field: impl Into<String>, source: impl Into<ResultSource>) -> Self {
        let field = field.into();
        let source = source.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(existing) => existing.1 = source,
            None => self.entries.push((field, source)),
        }
        self
    }

    /// Assigns context `field` from a function of the result and context.
    pub fn entry_fn(
        self,
        field: impl Into<String>,
        f: impl Fn(&Value, &Context) -> Result<Value, Interrupt> + Send + Sync + 'static,
    ) -> Self {
        self.entry(field, ResultSource::func(f))
    }

    /// A mapping driven entirely by custom logic.
    pub fn from_fn(
        f: impl Fn(&Value, &mut Context) -> Result<(), Interrupt> + Send + Sync + 'static,
    ) -> Self {
        Self {
            entries: Vec::new(),
            mapper: Some(Arc::new(f)),
        }
    }

    /// Copies every declared result field to the like-named field `schema`
    /// declares.
    pub fn matching(signature: &Signature, schema: &Schema) -> Self {
        Self::matching_with(signature, schema, std::iter::empty::<(String, String)>())
    }

    /// Like [`matching`](Self::matching); `(result field, context field)`
    /// overrides take precedence over name matching.
    pub fn matching_with<R, C>(
        signature: &Signature,
        schema: &Schema,
        overrides: impl IntoIterator<Item = (R, C)>,
    ) -> Self
    where
        R: Into<String>,
        C: Into<String>,
    {
        let overrides: HashMap<String, String> = overrides
            .into_iter()
            .map(|(result, field)| (result.into(), field.into()))
            .collect();
        signature
            .result_names()
            .fold(Self::new(), |map, result| match overrides.get(result) {
                Some(field) => map.entry(field.clone(), result),
                None if schema.declares(result) => map.entry(result, result),
                None => map,
            })
    }

    pub fn entries(&self) -> &[(String, ResultSource)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.mapper.is_none()
    }

    pub fn apply(&self, result: &Value, ctx: &mut Context) -> Result<(), Interrupt> {
        for (field, source) in &self.entries {
            let value = source.resolve(result, ctx)?;
            ctx.set(field, value)?;
        }
        if let Some(mapper) = &self.mapper {
            mapper(result, ctx)?;
        }
        Ok(())
    }
}
