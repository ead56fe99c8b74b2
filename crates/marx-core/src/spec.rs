//! Declarative contracts for a logic unit's parameters and results.

use crate::error::WorkflowError;
use crate::value::{Map, TypeSet, Value, ValueType};
use std::fmt;
use std::sync::Arc;

/// Rewrites an argument value before it is type checked.
pub type Normalizer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Contract for one named parameter.
///
/// # Examples
///
/// ```
/// use marx_core::{ArgSpec, Value, ValueType};
///
/// // A list of tags; a single string is accepted and wrapped.
/// let tags = ArgSpec::new("tags")
///     .types(ValueType::List)
///     .normalize(|value| match value {
///         Value::Str(_) => Value::List(vec![value]),
///         other => other,
///     })
///     .docs("Tags to attach");
///
/// assert!(!tags.has_default());
/// ```
#[derive(Clone)]
pub struct ArgSpec {
    name: String,
    types: TypeSet,
    default: Option<Value>,
    nullable: bool,
    normalizer: Option<Normalizer>,
    docs: Option<String>,
}

impl fmt::Debug for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgSpec")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("default", &self.default)
            .field("nullable", &self.nullable)
            .field("normalizer", &self.normalizer.is_some())
            .finish()
    }
}

impl ArgSpec {
    /// Declares a required parameter accepting any value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: TypeSet::any(),
            default: None,
            nullable: false,
            normalizer: None,
            docs: None,
        }
    }

    pub fn types(mut self, types: impl Into<TypeSet>) -> Self {
        self.types = types.into();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Accepts null and defaults to null unless a default is given.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn normalize(mut self, normalizer: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    pub fn docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = Some(docs.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The accepted types, widened with null for nullable parameters.
    pub fn type_set(&self) -> TypeSet {
        if self.nullable && !self.types.is_any() {
            self.types.clone().with(ValueType::Null)
        } else {
            self.types.clone()
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.nullable
    }

    /// The value used when the parameter is absent, if any.
    pub fn default_value(&self) -> Option<Value> {
        match &self.default {
            Some(value) => Some(value.clone()),
            None if self.nullable => Some(Value::Null),
            None => None,
        }
    }

    pub fn doc(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    /// Resolves this parameter in `kwargs`: fills in the default when absent,
    /// otherwise normalizes and type checks the supplied value.
    pub fn bind(&self, owner: &str, kwargs: &mut Map) -> Result<(), WorkflowError> {
        let value = match kwargs.remove(&self.name) {
            None => self
                .default_value()
                .ok_or_else(|| WorkflowError::MissingArgument {
                    unit: owner.to_string(),
                    argument: self.name.clone(),
                })?,
            Some(value) => {
                let value = match &self.normalizer {
                    Some(normalize) => normalize(value),
                    None => value,
                };
                let accepted = self.type_set();
                if !accepted.accepts(&value) {
                    return Err(WorkflowError::TypeMismatch {
                        owner: owner.to_string(),
                        name: self.name.clone(),
                        expected: accepted,
                        found: value.value_type(),
                    });
                }
                value
            }
        };
        kwargs.insert(self.name.clone(), value);
        Ok(())
    }
}

/// Contract for one named result field.
#[derive(Debug, Clone)]
pub struct ResultSpec {
    name: String,
    types: TypeSet,
    default: Value,
    docs: Option<String>,
}

impl ResultSpec {
    /// Declares a result field accepting any value, defaulting to null.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: TypeSet::any(),
            default: Value::Null,
            docs: None,
        }
    }

    pub fn types(mut self, types: impl Into<TypeSet>) -> Self {
        self.types = types.into();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = Some(docs.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_set(&self) -> &TypeSet {
        &self.types
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn doc(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    pub fn check(&self, owner: &str, value: &Value) -> Result<(), WorkflowError> {
        if self.types.accepts(value) {
            Ok(())
        } else {
            Err(WorkflowError::TypeMismatch {
                owner: owner.to_string(),
                name: self.name.clone(),
                expected: self.types.clone(),
                found: value.value_type(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(spec: &ArgSpec, kwargs: &mut Map) -> Result<(), WorkflowError> {
        spec.bind("Unit", kwargs)
    }

    #[test]
    fn test_missing_argument() {
        let spec = ArgSpec::new("user").types(ValueType::Str);
        let mut kwargs = Map::new();
        assert!(matches!(
            bind(&spec, &mut kwargs),
            Err(WorkflowError::MissingArgument { ref argument, .. }) if argument == "user"
        ));
    }

    #[test]
    fn test_default_substituted() {
        let spec = ArgSpec::new("pig").default("not kosher");
        let mut kwargs = Map::new();
        bind(&spec, &mut kwargs).expect("default applies");
        assert_eq!(kwargs.get("pig"), Some(&Value::from("not kosher")));
    }

    #[test]
    fn test_type_mismatch() {
        let spec = ArgSpec::new("count").types(ValueType::Int);
        let mut kwargs = Map::new();
        kwargs.insert("count".to_string(), Value::from("three"));
        match bind(&spec, &mut kwargs) {
            Err(WorkflowError::TypeMismatch {
                name,
                expected,
                found,
                ..
            }) => {
                assert_eq!(name, "count");
                assert_eq!(expected, TypeSet::from(ValueType::Int));
                assert_eq!(found, ValueType::Str);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_nullable_widens_and_defaults() {
        let spec = ArgSpec::new("note").types(ValueType::Str).nullable();
        assert_eq!(
            spec.type_set(),
            TypeSet::new([ValueType::Str, ValueType::Null])
        );

        let mut kwargs = Map::new();
        bind(&spec, &mut kwargs).expect("nullable defaults to null");
        assert_eq!(kwargs.get("note"), Some(&Value::Null));

        kwargs.insert("note".to_string(), Value::Null);
        bind(&spec, &mut kwargs).expect("explicit null accepted");
    }

    #[test]
    fn test_nullable_keeps_explicit_default() {
        let spec = ArgSpec::new("note").nullable().default("none given");
        assert_eq!(spec.default_value(), Some(Value::from("none given")));
        assert!(spec.type_set().is_any());
    }

    #[test]
    fn test_normalizer_runs_before_type_check() {
        let spec = ArgSpec::new("tags")
            .types(ValueType::List)
            .normalize(|value| match value {
                Value::List(_) => value,
                other => Value::List(vec![other]),
            });
        let mut kwargs = Map::new();
        kwargs.insert("tags".to_string(), Value::from("one"));
        bind(&spec, &mut kwargs).expect("scalar wrapped");
        assert_eq!(kwargs.get("tags"), Some(&Value::from(vec!["one"])));
    }

    #[test]
    fn test_result_spec_check() {
        let spec = ResultSpec::new("hit").types(ValueType::Bool).default(false);
        assert_eq!(spec.default_value(), &Value::Bool(false));
        assert!(spec.check("ThrowThing", &Value::Bool(true)).is_ok());
        assert!(spec.check("ThrowThing", &Value::from("yes")).is_err());
    }
}
