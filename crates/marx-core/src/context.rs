//! Workflow execution context: schema-typed fields plus a reply log.

use crate::error::WorkflowError;
use crate::value::{TypeSet, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Observer invoked for every [`Context::reply`] made during a run.
pub type ReplyHook = Arc<dyn Fn(&Value, &Context) + Send + Sync>;

/// A declared context field.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    types: TypeSet,
    default: Value,
    docs: Option<String>,
}

impl Field {
    /// Declares an untyped field defaulting to null.
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

    fn check(&self, value: &Value) -> Result<(), WorkflowError> {
        if self.types.accepts(value) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidContextAssignment {
                field: self.name.clone(),
                expected: self.types.clone(),
                found: value.value_type(),
            })
        }
    }
}

/// Ordered field declarations for a family of contexts.
///
/// An *open* schema accepts assignments to undeclared fields with any value;
/// a closed one rejects them.
///
/// # Examples
///
/// ```
/// use marx_core::{Field, Schema, ValueType};
///
/// let schema = Schema::builder("ThrowPieContext")
///     .field(Field::new("pie").types(ValueType::Str).docs("A pie, made along the way"))
///     .field(Field::new("was_hit").types(ValueType::Bool))
///     .build();
///
/// assert!(schema.declares("pie"));
/// assert_eq!(schema.field_names().collect::<Vec<_>>(), ["pie", "was_hit"]);
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    open: bool,
}

impl Default for Schema {
    /// The open schema used by [`Context::new`], declaring an untyped `message`.
    fn default() -> Self {
        Schema::builder("DefaultContext")
            .field(Field::new("message"))
            .build()
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn declares(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::name)
    }
}

/// Builder for [`Schema`]. Schemas are open unless [`closed`](Self::closed)
/// is called.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
    open: bool,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            open: true,
        }
    }

    /// Declares a field. Redeclaring a name replaces the earlier declaration
    /// in place.
    pub fn field(mut self, field: Field) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Inherits every field of `parent`.
    pub fn extend(self, parent: &Schema) -> Self {
        parent.fields.iter().cloned().fold(self, SchemaBuilder::field)
    }

    pub fn closed(mut self) -> Self {
        self.open = false;
        self
    }

    pub fn build(self) -> Schema {
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Schema {
            name: self.name,
            fields: self.fields,
            index,
            open: self.open,
        }
    }
}

/// State threaded through one workflow run.
///
/// Field reads fall back to the schema's declared default; writes are
/// checked against the declared type set. Replies accumulate in call order.
///
/// # Examples
///
/// ```
/// use marx_core::{Context, Value};
///
/// let mut ctx = Context::new();
/// ctx.set("message", "hello").expect("open field");
/// ctx.reply("got it");
///
/// assert_eq!(ctx.get("message").ok(), Some(&Value::from("hello")));
/// assert_eq!(ctx.replies(), vec![Value::from("got it")]);
/// ```
pub struct Context {
    schema: Arc<Schema>,
    values: HashMap<String, Value>,
    replies: Vec<Value>,
    workflow_name: Option<String>,
    on_reply: Option<ReplyHook>,
    started_at: Instant,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("schema", &self.schema.name())
            .field("values", &self.values)
            .field("replies", &self.replies)
            .field("workflow", &self.workflow_name)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context over the default open schema.
    pub fn new() -> Self {
        Self::with_schema(Schema::default())
    }

    pub fn with_schema(schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            schema: schema.into(),
            values: HashMap::new(),
            replies: Vec::new(),
            workflow_name: None,
            on_reply: None,
            started_at: Instant::now(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the field's value, or its declared default if never set.
    ///
    /// Fails with [`WorkflowError::UnknownField`] for a field that is neither
    /// set nor declared.
    pub fn get(&self, name: &str) -> Result<&Value, WorkflowError> {
        if let Some(value) = self.values.get(name) {
            return Ok(value);
        }
        self.schema
            .field(name)
            .map(Field::default_value)
            .ok_or_else(|| WorkflowError::UnknownField {
                owner: self.schema.name().to_string(),
                field: name.to_string(),
            })
    }

    /// Assigns a field, validating declared fields against their type set.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), WorkflowError> {
        let value = value.into();
        match self.schema.field(name) {
            Some(field) => field.check(&value)?,
            None if self.schema.is_open() => {}
            None => {
                return Err(WorkflowError::UnknownField {
                    owner: self.schema.name().to_string(),
                    field: name.to_string(),
                })
            }
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns a shared handle to a domain object stored in `name`.
    pub fn object<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).ok().and_then(Value::to_object::<T>)
    }

    /// Removes a set value; declared fields fall back to their default.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Returns `true` if the field is set or declared.
    pub fn contains(&self, name: &str) -> bool {
        self.is_set(name) || self.schema.declares(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of the fields that have been set.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Records a reply and forwards it to the running workflow's reply handler.
    pub fn reply(&mut self, message: impl Into<Value>) {
        let message = message.into();
        if let Some(hook) = self.on_reply.clone() {
            hook(&message, self);
        }
        self.replies.push(message);
    }

    /// Returns a copy of the replies recorded so far.
    pub fn replies(&self) -> Vec<Value> {
        self.replies.clone()
    }

    /// Attaches the running workflow. Called once at the start of each run.
    pub fn bind_workflow(&mut self, name: Option<&str>, on_reply: ReplyHook) {
        self.workflow_name = name.map(str::to_string);
        self.on_reply = Some(on_reply);
    }

    /// Name of the workflow last bound to this context, if it has one.
    pub fn workflow_name(&self) -> Option<&str> {
        self.workflow_name.as_deref()
    }

    /// Returns the time elapsed since the context was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
