use async_trait::async_trait;
use marx::prelude::*;
use marx::{Map, ResultSource, TypeSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct User {
    name: String,
    permissions: Vec<String>,
}

impl User {
    fn new(name: &str, permissions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug)]
struct PermissionDenied {
    user: String,
    action: String,
}

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} may not {}", self.user, self.action)
    }
}

impl std::error::Error for PermissionDenied {}

#[derive(Debug)]
struct IsUserAuthorized {
    action: String,
}

field_names!(IsUserAuthorized { USER = "user" });

#[async_trait]
impl LogicUnit for IsUserAuthorized {
    fn signature(&self) -> Signature {
        Signature::new().arg(ArgSpec::new(Self::USER).types(ValueType::of::<User>()))
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        let user = call.object::<User>(Self::USER)?;
        if !user.permissions.contains(&self.action) {
            return Err(Interrupt::unhandled(PermissionDenied {
                user: user.name.clone(),
                action: self.action.clone(),
            }));
        }
        Ok(None)
    }
}

define_unit!(MakeItem { ITEM = "item" });

#[async_trait]
impl LogicUnit for MakeItem {
    fn signature(&self) -> Signature {
        Signature::new().result(ResultSpec::new(Self::ITEM).types(ValueType::Str))
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        call.set(Self::ITEM, "lemon")?;
        Ok(None)
    }
}

define_unit!(UseItem {
    USER = "user",
    ITEM = "item",
    WAS_USED = "was_used"
});

#[async_trait]
impl LogicUnit for UseItem {
    fn signature(&self) -> Signature {
        Signature::new()
            .with_context()
            .arg(ArgSpec::new(Self::USER).types(ValueType::of::<User>()))
            .arg(ArgSpec::new(Self::ITEM).types(ValueType::Str))
            .result(
                ResultSpec::new(Self::WAS_USED)
                    .types(ValueType::Bool)
                    .default(false),
            )
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        let user = call.object::<User>(Self::USER)?;
        let item = call.arg(Self::ITEM)?.as_str().unwrap_or_default().to_string();
        call.context()?
            .reply(format!("{} used the {}", user.name, item));
        call.set(Self::WAS_USED, true)?;
        Ok(None)
    }
}

fn item_schema() -> Schema {
    Schema::builder("ItemContext")
        .field(Field::new("user").types([ValueType::of::<User>(), ValueType::Null]))
        .field(Field::new("item").types([ValueType::Str, ValueType::Null]))
        .field(Field::new("was_used").types([ValueType::Bool, ValueType::Null]))
        .build()
}

fn item_workflow() -> Workflow {
    let schema = item_schema();
    let authorize = Unit::new(IsUserAuthorized {
        action: "eat".to_string(),
    });
    let make = Unit::new(MakeItem);
    let use_item = Unit::new(UseItem);

    Workflow::builder()
        .name("use_item")
        .step(Step::builder(authorize.clone()).arg_map(authorize.auto_map()))
        .step(Step::builder(make.clone()).result_map(make.result_map(&schema)))
        .step(
            Step::builder(use_item.clone())
                .arg_map(use_item.auto_map())
                .result_map(use_item.result_map(&schema)),
        )
        .build()
}

fn context_for(user: User) -> Context {
    let mut ctx = Context::with_schema(item_schema());
    ctx.set("user", Value::object(user))
        .expect("user field accepts users");
    ctx
}

#[tokio::test]
async fn test_authorized_user_uses_item() {
    let workflow = item_workflow();
    let mut ctx = context_for(User::new("bob", &["eat"]));

    let output = workflow.execute(&mut ctx).await.expect("workflow failed");

    assert!(output.is_context());
    assert_eq!(ctx.get("item").ok(), Some(&Value::from("lemon")));
    assert_eq!(ctx.get("was_used").ok(), Some(&Value::Bool(true)));
    assert_eq!(ctx.replies(), vec![Value::from("bob used the lemon")]);
    assert_eq!(ctx.workflow_name(), Some("use_item"));
}

#[tokio::test]
async fn test_unauthorized_user_stops_workflow() {
    let workflow = item_workflow();
    let mut ctx = context_for(User::new("mallory", &["throw"]));

    let error = workflow
        .execute(&mut ctx)
        .await
        .expect_err("permission should be denied");

    let denied = error
        .downcast_ref::<PermissionDenied>()
        .expect("original error preserved");
    assert_eq!(denied.action, "eat");
    assert_eq!(error.to_string(), "mallory may not eat");
    assert!(!ctx.is_set("item"));
    assert!(!ctx.is_set("was_used"));
    assert!(ctx.replies().is_empty());
}

fn returns_bar() -> FnCallable {
    FnCallable::new("returns_bar", |_kwargs: Kwargs| {
        let mut result = Map::new();
        result.insert("returned".to_string(), Value::from("bar"));
        Ok(Value::Map(result))
    })
}

#[tokio::test]
async fn test_result_map_copies_returned_key() {
    let step = Step::builder(returns_bar())
        .result_map(ResultMap::new().entry("baz", "returned"))
        .build();

    let mut ctx = Context::new();
    assert!(!ctx.is_set("baz"));
    assert!(matches!(step.execute(&mut ctx).await, StepOutcome::Continue));
    assert_eq!(ctx.get("baz").ok(), Some(&Value::from("bar")));
}

#[tokio::test]
async fn test_result_map_entries_apply_in_order() {
    let nested = FnCallable::new("nested", |_kwargs: Kwargs| {
        let raw = serde_json::json!({
            "returned": {"bar": "first", "items": ["a", "b"]}
        });
        serde_json::from_value::<Value>(raw).map_err(Interrupt::unhandled)
    });
    let step = Step::builder(nested)
        .result_map(
            ResultMap::new()
                .entry("baz", ["returned", "bar"])
                .entry("second", ["returned", "items", "1"])
                .entry_fn("baz", |result, ctx| {
                    let bar = result
                        .lookup("returned")
                        .and_then(|r| r.lookup("bar"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Ok(Value::from(format!("{}:{}", bar, ctx.is_set("second"))))
                }),
        )
        .build();

    let mut ctx = Context::new();
    step.call(&mut ctx).await.expect("step succeeds");
    assert_eq!(ctx.get("second").ok(), Some(&Value::from("b")));
    // Re-mapping "baz" keeps its slot ahead of "second".
    assert_eq!(ctx.get("baz").ok(), Some(&Value::from("first:false")));
}

define_unit!(Farm {
    COW = "cow",
    PIG = "pig"
});

#[async_trait]
impl LogicUnit for Farm {
    fn signature(&self) -> Signature {
        Signature::new()
            .arg(ArgSpec::new(Self::COW).types(ValueType::Bool))
            .arg(ArgSpec::new(Self::PIG).default("not kosher"))
            .output("seen")
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        let seen = Value::Map(call.kwargs().clone());
        call.set("seen", seen)?;
        Ok(None)
    }
}

#[tokio::test]
async fn test_auto_map_leaves_defaulted_parameter() {
    let step = Step::auto(Farm)
        .result_map(ResultMap::new().entry("seen", "seen"))
        .build();

    let mut ctx = Context::new();
    ctx.set("cow", true).expect("open field");
    step.call(&mut ctx).await.expect("pig has a default");

    let seen = ctx.get("seen").expect("seen mapped");
    assert_eq!(seen.lookup("cow"), Some(&Value::Bool(true)));
    assert_eq!(seen.lookup("pig"), Some(&Value::from("not kosher")));
}

#[tokio::test]
async fn test_auto_map_missing_required_field() {
    let workflow = Workflow::new([Step::auto(Farm)]);

    let mut ctx = Context::new();
    let error = workflow.execute(&mut ctx).await.expect_err("cow is required");
    assert!(matches!(
        error,
        WorkflowError::MissingArgument { ref unit, ref argument } if unit == "Farm" && argument == "cow"
    ));
}

fn recorder(label: &'static str) -> Step {
    Step::builder(FnCallable::with_context(label, move |ctx, _kwargs| {
        ctx.reply(label);
        Ok(Value::Null)
    }))
    .build()
}

fn aborter(reason: &'static str) -> Step {
    Step::builder(FnCallable::with_context("aborter", move |ctx, _kwargs| {
        ctx.reply("aborting");
        Err(Abort::because(reason).into())
    }))
    .build()
}

#[tokio::test]
async fn test_abort_stops_and_returns_context() {
    let workflow = Workflow::new([recorder("first"), aborter("enough"), recorder("never")]);

    let mut ctx = Context::new();
    let output = workflow.execute(&mut ctx).await.expect("abort is not an error");

    assert_eq!(output, RunOutput::Context);
    assert_eq!(
        ctx.replies(),
        vec![Value::from("first"), Value::from("aborting")]
    );
}

#[tokio::test]
async fn test_custom_abort_handler_result() {
    let workflow = Workflow::builder()
        .steps(vec![aborter("out of pie"), recorder("never")])
        .on_abort(|ctx, abort| {
            ctx.set("aborted", true)?;
            Ok(RunOutput::Value(Value::from(abort.reason())))
        })
        .build();

    let mut ctx = Context::new();
    let output = workflow.execute(&mut ctx).await.expect("handler succeeds");

    assert_eq!(output.value(), Some(&Value::from("out of pie")));
    assert_eq!(ctx.get("aborted").ok(), Some(&Value::Bool(true)));
    assert_eq!(ctx.replies(), vec![Value::from("aborting")]);
}

#[tokio::test]
async fn test_skip_keeps_partial_effects() {
    let partial = Step::builder(FnCallable::with_context("partial", |ctx, _kwargs| {
        ctx.set("half_done", true)?;
        ctx.reply("skipping");
        Err(Interrupt::Skip)
    }))
    .result_map(ResultMap::new().entry("never", "missing"))
    .build();
    let workflow = Workflow::new([partial, recorder("after")]);

    let mut ctx = Context::new();
    workflow.execute(&mut ctx).await.expect("skip is not an error");

    assert_eq!(ctx.get("half_done").ok(), Some(&Value::Bool(true)));
    assert!(!ctx.is_set("never"));
    assert_eq!(
        ctx.replies(),
        vec![Value::from("skipping"), Value::from("after")]
    );
}

#[tokio::test]
async fn test_custom_error_handler_degrades_gracefully() {
    let handled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&handled);

    let workflow = Workflow::builder()
        .step(Step::auto(Farm))
        .step(recorder("never"))
        .on_error(move |error, _ctx| {
            if let Ok(mut handled) = sink.lock() {
                handled.push(error.to_string());
            }
            Ok(RunOutput::Value(Value::from("sentinel")))
        })
        .build();

    let mut ctx = Context::new();
    let output = workflow.execute(&mut ctx).await.expect("handler succeeds");

    assert_eq!(output.value(), Some(&Value::from("sentinel")));
    assert!(ctx.replies().is_empty());
    let handled = handled.lock().expect("lock poisoned");
    assert_eq!(handled.as_slice(), ["Missing argument 'cow' for 'Farm'"]);
}

#[tokio::test]
async fn test_reply_handler_observes_replies() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    let workflow = Workflow::builder()
        .name("chatty")
        .steps(vec![recorder("one"), recorder("two")])
        .on_reply(move |reply, ctx| {
            if let Ok(mut observed) = sink.lock() {
                observed.push(format!(
                    "{}:{}",
                    ctx.workflow_name().unwrap_or_default(),
                    reply.as_str().unwrap_or_default()
                ));
            }
        })
        .build();

    let mut ctx = Context::new();
    workflow.execute(&mut ctx).await.expect("workflow failed");

    let observed = observed.lock().expect("lock poisoned");
    assert_eq!(observed.as_slice(), ["chatty:one", "chatty:two"]);
    assert_eq!(ctx.replies(), vec![Value::from("one"), Value::from("two")]);
}

#[tokio::test]
async fn test_invalid_context_assignment_is_an_error() {
    let writes_number = Step::builder(FnCallable::new("writes_number", |_kwargs: Kwargs| {
        Ok(Value::Int(3))
    }))
    .result_map(ResultMap::from_fn(|result, ctx| {
        ctx.set("item", result.clone())?;
        Ok(())
    }))
    .build();
    let workflow = Workflow::new([writes_number]);

    let mut ctx = Context::with_schema(item_schema());
    let error = workflow
        .execute(&mut ctx)
        .await
        .expect_err("item only accepts strings");
    match error {
        WorkflowError::InvalidContextAssignment { field, expected, .. } => {
            assert_eq!(field, "item");
            assert_eq!(expected, TypeSet::new([ValueType::Str, ValueType::Null]));
        }
        other => unreachable!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_composition_copies_step_lists() {
    let a = Workflow::builder()
        .name("a")
        .steps(vec![recorder("a1"), recorder("a2")])
        .build();
    let b = Workflow::new([recorder("b1")]);
    let extra = recorder("c1");

    let mut combined = a.combine(&b);
    assert_eq!(combined.name(), Some("a"));
    assert_eq!(combined.len(), 3);
    assert_eq!(&combined.steps()[..2], a.steps());
    assert_eq!(&combined.steps()[2..], b.steps());

    combined.add_step(extra.clone());
    combined.steps_mut().remove(0);
    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 1);

    let with_step = &a + &extra;
    assert_eq!(with_step.steps().last(), Some(&extra));
    assert_eq!(a.len(), 2);

    let owned = a.clone() + b.clone() + extra;
    assert_eq!(owned.len(), 4);
    assert_eq!(a.len(), 2);
}

#[tokio::test]
async fn test_combined_workflow_runs_in_order() {
    let first = Workflow::new([recorder("one")]);
    let second = Workflow::new([recorder("two"), recorder("three")]);

    let mut ctx = Context::new();
    (&first + &second)
        .execute(&mut ctx)
        .await
        .expect("workflow failed");
    assert_eq!(
        ctx.replies(),
        vec![Value::from("one"), Value::from("two"), Value::from("three")]
    );
}

define_unit!(SlowEcho {
    INPUT = "input",
    ECHO = "echo"
});

#[async_trait]
impl LogicUnit for SlowEcho {
    fn signature(&self) -> Signature {
        Signature::new()
            .arg(ArgSpec::new(Self::INPUT).types(ValueType::Int))
            .result(ResultSpec::new(Self::ECHO).types(ValueType::Int))
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        let input = call.arg(Self::INPUT)?.clone();
        call.set(Self::ECHO, input)?;
        tokio::time::sleep(Duration::from_millis(5)).await;
        tokio::task::yield_now().await;
        Ok(None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_share_one_workflow() {
    let echo = Unit::new(SlowEcho);
    let workflow = Arc::new(Workflow::new([Step::builder(echo.clone())
        .arg_map(echo.auto_map())
        .result_map(ResultMap::new().entry("echo", SlowEcho::ECHO))]));

    let handles: Vec<_> = (0..16i64)
        .map(|n| {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move {
                let mut ctx = Context::new();
                ctx.set("input", n)?;
                workflow.execute(&mut ctx).await?;
                Ok::<_, WorkflowError>((n, ctx.get("echo")?.clone()))
            })
        })
        .collect();

    for handle in handles {
        let (n, echoed) = handle
            .await
            .expect("task panicked")
            .expect("workflow failed");
        assert_eq!(echoed, Value::Int(n));
    }
}

#[tokio::test]
async fn test_extra_kwargs_loaded_from_config() {
    let config = r#"{"pig": "wilbur", "cow": false}"#;
    let extra: Kwargs = serde_json::from_str(config).expect("valid kwargs");

    let step = Step::auto(Farm)
        .extra_kwargs(extra)
        .result_map(ResultMap::new().entry("seen", "seen"))
        .build();

    let mut ctx = Context::new();
    ctx.set("cow", true).expect("open field");
    step.call(&mut ctx).await.expect("step succeeds");

    let seen = ctx.get("seen").expect("seen mapped");
    assert_eq!(seen.lookup("cow"), Some(&Value::Bool(false)));
    assert_eq!(seen.lookup("pig"), Some(&Value::from("wilbur")));
}

#[tokio::test]
async fn test_registry_backed_steps() {
    let mut registry = Registry::new();
    registry
        .register("pies.returns_bar", returns_bar())
        .register("pies.farm", Unit::new(Farm));

    let step = registry
        .step("pies.returns_bar")
        .expect("registered")
        .result_map(ResultMap::new().entry("baz", ResultSource::from("returned")))
        .build();
    let workflow = Workflow::new([step]);

    let mut ctx = Context::new();
    workflow.execute(&mut ctx).await.expect("workflow failed");
    assert_eq!(ctx.get("baz").ok(), Some(&Value::from("bar")));

    assert!(matches!(
        registry.step("pies.missing"),
        Err(WorkflowError::NotFound(ref name)) if name == "pies.missing"
    ));
}

#[tokio::test]
async fn test_unexpected_kwarg_rejected() {
    let step = Step::builder(Unit::new(MakeItem))
        .extra_kwarg("flavour", "lemon")
        .build();

    let mut ctx = Context::new();
    assert!(matches!(
        step.execute(&mut ctx).await,
        StepOutcome::Error(WorkflowError::UnexpectedArgument { ref argument, .. }) if argument == "flavour"
    ));
}
