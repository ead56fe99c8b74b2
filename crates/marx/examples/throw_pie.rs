//! Throwing a pie, split into reusable logic units.

use async_trait::async_trait;
use marx::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
struct User {
    name: String,
    pies_made: AtomicU32,
    things_thrown: AtomicU32,
}

impl User {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pies_made: AtomicU32::new(0),
            things_thrown: AtomicU32::new(0),
        }
    }
}

#[derive(Debug)]
struct PermissionDenied(String);

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permission denied: {}", self.0)
    }
}

impl std::error::Error for PermissionDenied {}

/// Checks that the user may perform the configured action.
#[derive(Debug)]
struct IsUserAuthorized {
    action: String,
}

field_names!(IsUserAuthorized { USER = "user" });

#[async_trait]
impl LogicUnit for IsUserAuthorized {
    fn signature(&self) -> Signature {
        Signature::new().arg(
            ArgSpec::new(Self::USER)
                .types(ValueType::of::<User>())
                .docs("The user performing the action"),
        )
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        let user = call.object::<User>(Self::USER)?;
        if matches!(user.name.as_str(), "bob" | "mary") {
            return Ok(None);
        }
        tracing::warn!("{} attempted illegal action '{}'", user.name, self.action);
        Err(Interrupt::unhandled(PermissionDenied(self.action.clone())))
    }
}

define_unit!(MakePie {
    MAKER = "maker",
    PIE = "pie"
});

#[async_trait]
impl LogicUnit for MakePie {
    fn signature(&self) -> Signature {
        Signature::new()
            .arg(ArgSpec::new(Self::MAKER).types(ValueType::of::<User>()))
            .result(
                ResultSpec::new(Self::PIE)
                    .types(ValueType::Str)
                    .docs("Kind of pie"),
            )
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        call.object::<User>(Self::MAKER)?
            .pies_made
            .fetch_add(1, Ordering::Relaxed);
        call.set(Self::PIE, "lemon")?;
        Ok(None)
    }
}

define_unit!(ThrowThing {
    ACTOR = "actor",
    THING = "thing",
    TARGET = "target",
    HIT = "hit"
});

#[async_trait]
impl LogicUnit for ThrowThing {
    fn signature(&self) -> Signature {
        Signature::new()
            .with_context()
            .arg(ArgSpec::new(Self::ACTOR).types(ValueType::of::<User>()))
            .param(Self::THING)
            .param(Self::TARGET)
            .result(
                ResultSpec::new(Self::HIT)
                    .types(ValueType::Bool)
                    .default(false)
                    .docs("Did we get 'em?"),
            )
    }

    async fn call(&self, call: &mut UnitCall<'_>) -> Result<Option<Value>, Interrupt> {
        let actor = call.object::<User>(Self::ACTOR)?;
        let target = call.object::<User>(Self::TARGET)?;
        let thing = call.arg(Self::THING)?.as_str().unwrap_or("something").to_string();

        let thrown = actor.things_thrown.fetch_add(1, Ordering::Relaxed);
        call.context()?
            .reply(format!("{} threw a {} pie at {}", actor.name, thing, target.name));
        call.set(Self::HIT, thrown % 2 == 0)?;
        Ok(None)
    }
}

fn throw_pie_schema() -> Schema {
    Schema::builder("ThrowPieContext")
        .extend(&Schema::default())
        .field(Field::new("thrower").docs("Somebody has to throw it"))
        .field(Field::new("target").docs("At somebody"))
        .field(
            Field::new("pie")
                .types([ValueType::Str, ValueType::Null])
                .docs("A pie, which we make along the way"),
        )
        .field(
            Field::new("was_hit")
                .types([ValueType::Bool, ValueType::Null])
                .docs("Success of the throwing event"),
        )
        .build()
}

fn throw_pie_workflow(schema: &Schema) -> Workflow {
    let authorize = Unit::new(IsUserAuthorized {
        action: "throw_pie".to_string(),
    });
    let make_pie = Unit::new(MakePie);
    let throw = Unit::new(ThrowThing);

    let mut workflow = Workflow::builder()
        .name("throw_pie")
        .on_reply(|reply, _ctx| {
            if let Some(message) = reply.as_str() {
                println!("> {}", message);
            }
        })
        .build();

    workflow
        .add_step(
            Step::builder(authorize)
                .arg_map(ArgMap::fields([(IsUserAuthorized::USER, "thrower")]))
                .docs("Only some people may throw pies"),
        )
        .add_step(
            Step::builder(make_pie.clone())
                .arg_map(ArgMap::fields([(MakePie::MAKER, "thrower")]))
                .result_map(make_pie.result_map(schema)),
        )
        .add_step(
            Step::builder(throw.clone())
                .arg_map(
                    throw
                        .auto_map()
                        .overrides([(ThrowThing::ACTOR, "thrower"), (ThrowThing::THING, "pie")]),
                )
                .result_map(ResultMap::new().entry("was_hit", ThrowThing::HIT)),
        );
    workflow
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let schema = throw_pie_schema();
    let workflow = throw_pie_workflow(&schema);

    for thrower in ["bob", "eve"] {
        let mut ctx = Context::with_schema(schema.clone());
        ctx.set("thrower", Value::object(User::new(thrower)))?;
        ctx.set("target", Value::object(User::new("fred")))?;

        match workflow.execute(&mut ctx).await {
            Ok(_) => {
                println!(
                    "{} made a {} pie; hit: {}",
                    thrower,
                    ctx.get("pie")?.as_str().unwrap_or("mystery"),
                    ctx.get("was_hit")?.as_bool().unwrap_or(false)
                );
            }
            Err(error) => {
                eprintln!("Workflow failed: {}", error);
            }
        }
    }

    Ok(())
}
