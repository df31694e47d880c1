//! The `test` module: a tiny host object used to exercise overloads,
//! named parameters and the vararg fallback from real clients.

use std::sync::Arc;

use hostrpc_registry::{
    HostError, HostObject, HostValue, MethodSchema, ModuleSpec, ParamKind, SchemaCatalog,
    TypeSchema,
};
use serde_json::{Value, json};

/// Module name.
pub const MODULE_NAME: &str = "test";
/// Catalog type of the module root.
pub const ROOT_TYPE: &str = "TestModule";

/// Stateless host object behind `test.*`.
#[derive(Debug, Default)]
pub struct TestModule;

/// Add the module's type to `catalog`.
pub fn register_schema(catalog: &mut SchemaCatalog) {
    use ParamKind::{Number, Object, String as Str, StringArray};

    catalog.register(
        TypeSchema::object(ROOT_TYPE)
            .method(MethodSchema::new("echo").params([Str]).returns(Str))
            .method(MethodSchema::new("nop"))
            .method(MethodSchema::new("sum").params([Number, Number]).returns(Number))
            .method(
                MethodSchema::new("sum")
                    .params([Number, Number, Number])
                    .returns(Number),
            )
            .method(MethodSchema::new("sum").params([Object]).returns(Number))
            .method(MethodSchema::new("concat").params([Str, Str]).returns(Str))
            .method(MethodSchema::new("concat").params([Object]).returns(Str))
            .method(MethodSchema::new("repeat").params([Str, Number]).returns(Str))
            .method(MethodSchema::new("repeat").params([Object]).returns(Str))
            .method(MethodSchema::new("join").params([StringArray]).returns(Str)),
    );
}

/// Module spec rooted at a fresh [`TestModule`].
pub fn module() -> ModuleSpec {
    ModuleSpec::new(MODULE_NAME, ROOT_TYPE, Arc::new(TestModule))
}

fn pair(object: &Value) -> Result<(&Value, &Value), HostError> {
    match (object.get("left"), object.get("right")) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(HostError::new("expected an object with 'left' and 'right'")),
    }
}

fn text(value: &Value) -> Result<&str, HostError> {
    value
        .as_str()
        .ok_or_else(|| HostError::new(format!("expected a string, got {value}")))
}

fn sum(values: &[&Value]) -> Result<Value, HostError> {
    let ints: Option<Vec<i64>> = values.iter().map(|v| v.as_i64()).collect();
    if let Some(ints) = ints {
        return ints
            .into_iter()
            .try_fold(0_i64, i64::checked_add)
            .map(Value::from)
            .ok_or_else(|| HostError::new("integer overflow"));
    }
    let mut total = 0.0;
    for value in values {
        total += value
            .as_f64()
            .ok_or_else(|| HostError::new(format!("expected a number, got {value}")))?;
    }
    Ok(json!(total))
}

fn repeat(s: &str, count: &Value) -> Result<Value, HostError> {
    let count = count
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| HostError::new(format!("repeat count must be a non-negative integer, got {count}")))?;
    Ok(Value::String(s.repeat(count)))
}

impl HostObject for TestModule {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        let value = match (method, args) {
            ("echo", [s]) => Value::String(text(s)?.to_owned()),
            ("nop", []) => return Ok(HostValue::Void),
            ("sum", [object @ Value::Object(_)]) => {
                let (left, right) = pair(object)?;
                sum(&[left, right])?
            }
            ("sum", [a, b]) => sum(&[a, b])?,
            ("sum", [a, b, c]) => sum(&[a, b, c])?,
            ("concat", [object @ Value::Object(_)]) => {
                let (left, right) = pair(object)?;
                Value::String(format!("{}{}", text(left)?, text(right)?))
            }
            ("concat", [a, b]) => Value::String(format!("{}{}", text(a)?, text(b)?)),
            ("repeat", [object @ Value::Object(_)]) => {
                let (left, right) = pair(object)?;
                repeat(text(left)?, right)?
            }
            ("repeat", [s, count]) => repeat(text(s)?, count)?,
            ("join", [Value::Array(parts)]) => {
                let mut joined = String::new();
                for part in parts {
                    joined.push_str(text(part)?);
                }
                Value::String(joined)
            }
            _ => return Err(HostError::unknown_method(method, args.len())),
        };
        Ok(HostValue::Json(value))
    }
}
