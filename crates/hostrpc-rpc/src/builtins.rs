//! The built-in `rpc` module.
//!
//! Built-ins are keyed by [`MethodIdentifier`] like graph nodes and
//! resolve with the same exact-then-varargs rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use hostrpc_registry::{InvokeError, MethodIdentifier, MethodReport, ParamKind};
use serde_json::{Map, Value, json};

use crate::context::CallContext;
use crate::errors::RpcError;
use crate::types::Notification;

/// A method implemented by the server itself.
pub trait BuiltinMethod: Send + Sync {
    /// Execute with coerced arguments.
    fn call(&self, args: &[Value], ctx: &mut CallContext<'_>) -> Result<Value, RpcError>;
}

struct Entry {
    result: ParamKind,
    handler: Arc<dyn BuiltinMethod>,
}

/// Table of built-in methods.
#[derive(Default)]
pub struct BuiltinRegistry {
    methods: BTreeMap<MethodIdentifier, Entry>,
}

impl BuiltinRegistry {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the standard `rpc.*` methods.
    pub fn with_defaults() -> Self {
        use ParamKind::{Object, ObjectArray, String as Str, StringArray, Void};

        let mut table = Self::new();
        table.register("rpc.on", vec![StringArray], Object, OnHandler);
        table.register("rpc.off", vec![StringArray], Object, OffHandler);
        table.register("rpc.echo", vec![Str], Str, EchoHandler);
        table.register("rpc.broadcast", vec![Str], Void, BroadcastHandler);
        table.register("rpc.broadcast", vec![Str, Object], Void, BroadcastHandler);
        table.register("rpc.broadcast", vec![Str, ObjectArray], Void, BroadcastHandler);
        table.register("rpc.report", vec![], Object, ReportHandler);
        table.register("rpc.config", vec![], Object, ConfigHandler);
        table
    }

    /// Register a handler under `name(params)`.
    pub fn register(
        &mut self,
        name: &str,
        params: Vec<ParamKind>,
        result: ParamKind,
        handler: impl BuiltinMethod + 'static,
    ) {
        let _ = self.methods.insert(
            MethodIdentifier::new(name, params),
            Entry {
                result,
                handler: Arc::new(handler),
            },
        );
    }

    /// Exact lookup.
    pub fn get(&self, identifier: &MethodIdentifier) -> Option<Arc<dyn BuiltinMethod>> {
        self.methods.get(identifier).map(|e| e.handler.clone())
    }

    /// Whether `identifier` is registered.
    pub fn contains(&self, identifier: &MethodIdentifier) -> bool {
        self.methods.contains_key(identifier)
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Report entries, sorted by identifier.
    pub fn reports(&self) -> Vec<MethodReport> {
        self.methods
            .iter()
            .map(|(identifier, entry)| MethodReport {
                method: identifier.name().to_owned(),
                params: identifier.param_expressions(),
                result: entry.result.expression().to_owned(),
            })
            .collect()
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// Flatten string arguments, spreading arrays.
fn string_args(args: &[Value]) -> Vec<String> {
    let mut names = Vec::new();
    for arg in args {
        match arg {
            Value::String(s) => names.push(s.clone()),
            Value::Array(items) => {
                names.extend(items.iter().filter_map(Value::as_str).map(str::to_owned));
            }
            _ => {}
        }
    }
    names
}

fn subscription_status(err: &InvokeError) -> String {
    match err {
        InvokeError::EventNotFound(_) => "Event not found".to_owned(),
        other => {
            let message = other.to_string();
            if message.is_empty() {
                "Internal Error".to_owned()
            } else {
                message
            }
        }
    }
}

/// `rpc.on(string...)`: subscribe the caller to each event.
struct OnHandler;

impl BuiltinMethod for OnHandler {
    fn call(&self, args: &[Value], ctx: &mut CallContext<'_>) -> Result<Value, RpcError> {
        let mut statuses = Map::new();
        for name in string_args(args) {
            let status = match ctx.registry.subscribe(&name, ctx.client) {
                Ok(outcome) => {
                    ctx.effects
                        .notifications
                        .extend(outcome.immediate.into_iter().map(Notification::from));
                    ctx.effects.replays.extend(outcome.replays);
                    "ok".to_owned()
                }
                Err(err) => subscription_status(&err),
            };
            let _ = statuses.insert(name, Value::String(status));
        }
        Ok(Value::Object(statuses))
    }
}

/// `rpc.off(string...)`: unsubscribe the caller from each event.
struct OffHandler;

impl BuiltinMethod for OffHandler {
    fn call(&self, args: &[Value], ctx: &mut CallContext<'_>) -> Result<Value, RpcError> {
        let mut statuses = Map::new();
        for name in string_args(args) {
            let status = match ctx.registry.unsubscribe(&name, ctx.client) {
                Ok(()) => "ok".to_owned(),
                Err(err) => subscription_status(&err),
            };
            let _ = statuses.insert(name, Value::String(status));
        }
        Ok(Value::Object(statuses))
    }
}

struct EchoHandler;

impl BuiltinMethod for EchoHandler {
    fn call(&self, args: &[Value], _ctx: &mut CallContext<'_>) -> Result<Value, RpcError> {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    }
}

/// `rpc.broadcast(name, params...)`: notify every connected client.
struct BroadcastHandler;

impl BuiltinMethod for BroadcastHandler {
    fn call(&self, args: &[Value], ctx: &mut CallContext<'_>) -> Result<Value, RpcError> {
        let Some((Value::String(name), rest)) = args.split_first() else {
            return Err(RpcError::invalid_params("notification name should be string."));
        };
        let mut params = Vec::new();
        for arg in rest {
            match arg {
                Value::Array(items) => params.extend(items.iter().cloned()),
                other => params.push(other.clone()),
            }
        }
        ctx.effects
            .broadcasts
            .push(Notification::new(name.clone(), params));
        Ok(Value::Null)
    }
}

/// `rpc.report()`: every method and event the session exposes.
struct ReportHandler;

impl BuiltinMethod for ReportHandler {
    fn call(&self, _args: &[Value], ctx: &mut CallContext<'_>) -> Result<Value, RpcError> {
        let mut methods = ctx.builtins.reports();
        methods.extend(ctx.registry.method_reports());
        Ok(json!({
            "reportedOn": chrono::Utc::now().to_rfc3339(),
            "methods": methods,
            "events": ctx.registry.event_reports(),
        }))
    }
}

/// `rpc.config()`: active settings, without secrets.
struct ConfigHandler;

impl BuiltinMethod for ConfigHandler {
    fn call(&self, _args: &[Value], ctx: &mut CallContext<'_>) -> Result<Value, RpcError> {
        Ok(ctx.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Effects;
    use hostrpc_registry::{ClientId, Registry};

    fn call(
        table: &BuiltinRegistry,
        name: &str,
        params: Vec<ParamKind>,
        args: &[Value],
        effects: &mut Effects,
    ) -> Result<Value, RpcError> {
        let mut registry = Registry::default();
        let client = ClientId::from("c1");
        let config = json!({"server": {"port": 8887}});
        let handler = table.get(&MethodIdentifier::new(name, params)).unwrap();
        let mut ctx = CallContext {
            client: &client,
            registry: &mut registry,
            builtins: table,
            config: &config,
            effects,
        };
        handler.call(args, &mut ctx)
    }

    #[test]
    fn defaults_registered() {
        let table = BuiltinRegistry::with_defaults();
        assert_eq!(table.len(), 8);
        assert!(table.contains(&MethodIdentifier::new(
            "rpc.on",
            vec![ParamKind::StringArray]
        )));
    }

    #[test]
    fn echo_returns_argument() {
        let table = BuiltinRegistry::with_defaults();
        let mut effects = Effects::default();
        let out = call(&table, "rpc.echo", vec![ParamKind::String], &[json!("hi")], &mut effects);
        assert_eq!(out.unwrap(), json!("hi"));
        assert!(effects.is_empty());
    }

    #[test]
    fn on_reports_unknown_events() {
        let table = BuiltinRegistry::with_defaults();
        let mut effects = Effects::default();
        let out = call(
            &table,
            "rpc.on",
            vec![ParamKind::StringArray],
            &[json!(["a.b", "c.d"])],
            &mut effects,
        )
        .unwrap();
        assert_eq!(out, json!({"a.b": "Event not found", "c.d": "Event not found"}));
    }

    #[test]
    fn broadcast_spreads_object_array() {
        let table = BuiltinRegistry::with_defaults();
        let mut effects = Effects::default();
        let out = call(
            &table,
            "rpc.broadcast",
            vec![ParamKind::String, ParamKind::ObjectArray],
            &[json!("chat"), json!([{"a": 1}, {"b": 2}])],
            &mut effects,
        )
        .unwrap();
        assert_eq!(out, Value::Null);
        assert_eq!(
            effects.broadcasts,
            vec![Notification::new("chat", vec![json!({"a": 1}), json!({"b": 2})])]
        );
    }

    #[test]
    fn report_lists_builtins() {
        let table = BuiltinRegistry::with_defaults();
        let mut effects = Effects::default();
        let out = call(&table, "rpc.report", vec![], &[], &mut effects).unwrap();
        let methods = out["methods"].as_array().unwrap();
        assert_eq!(methods.len(), 8);
        assert_eq!(methods[0]["method"], "rpc.broadcast");
        assert_eq!(methods[0]["params"], json!(["string"]));
        assert_eq!(methods[0]["result"], "void");
        assert!(out["reportedOn"].is_string());
        assert_eq!(out["events"], json!([]));
    }

    #[test]
    fn config_is_passed_through() {
        let table = BuiltinRegistry::with_defaults();
        let mut effects = Effects::default();
        let out = call(&table, "rpc.config", vec![], &[], &mut effects).unwrap();
        assert_eq!(out["server"]["port"], 8887);
    }

    #[test]
    fn status_messages() {
        assert_eq!(
            subscription_status(&InvokeError::EventNotFound("x".into())),
            "Event not found"
        );
        assert_eq!(
            subscription_status(&InvokeError::Sticky(String::new())),
            "Internal Error"
        );
        assert_eq!(subscription_status(&InvokeError::Sticky("gone".into())), "gone");
    }
}
