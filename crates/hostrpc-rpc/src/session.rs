//! Dispatch of decoded requests to built-ins and graph nodes.

use std::time::Instant;

use hostrpc_registry::{ClientId, MethodIdentifier, ParamKind, Registry, Resolved};
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{error, warn};

use crate::adapter::unwrap_single_array;
use crate::builtins::BuiltinRegistry;
use crate::context::{CallContext, Effects};
use crate::errors::RpcError;
use crate::types::Request;

/// Dispatch target of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A built-in method.
    Builtin {
        /// Matched identifier.
        identifier: MethodIdentifier,
        /// Matched through the vararg fallback.
        varargs: bool,
    },
    /// A graph node.
    Node(Resolved),
}

impl Target {
    fn varargs(&self) -> bool {
        match self {
            Self::Builtin { varargs, .. } => *varargs,
            Self::Node(resolved) => resolved.varargs,
        }
    }
}

/// Registry, built-ins and settings of one server.
pub struct RpcSession {
    registry: Registry,
    builtins: BuiltinRegistry,
    config: Value,
}

impl RpcSession {
    /// Create a session over a built registry.
    pub fn new(registry: Registry, builtins: BuiltinRegistry) -> Self {
        Self {
            registry,
            builtins,
            config: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the JSON returned by `rpc.config`.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// The graph registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The graph registry, mutably.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The built-in table.
    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    /// Resolve a call.
    ///
    /// Exact built-in, exact node, vararg built-in, vararg node.
    pub fn resolve(&self, name: &str, kinds: &[ParamKind]) -> Option<Target> {
        let identifier = MethodIdentifier::new(name, kinds.to_vec());
        if self.builtins.contains(&identifier) {
            return Some(Target::Builtin {
                identifier,
                varargs: false,
            });
        }
        if let Some(node) = self.registry.lookup(&identifier) {
            return Some(Target::Node(Resolved {
                node,
                varargs: false,
            }));
        }
        let varargs = identifier.to_varargs()?;
        if self.builtins.contains(&varargs) {
            return Some(Target::Builtin {
                identifier: varargs,
                varargs: true,
            });
        }
        self.registry.lookup(&varargs).map(|node| {
            Target::Node(Resolved {
                node,
                varargs: true,
            })
        })
    }

    /// Resolve `request` as sent, then with a lone array argument unwrapped.
    fn resolve_request(&self, request: &Request) -> Result<Option<(Target, Vec<Value>)>, RpcError> {
        if let Some(target) = self.resolve(&request.method, &request.kinds) {
            return Ok(Some((target, request.params.clone())));
        }
        let Some(unwrapped) = unwrap_single_array(&request.params) else {
            return Ok(None);
        };
        let (params, kinds) = unwrapped?;
        Ok(self
            .resolve(&request.method, &kinds)
            .map(|target| (target, params)))
    }

    /// Execute one request on behalf of `client`.
    pub fn call(
        &mut self,
        request: &Request,
        client: &ClientId,
        effects: &mut Effects,
    ) -> Result<Value, RpcError> {
        let method = request.method.clone();
        counter!("rpc_requests_total", "method" => method.clone()).increment(1);

        let Some((target, params)) = self.resolve_request(request)? else {
            counter!("rpc_errors_total", "method" => method.clone(), "error_type" => "method_not_found").increment(1);
            return Err(RpcError::method_not_found(&request.method));
        };

        let args = if target.varargs() {
            vec![Value::Array(params)]
        } else {
            params
        };

        let start = Instant::now();
        let result = match target {
            Target::Builtin { identifier, .. } => match self.builtins.get(&identifier) {
                Some(handler) => {
                    let mut ctx = CallContext {
                        client,
                        registry: &mut self.registry,
                        builtins: &self.builtins,
                        config: &self.config,
                        effects,
                    };
                    handler.call(&args, &mut ctx)
                }
                None => Err(RpcError::method_not_found(&request.method)),
            },
            Target::Node(resolved) => self
                .registry
                .invoke(resolved.node, &args)
                .map(|value| value.to_json())
                .map_err(|err| {
                    error!(method, error = %err, "invocation failed");
                    RpcError::internal(err.to_string())
                }),
        };

        if let Err(err) = &result {
            counter!("rpc_errors_total", "method" => method.clone(), "error_type" => err.kind()).increment(1);
        }

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.clone())
            .record(duration.as_secs_f64());
        if duration.as_millis() >= 500 {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        result
    }

    /// Forget everything `client` subscribed to.
    pub fn disconnect(&mut self, client: &ClientId) {
        self.registry.disconnect(client);
    }
}
