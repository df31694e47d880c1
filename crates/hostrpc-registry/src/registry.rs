//! The built registry: dispatch table, invocation and event routing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::InvokeError;
use crate::events::{EventPayload, PendingReplay, SubscribeOutcome, ValueChange};
use crate::host::{HostObject, HostValue};
use crate::ids::{ClientId, NodeId};
use crate::node::{RegistryNode, cache_key};
use crate::signature::{MethodIdentifier, ParamKind};

pub(crate) struct Module {
    pub(crate) name: String,
    pub(crate) root: Arc<dyn HostObject>,
}

/// A resolved dispatch target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Node to invoke.
    pub node: NodeId,
    /// Matched through the vararg fallback.
    pub varargs: bool,
}

/// One entry of the method report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MethodReport {
    /// Absolute method name.
    pub method: String,
    /// Parameter expressions.
    pub params: Vec<&'static str>,
    /// Result expression.
    pub result: String,
}

/// One entry of the event report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReport {
    /// Absolute event name.
    pub event: String,
    /// Bank sizes on the path, omitted for unbanked events.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bank_dimension: Vec<usize>,
    /// Build-time error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Node arena plus method and event tables.
#[derive(Default)]
pub struct Registry {
    pub(crate) nodes: Vec<RegistryNode>,
    pub(crate) modules: Vec<Module>,
    pub(crate) methods: BTreeMap<MethodIdentifier, NodeId>,
    pub(crate) events: BTreeMap<String, NodeId>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("nodes", &self.nodes.len())
            .field("modules", &self.modules.len())
            .field("methods", &self.methods)
            .field("events", &self.events)
            .finish()
    }
}

impl Registry {
    pub(crate) fn push(&mut self, node: RegistryNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &RegistryNode {
        &self.nodes[id.0]
    }

    /// Total nodes, registered or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Registered method count.
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Registered event count.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Module names in registration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// Registered method identifiers, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &MethodIdentifier> {
        self.methods.keys()
    }

    /// Look up an exact identifier.
    pub fn lookup(&self, identifier: &MethodIdentifier) -> Option<NodeId> {
        self.methods.get(identifier).copied()
    }

    /// Resolve a call: exact match first, then the vararg form.
    pub fn resolve(&self, name: &str, kinds: &[ParamKind]) -> Option<Resolved> {
        let identifier = MethodIdentifier::new(name, kinds.to_vec());
        if let Some(node) = self.lookup(&identifier) {
            return Some(Resolved {
                node,
                varargs: false,
            });
        }
        let varargs = identifier.to_varargs()?;
        self.lookup(&varargs).map(|node| Resolved {
            node,
            varargs: true,
        })
    }

    /// Event node by absolute name.
    pub fn event_id(&self, name: &str) -> Option<NodeId> {
        self.events.get(name).copied()
    }

    /// Invoke a node with the full argument list of its chain.
    ///
    /// Ancestors are invoked with the leading arguments they declare; the
    /// node itself receives the rest.
    pub fn invoke(&mut self, id: NodeId, args: &[Value]) -> Result<HostValue, InvokeError> {
        let node = &self.nodes[id.0];
        if let Some(err) = &node.error {
            return Err(InvokeError::Sticky(err.clone()));
        }
        if args.len() != node.params.len() {
            return Err(InvokeError::Arity {
                name: node.absolute_name.clone(),
                expected: node.params.len(),
                got: args.len(),
            });
        }

        let key = node.cache.as_ref().and_then(|_| cache_key(args));
        if let (Some(cache), Some(key)) = (&node.cache, &key) {
            if let Some(hit) = cache.get(key) {
                return Ok(hit.clone());
            }
        }

        let split = node.parent_param_count();
        let method = node.name.clone();
        let module = node.module;
        let parent = node.parent;
        let target = match parent {
            None => self.modules[module].root.clone(),
            Some(parent) => match self.invoke(parent, &args[..split])? {
                HostValue::Object(object) => object,
                _ => {
                    return Err(InvokeError::NotAnObject(
                        self.nodes[parent.0].absolute_name.clone(),
                    ));
                }
            },
        };

        match target.invoke(&method, &args[split..]) {
            Ok(value) => {
                let node = &mut self.nodes[id.0];
                if let (Some(cache), Some(key)) = (&mut node.cache, key) {
                    let _ = cache.insert(key, value.clone());
                }
                Ok(value)
            }
            Err(err) => {
                error!(node = %self.nodes[id.0].absolute_name, error = %err, "host invocation failed");
                Err(InvokeError::Host(err.message))
            }
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Subscribe `client` to the named event.
    pub fn subscribe(
        &mut self,
        name: &str,
        client: &ClientId,
    ) -> Result<SubscribeOutcome, InvokeError> {
        let id = self
            .event_id(name)
            .ok_or_else(|| InvokeError::EventNotFound(name.to_owned()))?;
        let node = &mut self.nodes[id.0];
        if let Some(err) = &node.error {
            return Err(InvokeError::Sticky(err.clone()));
        }
        let Some(holder) = node.event.as_mut() else {
            return Err(InvokeError::EventNotFound(name.to_owned()));
        };
        debug!(event = name, client_id = %client, "subscribe");
        Ok(holder.subscribe(id, &node.absolute_name, client))
    }

    /// Unsubscribe `client` from the named event.
    pub fn unsubscribe(&mut self, name: &str, client: &ClientId) -> Result<(), InvokeError> {
        let id = self
            .event_id(name)
            .ok_or_else(|| InvokeError::EventNotFound(name.to_owned()))?;
        let node = &mut self.nodes[id.0];
        if let Some(err) = &node.error {
            return Err(InvokeError::Sticky(err.clone()));
        }
        if let Some(holder) = node.event.as_mut() {
            debug!(event = name, client_id = %client, "unsubscribe");
            let _ = holder.unsubscribe(client);
        }
        Ok(())
    }

    /// Remove `client` from every event.
    pub fn disconnect(&mut self, client: &ClientId) {
        for node in &mut self.nodes {
            if let Some(holder) = node.event.as_mut() {
                let _ = holder.unsubscribe(client);
            }
        }
    }

    /// Route a host push to its event and return the fan-out.
    pub fn on_value_changed(&mut self, change: ValueChange) -> Option<(EventPayload, Vec<ClientId>)> {
        let node = self.nodes.get_mut(change.event.0)?;
        let holder = node.event.as_mut()?;
        holder.on_value_changed(&node.absolute_name, change.primitive, change.value)
    }

    /// Resolve a pending replay, see [`EventHolder::replay`](crate::EventHolder::replay).
    pub fn replay(&self, pending: &PendingReplay) -> Option<EventPayload> {
        let node = self.nodes.get(pending.event.0)?;
        node.event.as_ref()?.replay(&node.absolute_name, pending)
    }

    /// Drop cached results and every subscription.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            if let Some(cache) = node.cache.as_mut() {
                cache.clear();
            }
            if let Some(holder) = node.event.as_mut() {
                holder.clear();
            }
        }
    }

    // ── Reports ─────────────────────────────────────────────────────

    /// Registered methods, sorted by identifier.
    pub fn method_reports(&self) -> Vec<MethodReport> {
        self.methods
            .iter()
            .map(|(identifier, id)| MethodReport {
                method: identifier.name().to_owned(),
                params: identifier.param_expressions(),
                result: self.nodes[id.0].result_expression.clone(),
            })
            .collect()
    }

    /// Registered events, sorted by name.
    pub fn event_reports(&self) -> Vec<EventReport> {
        self.events
            .iter()
            .map(|(name, id)| {
                let node = &self.nodes[id.0];
                EventReport {
                    event: name.clone(),
                    bank_dimension: node.bank_dimension.clone(),
                    error: node.error.clone(),
                }
            })
            .collect()
    }
}
