//! Registry construction from a schema catalog and module roots.
//!
//! The builder walks each module's type depth-first. Every accepted method
//! becomes a node; nodes returning host types are recursed into. Event
//! nodes are materialized once the walk is complete, one primitive per
//! bank-index combination. With abbreviation on, every published name
//! segment goes through [`abbreviate`](crate::abbrev::abbreviate) while the
//! host is still called by the real method name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::abbrev;
use crate::errors::BuildError;
use crate::events::{ChangeSink, EventHolder, PrimitiveEvent, ValueChange, bank_combinations};
use crate::host::{HostObject, HostValue};
use crate::ids::NodeId;
use crate::node::RegistryNode;
use crate::registry::{Module, Registry};
use crate::schema::{Returns, SchemaCatalog, TypeKind, TypeSchema};
use crate::signature::MethodIdentifier;

/// Default limit on accessor chain length.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 5;

/// A named root of the host graph.
pub struct ModuleSpec {
    name: String,
    root_type: String,
    root: Arc<dyn HostObject>,
    bank_sizes: HashMap<String, usize>,
}

impl ModuleSpec {
    /// Create a module rooted at `root`, typed `root_type` in the catalog.
    pub fn new(
        name: impl Into<String>,
        root_type: impl Into<String>,
        root: Arc<dyn HostObject>,
    ) -> Self {
        Self {
            name: name.into(),
            root_type: root_type.into(),
            root,
            bank_sizes: HashMap::new(),
        }
    }

    /// Register the item count of a bank type within this module.
    #[must_use]
    pub fn with_bank_size(mut self, bank_type: impl Into<String>, size: usize) -> Self {
        let _ = self.bank_sizes.insert(bank_type.into(), size);
        self
    }

    /// Module name, the first segment of every node name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builds a [`Registry`].
pub struct RegistryBuilder {
    catalog: SchemaCatalog,
    modules: Vec<ModuleSpec>,
    max_depth: usize,
    abbreviated: bool,
    sink: ChangeSink,
}

impl RegistryBuilder {
    /// Start a builder over `catalog`.
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog,
            modules: Vec::new(),
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
            abbreviated: false,
            sink: Arc::new(|_| {}),
        }
    }

    /// Add a module.
    #[must_use]
    pub fn module(mut self, module: ModuleSpec) -> Self {
        self.modules.push(module);
        self
    }

    /// Override the chain depth limit.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Publish abbreviated node names.
    #[must_use]
    pub fn abbreviated_names(mut self, enabled: bool) -> Self {
        self.abbreviated = enabled;
        self
    }

    /// Where host pushes are delivered.
    #[must_use]
    pub fn change_sink(mut self, sink: ChangeSink) -> Self {
        self.sink = sink;
        self
    }

    /// Walk every module and materialize events.
    pub fn build(self) -> Result<Registry, BuildError> {
        let mut registry = Registry::default();
        let mut seen = HashSet::new();

        for (index, spec) in self.modules.iter().enumerate() {
            if !seen.insert(spec.name.clone()) {
                return Err(BuildError::DuplicateModule(spec.name.clone()));
            }
            let root = self
                .catalog
                .get(&spec.root_type)
                .ok_or_else(|| BuildError::UnknownType(spec.root_type.clone()))?;
            registry.modules.push(Module {
                name: spec.name.clone(),
                root: spec.root.clone(),
            });
            let mut walk = Walk {
                catalog: &self.catalog,
                registry: &mut registry,
                spec,
                module: index,
                max_depth: self.max_depth,
                abbreviated: self.abbreviated,
            };
            walk.visit(root, None, 1)?;
        }

        let event_ids: Vec<NodeId> = registry.events.values().copied().collect();
        for id in event_ids {
            materialize_event(&mut registry, id, &self.sink);
        }

        info!(
            modules = registry.modules.len(),
            nodes = registry.node_count(),
            methods = registry.method_count(),
            events = registry.event_count(),
            "registry built"
        );
        Ok(registry)
    }
}

struct Walk<'a> {
    catalog: &'a SchemaCatalog,
    registry: &'a mut Registry,
    spec: &'a ModuleSpec,
    module: usize,
    max_depth: usize,
    abbreviated: bool,
}

impl Walk<'_> {
    fn visit(
        &mut self,
        ty: &TypeSchema,
        parent: Option<NodeId>,
        depth: usize,
    ) -> Result<(), BuildError> {
        for method in &ty.methods {
            if method.is_filtered() {
                continue;
            }

            let returned = match &method.returns {
                Returns::Type(name) => Some(
                    self.catalog
                        .get(name)
                        .ok_or_else(|| BuildError::UnknownType(name.clone()))?,
                ),
                Returns::Void | Returns::Value(_) => None,
            };

            if let Some(rt) = returned {
                if matches!(rt.kind, TypeKind::Bank { .. })
                    && !self.spec.bank_sizes.contains_key(&rt.name)
                {
                    debug!(
                        module = %self.spec.name,
                        method = %method.name,
                        bank = %rt.name,
                        "no size for bank, skipping"
                    );
                    continue;
                }
            }

            let (prefix, mut params, mut dims) = match parent {
                Some(p) => {
                    let node = self.registry.node(p);
                    (
                        node.absolute_name.clone(),
                        node.params.clone(),
                        node.bank_dimension.clone(),
                    )
                }
                None => (
                    abbrev::segment(&self.spec.name, self.abbreviated),
                    Vec::new(),
                    Vec::new(),
                ),
            };
            let absolute_name =
                format!("{prefix}.{}", abbrev::segment(&method.name, self.abbreviated));
            if depth > self.max_depth {
                return Err(BuildError::ChainTooDeep {
                    path: absolute_name,
                    max: self.max_depth,
                });
            }

            let bank_item_count = if method.bank_item && matches!(ty.kind, TypeKind::Bank { .. }) {
                self.spec.bank_sizes.get(&ty.name).copied().unwrap_or(0)
            } else {
                0
            };
            if bank_item_count > 0 {
                dims.push(bank_item_count);
            }
            params.extend_from_slice(&method.params);

            let is_event = returned.is_some_and(TypeSchema::is_event);
            let graph_result =
                returned.is_some_and(|rt| !matches!(rt.kind, TypeKind::Enum));
            let cacheable = !is_event && graph_result && params.len() == dims.len();

            let node = RegistryNode {
                name: method.name.clone(),
                absolute_name: absolute_name.clone(),
                parent,
                module: self.module,
                own_params: method.params.clone(),
                params: params.clone(),
                result_expression: result_expression(&method.returns, returned),
                bank_item_count,
                bank_dimension: dims,
                error: None,
                cache: cacheable.then(HashMap::new),
                event: None,
            };
            let id = self.registry.push(node);

            if is_event {
                if self.registry.events.insert(absolute_name.clone(), id).is_some() {
                    warn!(event = %absolute_name, "duplicate event, replacing");
                }
            } else if returned.is_none_or(TypeSchema::is_wire_serializable) {
                let identifier = MethodIdentifier::new(absolute_name, params);
                if self.registry.methods.contains_key(&identifier) {
                    warn!(method = %identifier, "duplicate method identifier, replacing");
                }
                let _ = self.registry.methods.insert(identifier, id);
            }

            if let Some(rt) = returned {
                if !matches!(rt.kind, TypeKind::Enum) {
                    self.visit(rt, Some(id), depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

fn result_expression(returns: &Returns, returned: Option<&TypeSchema>) -> String {
    match (returns, returned) {
        (Returns::Void, _) => "void".into(),
        (Returns::Value(kind), _) => kind.expression().into(),
        (Returns::Type(_), Some(rt)) => match rt.kind {
            TypeKind::Observable { value } => value.expression().into(),
            TypeKind::Enum => "string".into(),
            TypeKind::Object | TypeKind::Bank { .. } => rt.name.clone(),
        },
        (Returns::Type(name), None) => name.clone(),
    }
}

/// Obtain the observable of every bank combination and hook its listener.
///
/// Failures are recorded on the node; the event stays listed.
fn materialize_event(registry: &mut Registry, id: NodeId, sink: &ChangeSink) {
    let (dims, param_count, name) = {
        let node = registry.node(id);
        (
            node.bank_dimension.clone(),
            node.params.len(),
            node.absolute_name.clone(),
        )
    };
    if param_count != dims.len() {
        registry.nodes[id.0].error = Some(format!("event '{name}' takes non-bank parameters"));
        return;
    }

    let mut primitives = Vec::new();
    for (index, combo) in bank_combinations(&dims).into_iter().enumerate() {
        let args: Vec<Value> = combo.iter().map(|&i| Value::from(i)).collect();
        match registry.invoke(id, &args) {
            Ok(HostValue::Observable(observable)) => {
                let sink = sink.clone();
                observable.add_listener(Arc::new(move |value| {
                    sink(ValueChange {
                        event: id,
                        primitive: index,
                        value,
                    });
                }));
                primitives.push(PrimitiveEvent::new(combo, observable));
            }
            Ok(_) => {
                registry.nodes[id.0].error = Some(format!("'{name}' did not return an observable"));
                return;
            }
            Err(err) => {
                warn!(event = %name, error = %err, "event unavailable");
                let _ = registry.nodes[id.0].error.get_or_insert(err.to_string());
                return;
            }
        }
    }
    registry.nodes[id.0].event = Some(EventHolder::new(primitives));
}
