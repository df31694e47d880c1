//! Registry nodes.
//!
//! Nodes live in an arena owned by [`Registry`](crate::Registry). A node
//! refers to its parent by [`NodeId`]; the accessor chain of a node is
//! walked by following parent ids back to a module root.

use std::collections::HashMap;

use serde_json::Value;

use crate::events::EventHolder;
use crate::host::HostValue;
use crate::ids::NodeId;
use crate::signature::ParamKind;

/// One accessor in the host graph.
pub struct RegistryNode {
    pub(crate) name: String,
    pub(crate) absolute_name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) module: usize,
    pub(crate) own_params: Vec<ParamKind>,
    pub(crate) params: Vec<ParamKind>,
    pub(crate) result_expression: String,
    pub(crate) bank_item_count: usize,
    pub(crate) bank_dimension: Vec<usize>,
    pub(crate) error: Option<String>,
    pub(crate) cache: Option<HashMap<Vec<i64>, HostValue>>,
    pub(crate) event: Option<EventHolder>,
}

impl RegistryNode {
    /// Host method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path from the module root.
    pub fn absolute_name(&self) -> &str {
        &self.absolute_name
    }

    /// Parent accessor, `None` for direct module methods.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// All parameters of the chain, ancestors first.
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    /// Parameters declared by this accessor alone.
    pub fn own_params(&self) -> &[ParamKind] {
        &self.own_params
    }

    /// Number of leading arguments consumed by ancestors.
    pub fn parent_param_count(&self) -> usize {
        self.params.len() - self.own_params.len()
    }

    /// Item count of the bank this node indexes into, or 0.
    pub fn bank_item_count(&self) -> usize {
        self.bank_item_count
    }

    /// Sizes of all banks on the path.
    pub fn bank_dimension(&self) -> &[usize] {
        &self.bank_dimension
    }

    /// Expression of the result kind.
    pub fn result_expression(&self) -> &str {
        &self.result_expression
    }

    /// Error recorded while building the node, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether results are memoized by bank indexes.
    pub fn is_cacheable(&self) -> bool {
        self.cache.is_some()
    }

    /// Number of memoized results.
    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map_or(0, HashMap::len)
    }

    /// Whether this node is an event.
    pub fn is_event(&self) -> bool {
        self.event.is_some()
    }

    /// Subscription state of an event node.
    pub fn event(&self) -> Option<&EventHolder> {
        self.event.as_ref()
    }
}

/// Cache key for a call whose arguments are all bank indexes.
pub(crate) fn cache_key(args: &[Value]) -> Option<Vec<i64>> {
    args.iter().map(Value::as_i64).collect()
}
