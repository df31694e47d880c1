//! Host adapter boundary.
//!
//! The registry never talks to a vendor API directly. Host objects are
//! reached through [`HostObject::invoke`], and push sources through
//! [`ObservableValue`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Error raised by a host object.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HostError {
    /// Human-readable description.
    pub message: String,
}

impl HostError {
    /// Create a host error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error for a method the object does not implement.
    pub fn unknown_method(method: &str, arity: usize) -> Self {
        Self::new(format!("no method '{method}' taking {arity} argument(s)"))
    }
}

/// Callback fired when an observable's value changes.
pub type ValueListener = Arc<dyn Fn(Value) + Send + Sync>;

/// An object of the host graph.
pub trait HostObject: Send + Sync {
    /// Call `method` with already-coerced JSON arguments.
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError>;

    /// JSON rendering for types the schema marks serializable.
    fn snapshot(&self) -> Option<Value> {
        None
    }
}

/// A host value that pushes changes to listeners while subscribed.
pub trait ObservableValue: Send + Sync {
    /// Start delivering changes.
    fn subscribe(&self);
    /// Stop delivering changes.
    fn unsubscribe(&self);
    /// Whether changes are currently delivered.
    fn is_subscribed(&self) -> bool;
    /// Current value (`Value::Null` when unknown).
    fn current(&self) -> Value;
    /// Whether the value is a collection reported element by element.
    fn is_collection(&self) -> bool {
        false
    }
    /// Register a change listener.
    fn add_listener(&self, listener: ValueListener);
}

/// Result of a host invocation.
#[derive(Clone)]
pub enum HostValue {
    /// Nothing returned.
    Void,
    /// Plain JSON data.
    Json(Value),
    /// Another object of the graph.
    Object(Arc<dyn HostObject>),
    /// A push source.
    Observable(Arc<dyn ObservableValue>),
}

impl HostValue {
    /// Render the value for the wire.
    ///
    /// Observables render as their current value, objects as their snapshot.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Void => Value::Null,
            Self::Json(v) => v.clone(),
            Self::Object(obj) => obj.snapshot().unwrap_or(Value::Null),
            Self::Observable(obs) => obs.current(),
        }
    }

    /// Whether this is an object or observable of the host graph.
    pub fn is_graph_value(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Observable(_))
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("Void"),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Observable(obs) => f.debug_tuple("Observable").field(&obs.current()).finish(),
        }
    }
}

impl From<Value> for HostValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

// ── ObservableCell ──────────────────────────────────────────────────

#[derive(Default)]
struct CellState {
    value: Value,
    subscribed: bool,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
}

/// In-memory [`ObservableValue`].
///
/// Listeners fire on [`set`](Self::set) only while the cell is subscribed.
pub struct ObservableCell {
    state: Mutex<CellState>,
    listeners: Mutex<Vec<ValueListener>>,
    collection: bool,
}

impl ObservableCell {
    /// Create a scalar cell holding `initial`.
    pub fn new(initial: Value) -> Self {
        Self {
            state: Mutex::new(CellState {
                value: initial,
                ..CellState::default()
            }),
            listeners: Mutex::new(Vec::new()),
            collection: false,
        }
    }

    /// Create a collection cell; `initial` should be an array.
    pub fn collection(initial: Value) -> Self {
        Self {
            collection: true,
            ..Self::new(initial)
        }
    }

    /// Replace the value and notify listeners when subscribed.
    pub fn set(&self, value: Value) {
        let notify = {
            let mut state = self.state.lock();
            state.value = value.clone();
            state.subscribed
        };
        if notify {
            let listeners = self.listeners.lock().clone();
            for listener in listeners {
                listener(value.clone());
            }
        }
    }

    /// Number of `subscribe` calls so far.
    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    /// Number of `unsubscribe` calls so far.
    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unsubscribe_calls
    }
}

impl ObservableValue for ObservableCell {
    fn subscribe(&self) {
        let mut state = self.state.lock();
        state.subscribed = true;
        state.subscribe_calls += 1;
    }

    fn unsubscribe(&self) {
        let mut state = self.state.lock();
        state.subscribed = false;
        state.unsubscribe_calls += 1;
    }

    fn is_subscribed(&self) -> bool {
        self.state.lock().subscribed
    }

    fn current(&self) -> Value {
        self.state.lock().value.clone()
    }

    fn is_collection(&self) -> bool {
        self.collection
    }

    fn add_listener(&self, listener: ValueListener) {
        self.listeners.lock().push(listener);
    }
}
