//! # hostrpc-registry
//!
//! Flat RPC namespace over a host object graph.
//!
//! - [`RegistryBuilder`] walks a [`SchemaCatalog`] from named module roots
//!   and produces one node per accessor, with bank dimensions accumulated
//!   along the chain
//! - [`Registry::resolve`] maps a name and argument kinds to a node, with a
//!   vararg fallback for homogeneous scalar calls
//! - [`Registry::invoke`] replays the accessor chain on the host, memoizing
//!   results that depend only on bank indexes
//! - [`abbreviate`] shortens published names when the builder is asked to
//! - Event nodes keep subscriber sets and subscribe the underlying
//!   observables only while someone is listening

#![deny(unsafe_code)]

pub mod abbrev;
pub mod builder;
pub mod errors;
pub mod events;
pub mod host;
pub mod ids;
pub mod node;
pub mod registry;
pub mod schema;
pub mod signature;

pub use abbrev::abbreviate;
pub use builder::{DEFAULT_MAX_CHAIN_DEPTH, ModuleSpec, RegistryBuilder};
pub use errors::{BuildError, InvokeError};
pub use events::{
    ChangeSink, EventHolder, EventPayload, PendingReplay, PrimitiveEvent, SubscribeOutcome,
    ValueChange, bank_combinations,
};
pub use host::{HostError, HostObject, HostValue, ObservableCell, ObservableValue, ValueListener};
pub use ids::{ClientId, NodeId};
pub use node::RegistryNode;
pub use registry::{EventReport, MethodReport, Registry, Resolved};
pub use schema::{MethodSchema, Returns, SchemaCatalog, TypeKind, TypeSchema};
pub use signature::{MethodIdentifier, ParamKind, to_varargs};
