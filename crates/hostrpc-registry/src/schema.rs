//! Static type descriptors of the host graph.
//!
//! The registry builder walks these descriptors instead of reflecting over
//! live objects. A catalog is declared once by the host adapter.

use std::collections::HashMap;

use crate::signature::ParamKind;

/// What a host type is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// Plain object with accessor methods.
    Object,
    /// Indexed collection; items come from a bank item accessor.
    Bank {
        /// Type name of the items.
        item: String,
    },
    /// Push source of values of one kind.
    Observable {
        /// Kind of the pushed value.
        value: ParamKind,
    },
    /// Enumeration; never traversed.
    Enum,
}

/// Declared return of a method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Returns {
    /// Nothing.
    Void,
    /// A plain value of the given kind.
    Value(ParamKind),
    /// A host type, by name.
    Type(String),
}

/// Descriptor of one host method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSchema {
    /// Method name as the host knows it.
    pub name: String,
    /// Own parameters (ancestor parameters are not repeated here).
    pub params: Vec<ParamKind>,
    /// Declared return.
    pub returns: Returns,
    /// Marked deprecated by the host.
    pub deprecated: bool,
    /// Takes a callback parameter.
    pub callback_param: bool,
    /// Takes a parameter typed as a host object.
    pub host_object_param: bool,
    /// Creates new host objects rather than returning existing ones.
    pub factory: bool,
    /// Host bookkeeping accessor (`markInterested` and the like).
    pub hidden: bool,
    /// `getItemAt(int)` style accessor on a bank type.
    pub bank_item: bool,
}

impl MethodSchema {
    /// A method with no parameters returning nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: Returns::Void,
            deprecated: false,
            callback_param: false,
            host_object_param: false,
            factory: false,
            hidden: false,
            bank_item: false,
        }
    }

    /// Set the own parameter kinds.
    #[must_use]
    pub fn params(mut self, params: impl Into<Vec<ParamKind>>) -> Self {
        self.params = params.into();
        self
    }

    /// Return a plain value.
    #[must_use]
    pub fn returns(mut self, kind: ParamKind) -> Self {
        self.returns = Returns::Value(kind);
        self
    }

    /// Return a host type.
    #[must_use]
    pub fn returns_type(mut self, type_name: impl Into<String>) -> Self {
        self.returns = Returns::Type(type_name.into());
        self
    }

    /// Mark as a bank item accessor taking one index.
    #[must_use]
    pub fn bank_item(mut self) -> Self {
        self.bank_item = true;
        self.params = vec![ParamKind::Number];
        self
    }

    /// Mark deprecated.
    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Mark as taking a callback.
    #[must_use]
    pub fn with_callback(mut self) -> Self {
        self.callback_param = true;
        self
    }

    /// Mark as taking a host object parameter.
    #[must_use]
    pub fn with_host_object_param(mut self) -> Self {
        self.host_object_param = true;
        self
    }

    /// Mark as a factory.
    #[must_use]
    pub fn factory(mut self) -> Self {
        self.factory = true;
        self
    }

    /// Mark as host bookkeeping, never exposed.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Whether the builder ignores this method.
    pub fn is_filtered(&self) -> bool {
        self.deprecated
            || self.callback_param
            || self.host_object_param
            || self.factory
            || self.hidden
    }
}

/// Descriptor of one host type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSchema {
    /// Type name, unique within a catalog.
    pub name: String,
    /// Type kind.
    pub kind: TypeKind,
    /// Whether instances can be rendered to JSON.
    pub serializable: bool,
    /// Observable types that are also settable parameters; treated as
    /// methods rather than events.
    pub parameter: bool,
    /// Accessor methods.
    pub methods: Vec<MethodSchema>,
}

impl TypeSchema {
    /// An object type.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Object,
            serializable: false,
            parameter: false,
            methods: Vec::new(),
        }
    }

    /// A bank type whose items have type `item`.
    pub fn bank(name: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Bank { item: item.into() },
            ..Self::object(name)
        }
    }

    /// An observable type pushing values of `value` kind.
    pub fn observable(name: impl Into<String>, value: ParamKind) -> Self {
        Self {
            kind: TypeKind::Observable { value },
            serializable: true,
            ..Self::object(name)
        }
    }

    /// An enumeration type.
    pub fn enumeration(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Enum,
            serializable: true,
            ..Self::object(name)
        }
    }

    /// Add a method.
    #[must_use]
    pub fn method(mut self, method: MethodSchema) -> Self {
        self.methods.push(method);
        self
    }

    /// Mark instances serializable.
    #[must_use]
    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    /// Mark as a parameter type.
    #[must_use]
    pub fn parameter(mut self) -> Self {
        self.parameter = true;
        self
    }

    /// Whether the type produces event nodes.
    pub fn is_event(&self) -> bool {
        matches!(self.kind, TypeKind::Observable { .. }) && !self.parameter
    }

    /// Whether results of this type can be sent to a client.
    pub fn is_wire_serializable(&self) -> bool {
        self.serializable || matches!(self.kind, TypeKind::Observable { .. })
    }
}

/// All type descriptors of a host, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    types: HashMap<String, TypeSchema>,
}

impl SchemaCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a type.
    pub fn register(&mut self, schema: TypeSchema) {
        let _ = self.types.insert(schema.name.clone(), schema);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, schema: TypeSchema) -> Self {
        self.register(schema);
        self
    }

    /// Look up a type.
    pub fn get(&self, name: &str) -> Option<&TypeSchema> {
        self.types.get(name)
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
