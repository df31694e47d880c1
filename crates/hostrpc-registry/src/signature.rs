//! Parameter kinds and method identity.
//!
//! A [`MethodIdentifier`] is the dispatch key: a dotted name plus the
//! ordered parameter kinds. Identifiers order by name, then arity, then
//! per-position kind, which keeps overloads of one name adjacent and
//! sorted from shortest to longest.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire-level kind of a parameter or result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamKind {
    /// No value.
    Void,
    /// JSON boolean.
    Boolean,
    /// JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON object (or `null`).
    Object,
    /// Array of booleans.
    BooleanArray,
    /// Array of numbers.
    NumberArray,
    /// Array of strings.
    StringArray,
    /// Array of objects, or a mixed array.
    ObjectArray,
}

impl ParamKind {
    /// Expression used in reports and diagnostics (`number`, `string[]`, ...).
    pub const fn expression(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::BooleanArray => "boolean[]",
            Self::NumberArray => "number[]",
            Self::StringArray => "string[]",
            Self::ObjectArray => "object[]",
        }
    }

    /// Whether this is one of the array kinds.
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::BooleanArray | Self::NumberArray | Self::StringArray | Self::ObjectArray
        )
    }

    /// Element kind of an array kind.
    pub const fn component(self) -> Option<Self> {
        match self {
            Self::BooleanArray => Some(Self::Boolean),
            Self::NumberArray => Some(Self::Number),
            Self::StringArray => Some(Self::String),
            Self::ObjectArray => Some(Self::Object),
            _ => None,
        }
    }

    /// Array kind holding elements of this kind.
    ///
    /// `None` for `Void` and for kinds that are already arrays.
    pub const fn array_kind(self) -> Option<Self> {
        match self {
            Self::Boolean => Some(Self::BooleanArray),
            Self::Number => Some(Self::NumberArray),
            Self::String => Some(Self::StringArray),
            Self::Object => Some(Self::ObjectArray),
            _ => None,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expression())
    }
}

/// Collapse a homogeneous scalar signature into its vararg form.
///
/// `[number, number, number]` becomes `[number[]]`. Returns `None` when the
/// list is empty, mixed, or made of array kinds.
pub fn to_varargs(kinds: &[ParamKind]) -> Option<Vec<ParamKind>> {
    let (first, rest) = kinds.split_first()?;
    if rest.iter().any(|k| k != first) {
        return None;
    }
    first.array_kind().map(|array| vec![array])
}

/// Dispatch key: method name plus ordered parameter kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodIdentifier {
    name: String,
    params: Vec<ParamKind>,
}

impl MethodIdentifier {
    /// Create an identifier.
    pub fn new(name: impl Into<String>, params: Vec<ParamKind>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter kinds in declaration order.
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    /// The vararg form of this identifier, if one exists.
    pub fn to_varargs(&self) -> Option<Self> {
        to_varargs(&self.params).map(|params| Self::new(self.name.clone(), params))
    }

    /// Parameter expressions, e.g. `["number", "string[]"]`.
    pub fn param_expressions(&self) -> Vec<&'static str> {
        self.params.iter().map(|k| k.expression()).collect()
    }
}

impl Ord for MethodIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.params.len().cmp(&other.params.len()))
            .then_with(|| self.params.cmp(&other.params))
    }
}

impl PartialOrd for MethodIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MethodIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, kind) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(kind.expression())?;
        }
        f.write_str(")")
    }
}
