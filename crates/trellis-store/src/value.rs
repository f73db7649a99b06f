//! Domain values: the typed, store-independent payload a [`Handle`](crate::Handle) denotes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A typed graph value.
///
/// Floats compare and hash by bit pattern so values can key interning maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Identifier / reference (`<...>`).
    Iri(String),
    /// Blank node (`_:...`).
    BNode(String),
    /// Plain string literal.
    Str(String),
    /// Language-tagged string literal.
    Lang { value: String, lang: String },
    /// Literal with an explicit datatype IRI.
    Typed { value: String, datatype: String },
    Int(i64),
    Float(f64),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn iri(s: impl Into<String>) -> Self {
        Value::Iri(s.into())
    }

    pub fn bnode(s: impl Into<String>) -> Self {
        Value::BNode(s.into())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn lang(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Value::Lang {
            value: value.into(),
            lang: lang.into(),
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Value::Typed {
            value: value.into(),
            datatype: datatype.into(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Iri(_) => ValueKind::Iri,
            Value::BNode(_) => ValueKind::BNode,
            Value::Str(_) => ValueKind::Str,
            Value::Lang { .. } => ValueKind::Lang,
            Value::Typed { .. } => ValueKind::Typed,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Time(_) => ValueKind::Time,
        }
    }

    /// True for IRIs and blank nodes.
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Iri(_) | Value::BNode(_))
    }

    /// Raw text of string-like values (literals and references), without quoting.
    pub fn text(&self) -> Option<&str> {
        match self {
            Value::Iri(s) | Value::BNode(s) | Value::Str(s) => Some(s),
            Value::Lang { value, .. } | Value::Typed { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Compare two values of the same family.
    ///
    /// Numbers compare with numbers (ints and floats mix), strings with strings,
    /// references with references of the same kind, times with times. Anything
    /// else is incomparable and returns `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Iri(a), Value::Iri(b)) => Some(a.cmp(b)),
            (Value::BNode(a), Value::BNode(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (
                Value::Lang { value: a, lang: la },
                Value::Lang { value: b, lang: lb },
            ) if la == lb => Some(a.cmp(b)),
            (
                Value::Typed {
                    value: a,
                    datatype: da,
                },
                Value::Typed {
                    value: b,
                    datatype: db,
                },
            ) if da == db => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// A total order over all values, used for deterministic sorting.
    ///
    /// Values are grouped by kind (ints and floats share one numeric group),
    /// then ordered within the group.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (
                Value::Lang { value: a, lang: la },
                Value::Lang { value: b, lang: lb },
            ) => a.cmp(b).then_with(|| la.cmp(lb)),
            (
                Value::Typed {
                    value: a,
                    datatype: da,
                },
                Value::Typed {
                    value: b,
                    datatype: db,
                },
            ) => a.cmp(b).then_with(|| da.cmp(db)),
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Iri(_) => 0,
            Value::BNode(_) => 1,
            Value::Str(_) => 2,
            Value::Lang { .. } => 3,
            Value::Typed { .. } => 4,
            Value::Int(_) | Value::Float(_) => 5,
            Value::Bool(_) => 6,
            Value::Time(_) => 7,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Iri(a), Value::Iri(b)) => a == b,
            (Value::BNode(a), Value::BNode(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Lang { value: a, lang: la },
                Value::Lang { value: b, lang: lb },
            ) => a == b && la == lb,
            (
                Value::Typed {
                    value: a,
                    datatype: da,
                },
                Value::Typed {
                    value: b,
                    datatype: db,
                },
            ) => a == b && da == db,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Iri(s) | Value::BNode(s) | Value::Str(s) => s.hash(state),
            Value::Lang { value, lang } => {
                value.hash(state);
                lang.hash(state);
            }
            Value::Typed { value, datatype } => {
                value.hash(state);
                datatype.hash(state);
            }
            Value::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::Bool(b) => b.hash(state),
            Value::Time(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Iri(s) => write!(f, "<{s}>"),
            Value::BNode(s) => write!(f, "_:{s}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Lang { value, lang } => write!(f, "{value:?}@{lang}"),
            Value::Typed { value, datatype } => write!(f, "{value:?}^^<{datatype}>"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Shorthand parsing: `<x>` is an IRI, `_:x` a blank node, anything else a string.
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        if s.len() >= 2 && s.starts_with('<') && s.ends_with('>') {
            Value::Iri(s[1..s.len() - 1].to_string())
        } else if let Some(rest) = s.strip_prefix("_:") {
            Value::BNode(rest.to_string())
        } else {
            Value::Str(s.to_string())
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from(s.as_str())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

// ============================================================================
// Value kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Iri,
    BNode,
    Str,
    Lang,
    Typed,
    Int,
    Float,
    Bool,
    Time,
}

/// Every kind that is a literal rather than a reference.
pub const LITERAL_KINDS: [ValueKind; 7] = [
    ValueKind::Str,
    ValueKind::Lang,
    ValueKind::Typed,
    ValueKind::Int,
    ValueKind::Float,
    ValueKind::Bool,
    ValueKind::Time,
];

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Iri => "iri",
            ValueKind::BNode => "bnode",
            ValueKind::Str => "str",
            ValueKind::Lang => "lang",
            ValueKind::Typed => "typed",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Time => "time",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for ValueKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "iri" => ValueKind::Iri,
            "bnode" => ValueKind::BNode,
            "str" => ValueKind::Str,
            "lang" => ValueKind::Lang,
            "typed" => ValueKind::Typed,
            "int" => ValueKind::Int,
            "float" => ValueKind::Float,
            "bool" => ValueKind::Bool,
            // `date` is the historical name for timestamps.
            "time" | "date" => ValueKind::Time,
            other => return Err(UnknownKind(other.to_string())),
        })
    }
}
