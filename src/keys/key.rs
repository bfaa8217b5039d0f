//! Structural cache keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A single primitive parameter value inside [`Params`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::List(value)
    }
}

impl ParamValue {
    fn is_empty(&self) -> bool {
        match self {
            ParamValue::Str(s) => s.is_empty(),
            ParamValue::List(items) => items.is_empty(),
            ParamValue::Int(_) | ParamValue::Bool(_) => false,
        }
    }
}

/// Normalized query parameters.
///
/// Backed by a `BTreeMap`, so two parameter sets built in any insertion order
/// compare and hash equal. Absent values (`None`, empty strings, empty lists)
/// are never stored, which makes `{status: None}` and `{}` the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, dropping it when absent or empty.
    pub fn set<V: Into<ParamValue>>(mut self, name: &str, value: Option<V>) -> Self {
        self.insert(name, value);
        self
    }

    /// In-place variant of [`set`](Self::set).
    pub fn insert<V: Into<ParamValue>>(&mut self, name: &str, value: Option<V>) {
        match value.map(Into::into) {
            Some(v) if !v.is_empty() => {
                self.0.insert(name.to_string(), v);
            }
            _ => {
                self.0.remove(name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

impl<K: AsRef<str>, V: Into<ParamValue>> FromIterator<(K, Option<V>)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}

/// One segment of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Segment {
    Str(String),
    Int(i64),
    Bool(bool),
    Params(Params),
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Segment::Str(value.to_string())
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Segment::Str(value)
    }
}

impl From<&String> for Segment {
    fn from(value: &String) -> Self {
        Segment::Str(value.clone())
    }
}

impl From<i64> for Segment {
    fn from(value: i64) -> Self {
        Segment::Int(value)
    }
}

impl From<u32> for Segment {
    fn from(value: u32) -> Self {
        Segment::Int(i64::from(value))
    }
}

impl From<bool> for Segment {
    fn from(value: bool) -> Self {
        Segment::Bool(value)
    }
}

impl From<Params> for Segment {
    fn from(value: Params) -> Self {
        Segment::Params(value)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Str(s) => write!(f, "{s}"),
            Segment::Int(n) => write!(f, "{n}"),
            Segment::Bool(b) => write!(f, "{b}"),
            Segment::Params(p) => {
                write!(f, "{{")?;
                for (i, (name, value)) in p.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match value {
                        ParamValue::Str(s) => write!(f, "{name}={s}")?,
                        ParamValue::Int(n) => write!(f, "{name}={n}")?,
                        ParamValue::Bool(b) => write!(f, "{name}={b}")?,
                        ParamValue::List(items) => write!(f, "{name}=[{}]", items.join("|"))?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

/// An ordered sequence of segments identifying a cached query.
///
/// Keys are compared structurally and form a prefix hierarchy: `[events]` is an
/// ancestor of `[events, list, {...}]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(Vec<Segment>);

impl CacheKey {
    /// The empty key. It is a prefix of every key.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Append a segment, returning the extended key.
    pub fn with(mut self, segment: impl Into<Segment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is this key or one of its ancestors.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether this key is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &CacheKey) -> bool {
        other.0.len() > self.0.len() && other.starts_with(self)
    }

    /// First segment as a string, used as the `entity` metric label.
    pub fn entity(&self) -> &str {
        match self.0.first() {
            Some(Segment::Str(s)) => s,
            _ => "unknown",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{segment}")?;
        }
        write!(f, "]")
    }
}
