use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Document;

/// A dynamically-typed document value.
///
/// Numbers keep their wire subtype (`Int32`, `Int64`, `Double`) so that
/// type-preserving comparisons can tell them apart. The derived `PartialEq`
/// is structural: `Int32(1) != Double(1.0)` and `NaN != NaN`. Semantic
/// equality lives in the harness comparator and in [`Value::canonical_cmp`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    ObjectId(ObjectId),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Regex(RegexLiteral),
    Array(Vec<Value>),
    Document(Document),
}

/// A 12-byte object identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// The all-zero identifier.
    pub const NIL: Self = Self([0; 12]);

    pub const fn new(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Parse a 24-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 24 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0_u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A regular expression literal: pattern plus option flags (`i`, `m`, `s`, `x`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegexLiteral {
    pub pattern: String,
    pub options: String,
}

impl RegexLiteral {
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: options.into(),
        }
    }
}

impl Value {
    /// The `$type` alias of this value.
    pub const fn type_alias(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int",
            Self::Int64(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Binary(_) => "binData",
            Self::ObjectId(_) => "objectId",
            Self::DateTime(_) => "date",
            Self::Regex(_) => "regex",
            Self::Array(_) => "array",
            Self::Document(_) => "object",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Int32(_) | Self::Int64(_) | Self::Double(_))
    }

    /// Integer value for `Int32`/`Int64`.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(i) => Some(*i as i64),
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as `f64` (lossy above 2^53 for `Int64`).
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(i) => Some(f64::from(*i)),
            Self::Int64(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_array(&self) -> Option<&Vec<Self>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Cross-type ordering class. Null sorts first, then numbers, strings,
    /// documents, arrays, binary, object ids, booleans, dates, regexes.
    pub const fn sort_class(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int32(_) | Self::Int64(_) | Self::Double(_) => 1,
            Self::String(_) => 2,
            Self::Document(_) => 3,
            Self::Array(_) => 4,
            Self::Binary(_) => 5,
            Self::ObjectId(_) => 6,
            Self::Bool(_) => 7,
            Self::DateTime(_) => 8,
            Self::Regex(_) => 9,
        }
    }

    /// Total order over all values.
    ///
    /// Numbers compare by mathematical value regardless of subtype, with
    /// exact integer/float comparison. NaN equals NaN and sorts below every
    /// other number. Documents compare entry by entry in stored order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        let class_a = self.sort_class();
        let class_b = other.sort_class();
        if class_a != class_b {
            return class_a.cmp(&class_b);
        }

        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Self::ObjectId(a), Self::ObjectId(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Regex(a), Self::Regex(b)) => a
                .pattern
                .cmp(&b.pattern)
                .then_with(|| a.options.cmp(&b.options)),
            (Self::Array(a), Self::Array(b)) => cmp_sequences(a.iter(), b.iter()),
            (Self::Document(a), Self::Document(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = va
                        .sort_class()
                        .cmp(&vb.sort_class())
                        .then_with(|| ka.cmp(kb))
                        .then_with(|| va.canonical_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => numeric_cmp(self, other),
        }
    }

    /// Mathematical equality of two numbers; `None` if either is not a number.
    pub fn numeric_eq(&self, other: &Self) -> Option<bool> {
        (self.is_number() && other.is_number())
            .then(|| numeric_cmp(self, other) == Ordering::Equal)
    }
}

fn cmp_sequences<'a>(
    a: impl ExactSizeIterator<Item = &'a Value>,
    b: impl ExactSizeIterator<Item = &'a Value>,
) -> Ordering {
    let (len_a, len_b) = (a.len(), b.len());
    for (x, y) in a.zip(b) {
        let ord = x.canonical_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    len_a.cmp(&len_b)
}

fn numeric_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => float_cmp(*x, *y),
        (Value::Double(x), _) => b.as_i64().map_or(Ordering::Equal, |i| int_float_cmp(i, *x).reverse()),
        (_, Value::Double(y)) => a.as_i64().map_or(Ordering::Equal, |i| int_float_cmp(i, *y)),
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

fn float_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compare an integer with a float without losing precision above 2^53.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn int_float_cmp(i: i64, r: f64) -> Ordering {
    if r.is_nan() {
        return Ordering::Greater;
    }
    if r < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    if r >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    let y = r as i64;
    match i.cmp(&y) {
        Ordering::Equal => (i as f64).partial_cmp(&r).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Int64(i) => write!(f, "NumberLong({i})"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(bytes) => {
                f.write_str("BinData(")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str(")")
            }
            Self::ObjectId(oid) => write!(f, "ObjectId(\"{oid}\")"),
            Self::DateTime(ms) => write!(f, "Date({ms})"),
            Self::Regex(re) => write!(f, "/{}/{}", re.pattern, re.options),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Document(doc) => write!(f, "{doc}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Self::ObjectId(oid)
    }
}

impl From<RegexLiteral> for Value {
    fn from(re: RegexLiteral) -> Self {
        Self::Regex(re)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Document(doc)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
