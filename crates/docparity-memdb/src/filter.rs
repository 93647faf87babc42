//! Query filters.
//!
//! A filter document is parsed once into a [`Filter`] tree, then evaluated
//! against each stored document. Parsing is where malformed filters are
//! rejected, so an invalid filter fails even against an empty collection.
//!
//! Field paths use dot notation. A numeric segment indexes into an array;
//! any other segment applied to an array is resolved against each embedded
//! document. Most operators also match when the resolved value is an array
//! with a matching element.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use docparity_error::ErrorCode;
use docparity_harness::CommandError;
use docparity_types::{Document, RegexLiteral, Value};

use crate::dialect::{Dialect, Quirk};

type ParseResult<T> = Result<T, CommandError>;

fn bad_value(message: impl Into<String>) -> CommandError {
    CommandError::new(ErrorCode::BadValue, message)
}

/// A parsed filter: the conjunction of its top-level clauses.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Expr>,
}

#[derive(Debug, Clone)]
enum Expr {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Path { path: Vec<String>, ops: Vec<Op> },
}

#[derive(Debug, Clone)]
enum Pattern {
    Literal(Value),
    Regex { literal: RegexLiteral, compiled: Regex },
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy)]
enum TypeSpec {
    Alias(&'static str),
    Number,
}

#[derive(Debug, Clone)]
enum ElemMatch {
    Value(Vec<Op>),
    Document(Filter),
}

#[derive(Debug, Clone)]
enum Op {
    Eq(Pattern),
    Ne(Pattern),
    Cmp(CmpOp, Value),
    In(Vec<Pattern>),
    Nin(Vec<Pattern>),
    Exists(bool),
    Type(Vec<TypeSpec>),
    /// `None` never matches.
    Size(Option<usize>),
    All(Vec<Pattern>),
    ElemMatch(ElemMatch),
}

impl Filter {
    /// Parse `filter` under `dialect`. Errors are `BadValue` command errors.
    pub fn parse(filter: &Document, dialect: &Dialect) -> ParseResult<Self> {
        Parser { dialect }.document(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }
}

struct Parser<'a> {
    dialect: &'a Dialect,
}

impl Parser<'_> {
    fn document(&self, filter: &Document) -> ParseResult<Filter> {
        let mut clauses = Vec::with_capacity(filter.len());
        for (key, value) in filter.iter() {
            let clause = match key {
                "$and" => Expr::And(self.branches(key, value)?),
                "$or" => Expr::Or(self.branches(key, value)?),
                "$nor" => Expr::Nor(self.branches(key, value)?),
                _ if key.starts_with('$') => {
                    return Err(bad_value(format!("unknown top level operator: {key}")));
                }
                _ => Expr::Path {
                    path: split_path(key)?,
                    ops: self.predicate(value)?,
                },
            };
            clauses.push(clause);
        }
        Ok(Filter { clauses })
    }

    fn branches(&self, key: &str, value: &Value) -> ParseResult<Vec<Filter>> {
        let items = value
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| bad_value(format!("{key} must be a nonempty array")))?;
        items
            .iter()
            .map(|item| {
                item.as_document()
                    .ok_or_else(|| bad_value(format!("{key} entries need to be full objects")))
                    .and_then(|doc| self.document(doc))
            })
            .collect()
    }

    fn predicate(&self, value: &Value) -> ParseResult<Vec<Op>> {
        match value {
            Value::Document(doc) if doc.first_key().is_some_and(|k| k.starts_with('$')) => doc
                .iter()
                .map(|(op, arg)| {
                    if op.starts_with('$') {
                        self.operator(op, arg)
                    } else {
                        Err(bad_value(format!("unknown operator: {op}")))
                    }
                })
                .collect(),
            Value::Regex(literal) => Ok(vec![Op::Eq(Pattern::regex(literal)?)]),
            other => Ok(vec![Op::Eq(Pattern::Literal(other.clone()))]),
        }
    }

    fn operator(&self, op: &str, arg: &Value) -> ParseResult<Op> {
        let parsed = match op {
            "$eq" => Op::Eq(Pattern::Literal(arg.clone())),
            "$ne" => Op::Ne(Pattern::Literal(arg.clone())),
            "$gt" => Op::Cmp(CmpOp::Gt, arg.clone()),
            "$gte" => Op::Cmp(CmpOp::Gte, arg.clone()),
            "$lt" => Op::Cmp(CmpOp::Lt, arg.clone()),
            "$lte" => Op::Cmp(CmpOp::Lte, arg.clone()),
            "$in" => Op::In(patterns(op, arg)?),
            "$nin" => Op::Nin(patterns(op, arg)?),
            "$all" => Op::All(patterns(op, arg)?),
            "$exists" => Op::Exists(truthy(arg)),
            "$type" => Op::Type(type_specs(arg)?),
            "$size" => Op::Size(self.size(arg)?),
            "$elemMatch" => Op::ElemMatch(self.elem_match(arg)?),
            _ => return Err(bad_value(format!("unknown operator: {op}"))),
        };
        Ok(parsed)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn size(&self, arg: &Value) -> ParseResult<Option<usize>> {
        match arg {
            Value::Int32(_) | Value::Int64(_) => {
                let n = arg.as_i64().unwrap_or_default();
                usize::try_from(n)
                    .map(Some)
                    .map_err(|_| bad_value("$size may not be negative"))
            }
            Value::Double(d) if d.is_infinite() && *d > 0.0 => {
                if self.dialect.has(Quirk::SizeInfinityMatchesNothing) {
                    Ok(None)
                } else {
                    Err(bad_value(format!("Failed to parse $size. Cannot represent as a 64-bit integer: $size: {d}")))
                }
            }
            Value::Double(d) if d.is_nan() => Err(bad_value("$size must be a whole number")),
            Value::Double(d) if *d < 0.0 => Err(bad_value("$size may not be negative")),
            Value::Double(d) if d.fract() != 0.0 => Err(bad_value("$size must be a whole number")),
            Value::Double(d) => Ok(Some(*d as usize)),
            _ => Err(bad_value("$size needs a number")),
        }
    }

    fn elem_match(&self, arg: &Value) -> ParseResult<ElemMatch> {
        let doc = arg
            .as_document()
            .ok_or_else(|| bad_value("$elemMatch needs an Object"))?;
        let is_operator = |key: &str| key.starts_with('$') && !matches!(key, "$and" | "$or" | "$nor");
        let has_operators = doc.keys().any(is_operator);
        let field = doc.keys().find(|key| !key.starts_with('$'));

        match (has_operators, field) {
            (false, _) => Ok(ElemMatch::Document(self.document(doc)?)),
            (true, None) => Ok(ElemMatch::Value(self.operators(doc, is_operator)?)),
            (true, Some(_)) if self.dialect.has(Quirk::ElemMatchIgnoresFieldKeys) => {
                Ok(ElemMatch::Value(self.operators(doc, is_operator)?))
            }
            (true, Some(_)) => {
                let first = doc.keys().find(|key| is_operator(*key)).unwrap_or_default();
                Err(bad_value(format!("unknown top level operator: {first}")))
            }
        }
    }

    fn operators(&self, doc: &Document, keep: impl Fn(&str) -> bool) -> ParseResult<Vec<Op>> {
        doc.iter()
            .filter(|(key, _)| keep(*key))
            .map(|(op, arg)| self.operator(op, arg))
            .collect()
    }
}

fn split_path(key: &str) -> ParseResult<Vec<String>> {
    let path: Vec<String> = key.split('.').map(str::to_owned).collect();
    if path.iter().any(String::is_empty) {
        return Err(bad_value(format!("empty field path component in {key:?}")));
    }
    Ok(path)
}

fn patterns(op: &str, arg: &Value) -> ParseResult<Vec<Pattern>> {
    let items = arg
        .as_array()
        .ok_or_else(|| bad_value(format!("{op} needs an array")))?;
    items
        .iter()
        .map(|item| match item {
            Value::Regex(literal) => Pattern::regex(literal),
            Value::Document(doc) if op != "$all" && doc.first_key().is_some_and(|k| k.starts_with('$')) => {
                Err(bad_value(format!("cannot nest $ under {op}")))
            }
            other => Ok(Pattern::Literal(other.clone())),
        })
        .collect()
}

fn truthy(arg: &Value) -> bool {
    match arg {
        Value::Null => false,
        Value::Bool(b) => *b,
        other => other.as_f64().is_none_or(|n| n != 0.0),
    }
}

fn type_specs(arg: &Value) -> ParseResult<Vec<TypeSpec>> {
    match arg {
        Value::Array(items) if items.is_empty() => Err(bad_value("$type must match at least one type")),
        Value::Array(items) => items.iter().map(type_spec).collect(),
        single => Ok(vec![type_spec(single)?]),
    }
}

fn type_spec(arg: &Value) -> ParseResult<TypeSpec> {
    if let Some(alias) = arg.as_str() {
        let alias = match alias {
            "number" => return Ok(TypeSpec::Number),
            "double" => "double",
            "string" => "string",
            "object" => "object",
            "array" => "array",
            "binData" => "binData",
            "objectId" => "objectId",
            "bool" => "bool",
            "date" => "date",
            "null" => "null",
            "regex" => "regex",
            "int" => "int",
            "long" => "long",
            unknown => return Err(bad_value(format!("unknown type name alias: {unknown}"))),
        };
        return Ok(TypeSpec::Alias(alias));
    }

    let code = match arg {
        Value::Int32(_) | Value::Int64(_) => arg.as_i64(),
        #[allow(clippy::cast_possible_truncation)]
        Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
        _ => None,
    }
    .ok_or_else(|| bad_value(format!("type must be represented as a number or a string, got {arg}")))?;
    let alias = match code {
        1 => "double",
        2 => "string",
        3 => "object",
        4 => "array",
        5 => "binData",
        7 => "objectId",
        8 => "bool",
        9 => "date",
        10 => "null",
        11 => "regex",
        16 => "int",
        18 => "long",
        other => return Err(bad_value(format!("Invalid numerical type code: {other}"))),
    };
    Ok(TypeSpec::Alias(alias))
}

impl Pattern {
    fn regex(literal: &RegexLiteral) -> ParseResult<Self> {
        let mut builder = RegexBuilder::new(&literal.pattern);
        for flag in literal.options.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => return Err(bad_value(format!("invalid flag in regex options: {other}"))),
            };
        }
        let compiled = builder
            .build()
            .map_err(|err| bad_value(format!("Regular expression is invalid: {err}")))?;
        Ok(Self::Regex {
            literal: literal.clone(),
            compiled,
        })
    }

    const fn is_null(&self) -> bool {
        matches!(self, Self::Literal(Value::Null))
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Literal(expected) => value.canonical_cmp(expected) == Ordering::Equal,
            Self::Regex { literal, compiled } => match value {
                Value::String(s) => compiled.is_match(s),
                Value::Regex(other) => other == literal,
                _ => false,
            },
        }
    }
}

impl TypeSpec {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Alias(alias) => value.type_alias() == alias,
            Self::Number => value.is_number(),
        }
    }
}

impl CmpOp {
    fn holds(self, value: &Value, operand: &Value) -> bool {
        // Comparisons are bracketed by type class.
        if value.sort_class() != operand.sort_class() {
            return false;
        }
        let ord = value.canonical_cmp(operand);
        match self {
            Self::Gt => ord == Ordering::Greater,
            Self::Gte => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Lte => ord != Ordering::Greater,
        }
    }
}

impl ElemMatch {
    fn matches(&self, element: &Value) -> bool {
        match self {
            Self::Value(ops) => ops.iter().all(|op| op.matches(&[element])),
            Self::Document(filter) => element.as_document().is_some_and(|doc| filter.matches(doc)),
        }
    }
}

/// A value followed by its elements when it is an array.
fn expand(value: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(value).chain(value.as_array().into_iter().flatten())
}

fn eq_any(pattern: &Pattern, candidates: &[&Value]) -> bool {
    if candidates.is_empty() {
        return pattern.is_null();
    }
    candidates.iter().any(|c| expand(c).any(|v| pattern.matches(v)))
}

impl Op {
    fn matches(&self, candidates: &[&Value]) -> bool {
        match self {
            Self::Eq(pattern) => eq_any(pattern, candidates),
            Self::Ne(pattern) => !eq_any(pattern, candidates),
            Self::Cmp(op, operand) => candidates
                .iter()
                .any(|c| expand(c).any(|v| op.holds(v, operand))),
            Self::In(patterns) => patterns.iter().any(|p| eq_any(p, candidates)),
            Self::Nin(patterns) => !patterns.iter().any(|p| eq_any(p, candidates)),
            Self::Exists(expected) => candidates.is_empty() != *expected,
            Self::Type(specs) => candidates
                .iter()
                .any(|c| expand(c).any(|v| specs.iter().any(|t| t.matches(v)))),
            Self::Size(Some(len)) => candidates
                .iter()
                .any(|c| c.as_array().is_some_and(|items| items.len() == *len)),
            Self::Size(None) => false,
            Self::All(patterns) => !patterns.is_empty() && patterns.iter().all(|p| eq_any(p, candidates)),
            Self::ElemMatch(elem) => candidates
                .iter()
                .any(|c| c.as_array().is_some_and(|items| items.iter().any(|e| elem.matches(e)))),
        }
    }
}

impl Expr {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            Self::Path { path, ops } => {
                let candidates = resolve(doc, path);
                ops.iter().all(|op| op.matches(&candidates))
            }
        }
    }
}

/// Every value reachable from `doc` along `path`.
pub fn resolve<'a>(doc: &'a Document, path: &[String]) -> Vec<&'a Value> {
    let mut out = Vec::new();
    if let Some((head, rest)) = path.split_first() {
        if let Some(value) = doc.get(head) {
            descend(value, rest, &mut out);
        }
    }
    out
}

fn descend<'a>(value: &'a Value, path: &[String], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Document(doc) => {
            if let Some(next) = doc.get(head) {
                descend(next, rest, out);
            }
        }
        Value::Array(items) => {
            if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
                if let Some(next) = head.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    descend(next, rest, out);
                }
            }
            for item in items {
                if let Value::Document(doc) = item {
                    if let Some(next) = doc.get(head) {
                        descend(next, rest, out);
                    }
                }
            }
        }
        _ => {}
    }
}
