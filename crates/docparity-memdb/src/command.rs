//! Command dispatch: `count` and `find`.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use docparity_error::ErrorCode;
use docparity_harness::{BackendError, CancelReason, CommandError, Cx};
use docparity_types::{Document, Value, doc};

use crate::dialect::{Dialect, Quirk};
use crate::filter::{Filter, resolve};
use crate::store::MemoryStore;

type CommandResult<T> = Result<T, CommandError>;

pub(crate) fn execute(store: &MemoryStore, cx: &Cx, command: &Document) -> Result<Document, BackendError> {
    if let Err(reason) = cx.checkpoint() {
        return Err(BackendError::Interrupted(reason));
    }
    let name = command.first_key().unwrap_or_default();
    let reply = match name {
        "count" => count(store, cx, command),
        "find" => find(store, cx, command),
        other => Err(Failure::Command(CommandError::new(
            ErrorCode::CommandNotFound,
            format!("no such command: '{other}'"),
        ))),
    };
    match reply {
        Ok(reply) => Ok(reply),
        Err(Failure::Command(err)) => {
            debug!(
                dialect = store.dialect().label(),
                command = name,
                code = err.info.code,
                message = %err.message,
                "command rejected"
            );
            Err(BackendError::Command(err))
        }
        Err(Failure::Interrupted(reason)) => {
            debug!(dialect = store.dialect().label(), command = name, %reason, "command interrupted");
            Err(BackendError::Interrupted(reason))
        }
    }
}

/// Why a command produced no reply.
enum Failure {
    Command(CommandError),
    Interrupted(CancelReason),
}

impl From<CommandError> for Failure {
    fn from(err: CommandError) -> Self {
        Self::Command(err)
    }
}

fn count(store: &MemoryStore, cx: &Cx, command: &Document) -> Result<Document, Failure> {
    let request = Request::parse(store.dialect(), command, "count", "query")?;
    let Some(documents) = store.documents(&request.target) else {
        debug!(command = "count", collection = %request.target, "collection does not exist");
        return Ok(doc! { "n" => 0_i32, "ok" => 1.0 });
    };
    let matched = scan(cx, &documents, &request.filter)?;
    let n = request.window(matched.len());
    debug!(
        dialect = store.dialect().label(),
        command = "count",
        collection = %request.target,
        matched = matched.len(),
        n,
        "command executed"
    );
    Ok(doc! { "n" => i32::try_from(n).unwrap_or(i32::MAX), "ok" => 1.0 })
}

fn find(store: &MemoryStore, cx: &Cx, command: &Document) -> Result<Document, Failure> {
    let request = Request::parse(store.dialect(), command, "find", "filter")?;
    let sort = match command.get("sort") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Document(spec)) => parse_sort(spec)?,
        Some(other) => return Err(wrong_type("sort", "object", other).into()),
    };
    let ns = format!("{}.{}", store.database(), request.target);

    let documents = store.documents(&request.target).unwrap_or_else(|| Arc::from(Vec::new()));
    let mut matched = scan(cx, &documents, &request.filter)?;
    if !sort.is_empty() {
        matched.sort_by(|a, b| compare_by(&sort, a, b));
    }
    let start = usize::try_from(request.skip).unwrap_or(usize::MAX).min(matched.len());
    let end = start + request.window(matched.len());
    let batch: Vec<Value> = matched[start..end].iter().map(|d| Value::from((*d).clone())).collect();

    debug!(
        dialect = store.dialect().label(),
        command = "find",
        collection = %request.target,
        matched = matched.len(),
        returned = batch.len(),
        "command executed"
    );
    Ok(doc! {
        "cursor" => doc! { "firstBatch" => batch, "id" => 0_i64, "ns" => ns },
        "ok" => 1.0,
    })
}

/// Fields shared by `count` and `find`.
struct Request {
    target: String,
    filter: Filter,
    skip: u64,
    limit: Option<u64>,
}

impl Request {
    fn parse(dialect: &Dialect, command: &Document, name: &str, filter_key: &str) -> CommandResult<Self> {
        let target = match command.get(name) {
            Some(Value::String(target)) => target.clone(),
            Some(other) => {
                return Err(CommandError::new(
                    ErrorCode::BadValue,
                    format!("collection name has invalid type {}", other.type_alias()),
                ));
            }
            None => String::new(),
        };
        // Option validation comes before the filter and before the
        // collection lookup, so a nonexistent collection rejects the same
        // options an existing one does.
        let skip = parse_skip(command.get("skip"), dialect)?;
        let limit = parse_limit(command.get("limit"))?;
        let filter = match command.get(filter_key) {
            None | Some(Value::Null) => Document::new(),
            Some(Value::Document(filter)) => filter.clone(),
            Some(other) => return Err(wrong_type(filter_key, "object", other)),
        };
        let filter = Filter::parse(&filter, dialect)?;
        Ok(Self {
            target,
            filter,
            skip,
            limit,
        })
    }

    /// How many of `matched` documents survive `skip` and `limit`.
    fn window(&self, matched: usize) -> usize {
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let remaining = matched.saturating_sub(skip);
        match self.limit.and_then(|l| usize::try_from(l).ok()) {
            Some(limit) => remaining.min(limit),
            None => remaining,
        }
    }
}

fn wrong_type(field: &str, expected: &str, found: &Value) -> CommandError {
    CommandError::new(
        ErrorCode::TypeMismatch,
        format!(
            "\"{field}\" had the wrong type. Expected {expected}, found {}",
            found.type_alias()
        ),
    )
}

/// Absent or null means 0. Negative values are rejected; fractional values
/// are truncated unless the dialect rejects them.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_skip(value: Option<&Value>, dialect: &Dialect) -> CommandResult<u64> {
    let negative = |shown: &dyn std::fmt::Display| {
        CommandError::new(
            ErrorCode::NegativeSkip,
            format!("skip value must be non-negative, but received: {shown}"),
        )
    };
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(n @ (Value::Int32(_) | Value::Int64(_))) => {
            let n = n.as_i64().unwrap_or_default();
            u64::try_from(n).map_err(|_| negative(&n))
        }
        Some(Value::Double(d)) if d.is_nan() => Err(CommandError::new(
            ErrorCode::BadValue,
            "skip must be a number, found NaN",
        )),
        Some(Value::Double(d)) if *d < 0.0 => Err(negative(d)),
        Some(Value::Double(d)) if d.fract() != 0.0 && dialect.has(Quirk::RejectFractionalSkip) => Err(
            CommandError::new(ErrorCode::BadValue, format!("skip must be a whole number, found {d}")),
        ),
        Some(Value::Double(d)) => Ok(d.trunc() as u64),
        Some(other) => Err(wrong_type("skip", "number", other)),
    }
}

/// Absent, null or zero means no limit. A negative limit counts by its
/// absolute value.
#[allow(clippy::cast_possible_truncation)]
fn parse_limit(value: Option<&Value>) -> CommandResult<Option<u64>> {
    let limit = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(n @ (Value::Int32(_) | Value::Int64(_))) => n.as_i64().unwrap_or_default(),
        Some(Value::Double(d)) if d.is_finite() => d.trunc() as i64,
        Some(other) => return Err(wrong_type("limit", "number", other)),
    };
    Ok((limit != 0).then(|| limit.unsigned_abs()))
}

/// Sort keys in priority order; `true` is ascending.
fn parse_sort(spec: &Document) -> CommandResult<Vec<(Vec<String>, bool)>> {
    spec.iter()
        .map(|(key, direction)| {
            let ascending = match direction.as_f64() {
                Some(d) if d == 1.0 => true,
                Some(d) if d == -1.0 => false,
                _ => {
                    return Err(CommandError::new(
                        ErrorCode::BadValue,
                        "$sort key ordering must be 1 (for ascending) or -1 (for descending)",
                    ));
                }
            };
            Ok((key.split('.').map(str::to_owned).collect(), ascending))
        })
        .collect()
}

/// The value a document sorts by: the smallest element for ascending keys,
/// the largest for descending, null when missing.
fn sort_key(doc: &Document, path: &[String], ascending: bool) -> Value {
    let candidates = resolve(doc, path);
    let values = candidates.iter().flat_map(|c| match c {
        Value::Array(items) if !items.is_empty() => items.iter().collect::<Vec<_>>(),
        other => vec![*other],
    });
    let chosen = if ascending {
        values.min_by(|a, b| a.canonical_cmp(b))
    } else {
        values.max_by(|a, b| a.canonical_cmp(b))
    };
    chosen.cloned().unwrap_or(Value::Null)
}

fn compare_by(sort: &[(Vec<String>, bool)], a: &Document, b: &Document) -> Ordering {
    for (path, ascending) in sort {
        let ord = sort_key(a, path, *ascending).canonical_cmp(&sort_key(b, path, *ascending));
        let ord = if *ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn scan<'a>(cx: &Cx, documents: &'a [Document], filter: &Filter) -> Result<Vec<&'a Document>, Failure> {
    let mut matched = Vec::new();
    for doc in documents {
        if let Err(reason) = cx.checkpoint() {
            return Err(Failure::Interrupted(reason));
        }
        if filter.matches(doc) {
            matched.push(doc);
        }
    }
    Ok(matched)
}
