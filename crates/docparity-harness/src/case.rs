//! Case model: hand-written test intents.
//!
//! A [`Case`] names a read-only command, the result shape the author expects
//! across the whole matrix, and whether the case is a tracked known
//! divergence. Cases are immutable once built and are only constructible
//! through [`CaseBuilder`], which only knows read-style commands.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use docparity_error::{HarnessError, Result};
use docparity_types::{Document, Value, doc};

/// Reference to a tracker issue explaining a known divergence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueRef(String);

impl IssueRef {
    /// Accepts an `http(s)://` URL or an `ORG/REPO#N` style id.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || HarnessError::InvalidIssueRef {
            value: value.to_owned(),
        };
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let is_url = ["https://", "http://"]
            .iter()
            .any(|scheme| trimmed.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
        let is_tracker_id = trimmed.rsplit_once('#').is_some_and(|(repo, number)| {
            !repo.is_empty() && !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
        });
        if is_url || is_tracker_id {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(invalid())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IssueRef {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<IssueRef> for String {
    fn from(issue: IssueRef) -> Self {
        issue.0
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape the author expects across the whole matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// At least one pairing yields a meaningful success.
    #[default]
    NonEmpty,
    /// No pairing yields a meaningful success.
    Empty,
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonEmpty => f.write_str("non-empty"),
            Self::Empty => f.write_str("empty"),
        }
    }
}

/// Whether a case is held to strict equivalence or is a tracked divergence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    #[default]
    Strict,
    KnownDivergent(IssueRef),
}

impl CaseMode {
    pub fn issue(&self) -> Option<&IssueRef> {
        match self {
            Self::Strict => None,
            Self::KnownDivergent(issue) => Some(issue),
        }
    }
}

/// How numbers of different wire subtypes compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericMode {
    /// `1`, `1L` and `1.0` are equal.
    #[default]
    Mathematical,
    /// Subtypes must also agree.
    TypePreserving,
}

/// How arrays compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceOrder {
    #[default]
    Ordered,
    /// Arrays compare as multisets.
    Multiset,
}

/// How two command errors are judged equivalent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMatch {
    #[default]
    Code,
    Category,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompareOptions {
    pub numeric: NumericMode,
    pub sequences: SequenceOrder,
    pub errors: ErrorMatch,
}

/// Backend-agnostic read command. Rendered once per side with that side's
/// collection name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandSpec {
    Count {
        filter: Document,
        /// `None` omits the field; `Some(Value::Null)` sends an explicit null.
        skip: Option<Value>,
        limit: i64,
    },
    Find {
        filter: Document,
        skip: Option<Value>,
        limit: i64,
        /// Defaults to `{_id: 1}` when rendered.
        sort: Option<Document>,
    },
}

impl CommandSpec {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Find { .. } => "find",
        }
    }

    pub const fn filter(&self) -> &Document {
        match self {
            Self::Count { filter, .. } | Self::Find { filter, .. } => filter,
        }
    }

    /// Render the wire command for `target`.
    pub fn render(&self, target: &str) -> Document {
        match self {
            Self::Count {
                filter,
                skip,
                limit,
            } => {
                let mut command = doc! { "count" => target, "query" => filter.clone() };
                if let Some(skip) = skip {
                    command.insert("skip", skip.clone());
                }
                command.insert("limit", *limit);
                command
            }
            Self::Find {
                filter,
                skip,
                limit,
                sort,
            } => {
                let sort = sort.clone().unwrap_or_else(|| doc! { "_id" => 1_i32 });
                let mut command = doc! { "find" => target, "filter" => filter.clone(), "sort" => sort };
                if let Some(skip) = skip {
                    command.insert("skip", skip.clone());
                }
                command.insert("limit", *limit);
                command
            }
        }
    }

    /// Whether a successful reply counts as non-empty for shape
    /// classification. Any count reply carries a result; a find reply counts
    /// when its first batch has documents.
    pub fn is_meaningful(&self, reply: &Document) -> bool {
        match self {
            Self::Count { .. } => reply.contains_key("n"),
            Self::Find { .. } => reply
                .get_document("cursor")
                .and_then(|cursor| cursor.get_array("firstBatch"))
                .is_some_and(|batch| !batch.is_empty()),
        }
    }
}

/// A declared test intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    name: String,
    command: CommandSpec,
    expected_shape: ResultShape,
    mode: CaseMode,
    compare: CompareOptions,
}

impl Case {
    /// Start a `count` case.
    pub fn count(name: impl Into<String>) -> CaseBuilder {
        CaseBuilder::new(name.into(), CommandKind::Count)
    }

    /// Start a `find` case.
    pub fn find(name: impl Into<String>) -> CaseBuilder {
        CaseBuilder::new(name.into(), CommandKind::Find)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub const fn expected_shape(&self) -> ResultShape {
        self.expected_shape
    }

    pub const fn mode(&self) -> &CaseMode {
        &self.mode
    }

    pub const fn compare_options(&self) -> &CompareOptions {
        &self.compare
    }

    pub const fn is_known_divergent(&self) -> bool {
        matches!(self.mode, CaseMode::KnownDivergent(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Count,
    Find,
}

/// Builder for [`Case`]. Validation happens in [`CaseBuilder::build`].
#[derive(Debug, Clone)]
#[must_use]
pub struct CaseBuilder {
    name: String,
    kind: CommandKind,
    filter: Option<Document>,
    skip: Option<Value>,
    limit: i64,
    sort: Option<Document>,
    expected_shape: ResultShape,
    divergence: Option<String>,
    compare: CompareOptions,
}

impl CaseBuilder {
    fn new(name: String, kind: CommandKind) -> Self {
        Self {
            name,
            kind,
            filter: None,
            skip: None,
            limit: 0,
            sort: None,
            expected_shape: ResultShape::NonEmpty,
            divergence: None,
            compare: CompareOptions::default(),
        }
    }

    pub fn filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Send `skip` with exactly this value (any type, including null).
    pub fn skip(mut self, skip: impl Into<Value>) -> Self {
        self.skip = Some(skip.into());
        self
    }

    /// `0` means no limit.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Only meaningful for `find`.
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn expect(mut self, shape: ResultShape) -> Self {
        self.expected_shape = shape;
        self
    }

    pub fn expect_empty(self) -> Self {
        self.expect(ResultShape::Empty)
    }

    /// Mark this case as a tracked divergence. The reference is validated
    /// when the case is built.
    pub fn known_divergent(mut self, issue: impl Into<String>) -> Self {
        self.divergence = Some(issue.into());
        self
    }

    pub fn numeric(mut self, mode: NumericMode) -> Self {
        self.compare.numeric = mode;
        self
    }

    pub fn unordered_sequences(mut self) -> Self {
        self.compare.sequences = SequenceOrder::Multiset;
        self
    }

    pub fn error_match(mut self, mode: ErrorMatch) -> Self {
        self.compare.errors = mode;
        self
    }

    pub fn build(self) -> Result<Case> {
        let Some(filter) = self.filter else {
            return Err(HarnessError::MissingFilter { case: self.name });
        };
        let mode = match self.divergence.as_deref() {
            Some(issue) => CaseMode::KnownDivergent(IssueRef::parse(issue)?),
            None => CaseMode::Strict,
        };
        let command = match self.kind {
            CommandKind::Count => CommandSpec::Count {
                filter,
                skip: self.skip,
                limit: self.limit,
            },
            CommandKind::Find => CommandSpec::Find {
                filter,
                skip: self.skip,
                limit: self.limit,
                sort: self.sort,
            },
        };
        Ok(Case {
            name: self.name,
            command,
            expected_shape: self.expected_shape,
            mode,
            compare: self.compare,
        })
    }
}

/// A test group's cases, in declaration order, with unique names.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaseTable {
    group: String,
    cases: Vec<Case>,
}

impl CaseTable {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            cases: Vec::new(),
        }
    }

    /// Build a table from already-built cases.
    pub fn from_cases(group: impl Into<String>, cases: impl IntoIterator<Item = Case>) -> Result<Self> {
        let mut table = Self::new(group);
        for case in cases {
            table.push(case)?;
        }
        Ok(table)
    }

    /// Build a table from builders, failing on the first invalid case.
    pub fn build(group: impl Into<String>, builders: impl IntoIterator<Item = CaseBuilder>) -> Result<Self> {
        let mut table = Self::new(group);
        for builder in builders {
            table.push(builder.build()?)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, case: Case) -> Result<()> {
        if self.get(case.name()).is_some() {
            return Err(HarnessError::DuplicateCase {
                group: self.group.clone(),
                case: case.name,
            });
        }
        self.cases.push(case);
        Ok(())
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn get(&self, name: &str) -> Option<&Case> {
        self.cases.iter().find(|c| c.name() == name)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// SHA-256 over every case's name, rendered command, shape and mode.
    /// Two runs with the same fingerprint exercised the same intents.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for case in &self.cases {
            hasher.update(case.name.as_bytes());
            hasher.update([0]);
            hasher.update(case.command.render("<target>").to_string().as_bytes());
            hasher.update([0]);
            hasher.update(case.expected_shape.to_string().as_bytes());
            if let Some(issue) = case.mode.issue() {
                hasher.update(issue.as_str().as_bytes());
            }
            hasher.update([0xff]);
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}
