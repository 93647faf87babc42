//! Document value model.
//!
//! Both backends of a pairing and the harness speak in terms of these types:
//! commands are rendered as [`Document`]s, replies come back as
//! [`Document`]s, and the comparator walks [`Value`] trees.

pub mod document;
pub mod value;

pub use document::Document;
pub use value::{ObjectId, RegexLiteral, Value};

/// Build a [`Document`] from `key => value` pairs, preserving order.
///
/// # Examples
///
/// ```
/// use docparity_types::{doc, Value};
///
/// let d = doc! { "count" => "values", "query" => doc! { "v" => 42_i32 } };
/// assert_eq!(d.first_key(), Some("count"));
/// assert_eq!(d.get("query").and_then(Value::as_document).map(|q| q.len()), Some(1));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:expr => $val:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $(document.insert($key, $crate::Value::from($val));)+
        document
    }};
}

/// Build a [`Value::Array`] from heterogeneous values.
///
/// ```
/// use docparity_types::{array, Value};
///
/// let a = array![42_i32, "foo", Value::Null];
/// assert_eq!(a.as_array().map(Vec::len), Some(3));
/// ```
#[macro_export]
macro_rules! array {
    () => {
        $crate::Value::Array(::std::vec::Vec::new())
    };
    ($($val:expr),+ $(,)?) => {
        $crate::Value::Array(::std::vec![$($crate::Value::from($val)),+])
    };
}
