//! ReQL Abstract Syntax Tree (AST) implementation.
//!
//! A query is represented as a tree of `Term` nodes, where each node has:
//!
//! - A `TermType` specifying the operation
//! - Positional arguments (`args`): child terms
//! - Optional named arguments (`optargs`): key-value pairs
//! - A datum value for literal data
//!
//! Terms are immutable. A node lives behind an `Arc`, so chaining
//! `r::table("users").filter(..)` allocates one new FILTER node that points at
//! the existing TABLE node instead of copying or modifying it. Two queries
//! built from the same prefix share that prefix.
//!
//! # Example
//!
//! Building `r.table("users").filter({age: 25})` by hand:
//!
//! ```rust
//! use reql_client::reql::{Datum, Term, TermType};
//!
//! let query = Term::new(TermType::Filter)
//!     .with_arg(Term::new(TermType::Table).with_arg(Term::from("users")))
//!     .with_arg(Term::from(serde_json::json!({"age": 25})));
//! assert_eq!(query.args().len(), 2);
//! ```

use super::datum::Datum;
use super::func::Fallback;
use super::terms::TermType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A ReQL Term - the fundamental building block of queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    node: Arc<TermNode>,
}

#[derive(Debug, Clone, PartialEq)]
struct TermNode {
    term_type: TermType,
    args: Vec<Term>,
    optargs: BTreeMap<String, Term>,
    datum: Option<Datum>,
    /// Only set on FUNC terms used as predicates.
    fallback: Option<Fallback>,
}

impl Term {
    /// Create a new term with given type
    pub fn new(term_type: TermType) -> Self {
        Self {
            node: Arc::new(TermNode {
                term_type,
                args: Vec::new(),
                optargs: BTreeMap::new(),
                datum: None,
                fallback: None,
            }),
        }
    }

    /// Create a datum term
    pub fn datum(datum: Datum) -> Self {
        Self {
            node: Arc::new(TermNode {
                term_type: TermType::Datum,
                args: Vec::new(),
                optargs: BTreeMap::new(),
                datum: Some(datum),
                fallback: None,
            }),
        }
    }

    /// Array literal. Stays a datum when every element is one.
    pub fn array(items: Vec<Term>) -> Self {
        if items.iter().all(Term::is_datum) {
            let datums = items
                .iter()
                .filter_map(|t| t.as_datum().cloned())
                .collect();
            Term::datum(Datum::Array(datums))
        } else {
            Term::new(TermType::MakeArray).with_args(items)
        }
    }

    /// Object literal. Stays a datum when every value is one.
    pub fn object(fields: BTreeMap<String, Term>) -> Self {
        if fields.values().all(Term::is_datum) {
            let datums = fields
                .iter()
                .filter_map(|(k, v)| v.as_datum().map(|d| (k.clone(), d.clone())))
                .collect();
            Term::datum(Datum::Object(datums))
        } else {
            Term::new(TermType::MakeObj).with_optargs(fields)
        }
    }

    /// Build an arbitrary opcode from an explicit argument list.
    pub fn call(term_type: TermType, receiver: Option<&Term>, args: Args) -> Self {
        let mut term = Term::new(term_type);
        if let Some(receiver) = receiver {
            term = term.with_arg(receiver.clone());
        }
        term.with_args(args.values).with_optargs(args.options.0)
    }

    /// Add a positional argument. Only the node being built is touched; if it
    /// is already shared it is copied first.
    pub fn with_arg(mut self, arg: Term) -> Self {
        Arc::make_mut(&mut self.node).args.push(arg);
        self
    }

    /// Add multiple positional arguments
    pub fn with_args(mut self, args: Vec<Term>) -> Self {
        Arc::make_mut(&mut self.node).args.extend(args);
        self
    }

    /// Add an optional named argument
    pub fn with_optarg<S: Into<String>>(mut self, name: S, value: Term) -> Self {
        Arc::make_mut(&mut self.node)
            .optargs
            .insert(name.into(), value);
        self
    }

    /// Add multiple optional arguments
    pub fn with_optargs(mut self, optargs: BTreeMap<String, Term>) -> Self {
        if !optargs.is_empty() {
            Arc::make_mut(&mut self.node).optargs.extend(optargs);
        }
        self
    }

    pub(crate) fn with_fallback(mut self, fallback: Fallback) -> Self {
        Arc::make_mut(&mut self.node).fallback = Some(fallback);
        self
    }

    pub fn term_type(&self) -> TermType {
        self.node.term_type
    }

    pub fn args(&self) -> &[Term] {
        &self.node.args
    }

    pub fn optargs(&self) -> &BTreeMap<String, Term> {
        &self.node.optargs
    }

    pub fn fallback(&self) -> Option<&Fallback> {
        self.node.fallback.as_ref()
    }

    /// Get the first argument
    pub fn first_arg(&self) -> Option<&Term> {
        self.node.args.first()
    }

    /// Get argument at index
    pub fn arg(&self, index: usize) -> Option<&Term> {
        self.node.args.get(index)
    }

    /// Get optional argument by name
    pub fn optarg(&self, name: &str) -> Option<&Term> {
        self.node.optargs.get(name)
    }

    /// Check if this is a datum term
    pub fn is_datum(&self) -> bool {
        self.node.term_type == TermType::Datum
    }

    /// Get datum value if this is a datum term
    pub fn as_datum(&self) -> Option<&Datum> {
        self.node.datum.as_ref()
    }

    /// True when both handles point at the very same node.
    pub fn shares_node(&self, other: &Term) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Follow a server backtrace down to the sub-term it blames.
    pub fn locate(&self, backtrace: &Backtrace) -> Option<&Term> {
        let mut current = self;
        for frame in &backtrace.0 {
            current = match frame {
                Frame::Pos(i) => current.arg(*i)?,
                Frame::Opt(key) => current.optarg(key)?,
            };
        }
        Some(current)
    }

    /// Pretty print the term tree
    pub fn pretty_print(&self, indent: usize) -> String {
        let indent_str = "  ".repeat(indent);
        let mut result = format!("{}{}(", indent_str, self.term_type().name());

        if let Some(datum) = self.as_datum() {
            result.push_str(&datum.to_string());
        }

        let args = self.args();
        if !args.is_empty() {
            result.push('\n');
            for (i, arg) in args.iter().enumerate() {
                result.push_str(&arg.pretty_print(indent + 1));
                if i < args.len() - 1 {
                    result.push(',');
                }
                result.push('\n');
            }
            result.push_str(&indent_str);
        }

        if !self.optargs().is_empty() {
            result.push_str(" {");
            for (key, value) in self.optargs() {
                result.push_str(&format!("\n{}  {}: ", indent_str, key));
                result.push_str(value.pretty_print(indent + 2).trim_start());
            }
            result.push_str(&format!("\n{}}}", indent_str));
        }

        result.push(')');
        result
    }
}

/// Named arguments of a single term
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptArgs(BTreeMap<String, Term>);

impl OptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, builder style
    pub fn set<K: Into<String>, V: Into<Term>>(mut self, key: K, value: V) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Term> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, Term> {
        self.0
    }
}

/// One entry of an explicit argument list: data, or the options object.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Term),
    Options(OptArgs),
}

/// Positional values plus named options, separated at build time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<Term>,
    options: OptArgs,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional value
    pub fn value<T: Into<Term>>(mut self, value: T) -> Self {
        self.values.push(value.into());
        self
    }

    /// Merge named options
    pub fn options(mut self, options: OptArgs) -> Self {
        self.options.0.extend(options.0);
        self
    }

    /// Split untyped values for `term_type`.
    ///
    /// A trailing object is read as options only if it is non-empty and
    /// every one of its keys is an option `term_type` accepts. Any other
    /// trailing object is data.
    pub fn from_values(term_type: TermType, mut values: Vec<Datum>) -> Self {
        let trailing_options = match values.last() {
            Some(Datum::Object(obj)) => {
                !obj.is_empty()
                    && obj
                        .keys()
                        .all(|k| term_type.option_keys().contains(&k.as_str()))
            }
            _ => false,
        };

        let mut args = Args::new();
        if trailing_options {
            if let Some(Datum::Object(obj)) = values.pop() {
                args.options = OptArgs(
                    obj.into_iter()
                        .map(|(k, v)| (k, Term::datum(v)))
                        .collect(),
                );
            }
        }
        args.values = values.into_iter().map(Term::datum).collect();
        args
    }

    pub fn values(&self) -> &[Term] {
        &self.values
    }

    pub fn option_set(&self) -> &OptArgs {
        &self.options
    }
}

impl From<Vec<Arg>> for Args {
    fn from(list: Vec<Arg>) -> Self {
        list.into_iter().fold(Args::new(), |args, arg| match arg {
            Arg::Value(term) => args.value(term),
            Arg::Options(opts) => args.options(opts),
        })
    }
}

/// One step of a backtrace: a positional or a named argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Pos(usize),
    Opt(String),
}

/// Path from the root of a query to the term an error is blamed on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backtrace(pub Vec<Frame>);

impl Backtrace {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.0
    }
}

// === Conversions into terms ===

impl From<Datum> for Term {
    fn from(datum: Datum) -> Self {
        Term::datum(datum)
    }
}

impl From<&Term> for Term {
    fn from(term: &Term) -> Self {
        term.clone()
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::datum(Datum::from(value))
    }
}

macro_rules! datum_into_term {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Term {
                fn from(value: $ty) -> Self {
                    Term::datum(Datum::from(value))
                }
            }
        )*
    };
}

datum_into_term!(
    bool,
    i32,
    i64,
    u32,
    u64,
    usize,
    f64,
    String,
    &str,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::FixedOffset>
);

impl<T: Into<Term>> From<Vec<T>> for Term {
    fn from(items: Vec<T>) -> Self {
        Term::array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Term>> From<BTreeMap<String, T>> for Term {
    fn from(fields: BTreeMap<String, T>) -> Self {
        Term::object(
            fields
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_term_creation() {
        let term = Term::new(TermType::Db);
        assert_eq!(term.term_type(), TermType::Db);
        assert!(term.args().is_empty());
    }

    #[test]
    fn test_datum_term() {
        let term = Term::from("test");
        assert!(term.is_datum());
        assert_eq!(term.as_datum().unwrap().as_string(), Some("test"));
    }

    #[test]
    fn test_with_arg_never_touches_shared_parent() {
        let parent = Term::new(TermType::Table).with_arg(Term::from("users"));
        let copy = parent.clone();
        let extended = copy.with_arg(Term::from("extra"));

        assert_eq!(parent.args().len(), 1);
        assert_eq!(extended.args().len(), 2);
    }

    #[test]
    fn test_array_normalization() {
        let literal = Term::from(vec![1, 2, 3]);
        assert!(literal.is_datum());

        let mixed = Term::array(vec![Term::from(1), Term::new(TermType::Now)]);
        assert_eq!(mixed.term_type(), TermType::MakeArray);
        assert_eq!(mixed.args().len(), 2);
    }

    #[test]
    fn test_object_normalization() {
        let mut fields = BTreeMap::new();
        fields.insert("at".to_string(), Term::new(TermType::Now));
        fields.insert("id".to_string(), Term::from("1"));
        let obj = Term::object(fields);
        assert_eq!(obj.term_type(), TermType::MakeObj);
        assert!(obj.optarg("at").is_some());
    }

    #[test]
    fn test_trailing_options_need_known_keys() {
        let values = vec![Datum::from("a"), Datum::from(json!({"index": "name"}))];
        let args = Args::from_values(TermType::GetAll, values);
        assert_eq!(args.values().len(), 1);
        assert!(args.option_set().get("index").is_some());

        // An unknown key makes the whole trailing object data
        let values = vec![Datum::from("a"), Datum::from(json!({"index": "n", "x": 1}))];
        let args = Args::from_values(TermType::GetAll, values);
        assert_eq!(args.values().len(), 2);
        assert!(args.option_set().is_empty());

        // Empty objects are data too
        let args = Args::from_values(TermType::GetAll, vec![Datum::from(json!({}))]);
        assert_eq!(args.values().len(), 1);
    }

    #[test]
    fn test_tagged_args() {
        let args: Args = vec![
            Arg::Value(Term::from(1)),
            Arg::Options(OptArgs::new().set("index", "id")),
            Arg::Value(Term::from(2)),
        ]
        .into();
        let term = Term::call(TermType::GetAll, Some(&Term::new(TermType::Table)), args);
        assert_eq!(term.args().len(), 3);
        assert!(term.optarg("index").is_some());
    }

    #[test]
    fn test_locate_backtrace() {
        let inner = Term::new(TermType::GetField)
            .with_arg(Term::new(TermType::ImplicitVar))
            .with_arg(Term::from("age"));
        let term = Term::new(TermType::Filter)
            .with_arg(Term::new(TermType::Table))
            .with_arg(inner.clone())
            .with_optarg("default", Term::from(true));

        let bt: Backtrace = serde_json::from_value(json!([1, 0])).unwrap();
        assert_eq!(
            term.locate(&bt).map(Term::term_type),
            Some(TermType::ImplicitVar)
        );

        let bt: Backtrace = serde_json::from_value(json!(["default"])).unwrap();
        assert!(term.locate(&bt).unwrap().is_datum());

        let bt: Backtrace = serde_json::from_value(json!([7])).unwrap();
        assert!(term.locate(&bt).is_none());
    }

    #[test]
    fn test_pretty_print() {
        let term = Term::new(TermType::Table).with_arg(Term::from("users"));
        let printed = term.pretty_print(0);
        assert!(printed.starts_with("TABLE("));
        assert!(printed.contains("DATUM(\"users\")"));
    }
}
