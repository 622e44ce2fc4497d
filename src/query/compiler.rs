//! ReQL Protocol Compiler.
//!
//! Lowers a `Term` tree into the JSON wire format and builds the query
//! payloads that go into frames. Also decodes wire JSON back into terms, which
//! the test server and the CLI use.
//!
//! # Wire Format
//!
//! Terms are transmitted as JSON arrays:
//! ```json
//! [term_type, [arg1, arg2, ...], {"optarg1": value1, ...}]
//! ```
//!
//! - `term_type` is the numeric opcode
//! - the second element holds the positional arguments
//! - the third element (omitted when empty) holds the named arguments
//!
//! Literal arrays are wrapped as `[2, [...]]` (MAKE_ARRAY) since a bare array
//! would be read as a term. Objects are plain JSON objects.
//!
//! # Example
//!
//! `r.table("users").filter({active: true})`:
//!
//! ```json
//! [39,
//!   [
//!     [15, ["users"]],
//!     {"active": true}
//!   ]
//! ]
//! ```
//!
//! Query payloads are `[1, term, {global optargs}]` for START and a bare
//! `[kind]` for CONTINUE, STOP, NOREPLY_WAIT and SERVER_INFO.

use super::options::RunOptions;
use crate::error::{Error, Result};
use crate::reql::func::{func_params, Fallback};
use crate::reql::{Datum, QueryType, Term, TermType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One request, ready to be framed.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    token: u64,
    kind: QueryType,
    term: Option<Term>,
    global_optargs: BTreeMap<String, Term>,
    payload: Value,
}

impl Query {
    /// START query. Validates and lowers `term` and every optarg.
    pub fn start(term: Term, global_optargs: BTreeMap<String, Term>) -> Result<Self> {
        let wire_term = QueryCompiler::serialize(&term)?;
        let mut wire_optargs = Map::new();
        for (key, value) in &global_optargs {
            wire_optargs.insert(key.clone(), QueryCompiler::serialize(value)?);
        }

        Ok(Self {
            token: 0,
            kind: QueryType::Start,
            term: Some(term),
            global_optargs,
            payload: Value::Array(vec![
                Value::from(QueryType::Start.to_u64()),
                wire_term,
                Value::Object(wire_optargs),
            ]),
        })
    }

    /// A query without a term (CONTINUE, STOP, NOREPLY_WAIT, SERVER_INFO)
    pub fn control(kind: QueryType) -> Self {
        Self {
            token: 0,
            kind,
            term: None,
            global_optargs: BTreeMap::new(),
            payload: Value::Array(vec![Value::from(kind.to_u64())]),
        }
    }

    pub fn with_token(mut self, token: u64) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn kind(&self) -> QueryType {
        self.kind
    }

    pub fn term(&self) -> Option<&Term> {
        self.term.as_ref()
    }

    pub fn global_optargs(&self) -> &BTreeMap<String, Term> {
        &self.global_optargs
    }

    /// Wire JSON of the payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.payload)
            .map_err(|e| Error::Compile(format!("cannot encode query: {}", e)))
    }

    /// Rebuild a query from its token and payload.
    pub fn decode(token: u64, payload: &Value) -> Result<Self> {
        let arr = payload
            .as_array()
            .ok_or_else(|| Error::Client(format!("query payload is not an array: {}", payload)))?;

        let kind = arr
            .first()
            .and_then(Value::as_u64)
            .and_then(QueryType::from_u64)
            .ok_or_else(|| Error::Client(format!("invalid query type in {}", payload)))?;

        if kind != QueryType::Start {
            return Ok(Query::control(kind).with_token(token));
        }

        let term = arr
            .get(1)
            .ok_or_else(|| Error::Client("START query without a term".to_string()))
            .and_then(QueryCompiler::decode)?;

        let mut global_optargs = BTreeMap::new();
        if let Some(Value::Object(obj)) = arr.get(2) {
            for (key, value) in obj {
                global_optargs.insert(key.clone(), QueryCompiler::decode(value)?);
            }
        }

        Ok(Query::start(term, global_optargs)?.with_token(token))
    }
}

/// Protocol compiler: validation and lowering of terms.
pub struct QueryCompiler;

impl QueryCompiler {
    /// Compile a term and run options into a START query.
    ///
    /// The token is assigned later, by the connection that sends it.
    pub fn compile(term: &Term, options: &RunOptions) -> Result<Query> {
        Query::start(term.clone(), options.global_optargs())
    }

    /// Validate `term` and lower it to wire JSON.
    pub fn serialize(term: &Term) -> Result<Value> {
        let mut scope = Vec::new();
        Self::lower(term, &mut scope)
    }

    fn lower(term: &Term, scope: &mut Vec<Vec<u64>>) -> Result<Value> {
        let term_type = term.term_type();

        match term_type {
            TermType::Datum => {
                return term
                    .as_datum()
                    .map(Datum::to_wire)
                    .ok_or_else(|| Error::Compile("DATUM term without a value".to_string()));
            }
            TermType::Var => Self::check_var(term, scope)?,
            TermType::ImplicitVar if scope.len() != 1 => {
                return Err(Error::Compile(
                    "r.row cannot be used outside a function or inside a nested function"
                        .to_string(),
                ));
            }
            _ => {}
        }

        Self::check_arity(term)?;
        Self::check_options(term)?;
        Self::check_fallbacks(term)?;

        if term_type == TermType::MakeObj {
            let mut obj = Map::new();
            for (key, value) in term.optargs() {
                obj.insert(key.clone(), Self::lower(value, scope)?);
            }
            return Ok(Value::Object(obj));
        }

        let is_func = term_type == TermType::Func;
        if is_func {
            let params = func_params(term)
                .ok_or_else(|| Error::Compile("FUNC parameters must be variable ids".to_string()))?;
            scope.push(params);
        }

        let args = term
            .args()
            .iter()
            .map(|arg| Self::lower(arg, scope))
            .collect::<Result<Vec<_>>>();

        if is_func {
            scope.pop();
        }

        let mut optargs = Map::new();
        for (key, value) in term.optargs() {
            optargs.insert(key.clone(), Self::lower(value, scope)?);
        }
        if let Some(default) = Self::filter_default(term) {
            optargs.insert("default".to_string(), Self::lower(&default, scope)?);
        }

        let mut wire = vec![Value::from(term_type.to_u64()), Value::Array(args?)];
        if !optargs.is_empty() {
            wire.push(Value::Object(optargs));
        }
        Ok(Value::Array(wire))
    }

    /// FILTER `default` derived from the predicate's fallback policy.
    fn filter_default(term: &Term) -> Option<Term> {
        if term.term_type() != TermType::Filter || term.optarg("default").is_some() {
            return None;
        }
        term.arg(1)?.fallback()?.default_optarg()
    }

    /// A missing-field policy is only expressible on a FILTER predicate.
    fn check_fallbacks(term: &Term) -> Result<()> {
        for (i, arg) in term.args().iter().enumerate() {
            let predicate = term.term_type() == TermType::Filter && i == 1;
            let policy = arg.fallback().copied().unwrap_or_default();
            if !predicate && policy != Fallback::Skip {
                return Err(Error::Compile(format!(
                    "{:?} fallback is only supported on a FILTER predicate, not in {}",
                    policy,
                    term.term_type()
                )));
            }
        }
        Ok(())
    }

    fn check_var(term: &Term, scope: &[Vec<u64>]) -> Result<()> {
        let id = term
            .first_arg()
            .and_then(Term::as_datum)
            .and_then(Datum::as_number)
            .ok_or_else(|| Error::Compile("VAR term without a numeric id".to_string()))?
            as u64;

        if scope.iter().any(|params| params.contains(&id)) {
            Ok(())
        } else {
            Err(Error::Compile(format!(
                "variable {} is not bound by an enclosing function",
                id
            )))
        }
    }

    fn check_arity(term: &Term) -> Result<()> {
        // ARGS splices an unknown number of values in at run time
        if term.args().iter().any(|a| a.term_type() == TermType::Args) {
            return Ok(());
        }

        let (min, max) = term.term_type().arity();
        let found = term.args().len();
        let ok = found >= min && max.map_or(true, |max| found <= max);
        if ok {
            return Ok(());
        }

        let expected = match max {
            Some(max) if max == min => format!("{}", min),
            Some(max) => format!("between {} and {}", min, max),
            None => format!("at least {}", min),
        };
        Err(Error::Compile(format!(
            "{} expects {} argument(s) but found {}",
            term.term_type(),
            expected,
            found
        )))
    }

    fn check_options(term: &Term) -> Result<()> {
        let term_type = term.term_type();
        match term.optargs().keys().find(|k| !term_type.accepts_option(k)) {
            Some(key) => Err(Error::Compile(format!(
                "unrecognized option `{}` for {}",
                key, term_type
            ))),
            None => Ok(()),
        }
    }

    /// Decode wire JSON into a term
    pub fn decode(json: &Value) -> Result<Term> {
        match json {
            Value::Array(arr) => Self::decode_term(arr),
            Value::Object(obj) => {
                let mut fields = BTreeMap::new();
                for (key, value) in obj {
                    fields.insert(key.clone(), Self::decode(value)?);
                }
                Ok(Term::object(fields))
            }
            other => Ok(Term::datum(Datum::from(other.clone()))),
        }
    }

    fn decode_term(arr: &[Value]) -> Result<Term> {
        let code = arr
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Compile(format!("invalid term: {:?}", arr)))?;

        let term_type = TermType::from_u64(code)
            .ok_or_else(|| Error::Compile(format!("unknown term type: {}", code)))?;

        if term_type == TermType::Datum {
            let value = arr
                .get(1)
                .ok_or_else(|| Error::Compile("DATUM term requires a value".to_string()))?;
            return Ok(Term::datum(Datum::from(value.clone())));
        }

        let args = match arr.get(1) {
            Some(Value::Array(args)) => args
                .iter()
                .map(Self::decode)
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::Compile(format!(
                    "arguments of {} must be an array, got {}",
                    term_type, other
                )))
            }
            None => Vec::new(),
        };

        let mut optargs = BTreeMap::new();
        if let Some(Value::Object(obj)) = arr.get(2) {
            for (key, value) in obj {
                optargs.insert(key.clone(), Self::decode(value)?);
            }
        }

        Ok(Term::new(term_type).with_args(args).with_optargs(optargs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::{func, r, OptArgs};
    use serde_json::json;

    #[test]
    fn test_insert_scenario() {
        let term = r::table("Test").insert(json!({"id": "123"}));
        let query = QueryCompiler::compile(&term, &RunOptions::default()).unwrap();

        assert_eq!(query.kind(), QueryType::Start);
        assert_eq!(
            query.payload(),
            &json!([1, [56, [[15, ["Test"]], {"id": "123"}]], {}])
        );
    }

    #[test]
    fn test_arrays_are_wrapped() {
        let wire = QueryCompiler::serialize(&r::expr(vec![1, 2])).unwrap();
        assert_eq!(wire, json!([2, [1, 2]]));
    }

    #[test]
    fn test_func_lowering() {
        let f = func(|x| x.get_field("age"));
        let id = f.params()[0];
        let wire = QueryCompiler::serialize(&r::table("t").map(f)).unwrap();
        assert_eq!(
            wire,
            json!([38, [[15, ["t"]], [69, [[2, [id]], [31, [[10, [id]], "age"]]]]]])
        );
    }

    #[test]
    fn test_unbound_variable() {
        let outer = func(|x| x);
        let leaked = outer.body().unwrap().clone();
        let err = QueryCompiler::serialize(&r::table("t").get_field("a").add(leaked)).unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
    }

    #[test]
    fn test_arity_checked_here() {
        let bad = Term::new(TermType::Insert).with_arg(r::table("t"));
        let err = QueryCompiler::serialize(&bad).unwrap_err();
        assert_eq!(
            err,
            Error::Compile("INSERT expects 2 argument(s) but found 1".to_string())
        );
    }

    #[test]
    fn test_args_skips_arity() {
        let term = Term::new(TermType::Insert).with_arg(r::args(vec![1, 2]));
        assert!(QueryCompiler::serialize(&term).is_ok());
    }

    #[test]
    fn test_unknown_option() {
        let term = r::table("t")
            .insert(json!({}))
            .opts(OptArgs::new().set("index", "x"));
        let err = QueryCompiler::serialize(&term).unwrap_err();
        assert!(err.to_string().contains("unrecognized option `index`"));
    }

    #[test]
    fn test_fallback_becomes_default_optarg() {
        let keep = r::table("t").filter(func(|row| row.get_field("a").eq(1)).or_keep());
        let wire = QueryCompiler::serialize(&keep).unwrap();
        assert_eq!(wire[2], json!({"default": true}));

        let raise = r::table("t").filter(func(|row| row.get_field("a").eq(1)).or_raise());
        let wire = QueryCompiler::serialize(&raise).unwrap();
        assert_eq!(wire[2], json!({"default": [12, []]}));

        let skip = r::table("t").filter(func(|row| row.get_field("a").eq(1)));
        let wire = QueryCompiler::serialize(&skip).unwrap();
        assert_eq!(wire.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_fallback_outside_filter_rejected() {
        let mapped = r::table("t").map(func(|row| row.get_field("a")).or_raise());
        let err = QueryCompiler::serialize(&mapped).unwrap_err();
        assert_eq!(
            err,
            Error::Compile(
                "Raise fallback is only supported on a FILTER predicate, not in MAP".to_string()
            )
        );

        let skip = r::table("t").map(func(|row| row.get_field("a")).fallback(Fallback::Skip));
        assert!(QueryCompiler::serialize(&skip).is_ok());
    }

    #[test]
    fn test_implicit_var_scope() {
        let ok = r::table("t").filter(r::row().get_field("a").eq(1));
        assert!(QueryCompiler::serialize(&ok).is_ok());

        let top_level = r::row().get_field("a");
        assert!(QueryCompiler::serialize(&top_level).is_err());

        let nested = r::table("t").filter(func(|x| {
            x.get_field("tags").contains(vec![r::row().eq("a")])
        }));
        assert!(QueryCompiler::serialize(&nested).is_err());
    }

    #[test]
    fn test_decode_roundtrip() {
        let term = r::db("blog")
            .table("posts")
            .filter(func(|p| p.get_field("tags").contains(vec!["rust"])))
            .order_by(vec![r::desc("date")])
            .pluck(vec!["title", "date"])
            .limit(5);
        let wire = QueryCompiler::serialize(&term).unwrap();
        let decoded = QueryCompiler::decode(&wire).unwrap();
        assert_eq!(QueryCompiler::serialize(&decoded).unwrap(), wire);
    }

    #[test]
    fn test_query_decode() {
        let term = r::table("t").count();
        let query = QueryCompiler::compile(&term, &RunOptions::new().db("x"))
            .unwrap()
            .with_token(7);
        let bytes = query.encode().unwrap();
        let payload: Value = serde_json::from_slice(&bytes).unwrap();
        let decoded = Query::decode(7, &payload).unwrap();
        assert_eq!(decoded.payload(), query.payload());
        assert_eq!(decoded.token(), 7);

        let stop = Query::decode(7, &json!([3])).unwrap();
        assert_eq!(stop.kind(), QueryType::Stop);
    }
}
