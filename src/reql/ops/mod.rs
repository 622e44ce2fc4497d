//! Chained builder methods.
//!
//! Every method here takes `&self`, allocates one new node and puts the
//! receiver in as its first argument. The receiver is only reference-counted,
//! never modified. Methods are grouped by what they operate on:
//!
//! - [`sequence`]: streams, selections and arrays (filter, map, order_by, changes)
//! - [`selection`]: databases, tables, writes and indexes
//! - [`value`]: comparisons, math, logic, strings, objects and arrays as values
//! - [`time`]: time accessors and conversions
//! - [`geo`]: geometry relations
//!
//! Arity and option keys are not checked here. The protocol compiler does
//! that when the query is run.

pub mod geo;
pub mod selection;
pub mod sequence;
pub mod time;
pub mod value;

pub use sequence::ChangesOptions;

use super::ast::{OptArgs, Term};
use super::func::func_wrap;
use super::terms::TermType;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

impl Term {
    /// New node of `term_type` with `self` as its first argument
    pub(crate) fn chain(&self, term_type: TermType) -> Term {
        Term::new(term_type).with_arg(self.clone())
    }

    pub(crate) fn chain1<A: Into<Term>>(&self, term_type: TermType, arg: A) -> Term {
        self.chain(term_type).with_arg(arg.into())
    }

    pub(crate) fn chain_many<I, A>(&self, term_type: TermType, args: I) -> Term
    where
        I: IntoIterator<Item = A>,
        A: Into<Term>,
    {
        self.chain(term_type)
            .with_args(args.into_iter().map(Into::into).collect())
    }

    /// Function-position argument, wrapped when it uses `r::row()`
    pub(crate) fn chain_func<F: Into<Term>>(&self, term_type: TermType, f: F) -> Term {
        self.chain(term_type).with_arg(func_wrap(f.into()))
    }

    /// Attach named options from an explicit option set
    pub fn opts(self, options: OptArgs) -> Term {
        self.with_optargs(options.into_inner())
    }
}

/// Named options from a serializable struct. `None` fields are skipped.
pub(crate) fn optargs_of<T: Serialize>(options: &T) -> BTreeMap<String, Term> {
    match serde_json::to_value(options) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, Term::from(v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
