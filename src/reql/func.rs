//! Closures.
//!
//! A Rust closure passed to the builder is called exactly once, at build time,
//! with fresh VAR terms standing in for its parameters. Whatever term tree it
//! returns becomes the body of a FUNC term:
//!
//! ```text
//! [69, [[2, [id1, id2]], body]]
//! ```
//!
//! Variable ids come from one process-wide counter, so two closures never
//! share an id even when nested or built on different threads.

use super::ast::Term;
use super::datum::Datum;
use super::terms::TermType;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

fn next_var_id() -> u64 {
    NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed)
}

fn var(id: u64) -> Term {
    Term::new(TermType::Var).with_arg(Term::from(id))
}

/// What a predicate evaluates to when the row lacks a field it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Treat the row as not matching. This is what the server does anyway.
    #[default]
    Skip,
    /// Treat the row as matching.
    Keep,
    /// Propagate the non-existence error.
    Raise,
}

impl Fallback {
    /// The FILTER `default` option that encodes this policy, if any.
    pub(crate) fn default_optarg(self) -> Option<Term> {
        match self {
            Fallback::Skip => None,
            Fallback::Keep => Some(Term::from(true)),
            Fallback::Raise => Some(Term::new(TermType::Error)),
        }
    }
}

/// A compiled closure, ready to be passed where a function is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct Func(Term);

impl Func {
    fn build(arity: usize, body: impl FnOnce(Vec<Term>) -> Term) -> Self {
        let ids: Vec<u64> = (0..arity).map(|_| next_var_id()).collect();
        let params = ids.iter().map(|id| var(*id)).collect();
        let body = body(params);
        let ids = Datum::Array(ids.into_iter().map(Datum::from).collect());
        Func(
            Term::new(TermType::Func)
                .with_arg(Term::datum(ids))
                .with_arg(body),
        )
    }

    /// Attach a missing-field policy.
    ///
    /// Only a FILTER predicate can carry `Keep` or `Raise`; anywhere else
    /// the query fails to compile.
    pub fn fallback(self, fallback: Fallback) -> Self {
        Func(self.0.with_fallback(fallback))
    }

    /// Rows missing a referenced field match
    pub fn or_keep(self) -> Self {
        self.fallback(Fallback::Keep)
    }

    /// Rows missing a referenced field raise an error
    pub fn or_raise(self) -> Self {
        self.fallback(Fallback::Raise)
    }

    /// Parameter ids in declaration order
    pub fn params(&self) -> Vec<u64> {
        func_params(&self.0).unwrap_or_default()
    }

    pub fn body(&self) -> Option<&Term> {
        self.0.arg(1)
    }
}

impl From<Func> for Term {
    fn from(func: Func) -> Self {
        func.0
    }
}

/// One-parameter closure
pub fn func<F, R>(f: F) -> Func
where
    F: FnOnce(Term) -> R,
    R: Into<Term>,
{
    Func::build(1, |mut params| f(params.remove(0)).into())
}

/// Two-parameter closure
pub fn func2<F, R>(f: F) -> Func
where
    F: FnOnce(Term, Term) -> R,
    R: Into<Term>,
{
    Func::build(2, |mut params| {
        let b = params.remove(1);
        let a = params.remove(0);
        f(a, b).into()
    })
}

/// Three-parameter closure
pub fn func3<F, R>(f: F) -> Func
where
    F: FnOnce(Term, Term, Term) -> R,
    R: Into<Term>,
{
    Func::build(3, |mut params| {
        let c = params.remove(2);
        let b = params.remove(1);
        let a = params.remove(0);
        f(a, b, c).into()
    })
}

/// Parameter ids of a FUNC term, or `None` if `term` is not a well formed FUNC.
pub(crate) fn func_params(term: &Term) -> Option<Vec<u64>> {
    if term.term_type() != TermType::Func {
        return None;
    }
    let first = term.first_arg()?;
    let as_id = |d: &Datum| d.as_number().map(|n| n as u64);
    match first.term_type() {
        TermType::Datum => first.as_datum()?.as_array()?.iter().map(as_id).collect(),
        TermType::MakeArray => first
            .args()
            .iter()
            .map(|t| t.as_datum().and_then(as_id))
            .collect(),
        _ => None,
    }
}

/// Whether `term` reads `r::row()` outside of any nested closure.
fn uses_implicit_var(term: &Term) -> bool {
    match term.term_type() {
        TermType::ImplicitVar => true,
        TermType::Func => false,
        _ => {
            term.args().iter().any(uses_implicit_var)
                || term.optargs().values().any(uses_implicit_var)
        }
    }
}

/// Turn a function-position argument into a FUNC.
///
/// Expressions written with `r::row()` get a one-parameter wrapper, as the
/// server expects. Everything else is passed through untouched.
pub(crate) fn func_wrap(term: Term) -> Term {
    if term.term_type() != TermType::Func && uses_implicit_var(&term) {
        let wrapped = Func::build(1, |_| term);
        wrapped.into()
    } else {
        term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::r;

    #[test]
    fn test_fresh_ids_per_closure() {
        let a = func(|x| x);
        let b = func(|x| x);
        assert_ne!(a.params(), b.params());
        assert_eq!(a.params().len(), 1);
    }

    #[test]
    fn test_body_references_params() {
        let f = func2(|acc, x| acc.add(x));
        let ids = f.params();
        let body = f.body().unwrap();
        assert_eq!(body.term_type(), TermType::Add);
        let first = body.arg(0).unwrap();
        assert_eq!(first.term_type(), TermType::Var);
        assert_eq!(
            first.first_arg().and_then(Term::as_datum).and_then(Datum::as_number),
            Some(ids[0] as f64)
        );
    }

    #[test]
    fn test_fallback_optarg() {
        assert!(Fallback::Skip.default_optarg().is_none());
        assert_eq!(
            Fallback::Keep.default_optarg().and_then(|t| t.as_datum().cloned()),
            Some(Datum::Boolean(true))
        );
        let raise = Fallback::Raise.default_optarg().unwrap();
        assert_eq!(raise.term_type(), TermType::Error);
    }

    #[test]
    fn test_row_is_wrapped() {
        let pred = r::row().get_field("age").gt(18);
        let wrapped = func_wrap(pred);
        assert_eq!(wrapped.term_type(), TermType::Func);
        assert_eq!(func_params(&wrapped).map(|p| p.len()), Some(1));

        let plain = func_wrap(Term::from(serde_json::json!({"age": 18})));
        assert!(plain.is_datum());
    }
}
