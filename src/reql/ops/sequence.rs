//! Sequence operations: transforms, aggregations, joins and change feeds.

use super::optargs_of;
use crate::reql::ast::Term;
use crate::reql::terms::TermType;
use serde::{Deserialize, Serialize};

/// Batching of change notifications
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Squash {
    Flag(bool),
    Seconds(f64),
}

/// Options of `changes()`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesOptions {
    pub squash: Option<Squash>,
    /// Unread changes the cursor holds before failing with an overflow.
    pub changefeed_queue_size: Option<usize>,
    pub include_initial: Option<bool>,
    pub include_states: Option<bool>,
    pub include_offsets: Option<bool>,
    pub include_types: Option<bool>,
}

impl Term {
    /// Rows for which `predicate` is true.
    ///
    /// `predicate` may be a closure, an `r::row()` expression or an object
    /// to match against. Rows missing a field the predicate reads are
    /// skipped unless the closure carries another [`Fallback`].
    ///
    /// [`Fallback`]: crate::reql::Fallback
    pub fn filter<P: Into<Term>>(&self, predicate: P) -> Term {
        self.chain_func(TermType::Filter, predicate)
    }

    pub fn map<F: Into<Term>>(&self, f: F) -> Term {
        self.chain_func(TermType::Map, f)
    }

    pub fn concat_map<F: Into<Term>>(&self, f: F) -> Term {
        self.chain_func(TermType::ConcatMap, f)
    }

    pub fn reduce<F: Into<Term>>(&self, f: F) -> Term {
        self.chain_func(TermType::Reduce, f)
    }

    pub fn fold<B: Into<Term>, F: Into<Term>>(&self, base: B, f: F) -> Term {
        self.chain1(TermType::Fold, base)
            .with_arg(crate::reql::func::func_wrap(f.into()))
    }

    pub fn for_each<F: Into<Term>>(&self, f: F) -> Term {
        self.chain_func(TermType::ForEach, f)
    }

    /// Sort by one or more keys (field names, `r::asc`/`r::desc`, closures)
    pub fn order_by<I, K>(&self, keys: I) -> Term
    where
        I: IntoIterator<Item = K>,
        K: Into<Term>,
    {
        self.chain_many(TermType::OrderBy, keys)
    }

    /// Sort by a secondary index
    pub fn order_by_index<K: Into<Term>>(&self, index: K) -> Term {
        self.chain(TermType::OrderBy).with_optarg("index", index.into())
    }

    pub fn skip(&self, n: usize) -> Term {
        self.chain1(TermType::Skip, n)
    }

    pub fn limit(&self, n: usize) -> Term {
        self.chain1(TermType::Limit, n)
    }

    pub fn slice<S: Into<Term>, E: Into<Term>>(&self, start: S, end: E) -> Term {
        self.chain1(TermType::Slice, start).with_arg(end.into())
    }

    pub fn nth<I: Into<Term>>(&self, index: I) -> Term {
        self.chain1(TermType::Nth, index)
    }

    pub fn offsets_of<P: Into<Term>>(&self, predicate: P) -> Term {
        self.chain_func(TermType::OffsetsOf, predicate)
    }

    pub fn is_empty(&self) -> Term {
        self.chain(TermType::IsEmpty)
    }

    pub fn sample(&self, n: usize) -> Term {
        self.chain1(TermType::Sample, n)
    }

    pub fn distinct(&self) -> Term {
        self.chain(TermType::Distinct)
    }

    pub fn count(&self) -> Term {
        self.chain(TermType::Count)
    }

    /// Count elements equal to `value` or matching a predicate
    pub fn count_where<P: Into<Term>>(&self, predicate: P) -> Term {
        self.chain_func(TermType::Count, predicate)
    }

    pub fn sum<F: Into<Term>>(&self, field: F) -> Term {
        self.chain_func(TermType::Sum, field)
    }

    pub fn avg<F: Into<Term>>(&self, field: F) -> Term {
        self.chain_func(TermType::Avg, field)
    }

    pub fn min<F: Into<Term>>(&self, field: F) -> Term {
        self.chain_func(TermType::Min, field)
    }

    pub fn max<F: Into<Term>>(&self, field: F) -> Term {
        self.chain_func(TermType::Max, field)
    }

    pub fn group<F: Into<Term>>(&self, field: F) -> Term {
        self.chain_func(TermType::Group, field)
    }

    pub fn ungroup(&self) -> Term {
        self.chain(TermType::Ungroup)
    }

    /// Concatenate with other sequences, keeping argument order
    pub fn union<I, S>(&self, others: I) -> Term
    where
        I: IntoIterator<Item = S>,
        S: Into<Term>,
    {
        self.chain_many(TermType::Union, others)
    }

    pub fn inner_join<S: Into<Term>, P: Into<Term>>(&self, other: S, predicate: P) -> Term {
        self.chain1(TermType::InnerJoin, other)
            .with_arg(crate::reql::func::func_wrap(predicate.into()))
    }

    pub fn outer_join<S: Into<Term>, P: Into<Term>>(&self, other: S, predicate: P) -> Term {
        self.chain1(TermType::OuterJoin, other)
            .with_arg(crate::reql::func::func_wrap(predicate.into()))
    }

    pub fn eq_join<F: Into<Term>, T: Into<Term>>(&self, field: F, table: T) -> Term {
        self.chain_func(TermType::EqJoin, field)
            .with_arg(table.into())
    }

    pub fn zip(&self) -> Term {
        self.chain(TermType::Zip)
    }

    pub fn with_fields<I, F>(&self, fields: I) -> Term
    where
        I: IntoIterator<Item = F>,
        F: Into<Term>,
    {
        self.chain_many(TermType::WithFields, fields)
    }

    /// Rows between two keys of the primary or a secondary index
    pub fn between<L: Into<Term>, U: Into<Term>>(&self, lower: L, upper: U) -> Term {
        self.chain1(TermType::Between, lower).with_arg(upper.into())
    }

    /// Stream of changes to this table, selection or single row.
    pub fn changes(&self, options: ChangesOptions) -> Term {
        self.chain(TermType::Changes)
            .with_optargs(optargs_of(&options))
    }
}

#[cfg(test)]
mod tests {
    use crate::reql::{func, r, Datum, TermType};

    #[test]
    fn test_chain_shares_receiver() {
        let users = r::table("users");
        let a = users.filter(serde_json::json!({"age": 30}));
        let b = users.limit(10);

        assert!(a.first_arg().unwrap().shares_node(&users));
        assert!(b.first_arg().unwrap().shares_node(&users));
        assert_eq!(users.args().len(), 1);
    }

    #[test]
    fn test_union_preserves_order() {
        let t = r::table("a").union(vec![r::table("b"), r::table("c")]);
        let names: Vec<_> = t
            .args()
            .iter()
            .filter_map(|a| a.first_arg().and_then(|n| n.as_datum()).cloned())
            .collect();
        assert_eq!(names, vec![Datum::from("a"), Datum::from("b"), Datum::from("c")]);
    }

    #[test]
    fn test_map_wraps_closure() {
        let t = r::table("users").map(func(|row| row.get_field("name")));
        assert_eq!(t.term_type(), TermType::Map);
        assert_eq!(t.arg(1).unwrap().term_type(), TermType::Func);
    }

    #[test]
    fn test_changes_options() {
        let feed = r::table("events").changes(super::ChangesOptions {
            changefeed_queue_size: Some(10),
            include_initial: Some(true),
            ..Default::default()
        });
        assert_eq!(feed.term_type(), TermType::Changes);
        assert_eq!(feed.optargs().len(), 2);
        assert_eq!(
            feed.optarg("changefeed_queue_size")
                .and_then(|t| t.as_datum())
                .and_then(Datum::as_number),
            Some(10.0)
        );
    }
}
