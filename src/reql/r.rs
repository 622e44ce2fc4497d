//! Entry points that start a fresh term tree.
//!
//! ```rust
//! use reql_client::reql::{func, r};
//!
//! let query = r::db("blog")
//!     .table("posts")
//!     .filter(func(|post| post.get_field("views").gt(100)))
//!     .order_by(vec![r::desc("views")])
//!     .limit(10);
//! ```

use super::ast::{Args, Term};
use super::datum::Datum;
use super::func::func_wrap;
use super::terms::TermType;

fn op(term_type: TermType) -> Term {
    Term::new(term_type)
}

fn op1<A: Into<Term>>(term_type: TermType, arg: A) -> Term {
    Term::new(term_type).with_arg(arg.into())
}

fn op_many<I, A>(term_type: TermType, args: I) -> Term
where
    I: IntoIterator<Item = A>,
    A: Into<Term>,
{
    Term::new(term_type).with_args(args.into_iter().map(Into::into).collect())
}

/// Literal value, array or object
pub fn expr<T: Into<Term>>(value: T) -> Term {
    value.into()
}

/// Object literal from key/value pairs. Values may be arbitrary terms.
pub fn object<I, K, V>(fields: I) -> Term
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Term>,
{
    Term::object(
        fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// The row a single-parameter function is applied to
pub fn row() -> Term {
    op(TermType::ImplicitVar)
}

pub fn db<S: Into<Term>>(name: S) -> Term {
    op1(TermType::Db, name)
}

/// Table in the connection's default database
pub fn table<S: Into<Term>>(name: S) -> Term {
    op1(TermType::Table, name)
}

pub fn db_create<S: Into<Term>>(name: S) -> Term {
    op1(TermType::DbCreate, name)
}

pub fn db_drop<S: Into<Term>>(name: S) -> Term {
    op1(TermType::DbDrop, name)
}

pub fn db_list() -> Term {
    op(TermType::DbList)
}

pub fn table_create<S: Into<Term>>(name: S) -> Term {
    op1(TermType::TableCreate, name)
}

pub fn table_drop<S: Into<Term>>(name: S) -> Term {
    op1(TermType::TableDrop, name)
}

pub fn table_list() -> Term {
    op(TermType::TableList)
}

pub fn branch<C, T, E>(condition: C, then: T, otherwise: E) -> Term
where
    C: Into<Term>,
    T: Into<Term>,
    E: Into<Term>,
{
    op1(TermType::Branch, condition)
        .with_arg(then.into())
        .with_arg(otherwise.into())
}

/// Call `f` with `args`
pub fn do_<I, A, F>(args: I, f: F) -> Term
where
    I: IntoIterator<Item = A>,
    A: Into<Term>,
    F: Into<Term>,
{
    op1(TermType::Funcall, func_wrap(f.into()))
        .with_args(args.into_iter().map(Into::into).collect())
}

/// Abort the query with a user error
pub fn error<S: Into<Term>>(message: S) -> Term {
    op1(TermType::Error, message)
}

pub fn now() -> Term {
    op(TermType::Now)
}

/// Date at midnight in `timezone`
pub fn time<Y, M, D, Z>(year: Y, month: M, day: D, timezone: Z) -> Term
where
    Y: Into<Term>,
    M: Into<Term>,
    D: Into<Term>,
    Z: Into<Term>,
{
    op1(TermType::Time, year)
        .with_arg(month.into())
        .with_arg(day.into())
        .with_arg(timezone.into())
}

pub fn epoch_time<T: Into<Term>>(seconds: T) -> Term {
    op1(TermType::EpochTime, seconds)
}

pub fn iso8601<S: Into<Term>>(text: S) -> Term {
    op1(TermType::Iso8601, text)
}

/// Binary literal. Encoded client side as a BINARY pseudo-type.
pub fn binary<B: Into<Vec<u8>>>(bytes: B) -> Term {
    Term::datum(Datum::binary(bytes))
}

pub fn point<X: Into<Term>, Y: Into<Term>>(longitude: X, latitude: Y) -> Term {
    op1(TermType::Point, longitude).with_arg(latitude.into())
}

pub fn line<I, P>(points: I) -> Term
where
    I: IntoIterator<Item = P>,
    P: Into<Term>,
{
    op_many(TermType::Line, points)
}

pub fn polygon<I, P>(points: I) -> Term
where
    I: IntoIterator<Item = P>,
    P: Into<Term>,
{
    op_many(TermType::Polygon, points)
}

pub fn circle<C: Into<Term>, R: Into<Term>>(center: C, radius: R) -> Term {
    op1(TermType::Circle, center).with_arg(radius.into())
}

pub fn geojson<G: Into<Term>>(geometry: G) -> Term {
    op1(TermType::Geojson, geometry)
}

pub fn uuid() -> Term {
    op(TermType::Uuid)
}

/// Deterministic UUID derived from `name`
pub fn uuid_from<S: Into<Term>>(name: S) -> Term {
    op1(TermType::Uuid, name)
}

/// Integers in `[start, end)`
pub fn range<S: Into<Term>, E: Into<Term>>(start: S, end: E) -> Term {
    op1(TermType::Range, start).with_arg(end.into())
}

/// Infinite stream 0, 1, 2, ...
pub fn range_unbounded() -> Term {
    op(TermType::Range)
}

pub fn random<L: Into<Term>, U: Into<Term>>(lower: L, upper: U) -> Term {
    op1(TermType::Random, lower).with_arg(upper.into())
}

pub fn asc<F: Into<Term>>(field: F) -> Term {
    op1(TermType::Asc, func_wrap(field.into()))
}

pub fn desc<F: Into<Term>>(field: F) -> Term {
    op1(TermType::Desc, func_wrap(field.into()))
}

/// Splice an array into an argument list
pub fn args<A: Into<Term>>(array: A) -> Term {
    op1(TermType::Args, array)
}

/// Replace a nested object in `update` instead of merging into it
pub fn literal<V: Into<Term>>(value: V) -> Term {
    op1(TermType::Literal, value)
}

/// OBJECT term from alternating keys and values
pub fn object_from<I, A>(pairs: I) -> Term
where
    I: IntoIterator<Item = A>,
    A: Into<Term>,
{
    op_many(TermType::Object, pairs)
}

pub fn json<S: Into<Term>>(text: S) -> Term {
    op1(TermType::Json, text)
}

pub fn js<S: Into<Term>>(source: S) -> Term {
    op1(TermType::Javascript, source)
}

pub fn http<S: Into<Term>>(url: S) -> Term {
    op1(TermType::Http, url)
}

pub fn union<I, S>(sequences: I) -> Term
where
    I: IntoIterator<Item = S>,
    S: Into<Term>,
{
    op_many(TermType::Union, sequences)
}

pub fn and<I, B>(values: I) -> Term
where
    I: IntoIterator<Item = B>,
    B: Into<Term>,
{
    op_many(TermType::And, values)
}

pub fn or<I, B>(values: I) -> Term
where
    I: IntoIterator<Item = B>,
    B: Into<Term>,
{
    op_many(TermType::Or, values)
}

pub fn not<B: Into<Term>>(value: B) -> Term {
    op1(TermType::Not, value)
}

pub fn minval() -> Term {
    op(TermType::Minval)
}

pub fn maxval() -> Term {
    op(TermType::Maxval)
}

/// Wait for every table in the default database to be ready
pub fn wait() -> Term {
    op(TermType::Wait)
}

/// Build any opcode from an explicit argument list
pub fn call(term_type: TermType, args: Args) -> Term {
    Term::call(term_type, None, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::OptArgs;

    #[test]
    fn test_table_in_db() {
        let t = db("test").table("users");
        assert_eq!(t.term_type(), TermType::Table);
        assert_eq!(t.first_arg().unwrap().term_type(), TermType::Db);
    }

    #[test]
    fn test_variadic_order() {
        let t = and(vec![true, false, true]);
        let values: Vec<_> = t
            .args()
            .iter()
            .filter_map(|a| a.as_datum().and_then(Datum::as_bool))
            .collect();
        assert_eq!(values, vec![true, false, true]);
    }

    #[test]
    fn test_desc_wraps_row() {
        let t = desc(row().get_field("score"));
        assert_eq!(t.first_arg().unwrap().term_type(), TermType::Func);
        let plain = desc("score");
        assert!(plain.first_arg().unwrap().is_datum());
    }

    #[test]
    fn test_binary_literal() {
        let t = binary(vec![1u8, 2, 3]);
        assert_eq!(t.as_datum().and_then(Datum::as_binary), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_call_with_options() {
        let t = call(
            TermType::TableCreate,
            Args::new()
                .value("users")
                .options(OptArgs::new().set("primary_key", "email")),
        );
        assert_eq!(t.args().len(), 1);
        assert!(t.optarg("primary_key").is_some());
    }
}
