//! Scalar and document operations.

use crate::reql::ast::Term;
use crate::reql::func::func_wrap;
use crate::reql::terms::TermType;

macro_rules! binary_ops {
    ($($(#[$meta:meta])* $name:ident => $term_type:ident,)*) => {
        impl Term {
            $(
                $(#[$meta])*
                pub fn $name<T: Into<Term>>(&self, other: T) -> Term {
                    self.chain1(TermType::$term_type, other)
                }
            )*
        }
    };
}

macro_rules! unary_ops {
    ($($name:ident => $term_type:ident,)*) => {
        impl Term {
            $(
                pub fn $name(&self) -> Term {
                    self.chain(TermType::$term_type)
                }
            )*
        }
    };
}

binary_ops! {
    eq => Eq,
    ne => Ne,
    lt => Lt,
    le => Le,
    gt => Gt,
    ge => Ge,
    and => And,
    or => Or,
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    /// Remainder
    rem => Mod,
    append => Append,
    prepend => Prepend,
    difference => Difference,
    set_insert => SetInsert,
    set_union => SetUnion,
    set_intersection => SetIntersection,
    set_difference => SetDifference,
    delete_at => DeleteAt,
    /// Object field by name
    get_field => GetField,
    /// Field of an object or element of an array
    bracket => Bracket,
    /// Regular expression match
    match_regex => Match,
    split_on => Split,
    coerce_to => CoerceTo,
    /// Value to use when this one is null or missing
    default => Default,
}

unary_ops! {
    not => Not,
    floor => Floor,
    ceil => Ceil,
    round => Round,
    keys => Keys,
    values => Values,
    upcase => Upcase,
    downcase => Downcase,
    split => Split,
    type_of => TypeOf,
    info => Info,
    to_json_string => ToJsonString,
}

impl Term {
    pub fn insert_at<I: Into<Term>, V: Into<Term>>(&self, index: I, value: V) -> Term {
        self.chain1(TermType::InsertAt, index).with_arg(value.into())
    }

    pub fn change_at<I: Into<Term>, V: Into<Term>>(&self, index: I, value: V) -> Term {
        self.chain1(TermType::ChangeAt, index).with_arg(value.into())
    }

    pub fn splice_at<I: Into<Term>, V: Into<Term>>(&self, index: I, values: V) -> Term {
        self.chain1(TermType::SpliceAt, index)
            .with_arg(values.into())
    }

    /// Merge objects or the results of closures into this one
    pub fn merge<I, O>(&self, others: I) -> Term
    where
        I: IntoIterator<Item = O>,
        O: Into<Term>,
    {
        let others = others.into_iter().map(|o| func_wrap(o.into())).collect();
        self.chain(TermType::Merge).with_args(others)
    }

    pub fn pluck<I, F>(&self, fields: I) -> Term
    where
        I: IntoIterator<Item = F>,
        F: Into<Term>,
    {
        self.chain_many(TermType::Pluck, fields)
    }

    pub fn without<I, F>(&self, fields: I) -> Term
    where
        I: IntoIterator<Item = F>,
        F: Into<Term>,
    {
        self.chain_many(TermType::Without, fields)
    }

    pub fn has_fields<I, F>(&self, fields: I) -> Term
    where
        I: IntoIterator<Item = F>,
        F: Into<Term>,
    {
        self.chain_many(TermType::HasFields, fields)
    }

    pub fn contains<I, V>(&self, values: I) -> Term
    where
        I: IntoIterator<Item = V>,
        V: Into<Term>,
    {
        let values = values.into_iter().map(|v| func_wrap(v.into())).collect();
        self.chain(TermType::Contains).with_args(values)
    }

    /// Call `f` with this value as its argument
    pub fn do_<F: Into<Term>>(&self, f: F) -> Term {
        Term::new(TermType::Funcall)
            .with_arg(func_wrap(f.into()))
            .with_arg(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::reql::{func, r, TermType};

    #[test]
    fn test_comparison_chain() {
        let t = r::row().get_field("age").gt(18);
        assert_eq!(t.term_type(), TermType::Gt);
        assert_eq!(t.first_arg().unwrap().term_type(), TermType::GetField);
    }

    #[test]
    fn test_do_puts_function_first() {
        let t = r::expr(5).do_(func(|x| x.mul(2)));
        assert_eq!(t.term_type(), TermType::Funcall);
        assert_eq!(t.first_arg().unwrap().term_type(), TermType::Func);
        assert!(t.arg(1).unwrap().is_datum());
    }

    #[test]
    fn test_merge_wraps_row() {
        let t = r::table("t").merge(vec![r::object(vec![("n", r::row().get_field("a"))])]);
        assert_eq!(t.arg(1).unwrap().term_type(), TermType::Func);
    }
}
