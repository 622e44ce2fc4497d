//! Time accessors and conversions.

use crate::reql::ast::Term;
use crate::reql::terms::TermType;

macro_rules! accessors {
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

accessors! {
    timezone => Timezone,
    date => Date,
    time_of_day => TimeOfDay,
    year => Year,
    month => Month,
    day => Day,
    day_of_week => DayOfWeek,
    day_of_year => DayOfYear,
    hours => Hours,
    minutes => Minutes,
    seconds => Seconds,
    to_iso8601 => ToIso8601,
    to_epoch_time => ToEpochTime,
}

impl Term {
    /// Same instant in another timezone, e.g. `"-07:00"`
    pub fn in_timezone<S: Into<Term>>(&self, tz: S) -> Term {
        self.chain1(TermType::InTimezone, tz)
    }

    /// Whether this time falls in `[start, end)`
    pub fn during<S: Into<Term>, E: Into<Term>>(&self, start: S, end: E) -> Term {
        self.chain1(TermType::During, start).with_arg(end.into())
    }
}
