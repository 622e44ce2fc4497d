//! ReQL Term Types.
//!
//! This module defines the ReQL operation codes as an enum. The discriminant
//! values are the wire opcodes, so `TermType as u64` is exactly what goes into
//! the first slot of a serialized term.
//!
//! Besides the opcode itself the table carries two pieces of metadata the
//! protocol compiler validates against:
//!
//! - **Arity**: the minimum and (optional) maximum number of positional args
//! - **Option keys**: the named arguments an opcode accepts
//!
//! # Example
//!
//! ```rust
//! use reql_client::reql::TermType;
//!
//! let term_type = TermType::from_u64(38).unwrap();
//! assert_eq!(term_type, TermType::Map);
//! assert_eq!(term_type.name(), "MAP");
//! ```

use serde::{Deserialize, Serialize};

macro_rules! term_types {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u64)]
        pub enum TermType {
            $($variant = $code,)*
        }

        impl TermType {
            /// Converts from a wire opcode. Returns `None` for unknown opcodes.
            pub fn from_u64(value: u64) -> Option<Self> {
                match value {
                    $($code => Some(TermType::$variant),)*
                    _ => None,
                }
            }

            /// Returns the uppercase opcode name (e.g. "FILTER", "MAP").
            pub fn name(&self) -> &'static str {
                match self {
                    $(TermType::$variant => $name,)*
                }
            }
        }
    };
}

term_types! {
    // Core data types
    Datum = 1 => "DATUM",
    MakeArray = 2 => "MAKE_ARRAY",
    MakeObj = 3 => "MAKE_OBJ",

    // Variables and evaluation
    Var = 10 => "VAR",
    Javascript = 11 => "JAVASCRIPT",
    Error = 12 => "ERROR",
    ImplicitVar = 13 => "IMPLICIT_VAR",
    Uuid = 169 => "UUID",
    Http = 153 => "HTTP",

    // Database operations
    Db = 14 => "DB",
    Table = 15 => "TABLE",
    Get = 16 => "GET",
    GetAll = 78 => "GET_ALL",

    // Comparison operators
    Eq = 17 => "EQ",
    Ne = 18 => "NE",
    Lt = 19 => "LT",
    Le = 20 => "LE",
    Gt = 21 => "GT",
    Ge = 22 => "GE",

    // Logic operators
    Not = 23 => "NOT",
    Branch = 65 => "BRANCH",
    Or = 66 => "OR",
    And = 67 => "AND",

    // Math operators
    Add = 24 => "ADD",
    Sub = 25 => "SUB",
    Mul = 26 => "MUL",
    Div = 27 => "DIV",
    Mod = 28 => "MOD",
    Floor = 183 => "FLOOR",
    Ceil = 184 => "CEIL",
    Round = 185 => "ROUND",
    Random = 151 => "RANDOM",

    // Array/Set operations
    Append = 29 => "APPEND",
    Prepend = 80 => "PREPEND",
    Difference = 95 => "DIFFERENCE",
    SetInsert = 88 => "SET_INSERT",
    SetIntersection = 89 => "SET_INTERSECTION",
    SetUnion = 90 => "SET_UNION",
    SetDifference = 91 => "SET_DIFFERENCE",
    InsertAt = 82 => "INSERT_AT",
    DeleteAt = 83 => "DELETE_AT",
    ChangeAt = 84 => "CHANGE_AT",
    SpliceAt = 85 => "SPLICE_AT",

    // Sequence operations
    Slice = 30 => "SLICE",
    Skip = 70 => "SKIP",
    Limit = 71 => "LIMIT",
    OffsetsOf = 87 => "OFFSETS_OF",
    Contains = 93 => "CONTAINS",
    Nth = 45 => "NTH",
    Bracket = 170 => "BRACKET",
    Union = 44 => "UNION",
    IsEmpty = 86 => "IS_EMPTY",
    Sample = 81 => "SAMPLE",
    Range = 173 => "RANGE",

    // Object operations
    GetField = 31 => "GET_FIELD",
    Keys = 94 => "KEYS",
    Values = 186 => "VALUES",
    Object = 143 => "OBJECT",
    HasFields = 32 => "HAS_FIELDS",
    WithFields = 96 => "WITH_FIELDS",
    Pluck = 33 => "PLUCK",
    Without = 34 => "WITHOUT",
    Merge = 35 => "MERGE",
    Literal = 137 => "LITERAL",

    // Data access
    Between = 182 => "BETWEEN",

    // Transformations
    Reduce = 37 => "REDUCE",
    Map = 38 => "MAP",
    Fold = 187 => "FOLD",
    Filter = 39 => "FILTER",
    ConcatMap = 40 => "CONCAT_MAP",
    OrderBy = 41 => "ORDER_BY",
    Distinct = 42 => "DISTINCT",
    Count = 43 => "COUNT",
    InnerJoin = 48 => "INNER_JOIN",
    OuterJoin = 49 => "OUTER_JOIN",
    EqJoin = 50 => "EQ_JOIN",
    Zip = 72 => "ZIP",
    Asc = 73 => "ASC",
    Desc = 74 => "DESC",

    // Aggregations
    Group = 144 => "GROUP",
    Sum = 145 => "SUM",
    Avg = 146 => "AVG",
    Min = 147 => "MIN",
    Max = 148 => "MAX",
    Ungroup = 150 => "UNGROUP",

    // Type operations
    CoerceTo = 51 => "COERCE_TO",
    TypeOf = 52 => "TYPE_OF",
    Info = 79 => "INFO",
    Default = 92 => "DEFAULT",
    Json = 98 => "JSON",
    ToJsonString = 172 => "TO_JSON_STRING",
    Args = 154 => "ARGS",
    Binary = 155 => "BINARY",
    Minval = 180 => "MINVAL",
    Maxval = 181 => "MAXVAL",

    // Strings
    Match = 97 => "MATCH",
    Upcase = 141 => "UPCASE",
    Downcase = 142 => "DOWNCASE",
    Split = 149 => "SPLIT",

    // Write operations
    Update = 53 => "UPDATE",
    Delete = 54 => "DELETE",
    Replace = 55 => "REPLACE",
    Insert = 56 => "INSERT",

    // Database admin
    DbCreate = 57 => "DB_CREATE",
    DbDrop = 58 => "DB_DROP",
    DbList = 59 => "DB_LIST",

    // Table admin
    TableCreate = 60 => "TABLE_CREATE",
    TableDrop = 61 => "TABLE_DROP",
    TableList = 62 => "TABLE_LIST",
    Config = 174 => "CONFIG",
    Status = 175 => "STATUS",
    Reconfigure = 176 => "RECONFIGURE",
    Wait = 177 => "WAIT",
    Rebalance = 179 => "REBALANCE",
    Sync = 138 => "SYNC",
    Grant = 188 => "GRANT",

    // Secondary indexes
    IndexCreate = 75 => "INDEX_CREATE",
    IndexDrop = 76 => "INDEX_DROP",
    IndexList = 77 => "INDEX_LIST",
    IndexStatus = 139 => "INDEX_STATUS",
    IndexWait = 140 => "INDEX_WAIT",
    IndexRename = 156 => "INDEX_RENAME",

    // Control flow
    Funcall = 64 => "FUNCALL",
    ForEach = 68 => "FOR_EACH",
    Func = 69 => "FUNC",

    // Change feeds
    Changes = 152 => "CHANGES",

    // Time
    Iso8601 = 99 => "ISO8601",
    ToIso8601 = 100 => "TO_ISO8601",
    EpochTime = 101 => "EPOCH_TIME",
    ToEpochTime = 102 => "TO_EPOCH_TIME",
    Now = 103 => "NOW",
    InTimezone = 104 => "IN_TIMEZONE",
    During = 105 => "DURING",
    Date = 106 => "DATE",
    TimeOfDay = 126 => "TIME_OF_DAY",
    Timezone = 127 => "TIMEZONE",
    Year = 128 => "YEAR",
    Month = 129 => "MONTH",
    Day = 130 => "DAY",
    DayOfWeek = 131 => "DAY_OF_WEEK",
    DayOfYear = 132 => "DAY_OF_YEAR",
    Hours = 133 => "HOURS",
    Minutes = 134 => "MINUTES",
    Seconds = 135 => "SECONDS",
    Time = 136 => "TIME",

    // Geospatial
    Geojson = 157 => "GEOJSON",
    ToGeojson = 158 => "TO_GEOJSON",
    Point = 159 => "POINT",
    Line = 160 => "LINE",
    Polygon = 161 => "POLYGON",
    Distance = 162 => "DISTANCE",
    Intersects = 163 => "INTERSECTS",
    Includes = 164 => "INCLUDES",
    Circle = 165 => "CIRCLE",
    GetIntersecting = 166 => "GET_INTERSECTING",
    Fill = 167 => "FILL",
    GetNearest = 168 => "GET_NEAREST",
    PolygonSub = 171 => "POLYGON_SUB",
}

const WRITE_OPTIONS: &[&str] = &["durability", "return_changes", "ignore_write_hook"];
const UPDATE_OPTIONS: &[&str] = &[
    "durability",
    "return_changes",
    "non_atomic",
    "ignore_write_hook",
];
const GEO_OPTIONS: &[&str] = &["geo_system", "unit"];

impl TermType {
    /// Converts to the wire opcode.
    ///
    /// ```rust
    /// use reql_client::reql::TermType;
    /// assert_eq!(TermType::Filter.to_u64(), 39);
    /// ```
    pub fn to_u64(self) -> u64 {
        self as u64
    }

    /// Positional argument bounds as `(min, max)`; `max == None` means variadic.
    ///
    /// Counts the receiver: `r.table("t").limit(5)` is a LIMIT with two args.
    pub fn arity(self) -> (usize, Option<usize>) {
        use TermType::*;
        match self {
            Datum | MakeObj | ImplicitVar | DbList | Now | Minval | Maxval => (0, Some(0)),
            MakeArray | Union | Or | And | Object => (0, None),
            Uuid | Error | Literal | TableList | Wait | Reconfigure | Rebalance => (0, Some(1)),
            Range | Random => (0, Some(2)),
            Var | Javascript | Http | Db | Not | Floor | Ceil | Round | Keys | Values
            | Distinct | IsEmpty | Zip | TypeOf | Delete | DbCreate | DbDrop | Config
            | Status | Sync | IndexList | Asc | Desc | Info | Upcase | Downcase | Json
            | ToJsonString | Iso8601 | ToIso8601 | EpochTime | ToEpochTime | Date
            | TimeOfDay | Timezone | Year | Month | Day | DayOfWeek | DayOfYear | Hours
            | Minutes | Seconds | Ungroup | Changes | Args | Binary | Geojson | ToGeojson
            | Fill => (1, Some(1)),
            Table | TableCreate | TableDrop | Count | Sum | Avg | Min | Max => (1, Some(2)),
            Split => (1, Some(3)),
            HasFields | WithFields | Pluck | Without | Merge | OrderBy | Group
            | IndexStatus | IndexWait | Funcall => (1, None),
            Get | Mod | Append | Prepend | Difference | SetInsert | SetIntersection
            | SetUnion | SetDifference | Skip | Limit | OffsetsOf | Nth | Bracket
            | GetField | Reduce | Filter | ConcatMap | CoerceTo | Update | Replace
            | Insert | IndexDrop | ForEach | Func | Match | Sample | Default | InTimezone
            | Point | Distance | Intersects | Includes | Circle | GetIntersecting
            | GetNearest | PolygonSub => (2, Some(2)),
            Slice | DeleteAt | IndexCreate | Grant => (2, Some(3)),
            GetAll | Eq | Ne | Lt | Le | Gt | Ge | Add | Sub | Mul | Div | Contains | Map
            | Line => (2, None),
            Between | Fold | InnerJoin | OuterJoin | EqJoin | InsertAt | ChangeAt
            | SpliceAt | IndexRename | During => (3, Some(3)),
            Branch | Polygon => (3, None),
            Time => (4, Some(7)),
        }
    }

    /// Named arguments accepted by this opcode.
    pub fn option_keys(self) -> &'static [&'static str] {
        use TermType::*;
        match self {
            Table => &["read_mode", "identifier_format", "use_outdated"],
            GetAll | GetIntersecting | OrderBy | Distinct | Min | Max => &["index"],
            Between => &["index", "left_bound", "right_bound"],
            Slice | During => &["left_bound", "right_bound"],
            EqJoin => &["index", "ordered"],
            Filter => &["default"],
            Insert => &[
                "durability",
                "return_changes",
                "conflict",
                "ignore_write_hook",
            ],
            Update | Replace => UPDATE_OPTIONS,
            Delete => WRITE_OPTIONS,
            TableCreate => &[
                "primary_key",
                "shards",
                "replicas",
                "primary_replica_tag",
                "nonvoting_replica_tags",
                "durability",
            ],
            IndexCreate => &["multi", "geo"],
            IndexRename => &["overwrite"],
            Changes => &[
                "squash",
                "changefeed_queue_size",
                "include_initial",
                "include_states",
                "include_offsets",
                "include_types",
            ],
            Group => &["index", "multi"],
            Random => &["float"],
            Circle => &["num_vertices", "geo_system", "unit", "fill"],
            Distance => GEO_OPTIONS,
            GetNearest => &["index", "max_results", "max_dist", "unit", "geo_system"],
            Iso8601 => &["default_timezone"],
            Wait => &["wait_for", "timeout"],
            Reconfigure => &[
                "shards",
                "replicas",
                "primary_replica_tag",
                "dry_run",
                "nonvoting_replica_tags",
                "emergency_repair",
            ],
            Javascript => &["timeout"],
            Http => &[
                "timeout",
                "attempts",
                "redirects",
                "verify",
                "result_format",
                "method",
                "auth",
                "params",
                "header",
                "data",
                "page",
                "page_limit",
            ],
            Union => &["interleave"],
            Fold => &["emit", "final_emit"],
            _ => &[],
        }
    }

    /// Whether `key` is a named argument this opcode understands.
    ///
    /// MAKE_OBJ stores its fields as named arguments, so any key is valid there.
    pub fn accepts_option(self, key: &str) -> bool {
        self == TermType::MakeObj || self.option_keys().contains(&key)
    }
}

impl std::fmt::Display for TermType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
