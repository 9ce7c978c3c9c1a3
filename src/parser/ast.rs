//! AST consumed by the executor and the table layer.

use crate::condition::CompOp;
use crate::record::{AttrType, Value, parse_date};

/// A constant from the SQL text, already classified by type.
///
/// String literals matching the `YYYY-M-D` shape with a valid calendar date
/// become `Date`; a date-shaped string that fails calendar validation stays
/// `Chars` (and will then fail the type check against a DATE column).
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Chars(String),
    Date(i32),
    Null,
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Chars(s) => Value::Chars(s.clone()),
            Literal::Date(d) => Value::Date(*d),
            Literal::Null => Value::Null,
        }
    }
}

/// Classify a quoted string literal (date shape detection included)
pub fn classify_string(s: &str) -> Literal {
    if date_shape().is_match(s) {
        if let Some(packed) = parse_date(s) {
            return Literal::Date(packed);
        }
    }
    Literal::Chars(s.to_string())
}

fn date_shape() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").expect("valid regex"))
}

/// Case-insensitive NULL literal, as accepted in VALUES lists and data files
pub fn is_null_literal(s: &str) -> bool {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[Nn][Uu][Ll][Ll]$").expect("valid regex"))
        .is_match(s)
}

/// Possibly-qualified column reference (`col` or `table.col`)
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn bare(column: &str) -> Self {
        Self {
            table: None,
            column: column.to_string(),
        }
    }
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Literal),
    Column(ColumnRef),
}

/// A WHERE conjunct
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Operand, CompOp, Operand),
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    In(ColumnRef, Vec<Literal>),
}

impl Condition {
    /// Column references appearing in this condition
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        match self {
            Condition::Compare(left, _, right) => {
                let mut refs = Vec::new();
                if let Operand::Column(c) = left {
                    refs.push(c);
                }
                if let Operand::Column(c) = right {
                    refs.push(c);
                }
                refs
            }
            Condition::IsNull(c) | Condition::IsNotNull(c) | Condition::In(c, _) => vec![c],
        }
    }
}

/// Column declaration in CREATE TABLE
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub attr_type: AttrType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Column(ColumnRef),
    Count(ColumnRef),
    CountAll,
    Average(ColumnRef),
    Max(ColumnRef),
    Min(ColumnRef),
    Sum(ColumnRef),
}

impl Selector {
    /// The column this selector aggregates or projects, if any
    pub fn column(&self) -> Option<&ColumnRef> {
        match self {
            Selector::Column(c)
            | Selector::Count(c)
            | Selector::Average(c)
            | Selector::Max(c)
            | Selector::Min(c)
            | Selector::Sum(c) => Some(c),
            Selector::CountAll => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        !matches!(self, Selector::Column(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selectors {
    All,
    List(Vec<Selector>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub selectors: Selectors,
    pub table: String,
    pub conditions: Vec<Condition>,
    pub group_by: Option<ColumnRef>,
    /// (column, ascending)
    pub order_by: Option<(ColumnRef, bool)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(String, Vec<ColumnDef>),
    DropTable(String),
    ShowTables,
    Desc(String),
    CreateIndex {
        index: String,
        table: String,
        column: String,
    },
    DropIndex {
        index: String,
        table: String,
    },
    Insert(String, Vec<Vec<Literal>>),
    Select(SelectStmt),
    Update {
        table: String,
        column: String,
        value: Literal,
        conditions: Vec<Condition>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
    Begin,
    Commit,
    Rollback,
    Sync,
    LoadData {
        path: String,
        table: String,
        delimiter: u8,
    },
    Help,
    Exit,
}
