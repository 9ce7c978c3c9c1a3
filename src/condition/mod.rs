//! Predicate evaluation over raw record bytes.
//!
//! A `DefaultConditionFilter` holds one `(left, op, right)` triple where each
//! side is either a column reference (offset/length into the record plus the
//! null-flag position) or a constant. `CompositeConditionFilter` is a
//! short-circuiting AND over a list of them.

use std::cmp::Ordering;

use crate::catalog::TableMeta;
use crate::record::{AttrType, Value};

/// Comparison operators understood by filters and index scanners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
}

impl CompOp {
    /// The operator with its sides swapped (`a < b` == `b > a`)
    pub fn flipped(self) -> CompOp {
        match self {
            CompOp::Lt => CompOp::Gt,
            CompOp::Le => CompOp::Ge,
            CompOp::Gt => CompOp::Lt,
            CompOp::Ge => CompOp::Le,
            other => other,
        }
    }

    fn matches(&self, ord: Ordering) -> bool {
        match self {
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Ne => ord != Ordering::Equal,
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Le => ord != Ordering::Greater,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Ge => ord != Ordering::Less,
            CompOp::IsNull | CompOp::IsNotNull => false,
        }
    }
}

/// One side of a condition: a column of the scanned record, or a constant
#[derive(Debug, Clone)]
pub enum CondSide {
    Attr {
        offset: usize,
        len: usize,
        attr_type: AttrType,
        null_flag_offset: usize,
    },
    Value(Value),
}

impl CondSide {
    /// Build an attribute side from table metadata. None when the field is
    /// unknown or a system field.
    pub fn attr(meta: &TableMeta, field_name: &str) -> Option<Self> {
        let user_idx = meta.user_field_index(field_name)?;
        let field = meta.field(field_name)?;
        Some(CondSide::Attr {
            offset: field.offset,
            len: field.len,
            attr_type: field.attr_type,
            null_flag_offset: meta.null_flag_offset(user_idx),
        })
    }

    fn extract(&self, record: &[u8]) -> Value {
        match self {
            CondSide::Attr {
                offset,
                len,
                attr_type,
                null_flag_offset,
            } => {
                let is_null = record.get(*null_flag_offset).copied().unwrap_or(0) != 0;
                match record.get(*offset..*offset + *len) {
                    Some(bytes) => Value::deserialize(bytes, attr_type, is_null)
                        .unwrap_or(Value::Null),
                    None => Value::Null,
                }
            }
            CondSide::Value(v) => v.clone(),
        }
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        match self {
            CondSide::Attr { attr_type, .. } => Some(*attr_type),
            CondSide::Value(Value::Int(_)) => Some(AttrType::Int),
            CondSide::Value(Value::Float(_)) => Some(AttrType::Float),
            CondSide::Value(Value::Date(_)) => Some(AttrType::Date),
            CondSide::Value(_) => None,
        }
    }
}

/// A single binary predicate evaluated against raw record bytes
#[derive(Debug, Clone)]
pub struct DefaultConditionFilter {
    left: CondSide,
    op: CompOp,
    right: CondSide,
}

impl DefaultConditionFilter {
    pub fn new(left: CondSide, op: CompOp, right: CondSide) -> Self {
        Self { left, op, right }
    }

    pub fn left(&self) -> &CondSide {
        &self.left
    }

    pub fn op(&self) -> CompOp {
        self.op
    }

    pub fn right(&self) -> &CondSide {
        &self.right
    }

    /// Evaluate against a record. Any NULL operand makes the comparison
    /// unknown, which excludes the row; IS [NOT] NULL tests the flag itself.
    pub fn filter(&self, record: &[u8]) -> bool {
        let left = self.left.extract(record);

        match self.op {
            CompOp::IsNull => return left.is_null(),
            CompOp::IsNotNull => return !left.is_null(),
            _ => {}
        }

        let right = self.right.extract(record);
        match left.compare(&right) {
            Some(ord) => self.op.matches(ord),
            // NULL on either side, or incomparable types
            None => false,
        }
    }
}

/// Conjunction of simple filters; short-circuits on the first failure
#[derive(Debug, Clone, Default)]
pub struct CompositeConditionFilter {
    filters: Vec<DefaultConditionFilter>,
}

impl CompositeConditionFilter {
    pub fn new(filters: Vec<DefaultConditionFilter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[DefaultConditionFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filter(&self, record: &[u8]) -> bool {
        self.filters.iter().all(|f| f.filter(record))
    }
}

/// The two filter shapes the scan layer accepts
#[derive(Debug, Clone)]
pub enum ConditionFilter {
    Default(DefaultConditionFilter),
    Composite(CompositeConditionFilter),
}

impl ConditionFilter {
    pub fn filter(&self, record: &[u8]) -> bool {
        match self {
            ConditionFilter::Default(f) => f.filter(record),
            ConditionFilter::Composite(f) => f.filter(record),
        }
    }

    /// Iterate the simple predicates regardless of shape
    pub fn simple_filters(&self) -> &[DefaultConditionFilter] {
        match self {
            ConditionFilter::Default(f) => std::slice::from_ref(f),
            ConditionFilter::Composite(f) => f.filters(),
        }
    }
}
