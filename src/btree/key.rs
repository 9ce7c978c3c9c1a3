use std::cmp::Ordering;

use crate::record::{AttrType, RecordId, Value};

/// Typed index key: the raw payload bytes of one column plus a null flag.
///
/// Ordering is by the column's type (not raw memcmp): INT and DATE as
/// little-endian i32, FLOAT by `total_cmp` (a valid total order; the
/// epsilon rule of predicate evaluation cannot order a tree), CHARS in
/// C-string byte order. NULL keys sort after every non-NULL key so they
/// stay outside the value domain that scanners walk.
#[derive(Debug, Clone)]
pub struct IndexKey {
    attr_type: AttrType,
    data: Vec<u8>,
    null: bool,
}

impl IndexKey {
    /// Build a key from payload bytes. `data` must be exactly
    /// `attr_type.len()` bytes; it is padded or truncated otherwise.
    pub fn new(attr_type: AttrType, mut data: Vec<u8>, null: bool) -> Self {
        data.resize(attr_type.len(), 0);
        Self {
            attr_type,
            data,
            null,
        }
    }

    /// Build a key from a typed value
    pub fn from_value(value: &Value, attr_type: AttrType) -> Self {
        let null = value.is_null();
        let data = value
            .serialize(&attr_type)
            .unwrap_or_else(|_| vec![0; attr_type.len()]);
        Self::new(attr_type, data, null)
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    fn compare_data(&self, other: &Self) -> Ordering {
        match self.attr_type {
            AttrType::Int | AttrType::Date => {
                let a = i32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]);
                let b = i32::from_le_bytes([
                    other.data[0],
                    other.data[1],
                    other.data[2],
                    other.data[3],
                ]);
                a.cmp(&b)
            }
            AttrType::Float => {
                let a = f32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]);
                let b = f32::from_le_bytes([
                    other.data[0],
                    other.data[1],
                    other.data[2],
                    other.data[3],
                ]);
                a.total_cmp(&b)
            }
            AttrType::Chars(_) => {
                // C-string order: compare up to the first NUL
                let a = c_str(&self.data);
                let b = c_str(&other.data);
                a.cmp(b)
            }
        }
    }
}

fn c_str(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.null, other.null) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.compare_data(other),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

/// Composite ordering key: the column key with the RID as tie-break.
/// Duplicate column keys are ordered by RID, so routing through internal
/// nodes lands on the exact leaf even when a run of equal keys spans
/// several leaves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryKey {
    pub key: IndexKey,
    pub rid: RecordId,
}

impl EntryKey {
    pub fn new(key: IndexKey, rid: RecordId) -> Self {
        Self { key, rid }
    }

    /// The smallest entry a given column key can form; used to position
    /// scans at the start of a duplicate run
    pub fn lowest(key: IndexKey) -> Self {
        Self {
            key,
            rid: RecordId::new(0, 0),
        }
    }
}
