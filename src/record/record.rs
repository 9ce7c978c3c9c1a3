use crate::file::PageId;

/// Slot identifier within a page
pub type SlotId = usize;

/// Physical identifier for a record (page + slot). Stable for as long as
/// the record is not physically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.page_id, self.slot_id)
    }
}

/// A raw record: its address plus the serialized bytes
/// (system header, field payloads, null flags).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub rid: RecordId,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(rid: RecordId, data: Vec<u8>) -> Self {
        Self { rid, data }
    }
}
