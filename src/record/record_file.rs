use std::sync::{Arc, Mutex};

use super::error::{RecordError, RecordResult};
use super::page::RecordPage;
use super::record::{Record, RecordId};
use crate::file::{BufferManager, FileHandle, PageId};

/// Heap of fixed-width record pages backing one table.
///
/// The heap is a dense run of record pages addressed by page number; a
/// record's RID is its (page, slot). The handler deals only in opaque
/// payloads of `record_size` bytes and knows nothing about columns or
/// nullability.
pub struct RecordFileHandler {
    file_handle: FileHandle,
    record_size: usize,
    page_count: usize,
    // Starting point for the free-slot search, so sequential inserts do
    // not rescan the whole heap
    last_insert_page_id: PageId,
}

impl RecordFileHandler {
    /// Create a new heap file with one empty page
    pub fn create(
        buffer_mgr: &mut BufferManager,
        path: &str,
        record_size: usize,
    ) -> RecordResult<Self> {
        buffer_mgr.create_file(path)?;
        let file_handle = buffer_mgr.open_file(path)?;

        let page_buffer = buffer_mgr.get_page_mut(file_handle, 0)?;
        RecordPage::format(page_buffer, record_size)?;

        Ok(Self {
            file_handle,
            record_size,
            page_count: 1,
            last_insert_page_id: 0,
        })
    }

    /// Open an existing heap file
    pub fn open(
        buffer_mgr: &mut BufferManager,
        path: &str,
        record_size: usize,
    ) -> RecordResult<Self> {
        let file_handle = buffer_mgr.open_file(path)?;
        let page_count = buffer_mgr.page_count(file_handle)?.max(1);

        Ok(Self {
            file_handle,
            record_size,
            page_count,
            last_insert_page_id: page_count - 1,
        })
    }

    pub fn file_handle(&self) -> FileHandle {
        self.file_handle
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Insert record bytes into the first page with a free slot, starting
    /// at the last insertion point and appending a fresh page when the
    /// whole heap is full
    pub fn insert_record(
        &mut self,
        buffer_mgr: &mut BufferManager,
        data: &[u8],
    ) -> RecordResult<RecordId> {
        if data.len() != self.record_size {
            return Err(RecordError::InvalidRecord(format!(
                "record size mismatch: expected {}, got {}",
                self.record_size,
                data.len()
            )));
        }

        // Sweep every existing page once, wrapping around from the last
        // insertion point so holes left by deletes get refilled
        let start = self.last_insert_page_id.min(self.page_count - 1);
        for step in 0..self.page_count {
            let page_id = (start + step) % self.page_count;

            let page_buffer = buffer_mgr.get_page_mut(self.file_handle, page_id)?;
            let mut page = RecordPage::attach(page_buffer)?;

            if let Some(slot) = page.first_free() {
                page.put(slot, data)?;
                self.last_insert_page_id = page_id;
                return Ok(RecordId::new(page_id, slot));
            }
        }

        // Heap is full: append a new page
        let page_id = self.page_count;
        let page_buffer = buffer_mgr.get_page_mut(self.file_handle, page_id)?;
        let mut page = RecordPage::format(page_buffer, self.record_size)?;
        page.put(0, data)?;

        self.page_count += 1;
        self.last_insert_page_id = page_id;
        Ok(RecordId::new(page_id, 0))
    }

    /// Read a record by RID
    pub fn get_record(
        &self,
        buffer_mgr: &mut BufferManager,
        rid: RecordId,
    ) -> RecordResult<Record> {
        if rid.page_id >= self.page_count {
            return Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id));
        }

        let page_buffer = buffer_mgr.get_page_mut(self.file_handle, rid.page_id)?;
        let page = RecordPage::attach(page_buffer)?;

        let data = page.read(rid.slot_id)?.to_vec();
        Ok(Record::new(rid, data))
    }

    /// Overwrite a live record in place (records are fixed-width)
    pub fn update_record(
        &mut self,
        buffer_mgr: &mut BufferManager,
        rid: RecordId,
        data: &[u8],
    ) -> RecordResult<()> {
        if rid.page_id >= self.page_count {
            return Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id));
        }

        let page_buffer = buffer_mgr.get_page_mut(self.file_handle, rid.page_id)?;
        let mut page = RecordPage::attach(page_buffer)?;

        if !page.is_live(rid.slot_id) {
            return Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id));
        }
        page.put(rid.slot_id, data)
    }

    /// Free the slot; it is immediately reusable for new inserts
    pub fn delete_record(
        &mut self,
        buffer_mgr: &mut BufferManager,
        rid: RecordId,
    ) -> RecordResult<()> {
        if rid.page_id >= self.page_count {
            return Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id));
        }

        let page_buffer = buffer_mgr.get_page_mut(self.file_handle, rid.page_id)?;
        let mut page = RecordPage::attach(page_buffer)?;
        page.erase(rid.slot_id)?;

        // Future inserts can refill the hole
        if rid.page_id < self.last_insert_page_id {
            self.last_insert_page_id = rid.page_id;
        }

        Ok(())
    }

    /// Open a streaming scan over all live records
    pub fn open_scan(&self, buffer_manager: Arc<Mutex<BufferManager>>) -> RecordFileScanner {
        RecordFileScanner::new(self, buffer_manager)
    }
}

/// Streaming scanner over the live records of a heap file, advancing
/// page by page and skipping free slots.
///
/// The scanner keeps the page it is positioned on pinned in the buffer
/// pool and releases the pin when it moves past the page or is dropped.
pub struct RecordFileScanner {
    file_handle: FileHandle,
    page_count: usize,
    buffer_manager: Arc<Mutex<BufferManager>>,
    page_id: PageId,
    slot_id: usize,
    pinned_page: Option<PageId>,
    done: bool,
}

impl RecordFileScanner {
    fn new(handler: &RecordFileHandler, buffer_manager: Arc<Mutex<BufferManager>>) -> Self {
        Self {
            file_handle: handler.file_handle,
            page_count: handler.page_count,
            buffer_manager,
            page_id: 0,
            slot_id: 0,
            pinned_page: None,
            done: false,
        }
    }

    fn release_pin(&mut self, buffer_manager: &mut BufferManager) {
        if let Some(page_id) = self.pinned_page.take() {
            let _ = buffer_manager.unpin_page(self.file_handle, page_id);
        }
    }

    /// Close the scan early, releasing the page pin
    pub fn close(&mut self) {
        if self.pinned_page.is_some() {
            let buffer_manager = Arc::clone(&self.buffer_manager);
            let mut guard = match buffer_manager.lock() {
                Ok(g) => g,
                Err(_) => return,
            };
            self.release_pin(&mut guard);
        }
        self.done = true;
    }
}

impl Iterator for RecordFileScanner {
    type Item = RecordResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let buffer_manager = Arc::clone(&self.buffer_manager);
        let mut buffer_manager = match buffer_manager.lock() {
            Ok(g) => g,
            Err(_) => {
                self.done = true;
                return None;
            }
        };

        while self.page_id < self.page_count {
            if self.pinned_page != Some(self.page_id) {
                self.release_pin(&mut buffer_manager);
                if let Err(err) = buffer_manager.pin_page(self.file_handle, self.page_id) {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                self.pinned_page = Some(self.page_id);
            }

            let page_buffer = match buffer_manager.get_page_mut(self.file_handle, self.page_id) {
                Ok(buf) => buf,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            };

            let page = match RecordPage::attach(page_buffer) {
                Ok(page) => page,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            while self.slot_id < page.capacity() {
                let slot = self.slot_id;
                self.slot_id += 1;

                if page.is_live(slot) {
                    let data = match page.read(slot) {
                        Ok(bytes) => bytes.to_vec(),
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    return Some(Ok(Record::new(RecordId::new(self.page_id, slot), data)));
                }
            }

            self.page_id += 1;
            self.slot_id = 0;
        }

        self.release_pin(&mut buffer_manager);
        self.done = true;
        None
    }
}

impl Drop for RecordFileScanner {
    fn drop(&mut self) {
        self.close();
    }
}
