use lru::LruCache;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{BUFFER_POOL_SIZE, PAGE_SIZE, PageId};

/// Handle to a relation file opened through the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(u32);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

struct OpenFile {
    file: File,
    path: PathBuf,
}

struct Frame {
    data: Vec<u8>,
    dirty: bool,
    /// A pinned frame is never evicted
    pin_count: u32,
}

/// The file layer and the buffer pool in one: every relation file (heap or
/// index) is opened through the pool, and all page traffic flows through
/// its frames. Frames are recycled in LRU order over the unpinned set; the
/// pool is owned by the database instance and shared with record and index
/// files via `Arc<Mutex<_>>`.
pub struct BufferManager {
    /// Open files, slot index == handle. Closed slots are reused.
    files: Vec<Option<OpenFile>>,
    /// Open handles by canonical path, so a path is never opened twice
    by_path: HashMap<PathBuf, FileHandle>,
    /// Page frames with built-in LRU ordering
    frames: LruCache<(FileHandle, PageId), Frame>,
    /// Maximum number of resident frames
    capacity: usize,
    /// Buffer recycled from the last eviction
    spare: Vec<u8>,
}

impl BufferManager {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_POOL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            files: Vec::new(),
            by_path: HashMap::new(),
            // Capacity is enforced by hand so pinned frames are respected
            frames: LruCache::unbounded(),
            capacity: capacity.max(1),
            spare: Vec::new(),
        }
    }

    // ========== File management ==========

    /// Create a new relation file. Fails if the path already exists; the
    /// exclusive create makes a concurrent creation of the same relation
    /// lose cleanly.
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(FileError::FileAlreadyExists(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a relation file, reusing the existing handle if the same path
    /// is already open
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let shown = path.as_ref().display().to_string();
        let canonical = path
            .as_ref()
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(shown))?;

        if let Some(&handle) = self.by_path.get(&canonical) {
            return Ok(handle);
        }

        let file = OpenOptions::new().read(true).write(true).open(&canonical)?;
        let open_file = OpenFile {
            file,
            path: canonical.clone(),
        };

        // Reuse a closed slot before growing the table
        let slot = match self.files.iter().position(Option::is_none) {
            Some(free) => {
                self.files[free] = Some(open_file);
                free
            }
            None => {
                self.files.push(Some(open_file));
                self.files.len() - 1
            }
        };

        let handle = FileHandle(slot as u32);
        self.by_path.insert(canonical, handle);
        Ok(handle)
    }

    /// Close a file: its dirty frames are written back and dropped first
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        self.write_back(Some(handle))?;

        let keys: Vec<(FileHandle, PageId)> = self
            .frames
            .iter()
            .filter(|((file, _), _)| *file == handle)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.frames.pop(&key);
        }

        let entry = self
            .files
            .get_mut(handle.as_usize())
            .and_then(Option::take)
            .ok_or(FileError::InvalidHandle(handle.as_usize()))?;
        entry.file.sync_data()?;
        self.by_path.remove(&entry.path);
        Ok(())
    }

    /// Number of pages the file holds on disk. Pages that only exist as
    /// dirty frames are counted too.
    pub fn page_count(&mut self, handle: FileHandle) -> FileResult<usize> {
        let on_disk = {
            let entry = self.open_entry(handle)?;
            entry.file.metadata()?.len().div_ceil(PAGE_SIZE as u64) as usize
        };

        let buffered = self
            .frames
            .iter()
            .filter(|((file, _), _)| *file == handle)
            .map(|((_, page_id), _)| page_id + 1)
            .max()
            .unwrap_or(0);

        Ok(on_disk.max(buffered))
    }

    fn open_entry(&mut self, handle: FileHandle) -> FileResult<&mut OpenFile> {
        self.files
            .get_mut(handle.as_usize())
            .and_then(Option::as_mut)
            .ok_or(FileError::InvalidHandle(handle.as_usize()))
    }

    // ========== Page access ==========

    /// Get a page, faulting it in from disk if necessary
    pub fn get_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&[u8]> {
        self.fault_in(file, page_id)?;
        // fault_in guarantees residency; get() refreshes the LRU order
        Ok(&self
            .frames
            .get(&(file, page_id))
            .expect("frame just faulted in")
            .data)
    }

    /// Get a mutable page, marking the frame dirty
    pub fn get_page_mut(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&mut [u8]> {
        self.fault_in(file, page_id)?;
        let frame = self
            .frames
            .get_mut(&(file, page_id))
            .expect("frame just faulted in");
        frame.dirty = true;
        Ok(&mut frame.data)
    }

    /// Pin a page so it cannot be evicted, faulting it in if necessary.
    /// Every pin must be paired with an unpin.
    pub fn pin_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        self.fault_in(file, page_id)?;
        self.frames
            .get_mut(&(file, page_id))
            .expect("frame just faulted in")
            .pin_count += 1;
        Ok(())
    }

    /// Release one pin on a page
    pub fn unpin_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let frame = self
            .frames
            .peek_mut(&(file, page_id))
            .ok_or(FileError::PageNotFound(page_id))?;
        frame.pin_count = frame.pin_count.saturating_sub(1);
        Ok(())
    }

    /// Mark a resident page as dirty
    pub fn mark_dirty(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let frame = self
            .frames
            .get_mut(&(file, page_id))
            .ok_or(FileError::PageNotFound(page_id))?;
        frame.dirty = true;
        Ok(())
    }

    /// Write one page back if it is dirty
    pub fn flush_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let Some(frame) = self.frames.peek_mut(&(file, page_id)) else {
            return Ok(());
        };
        if !frame.dirty {
            return Ok(());
        }

        let entry = self
            .files
            .get_mut(file.as_usize())
            .and_then(Option::as_mut)
            .ok_or(FileError::InvalidHandle(file.as_usize()))?;
        write_page_out(&mut entry.file, page_id, &frame.data)?;
        frame.dirty = false;
        Ok(())
    }

    /// Write back every dirty page of one file and sync it
    pub fn flush_file(&mut self, handle: FileHandle) -> FileResult<()> {
        self.write_back(Some(handle))?;
        self.open_entry(handle)?.file.sync_data()?;
        Ok(())
    }

    /// Write back every dirty page of every file and sync them all
    pub fn flush_all(&mut self) -> FileResult<()> {
        self.write_back(None)?;
        for entry in self.files.iter_mut().flatten() {
            entry.file.sync_data()?;
        }
        Ok(())
    }

    /// Write dirty frames back to disk, optionally restricted to one file
    fn write_back(&mut self, only: Option<FileHandle>) -> FileResult<()> {
        let dirty: Vec<(FileHandle, PageId)> = self
            .frames
            .iter()
            .filter(|((file, _), frame)| frame.dirty && only.is_none_or(|h| *file == h))
            .map(|(key, _)| *key)
            .collect();

        for (file, page_id) in dirty {
            let entry = self
                .files
                .get_mut(file.as_usize())
                .and_then(Option::as_mut)
                .ok_or(FileError::InvalidHandle(file.as_usize()))?;

            // peek_mut keeps the LRU order untouched during a flush sweep
            if let Some(frame) = self.frames.peek_mut(&(file, page_id))
                && frame.dirty
            {
                write_page_out(&mut entry.file, page_id, &frame.data)?;
                frame.dirty = false;
            }
        }

        Ok(())
    }

    /// Bring a page into the pool, evicting the coldest unpinned frame
    /// when the pool is at capacity
    fn fault_in(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        if self.frames.contains(&(file, page_id)) {
            return Ok(());
        }

        while self.frames.len() >= self.capacity {
            self.evict_one()?;
        }

        let mut data = std::mem::take(&mut self.spare);
        data.resize(PAGE_SIZE, 0);

        {
            let entry = self.open_entry(file)?;
            read_page_into(&mut entry.file, page_id, &mut data)?;
        }

        self.frames.put(
            (file, page_id),
            Frame {
                data,
                dirty: false,
                pin_count: 0,
            },
        );
        Ok(())
    }

    /// Evict the least recently used unpinned frame. Fails with
    /// BufferPoolFull when every frame is pinned.
    fn evict_one(&mut self) -> FileResult<()> {
        // iter() runs MRU -> LRU, so the reverse walk meets the coldest
        // unpinned frame first
        let victim = self
            .frames
            .iter()
            .rev()
            .find(|(_, frame)| frame.pin_count == 0)
            .map(|(key, _)| *key);

        let key = victim.ok_or(FileError::BufferPoolFull)?;
        let Some(frame) = self.frames.pop(&key) else {
            return Ok(());
        };

        if frame.dirty {
            let entry = self
                .files
                .get_mut(key.0.as_usize())
                .and_then(Option::as_mut)
                .ok_or(FileError::InvalidHandle(key.0.as_usize()))?;
            write_page_out(&mut entry.file, key.1, &frame.data)?;
        }

        // The evicted buffer becomes the next fault-in's frame
        self.spare = frame.data;
        Ok(())
    }

    pub fn cached_pages(&self) -> usize {
        self.frames.len()
    }

    pub fn is_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        self.frames.contains(&(file, page_id))
    }

    pub fn dirty_pages(&self) -> usize {
        self.frames.iter().filter(|(_, f)| f.dirty).count()
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}

/// Read one page; anything past the end of file reads as zeros
fn read_page_into(file: &mut File, page_id: PageId, buf: &mut [u8]) -> std::io::Result<()> {
    buf.fill(0);

    let offset = (page_id * PAGE_SIZE) as u64;
    let file_len = file.metadata()?.len();
    if offset >= file_len {
        return Ok(());
    }

    let available = ((file_len - offset) as usize).min(PAGE_SIZE);
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf[..available])
}

/// Write one page, zero-extending the file over any gap before it
fn write_page_out(file: &mut File, page_id: PageId, data: &[u8]) -> std::io::Result<()> {
    let offset = (page_id * PAGE_SIZE) as u64;
    if file.metadata()?.len() < offset {
        file.set_len(offset)?;
    }

    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)
}
