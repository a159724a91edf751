//! File-backed ring buffer
//!
//! A small durable queue of fixed-size string slots, independent of the
//! in-memory disruptor. Slots live in one file of `size * item_size` bytes;
//! the read and write positions live in a JSON record in a second file:
//!
//! ```json
//! {"read_index":3,"write_index":7}
//! ```
//!
//! One slot is always kept empty so that a full queue can be told apart from
//! an empty one, which means at most `size - 1` items are stored. Both files
//! are created on first use and reopened afterwards, so queued items survive
//! a restart.
//!
//! Every operation holds an in-process mutex plus an exclusive advisory
//! `flock` on the index file for its whole load, modify and save cycle, so
//! separate handles and separate processes may share one pair of files. On
//! non-Unix targets only the in-process mutex applies.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default number of slots
pub const DEFAULT_SIZE: usize = 10;

/// Default slot width in bytes
pub const DEFAULT_ITEM_SIZE: usize = 256;

/// Errors returned by `PersistedRingBuffer`
#[derive(Debug, thiserror::Error)]
pub enum PersistedError {
    #[error("Buffer is full")]
    Full,

    #[error("Buffer is empty")]
    Empty,

    #[error("Item of {len} bytes does not fit in a {item_size}-byte slot")]
    ItemTooLarge { len: usize, item_size: usize },

    #[error("Slot holds invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Buffer needs at least 2 slots of at least 1 byte, got {size} x {item_size}")]
    InvalidGeometry { size: usize, item_size: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed index record: {0}")]
    Index(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersistedError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
struct IndexRecord {
    read_index: usize,
    write_index: usize,
}

/// Exclusive advisory lock on an open file, released on drop
#[cfg_attr(not(unix), allow(dead_code))]
struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    #[cfg(unix)]
    fn exclusive(file: &'a File) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        loop {
            // SAFETY: the descriptor belongs to `file`, which outlives the guard.
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } == 0 {
                return Ok(Self { file });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(not(unix))]
    fn exclusive(file: &'a File) -> io::Result<Self> {
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            // SAFETY: see `exclusive`.
            if unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) } != 0 {
                tracing::warn!(
                    error = %io::Error::last_os_error(),
                    "Failed to release index file lock"
                );
            }
        }
    }
}

struct Files {
    slots: File,
    index: File,
}

impl Files {
    fn load_index(&self, size: usize) -> Result<IndexRecord> {
        let mut index = &self.index;
        let mut json = String::new();
        index.seek(SeekFrom::Start(0))?;
        index.read_to_string(&mut json)?;
        let record: IndexRecord = serde_json::from_str(&json)?;

        if record.read_index >= size || record.write_index >= size {
            return Err(PersistedError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("index record {record:?} out of range for {size} slots"),
            )));
        }
        Ok(record)
    }

    fn save_index(&self, record: IndexRecord) -> Result<()> {
        let mut index = &self.index;
        let json = serde_json::to_vec(&record)?;
        index.seek(SeekFrom::Start(0))?;
        index.set_len(0)?;
        index.write_all(&json)?;
        index.flush()?;
        Ok(())
    }

    fn write_slot(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut slots = &self.slots;
        slots.seek(SeekFrom::Start(offset))?;
        slots.write_all(data)?;
        slots.flush()?;
        Ok(())
    }

    fn read_slot(&self, offset: u64, data: &mut [u8]) -> Result<()> {
        let mut slots = &self.slots;
        slots.seek(SeekFrom::Start(offset))?;
        slots.read_exact(data)?;
        Ok(())
    }
}

/// Durable FIFO of strings backed by two files
pub struct PersistedRingBuffer {
    slot_path: PathBuf,
    index_path: PathBuf,
    size: usize,
    item_size: usize,
    files: Mutex<Files>,
}

impl PersistedRingBuffer {
    /// Open or create a buffer with `DEFAULT_SIZE` slots of `DEFAULT_ITEM_SIZE` bytes
    ///
    /// # Errors
    /// Returns `PersistedError::Io` if either file cannot be created or opened
    pub fn open(slot_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(slot_path, index_path, DEFAULT_SIZE, DEFAULT_ITEM_SIZE)
    }

    /// Open or create a buffer with the given geometry
    ///
    /// Reopening existing files with a different geometry is not detected
    /// beyond growing a short slot file.
    ///
    /// # Errors
    /// * `PersistedError::InvalidGeometry` if `size < 2` or `item_size == 0`
    /// * `PersistedError::Io` if either file cannot be created or opened
    pub fn open_with(
        slot_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        size: usize,
        item_size: usize,
    ) -> Result<Self> {
        if size < 2 || item_size == 0 {
            return Err(PersistedError::InvalidGeometry { size, item_size });
        }

        let slot_path = slot_path.as_ref().to_path_buf();
        let index_path = index_path.as_ref().to_path_buf();
        let total_size = (size * item_size) as u64;

        let slots = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&slot_path)?;
        let index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&index_path)?;
        let files = Files { slots, index };

        {
            let _lock = FileLock::exclusive(&files.index)?;
            if files.slots.metadata()?.len() < total_size {
                files.slots.set_len(total_size)?;
                tracing::debug!(path = %slot_path.display(), bytes = total_size, "Initialised slot file");
            }
            if files.index.metadata()?.len() == 0 {
                files.save_index(IndexRecord::default())?;
                tracing::debug!(path = %index_path.display(), "Initialised index record");
            }
        }

        Ok(Self {
            slot_path,
            index_path,
            size,
            item_size,
            files: Mutex::new(files),
        })
    }

    /// Append an item
    ///
    /// # Errors
    /// * `PersistedError::ItemTooLarge` if the UTF-8 encoding exceeds `item_size`
    /// * `PersistedError::Full` if `size - 1` items are already stored
    pub fn put(&self, item: &str) -> Result<()> {
        let bytes = item.as_bytes();
        if bytes.len() > self.item_size {
            return Err(PersistedError::ItemTooLarge {
                len: bytes.len(),
                item_size: self.item_size,
            });
        }
        let mut data = vec![0u8; self.item_size];
        data[..bytes.len()].copy_from_slice(bytes);

        self.locked(|files| {
            let mut record = files.load_index(self.size)?;
            let next_write = (record.write_index + 1) % self.size;
            if next_write == record.read_index {
                return Err(PersistedError::Full);
            }

            files.write_slot((record.write_index * self.item_size) as u64, &data)?;
            record.write_index = next_write;
            files.save_index(record)
        })
    }

    /// Remove and return the oldest item
    ///
    /// Trailing NUL padding is stripped, so items that themselves end in NUL
    /// bytes do not round-trip.
    ///
    /// # Errors
    /// * `PersistedError::Empty` if nothing is stored
    /// * `PersistedError::InvalidUtf8` if the slot was corrupted; the item stays queued
    pub fn get(&self) -> Result<String> {
        self.locked(|files| {
            let mut record = files.load_index(self.size)?;
            if record.read_index == record.write_index {
                return Err(PersistedError::Empty);
            }

            let mut data = vec![0u8; self.item_size];
            files.read_slot((record.read_index * self.item_size) as u64, &mut data)?;

            let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            data.truncate(end);
            let item = String::from_utf8(data)?;

            record.read_index = (record.read_index + 1) % self.size;
            files.save_index(record)?;
            Ok(item)
        })
    }

    /// Number of stored items
    ///
    /// # Errors
    /// Returns an error if the index record cannot be read
    pub fn len(&self) -> Result<usize> {
        let record = self.locked(|files| files.load_index(self.size))?;
        Ok((record.write_index + self.size - record.read_index) % self.size)
    }

    /// Check whether no item is stored
    ///
    /// # Errors
    /// Returns an error if the index record cannot be read
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Maximum number of items the buffer can hold
    pub fn capacity(&self) -> usize {
        self.size - 1
    }

    /// Width of a slot in bytes
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn slot_path(&self) -> &Path {
        &self.slot_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Run `op` while holding both the handle mutex and the index file lock
    fn locked<R>(&self, op: impl FnOnce(&Files) -> Result<R>) -> Result<R> {
        let files = self.files.lock();
        let _lock = FileLock::exclusive(&files.index)?;
        op(&files)
    }
}

impl std::fmt::Debug for PersistedRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedRingBuffer")
            .field("slot_path", &self.slot_path)
            .field("index_path", &self.index_path)
            .field("size", &self.size)
            .field("item_size", &self.item_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_record_json_layout() {
        let record = IndexRecord {
            read_index: 3,
            write_index: 7,
        };
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"read_index":3,"write_index":7}"#
        );
    }

    #[test]
    fn test_invalid_geometry() {
        let dir = std::env::temp_dir();
        assert!(matches!(
            PersistedRingBuffer::open_with(dir.join("never-a"), dir.join("never-b"), 1, 16),
            Err(PersistedError::InvalidGeometry { size: 1, item_size: 16 })
        ));
        assert!(matches!(
            PersistedRingBuffer::open_with(dir.join("never-a"), dir.join("never-b"), 4, 0),
            Err(PersistedError::InvalidGeometry { size: 4, item_size: 0 })
        ));
    }
}
