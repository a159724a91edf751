#![allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]

//! Tests for the file-backed ring buffer

use seqring::persisted::{PersistedError, PersistedRingBuffer, DEFAULT_ITEM_SIZE, DEFAULT_SIZE};
use std::path::PathBuf;

struct TempFiles {
    slots: PathBuf,
    index: PathBuf,
}

impl TempFiles {
    fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        let dir = std::env::temp_dir();
        Self {
            slots: dir.join(format!("seqring-{id}.slots")),
            index: dir.join(format!("seqring-{id}.index")),
        }
    }

    fn open(&self, size: usize, item_size: usize) -> PersistedRingBuffer {
        PersistedRingBuffer::open_with(&self.slots, &self.index, size, item_size).unwrap()
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.slots);
        let _ = std::fs::remove_file(&self.index);
    }
}

#[test]
fn test_fresh_buffer_is_empty() {
    let files = TempFiles::new();
    let buffer = PersistedRingBuffer::open(&files.slots, &files.index).unwrap();

    assert_eq!(buffer.capacity(), DEFAULT_SIZE - 1);
    assert_eq!(buffer.item_size(), DEFAULT_ITEM_SIZE);
    assert!(buffer.is_empty().unwrap());
    assert!(matches!(buffer.get(), Err(PersistedError::Empty)));

    let slot_bytes = std::fs::metadata(&files.slots).unwrap().len();
    assert_eq!(slot_bytes, (DEFAULT_SIZE * DEFAULT_ITEM_SIZE) as u64);
    assert_eq!(
        std::fs::read_to_string(&files.index).unwrap(),
        r#"{"read_index":0,"write_index":0}"#
    );
}

#[test]
fn test_items_come_back_in_fifo_order() {
    let files = TempFiles::new();
    let buffer = files.open(4, 32);

    buffer.put("alpha").unwrap();
    buffer.put("beta").unwrap();
    assert_eq!(buffer.len().unwrap(), 2);

    assert_eq!(buffer.get().unwrap(), "alpha");
    buffer.put("gamma").unwrap();
    assert_eq!(buffer.get().unwrap(), "beta");
    assert_eq!(buffer.get().unwrap(), "gamma");
    assert!(matches!(buffer.get(), Err(PersistedError::Empty)));
}

#[test]
fn test_full_after_size_minus_one_items() {
    let files = TempFiles::new();
    let buffer = files.open(4, 8);

    for item in ["a", "b", "c"] {
        buffer.put(item).unwrap();
    }
    assert!(matches!(buffer.put("d"), Err(PersistedError::Full)));
    assert_eq!(buffer.len().unwrap(), 3);

    assert_eq!(buffer.get().unwrap(), "a");
    buffer.put("d").unwrap();
    assert!(matches!(buffer.put("e"), Err(PersistedError::Full)));

    let drained: Vec<String> = (0..3).map(|_| buffer.get().unwrap()).collect();
    assert_eq!(drained, ["b", "c", "d"]);
}

#[test]
fn test_indices_wrap_around() {
    let files = TempFiles::new();
    let buffer = files.open(3, 8);

    for round in 0..10 {
        let item = format!("item{round}");
        buffer.put(&item).unwrap();
        assert_eq!(buffer.get().unwrap(), item);
    }
    assert!(buffer.is_empty().unwrap());
}

#[test]
fn test_item_larger_than_slot_is_rejected() {
    let files = TempFiles::new();
    let buffer = files.open(4, 4);

    buffer.put("four").unwrap();
    assert!(matches!(
        buffer.put("fives"),
        Err(PersistedError::ItemTooLarge { len: 5, item_size: 4 })
    ));
    assert!(matches!(
        buffer.put("é€"),
        Err(PersistedError::ItemTooLarge { len: 5, item_size: 4 })
    ));
    assert_eq!(buffer.len().unwrap(), 1);
}

#[test]
fn test_multibyte_text_survives() {
    let files = TempFiles::new();
    let buffer = files.open(4, 16);

    buffer.put("héllo wörld").unwrap();
    buffer.put("").unwrap();
    assert_eq!(buffer.get().unwrap(), "héllo wörld");
    assert_eq!(buffer.get().unwrap(), "");
}

#[test]
fn test_contents_survive_reopen() {
    let files = TempFiles::new();
    {
        let buffer = files.open(5, 16);
        buffer.put("first").unwrap();
        buffer.put("second").unwrap();
        buffer.put("third").unwrap();
        assert_eq!(buffer.get().unwrap(), "first");
    }

    assert_eq!(
        std::fs::read_to_string(&files.index).unwrap(),
        r#"{"read_index":1,"write_index":3}"#
    );

    let reopened = files.open(5, 16);
    assert_eq!(reopened.len().unwrap(), 2);
    assert_eq!(reopened.get().unwrap(), "second");
    assert_eq!(reopened.get().unwrap(), "third");
    assert!(reopened.is_empty().unwrap());
}

#[test]
fn test_corrupt_index_is_reported() {
    let files = TempFiles::new();
    let buffer = files.open(4, 8);

    std::fs::write(&files.index, "garbage").unwrap();
    assert!(matches!(buffer.get(), Err(PersistedError::Index(_))));

    std::fs::write(&files.index, r#"{"read_index":0,"write_index":9}"#).unwrap();
    assert!(matches!(buffer.put("x"), Err(PersistedError::Io(_))));
}

#[test]
fn test_invalid_utf8_slot_stays_queued() {
    let files = TempFiles::new();
    let buffer = files.open(4, 4);
    buffer.put("ok").unwrap();

    std::fs::write(&files.slots, [0xff, 0xfe, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    assert!(matches!(buffer.get(), Err(PersistedError::InvalidUtf8(_))));
    assert_eq!(buffer.len().unwrap(), 1);
}

#[test]
fn test_two_handles_on_the_same_files_do_not_lose_items() {
    let files = TempFiles::new();
    let writers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let buffer = files.open(1024, 16);
            std::thread::spawn(move || {
                for i in 0..400 {
                    buffer.put(&format!("{name}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let reader = files.open(1024, 16);
    assert_eq!(reader.len().unwrap(), 800);

    let mut drained = std::collections::HashSet::new();
    while let Ok(item) = reader.get() {
        assert!(drained.insert(item));
    }
    assert_eq!(drained.len(), 800);

    for name in ["a", "b"] {
        assert!((0..400).all(|i| drained.contains(&format!("{name}-{i}"))));
    }
}
