//! Black-box open -> build -> insert -> scan round trips, plus the
//! reopen-validation and scan-range error paths.

use btreepool::{AttrType, BTreeIndex, BufferPoolHandle, Config, HeapFile, ScanOp};
use rand::seq::SliceRandom;
use tempfile::tempdir;

fn small_config() -> Config {
    // Small enough that a few dozen rows force several splits.
    Config::new(128, 16)
}

fn heap_with_keys(keys: &[i32]) -> HeapFile {
    let mut heap = HeapFile::new(8, 64);
    for &k in keys {
        let mut record = k.to_be_bytes().to_vec();
        record.extend_from_slice(&0u32.to_be_bytes());
        heap.insert(record);
    }
    heap
}

#[test]
fn build_then_scan_returns_every_key_in_range() {
    btreepool::log::init_log();
    let dir = tempdir().unwrap();
    let keys: Vec<i32> = (0..200).collect();
    let heap = heap_with_keys(&keys);

    let pool = BufferPoolHandle::new(small_config());
    let (mut index, _file_name) =
        BTreeIndex::open(pool, dir.path(), "orders", 0, AttrType::Int, &heap).unwrap();

    index.start_scan(50, ScanOp::Gte, 99, ScanOp::Lte).unwrap();
    let mut found = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => found.push(rid.page_no),
            Err(e) if e.to_string().contains("no more entries") => break,
            Err(e) => panic!("unexpected scan error: {}", e),
        }
    }
    index.end_scan().unwrap();
    assert_eq!(found.len(), 50);

    index.close().unwrap();
}

#[test]
fn insert_after_build_keeps_scans_sorted_across_leaf_splits() {
    let dir = tempdir().unwrap();
    let heap = heap_with_keys(&[]);

    let pool = BufferPoolHandle::new(small_config());
    let (mut index, _file_name) =
        BTreeIndex::open(pool, dir.path(), "t", 0, AttrType::Int, &heap).unwrap();

    let mut keys: Vec<i32> = (0..300).collect();
    keys.shuffle(&mut rand::thread_rng());
    // insert out of order to exercise splits at varying positions.
    for (i, &k) in keys.iter().enumerate() {
        index.insert(k, btreepool::RecordId::new(1, i as u32)).unwrap();
    }

    index.start_scan(0, ScanOp::Gte, i32::MAX, ScanOp::Lte).unwrap();
    let mut seen = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => seen.push(rid),
            Err(_) => break,
        }
    }
    index.end_scan().unwrap();

    keys.sort();
    assert_eq!(seen.len(), keys.len());
}

#[test]
fn reopen_with_mismatched_attribute_is_bad_index_info() {
    let dir = tempdir().unwrap();
    let heap = heap_with_keys(&[1, 2, 3]);

    {
        let pool = BufferPoolHandle::new(small_config());
        let (index, _) = BTreeIndex::open(pool, dir.path(), "orders", 0, AttrType::Int, &heap).unwrap();
        index.close().unwrap();
    }

    let pool2 = BufferPoolHandle::new(small_config());
    let result = BTreeIndex::open(pool2, dir.path(), "orders", 4, AttrType::Int, &heap);
    assert!(result.is_err());
}

#[test]
fn scan_rejects_bad_opcodes_and_empty_canonical_range() {
    let dir = tempdir().unwrap();
    let heap = heap_with_keys(&(0..20).collect::<Vec<_>>());
    let pool = BufferPoolHandle::new(small_config());
    let (mut index, _) = BTreeIndex::open(pool, dir.path(), "t", 0, AttrType::Int, &heap).unwrap();

    assert!(matches!(
        index.start_scan(0, ScanOp::Lt, 10, ScanOp::Lte),
        Err(btreepool::BpError::BadOpcodes)
    ));

    // raw bounds are equal (10 <= 10) but canonicalize to 11 <= 9.
    assert!(matches!(
        index.start_scan(10, ScanOp::Gt, 10, ScanOp::Lt),
        Err(btreepool::BpError::BadScanRange)
    ));
}

#[test]
fn buffer_pool_exhaustion_surfaces_as_all_frames_pinned() {
    let dir = tempdir().unwrap();
    let heap = heap_with_keys(&[]);
    // A pool with a single frame cannot even hold the meta and root pages
    // at once.
    let pool = BufferPoolHandle::new(Config::new(128, 1));
    let result = BTreeIndex::open(pool, dir.path(), "t", 0, AttrType::Int, &heap);
    assert!(matches!(result, Err(btreepool::BpError::AllFramesPinned)));
}
