//! `BTreeIndex`: the public handle wiring node layout and scan state
//! through the buffer pool. Grounded on `BTreeIndex` in the B+ tree lab
//! this module originates from: open-or-create with a meta-validated
//! reopen path, recursive insert with split propagation, and leaf-chained
//! range scans. Three corrections versus that original are applied here.
//! Bound canonicalization happens before the range check, not after.
//! Operator validation is a real conjunction, not an always-true
//! disjunction. `end_scan` unpins the page it actually holds before
//! resetting scan state, not after.

use std::path::Path;

use log::debug;

use crate::buffer::{BufferPoolHandle, FileId, PageGuard};
use crate::config::Config;
use crate::error::{BpError, BpResult};
use crate::storage::heap::{HeapFile, HeapScan, RecordId};
use crate::storage::page_store::{FilePageStore, PageId, NO_PAGE};

use super::meta::{AttrType, IndexMetaInfo};
use super::node::{LeafNode, NonLeafNode};
use super::scan::{ScanOp, ScanState};

struct SplitUp {
    page_no: PageId,
    key: i32,
}

pub struct BTreeIndex {
    pool: BufferPoolHandle,
    file: FileId,
    meta_page_no: PageId,
    root_page_no: PageId,
    root_is_leaf: bool,
    leaf_capacity: usize,
    nonleaf_capacity: usize,
    scan: ScanState,
}

impl BTreeIndex {
    /// Opens an existing index file, or builds one from a scan over
    /// `heap` if it doesn't exist yet. Returns the index handle and the
    /// file name it used (`"<relation_name>.<attr_byte_offset>"`).
    pub fn open(
        pool: BufferPoolHandle,
        index_dir: &Path,
        relation_name: &str,
        attr_byte_offset: i32,
        attr_type: AttrType,
        heap: &HeapFile,
    ) -> BpResult<(BTreeIndex, String)> {
        let file_name = format!("{}.{}", relation_name, attr_byte_offset);
        let path = index_dir.join(&file_name);
        let existed = path.exists();
        let config = pool.config();
        let store = FilePageStore::open(&path, config.page_size, !existed)?;
        let file = pool.register_file(Box::new(store));
        let leaf_capacity = config.leaf_capacity();
        let nonleaf_capacity = config.nonleaf_capacity();

        if existed {
            let index = Self::reopen(
                pool,
                file,
                relation_name,
                attr_byte_offset,
                attr_type,
                leaf_capacity,
                nonleaf_capacity,
            )?;
            Ok((index, file_name))
        } else {
            let index = Self::build(
                pool,
                file,
                relation_name,
                attr_byte_offset,
                attr_type,
                leaf_capacity,
                nonleaf_capacity,
                heap,
            )?;
            Ok((index, file_name))
        }
    }

    fn reopen(
        pool: BufferPoolHandle,
        file: FileId,
        relation_name: &str,
        attr_byte_offset: i32,
        attr_type: AttrType,
        leaf_capacity: usize,
        nonleaf_capacity: usize,
    ) -> BpResult<Self> {
        let meta_page_no = pool.first_page_no(file);
        let meta_guard = pool.read(file, meta_page_no)?;
        let meta = IndexMetaInfo::decode(&meta_guard.bytes());
        meta_guard.release(false)?;

        if meta.relation_name != relation_name {
            return Err(BpError::BadIndexInfo(format!(
                "relation name mismatch: expected {}, found {}",
                relation_name, meta.relation_name
            )));
        }
        if meta.attr_byte_offset != attr_byte_offset {
            return Err(BpError::BadIndexInfo(format!(
                "attr byte offset mismatch: expected {}, found {}",
                attr_byte_offset, meta.attr_byte_offset
            )));
        }
        if meta.attr_type != attr_type {
            return Err(BpError::BadIndexInfo("attr type mismatch".to_string()));
        }

        Ok(BTreeIndex {
            pool,
            file,
            meta_page_no,
            root_page_no: meta.root_page_no,
            root_is_leaf: meta.root_is_leaf,
            leaf_capacity,
            nonleaf_capacity,
            scan: ScanState::inactive(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        pool: BufferPoolHandle,
        file: FileId,
        relation_name: &str,
        attr_byte_offset: i32,
        attr_type: AttrType,
        leaf_capacity: usize,
        nonleaf_capacity: usize,
        heap: &HeapFile,
    ) -> BpResult<Self> {
        let (meta_page_no, mut meta_guard) = pool.alloc(file)?;
        let (root_page_no, mut root_guard) = pool.alloc(file)?;

        let leaf = LeafNode::empty(leaf_capacity);
        leaf.encode(&mut root_guard.bytes_mut());
        root_guard.mark_dirty();
        root_guard.release(true)?;

        let meta = IndexMetaInfo {
            relation_name: relation_name.to_string(),
            attr_byte_offset,
            attr_type,
            root_page_no,
            root_is_leaf: true,
        };
        meta.encode(&mut meta_guard.bytes_mut());
        meta_guard.mark_dirty();
        meta_guard.release(true)?;

        let mut index = BTreeIndex {
            pool: pool.clone(),
            file,
            meta_page_no,
            root_page_no,
            root_is_leaf: true,
            leaf_capacity,
            nonleaf_capacity,
            scan: ScanState::inactive(),
        };

        let mut scan = heap.scan();
        loop {
            match scan.scan_next() {
                Ok(rid) => {
                    let bytes = scan.record_bytes(rid)?;
                    let off = attr_byte_offset as usize;
                    let key = crate::bytes::read_i32(&bytes[off..off + 4]);
                    index.insert(key, rid)?;
                }
                Err(BpError::EndOfFile) => break,
                Err(e) => return Err(e),
            }
        }
        pool.flush_file(file)?;
        debug!("built index {} over {} entries", relation_name, "heap scan");
        Ok(index)
    }

    pub fn insert(&mut self, key: i32, rid: RecordId) -> BpResult<()> {
        let guard = self.pool.read(self.file, self.root_page_no)?;
        let split = self.insert_into(guard, self.root_is_leaf, key, rid)?;

        if let Some(up) = split {
            let was_leaf = self.root_is_leaf;
            let (new_root_page_no, mut new_root_guard) = self.pool.alloc(self.file)?;
            let mut new_root = NonLeafNode::empty(self.nonleaf_capacity, if was_leaf { 1 } else { 0 });
            new_root.keys[0] = up.key;
            new_root.children[0] = self.root_page_no;
            new_root.children[1] = up.page_no;
            new_root.encode(&mut new_root_guard.bytes_mut());
            new_root_guard.mark_dirty();
            new_root_guard.release(true)?;

            let mut meta_guard = self.pool.read(self.file, self.meta_page_no)?;
            let mut meta = IndexMetaInfo::decode(&meta_guard.bytes());
            meta.root_page_no = new_root_page_no;
            meta.root_is_leaf = false;
            meta.encode(&mut meta_guard.bytes_mut());
            meta_guard.mark_dirty();
            meta_guard.release(true)?;

            debug!("root grew: {} -> {}", self.root_page_no, new_root_page_no);
            self.root_page_no = new_root_page_no;
            self.root_is_leaf = false;
        }
        Ok(())
    }

    fn insert_into(
        &self,
        guard: PageGuard,
        is_leaf: bool,
        key: i32,
        rid: RecordId,
    ) -> BpResult<Option<SplitUp>> {
        if is_leaf {
            self.insert_into_leaf(guard, key, rid)
        } else {
            self.insert_into_nonleaf(guard, key, rid)
        }
    }

    fn insert_into_leaf(&self, mut guard: PageGuard, key: i32, rid: RecordId) -> BpResult<Option<SplitUp>> {
        let mut leaf = LeafNode::decode(&guard.bytes(), self.leaf_capacity);
        if !leaf.is_full() {
            leaf.insert_sorted(key, rid);
            leaf.encode(&mut guard.bytes_mut());
            guard.mark_dirty();
            guard.release(true)?;
            return Ok(None);
        }

        let (mut right, _sep) = leaf.split_insert(key, rid);
        let (right_page_no, mut right_guard) = self.pool.alloc(self.file)?;
        right.right_sib = leaf.right_sib;
        leaf.right_sib = right_page_no;

        leaf.encode(&mut guard.bytes_mut());
        right.encode(&mut right_guard.bytes_mut());
        guard.mark_dirty();
        right_guard.mark_dirty();
        guard.release(true)?;
        let pushup_key = right.keys[0];
        right_guard.release(true)?;

        debug!("leaf split: new sibling page {}", right_page_no);
        Ok(Some(SplitUp {
            page_no: right_page_no,
            key: pushup_key,
        }))
    }

    fn insert_into_nonleaf(&self, mut guard: PageGuard, key: i32, rid: RecordId) -> BpResult<Option<SplitUp>> {
        let mut node = NonLeafNode::decode(&guard.bytes(), self.nonleaf_capacity);
        let child_is_leaf = node.level == 1;
        let idx = node.find_child_index(key);
        let child_page_no = node.children[idx];

        let child_guard = self.pool.read(self.file, child_page_no)?;
        let split = self.insert_into(child_guard, child_is_leaf, key, rid)?;

        match split {
            None => {
                guard.release(false)?;
                Ok(None)
            }
            Some(up) => {
                if !node.is_full() {
                    node.insert_sorted(up.key, up.page_no);
                    node.encode(&mut guard.bytes_mut());
                    guard.mark_dirty();
                    guard.release(true)?;
                    Ok(None)
                } else {
                    let (mut right, pushup) = node.split_insert(up.key, up.page_no);
                    node.encode(&mut guard.bytes_mut());
                    let (right_page_no, mut right_guard) = self.pool.alloc(self.file)?;
                    right.encode(&mut right_guard.bytes_mut());
                    guard.mark_dirty();
                    right_guard.mark_dirty();
                    guard.release(true)?;
                    right_guard.release(true)?;
                    debug!("non-leaf split: new sibling page {}", right_page_no);
                    Ok(Some(SplitUp {
                        page_no: right_page_no,
                        key: pushup,
                    }))
                }
            }
        }
    }

    fn find_leaf_for_key(&self, key: i32) -> BpResult<PageId> {
        let mut page_no = self.root_page_no;
        let mut is_leaf = self.root_is_leaf;
        while !is_leaf {
            let guard = self.pool.read(self.file, page_no)?;
            let node = NonLeafNode::decode(&guard.bytes(), self.nonleaf_capacity);
            let idx = node.find_child_index(key);
            let next = node.children[idx];
            let next_is_leaf = node.level == 1;
            guard.release(false)?;
            page_no = next;
            is_leaf = next_is_leaf;
        }
        Ok(page_no)
    }

    /// Starts a range scan. `low_op` must be `Gt`/`Gte` and `high_op` must
    /// be `Lt`/`Lte` (else `BadOpcodes`); bounds are canonicalized to an
    /// inclusive `[lo, hi]` range *before* checking `lo <= hi` (else
    /// `BadScanRange`) — `(10, Gt, 10, Lt)` canonicalizes to `[11, 9]` and
    /// is rejected even though the raw bounds are equal.
    pub fn start_scan(&mut self, low: i32, low_op: ScanOp, high: i32, high_op: ScanOp) -> BpResult<()> {
        if !matches!(low_op, ScanOp::Gt | ScanOp::Gte) || !matches!(high_op, ScanOp::Lt | ScanOp::Lte) {
            return Err(BpError::BadOpcodes);
        }
        let lo = if low_op == ScanOp::Gt { low + 1 } else { low };
        let hi = if high_op == ScanOp::Lt { high - 1 } else { high };
        if lo > hi {
            return Err(BpError::BadScanRange);
        }

        if self.scan.executing {
            self.end_scan()?;
        }

        let leaf_page_no = self.find_leaf_for_key(lo)?;
        let guard = self.pool.read(self.file, leaf_page_no)?;
        let leaf = LeafNode::decode(&guard.bytes(), self.leaf_capacity);
        let mut next_entry = 0;
        while next_entry < leaf.num && leaf.keys[next_entry] < lo {
            next_entry += 1;
        }

        self.scan = ScanState {
            executing: true,
            lo,
            hi,
            current_page_no: leaf_page_no,
            current_guard: Some(guard),
            next_entry,
        };
        Ok(())
    }

    /// Advances the scan. `executing` stays `true` once a scan starts, even
    /// past exhaustion, so `end_scan` remains valid to call; exhaustion is
    /// tracked by `current_guard` going to `None` instead. A `scan_next`
    /// call after exhaustion just repeats `IndexScanCompleted`.
    pub fn scan_next(&mut self) -> BpResult<RecordId> {
        if !self.scan.executing {
            return Err(BpError::ScanNotInitialized);
        }
        if self.scan.current_guard.is_none() {
            return Err(BpError::IndexScanCompleted);
        }
        loop {
            let leaf = {
                let guard = self
                    .scan
                    .current_guard
                    .as_ref()
                    .expect("checked above: a guard is held whenever this loop runs");
                LeafNode::decode(&guard.bytes(), self.leaf_capacity)
            };

            if self.scan.next_entry >= leaf.num {
                let old_guard = self.scan.current_guard.take().unwrap();
                old_guard.release(false)?;
                if leaf.right_sib == NO_PAGE {
                    return Err(BpError::IndexScanCompleted);
                }
                let next_guard = self.pool.read(self.file, leaf.right_sib)?;
                self.scan.current_page_no = leaf.right_sib;
                self.scan.current_guard = Some(next_guard);
                self.scan.next_entry = 0;
                continue;
            }

            let key = leaf.keys[self.scan.next_entry];
            if key <= self.scan.hi {
                let rid = leaf.rids[self.scan.next_entry];
                self.scan.next_entry += 1;
                return Ok(rid);
            } else {
                let old_guard = self.scan.current_guard.take().unwrap();
                old_guard.release(false)?;
                return Err(BpError::IndexScanCompleted);
            }
        }
    }

    /// Unpins whichever leaf the scan is actually holding, then resets
    /// scan state — in that order, so the page number used to unpin is
    /// never already zeroed out.
    pub fn end_scan(&mut self) -> BpResult<()> {
        if !self.scan.executing {
            return Err(BpError::ScanNotInitialized);
        }
        if let Some(guard) = self.scan.current_guard.take() {
            guard.release(false)?;
        }
        self.scan = ScanState::inactive();
        Ok(())
    }

    pub fn close(self) -> BpResult<()> {
        self.pool.flush_file(self.file)
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if let Err(e) = self.pool.flush_file(self.file) {
            log::warn!("failed to flush index file on drop: {}", e);
        }
    }
}
