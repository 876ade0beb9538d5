//! The clock-replacement buffer pool. Algorithm and error semantics are
//! grounded directly on `BufMgr` in the buffer manager lab this crate's
//! buffer pool originates from: the same five-step `allocBuf` sweep, the
//! same two-phase `flushFile` (validate every resident page first, then
//! write back and evict), and the same unconditional `free_page` forwarded
//! to the storage layer on `dispose`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

use crate::config::Config;
use crate::error::{BpError, BpResult};
use crate::storage::page_store::{PageId, PageStore};

use super::frame::FrameDescriptor;
use super::guard::PageGuard;

pub type FileId = u32;

#[derive(Debug, Clone, Default)]
pub struct BufferPoolStats {
    pub accesses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

pub struct BufferPool {
    config: Config,
    frames: Vec<Vec<u8>>,
    descriptors: Vec<FrameDescriptor>,
    index: HashMap<(FileId, PageId), usize>,
    hand: usize,
    files: HashMap<FileId, Box<dyn PageStore>>,
    next_file_id: FileId,
    stats: BufferPoolStats,
    /// Frame visits made by the most recent `find_victim` sweep. Exists so
    /// tests can pin the two-sweep termination bound down to an exact
    /// number instead of just "eventually terminates".
    last_sweep_visits: u32,
}

impl BufferPool {
    pub fn new(config: Config) -> Self {
        let n = config.pool_capacity;
        Self {
            config,
            frames: vec![vec![0u8; config.page_size]; n],
            descriptors: vec![FrameDescriptor::empty(); n],
            index: HashMap::new(),
            hand: n.saturating_sub(1),
            files: HashMap::new(),
            next_file_id: 1,
            stats: BufferPoolStats::default(),
            last_sweep_visits: 0,
        }
    }

    pub(crate) fn frame_bytes(&self, idx: usize) -> &[u8] {
        &self.frames[idx]
    }

    pub(crate) fn frame_bytes_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.frames[idx]
    }

    fn advance_clock(&mut self) {
        let n = self.descriptors.len();
        self.hand = (self.hand + 1) % n;
    }

    /// Scans for a victim frame, clearing reference bits and skipping
    /// pinned frames. Terminates with `AllFramesPinned` once `N` pinned
    /// frames have been observed without a selection — two full sweeps
    /// suffice, since the first sweep clears every reference bit still set
    /// and the second only ever finds frames either free or pinned.
    fn find_victim(&mut self) -> BpResult<usize> {
        let n = self.descriptors.len();
        let mut pinned_seen = 0u32;
        self.last_sweep_visits = 0;
        while pinned_seen < n as u32 {
            self.advance_clock();
            self.last_sweep_visits += 1;
            let idx = self.hand;
            if !self.descriptors[idx].valid {
                return Ok(idx);
            }
            if self.descriptors[idx].ref_bit {
                self.descriptors[idx].ref_bit = false;
                continue;
            }
            if self.descriptors[idx].pin_count > 0 {
                pinned_seen += 1;
                continue;
            }
            self.evict(idx)?;
            return Ok(idx);
        }
        warn!("buffer pool exhausted: all {} frames pinned", n);
        Err(BpError::AllFramesPinned)
    }

    fn evict(&mut self, idx: usize) -> BpResult<()> {
        let desc = self.descriptors[idx].clone();
        if desc.dirty {
            let file_id = desc.file.expect("valid frame has a file");
            let bytes = self.frames[idx].clone();
            self.files
                .get_mut(&file_id)
                .expect("frame references a registered file")
                .write_page(desc.page_no, &bytes)?;
            self.stats.disk_writes += 1;
        }
        if let Some(file_id) = desc.file {
            self.index.remove(&(file_id, desc.page_no));
        }
        debug!("evicted frame {} (file {:?}, page {})", idx, desc.file, desc.page_no);
        self.descriptors[idx].clear();
        Ok(())
    }

    pub(crate) fn register_file(&mut self, store: Box<dyn PageStore>) -> FileId {
        let id = self.next_file_id;
        self.next_file_id += 1;
        self.files.insert(id, store);
        id
    }

    pub(crate) fn first_page_no(&self, file: FileId) -> PageId {
        self.files
            .get(&file)
            .map(|s| s.first_page_no())
            .unwrap_or(0)
    }

    pub(crate) fn pin_for_read(&mut self, file: FileId, page_no: PageId) -> BpResult<usize> {
        self.stats.accesses += 1;
        if let Some(&idx) = self.index.get(&(file, page_no)) {
            self.descriptors[idx].pin_count += 1;
            self.descriptors[idx].ref_bit = true;
            return Ok(idx);
        }
        let idx = self.find_victim()?;
        let bytes = self
            .files
            .get_mut(&file)
            .ok_or(BpError::BadBuffer)?
            .read_page(page_no)?;
        self.stats.disk_reads += 1;
        self.frames[idx] = bytes;
        self.descriptors[idx] = FrameDescriptor {
            file: Some(file),
            page_no,
            pin_count: 1,
            dirty: false,
            valid: true,
            ref_bit: false,
        };
        self.index.insert((file, page_no), idx);
        Ok(idx)
    }

    pub(crate) fn pin_for_alloc(&mut self, file: FileId) -> BpResult<(PageId, usize)> {
        let idx = self.find_victim()?;
        let (page_no, bytes) = self
            .files
            .get_mut(&file)
            .ok_or(BpError::BadBuffer)?
            .allocate_page()?;
        self.frames[idx] = bytes;
        self.descriptors[idx] = FrameDescriptor {
            file: Some(file),
            page_no,
            pin_count: 1,
            dirty: false,
            valid: true,
            ref_bit: false,
        };
        self.index.insert((file, page_no), idx);
        Ok((page_no, idx))
    }

    pub(crate) fn unpin(&mut self, file: FileId, page_no: PageId, became_dirty: bool) -> BpResult<()> {
        if let Some(&idx) = self.index.get(&(file, page_no)) {
            if self.descriptors[idx].pin_count == 0 {
                return Err(BpError::PageNotPinned);
            }
            self.descriptors[idx].pin_count -= 1;
            self.descriptors[idx].dirty |= became_dirty;
            Ok(())
        } else {
            // Not resident: unpinning a page the pool already evicted is a
            // no-op, matching the original `HashNotFoundException` being
            // swallowed by callers that unpin defensively.
            Ok(())
        }
    }

    pub(crate) fn flush_file(&mut self, file: FileId) -> BpResult<()> {
        for d in &self.descriptors {
            if d.file == Some(file) {
                if d.pin_count > 0 {
                    return Err(BpError::PagePinned);
                }
                if !d.valid {
                    return Err(BpError::BadBuffer);
                }
            }
        }
        for idx in 0..self.descriptors.len() {
            if self.descriptors[idx].file != Some(file) {
                continue;
            }
            if self.descriptors[idx].dirty {
                let page_no = self.descriptors[idx].page_no;
                let bytes = self.frames[idx].clone();
                self.files
                    .get_mut(&file)
                    .ok_or(BpError::BadBuffer)?
                    .write_page(page_no, &bytes)?;
                self.stats.disk_writes += 1;
            }
            self.index.remove(&(file, self.descriptors[idx].page_no));
            self.descriptors[idx].clear();
        }
        Ok(())
    }

    pub(crate) fn dispose(&mut self, file: FileId, page_no: PageId) -> BpResult<()> {
        if let Some(&idx) = self.index.get(&(file, page_no)) {
            if self.descriptors[idx].pin_count > 0 {
                return Err(BpError::PagePinned);
            }
            self.index.remove(&(file, page_no));
            self.descriptors[idx].clear();
        }
        self.files
            .get_mut(&file)
            .ok_or(BpError::BadBuffer)?
            .free_page(page_no)?;
        Ok(())
    }

    pub(crate) fn shutdown(&mut self) -> BpResult<()> {
        for d in &self.descriptors {
            if d.pin_count > 0 {
                return Err(BpError::PagePinned);
            }
        }
        for idx in 0..self.descriptors.len() {
            if self.descriptors[idx].valid && self.descriptors[idx].dirty {
                let file = self.descriptors[idx].file.expect("valid frame has a file");
                let page_no = self.descriptors[idx].page_no;
                let bytes = self.frames[idx].clone();
                self.files
                    .get_mut(&file)
                    .ok_or(BpError::BadBuffer)?
                    .write_page(page_no, &bytes)?;
                self.stats.disk_writes += 1;
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (idx, d) in self.descriptors.iter().enumerate() {
            out.push_str(&format!(
                "frame {}: valid={} file={:?} page={} pin={} dirty={} ref={}\n",
                idx, d.valid, d.file, d.page_no, d.pin_count, d.dirty, d.ref_bit
            ));
        }
        out
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("failed to shut down buffer pool cleanly on drop: {}", e);
        }
    }
}

/// Shared handle to a `BufferPool`. Cloning shares the same underlying
/// pool; this crate assumes a single mutator, so the
/// `Rc<RefCell<_>>` here is about letting a `PageGuard` call back into the
/// pool on drop, not about concurrent access.
#[derive(Clone)]
pub struct BufferPoolHandle(Rc<RefCell<BufferPool>>);

impl BufferPoolHandle {
    pub fn new(config: Config) -> Self {
        Self(Rc::new(RefCell::new(BufferPool::new(config))))
    }

    pub fn page_size(&self) -> usize {
        self.0.borrow().config.page_size
    }

    pub fn config(&self) -> Config {
        self.0.borrow().config
    }

    pub fn register_file(&self, store: Box<dyn PageStore>) -> FileId {
        self.0.borrow_mut().register_file(store)
    }

    pub fn first_page_no(&self, file: FileId) -> PageId {
        self.0.borrow().first_page_no(file)
    }

    pub fn read(&self, file: FileId, page_no: PageId) -> BpResult<PageGuard> {
        let idx = self.0.borrow_mut().pin_for_read(file, page_no)?;
        Ok(PageGuard::new(self.0.clone(), file, page_no, idx))
    }

    pub fn alloc(&self, file: FileId) -> BpResult<(PageId, PageGuard)> {
        let (page_no, idx) = self.0.borrow_mut().pin_for_alloc(file)?;
        Ok((page_no, PageGuard::new(self.0.clone(), file, page_no, idx)))
    }

    pub fn unpin(&self, file: FileId, page_no: PageId, became_dirty: bool) -> BpResult<()> {
        self.0.borrow_mut().unpin(file, page_no, became_dirty)
    }

    pub fn flush_file(&self, file: FileId) -> BpResult<()> {
        self.0.borrow_mut().flush_file(file)
    }

    pub fn dispose(&self, file: FileId, page_no: PageId) -> BpResult<()> {
        self.0.borrow_mut().dispose(file, page_no)
    }

    pub fn shutdown(&self) -> BpResult<()> {
        self.0.borrow_mut().shutdown()
    }

    pub fn stats(&self) -> BufferPoolStats {
        self.0.borrow().stats.clone()
    }

    pub fn describe(&self) -> String {
        self.0.borrow().describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page_store::{FilePageStore, PageStore};
    use tempfile::NamedTempFile;

    fn new_handle(page_size: usize, capacity: usize) -> (BufferPoolHandle, FileId, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let pool = BufferPoolHandle::new(Config::new(page_size, capacity));
        let store = FilePageStore::open(tmp.path(), page_size, true).unwrap();
        let file = pool.register_file(Box::new(store));
        (pool, file, tmp)
    }

    #[test]
    fn read_after_alloc_hits_cache_without_disk_read() {
        let (pool, file, _tmp) = new_handle(64, 4);
        let (page_no, guard) = pool.alloc(file).unwrap();
        guard.release(false).unwrap();

        let before = pool.stats().disk_reads;
        let guard = pool.read(file, page_no).unwrap();
        guard.release(false).unwrap();
        assert_eq!(pool.stats().disk_reads, before);
    }

    #[test]
    fn all_frames_pinned_when_pool_exhausted() {
        let (pool, file, _tmp) = new_handle(64, 2);
        let (_p1, g1) = pool.alloc(file).unwrap();
        let (_p2, g2) = pool.alloc(file).unwrap();
        match pool.alloc(file) {
            Err(BpError::AllFramesPinned) => {}
            other => panic!("expected AllFramesPinned, got {:?}", other.map(|_| ())),
        }
        g1.release(false).unwrap();
        g2.release(false).unwrap();
    }

    #[test]
    fn clock_gives_unpinned_frame_a_second_chance_before_eviction() {
        let (pool, file, _tmp) = new_handle(64, 2);
        let (p1, g1) = pool.alloc(file).unwrap();
        let (_p2, g2) = pool.alloc(file).unwrap();
        // touch p1 again so its ref bit is set, then release both.
        let g1b = pool.read(file, p1).unwrap();
        g1b.release(false).unwrap();
        g1.release(false).unwrap();
        g2.release(false).unwrap();

        // a third alloc must still succeed by clearing ref bits and
        // evicting on the second pass.
        let (_p3, g3) = pool.alloc(file).unwrap();
        g3.release(false).unwrap();
    }

    #[test]
    fn unpin_without_pin_errors() {
        let (pool, file, _tmp) = new_handle(64, 2);
        assert!(pool.unpin(file, 1, false).is_ok(), "unpin of never-resident page is a no-op");
        let (page_no, guard) = pool.alloc(file).unwrap();
        guard.release(false).unwrap();
        assert!(matches!(pool.unpin(file, page_no, false), Err(BpError::PageNotPinned)));
    }

    #[test]
    fn flush_file_fails_while_a_page_is_pinned() {
        let (pool, file, _tmp) = new_handle(64, 2);
        let (_page_no, guard) = pool.alloc(file).unwrap();
        assert!(matches!(pool.flush_file(file), Err(BpError::PagePinned)));
        guard.release(false).unwrap();
        assert!(pool.flush_file(file).is_ok());
    }

    /// Forces the worst case (every frame's reference bit set) so the sweep
    /// must clear all `N` ref bits before it can count any frame as pinned,
    /// and checks the exact `2N` visit bound, not just eventual failure.
    #[test]
    fn find_victim_terminates_after_exactly_two_sweeps() {
        let (pool, file, _tmp) = new_handle(64, 2);
        let (p1, g1) = pool.alloc(file).unwrap();
        let (p2, g2) = pool.alloc(file).unwrap();

        let g1b = pool.read(file, p1).unwrap();
        g1b.release(false).unwrap();
        let g2b = pool.read(file, p2).unwrap();
        g2b.release(false).unwrap();

        assert!(matches!(pool.alloc(file), Err(BpError::AllFramesPinned)));
        assert_eq!(pool.0.borrow().last_sweep_visits, 4);

        g1.release(false).unwrap();
        g2.release(false).unwrap();
    }

    #[test]
    fn drop_flushes_dirty_pages_without_explicit_shutdown() {
        let tmp = NamedTempFile::new().unwrap();
        let page_no;
        {
            let pool = BufferPoolHandle::new(Config::new(64, 2));
            let store = FilePageStore::open(tmp.path(), 64, true).unwrap();
            let file = pool.register_file(Box::new(store));
            let (pn, mut guard) = pool.alloc(file).unwrap();
            page_no = pn;
            guard.bytes_mut()[0] = 0xCD;
            guard.mark_dirty();
            guard.release(true).unwrap();
            // `pool` drops here, its sole `Rc` reaches zero, and
            // `BufferPool::drop` must write the dirty frame back without
            // anyone calling `shutdown()` explicitly.
        }

        let mut reopened = FilePageStore::open(tmp.path(), 64, false).unwrap();
        let bytes = reopened.read_page(page_no).unwrap();
        assert_eq!(bytes[0], 0xCD);
    }
}
