//! `PageGuard`: a scoped page handle, in place of manual "unpin on every
//! return path" discipline. Acquires its pin at construction (via
//! `BufferPoolHandle::read`/`alloc`) and releases it on drop unless
//! `release` already did.

use std::cell::{Ref, RefMut};
use std::rc::Rc;

use log::warn;

use super::pool::{BufferPool, FileId};
use crate::error::BpResult;
use crate::storage::page_store::PageId;
use std::cell::RefCell;

pub struct PageGuard {
    pool: Rc<RefCell<BufferPool>>,
    file: FileId,
    page_no: PageId,
    frame_idx: usize,
    dirtied: bool,
    released: bool,
}

impl PageGuard {
    pub(crate) fn new(pool: Rc<RefCell<BufferPool>>, file: FileId, page_no: PageId, frame_idx: usize) -> Self {
        Self {
            pool,
            file,
            page_no,
            frame_idx,
            dirtied: false,
            released: false,
        }
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn page_no(&self) -> PageId {
        self.page_no
    }

    pub fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.pool.borrow(), |bp| bp.frame_bytes(self.frame_idx))
    }

    pub fn bytes_mut(&mut self) -> RefMut<'_, [u8]> {
        RefMut::map(self.pool.borrow_mut(), |bp| bp.frame_bytes_mut(self.frame_idx))
    }

    /// Marks the page dirty. Must be called explicitly after any write
    /// through `bytes_mut` that should survive eviction/flush.
    pub fn mark_dirty(&mut self) {
        self.dirtied = true;
    }

    /// Unpins the page now, ORing `became_dirty` into whatever `mark_dirty`
    /// already recorded, and suppresses the destructor's unpin.
    pub fn release(mut self, became_dirty: bool) -> BpResult<()> {
        self.dirtied |= became_dirty;
        self.released = true;
        self.pool.borrow_mut().unpin(self.file, self.page_no, self.dirtied)
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.pool.try_borrow_mut() {
            Ok(mut bp) => {
                if let Err(e) = bp.unpin(self.file, self.page_no, self.dirtied) {
                    warn!("unpin on drop failed for page {}:{}: {}", self.file, self.page_no, e);
                }
            }
            Err(_) => {
                warn!(
                    "page guard for {}:{} dropped while the buffer pool was already borrowed; pin leaked",
                    self.file, self.page_no
                );
            }
        }
    }
}
