//! The block storage layer: fixed-size pages addressed by a 1-based page
//! number within a single file. Consumed by the buffer pool; never touched
//! directly by the B+ tree index.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::BpResult;

pub type PageId = u32;

/// Page number zero is reserved and never assigned to a real page.
pub const NO_PAGE: PageId = 0;

pub trait PageStore {
    fn page_size(&self) -> usize;

    /// Page number of the first page in the file, or `NO_PAGE` if the file
    /// is empty. The meta page is always the first page of an index file.
    fn first_page_no(&self) -> PageId;

    fn read_page(&mut self, page_no: PageId) -> BpResult<Vec<u8>>;

    fn write_page(&mut self, page_no: PageId, bytes: &[u8]) -> BpResult<()>;

    /// Appends a new zero-filled page and returns its page number and
    /// contents.
    fn allocate_page(&mut self) -> BpResult<(PageId, Vec<u8>)>;

    /// Removes a page from the backing file's bookkeeping. Called
    /// unconditionally by `BufferPool::dispose`, whether or not the page
    /// was resident, matching the original buffer manager's contract.
    fn free_page(&mut self, page_no: PageId) -> BpResult<()>;
}

/// A `PageStore` backed by a single `std::fs::File`.
pub struct FilePageStore {
    file: File,
    page_size: usize,
    next_page_no: PageId,
}

impl FilePageStore {
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize, create: bool) -> BpResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)?;
        let len = file.metadata()?.len();
        let existing_pages = (len / page_size as u64) as u32;
        Ok(Self {
            file,
            page_size,
            next_page_no: existing_pages + 1,
        })
    }

    fn offset(&self, page_no: PageId) -> u64 {
        (page_no - 1) as u64 * self.page_size as u64
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn first_page_no(&self) -> PageId {
        if self.next_page_no > 1 {
            1
        } else {
            NO_PAGE
        }
    }

    fn read_page(&mut self, page_no: PageId) -> BpResult<Vec<u8>> {
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(self.offset(page_no)))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_page(&mut self, page_no: PageId, bytes: &[u8]) -> BpResult<()> {
        debug_assert_eq!(bytes.len(), self.page_size);
        self.file.seek(SeekFrom::Start(self.offset(page_no)))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn allocate_page(&mut self) -> BpResult<(PageId, Vec<u8>)> {
        let page_no = self.next_page_no;
        self.next_page_no += 1;
        let bytes = vec![0u8; self.page_size];
        self.write_page(page_no, &bytes)?;
        Ok((page_no, bytes))
    }

    fn free_page(&mut self, _page_no: PageId) -> BpResult<()> {
        // Pages are never physically reclaimed or reused by this store;
        // "freeing" is bookkeeping the original buffer manager forwards to
        // the file layer unconditionally, kept here for interface parity.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn allocate_then_read_back() {
        let tmp = NamedTempFile::new().unwrap();
        let mut store = FilePageStore::open(tmp.path(), 64, true).unwrap();
        assert_eq!(store.first_page_no(), NO_PAGE);

        let (page_no, mut bytes) = store.allocate_page().unwrap();
        assert_eq!(page_no, 1);
        assert_eq!(store.first_page_no(), 1);

        bytes[0] = 0xAB;
        store.write_page(page_no, &bytes).unwrap();
        let back = store.read_page(page_no).unwrap();
        assert_eq!(back[0], 0xAB);
    }

    #[test]
    fn reopen_resumes_next_page_no() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut store = FilePageStore::open(tmp.path(), 64, true).unwrap();
            store.allocate_page().unwrap();
            store.allocate_page().unwrap();
        }
        let mut reopened = FilePageStore::open(tmp.path(), 64, false).unwrap();
        let (page_no, _) = reopened.allocate_page().unwrap();
        assert_eq!(page_no, 3);
    }
}
