//! The heap-file layer: out of scope for this crate except as a scan
//! source to bulk-build an index from. `RecordId` is the value the B+ tree
//! stores as its payload; `HeapScan` is the interface the index's build
//! path drives. `HeapFile` is a minimal in-memory double good enough to
//! back tests and the build path without a real heap-file implementation.

use crate::error::{BpError, BpResult};
use crate::storage::page_store::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_no: PageId,
    pub slot_no: u32,
}

impl RecordId {
    pub fn new(page_no: PageId, slot_no: u32) -> Self {
        Self { page_no, slot_no }
    }

    /// The sentinel value stored in an unused leaf slot (`page_no == 0`).
    pub fn empty() -> Self {
        Self {
            page_no: 0,
            slot_no: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page_no == 0
    }
}

pub trait HeapScan {
    /// Advances to the next record, returning `Err(BpError::EndOfFile)`
    /// once exhausted.
    fn scan_next(&mut self) -> BpResult<RecordId>;

    fn record_bytes(&self, rid: RecordId) -> BpResult<Vec<u8>>;
}

/// A fixed-record-size, slotted-page heap, only as complete as the B+ tree
/// build path and tests need: append-only inserts and page-at-a-time scans.
pub struct HeapFile {
    record_size: usize,
    slots_per_page: usize,
    pages: Vec<Vec<Option<Vec<u8>>>>,
}

impl HeapFile {
    pub fn new(record_size: usize, page_size: usize) -> Self {
        let slots_per_page = (page_size / record_size).max(1);
        Self {
            record_size,
            slots_per_page,
            pages: Vec::new(),
        }
    }

    pub fn insert(&mut self, record: Vec<u8>) -> RecordId {
        assert_eq!(record.len(), self.record_size, "record size mismatch");
        if self.pages.is_empty() || self.pages.last().unwrap().len() >= self.slots_per_page {
            self.pages.push(Vec::new());
        }
        let page = self.pages.last_mut().unwrap();
        let slot_no = page.len() as u32;
        page.push(Some(record));
        RecordId::new(self.pages.len() as PageId, slot_no)
    }

    pub fn get(&self, rid: RecordId) -> Option<&[u8]> {
        self.pages
            .get((rid.page_no as usize).checked_sub(1)?)?
            .get(rid.slot_no as usize)?
            .as_deref()
    }

    pub fn scan(&self) -> HeapFileScan<'_> {
        HeapFileScan {
            file: self,
            page: 0,
            slot: 0,
        }
    }
}

pub struct HeapFileScan<'a> {
    file: &'a HeapFile,
    page: usize,
    slot: usize,
}

impl<'a> HeapScan for HeapFileScan<'a> {
    fn scan_next(&mut self) -> BpResult<RecordId> {
        loop {
            if self.page >= self.file.pages.len() {
                return Err(BpError::EndOfFile);
            }
            let page = &self.file.pages[self.page];
            if self.slot >= page.len() {
                self.page += 1;
                self.slot = 0;
                continue;
            }
            let rid = RecordId::new((self.page + 1) as PageId, self.slot as u32);
            self.slot += 1;
            return Ok(rid);
        }
    }

    fn record_bytes(&self, rid: RecordId) -> BpResult<Vec<u8>> {
        self.file
            .get(rid)
            .map(|b| b.to_vec())
            .ok_or_else(|| BpError::BadIndexInfo(format!("no such record {:?}", rid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_visits_every_inserted_record_in_order() {
        let mut heap = HeapFile::new(4, 16);
        let mut rids = Vec::new();
        for i in 0..10i32 {
            rids.push(heap.insert(i.to_be_bytes().to_vec()));
        }

        let mut scan = heap.scan();
        let mut seen = Vec::new();
        loop {
            match scan.scan_next() {
                Ok(rid) => seen.push(rid),
                Err(BpError::EndOfFile) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(seen, rids);
    }
}
