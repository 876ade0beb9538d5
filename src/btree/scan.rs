//! Range-scan operators and the per-index scan session. Exactly one scan
//! may be open at a time per `BTreeIndex`; the state here lives as a field
//! of the index handle rather than any process-wide singleton.

use crate::buffer::PageGuard;
use crate::storage::page_store::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

pub(crate) struct ScanState {
    pub executing: bool,
    pub lo: i32,
    pub hi: i32,
    pub current_page_no: PageId,
    pub current_guard: Option<PageGuard>,
    pub next_entry: usize,
}

impl ScanState {
    pub fn inactive() -> Self {
        Self {
            executing: false,
            lo: 0,
            hi: 0,
            current_page_no: 0,
            current_guard: None,
            next_entry: 0,
        }
    }
}
