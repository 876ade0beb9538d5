//! Error taxonomy shared by the buffer pool and the B+ tree index.
//!
//! A single enum rather than per-module `thiserror`-derived types, with
//! manual `Display`/`Error` impls matching the `SimpleError` idiom this
//! crate grew out of.

use std::fmt;

#[derive(Debug)]
pub enum BpError {
    /// The clock sweep completed two full passes without finding an
    /// unpinned frame to evict.
    AllFramesPinned,
    /// `unpin` called on a page whose pin count was already zero.
    PageNotPinned,
    /// `flush_file`/`shutdown` found a frame belonging to the file still
    /// pinned.
    PagePinned,
    /// A frame descriptor was in an inconsistent state during flush.
    BadBuffer,
    /// Reopening an index found a meta page that does not describe the
    /// relation/attribute/type the caller asked for.
    BadIndexInfo(String),
    /// `start_scan` was given a non-canonicalizable range (`low > high`
    /// after inclusive-bound canonicalization).
    BadScanRange,
    /// `start_scan` was given operators that are not `{GT,GTE}` on the low
    /// side and `{LT,LTE}` on the high side.
    BadOpcodes,
    /// `scan_next`/`end_scan` called without an active scan.
    ScanNotInitialized,
    /// `scan_next` called after the scan has already been exhausted.
    IndexScanCompleted,
    /// A heap scan ran out of records; expected during index build.
    EndOfFile,
    /// Propagated I/O failure from the storage layer.
    Io(std::io::Error),
}

impl fmt::Display for BpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BpError::AllFramesPinned => {
                write!(f, "all buffer frames are pinned; cannot evict a victim")
            }
            BpError::PageNotPinned => write!(f, "unpin called on a page with pin count zero"),
            BpError::PagePinned => write!(f, "page still pinned during flush"),
            BpError::BadBuffer => write!(f, "inconsistent buffer frame state during flush"),
            BpError::BadIndexInfo(msg) => write!(f, "bad index info: {}", msg),
            BpError::BadScanRange => write!(f, "scan range is empty after canonicalization"),
            BpError::BadOpcodes => write!(f, "scan operators are not a valid low/high pair"),
            BpError::ScanNotInitialized => write!(f, "no scan is currently active"),
            BpError::IndexScanCompleted => write!(f, "scan has no more entries"),
            BpError::EndOfFile => write!(f, "end of file"),
            BpError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for BpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BpError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BpError {
    fn from(e: std::io::Error) -> Self {
        BpError::Io(e)
    }
}

pub type BpResult<T> = Result<T, BpError>;
