//! `IndexMetaInfo`: the fixed-layout first page of an index file. Holds
//! the base-relation name, the indexed attribute's byte offset and type,
//! the current root page number, and whether that root is currently a
//! leaf. That last field is needed because a root page carries no on-disk
//! type tag of its own and a freshly reopened index must still be able to
//! tell (see `DESIGN.md`).

use crate::bytes::{read_i32, read_u32, write_i32, write_u32};
use crate::storage::page_store::PageId;

const RELATION_NAME_BYTES: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Int,
}

impl AttrType {
    fn to_tag(self) -> u32 {
        match self {
            AttrType::Int => 0,
        }
    }

    fn from_tag(_tag: u32) -> Self {
        // Only one attribute type is supported today; the tag exists so a
        // future type doesn't need a format change.
        AttrType::Int
    }
}

#[derive(Debug, Clone)]
pub struct IndexMetaInfo {
    pub relation_name: String,
    pub attr_byte_offset: i32,
    pub attr_type: AttrType,
    pub root_page_no: PageId,
    pub root_is_leaf: bool,
}

impl IndexMetaInfo {
    pub fn encoded_len() -> usize {
        RELATION_NAME_BYTES + 4 + 4 + 4 + 4
    }

    pub fn encode(&self, out: &mut [u8]) {
        let name_bytes = self.relation_name.as_bytes();
        assert!(
            name_bytes.len() < RELATION_NAME_BYTES,
            "relation name too long for meta page"
        );
        out[0..RELATION_NAME_BYTES].fill(0);
        out[0..name_bytes.len()].copy_from_slice(name_bytes);

        let mut off = RELATION_NAME_BYTES;
        write_i32(&mut out[off..off + 4], self.attr_byte_offset);
        off += 4;
        write_u32(&mut out[off..off + 4], self.attr_type.to_tag());
        off += 4;
        write_u32(&mut out[off..off + 4], self.root_page_no);
        off += 4;
        write_u32(&mut out[off..off + 4], self.root_is_leaf as u32);
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let name_end = bytes[0..RELATION_NAME_BYTES]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_BYTES);
        let relation_name = String::from_utf8_lossy(&bytes[0..name_end]).into_owned();

        let mut off = RELATION_NAME_BYTES;
        let attr_byte_offset = read_i32(&bytes[off..off + 4]);
        off += 4;
        let attr_type = AttrType::from_tag(read_u32(&bytes[off..off + 4]));
        off += 4;
        let root_page_no = read_u32(&bytes[off..off + 4]);
        off += 4;
        let root_is_leaf = read_u32(&bytes[off..off + 4]) != 0;

        Self {
            relation_name,
            attr_byte_offset,
            attr_type,
            root_page_no,
            root_is_leaf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let meta = IndexMetaInfo {
            relation_name: "orders".to_string(),
            attr_byte_offset: 12,
            attr_type: AttrType::Int,
            root_page_no: 7,
            root_is_leaf: false,
        };
        let mut buf = vec![0u8; IndexMetaInfo::encoded_len()];
        meta.encode(&mut buf);
        let back = IndexMetaInfo::decode(&buf);
        assert_eq!(back.relation_name, "orders");
        assert_eq!(back.attr_byte_offset, 12);
        assert_eq!(back.attr_type, AttrType::Int);
        assert_eq!(back.root_page_no, 7);
        assert!(!back.root_is_leaf);
    }
}
