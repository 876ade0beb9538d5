//! Fixed-width integer encode/decode helpers used by the on-disk page
//! layouts. Mirrors `utils::serialize` from the codebase this crate grew
//! out of (big-endian, no external byteorder dependency).

pub fn write_u32(out: &mut [u8], v: u32) {
    out[0..4].copy_from_slice(&v.to_be_bytes());
}

pub fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn write_i32(out: &mut [u8], v: i32) {
    out[0..4].copy_from_slice(&v.to_be_bytes());
}

pub fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
