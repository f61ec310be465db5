
use bytemuck::{cast_slice, pod_read_unaligned};

// Images are stored as host-order 16-bit words.
pub fn as_byte_slice(input: &[u16]) -> &[u8] {
    cast_slice(input)
}

// A trailing odd byte is dropped.
pub fn words_from_bytes(input: &[u8]) -> Vec<u16> {
    input.chunks_exact(2).map(pod_read_unaligned::<u16>).collect()
}
