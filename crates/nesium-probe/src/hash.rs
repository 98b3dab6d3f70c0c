//! Framebuffer digest used for change detection.

/// 64-bit FNV offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
/// 64-bit FNV prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Folds a framebuffer of packed pixel words into an FNV-1a style digest.
///
/// Every word contributes its four bytes in little-endian order. The digest is
/// order dependent and only meant to tell frames apart, not to identify content.
pub fn frame_hash(words: &[u32]) -> u64 {
    words.iter().fold(FNV_OFFSET_BASIS, |hash, &word| {
        word.to_le_bytes().iter().fold(hash, |h, &byte| {
            (h ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
    })
}
