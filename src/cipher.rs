use crate::control::CancelToken;

/// Transform one data byte with one key byte.
///
/// A zero key byte is replaced by its bitwise complement before the XOR,
/// so no position ever passes through unchanged. The transform is its own
/// inverse: applying it twice with the same key byte restores the input.
#[inline]
pub fn transform_byte(data: u8, key: u8) -> u8 {
    let key = if key == 0 { !key } else { key };
    data ^ key
}

/// Transform a chunk of data against a key chunk, position-wise.
///
/// `key` must be at least as long as `source`; the caller is responsible
/// for having wrapped the key cyclically into a chunk of matching length.
/// The output replaces the contents of `dest`, reusing its allocation
/// across chunks. Blocks on `control` while paused, before any byte is
/// consumed.
pub fn transform_chunk(source: &[u8], key: &[u8], dest: &mut Vec<u8>, control: &CancelToken) {
    debug_assert!(key.len() >= source.len());
    control.wait_if_paused();
    dest.clear();
    dest.extend(source.iter().zip(key).map(|(&d, &k)| transform_byte(d, k)));
}
