//! Network byte-order helpers for the frame codec.
//!
//! Every length on the wire is a big-endian `u32`. Keeping the conversions
//! here scopes the lint expectation to the two places that need it.

/// Width of every length prefix on the wire.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use courier::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x0000_0102), [0x00, 0x00, 0x01, 0x02]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use courier::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x00, 0x00, 0x01, 0x02]), 258);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}

/// Read the length prefix at the front of `buf` without consuming it.
///
/// Returns `None` while fewer than [`LENGTH_PREFIX_SIZE`] bytes are present.
#[must_use]
pub fn peek_network_u32(buf: &[u8]) -> Option<u32> {
    buf.get(..LENGTH_PREFIX_SIZE)
        .and_then(|slice| <[u8; LENGTH_PREFIX_SIZE]>::try_from(slice).ok())
        .map(read_network_u32)
}
