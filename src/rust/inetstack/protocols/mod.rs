// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod tcp;

use ::std::{
    net::IpAddr,
    slice::ChunksExact,
};

/// IP protocol number of TCP.
pub const IPPROTO_TCP: u8 = 6;

/// Computes the generic checksum of a bytes array.
///
/// This iterates all 16-bit array elements, summing the values into a 32-bit variable. An odd trailing octet is padded
/// with zero. The running sum may be seeded with `start`.
pub fn compute_generic_checksum(buf: &[u8], start: Option<u32>) -> u32 {
    let mut state: u32 = match start {
        Some(state) => state,
        None => 0xFFFF,
    };

    let mut chunks_iter: ChunksExact<u8> = buf.chunks_exact(2);
    for chunk in chunks_iter.by_ref() {
        state = fold32(state + u16::from_be_bytes([chunk[0], chunk[1]]) as u32);
    }

    if let Some(&b) = chunks_iter.remainder().first() {
        state = fold32(state + u16::from_be_bytes([b, 0]) as u32);
    }

    state
}

/// Sums the TCP/UDP pseudo header for `src`, `dst` and a transport length. Mixed address families are summed as they
/// come, which never matches a valid checksum.
pub fn pseudo_header_checksum(src: IpAddr, dst: IpAddr, protocol: u8, length: u32) -> u32 {
    let mut state: u32 = 0xFFFF;
    for addr in [src, dst] {
        state = match addr {
            IpAddr::V4(addr) => compute_generic_checksum(&addr.octets(), Some(state)),
            IpAddr::V6(addr) => compute_generic_checksum(&addr.octets(), Some(state)),
        };
    }
    state = compute_generic_checksum(&[0, protocol], Some(state));
    compute_generic_checksum(&length.to_be_bytes(), Some(state))
}

/// Folds 32-bit sum into 16-bit checksum value.
pub fn fold16(mut state: u32) -> u16 {
    while state > 0xFFFF {
        state -= 0xFFFF;
    }
    !state as u16
}

/// Keeps a running sum from growing past 17 bits.
fn fold32(state: u32) -> u32 {
    (state & 0xFFFF) + (state >> 16)
}
