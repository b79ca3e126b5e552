// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// TCP MD5 signature option (RFC 2385).

use crate::{
    inetstack::protocols::{
        tcp::{
            options::{
                TcpOptionInfo,
                TCP_SIGLEN,
            },
            segment::{
                TcpHeader,
                TcpSegment,
            },
            stats::{
                TcpStat,
                TcpStats,
            },
        },
        IPPROTO_TCP,
    },
    runtime::fail::Fail,
};
use ::libc::EPERM;
use ::md5::{
    Digest,
    Md5,
};
use ::std::net::{
    IpAddr,
    SocketAddr,
};

/// Source of signature keys, one per address pair.
pub trait SignatureKeys: Send + Sync {
    fn lookup(&self, local: &SocketAddr, remote: &SocketAddr) -> Option<Vec<u8>>;
}

/// Computes the digest of a segment sent from `src` to `dst`.
pub fn compute(src: IpAddr, dst: IpAddr, header: &TcpHeader, data: &[u8], key: &[u8]) -> [u8; TCP_SIGLEN] {
    let mut hasher: Md5 = Md5::new();
    let length: usize = header.compute_size() + data.len();
    match (src, dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            hasher.update(src.octets());
            hasher.update(dst.octets());
            hasher.update([0, IPPROTO_TCP]);
            hasher.update((length as u16).to_be_bytes());
        },
        _ => {
            hasher.update(to_v6_octets(src));
            hasher.update(to_v6_octets(dst));
            hasher.update((length as u32).to_be_bytes());
            hasher.update([0, 0, 0, IPPROTO_TCP]);
        },
    }
    hasher.update(header.serialize_fixed());
    hasher.update(data);
    hasher.update(key);
    let mut digest: [u8; TCP_SIGLEN] = [0; TCP_SIGLEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Checks the signature carried by `seg` against the connection's negotiated state. `negotiated` is whether the
/// connection (or listener) requires signed segments.
pub fn verify(
    info: &TcpOptionInfo,
    negotiated: bool,
    seg: &TcpSegment,
    keys: Option<&dyn SignatureKeys>,
    stats: &TcpStats,
) -> Result<(), Fail> {
    let received: [u8; TCP_SIGLEN] = match (info.signature, negotiated) {
        (None, false) => return Ok(()),
        (Some(received), true) => received,
        (None, true) => return Err(Fail::new(EPERM, "missing signature")),
        (Some(_), false) => return Err(Fail::new(EPERM, "unexpected signature")),
    };
    let key: Vec<u8> = match keys.and_then(|keys| keys.lookup(&seg.dst, &seg.src)) {
        Some(key) => key,
        None => return Err(Fail::new(EPERM, "no signature key for peer")),
    };
    let expected: [u8; TCP_SIGLEN] = compute(seg.src.ip(), seg.dst.ip(), &seg.tcp_hdr, &seg.data, &key);
    // Fold every byte so the comparison does not stop at the first difference.
    let difference: u8 = expected
        .iter()
        .zip(received.iter())
        .fold(0, |acc, (a, b)| acc | (a ^ b));
    if difference != 0 {
        stats.inc(TcpStat::BadSig);
        warn!("bad signature from {}", seg.src);
        return Err(Fail::new(EPERM, "signature mismatch"));
    }
    stats.inc(TcpStat::GoodSig);
    Ok(())
}

fn to_v6_octets(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(addr) => addr.to_ipv6_mapped().octets(),
        IpAddr::V6(addr) => addr.octets(),
    }
}
