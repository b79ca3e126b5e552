// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        segment::MAX_TCP_OPTIONS_SIZE,
        SeqNumber,
    },
    runtime::{
        fail::Fail,
        network::consts::TCP_MAX_WINSHIFT,
    },
};
use ::arrayvec::ArrayVec;
use ::libc::EBADMSG;

//======================================================================================================================
// Constants
//======================================================================================================================

pub const TCPOPT_EOL: u8 = 0;
pub const TCPOPT_NOP: u8 = 1;
pub const TCPOPT_MAXSEG: u8 = 2;
pub const TCPOPT_WINDOW: u8 = 3;
pub const TCPOPT_SACK_PERMITTED: u8 = 4;
pub const TCPOPT_SACK: u8 = 5;
pub const TCPOPT_TIMESTAMP: u8 = 8;
pub const TCPOPT_SIGNATURE: u8 = 19;

pub const TCPOLEN_MAXSEG: u8 = 4;
pub const TCPOLEN_WINDOW: u8 = 3;
pub const TCPOLEN_SACK_PERMITTED: u8 = 2;
pub const TCPOLEN_TIMESTAMP: u8 = 10;
pub const TCPOLEN_SIGNATURE: u8 = 18;

/// Length of an MD5 signature digest.
pub const TCP_SIGLEN: usize = 16;

/// A SACK option never carries more than this many blocks in 40 bytes of option space.
pub const MAX_SACK_BLOCKS: usize = 4;

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp {
    pub val: u32,
    pub ecr: u32,
}

/// A block of out-of-order data reported by the peer, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SackBlock {
    pub start: SeqNumber,
    pub end: SeqNumber,
}

/// Options found on one segment.
///
/// MSS, window scale and SACK-permitted are only collected when the segment is allowed to negotiate them (a SYN
/// arriving before we have received one); otherwise they are skipped like unknown options. Timestamps, SACK blocks and
/// the signature are always collected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TcpOptionInfo {
    pub maxseg: Option<u16>,
    /// Requested window shift, already clamped to the protocol maximum.
    pub window_scale: Option<u8>,
    pub sack_permitted: bool,
    pub timestamp: Option<Timestamp>,
    pub sack_blocks: ArrayVec<SackBlock, MAX_SACK_BLOCKS>,
    pub signature: Option<[u8; TCP_SIGLEN]>,
}

/// Writes options into a header's option space, in wire layout.
#[derive(Debug, Default)]
pub struct OptionWriter {
    buf: ArrayVec<u8, MAX_TCP_OPTIONS_SIZE>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TcpOptionInfo {
    /// Walks the option list. Malformed lengths end the walk and malformed individual options are skipped. The only
    /// failure is two signature options that disagree.
    pub fn parse(mut options: &[u8], negotiable: bool) -> Result<Self, Fail> {
        let mut info: TcpOptionInfo = TcpOptionInfo::default();
        while let Some(&kind) = options.first() {
            if kind == TCPOPT_EOL {
                break;
            }
            let optlen: usize = if kind == TCPOPT_NOP {
                1
            } else {
                if options.len() < 2 {
                    break;
                }
                let optlen: usize = options[1] as usize;
                if optlen < 2 || optlen > options.len() {
                    break;
                }
                optlen
            };
            let (option, rest): (&[u8], &[u8]) = options.split_at(optlen);
            options = rest;

            match kind {
                TCPOPT_MAXSEG if negotiable && optlen == TCPOLEN_MAXSEG as usize => {
                    info.maxseg = Some(u16::from_be_bytes([option[2], option[3]]));
                },
                TCPOPT_WINDOW if negotiable && optlen == TCPOLEN_WINDOW as usize => {
                    let mut shift: u8 = option[2];
                    if shift > TCP_MAX_WINSHIFT {
                        error!("invalid window scale {}, assuming {}", shift, TCP_MAX_WINSHIFT);
                        shift = TCP_MAX_WINSHIFT;
                    }
                    info.window_scale = Some(shift);
                },
                TCPOPT_SACK_PERMITTED if negotiable && optlen == TCPOLEN_SACK_PERMITTED as usize => {
                    info.sack_permitted = true;
                },
                TCPOPT_TIMESTAMP if optlen == TCPOLEN_TIMESTAMP as usize => {
                    info.timestamp = Some(Timestamp {
                        val: u32::from_be_bytes([option[2], option[3], option[4], option[5]]),
                        ecr: u32::from_be_bytes([option[6], option[7], option[8], option[9]]),
                    });
                },
                TCPOPT_SACK if optlen > 2 && (optlen - 2) % 8 == 0 => {
                    for block in option[2..].chunks_exact(8) {
                        if info.sack_blocks.is_full() {
                            break;
                        }
                        info.sack_blocks.push(SackBlock {
                            start: SeqNumber::from(u32::from_be_bytes([block[0], block[1], block[2], block[3]])),
                            end: SeqNumber::from(u32::from_be_bytes([block[4], block[5], block[6], block[7]])),
                        });
                    }
                },
                TCPOPT_SIGNATURE if optlen == TCPOLEN_SIGNATURE as usize => {
                    let mut digest: [u8; TCP_SIGLEN] = [0; TCP_SIGLEN];
                    digest.copy_from_slice(&option[2..]);
                    if info.signature.is_some_and(|previous| previous != digest) {
                        return Err(Fail::new(EBADMSG, "conflicting signature options"));
                    }
                    info.signature = Some(digest);
                },
                _ => (),
            }
        }
        Ok(info)
    }
}

impl OptionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maxseg(mut self, mss: u16) -> Self {
        self.buf.extend([TCPOPT_MAXSEG, TCPOLEN_MAXSEG]);
        self.buf.extend(mss.to_be_bytes());
        self
    }

    /// Window scale, preceded by a NOP to keep the next option aligned.
    pub fn window_scale(mut self, shift: u8) -> Self {
        self.buf.extend([TCPOPT_NOP, TCPOPT_WINDOW, TCPOLEN_WINDOW, shift]);
        self
    }

    /// Timestamps in the layout of RFC 1323 appendix A.
    pub fn timestamp(mut self, val: u32, ecr: u32) -> Self {
        self.buf.extend([TCPOPT_NOP, TCPOPT_NOP, TCPOPT_TIMESTAMP, TCPOLEN_TIMESTAMP]);
        self.buf.extend(val.to_be_bytes());
        self.buf.extend(ecr.to_be_bytes());
        self
    }

    pub fn sack_permitted(mut self) -> Self {
        self.buf.extend([TCPOPT_SACK_PERMITTED, TCPOLEN_SACK_PERMITTED, TCPOPT_NOP, TCPOPT_NOP]);
        self
    }

    pub fn sack(mut self, blocks: &[SackBlock]) -> Self {
        let blocks: &[SackBlock] = &blocks[..blocks.len().min(MAX_SACK_BLOCKS)];
        self.buf.extend([TCPOPT_NOP, TCPOPT_NOP, TCPOPT_SACK, (2 + 8 * blocks.len()) as u8]);
        for block in blocks {
            self.buf.extend(u32::from(block.start).to_be_bytes());
            self.buf.extend(u32::from(block.end).to_be_bytes());
        }
        self
    }

    /// Signature option with the digest zeroed, followed by NOP and EOL.
    pub fn signature_space(mut self) -> Self {
        self.buf.extend([TCPOPT_SIGNATURE, TCPOLEN_SIGNATURE]);
        self.buf.extend([0; TCP_SIGLEN]);
        self.buf.extend([TCPOPT_NOP, TCPOPT_EOL]);
        self
    }

    /// Space left for further options.
    pub fn remaining(&self) -> usize {
        self.buf.remaining_capacity()
    }

    pub fn finish(self) -> ArrayVec<u8, MAX_TCP_OPTIONS_SIZE> {
        self.buf
    }
}

/// Offset of the signature digest inside option bytes produced by [OptionWriter], if any.
pub fn signature_offset(options: &[u8]) -> Option<usize> {
    let mut offset: usize = 0;
    while offset < options.len() {
        match options[offset] {
            TCPOPT_EOL => return None,
            TCPOPT_NOP => offset += 1,
            kind => {
                let optlen: usize = *options.get(offset + 1)? as usize;
                if optlen < 2 {
                    return None;
                }
                if kind == TCPOPT_SIGNATURE && optlen == TCPOLEN_SIGNATURE as usize {
                    return Some(offset + 2);
                }
                offset += optlen;
            },
        }
    }
    None
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
