// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::{
    inetstack::protocols::{
        compute_generic_checksum,
        fold16,
        pseudo_header_checksum,
        tcp::SeqNumber,
        IPPROTO_TCP,
    },
    runtime::fail::Fail,
};
use ::arrayvec::ArrayVec;
use ::libc::EBADMSG;
use ::std::net::{
    IpAddr,
    SocketAddr,
};

pub const MIN_TCP_HEADER_SIZE: usize = 20;
pub const MAX_TCP_HEADER_SIZE: usize = 60;
pub const MAX_TCP_OPTIONS_SIZE: usize = MAX_TCP_HEADER_SIZE - MIN_TCP_HEADER_SIZE;

/// Explicit congestion notification codepoint carried in the IP header (RFC 3168).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IpEcn {
    #[default]
    NotEct,
    Ect1,
    Ect0,
    Ce,
}

/// A demultiplexed, checksum-verified TCP segment along with the network-layer facts the engine needs.
#[derive(Clone, Debug)]
pub struct TcpSegment {
    /// Address of the sending peer.
    pub src: SocketAddr,
    /// Our address, as the segment was addressed.
    pub dst: SocketAddr,
    pub tcp_hdr: TcpHeader,
    pub data: Vec<u8>,
    /// ECN codepoint of the carrying IP packet.
    pub ecn: IpEcn,
    /// The frame arrived as link-layer broadcast or multicast.
    pub link_multicast: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_num: SeqNumber,
    pub ack_num: SeqNumber,

    // Octet 12: [ data offset in u32s (4 bits) ][ reserved zeros (3 bits) ] [ NS flag ]
    // The data offset is computed on the fly on serialization based on options.
    pub ns: bool,

    // Octet 13: [ CWR ] [ ECE ] [ URG ] [ ACK ] [ PSH ] [ RST ] [ SYN ] [ FIN ]
    pub cwr: bool,
    pub ece: bool,
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,

    pub window_size: u16,

    // We omit the checksum since it's checked when parsing and computed when serializing.
    pub urgent_pointer: u16,

    // Raw option bytes, padding included. Interpretation is left to the options module since it depends on connection
    // state.
    pub options: ArrayVec<u8, MAX_TCP_OPTIONS_SIZE>,
}

impl TcpSegment {
    /// Decodes a segment received from `src` and addressed to `dst.ip()`. The checksum is verified unless it was
    /// already checked by hardware.
    pub fn decode(src: IpAddr, dst: IpAddr, buf: &[u8], rx_checksum_offload: bool) -> Result<Self, Fail> {
        let pseudo: Option<(IpAddr, IpAddr)> = if rx_checksum_offload { None } else { Some((src, dst)) };
        let (tcp_hdr, data): (TcpHeader, &[u8]) = TcpHeader::parse(buf, pseudo)?;
        Ok(Self {
            src: SocketAddr::new(src, tcp_hdr.src_port),
            dst: SocketAddr::new(dst, tcp_hdr.dst_port),
            tcp_hdr,
            data: data.to_vec(),
            ecn: IpEcn::NotEct,
            link_multicast: false,
        })
    }

    /// Length of the data carried by this segment.
    pub fn tlen(&self) -> u32 {
        self.data.len() as u32
    }
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            ..Default::default()
        }
    }

    /// Parses a TCP header. When `pseudo` carries the source and destination addresses, the checksum is verified.
    pub fn parse(buf: &[u8], pseudo: Option<(IpAddr, IpAddr)>) -> Result<(Self, &[u8]), Fail> {
        if buf.len() < MIN_TCP_HEADER_SIZE {
            return Err(Fail::new(EBADMSG, "TCP segment too small"));
        }
        let data_offset: usize = (buf[12] >> 4) as usize * 4;
        if buf.len() < data_offset {
            return Err(Fail::new(EBADMSG, "TCP segment smaller than data offset"));
        }
        if data_offset < MIN_TCP_HEADER_SIZE {
            return Err(Fail::new(EBADMSG, "TCP data offset too small"));
        }
        let (hdr_buf, data_buf): (&[u8], &[u8]) = buf.split_at(data_offset);

        if let Some((src, dst)) = pseudo {
            if tcp_checksum(src, dst, hdr_buf, data_buf) != 0 {
                return Err(Fail::new(EBADMSG, "TCP checksum mismatch"));
            }
        }

        let mut options: ArrayVec<u8, MAX_TCP_OPTIONS_SIZE> = ArrayVec::new();
        // Data offset is a 4-bit field, so options never exceed the maximum.
        options
            .try_extend_from_slice(&hdr_buf[MIN_TCP_HEADER_SIZE..])
            .map_err(|_| Fail::new(EBADMSG, "TCP data offset too large"))?;

        let header: TcpHeader = Self {
            src_port: u16::from_be_bytes([hdr_buf[0], hdr_buf[1]]),
            dst_port: u16::from_be_bytes([hdr_buf[2], hdr_buf[3]]),
            seq_num: SeqNumber::from(u32::from_be_bytes([hdr_buf[4], hdr_buf[5], hdr_buf[6], hdr_buf[7]])),
            ack_num: SeqNumber::from(u32::from_be_bytes([hdr_buf[8], hdr_buf[9], hdr_buf[10], hdr_buf[11]])),
            ns: (hdr_buf[12] & 1) != 0,
            cwr: (hdr_buf[13] & (1 << 7)) != 0,
            ece: (hdr_buf[13] & (1 << 6)) != 0,
            urg: (hdr_buf[13] & (1 << 5)) != 0,
            ack: (hdr_buf[13] & (1 << 4)) != 0,
            psh: (hdr_buf[13] & (1 << 3)) != 0,
            rst: (hdr_buf[13] & (1 << 2)) != 0,
            syn: (hdr_buf[13] & (1 << 1)) != 0,
            fin: (hdr_buf[13] & (1 << 0)) != 0,
            window_size: u16::from_be_bytes([hdr_buf[14], hdr_buf[15]]),
            urgent_pointer: u16::from_be_bytes([hdr_buf[18], hdr_buf[19]]),
            options,
        };
        Ok((header, data_buf))
    }

    /// Writes the fixed 20-byte part of the header with a zero checksum.
    pub fn serialize_fixed(&self) -> [u8; MIN_TCP_HEADER_SIZE] {
        let mut fixed_buf: [u8; MIN_TCP_HEADER_SIZE] = [0; MIN_TCP_HEADER_SIZE];
        fixed_buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        fixed_buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        fixed_buf[4..8].copy_from_slice(&u32::from(self.seq_num).to_be_bytes());
        fixed_buf[8..12].copy_from_slice(&u32::from(self.ack_num).to_be_bytes());
        fixed_buf[12] = ((self.compute_size() / 4) as u8) << 4;
        if self.ns {
            fixed_buf[12] |= 1;
        }
        fixed_buf[13] = self.flags_byte();
        fixed_buf[14..16].copy_from_slice(&self.window_size.to_be_bytes());
        fixed_buf[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());
        fixed_buf
    }

    /// Serializes the header into `buf`, computing the checksum over the pseudo header of `src` and `dst`. Returns the
    /// number of bytes written.
    pub fn serialize(&self, buf: &mut [u8], src: IpAddr, dst: IpAddr, data: &[u8]) -> Result<usize, Fail> {
        let size: usize = self.compute_size();
        if buf.len() < size {
            return Err(Fail::new(libc::ENOBUFS, "buffer too small for TCP header"));
        }
        buf[..MIN_TCP_HEADER_SIZE].copy_from_slice(&self.serialize_fixed());
        let options_end: usize = MIN_TCP_HEADER_SIZE + self.options.len();
        buf[MIN_TCP_HEADER_SIZE..options_end].copy_from_slice(&self.options);
        // Zero out the remainder of padding in the header.
        for byte in &mut buf[options_end..size] {
            *byte = 0;
        }
        let checksum: u16 = tcp_checksum(src, dst, &buf[..size], data);
        buf[16..18].copy_from_slice(&checksum.to_be_bytes());
        Ok(size)
    }

    pub fn compute_size(&self) -> usize {
        // Round up to the next multiple of 4 so the TCP data is always 32 bit aligned.
        (MIN_TCP_HEADER_SIZE + self.options.len() + 3) & !0x3
    }

    fn flags_byte(&self) -> u8 {
        let mut flags: u8 = 0;
        for (set, bit) in [
            (self.fin, 0),
            (self.syn, 1),
            (self.rst, 2),
            (self.psh, 3),
            (self.ack, 4),
            (self.urg, 5),
            (self.ece, 6),
            (self.cwr, 7),
        ] {
            if set {
                flags |= 1 << bit;
            }
        }
        flags
    }
}

/// Computes the TCP checksum of `header` and `data`. Over a received segment whose checksum is intact this yields zero.
pub fn tcp_checksum(src: IpAddr, dst: IpAddr, header: &[u8], data: &[u8]) -> u16 {
    let length: u32 = (header.len() + data.len()) as u32;
    let mut state: u32 = pseudo_header_checksum(src, dst, IPPROTO_TCP, length);
    state = compute_generic_checksum(header, Some(state));
    // The header is always an even number of bytes, so the data continues on a 16-bit boundary.
    state = compute_generic_checksum(data, Some(state));
    match fold16(state) {
        // A valid checksum sums to all ones, whose complement may come out as either zero representation.
        0xFFFF => 0,
        checksum => checksum,
    }
}
