// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of slow-clock ticks per second. All protocol timers and timestamps are expressed in these ticks.
pub const SLOW_HZ: u64 = 2;

/// Fallback MSS Parameter for TCP (RFC 879).
pub const FALLBACK_MSS: usize = 536;

/// Minimum MSS Parameter for TCP
pub const MIN_MSS: usize = FALLBACK_MSS;

/// Maximum MSS Parameter for TCP
pub const MAX_MSS: usize = u16::MAX as usize;

/// Default MSS advertised on our SYN and SYN+ACK segments.
pub const DEFAULT_MSS: usize = 1460;

/// Largest unscaled window.
pub const TCP_MAXWIN: u32 = 65535;

/// Largest window scale shift (RFC 1323).
pub const TCP_MAX_WINSHIFT: u8 = 14;

/// Window scale value recorded when no scaling was negotiated.
pub const TCP_NO_WINSHIFT: u8 = 15;

/// Maximum segment lifetime.
pub const TCPTV_MSL: u64 = 30 * SLOW_HZ;

/// Default round-trip time used before a sample is available.
pub const TCPTV_SRTTDFLT: u64 = 3 * SLOW_HZ;

/// Minimum retransmission timeout.
pub const TCPTV_MIN: u64 = SLOW_HZ;

/// Maximum retransmission timeout.
pub const TCPTV_REXMTMAX: u64 = 64 * SLOW_HZ;

/// Time allowed for a connection to be established.
pub const TCPTV_KEEP_INIT: u64 = 75 * SLOW_HZ;

/// Idle time before the first keep-alive probe.
pub const TCPTV_KEEP_IDLE: u64 = 120 * 60 * SLOW_HZ;

/// Delay applied to acknowledgements of in-order data.
pub const TCPTV_DELACK: u64 = 1;

/// Maximum number of retransmissions.
pub const TCP_MAXRXTSHIFT: u32 = 12;

/// Retransmission back-off multipliers, indexed by the retransmission count.
pub const TCP_BACKOFF: [u64; TCP_MAXRXTSHIFT as usize + 1] = [1, 2, 4, 8, 16, 32, 64, 64, 64, 64, 64, 64, 64];

/// Timestamps older than this (24 days) no longer protect against wrapped sequence numbers.
pub const TCP_PAWS_IDLE: u64 = 24 * 24 * 60 * 60 * SLOW_HZ;

/// Upper bound on the initial window for each initial window size in segments (RFC 3390).
pub const TCP_INIT_WIN_MAX: [u32; 11] = [1460, 1460, 2920, 2920, 4380, 7300, 8760, 10220, 11680, 13140, 14600];

/// Number of duplicate acknowledgements that triggers a fast retransmit.
pub const TCP_REXMT_THRESH: u32 = 3;

/// Default limit on the bytes a socket buffer may hold.
pub const SB_MAX: u32 = 256 * 1024;
