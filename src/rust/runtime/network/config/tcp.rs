// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::network::consts::{
    DEFAULT_MSS,
    FALLBACK_MSS,
    MAX_MSS,
    MIN_MSS,
    SB_MAX,
    SLOW_HZ,
    TCPTV_DELACK,
    TCPTV_KEEP_IDLE,
    TCPTV_KEEP_INIT,
    TCPTV_MIN,
    TCPTV_MSL,
    TCP_INIT_WIN_MAX,
    TCP_PAWS_IDLE,
    TCP_REXMT_THRESH,
};

//==============================================================================
// Structures
//==============================================================================

/// TCP Configuration Descriptor
///
/// All durations are expressed in slow-clock ticks (see [crate::runtime::network::consts::SLOW_HZ]).
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Maximum Segment Size advertised on our SYN+ACKs.
    advertised_mss: usize,
    /// Maximum Segment Size assumed when the peer does not announce one.
    default_mss: usize,
    /// Initial congestion window (in segments) for remote peers.
    init_win: u32,
    /// Initial congestion window (in segments) for peers on a local network.
    init_win_local: u32,
    /// Time allowed for a handshake to complete.
    keep_init: u64,
    /// Idle time before keep-alive probing starts.
    keep_idle: u64,
    /// Idle time allowed in FIN_WAIT_2 once the socket cannot receive.
    max_idle: u64,
    /// Maximum segment lifetime.
    msl: u64,
    /// Minimum retransmission timeout.
    rtt_min: u64,
    /// Delay applied to acknowledgements of in-order data.
    ack_delay: u64,
    /// Number of duplicate acknowledgements that triggers a fast retransmit.
    rexmt_thresh: u32,
    /// Age after which a stale `ts_recent` is invalidated instead of failing PAWS.
    paws_idle: u64,
    /// Challenge ACKs allowed per second (negative means unlimited).
    ack_drop_ppslim: i32,
    /// Resets allowed per second (negative means unlimited).
    rst_ppslim: i32,
    /// Negotiate window scaling and timestamps (RFC 1323)?
    rfc1323: bool,
    /// Negotiate selective acknowledgements (RFC 2018)?
    sack: bool,
    /// Negotiate explicit congestion notification (RFC 3168)?
    ecn: bool,
    /// Acknowledge immediately on segments carrying PSH?
    ack_on_push: bool,
    /// Use appropriate byte counting (RFC 3465)?
    abc: bool,
    /// Allow an increase of two segments per ACK during slow start?
    abc_aggressive: bool,
    /// Upper bound on socket buffer sizes.
    sb_max: u32,
    /// Maximum number of entries held in a reassembly queue.
    reass_limit: usize,
    /// Name of the congestion control algorithm for new connections.
    congestion_control: String,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for TCP Configuration Descriptor
impl TcpConfig {
    /// Creates a TCP Configuration Descriptor.
    pub fn new(
        advertised_mss: Option<usize>,
        rfc1323: Option<bool>,
        sack: Option<bool>,
        ecn: Option<bool>,
        congestion_control: Option<&str>,
    ) -> Self {
        let mut options = Self::default();

        if let Some(value) = advertised_mss {
            options = options.set_advertised_mss(value);
        }
        if let Some(value) = rfc1323 {
            options = options.set_rfc1323(value);
        }
        if let Some(value) = sack {
            options = options.set_sack(value);
        }
        if let Some(value) = ecn {
            options = options.set_ecn(value);
        }
        if let Some(value) = congestion_control {
            options = options.set_congestion_control(value);
        }

        options
    }

    /// Gets the advertised maximum segment size in the target [TcpConfig].
    pub fn get_advertised_mss(&self) -> usize {
        self.advertised_mss
    }

    /// Gets the default (peer) maximum segment size in the target [TcpConfig].
    pub fn get_default_mss(&self) -> usize {
        self.default_mss
    }

    /// Gets the initial window in segments for remote peers in the target [TcpConfig].
    pub fn get_init_win(&self) -> u32 {
        self.init_win
    }

    /// Gets the initial window in segments for local peers in the target [TcpConfig].
    pub fn get_init_win_local(&self) -> u32 {
        self.init_win_local
    }

    /// Gets the connection establishment timeout in the target [TcpConfig].
    pub fn get_keep_init(&self) -> u64 {
        self.keep_init
    }

    /// Gets the keep-alive idle time in the target [TcpConfig].
    pub fn get_keep_idle(&self) -> u64 {
        self.keep_idle
    }

    /// Gets the FIN_WAIT_2 idle time in the target [TcpConfig].
    pub fn get_max_idle(&self) -> u64 {
        self.max_idle
    }

    /// Gets the maximum segment lifetime in the target [TcpConfig].
    pub fn get_msl(&self) -> u64 {
        self.msl
    }

    /// Gets the minimum retransmission timeout in the target [TcpConfig].
    pub fn get_rtt_min(&self) -> u64 {
        self.rtt_min
    }

    /// Gets the delayed acknowledgement timeout in the target [TcpConfig].
    pub fn get_ack_delay(&self) -> u64 {
        self.ack_delay
    }

    /// Gets the duplicate acknowledgement threshold in the target [TcpConfig].
    pub fn get_rexmt_thresh(&self) -> u32 {
        self.rexmt_thresh
    }

    /// Gets the PAWS idle limit in the target [TcpConfig].
    pub fn get_paws_idle(&self) -> u64 {
        self.paws_idle
    }

    /// Gets the challenge ACK rate limit in the target [TcpConfig].
    pub fn get_ack_drop_ppslim(&self) -> i32 {
        self.ack_drop_ppslim
    }

    /// Gets the RST rate limit in the target [TcpConfig].
    pub fn get_rst_ppslim(&self) -> i32 {
        self.rst_ppslim
    }

    pub fn get_rfc1323(&self) -> bool {
        self.rfc1323
    }

    pub fn get_sack(&self) -> bool {
        self.sack
    }

    pub fn get_ecn(&self) -> bool {
        self.ecn
    }

    pub fn get_ack_on_push(&self) -> bool {
        self.ack_on_push
    }

    pub fn get_abc(&self) -> bool {
        self.abc
    }

    pub fn get_abc_aggressive(&self) -> bool {
        self.abc_aggressive
    }

    /// Gets the socket buffer limit in the target [TcpConfig].
    pub fn get_sb_max(&self) -> u32 {
        self.sb_max
    }

    /// Gets the reassembly queue entry limit in the target [TcpConfig].
    pub fn get_reass_limit(&self) -> usize {
        self.reass_limit
    }

    /// Gets the congestion control algorithm name in the target [TcpConfig].
    pub fn get_congestion_control(&self) -> &str {
        &self.congestion_control
    }

    /// Computes the initial congestion window for a segment size (RFC 3390).
    pub fn initial_window(&self, segsz: u32, local: bool) -> u32 {
        let iw: u32 = if local { self.init_win_local } else { self.init_win };
        if iw == 0 {
            return segsz;
        }
        let cap: u32 = TCP_INIT_WIN_MAX[(iw as usize).min(TCP_INIT_WIN_MAX.len() - 1)];
        iw.saturating_mul(segsz).min(segsz.saturating_mul(2).max(cap))
    }

    /// Sets the advertised maximum segment size in the target [TcpConfig].
    pub fn set_advertised_mss(mut self, value: usize) -> Self {
        assert!(value >= MIN_MSS);
        assert!(value <= MAX_MSS);
        self.advertised_mss = value;
        self
    }

    /// Sets the default (peer) maximum segment size in the target [TcpConfig].
    pub fn set_default_mss(mut self, value: usize) -> Self {
        assert!(value > 0 && value <= MAX_MSS);
        self.default_mss = value;
        self
    }

    /// Sets the initial windows (remote and local) in the target [TcpConfig].
    pub fn set_init_win(mut self, remote: u32, local: u32) -> Self {
        assert!(remote > 0 && local > 0);
        self.init_win = remote;
        self.init_win_local = local;
        self
    }

    /// Sets the connection establishment timeout in the target [TcpConfig].
    pub fn set_keep_init(mut self, value: u64) -> Self {
        assert!(value > 0);
        self.keep_init = value;
        self
    }

    pub fn set_keep_idle(mut self, value: u64) -> Self {
        assert!(value > 0);
        self.keep_idle = value;
        self
    }

    pub fn set_max_idle(mut self, value: u64) -> Self {
        assert!(value > 0);
        self.max_idle = value;
        self
    }

    pub fn set_msl(mut self, value: u64) -> Self {
        assert!(value > 0);
        self.msl = value;
        self
    }

    pub fn set_rtt_min(mut self, value: u64) -> Self {
        assert!(value > 0);
        self.rtt_min = value;
        self
    }

    pub fn set_ack_delay(mut self, value: u64) -> Self {
        assert!(value > 0);
        self.ack_delay = value;
        self
    }

    pub fn set_rexmt_thresh(mut self, value: u32) -> Self {
        assert!(value > 0);
        self.rexmt_thresh = value;
        self
    }

    pub fn set_paws_idle(mut self, value: u64) -> Self {
        self.paws_idle = value;
        self
    }

    /// Sets the challenge ACK and RST rate limits (per second, negative means unlimited).
    pub fn set_ppslim(mut self, ack_drop: i32, rst: i32) -> Self {
        self.ack_drop_ppslim = ack_drop;
        self.rst_ppslim = rst;
        self
    }

    pub fn set_rfc1323(mut self, value: bool) -> Self {
        self.rfc1323 = value;
        self
    }

    pub fn set_sack(mut self, value: bool) -> Self {
        self.sack = value;
        self
    }

    pub fn set_ecn(mut self, value: bool) -> Self {
        self.ecn = value;
        self
    }

    pub fn set_ack_on_push(mut self, value: bool) -> Self {
        self.ack_on_push = value;
        self
    }

    /// Sets appropriate byte counting and its slow start aggressiveness.
    pub fn set_abc(mut self, enabled: bool, aggressive: bool) -> Self {
        self.abc = enabled;
        self.abc_aggressive = aggressive;
        self
    }

    pub fn set_sb_max(mut self, value: u32) -> Self {
        assert!(value >= MIN_MSS as u32);
        self.sb_max = value;
        self
    }

    pub fn set_reass_limit(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.reass_limit = value;
        self
    }

    pub fn set_congestion_control(mut self, value: &str) -> Self {
        self.congestion_control = value.to_string();
        self
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Default Trait Implementation for TCP Configuration Descriptor
impl Default for TcpConfig {
    /// Creates a TCP Configuration Descriptor with the default values.
    fn default() -> Self {
        TcpConfig {
            advertised_mss: DEFAULT_MSS,
            default_mss: FALLBACK_MSS,
            init_win: 4,
            init_win_local: 4,
            keep_init: TCPTV_KEEP_INIT,
            keep_idle: TCPTV_KEEP_IDLE,
            max_idle: 8 * 75 * SLOW_HZ,
            msl: TCPTV_MSL,
            rtt_min: TCPTV_MIN,
            ack_delay: TCPTV_DELACK,
            rexmt_thresh: TCP_REXMT_THRESH,
            paws_idle: TCP_PAWS_IDLE,
            ack_drop_ppslim: 100,
            rst_ppslim: 100,
            rfc1323: true,
            sack: true,
            ecn: false,
            ack_on_push: false,
            abc: true,
            abc_aggressive: true,
            sb_max: SB_MAX,
            reass_limit: 512,
            congestion_control: "newreno".to_string(),
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
