// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::sync::atomic::{
    AtomicU64,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

macro_rules! tcp_stats {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)*) => {
        /// Receive-path event counters.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum TcpStat {
            $($(#[$doc])* $variant,)*
        }

        impl TcpStat {
            pub const ALL: &'static [TcpStat] = &[$(TcpStat::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(TcpStat::$variant => $name,)*
                }
            }
        }
    };
}

tcp_stats! {
    /// Segments handed to the engine.
    RcvTotal => "rcvtotal",
    /// In-sequence data segments.
    RcvPack => "rcvpack",
    RcvByte => "rcvbyte",
    /// Completely duplicate segments.
    RcvDupPack => "rcvduppack",
    RcvDupByte => "rcvdupbyte",
    /// Segments with some duplicate data.
    RcvPartDupPack => "rcvpartduppack",
    RcvPartDupByte => "rcvpartdupbyte",
    /// Out-of-order segments queued for reassembly.
    RcvOoPack => "rcvoopack",
    RcvOoByte => "rcvoobyte",
    /// Segments dropped for lack of reassembly resources.
    RcvMemDrop => "rcvmemdrop",
    /// Segments past the right edge of the window.
    RcvPackAfterWin => "rcvpackafterwin",
    RcvByteAfterWin => "rcvbyteafterwin",
    /// Data segments received after the user closed.
    RcvAfterClose => "rcvafterclose",
    RcvWinProbe => "rcvwinprobe",
    RcvWinUpd => "rcvwinupd",
    RcvDupAck => "rcvdupack",
    /// Acknowledgments for data we never sent.
    RcvAckTooMuch => "rcvacktoomuch",
    RcvAckPack => "rcvackpack",
    RcvAckByte => "rcvackbyte",
    /// Header prediction hits.
    PredAck => "predack",
    PredDat => "preddat",
    PawsDrop => "pawsdrop",
    RttUpdated => "rttupdated",
    /// Connections established actively.
    Connects => "connects",
    /// Connections established from the SYN cache.
    Accepts => "accepts",
    /// Connections dropped by a reset or a refusal.
    ConnDrops => "conndrops",
    /// Connections closed.
    Closed => "closed",
    Drops => "drops",
    /// Bogus SYN to a listener.
    BadSyn => "badsyn",
    GoodSig => "goodsig",
    BadSig => "badsig",
    EcnCe => "ecn_ce",
    EcnEce => "ecn_ece",
    AckDropRateLimited => "ackdrop_ratelim",
    RstRateLimited => "rst_ratelim",
    ScAdded => "sc_added",
    ScCompleted => "sc_completed",
    ScTimedOut => "sc_timed_out",
    /// Evictions because the whole cache was full.
    ScOverflowed => "sc_overflowed",
    /// Evictions because one bucket was full.
    ScBucketOverflow => "sc_bucketoverflow",
    ScReset => "sc_reset",
    ScUnreach => "sc_unreach",
    /// Promotions that failed to create a connection.
    ScAborted => "sc_aborted",
    ScDupeSyn => "sc_dupesyn",
    /// SYNs refused or dropped before caching.
    ScDropped => "sc_dropped",
    ScRetransmitted => "sc_retransmitted",
    /// Hash salts re-drawn.
    ScSeedRandom => "sc_seedrandom",
}

/// Counters shared by every connection of a stack instance.
pub struct TcpStats {
    counts: Vec<AtomicU64>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TcpStats {
    pub fn inc(&self, stat: TcpStat) {
        self.add(stat, 1);
    }

    pub fn add(&self, stat: TcpStat, delta: u64) {
        self.counts[stat as usize].fetch_add(delta, Ordering::Relaxed);
    }

    /// Takes back an earlier increment.
    pub fn sub(&self, stat: TcpStat, delta: u64) {
        self.counts[stat as usize].fetch_sub(delta, Ordering::Relaxed);
    }

    pub fn get(&self, stat: TcpStat) -> u64 {
        self.counts[stat as usize].load(Ordering::Relaxed)
    }

    /// Every counter with its name.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        TcpStat::ALL.iter().map(|stat| (stat.name(), self.get(*stat))).collect()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for TcpStats {
    fn default() -> Self {
        Self {
            counts: TcpStat::ALL.iter().map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl ::std::fmt::Debug for TcpStats {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        let mut map = f.debug_map();
        for (name, count) in self.snapshot() {
            if count != 0 {
                map.entry(&name, &count);
            }
        }
        map.finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
