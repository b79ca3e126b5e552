// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// SYN cache: half-open connections of listening sockets are kept in a bounded hash table of small entries instead of
// full connections, so that SYN floods cannot exhaust memory. A connection is only created once the peer answers our
// SYN+ACK.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        interface::{
            ListenSocket,
            ListenerId,
            TcpOutput,
        },
        isn_generator::IsnGenerator,
        options::{
            OptionWriter,
            TcpOptionInfo,
        },
        segment::TcpHeader,
        signature::{
            self,
            SignatureKeys,
        },
        stats::{
            TcpStat,
            TcpStats,
        },
        SeqNumber,
        TcpSegment,
    },
    runtime::{
        network::{
            config::{
                SynCacheConfig,
                TcpConfig,
            },
            consts::{
                TCPTV_MIN,
                TCPTV_REXMTMAX,
                TCPTV_SRTTDFLT,
                TCP_BACKOFF,
                TCP_MAXRXTSHIFT,
                TCP_MAXWIN,
                TCP_MAX_WINSHIFT,
                TCP_NO_WINSHIFT,
            },
        },
        timer::TimerQueue,
    },
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    collections::VecDeque,
    net::{
        IpAddr,
        SocketAddr,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Retransmissions after which a second unreachable report removes an entry.
const UNREACH_MIN_RXTSHIFT: u32 = 3;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A SYN+ACK to send on behalf of a cached entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynAck {
    /// Our address.
    pub src: SocketAddr,
    /// The peer.
    pub dst: SocketAddr,
    pub header: TcpHeader,
    /// Mark the carrying IP packet ECN-capable.
    pub ect: bool,
    /// The header carries signature space the sender must fill.
    pub sign: bool,
}

/// A half-open connection.
#[derive(Clone, Debug)]
pub struct SynCacheEntry {
    id: u64,
    bucket: usize,
    pub(crate) listener: ListenerId,
    pub(crate) local: SocketAddr,
    pub(crate) remote: SocketAddr,
    pub(crate) iss: SeqNumber,
    pub(crate) irs: SeqNumber,
    /// MSS offered by the peer.
    pub(crate) peermss: Option<u16>,
    /// MSS we offered.
    pub(crate) ourmss: u16,
    /// Window advertised in our SYN+ACK.
    pub(crate) win: u32,
    /// Timestamp clock offset of the connection.
    pub(crate) timebase: u32,
    /// Last timestamp received from the peer.
    pub(crate) timestamp: u32,
    pub(crate) timestamps: bool,
    /// Our window shift, `TCP_NO_WINSHIFT` when not scaling.
    pub(crate) request_r_scale: u8,
    /// The peer's window shift.
    pub(crate) requested_s_scale: u8,
    pub(crate) sack: bool,
    pub(crate) ecn: bool,
    pub(crate) signature: bool,
    pub(crate) rxtshift: u32,
    rxtcur: u64,
    /// Ticks spent waiting so far.
    rxttot: u64,
    /// An unreachable report was received.
    unreach: bool,
}

/// Result of looking up the entry an acknowledgement completes.
#[derive(Debug)]
pub enum SynCacheGet {
    NotFound,
    /// The acknowledgement did not match; our SYN+ACK was sent again.
    Retry,
    /// The handshake is complete and the entry left the cache.
    Promote(SynCacheEntry),
}

struct Inner {
    buckets: Vec<VecDeque<SynCacheEntry>>,
    count: usize,
    salts: [u32; 2],
    rng: SmallRng,
    isn: IsnGenerator,
    timers: TimerQueue<(usize, u64)>,
    next_id: u64,
}

/// The SYN cache shared by every listening socket of a stack instance.
///
/// Entries are mutated under the cache lock only, which is also held while SYN+ACKs are handed to the output. Outputs
/// must not call back into the cache.
pub struct SynCache {
    config: SynCacheConfig,
    tcp_config: Arc<TcpConfig>,
    stats: Arc<TcpStats>,
    inner: Mutex<Inner>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SynCacheEntry {
    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    pub fn iss(&self) -> SeqNumber {
        self.iss
    }

    pub fn irs(&self) -> SeqNumber {
        self.irs
    }

    pub fn rxtshift(&self) -> u32 {
        self.rxtshift
    }

    /// Builds our SYN+ACK at timestamp clock `tcp_now`.
    fn syn_ack(&self, tcp_now: u32) -> SynAck {
        let mut header: TcpHeader = TcpHeader::new(self.local.port(), self.remote.port());
        header.seq_num = self.iss;
        header.ack_num = self.irs + 1;
        header.syn = true;
        header.ack = true;
        header.ece = self.ecn;
        header.window_size = self.win.min(TCP_MAXWIN) as u16;

        let mut options: OptionWriter = OptionWriter::new().maxseg(self.ourmss);
        if self.request_r_scale != TCP_NO_WINSHIFT {
            options = options.window_scale(self.request_r_scale);
        }
        if self.timestamps {
            options = options.timestamp(tcp_now.wrapping_sub(self.timebase), self.timestamp);
        }
        // Signature and SACK-permitted together do not fit next to the other options.
        if self.sack && !self.signature {
            options = options.sack_permitted();
        }
        if self.signature {
            options = options.signature_space();
        }
        header.options = options.finish();

        SynAck {
            src: self.local,
            dst: self.remote,
            header,
            ect: self.ecn,
            sign: self.signature,
        }
    }

    /// Timeout before the next retransmission of our SYN+ACK.
    fn arm(&mut self) {
        let backoff: u64 = TCP_BACKOFF[(self.rxtshift as usize).min(TCP_BACKOFF.len() - 1)];
        self.rxtcur = (TCPTV_SRTTDFLT * backoff).clamp(TCPTV_MIN, TCPTV_REXMTMAX);
    }
}

impl Inner {
    fn hash(&self, local: &SocketAddr, remote: &SocketAddr) -> u32 {
        let ports: u32 = ((local.port() as u32) << 16).wrapping_add(remote.port() as u32) ^ self.salts[1];
        match remote.ip() {
            IpAddr::V4(addr) => (u32::from(addr) ^ self.salts[0]).wrapping_mul(ports),
            IpAddr::V6(addr) => {
                let octets: [u8; 16] = addr.octets();
                let first: u32 = u32::from_be_bytes([octets[0], octets[1], octets[2], octets[3]]);
                let last: u32 = u32::from_be_bytes([octets[12], octets[13], octets[14], octets[15]]);
                (first ^ last ^ self.salts[0]).wrapping_mul(ports) & 0x7fff_ffff
            },
        }
    }

    fn bucket_of(&self, local: &SocketAddr, remote: &SocketAddr) -> usize {
        self.hash(local, remote) as usize % self.buckets.len()
    }

    fn position(&self, local: &SocketAddr, remote: &SocketAddr) -> Option<(usize, usize)> {
        let bucket: usize = self.bucket_of(local, remote);
        self.buckets[bucket]
            .iter()
            .position(|entry| entry.local == *local && entry.remote == *remote)
            .map(|index| (bucket, index))
    }

    fn find(&self, local: &SocketAddr, remote: &SocketAddr) -> Option<&SynCacheEntry> {
        let (bucket, index): (usize, usize) = self.position(local, remote)?;
        self.buckets[bucket].get(index)
    }

    fn find_mut(&mut self, local: &SocketAddr, remote: &SocketAddr) -> Option<&mut SynCacheEntry> {
        let (bucket, index): (usize, usize) = self.position(local, remote)?;
        self.buckets[bucket].get_mut(index)
    }

    fn remove(&mut self, bucket: usize, index: usize) -> Option<SynCacheEntry> {
        let entry: SynCacheEntry = self.buckets[bucket].remove(index)?;
        self.count -= 1;
        Some(entry)
    }

    fn remove_at(&mut self, local: &SocketAddr, remote: &SocketAddr) -> Option<SynCacheEntry> {
        let (bucket, index): (usize, usize) = self.position(local, remote)?;
        self.remove(bucket, index)
    }

    fn evict_front(&mut self, bucket: usize) {
        if let Some(victim) = self.remove(bucket, 0) {
            debug!("syn cache: evicting {} -> {}", victim.remote, victim.local);
        }
    }
}

impl SynCache {
    pub fn new(
        config: SynCacheConfig,
        tcp_config: Arc<TcpConfig>,
        stats: Arc<TcpStats>,
        rng_seed: [u8; 32],
        now: u64,
    ) -> Self {
        let mut rng: SmallRng = SmallRng::from_seed(rng_seed);
        let isn: IsnGenerator = IsnGenerator::new(rng.gen::<u32>());
        let salts: [u32; 2] = [rng.gen::<u32>(), rng.gen::<u32>()];
        let buckets: Vec<VecDeque<SynCacheEntry>> = (0..config.get_hash_size()).map(|_| VecDeque::new()).collect();
        Self {
            config,
            tcp_config,
            stats,
            inner: Mutex::new(Inner {
                buckets,
                count: 0,
                salts,
                rng,
                isn,
                timers: TimerQueue::new(now),
                next_id: 0,
            }),
        }
    }

    pub fn stats(&self) -> &Arc<TcpStats> {
        &self.stats
    }

    pub fn tcp_config(&self) -> &Arc<TcpConfig> {
        &self.tcp_config
    }

    /// Number of half-open connections.
    pub fn len(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initial sequence number for a connection we open.
    pub fn generate_iss(&self, local: &SocketAddr, remote: &SocketAddr) -> SeqNumber {
        self.lock().isn.generate(local, remote)
    }

    /// Copy of the entry for a pair of addresses, if any.
    pub fn lookup(&self, local: &SocketAddr, remote: &SocketAddr) -> Option<SynCacheEntry> {
        self.lock().find(local, remote).cloned()
    }

    /// Caches the SYN `seg` for `listener` and answers it. A SYN for an entry already cached only gets the SYN+ACK
    /// again. Returns false when the SYN was refused.
    pub fn add(
        &self,
        seg: &TcpSegment,
        listener: &dyn ListenSocket,
        keys: Option<&dyn SignatureKeys>,
        output: &dyn TcpOutput,
        now: u64,
    ) -> bool {
        let hdr: &TcpHeader = &seg.tcp_hdr;
        if !hdr.syn || hdr.ack || hdr.rst {
            return false;
        }
        if seg.link_multicast || is_multicast_or_broadcast(seg.src.ip()) || seg.src == seg.dst {
            return false;
        }
        let info: TcpOptionInfo = match TcpOptionInfo::parse(&hdr.options, true) {
            Ok(info) => info,
            Err(e) => {
                warn!("add(): bad options from {}: {:?}", seg.src, e);
                return false;
            },
        };
        let signed: bool = listener.signature_required();
        if let Err(e) = signature::verify(&info, signed, seg, keys, &self.stats) {
            warn!("add(): refusing SYN from {}: {:?}", seg.src, e);
            return false;
        }

        let mut inner: MutexGuard<Inner> = self.lock();
        let tcp_now: u32 = now as u32;
        if let Some(entry) = inner.find_mut(&seg.dst, &seg.src) {
            // Retransmitted SYN: answer again without touching the retransmission state.
            self.stats.inc(TcpStat::ScDupeSyn);
            entry.timestamp = info.timestamp.map_or(0, |ts| ts.val);
            let syn_ack: SynAck = entry.syn_ack(tcp_now);
            if let Err(e) = output.send_syn_ack(&syn_ack) {
                warn!("add(): failed to resend SYN+ACK to {}: {:?}", seg.src, e);
            }
            return true;
        }

        let rfc1323: bool = self.tcp_config.get_rfc1323();
        let (request_r_scale, requested_s_scale): (u8, u8) = match info.window_scale {
            Some(shift) if rfc1323 => {
                let sb_max: u32 = self.tcp_config.get_sb_max();
                let mut scale: u8 = 0;
                while scale < TCP_MAX_WINSHIFT && (TCP_MAXWIN << scale) < sb_max {
                    scale += 1;
                }
                (scale, shift)
            },
            _ => (TCP_NO_WINSHIFT, TCP_NO_WINSHIFT),
        };
        let iss: SeqNumber = inner.isn.generate(&seg.dst, &seg.src);
        let id: u64 = inner.next_id;
        inner.next_id += 1;
        let mut entry: SynCacheEntry = SynCacheEntry {
            id,
            bucket: 0,
            listener: listener.id(),
            local: seg.dst,
            remote: seg.src,
            iss,
            irs: hdr.seq_num,
            peermss: info.maxseg,
            ourmss: self.tcp_config.get_advertised_mss().min(u16::MAX as usize) as u16,
            win: listener.receive_space().min(TCP_MAXWIN),
            timebase: tcp_now.wrapping_sub(1),
            timestamp: info.timestamp.map_or(0, |ts| ts.val),
            timestamps: rfc1323 && info.timestamp.is_some(),
            request_r_scale,
            requested_s_scale,
            sack: info.sack_permitted && self.tcp_config.get_sack(),
            ecn: hdr.ece && hdr.cwr && self.tcp_config.get_ecn(),
            signature: signed,
            rxtshift: 0,
            rxtcur: 0,
            rxttot: 0,
            unreach: false,
        };

        if let Err(e) = output.send_syn_ack(&entry.syn_ack(tcp_now)) {
            warn!("add(): failed to send SYN+ACK to {}: {:?}", seg.src, e);
            self.stats.inc(TcpStat::ScDropped);
            return false;
        }
        self.insert(&mut inner, &mut entry, now);
        debug!("add(): {} -> {} iss={} irs={}", entry.remote, entry.local, entry.iss, entry.irs);
        inner.buckets[entry.bucket].push_back(entry);
        inner.count += 1;
        true
    }

    /// Makes room for `entry` and arms its timer. The caller pushes it into its bucket.
    fn insert(&self, inner: &mut Inner, entry: &mut SynCacheEntry, now: u64) {
        if inner.count == 0 {
            // Fresh salts each time the cache empties.
            inner.salts = [inner.rng.gen::<u32>(), inner.rng.gen::<u32>()];
            self.stats.inc(TcpStat::ScSeedRandom);
        }
        let bucket: usize = inner.bucket_of(&entry.local, &entry.remote);
        entry.bucket = bucket;

        if inner.buckets[bucket].len() >= self.config.get_bucket_limit() {
            self.stats.inc(TcpStat::ScBucketOverflow);
            inner.evict_front(bucket);
        } else if inner.count >= self.config.get_cache_limit() {
            self.stats.inc(TcpStat::ScOverflowed);
            // Oldest entry of this bucket, or of the next bucket that has one.
            let nbuckets: usize = inner.buckets.len();
            let victim: Option<usize> = (0..nbuckets)
                .map(|offset| (bucket + offset) % nbuckets)
                .find(|&candidate| !inner.buckets[candidate].is_empty());
            if let Some(victim) = victim {
                inner.evict_front(victim);
            }
        }

        entry.rxttot = 0;
        entry.rxtshift = 0;
        entry.arm();
        inner.timers.schedule_at(now.saturating_add(entry.rxtcur), (bucket, entry.id));
        self.stats.inc(TcpStat::ScAdded);
    }

    /// Completes the handshake `seg` acknowledges. The entry leaves the cache on success only.
    pub fn get(&self, seg: &TcpSegment, output: &dyn TcpOutput, now: u64) -> SynCacheGet {
        let mut inner: MutexGuard<Inner> = self.lock();
        let Some((bucket, index)) = inner.position(&seg.dst, &seg.src) else {
            return SynCacheGet::NotFound;
        };
        let seq: SeqNumber = seg.tcp_hdr.seq_num;
        let ack: SeqNumber = seg.tcp_hdr.ack_num;
        let entry: &SynCacheEntry = &inner.buckets[bucket][index];
        if ack != entry.iss + 1 || seq <= entry.irs || seq > entry.irs + 1 + entry.win {
            trace!("get(): {} does not complete the handshake, ack={} seq={}", seg.src, ack, seq);
            if let Err(e) = output.send_syn_ack(&entry.syn_ack(now as u32)) {
                warn!("get(): failed to resend SYN+ACK to {}: {:?}", seg.src, e);
            }
            return SynCacheGet::Retry;
        }
        match inner.remove(bucket, index) {
            Some(entry) => {
                debug!("get(): handshake with {} complete", entry.remote);
                SynCacheGet::Promote(entry)
            },
            None => SynCacheGet::NotFound,
        }
    }

    /// Drops the entry a reset from the peer is for, if the reset is in sequence.
    pub fn reset(&self, local: &SocketAddr, remote: &SocketAddr, seq: SeqNumber) {
        let mut inner: MutexGuard<Inner> = self.lock();
        let Some(entry) = inner.find(local, remote) else {
            return;
        };
        if seq < entry.irs || seq > entry.irs + 1 {
            return;
        }
        if inner.remove_at(local, remote).is_some() {
            debug!("reset(): {} reset the handshake", remote);
            self.stats.inc(TcpStat::ScReset);
        }
    }

    /// Handles an unreachable report for our SYN+ACK numbered `seq`. A single report may be spoofed, so the entry only
    /// goes away after a second report, once we retransmitted a few times.
    pub fn unreach(&self, local: &SocketAddr, remote: &SocketAddr, seq: SeqNumber) {
        let mut inner: MutexGuard<Inner> = self.lock();
        let Some(entry) = inner.find_mut(local, remote) else {
            return;
        };
        if seq != entry.iss {
            return;
        }
        if !entry.unreach || entry.rxtshift < UNREACH_MIN_RXTSHIFT {
            entry.unreach = true;
            return;
        }
        if inner.remove_at(local, remote).is_some() {
            debug!("unreach(): {} unreachable", remote);
            self.stats.inc(TcpStat::ScUnreach);
        }
    }

    /// Drops every entry of a listener that went away.
    pub fn cleanup(&self, listener: ListenerId) {
        let mut inner: MutexGuard<Inner> = self.lock();
        let mut removed: usize = 0;
        for bucket in inner.buckets.iter_mut() {
            let before: usize = bucket.len();
            bucket.retain(|entry| entry.listener != listener);
            removed += before - bucket.len();
        }
        inner.count -= removed;
        if removed > 0 {
            debug!("cleanup(): dropped {} entries of {:?}", removed, listener);
        }
    }

    /// Runs the retransmission timers due at `now`.
    pub fn advance_clock(&self, now: u64, output: &dyn TcpOutput) {
        let mut inner: MutexGuard<Inner> = self.lock();
        let keep_init: u64 = self.tcp_config.get_keep_init();
        for (bucket, id) in inner.timers.advance_clock(now) {
            // The entry may be gone already.
            let Some(index) = inner.buckets[bucket].iter().position(|entry| entry.id == id) else {
                continue;
            };
            let entry: &mut SynCacheEntry = &mut inner.buckets[bucket][index];
            let expired: bool = if entry.rxtshift == TCP_MAXRXTSHIFT {
                true
            } else {
                entry.rxttot += entry.rxtcur;
                entry.rxttot >= keep_init
            };
            if expired {
                if let Some(entry) = inner.remove(bucket, index) {
                    debug!("advance_clock(): handshake with {} timed out", entry.remote);
                }
                self.stats.inc(TcpStat::ScTimedOut);
                continue;
            }
            self.stats.inc(TcpStat::ScRetransmitted);
            if let Err(e) = output.send_syn_ack(&entry.syn_ack(now as u32)) {
                warn!("advance_clock(): failed to resend SYN+ACK to {}: {:?}", entry.remote, e);
            }
            entry.rxtshift += 1;
            entry.arm();
            let expiry: u64 = now.saturating_add(entry.rxtcur);
            inner.timers.schedule_at(expiry, (bucket, id));
        }
    }

    fn lock(&self) -> MutexGuard<Inner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Whether `addr` can only be the destination of a datagram.
pub fn is_multicast_or_broadcast(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(addr) => addr.is_multicast() || addr.is_broadcast(),
        IpAddr::V6(addr) => addr.is_multicast(),
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
