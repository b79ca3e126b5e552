// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use super::{
    congestion_control::{
        self,
        CongestionControl,
        CubicState,
    },
    rto::RtoCalculator,
    timers::{
        TimerKind,
        TimerSet,
    },
};
use crate::{
    inetstack::protocols::tcp::{
        interface::SocketBuffer,
        options::SackBlock,
        reassembly::ReassemblyQueue,
        stats::{
            TcpStat,
            TcpStats,
        },
        syn_cache::SynCacheEntry,
        SeqNumber,
    },
    runtime::network::{
        config::TcpConfig,
        consts::{
            TCP_MAXWIN,
            TCP_MAX_WINSHIFT,
            TCP_NO_WINSHIFT,
        },
    },
};
use ::libc::c_int;
use ::std::{
    fmt,
    net::SocketAddr,
    sync::Arc,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Option bytes taken by timestamps in every segment (RFC 1323 appendix A).
const TCPOLEN_TSTAMP_APPA: u32 = 12;

/// Option bytes taken by a padded signature.
const TCPOLEN_SIGLEN: u32 = 20;

/// Smallest peer MSS we accept.
const MIN_PEER_MSS: u32 = 256;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Connection states (RFC 793), in the order the state tests below rely on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    CloseWait,
    FinWait1,
    Closing,
    LastAck,
    FinWait2,
    TimeWait,
}

/// Per-connection flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcbFlags {
    /// Acknowledge on the next output.
    pub ack_now: bool,
    /// An acknowledgement is being delayed.
    pub del_ack: bool,
    pub sent_fin: bool,
    /// We asked for window scaling.
    pub req_scale: bool,
    /// The peer asked for window scaling.
    pub rcvd_scale: bool,
    pub req_tstmp: bool,
    pub rcvd_tstmp: bool,
    /// We offer SACK.
    pub sack_permit: bool,
    /// SACK is in use on this connection.
    pub will_sack: bool,
    pub ecn_permit: bool,
    /// Set CWR on the next data segment.
    pub ecn_snd_cwr: bool,
    /// Echo ECE until the peer answers with CWR.
    pub ecn_snd_ece: bool,
    /// Segments carry an MD5 signature.
    pub signature: bool,
    /// The SYN had to be retransmitted.
    pub syn_rexmt: bool,
}

/// Transmission Control Block.
///
/// Everything here is mutated from the connection's exclusive section only: one segment or timer at a time.
pub struct ControlBlock {
    local: SocketAddr,
    remote: SocketAddr,
    config: Arc<TcpConfig>,
    cc: &'static dyn CongestionControl,
    pub(crate) socket: Box<dyn SocketBuffer>,
    pub(crate) state: State,
    pub flags: TcbFlags,

    // Send sequence space.
    pub iss: SeqNumber,
    pub snd_una: SeqNumber,
    pub snd_nxt: SeqNumber,
    pub snd_max: SeqNumber,
    pub snd_up: SeqNumber,
    /// Sequence number of the last segment used to update the send window.
    pub snd_wl1: SeqNumber,
    /// Acknowledgement number of the last segment used to update the send window.
    pub snd_wl2: SeqNumber,
    /// snd_max when the last retransmission timeout fired.
    pub snd_high: SeqNumber,
    /// Forward-most byte known to have reached the peer.
    pub snd_fack: SeqNumber,
    /// End of the window being recovered.
    pub snd_recover: SeqNumber,
    pub snd_wnd: u32,
    pub max_sndwnd: u32,
    pub snd_cwnd: u32,
    pub snd_ssthresh: u32,

    // Receive sequence space.
    pub irs: SeqNumber,
    pub rcv_nxt: SeqNumber,
    pub rcv_adv: SeqNumber,
    pub rcv_up: SeqNumber,
    pub rcv_wnd: u32,
    pub last_ack_sent: SeqNumber,

    // Window scaling.
    pub snd_scale: u8,
    pub rcv_scale: u8,
    pub request_r_scale: u8,
    pub requested_s_scale: u8,

    // Segment sizes.
    pub ourmss: u32,
    pub peermss: u32,
    pub segsz: u32,

    // RFC 1323 timestamps.
    pub ts_recent: u32,
    /// Tick at which ts_recent was latched.
    pub ts_recent_age: u32,
    pub ts_timebase: u32,

    // Round-trip timing.
    /// Tick at which the timed segment was sent, zero when nothing is timed.
    pub rtttime: u32,
    pub rtseq: SeqNumber,
    pub rto: RtoCalculator,
    pub softerror: Option<c_int>,

    // Congestion control.
    pub dupacks: u32,
    /// Negative outside of fast recovery.
    pub partialacks: i32,
    pub bytes_acked: u32,
    pub cubic: CubicState,

    // Out-of-band data.
    pub oob_have_data: bool,
    pub oob_had_data: bool,
    pub iobc: u8,

    pub timers: TimerSet,
    pub(crate) reass: ReassemblyQueue,
    /// Duplicate data to report with the next acknowledgement.
    pub(crate) dsack: Option<SackBlock>,
    /// Tick of the last segment received.
    pub rcvtime: u64,
    now: u64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl State {
    pub fn have_received_syn(self) -> bool {
        self >= State::SynReceived
    }

    pub fn have_established(self) -> bool {
        self >= State::Established
    }

    pub fn have_received_fin(self) -> bool {
        matches!(self, State::CloseWait | State::Closing | State::LastAck | State::TimeWait)
    }
}

impl ControlBlock {
    fn new(
        config: Arc<TcpConfig>,
        local: SocketAddr,
        remote: SocketAddr,
        socket: Box<dyn SocketBuffer>,
        state: State,
        now: u64,
    ) -> Self {
        let cc: &'static dyn CongestionControl = match congestion_control::by_name(config.get_congestion_control()) {
            Some(cc) => cc,
            None => {
                warn!(
                    "unknown congestion control {:?}, using {}",
                    config.get_congestion_control(),
                    congestion_control::default_strategy().name()
                );
                congestion_control::default_strategy()
            },
        };
        let ourmss: u32 = config.get_advertised_mss() as u32;
        let segsz: u32 = config.get_default_mss() as u32;
        let rttmin: u64 = config.get_rtt_min();
        let reass_limit: usize = config.get_reass_limit();
        let max_window: u32 = TCP_MAXWIN << TCP_MAX_WINSHIFT;
        Self {
            local,
            remote,
            config,
            cc,
            socket,
            state,
            flags: TcbFlags::default(),
            iss: SeqNumber::default(),
            snd_una: SeqNumber::default(),
            snd_nxt: SeqNumber::default(),
            snd_max: SeqNumber::default(),
            snd_up: SeqNumber::default(),
            snd_wl1: SeqNumber::default(),
            snd_wl2: SeqNumber::default(),
            snd_high: SeqNumber::default(),
            snd_fack: SeqNumber::default(),
            snd_recover: SeqNumber::default(),
            snd_wnd: 0,
            max_sndwnd: 0,
            snd_cwnd: max_window,
            snd_ssthresh: max_window,
            irs: SeqNumber::default(),
            rcv_nxt: SeqNumber::default(),
            rcv_adv: SeqNumber::default(),
            rcv_up: SeqNumber::default(),
            rcv_wnd: 0,
            last_ack_sent: SeqNumber::default(),
            snd_scale: 0,
            rcv_scale: 0,
            request_r_scale: 0,
            requested_s_scale: 0,
            ourmss,
            peermss: segsz,
            segsz,
            ts_recent: 0,
            ts_recent_age: 0,
            ts_timebase: (now as u32).wrapping_sub(1),
            rtttime: 0,
            rtseq: SeqNumber::default(),
            rto: RtoCalculator::new(rttmin),
            softerror: None,
            dupacks: 0,
            partialacks: -1,
            bytes_acked: 0,
            cubic: CubicState::default(),
            oob_have_data: false,
            oob_had_data: false,
            iobc: 0,
            timers: TimerSet::default(),
            reass: ReassemblyQueue::new(reass_limit),
            dsack: None,
            rcvtime: now,
            now,
        }
    }

    /// Creates a connection whose SYN, numbered `iss`, was just sent to `remote`.
    pub fn connect(
        config: Arc<TcpConfig>,
        local: SocketAddr,
        remote: SocketAddr,
        iss: SeqNumber,
        socket: Box<dyn SocketBuffer>,
        now: u64,
    ) -> Self {
        let mut cb: ControlBlock = ControlBlock::new(config, local, remote, socket, State::SynSent, now);
        cb.flags.req_scale = cb.config.get_rfc1323();
        cb.flags.req_tstmp = cb.config.get_rfc1323();
        cb.flags.sack_permit = cb.config.get_sack();
        cb.request_r_scale = cb.window_shift_for(cb.socket.receive_space());
        cb.iss = iss;
        cb.send_seq_init();
        cb.snd_nxt = iss + 1;
        cb.snd_max = iss + 1;
        // Time the SYN.
        cb.rtttime = cb.tcp_now();
        cb.rtseq = iss;
        let keep_init: u64 = cb.config.get_keep_init();
        cb.timers.arm(TimerKind::Keep, now, keep_init);
        let rto: u64 = cb.rto.rto();
        cb.timers.arm(TimerKind::Rexmt, now, rto);
        debug!("connect(): {} -> {} iss={}", local, remote, iss);
        cb
    }

    /// Creates the connection of a completed handshake from its SYN cache entry. The connection starts in
    /// SYN_RECEIVED; the acknowledgement that completed the handshake is then processed on it like any other segment.
    pub fn from_syn_cache(
        config: Arc<TcpConfig>,
        entry: &SynCacheEntry,
        socket: Box<dyn SocketBuffer>,
        now: u64,
    ) -> Self {
        let mut cb: ControlBlock =
            ControlBlock::new(config, entry.local, entry.remote, socket, State::SynReceived, now);
        if entry.request_r_scale != TCP_NO_WINSHIFT {
            cb.requested_s_scale = entry.requested_s_scale;
            cb.request_r_scale = entry.request_r_scale;
            cb.snd_scale = entry.requested_s_scale;
            cb.rcv_scale = entry.request_r_scale;
            cb.flags.req_scale = true;
            cb.flags.rcvd_scale = true;
        }
        if entry.timestamps {
            cb.flags.req_tstmp = true;
            cb.flags.rcvd_tstmp = true;
        }
        cb.ts_timebase = entry.timebase;

        cb.iss = entry.iss;
        cb.irs = entry.irs;
        cb.send_seq_init();
        cb.receive_seq_init();
        let keep_init: u64 = cb.config.get_keep_init();
        cb.timers.arm(TimerKind::Keep, now, keep_init);

        cb.flags.will_sack = entry.sack && cb.config.get_sack();
        cb.flags.ecn_permit = entry.ecn && cb.config.get_ecn();
        cb.flags.signature = entry.signature;

        cb.ourmss = entry.ourmss as u32;
        cb.mss_from_peer(entry.peermss);
        cb.snd_cwnd = if entry.rxtshift > 0 {
            cb.peermss
        } else {
            cb.initial_window()
        };

        cb.snd_wl1 = entry.irs;
        cb.rcv_up = entry.irs + 1;
        cb.snd_up = cb.snd_una;
        cb.snd_nxt = entry.iss + 1;
        cb.snd_max = entry.iss + 1;
        let rto: u64 = cb.rto.rto();
        cb.timers.arm(TimerKind::Rexmt, now, rto);
        if entry.win > 0 && cb.rcv_nxt + entry.win > cb.rcv_adv {
            cb.rcv_adv = cb.rcv_nxt + entry.win;
        }
        cb.last_ack_sent = cb.rcv_nxt;
        cb.partialacks = -1;
        cb.dupacks = 0;
        debug!("from_syn_cache(): {} <- {} iss={} irs={}", cb.local, cb.remote, cb.iss, cb.irs);
        cb
    }

    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    pub fn congestion_control(&self) -> &'static dyn CongestionControl {
        self.cc
    }

    pub fn socket(&self) -> &dyn SocketBuffer {
        self.socket.as_ref()
    }

    pub fn socket_mut(&mut self) -> &mut dyn SocketBuffer {
        self.socket.as_mut()
    }

    /// Current slow-clock tick, as of the segment or timer being processed.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    /// The clock used for timestamps and round-trip timing.
    pub fn tcp_now(&self) -> u32 {
        self.now as u32
    }

    /// Our timestamp clock, as sent in the timestamp option.
    pub fn timestamp(&self) -> u32 {
        self.tcp_now().wrapping_sub(self.ts_timebase)
    }

    pub fn rexmt_thresh(&self) -> u32 {
        self.config.get_rexmt_thresh()
    }

    /// Whether the peer is a loopback address. Only loopback peers get the local initial window.
    pub fn is_loopback_peer(&self) -> bool {
        self.remote.ip().is_loopback()
    }

    /// Out-of-order data held for this connection.
    pub fn reassembly_queue(&self) -> &ReassemblyQueue {
        &self.reass
    }

    /// Takes the duplicate SACK block to report, if any.
    pub fn take_dsack(&mut self) -> Option<SackBlock> {
        self.dsack.take()
    }

    /// Records that an acknowledgement covering everything up to `rcv_nxt` is on its way. Called by the sender.
    pub fn ack_sent(&mut self) {
        self.flags.ack_now = false;
        self.flags.del_ack = false;
        self.timers.disarm(TimerKind::DelayedAck);
        self.last_ack_sent = self.rcv_nxt;
        if self.rcv_wnd > 0 && self.rcv_nxt + self.rcv_wnd > self.rcv_adv {
            self.rcv_adv = self.rcv_nxt + self.rcv_wnd;
        }
    }

    /// Smallest window shift that lets us advertise `space` bytes.
    pub fn window_shift_for(&self, space: u32) -> u8 {
        let limit: u32 = space.max(self.config.get_sb_max());
        let mut shift: u8 = 0;
        while shift < TCP_MAX_WINSHIFT && (TCP_MAXWIN << shift) < limit {
            shift += 1;
        }
        shift
    }

    /// Takes the peer's MSS offer into account (RFC 1122). The segment size leaves room for the options every segment
    /// carries.
    pub fn mss_from_peer(&mut self, offer: Option<u16>) {
        let offer: u32 = match offer {
            Some(mss) if mss > 0 => mss as u32,
            _ => self.config.get_default_mss() as u32,
        };
        self.peermss = offer.max(MIN_PEER_MSS);
        let mut optlen: u32 = 0;
        if self.flags.req_tstmp && self.flags.rcvd_tstmp {
            optlen += TCPOLEN_TSTAMP_APPA;
        }
        if self.flags.signature {
            optlen += TCPOLEN_SIGLEN;
        }
        self.segsz = self.peermss.min(self.ourmss).saturating_sub(optlen).max(1);
    }

    /// Initial congestion window (RFC 3390).
    pub fn initial_window(&self) -> u32 {
        self.config.initial_window(self.peermss, self.is_loopback_peer())
    }

    /// Enters ESTABLISHED.
    pub(crate) fn established(&mut self) {
        self.state = State::Established;
        let keep_idle: u64 = self.config.get_keep_idle();
        self.timers.arm(TimerKind::Keep, self.now, keep_idle);
        self.socket.connected();
    }

    /// Turns on the negotiated window scaling, once the handshake completes.
    pub(crate) fn enable_window_scaling(&mut self) {
        if self.flags.rcvd_scale && self.flags.req_scale {
            self.snd_scale = self.requested_s_scale;
            self.rcv_scale = self.request_r_scale;
        }
    }

    /// Feeds a round-trip sample, in ticks, to the estimator.
    pub(crate) fn xmit_timer(&mut self, rtt: u32, stats: &TcpStats) {
        stats.inc(TcpStat::RttUpdated);
        self.rto.add_sample(rtt);
        self.rtttime = 0;
        self.softerror = None;
    }

    /// Records a duplicate SACK block for the next acknowledgement.
    pub(crate) fn new_dsack(&mut self, seq: SeqNumber, len: u32) {
        if self.flags.will_sack {
            self.dsack = Some(SackBlock {
                start: seq,
                end: seq + len,
            });
        }
    }

    /// Acknowledges in-order data: immediately on every second segment (or on PSH when configured), otherwise after
    /// the delayed acknowledgement timeout.
    pub(crate) fn setup_ack(&mut self, psh: bool) {
        if self.flags.del_ack || (self.config.get_ack_on_push() && psh) {
            self.flags.ack_now = true;
        } else {
            self.flags.del_ack = true;
            let delay: u64 = self.config.get_ack_delay();
            self.timers.arm(TimerKind::DelayedAck, self.now, delay);
        }
    }

    /// Enters TIME_WAIT, with only the 2MSL timer running.
    pub(crate) fn enter_time_wait(&mut self) {
        self.state = State::TimeWait;
        self.timers.disarm_all();
        self.arm_two_msl();
        self.socket.disconnected();
    }

    pub(crate) fn arm_two_msl(&mut self) {
        let timeout: u64 = 2 * self.config.get_msl();
        self.timers.arm(TimerKind::TwoMsl, self.now, timeout);
    }

    /// Closes the connection. The caller releases it afterwards.
    pub(crate) fn close(&mut self) {
        debug!("close(): {} <-> {} in {:?}", self.local, self.remote, self.state);
        self.state = State::Closed;
        self.timers.disarm_all();
        self.reass.clear();
        self.socket.disconnected();
    }

    /// Closes the connection, reporting `errno` to the owner.
    pub(crate) fn drop_connection(&mut self, errno: c_int, stats: &TcpStats) {
        if self.state.have_received_syn() {
            stats.inc(TcpStat::Drops);
        } else {
            stats.inc(TcpStat::ConnDrops);
        }
        self.socket.set_error(errno);
        self.close();
    }

    fn send_seq_init(&mut self) {
        let iss: SeqNumber = self.iss;
        self.snd_una = iss;
        self.snd_nxt = iss;
        self.snd_max = iss;
        self.snd_up = iss;
        self.snd_recover = iss;
        self.snd_high = iss;
        self.snd_fack = iss;
    }

    pub(crate) fn receive_seq_init(&mut self) {
        self.rcv_nxt = self.irs + 1;
        self.rcv_adv = self.rcv_nxt;
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("cc", &self.cc.name())
            .field("snd_una", &self.snd_una)
            .field("snd_nxt", &self.snd_nxt)
            .field("snd_max", &self.snd_max)
            .field("snd_wnd", &self.snd_wnd)
            .field("snd_cwnd", &self.snd_cwnd)
            .field("rcv_nxt", &self.rcv_nxt)
            .field("rcv_wnd", &self.rcv_wnd)
            .field("reass", &self.reass.len())
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
