// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        established::{
            ctrlblk::{
                ControlBlock,
                State,
            },
            receiver::{
                InputContext,
                Outcome,
            },
            timers::TimerKind,
        },
        interface::{
            ListenSocket,
            ListenerId,
            Reply,
            SocketBuffer,
            TcpOutput,
        },
        signature::SignatureKeys,
        stats::{
            TcpStat,
            TcpStats,
        },
        syn_cache::{
            is_multicast_or_broadcast,
            SynCache,
            SynCacheEntry,
            SynCacheGet,
        },
        SeqNumber,
        TcpSegment,
    },
    runtime::{
        logging,
        network::config::TcpConfig,
        ratelimit::PpsLimiter,
    },
};
use ::libc::ETIMEDOUT;
use ::std::{
    net::SocketAddr,
    sync::Arc,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Keep-alive probes sent before an idle connection is dropped.
const TCP_KEEPCNT: u64 = 8;

//======================================================================================================================
// Structures
//======================================================================================================================

/// The socket a segment was matched to by the lookup layer.
pub enum Pcb<'a> {
    /// Nothing matches.
    Unmatched,
    Listen(&'a dyn ListenSocket),
    Connection(&'a mut ControlBlock),
}

/// What the caller must do once a segment has been processed.
#[derive(Debug)]
pub enum Disposition {
    Consumed,
    /// A handshake completed; the caller now owns the connection.
    Established(Box<ControlBlock>),
    /// The connection is closed and must be released.
    Closed,
    /// The connection is closed; look the segment up again.
    Reprocess(TcpSegment),
}

/// Entry point of the receive side of a stack instance.
pub struct TcpInput {
    config: Arc<TcpConfig>,
    syn_cache: Arc<SynCache>,
    output: Arc<dyn TcpOutput>,
    keys: Option<Arc<dyn SignatureKeys>>,
    stats: Arc<TcpStats>,
    /// Challenge ACKs.
    ack_limiter: PpsLimiter,
    /// Resets for segments without a connection.
    rst_limiter: PpsLimiter,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TcpInput {
    pub fn new(
        config: Arc<TcpConfig>,
        syn_cache: Arc<SynCache>,
        output: Arc<dyn TcpOutput>,
        keys: Option<Arc<dyn SignatureKeys>>,
    ) -> Self {
        logging::initialize();
        let stats: Arc<TcpStats> = syn_cache.stats().clone();
        let ack_limiter: PpsLimiter = PpsLimiter::new(config.get_ack_drop_ppslim());
        let rst_limiter: PpsLimiter = PpsLimiter::new(config.get_rst_ppslim());
        Self {
            config,
            syn_cache,
            output,
            keys,
            stats,
            ack_limiter,
            rst_limiter,
        }
    }

    pub fn stats(&self) -> &Arc<TcpStats> {
        &self.stats
    }

    pub fn syn_cache(&self) -> &Arc<SynCache> {
        &self.syn_cache
    }

    /// Opens a connection to `remote`. The caller sends the SYN.
    pub fn connect(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        socket: Box<dyn SocketBuffer>,
        now: u64,
    ) -> ControlBlock {
        let iss: SeqNumber = self.syn_cache.generate_iss(&local, &remote);
        ControlBlock::connect(self.config.clone(), local, remote, iss, socket, now)
    }

    /// Processes one segment for the socket the lookup layer found.
    pub fn input(&self, mut seg: TcpSegment, pcb: Pcb, now: u64) -> Disposition {
        self.stats.inc(TcpStat::RcvTotal);
        trace!(
            "input(): {} -> {} seq={} ack={} len={}",
            seg.src,
            seg.dst,
            seg.tcp_hdr.seq_num,
            seg.tcp_hdr.ack_num,
            seg.tlen()
        );
        match pcb {
            Pcb::Unmatched => {
                self.finish(None, &mut seg, Outcome::DropWithResetRateLimited, now);
                Disposition::Consumed
            },
            Pcb::Listen(listener) => self.listen(seg, listener, now),
            Pcb::Connection(cb) => {
                if cb.state() == State::Closed {
                    return Disposition::Consumed;
                }
                let outcome: Outcome = self.process(cb, &mut seg, now);
                self.finish(Some(cb), &mut seg, outcome, now)
            },
        }
    }

    fn process(&self, cb: &mut ControlBlock, seg: &mut TcpSegment, now: u64) -> Outcome {
        let ctx: InputContext = InputContext {
            output: self.output.as_ref(),
            stats: &self.stats,
            keys: self.keys.as_deref(),
            now,
        };
        cb.process(seg, &ctx)
    }

    fn listen(&self, mut seg: TcpSegment, listener: &dyn ListenSocket, now: u64) -> Disposition {
        let (syn, ack, rst): (bool, bool, bool) = (seg.tcp_hdr.syn, seg.tcp_hdr.ack, seg.tcp_hdr.rst);
        if rst {
            self.syn_cache.reset(&seg.dst, &seg.src, seg.tcp_hdr.seq_num);
            return Disposition::Consumed;
        }
        if syn && !ack {
            if seg.link_multicast || is_multicast_or_broadcast(seg.dst.ip()) {
                return Disposition::Consumed;
            }
            if seg.src == seg.dst {
                self.stats.inc(TcpStat::BadSyn);
                return Disposition::Consumed;
            }
            if !listener.accept_queue_full() {
                self.syn_cache
                    .add(&seg, listener, self.keys.as_deref(), self.output.as_ref(), now);
            }
            return Disposition::Consumed;
        }
        if ack && !syn {
            match self.syn_cache.get(&seg, self.output.as_ref(), now) {
                SynCacheGet::NotFound => (),
                SynCacheGet::Retry => return Disposition::Consumed,
                SynCacheGet::Promote(entry) => return self.promote(entry, seg, listener, now),
            }
        }
        // A SYN+ACK, an ACK for no handshake or a segment without any of SYN, ACK and RST.
        self.stats.inc(TcpStat::BadSyn);
        self.finish(None, &mut seg, Outcome::DropWithResetRateLimited, now);
        Disposition::Consumed
    }

    /// Creates the connection of a completed handshake and processes its acknowledgement on it.
    fn promote(
        &self,
        entry: SynCacheEntry,
        mut seg: TcpSegment,
        listener: &dyn ListenSocket,
        now: u64,
    ) -> Disposition {
        let Some(socket) = listener.new_connection(entry.local(), entry.remote()) else {
            warn!("promote(): {:?} refused the connection from {}", listener.id(), entry.remote());
            self.output.respond(&Reply {
                src: seg.dst,
                dst: seg.src,
                seq: seg.tcp_hdr.ack_num,
                ack: SeqNumber::default(),
                ack_flag: false,
                rst: true,
                window: 0,
            });
            self.stats.inc(TcpStat::ScAborted);
            return Disposition::Consumed;
        };
        let mut cb: Box<ControlBlock> =
            Box::new(ControlBlock::from_syn_cache(self.config.clone(), &entry, socket, now));
        self.stats.inc(TcpStat::ScCompleted);
        self.stats.inc(TcpStat::Accepts);

        let outcome: Outcome = self.process(&mut cb, &mut seg, now);
        match self.finish(Some(&mut cb), &mut seg, outcome, now) {
            Disposition::Consumed => Disposition::Established(cb),
            disposition => disposition,
        }
    }

    /// Carries out the exit a segment took.
    fn finish(
        &self,
        mut cb: Option<&mut ControlBlock>,
        seg: &mut TcpSegment,
        outcome: Outcome,
        now: u64,
    ) -> Disposition {
        match outcome {
            Outcome::Consumed | Outcome::Drop | Outcome::Close | Outcome::Reprocess => (),
            Outcome::DropAfterAckRateLimited => {
                if self.ack_limiter.check(now) {
                    self.drop_after_ack(cb.as_deref_mut(), seg);
                } else {
                    self.stats.inc(TcpStat::AckDropRateLimited);
                }
            },
            Outcome::DropAfterAck => self.drop_after_ack(cb.as_deref_mut(), seg),
            Outcome::DropWithResetRateLimited => {
                if self.rst_limiter.check(now) {
                    self.drop_with_reset(seg);
                } else {
                    self.stats.inc(TcpStat::RstRateLimited);
                }
            },
            Outcome::DropWithReset => self.drop_with_reset(seg),
        }

        let Some(cb) = cb else {
            return Disposition::Consumed;
        };
        if outcome == Outcome::Reprocess {
            self.stats.inc(TcpStat::Closed);
            return Disposition::Reprocess(seg.clone());
        }
        if cb.state() == State::Closed {
            self.stats.inc(TcpStat::Closed);
            return Disposition::Closed;
        }
        Disposition::Consumed
    }

    /// Acknowledges and drops, unless the segment is a reset.
    fn drop_after_ack(&self, cb: Option<&mut ControlBlock>, seg: &TcpSegment) {
        if seg.tcp_hdr.rst {
            return;
        }
        if let Some(cb) = cb {
            cb.flags.ack_now = true;
            self.output.output(cb);
        }
    }

    /// Answers with a reset acceptable to the sender (RFC 793), unless the segment is a reset itself or was not sent to
    /// us alone.
    fn drop_with_reset(&self, seg: &TcpSegment) {
        let hdr = &seg.tcp_hdr;
        if hdr.rst || seg.link_multicast || is_multicast_or_broadcast(seg.dst.ip()) {
            return;
        }
        let reply: Reply = if hdr.ack {
            Reply {
                src: seg.dst,
                dst: seg.src,
                seq: hdr.ack_num,
                ack: SeqNumber::default(),
                ack_flag: false,
                rst: true,
                window: 0,
            }
        } else {
            let tlen: u32 = seg.tlen() + hdr.syn as u32;
            Reply {
                src: seg.dst,
                dst: seg.src,
                seq: SeqNumber::default(),
                ack: hdr.seq_num + tlen,
                ack_flag: true,
                rst: true,
                window: 0,
            }
        };
        trace!("drop_with_reset(): {:?}", reply);
        self.output.respond(&reply);
    }

    /// Runs the timers of `cb` due at `now`.
    pub fn connection_timers(&self, cb: &mut ControlBlock, now: u64) -> Disposition {
        cb.set_now(now);
        for kind in cb.timers.expired(now) {
            if cb.state() == State::Closed {
                break;
            }
            match kind {
                TimerKind::DelayedAck => {
                    cb.flags.ack_now = true;
                    self.output.output(cb);
                },
                TimerKind::Rexmt => self.retransmit_timeout(cb, now),
                TimerKind::Persist => {
                    let rto: u64 = cb.rto.rto();
                    cb.timers.arm(TimerKind::Persist, now, rto);
                    self.output.output(cb);
                },
                TimerKind::Keep => self.keep_timeout(cb, now),
                TimerKind::TwoMsl => {
                    let max_idle: u64 = self.config.get_max_idle();
                    let idle: u64 = now.saturating_sub(cb.rcvtime);
                    if cb.state() != State::TimeWait && (max_idle == 0 || idle <= max_idle) {
                        cb.timers.arm(TimerKind::TwoMsl, now, keep_interval(max_idle));
                    } else {
                        cb.close();
                    }
                },
            }
        }
        if cb.state() == State::Closed {
            self.stats.inc(TcpStat::Closed);
            return Disposition::Closed;
        }
        Disposition::Consumed
    }

    fn retransmit_timeout(&self, cb: &mut ControlBlock, now: u64) {
        if !cb.rto.back_off() {
            warn!("retransmit_timeout(): giving up on {}", cb.remote());
            let errno: i32 = cb.softerror.unwrap_or(ETIMEDOUT);
            cb.drop_connection(errno, &self.stats);
            return;
        }
        let rto: u64 = cb.rto.rto();
        cb.timers.arm(TimerKind::Rexmt, now, rto);
        if cb.state() == State::SynSent {
            cb.flags.syn_rexmt = true;
        }
        // Start over from the first unacknowledged byte with one segment.
        cb.snd_nxt = cb.snd_una;
        cb.snd_high = cb.snd_max;
        cb.rtttime = 0;
        let segsz: u32 = cb.segsz.max(1);
        let win: u32 = (cb.snd_wnd.min(cb.snd_cwnd) / 2 / segsz).max(2);
        cb.snd_ssthresh = win * segsz;
        cb.snd_cwnd = segsz;
        cb.snd_recover = cb.snd_max;
        cb.partialacks = -1;
        cb.dupacks = 0;
        cb.bytes_acked = 0;
        debug!("retransmit_timeout(): {} rxtshift={}", cb.remote(), cb.rto.rxtshift());
        self.output.output(cb);
    }

    fn keep_timeout(&self, cb: &mut ControlBlock, now: u64) {
        if !cb.state().have_established() {
            debug!("keep_timeout(): handshake with {} timed out", cb.remote());
            cb.drop_connection(ETIMEDOUT, &self.stats);
            return;
        }
        let keep_idle: u64 = self.config.get_keep_idle();
        let max_idle: u64 = self.config.get_max_idle();
        if cb.socket().keep_alive() && cb.state() <= State::CloseWait {
            if max_idle > 0 && now.saturating_sub(cb.rcvtime) >= keep_idle + max_idle {
                debug!("keep_timeout(): {} stopped answering", cb.remote());
                cb.drop_connection(ETIMEDOUT, &self.stats);
                return;
            }
            // The probe is an old acknowledgement, which the peer must answer.
            let window: u32 = (cb.socket().receive_space() >> cb.rcv_scale).min(u16::MAX as u32);
            self.output.respond(&Reply {
                src: cb.local(),
                dst: cb.remote(),
                seq: cb.snd_una - 1,
                ack: cb.rcv_nxt,
                ack_flag: true,
                rst: false,
                window: window as u16,
            });
            cb.timers.arm(TimerKind::Keep, now, keep_interval(max_idle));
        } else {
            cb.timers.arm(TimerKind::Keep, now, keep_idle);
        }
    }

    /// Reports that the peer of a half-open connection is unreachable.
    pub fn ctlinput_unreach(&self, local: &SocketAddr, remote: &SocketAddr, seq: SeqNumber) {
        self.syn_cache.unreach(local, remote, seq);
    }

    /// Forgets the half-open connections of a listener that went away.
    pub fn listener_closed(&self, listener: ListenerId) {
        self.syn_cache.cleanup(listener);
    }

    /// Runs the SYN cache timers due at `now`.
    pub fn advance_clock(&self, now: u64) {
        self.syn_cache.advance_clock(now, self.output.as_ref());
    }
}

/// Interval between keep-alive probes.
fn keep_interval(max_idle: u64) -> u64 {
    (max_idle / TCP_KEEPCNT).max(1)
}
