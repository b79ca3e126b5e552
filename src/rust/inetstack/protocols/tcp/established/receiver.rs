// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use super::{
    congestion_control,
    ctrlblk::{
        ControlBlock,
        State,
    },
    timers::TimerKind,
};
use crate::{
    inetstack::protocols::tcp::{
        interface::{
            Reply,
            TcpOutput,
        },
        options::TcpOptionInfo,
        segment::{
            IpEcn,
            TcpHeader,
            TcpSegment,
        },
        sequence_number::{
            tstmp_geq,
            tstmp_lt,
        },
        signature::{
            self,
            SignatureKeys,
        },
        stats::{
            TcpStat,
            TcpStats,
        },
        SeqNumber,
    },
    runtime::network::consts::{
        TCP_MAXWIN,
        TCP_PAWS_IDLE,
    },
};
use ::libc::{
    ECONNREFUSED,
    ECONNRESET,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// How a segment left the receive pipeline. Everything but [Outcome::Consumed] asks the dispatcher for a side effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Fully processed, output already done.
    Consumed,
    Drop,
    /// Drop, but acknowledge first.
    DropAfterAck,
    /// As [Outcome::DropAfterAck], subject to the ACK rate limit.
    DropAfterAckRateLimited,
    /// Drop and answer with a reset.
    DropWithReset,
    /// As [Outcome::DropWithReset], subject to the RST rate limit.
    DropWithResetRateLimited,
    /// The connection is closed and must be released.
    Close,
    /// The connection is closed and the segment must be dispatched again.
    Reprocess,
}

/// What a segment is processed with, besides its connection.
pub struct InputContext<'a> {
    pub output: &'a dyn TcpOutput,
    pub stats: &'a TcpStats,
    pub keys: Option<&'a dyn SignatureKeys>,
    pub now: u64,
}

type Step = Result<(), Outcome>;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ControlBlock {
    /// Runs one segment through the receive pipeline. The segment is trimmed in place, so the dispatcher answers resets
    /// based on what was left of it.
    pub(crate) fn process(&mut self, seg: &mut TcpSegment, ctx: &InputContext) -> Outcome {
        match self.process_inner(seg, ctx) {
            Ok(()) => Outcome::Consumed,
            Err(outcome) => outcome,
        }
    }

    fn process_inner(&mut self, seg: &mut TcpSegment, ctx: &InputContext) -> Step {
        self.set_now(ctx.now);
        self.rcvtime = ctx.now;
        if self.state.have_established() {
            let keep_idle: u64 = self.config().get_keep_idle();
            self.timers.arm(TimerKind::Keep, ctx.now, keep_idle);
        }

        let negotiable: bool = seg.tcp_hdr.syn && !self.state.have_received_syn();
        let opts: TcpOptionInfo = match TcpOptionInfo::parse(&seg.tcp_hdr.options, negotiable) {
            Ok(opts) => opts,
            Err(e) => {
                warn!("dropping segment from {}: {:?}", seg.src, e);
                return Err(Outcome::Drop);
            },
        };
        if let Err(e) = signature::verify(&opts, self.flags.signature, seg, ctx.keys, ctx.stats) {
            trace!("dropping segment from {}: {:?}", seg.src, e);
            return Err(Outcome::Drop);
        }
        if negotiable {
            self.negotiate(&opts);
        }
        if seg.tcp_hdr.ack {
            self.sack_option(&opts);
        }
        self.ecn_input(seg, ctx);

        // Round-trip sample from the echoed timestamp, plus one so that zero means none.
        let ts_rtt: u32 = match opts.timestamp {
            Some(ts) if ts.ecr != 0 => {
                let rtt: u32 = self.timestamp().wrapping_sub(ts.ecr).wrapping_add(1);
                if rtt as u64 > TCP_PAWS_IDLE {
                    0
                } else {
                    rtt
                }
            },
            _ => 0,
        };

        // The window in a SYN is never scaled.
        let tiwin: u32 = if seg.tcp_hdr.syn {
            seg.tcp_hdr.window_size as u32
        } else {
            (seg.tcp_hdr.window_size as u32) << self.snd_scale
        };

        if self.header_prediction(seg, &opts, tiwin, ts_rtt, ctx) {
            return Ok(());
        }

        let space: u32 = self.socket.receive_space();
        self.rcv_wnd = space.max(self.rcv_adv.delta(self.rcv_nxt).max(0) as u32);

        let mut needoutput: bool = false;
        if self.state == State::SynSent {
            self.syn_sent(seg, &opts, ctx)?;
        } else {
            self.synchronized(seg, &opts, tiwin, ts_rtt, &mut needoutput, ctx)?;
        }

        self.update_window(seg, tiwin, ctx.stats, &mut needoutput);
        let tlen: u32 = seg.tlen();
        self.urgent(seg, tlen);
        let fin: bool = self.data(seg, tlen, ctx.stats);
        if fin {
            self.fin();
        }

        if needoutput || self.flags.ack_now {
            ctx.output.output(self);
        }
        Ok(())
    }

    /// Options that only count on the SYN that opens the connection.
    fn negotiate(&mut self, opts: &TcpOptionInfo) {
        if let Some(shift) = opts.window_scale {
            self.flags.rcvd_scale = true;
            self.requested_s_scale = shift;
        }
        if let Some(ts) = opts.timestamp {
            self.flags.rcvd_tstmp = true;
            self.ts_recent = ts.val;
            self.ts_recent_age = self.tcp_now();
        }
        if opts.sack_permitted && self.flags.sack_permit && self.config().get_sack() {
            self.flags.will_sack = true;
        }
    }

    /// Moves the forward-most acknowledged marker along the peer's SACK blocks.
    fn sack_option(&mut self, opts: &TcpOptionInfo) {
        if !self.flags.will_sack {
            return;
        }
        for block in &opts.sack_blocks {
            if block.start >= block.end || block.end <= self.snd_una || block.end > self.snd_max {
                continue;
            }
            if block.end > self.snd_fack {
                self.snd_fack = block.end;
            }
        }
    }

    fn ecn_input(&mut self, seg: &TcpSegment, ctx: &InputContext) {
        if !self.flags.ecn_permit {
            return;
        }
        if seg.tcp_hdr.cwr {
            self.flags.ecn_snd_ece = false;
        }
        if seg.ecn == IpEcn::Ce {
            self.flags.ecn_snd_ece = true;
            ctx.stats.inc(TcpStat::EcnCe);
        }
        if seg.tcp_hdr.ece && self.snd_una >= self.snd_recover {
            ctx.stats.inc(TcpStat::EcnEce);
            let cc = self.congestion_control();
            cc.cong_exp(self);
        }
    }

    /// Fast path for a pure acknowledgement of new data or in-order data on an idle sender. Returns whether the
    /// segment was handled.
    fn header_prediction(
        &mut self,
        seg: &mut TcpSegment,
        opts: &TcpOptionInfo,
        tiwin: u32,
        ts_rtt: u32,
        ctx: &InputContext,
    ) -> bool {
        let hdr = &seg.tcp_hdr;
        let only_ack: bool = hdr.ack && !(hdr.syn || hdr.fin || hdr.rst || hdr.urg || hdr.ece || hdr.cwr);
        if self.state != State::Established
            || !only_ack
            || opts.timestamp.is_some_and(|ts| !tstmp_geq(ts.val, self.ts_recent))
            || hdr.seq_num != self.rcv_nxt
            || tiwin == 0
            || tiwin != self.snd_wnd
            || self.snd_nxt != self.snd_max
        {
            return false;
        }
        let seq: SeqNumber = hdr.seq_num;
        let ack: SeqNumber = hdr.ack_num;
        let psh: bool = hdr.psh;
        let tlen: u32 = seg.tlen();

        if let Some(ts) = opts.timestamp {
            if seq <= self.last_ack_sent {
                self.ts_recent_age = self.tcp_now();
                self.ts_recent = ts.val;
            }
        }

        if tlen == 0 {
            if ack > self.snd_una && ack <= self.snd_max && self.snd_cwnd >= self.snd_wnd && self.partialacks < 0 {
                ctx.stats.inc(TcpStat::PredAck);
                self.rtt_sample(ack, ts_rtt, ctx.stats);
                let acked: u32 = (ack - self.snd_una).into();
                ctx.stats.inc(TcpStat::RcvAckPack);
                ctx.stats.add(TcpStat::RcvAckByte, acked as u64);
                self.socket.drop_sent(acked);
                self.snd_una = ack;
                self.snd_fack = self.snd_una;
                if self.snd_high < self.snd_una {
                    self.snd_high = self.snd_una;
                }
                self.restart_rexmt();
                self.socket.wake_writers();
                if self.socket.send_buffered() > 0 {
                    ctx.output.output(self);
                }
                trace!("header_prediction(): ack {}", ack);
                return true;
            }
        } else if ack == self.snd_una && self.reass.is_empty() && tlen <= self.socket.receive_space() {
            ctx.stats.inc(TcpStat::PredDat);
            self.rcv_nxt += tlen;
            ctx.stats.inc(TcpStat::RcvPack);
            ctx.stats.add(TcpStat::RcvByte, tlen as u64);
            if !self.socket.cant_receive_more() {
                self.socket.append(std::mem::take(&mut seg.data));
            }
            self.setup_ack(psh);
            if self.flags.ack_now {
                ctx.output.output(self);
            }
            trace!("header_prediction(): {} bytes at {}", tlen, seq);
            return true;
        }
        false
    }

    fn syn_sent(&mut self, seg: &mut TcpSegment, opts: &TcpOptionInfo, ctx: &InputContext) -> Step {
        let hdr = &seg.tcp_hdr;
        if hdr.ack && (hdr.ack_num <= self.iss || hdr.ack_num > self.snd_max) {
            return Err(Outcome::DropWithReset);
        }
        if hdr.rst {
            if hdr.ack {
                debug!("syn_sent(): connection to {} refused", self.remote());
                self.drop_connection(ECONNREFUSED, ctx.stats);
                return Err(Outcome::Close);
            }
            return Err(Outcome::Drop);
        }
        if !hdr.syn {
            return Err(Outcome::Drop);
        }
        if hdr.ack {
            self.snd_una = hdr.ack_num;
            if self.snd_nxt < self.snd_una {
                self.snd_nxt = self.snd_una;
            }
            if self.snd_high < self.snd_una {
                self.snd_high = self.snd_una;
            }
            self.timers.disarm(TimerKind::Rexmt);
            if hdr.ece && self.config().get_ecn() {
                self.flags.ecn_permit = true;
            }
        }
        self.irs = hdr.seq_num;
        self.receive_seq_init();
        self.flags.ack_now = true;
        self.mss_from_peer(opts.maxseg);
        self.snd_cwnd = if self.flags.syn_rexmt {
            self.peermss
        } else {
            self.initial_window()
        };

        if hdr.ack {
            ctx.stats.inc(TcpStat::Connects);
            self.established();
            self.enable_window_scaling();
            self.reass.present(&mut self.rcv_nxt, self.socket.as_mut());
            if self.rtttime != 0 {
                let rtt: u32 = self.tcp_now().wrapping_sub(self.rtttime);
                self.xmit_timer(rtt, ctx.stats);
            }
            debug!("syn_sent(): {} <-> {} established", self.local(), self.remote());
        } else {
            self.state = State::SynReceived;
            debug!("syn_sent(): simultaneous open with {}", self.remote());
        }

        // The SYN takes one sequence number. Data beyond the window is dropped along with the FIN.
        seg.tcp_hdr.seq_num += 1;
        let tlen: u32 = seg.tlen();
        if tlen > self.rcv_wnd {
            let todrop: u32 = tlen - self.rcv_wnd;
            seg.data.truncate(self.rcv_wnd as usize);
            seg.tcp_hdr.fin = false;
            ctx.stats.inc(TcpStat::RcvPackAfterWin);
            ctx.stats.add(TcpStat::RcvByteAfterWin, todrop as u64);
        }
        self.snd_wl1 = seg.tcp_hdr.seq_num - 1;
        self.rcv_up = seg.tcp_hdr.seq_num;
        Ok(())
    }

    /// Everything between the receive window computation and the window update, for states past SYN_SENT.
    fn synchronized(
        &mut self,
        seg: &mut TcpSegment,
        opts: &TcpOptionInfo,
        tiwin: u32,
        ts_rtt: u32,
        needoutput: &mut bool,
        ctx: &InputContext,
    ) -> Step {
        if self.state == State::SynReceived
            && seg.tcp_hdr.ack
            && (seg.tcp_hdr.ack_num <= self.snd_una || seg.tcp_hdr.ack_num > self.snd_max)
        {
            return Err(Outcome::DropWithReset);
        }

        self.paws(seg, opts, ctx.stats)?;
        let dupseg: bool = self.trim_left(seg, ctx.stats)?;

        if !self.socket.has_file_reference() && self.state > State::CloseWait && seg.tlen() > 0 {
            self.close();
            ctx.stats.inc(TcpStat::RcvAfterClose);
            return Err(Outcome::DropWithReset);
        }

        self.trim_right(seg, ctx.stats)?;

        if let Some(ts) = opts.timestamp {
            let syn_or_fin: u32 = (seg.tcp_hdr.syn || seg.tcp_hdr.fin) as u32;
            let seq: SeqNumber = seg.tcp_hdr.seq_num;
            if seq <= self.last_ack_sent && self.last_ack_sent <= seq + seg.tlen() + syn_or_fin {
                self.ts_recent_age = self.tcp_now();
                self.ts_recent = ts.val;
            }
        }

        if seg.tcp_hdr.rst {
            return Err(self.reset_received(seg, ctx.stats));
        }

        if seg.tcp_hdr.syn {
            if seg.tcp_hdr.seq_num == self.rcv_nxt {
                let window: u32 = (self.socket.receive_space() >> self.rcv_scale).min(TCP_MAXWIN);
                ctx.output.respond(&Reply {
                    src: seg.dst,
                    dst: seg.src,
                    seq: seg.tcp_hdr.ack_num - 1,
                    ack: self.rcv_nxt,
                    ack_flag: true,
                    rst: false,
                    window: window as u16,
                });
                return Err(Outcome::Consumed);
            }
            return Err(Outcome::DropAfterAckRateLimited);
        }

        if !seg.tcp_hdr.ack {
            if self.flags.ack_now {
                return Err(Outcome::DropAfterAck);
            }
            return Err(Outcome::Drop);
        }

        self.ack_received(seg, tiwin, ts_rtt, dupseg, needoutput, ctx)
    }

    /// Protection against wrapped sequence numbers (RFC 1323).
    fn paws(&mut self, seg: &TcpSegment, opts: &TcpOptionInfo, stats: &TcpStats) -> Step {
        let Some(ts) = opts.timestamp else {
            return Ok(());
        };
        if seg.tcp_hdr.rst || self.ts_recent == 0 || !tstmp_lt(ts.val, self.ts_recent) {
            return Ok(());
        }
        let idle: u32 = self.tcp_now().wrapping_sub(self.ts_recent_age);
        if idle as i32 as i64 > self.config().get_paws_idle() as i64 {
            // The timestamp is too old to tell; stop using it.
            self.ts_recent = 0;
            return Ok(());
        }
        let tlen: u32 = seg.tlen();
        stats.inc(TcpStat::RcvDupPack);
        stats.add(TcpStat::RcvDupByte, tlen as u64);
        stats.inc(TcpStat::PawsDrop);
        self.new_dsack(seg.tcp_hdr.seq_num, tlen);
        trace!("paws(): stale timestamp {} < {}", ts.val, self.ts_recent);
        Err(Outcome::DropAfterAck)
    }

    /// Drops what was already received from the front of the segment. Returns whether the whole segment was a
    /// duplicate.
    fn trim_left(&mut self, seg: &mut TcpSegment, stats: &TcpStats) -> Result<bool, Outcome> {
        let mut todrop: i32 = self.rcv_nxt.delta(seg.tcp_hdr.seq_num);
        if todrop <= 0 {
            return Ok(false);
        }
        let mut dupseg: bool = false;
        let hdr = &mut seg.tcp_hdr;
        if hdr.syn {
            hdr.syn = false;
            hdr.seq_num += 1;
            drop_urgent(hdr, 1);
            todrop -= 1;
        }
        let tlen: i32 = seg.data.len() as i32;
        let hdr = &mut seg.tcp_hdr;
        if todrop > tlen || (todrop == tlen && !hdr.fin) {
            if hdr.rst {
                return Err(Outcome::Drop);
            }
            hdr.fin = false;
            hdr.rst = false;
            self.flags.ack_now = true;
            todrop = tlen;
            dupseg = true;
            stats.inc(TcpStat::RcvDupPack);
            stats.add(TcpStat::RcvDupByte, todrop as u64);
        } else if hdr.rst && hdr.seq_num != self.rcv_nxt {
            return Err(Outcome::DropAfterAckRateLimited);
        } else {
            stats.inc(TcpStat::RcvPartDupPack);
            stats.add(TcpStat::RcvPartDupByte, todrop as u64);
        }
        let todrop: u32 = todrop as u32;
        self.new_dsack(hdr.seq_num, todrop);
        hdr.seq_num += todrop;
        drop_urgent(hdr, todrop);
        seg.data.drain(..todrop as usize);
        Ok(dupseg)
    }

    /// Drops what lies beyond the receive window from the back of the segment.
    fn trim_right(&mut self, seg: &mut TcpSegment, stats: &TcpStats) -> Step {
        let tlen: u32 = seg.tlen();
        let todrop: i32 = (seg.tcp_hdr.seq_num + tlen).delta(self.rcv_nxt + self.rcv_wnd);
        if todrop <= 0 {
            return Ok(());
        }
        let todrop: u32 = todrop as u32;
        stats.inc(TcpStat::RcvPackAfterWin);
        if todrop >= tlen {
            stats.add(TcpStat::RcvByteAfterWin, tlen as u64);
            // A new SYN for an old connection in TIME_WAIT opens a new connection.
            if seg.tcp_hdr.syn && self.state == State::TimeWait && seg.tcp_hdr.seq_num > self.rcv_nxt {
                debug!("trim_right(): new connection from {} over TIME_WAIT", self.remote());
                self.close();
                return Err(Outcome::Reprocess);
            }
            if self.rcv_wnd == 0 && seg.tcp_hdr.seq_num == self.rcv_nxt {
                self.flags.ack_now = true;
                stats.inc(TcpStat::RcvWinProbe);
            } else {
                return Err(Outcome::DropAfterAck);
            }
        } else {
            stats.add(TcpStat::RcvByteAfterWin, todrop as u64);
        }
        seg.data.truncate(tlen.saturating_sub(todrop) as usize);
        seg.tcp_hdr.psh = false;
        seg.tcp_hdr.fin = false;
        Ok(())
    }

    fn reset_received(&mut self, seg: &TcpSegment, stats: &TcpStats) -> Outcome {
        if seg.tcp_hdr.seq_num != self.rcv_nxt {
            return Outcome::DropAfterAckRateLimited;
        }
        debug!("reset_received(): {} in {:?}", self.remote(), self.state);
        match self.state {
            State::SynReceived => {
                self.socket.set_error(ECONNREFUSED);
                stats.inc(TcpStat::Drops);
                self.close();
            },
            State::Established | State::FinWait1 | State::FinWait2 | State::CloseWait => {
                self.socket.set_error(ECONNRESET);
                stats.inc(TcpStat::Drops);
                self.close();
            },
            State::Closing | State::LastAck | State::TimeWait => self.close(),
            _ => return Outcome::Drop,
        }
        Outcome::Close
    }

    fn ack_received(
        &mut self,
        seg: &TcpSegment,
        tiwin: u32,
        ts_rtt: u32,
        dupseg: bool,
        needoutput: &mut bool,
        ctx: &InputContext,
    ) -> Step {
        let seq: SeqNumber = seg.tcp_hdr.seq_num;
        let ack: SeqNumber = seg.tcp_hdr.ack_num;
        let tlen: u32 = seg.tlen();
        let cc = self.congestion_control();

        if self.state == State::SynReceived {
            if self.snd_una > ack || ack > self.snd_max {
                return Err(Outcome::DropWithReset);
            }
            ctx.stats.inc(TcpStat::Connects);
            self.established();
            self.enable_window_scaling();
            self.reass.present(&mut self.rcv_nxt, self.socket.as_mut());
            self.snd_wl1 = seq - 1;
            debug!("ack_received(): {} <-> {} established", self.local(), self.remote());
        }

        if ack <= self.snd_una {
            if tlen == 0 && !dupseg && tiwin == self.snd_wnd {
                ctx.stats.inc(TcpStat::RcvDupAck);
                let thresh: u32 = self.rexmt_thresh();
                if !self.timers.is_armed(TimerKind::Rexmt) || ack != self.snd_una {
                    self.dupacks = 0;
                } else {
                    // Duplicates are only counted outside of recovery.
                    let mut trigger: bool = false;
                    if self.partialacks < 0 {
                        self.dupacks += 1;
                        trigger = self.dupacks == thresh || congestion_control::fack_fast_recovery(self, thresh);
                    }
                    if trigger {
                        trace!("ack_received(): fast retransmit at {}", ack);
                        if cc.fast_retransmit(self, ack, ctx.output) {
                            return Err(Outcome::Drop);
                        }
                    } else if self.dupacks > thresh {
                        self.snd_cwnd = self.snd_cwnd.saturating_add(self.segsz);
                        ctx.output.output(self);
                        return Err(Outcome::Drop);
                    }
                }
            } else if tlen > 0 && seq != self.rcv_nxt && ack < self.snd_una - self.max_sndwnd {
                // Very old acknowledgements only come with in-sequence data.
                return Err(Outcome::DropAfterAck);
            }
            return Ok(());
        }

        cc.fast_retransmit_newack(self, ack, ctx.output);
        if ack > self.snd_max {
            ctx.stats.inc(TcpStat::RcvAckTooMuch);
            return Err(Outcome::DropAfterAck);
        }
        let acked: u32 = (ack - self.snd_una).into();
        ctx.stats.inc(TcpStat::RcvAckPack);
        ctx.stats.add(TcpStat::RcvAckByte, acked as u64);

        self.rtt_sample(ack, ts_rtt, ctx.stats);

        if ack == self.snd_max {
            self.timers.disarm(TimerKind::Rexmt);
            *needoutput = true;
        } else if !self.timers.is_armed(TimerKind::Persist) {
            let rto: u64 = self.rto.rto();
            self.timers.arm(TimerKind::Rexmt, ctx.now, rto);
        }

        cc.newack(self, ack);

        let buffered: u32 = self.socket.send_buffered();
        let ourfinisacked: bool = if acked > buffered {
            self.snd_wnd = self.snd_wnd.saturating_sub(buffered);
            self.socket.drop_sent(buffered);
            true
        } else {
            self.socket.drop_sent(acked);
            self.snd_wnd = self.snd_wnd.saturating_sub(acked);
            false
        };
        self.socket.wake_writers();

        self.snd_una = ack;
        if self.snd_una > self.snd_fack {
            self.snd_fack = self.snd_una;
        }
        if self.snd_nxt < self.snd_una {
            self.snd_nxt = self.snd_una;
        }
        if self.snd_high < self.snd_una {
            self.snd_high = self.snd_una;
        }

        match self.state {
            State::FinWait1 if ourfinisacked => {
                // Nothing more will be read: do not linger in FIN_WAIT_2 forever.
                if self.socket.cant_receive_more() {
                    self.socket.disconnected();
                    let max_idle: u64 = self.config().get_max_idle();
                    if max_idle > 0 {
                        self.timers.arm(TimerKind::TwoMsl, ctx.now, max_idle);
                    }
                }
                self.state = State::FinWait2;
            },
            State::Closing if ourfinisacked => self.enter_time_wait(),
            State::LastAck if ourfinisacked => {
                self.close();
                return Err(Outcome::Close);
            },
            State::TimeWait => {
                // Only a retransmitted FIN gets here; acknowledge it again.
                self.arm_two_msl();
                return Err(Outcome::DropAfterAck);
            },
            _ => (),
        }
        Ok(())
    }

    /// Updates the send window, unless the segment is older than the one it was last updated from.
    fn update_window(&mut self, seg: &TcpSegment, tiwin: u32, stats: &TcpStats, needoutput: &mut bool) {
        let seq: SeqNumber = seg.tcp_hdr.seq_num;
        let ack: SeqNumber = seg.tcp_hdr.ack_num;
        if !seg.tcp_hdr.ack {
            return;
        }
        let newer: bool = self.snd_wl1 < seq
            || (self.snd_wl1 == seq && (self.snd_wl2 < ack || (self.snd_wl2 == ack && tiwin > self.snd_wnd)));
        if !newer {
            return;
        }
        if seg.tlen() == 0 && self.snd_wl2 == ack && tiwin > self.snd_wnd {
            stats.inc(TcpStat::RcvWinUpd);
        }
        self.snd_wnd = tiwin;
        self.snd_wl1 = seq;
        self.snd_wl2 = ack;
        if self.snd_wnd > self.max_sndwnd {
            self.max_sndwnd = self.snd_wnd;
        }
        *needoutput = true;
    }

    fn urgent(&mut self, seg: &mut TcpSegment, tlen: u32) {
        let urp: u32 = seg.tcp_hdr.urgent_pointer as u32;
        if !(seg.tcp_hdr.urg && urp != 0 && !self.state.have_received_fin()) {
            if self.rcv_nxt > self.rcv_up {
                self.rcv_up = self.rcv_nxt;
            }
            return;
        }
        let buffered: u32 = self.socket.receive_buffered();
        if urp.saturating_add(buffered) > self.config().get_sb_max() {
            seg.tcp_hdr.urgent_pointer = 0;
            seg.tcp_hdr.urg = false;
            return;
        }
        let seq: SeqNumber = seg.tcp_hdr.seq_num;
        if seq + urp > self.rcv_up {
            self.rcv_up = seq + urp;
            let mark: u32 = (buffered + u32::from(self.rcv_up - self.rcv_nxt)).saturating_sub(1);
            self.socket.out_of_band(mark);
            self.oob_have_data = false;
            self.oob_had_data = false;
        }
        if urp <= tlen && !self.socket.oob_inline() {
            let at: usize = (urp - 1) as usize;
            self.iobc = seg.data[at];
            self.oob_have_data = true;
            if self.in_order(seg) {
                seg.data.remove(at);
            } else {
                self.reass.mark_urgent(seq + (urp - 1));
            }
        }
    }

    fn in_order(&self, seg: &TcpSegment) -> bool {
        seg.tcp_hdr.seq_num == self.rcv_nxt && self.reass.is_empty() && self.state == State::Established
    }

    /// Delivers or queues the data of the segment. Returns whether a FIN is now in order.
    fn data(&mut self, seg: &mut TcpSegment, tlen: u32, stats: &TcpStats) -> bool {
        if !((tlen > 0 || seg.tcp_hdr.fin) && !self.state.have_received_fin()) {
            return false;
        }
        if self.in_order(seg) {
            self.setup_ack(seg.tcp_hdr.psh);
            self.rcv_nxt += tlen;
            stats.inc(TcpStat::RcvPack);
            stats.add(TcpStat::RcvByte, tlen as u64);
            if !self.socket.cant_receive_more() && !seg.data.is_empty() {
                self.socket.append(std::mem::take(&mut seg.data));
            }
            return seg.tcp_hdr.fin;
        }
        let data: Vec<u8> = std::mem::take(&mut seg.data);
        if let Some(dup) = self.reass.insert(seg.tcp_hdr.seq_num, data, seg.tcp_hdr.fin, stats) {
            self.new_dsack(dup.start, u32::from(dup.end - dup.start));
        }
        let fin: bool = if self.state.have_established() {
            self.reass.present(&mut self.rcv_nxt, self.socket.as_mut())
        } else {
            false
        };
        self.flags.ack_now = true;
        fin
    }

    fn fin(&mut self) {
        if !self.state.have_received_fin() {
            self.socket.mark_cant_receive_more();
            self.flags.ack_now = true;
            self.rcv_nxt += 1;
        }
        match self.state {
            State::SynReceived | State::Established => self.state = State::CloseWait,
            State::FinWait1 => self.state = State::Closing,
            State::FinWait2 => self.enter_time_wait(),
            State::TimeWait => self.arm_two_msl(),
            _ => (),
        }
        debug!("fin(): {} now {:?}", self.remote(), self.state);
    }

    /// Takes a round-trip sample for an acknowledgement, preferring the echoed timestamp.
    fn rtt_sample(&mut self, ack: SeqNumber, ts_rtt: u32, stats: &TcpStats) {
        if ts_rtt != 0 {
            self.xmit_timer(ts_rtt - 1, stats);
        } else if self.rtttime != 0 && ack > self.rtseq {
            let rtt: u32 = self.tcp_now().wrapping_sub(self.rtttime);
            self.xmit_timer(rtt, stats);
        }
    }

    fn restart_rexmt(&mut self) {
        if self.snd_una == self.snd_max {
            self.timers.disarm(TimerKind::Rexmt);
        } else if !self.timers.is_armed(TimerKind::Persist) {
            let rto: u64 = self.rto.rto();
            let now: u64 = self.now();
            self.timers.arm(TimerKind::Rexmt, now, rto);
        }
    }
}

/// Moves the urgent pointer back over `todrop` bytes trimmed from the front of a segment.
fn drop_urgent(hdr: &mut TcpHeader, todrop: u32) {
    if hdr.urgent_pointer as u32 > todrop {
        hdr.urgent_pointer -= todrop as u16;
    } else {
        hdr.urg = false;
        hdr.urgent_pointer = 0;
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
