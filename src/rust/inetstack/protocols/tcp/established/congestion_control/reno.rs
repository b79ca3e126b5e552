// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// Reno congestion control (RFC 5681), with appropriate byte counting (RFC 3465).

use super::CongestionControl;
use crate::{
    inetstack::protocols::tcp::{
        established::{
            ctrlblk::ControlBlock,
            timers::TimerKind,
        },
        interface::TcpOutput,
        SeqNumber,
    },
    runtime::network::consts::TCP_MAXWIN,
};

#[derive(Debug)]
pub struct Reno;

impl Reno {
    /// Halves the window: ssthresh becomes half of the usable window, at least two segments.
    pub(super) fn congestion_exp(cb: &mut ControlBlock) {
        let segsz: u32 = cb.segsz.max(1);
        let win: u32 = (cb.snd_wnd.min(cb.snd_cwnd) / 2 / segsz).max(2);
        cb.snd_ssthresh = win * segsz;
        cb.snd_recover = cb.snd_max;
        cb.snd_cwnd = cb.snd_ssthresh;
        if cb.flags.ecn_permit {
            cb.flags.ecn_snd_cwr = true;
        }
    }

    /// Retransmits the segment at `ack` and inflates the window by the segments that left the network.
    pub(super) fn do_fast_retransmit(
        cb: &mut ControlBlock,
        ack: SeqNumber,
        output: &dyn TcpOutput,
        congestion_exp: fn(&mut ControlBlock),
    ) -> bool {
        let onxt: SeqNumber = cb.snd_nxt;
        congestion_exp(cb);
        cb.partialacks = 0;
        cb.timers.disarm(TimerKind::Rexmt);
        cb.rtttime = 0;
        if cb.flags.will_sack {
            cb.dupacks = cb.rexmt_thresh();
            cb.snd_cwnd = cb.segsz;
            output.output(cb);
            return true;
        }
        cb.snd_nxt = ack;
        cb.snd_cwnd = cb.segsz;
        output.output(cb);
        cb.snd_cwnd = cb.snd_ssthresh.saturating_add(cb.segsz.saturating_mul(cb.dupacks));
        if onxt > cb.snd_nxt {
            cb.snd_nxt = onxt;
        }
        true
    }

    /// Exits fast recovery on the first new acknowledgement.
    pub(super) fn exit_recovery(cb: &mut ControlBlock, ack: SeqNumber) {
        cb.partialacks = -1;
        cb.dupacks = 0;
        cb.bytes_acked = 0;
        if cb.flags.will_sack && ack > cb.snd_fack {
            cb.snd_fack = ack;
        }
    }

    /// Slow start below ssthresh, congestion avoidance above it.
    pub(super) fn open_window(cb: &mut ControlBlock, ack: SeqNumber) {
        let cw: u32 = cb.snd_cwnd;
        let mut incr: u32 = cb.segsz;
        if cb.config().get_abc() {
            let acked: u32 = (ack - cb.snd_una).into();
            if cw >= cb.snd_ssthresh {
                cb.bytes_acked = cb.bytes_acked.saturating_add(acked);
                if cb.bytes_acked < cw {
                    return;
                }
                cb.bytes_acked -= cw;
            } else {
                // After a retransmission timeout, only one segment per acknowledgement.
                let limit: u32 = if !cb.config().get_abc_aggressive() || cb.snd_nxt != cb.snd_max {
                    incr
                } else {
                    incr.saturating_mul(2)
                };
                incr = acked.min(limit);
            }
        } else if cw >= cb.snd_ssthresh {
            incr = incr.saturating_mul(incr) / cw.max(1);
        }
        let max_window: u32 = TCP_MAXWIN << cb.snd_scale;
        cb.snd_cwnd = cw.saturating_add(incr).min(max_window);
    }
}

impl CongestionControl for Reno {
    fn name(&self) -> &'static str {
        "reno"
    }

    fn fast_retransmit(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput) -> bool {
        Reno::do_fast_retransmit(cb, ack, output, Reno::congestion_exp)
    }

    fn fast_retransmit_newack(&self, cb: &mut ControlBlock, ack: SeqNumber, _output: &dyn TcpOutput) {
        if cb.partialacks < 0 {
            // Not in fast recovery.
            cb.dupacks = 0;
        } else {
            // Deflate the window to the crossover point.
            cb.snd_cwnd = cb.snd_cwnd.min(cb.snd_ssthresh);
            Reno::exit_recovery(cb, ack);
        }
    }

    fn newack(&self, cb: &mut ControlBlock, ack: SeqNumber) {
        Reno::open_window(cb, ack);
    }

    fn cong_exp(&self, cb: &mut ControlBlock) {
        Reno::congestion_exp(cb);
    }
}
