// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// NewReno modification to fast recovery (RFC 6582).

use super::{
    reno::Reno,
    CongestionControl,
};
use crate::inetstack::protocols::tcp::{
    established::{
        ctrlblk::ControlBlock,
        timers::TimerKind,
    },
    interface::TcpOutput,
    SeqNumber,
};

#[derive(Debug)]
pub struct NewReno;

impl NewReno {
    /// Handles an acknowledgement received while in fast recovery.
    pub(super) fn recovery_newack(
        cb: &mut ControlBlock,
        ack: SeqNumber,
        output: &dyn TcpOutput,
    ) {
        if cb.partialacks < 0 {
            cb.dupacks = 0;
        } else if ack < cb.snd_recover {
            // Partial acknowledgement: retransmit the next hole and stay in recovery.
            let onxt: SeqNumber = cb.snd_nxt;
            let ocwnd: u32 = cb.snd_cwnd;
            let acked: u32 = (ack - cb.snd_una).into();
            cb.partialacks += 1;
            cb.timers.disarm(TimerKind::Rexmt);
            cb.rtttime = 0;
            cb.snd_nxt = ack;
            cb.snd_cwnd = cb.segsz.saturating_add(acked);
            output.output(cb);
            cb.snd_cwnd = ocwnd;
            if onxt > cb.snd_nxt {
                cb.snd_nxt = onxt;
            }
            // Partial window deflation; snd_una has not moved yet.
            cb.snd_cwnd = cb.snd_cwnd.saturating_sub(acked.saturating_sub(cb.segsz));
        } else {
            // Complete acknowledgement: deflate to ssthresh and leave recovery.
            let outstanding: u32 = (cb.snd_max - ack).into();
            cb.snd_cwnd = if outstanding < cb.snd_ssthresh {
                outstanding.saturating_add(cb.segsz)
            } else {
                cb.snd_ssthresh
            };
            Reno::exit_recovery(cb, ack);
        }
    }
}

impl CongestionControl for NewReno {
    fn name(&self) -> &'static str {
        "newreno"
    }

    fn fast_retransmit(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput) -> bool {
        if ack < cb.snd_high {
            // False fast retransmit after a timeout: the duplicates are for data sent before it.
            cb.dupacks = 0;
            return false;
        }
        Reno::do_fast_retransmit(cb, ack, output, Reno::congestion_exp)
    }

    fn fast_retransmit_newack(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput) {
        NewReno::recovery_newack(cb, ack, output);
    }

    fn newack(&self, cb: &mut ControlBlock, ack: SeqNumber) {
        // Do not inflate the window while partial acknowledgements keep us in recovery.
        if cb.partialacks < 0 {
            Reno::open_window(cb, ack);
        }
    }

    fn cong_exp(&self, cb: &mut ControlBlock) {
        Reno::congestion_exp(cb);
    }
}
