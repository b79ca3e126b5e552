// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// This is an implementation of CUBIC (RFC 8312). It only differs from NewReno in how the window grows during
// congestion avoidance and how much it shrinks on a congestion event; fast recovery is NewReno's.

use super::{
    newreno::NewReno,
    reno::Reno,
    CongestionControl,
};
use crate::{
    inetstack::protocols::tcp::{
        established::ctrlblk::ControlBlock,
        interface::TcpOutput,
        SeqNumber,
    },
    runtime::network::consts::{
        SLOW_HZ,
        TCP_MAXWIN,
    },
};

/// Per-connection CUBIC state.
#[derive(Clone, Copy, Debug, Default)]
pub struct CubicState {
    /// Window before the last congestion event, in bytes.
    pub w_max: u32,
    /// w_max before the previous congestion event, for fast convergence.
    pub w_max_last: u32,
    /// Tick at which the current congestion avoidance epoch started.
    pub epoch_start: u64,
}

#[derive(Debug)]
pub struct Cubic;

impl Cubic {
    const BETA_CUBIC: f32 = 0.7;
    // Cubic const parameters.
    const C: f32 = 0.4;

    fn congestion_exp(cb: &mut ControlBlock) {
        cb.cubic.epoch_start = cb.now();
        // Fast convergence: cede capacity to new flows when the window keeps shrinking.
        if cb.cubic.w_max < cb.cubic.w_max_last {
            cb.cubic.w_max_last = cb.cubic.w_max;
            cb.cubic.w_max = (cb.cubic.w_max as f32 * (1. + Self::BETA_CUBIC) / 2.) as u32;
        } else {
            cb.cubic.w_max_last = cb.cubic.w_max;
            cb.cubic.w_max = cb.snd_cwnd;
        }
        cb.cubic.w_max = cb.cubic.w_max.max(cb.segsz);

        let segsz: u32 = cb.segsz.max(1);
        let reduced: f32 = cb.snd_wnd.min(cb.snd_cwnd) as f32 * Self::BETA_CUBIC;
        let win: u32 = ((reduced as u32) / segsz).max(2);
        cb.snd_ssthresh = win * segsz;
        cb.snd_recover = cb.snd_max;
        cb.snd_cwnd = cb.snd_ssthresh;
        if cb.flags.ecn_permit {
            cb.flags.ecn_snd_cwr = true;
        }
    }

    fn k(w_max: f32) -> f32 {
        // w_max is normalised to units of MSS.
        (w_max * (1. - Self::BETA_CUBIC) / Self::C).cbrt()
    }

    fn w_cubic(w_max: f32, t: f32, k: f32) -> f32 {
        Self::C * (t - k).powi(3) + w_max
    }

    fn w_est(w_max: f32, t: f32, rtt: f32) -> f32 {
        let bc: f32 = Self::BETA_CUBIC;
        w_max * bc + ((3. * (1. - bc) / (1. + bc)) * t / rtt)
    }

    fn congestion_avoidance(cb: &mut ControlBlock) {
        let mss: f32 = cb.segsz.max(1) as f32;
        let rtt: f32 = (cb.rto.srtt() >> 5) as f32 / SLOW_HZ as f32;
        let t: f32 = cb.now().saturating_sub(cb.cubic.epoch_start) as f32 / SLOW_HZ as f32;
        let w_max: f32 = cb.cubic.w_max as f32 / mss;
        let cwnd: f32 = cb.snd_cwnd as f32 / mss;
        let k: f32 = Self::k(w_max);

        let w_est: f32 = Self::w_est(w_max, t, rtt);
        let next: f32 = if Self::w_cubic(w_max, t, k) < w_est {
            // TCP friendly region.
            w_est
        } else {
            let target: f32 = Self::w_cubic(w_max, t + rtt, k);
            cwnd + ((target - cwnd) / cwnd).max(0.)
        };
        let max_window: u32 = TCP_MAXWIN << cb.snd_scale;
        cb.snd_cwnd = ((next * mss) as u32).clamp(cb.segsz.min(max_window), max_window);
    }
}

impl CongestionControl for Cubic {
    fn name(&self) -> &'static str {
        "cubic"
    }

    fn fast_retransmit(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput) -> bool {
        if ack < cb.snd_high {
            cb.dupacks = 0;
            return false;
        }
        Reno::do_fast_retransmit(cb, ack, output, Cubic::congestion_exp)
    }

    fn fast_retransmit_newack(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput) {
        NewReno::recovery_newack(cb, ack, output);
    }

    fn newack(&self, cb: &mut ControlBlock, ack: SeqNumber) {
        if cb.partialacks >= 0 {
            return;
        }
        if cb.snd_cwnd > cb.snd_ssthresh && cb.rto.srtt() >> 5 > 0 {
            Cubic::congestion_avoidance(cb);
        } else {
            Reno::open_window(cb, ack);
        }
    }

    fn cong_exp(&self, cb: &mut ControlBlock) {
        Cubic::congestion_exp(cb);
    }
}
