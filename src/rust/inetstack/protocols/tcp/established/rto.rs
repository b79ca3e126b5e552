// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::runtime::network::consts::{
    TCPTV_MIN,
    TCPTV_REXMTMAX,
    TCPTV_SRTTDFLT,
    TCP_BACKOFF,
    TCP_MAXRXTSHIFT,
};

// TCP Retransmission Timeout (RTO) Calculator.
// See RFC 6298 for details.
//
// Values are kept in fixed point: srtt in 1/32 ticks and rttvar in 1/16 ticks. Smoothing uses shifts, alpha = 1/8 and
// beta = 1/4.

const TCP_RTT_SHIFT: u32 = 3;
const TCP_RTTVAR_SHIFT: u32 = 2;

#[derive(Debug)]
pub struct RtoCalculator {
    // Smoothed round-trip time, in 1/32 ticks. Zero until the first sample.
    srtt: i32,

    // Round-trip time variation, in 1/16 ticks.
    rttvar: i32,

    // Current retransmission timeout, in ticks.
    rxtcur: u64,

    // Lower bound on the retransmission timeout.
    rttmin: u64,

    // Number of consecutive retransmissions.
    rxtshift: u32,
}

impl RtoCalculator {
    /// Initializes an RTO Calculator. Before the first sample the timeout assumes the default round-trip time.
    pub fn new(rttmin: u64) -> Self {
        let srtt: i32 = 0;
        let rttvar: i32 = (TCPTV_SRTTDFLT as i32) << (TCP_RTTVAR_SHIFT + 2 - 1);
        let initial: u64 = (((srtt >> 2) as u64) + (TCPTV_SRTTDFLT << 2)) >> 1;
        Self {
            srtt,
            rttvar,
            rxtcur: initial.clamp(TCPTV_MIN, TCPTV_REXMTMAX),
            rttmin,
            rxtshift: 0,
        }
    }

    /// Adds an RTT sample, in ticks, to the calculator. The retransmission back off is reset.
    pub fn add_sample(&mut self, rtt: u32) {
        let rtt: i32 = rtt.min(i32::MAX as u32 >> 5) as i32;
        if self.srtt != 0 {
            // srtt is in 1/32 ticks. Shifting the sample left by 2 and srtt right by 3 gives 1/8 of the difference.
            let mut delta: i32 = (rtt << 2) - (self.srtt >> TCP_RTT_SHIFT);
            self.srtt = self.srtt.saturating_add(delta);
            if self.srtt <= 0 {
                self.srtt = 1 << 2;
            }
            // The same delta is 1/4 of the difference in rttvar units.
            delta = delta.abs() - (self.rttvar >> TCP_RTTVAR_SHIFT);
            self.rttvar = self.rttvar.saturating_add(delta);
            if self.rttvar <= 0 {
                self.rttvar = 1 << 2;
            }
        } else {
            // First sample: srtt = rtt, rttvar = rtt / 2.
            self.srtt = rtt << (TCP_RTT_SHIFT + 2);
            self.rttvar = rtt << (TCP_RTTVAR_SHIFT + 2 - 1);
        }
        self.rxtshift = 0;

        let floor: u64 = self.rttmin.max(rtt as u64 + 2);
        self.rxtcur = self.rexmtval().clamp(floor.min(TCPTV_REXMTMAX), TCPTV_REXMTMAX);
    }

    /// Performs an exponential "back off" of the RTO after a retransmission. Returns false once the retransmission
    /// budget is exhausted.
    pub fn back_off(&mut self) -> bool {
        if self.rxtshift >= TCP_MAXRXTSHIFT {
            return false;
        }
        self.rxtshift += 1;
        let backed_off: u64 = self.rexmtval().saturating_mul(TCP_BACKOFF[self.rxtshift as usize]);
        self.rxtcur = backed_off.clamp(self.rttmin.min(TCPTV_REXMTMAX), TCPTV_REXMTMAX);
        true
    }

    /// Gets the current RTO value, in ticks.
    pub fn rto(&self) -> u64 {
        self.rxtcur
    }

    pub fn rxtshift(&self) -> u32 {
        self.rxtshift
    }

    pub fn srtt(&self) -> i32 {
        self.srtt
    }

    pub fn rttvar(&self) -> i32 {
        self.rttvar
    }

    // srtt + 4 * rttvar, in ticks.
    fn rexmtval(&self) -> u64 {
        (((self.srtt >> TCP_RTT_SHIFT) + self.rttvar) >> 2).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::RtoCalculator;
    use crate::runtime::network::consts::{
        TCPTV_MIN,
        TCPTV_REXMTMAX,
    };
    use ::anyhow::Result;

    #[test]
    fn initial_timeout() -> Result<()> {
        let rto: RtoCalculator = RtoCalculator::new(TCPTV_MIN);
        crate::ensure_eq!(rto.rto(), 12);
        crate::ensure_eq!(rto.rttvar(), 48);
        crate::ensure_eq!(rto.srtt(), 0);
        Ok(())
    }

    #[test]
    fn first_and_later_samples() -> Result<()> {
        let mut rto: RtoCalculator = RtoCalculator::new(TCPTV_MIN);
        rto.add_sample(4);
        crate::ensure_eq!(rto.srtt(), 4 << 5);
        crate::ensure_eq!(rto.rttvar(), 4 << 3);
        // ((128 >> 3) + 32) >> 2 == 12, above the floor of 6.
        crate::ensure_eq!(rto.rto(), 12);

        // A steady sample shrinks the variance.
        rto.add_sample(4);
        crate::ensure_eq!(rto.srtt(), 128);
        crate::ensure_eq!(rto.rttvar(), 24);
        crate::ensure_eq!(rto.rto(), 10);
        Ok(())
    }

    #[test]
    fn timeout_is_clamped() -> Result<()> {
        let mut rto: RtoCalculator = RtoCalculator::new(TCPTV_MIN);
        rto.add_sample(0);
        // Never below two ticks past the sample.
        crate::ensure_eq!(rto.rto(), 2);

        let mut rto: RtoCalculator = RtoCalculator::new(TCPTV_MIN);
        rto.add_sample(1000);
        crate::ensure_eq!(rto.rto(), TCPTV_REXMTMAX);
        Ok(())
    }

    #[test]
    fn back_off_doubles_until_exhausted() -> Result<()> {
        let mut rto: RtoCalculator = RtoCalculator::new(TCPTV_MIN);
        rto.add_sample(4);
        crate::ensure_eq!(rto.back_off(), true);
        crate::ensure_eq!(rto.rto(), 24);
        crate::ensure_eq!(rto.rxtshift(), 1);
        for _ in 1..12 {
            crate::ensure_eq!(rto.back_off(), true);
        }
        crate::ensure_eq!(rto.rto(), TCPTV_REXMTMAX);
        crate::ensure_eq!(rto.back_off(), false);

        // A fresh sample resets the back off.
        rto.add_sample(4);
        crate::ensure_eq!(rto.rxtshift(), 0);
        Ok(())
    }
}
