// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod cubic;
mod newreno;
mod reno;

use crate::inetstack::protocols::tcp::{
    established::ctrlblk::ControlBlock,
    interface::TcpOutput,
    SeqNumber,
};
use ::std::fmt::Debug;

pub use self::{
    cubic::{
        Cubic,
        CubicState,
    },
    newreno::NewReno,
    reno::Reno,
};

/// Congestion control strategy, selected when a connection is created.
///
/// Strategies are stateless: whatever they need to remember lives in the control block they are handed.
pub trait CongestionControl: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Called when the duplicate acknowledgement threshold is reached. Returns false when the strategy refuses to
    /// enter fast recovery, in which case the acknowledgement is processed as usual.
    fn fast_retransmit(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput) -> bool;

    /// Called for every acknowledgement that advances `snd_una`, before it is advanced.
    fn fast_retransmit_newack(&self, cb: &mut ControlBlock, ack: SeqNumber, output: &dyn TcpOutput);

    /// Opens the congestion window for newly acknowledged data, before `snd_una` is advanced.
    fn newack(&self, cb: &mut ControlBlock, ack: SeqNumber);

    /// Reacts to congestion signalled without loss (ECN echo).
    fn cong_exp(&self, cb: &mut ControlBlock);
}

static RENO: Reno = Reno;
static NEWRENO: NewReno = NewReno;
static CUBIC: Cubic = Cubic;

/// Looks up a strategy by name.
pub fn by_name(name: &str) -> Option<&'static dyn CongestionControl> {
    match name.to_ascii_lowercase().as_str() {
        "reno" => Some(&RENO),
        "newreno" => Some(&NEWRENO),
        "cubic" => Some(&CUBIC),
        _ => None,
    }
}

/// The strategy used when the configured one is unknown.
pub fn default_strategy() -> &'static dyn CongestionControl {
    &NEWRENO
}

/// Whether the forward-most SACKed byte is far enough beyond `snd_una` to enter recovery early.
pub fn fack_fast_recovery(cb: &ControlBlock, rexmt_thresh: u32) -> bool {
    cb.flags.will_sack
        && cb.snd_fack.delta(cb.snd_una) > 0
        && cb.snd_fack.delta(cb.snd_una) as u32 > rexmt_thresh.saturating_mul(cb.segsz)
}
