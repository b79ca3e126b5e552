// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Structures
//==============================================================================

/// Per-connection timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Retransmission.
    Rexmt,
    /// Zero window probes.
    Persist,
    /// Connection establishment, then keep-alive.
    Keep,
    /// TIME_WAIT and FIN_WAIT_2 expiry.
    TwoMsl,
    /// Delayed acknowledgement.
    DelayedAck,
}

/// Deadlines of the timers of one connection, in slow-clock ticks.
///
/// The set is owned by the connection and only touched from its exclusive section, so disarming a timer always wins
/// against it firing. The owner polls [TimerSet::expired] from its clock.
#[derive(Debug, Default)]
pub struct TimerSet {
    deadlines: [Option<u64>; TimerSet::COUNT],
}

//==============================================================================
// Associate Functions
//==============================================================================

impl TimerSet {
    const COUNT: usize = 5;
    const ALL: [TimerKind; TimerSet::COUNT] = [
        TimerKind::Rexmt,
        TimerKind::Persist,
        TimerKind::Keep,
        TimerKind::TwoMsl,
        TimerKind::DelayedAck,
    ];

    /// Arms `kind` to fire `timeout` ticks after `now`, replacing any earlier deadline.
    pub fn arm(&mut self, kind: TimerKind, now: u64, timeout: u64) {
        self.deadlines[kind as usize] = Some(now.saturating_add(timeout));
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        self.deadlines[kind as usize] = None;
    }

    pub fn disarm_all(&mut self) {
        self.deadlines = [None; TimerSet::COUNT];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[kind as usize].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.deadlines[kind as usize]
    }

    /// Disarms and returns every timer whose deadline is at or before `now`.
    pub fn expired(&mut self, now: u64) -> Vec<TimerKind> {
        let mut fired: Vec<TimerKind> = Vec::new();
        for kind in TimerSet::ALL {
            if let Some(deadline) = self.deadlines[kind as usize] {
                if deadline <= now {
                    self.deadlines[kind as usize] = None;
                    fired.push(kind);
                }
            }
        }
        fired
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
