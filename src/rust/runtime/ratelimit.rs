// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::network::consts::SLOW_HZ;
use ::std::sync::Mutex;

//==============================================================================
// Structures
//==============================================================================

#[derive(Debug, Default)]
struct Window {
    // Tick at which the current one-second window started.
    start: Option<u64>,
    // Events seen in the current window.
    count: u64,
}

/// Packets-per-second limiter.
///
/// Admits at most `limit` events in each one-second window. A negative limit admits everything. The first event of a
/// window is always admitted.
#[derive(Debug)]
pub struct PpsLimiter {
    limit: i32,
    window: Mutex<Window>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl PpsLimiter {
    pub fn new(limit: i32) -> Self {
        Self {
            limit,
            window: Mutex::new(Window::default()),
        }
    }

    /// Accounts for one event at tick `now` and returns whether it is admitted.
    pub fn check(&self, now: u64) -> bool {
        let mut window = match self.window.lock() {
            Ok(window) => window,
            Err(poisoned) => poisoned.into_inner(),
        };
        let admitted: bool = match window.start {
            Some(start) if now.saturating_sub(start) < SLOW_HZ => {
                self.limit < 0 || window.count < self.limit as u64
            },
            _ => {
                window.start = Some(now);
                window.count = 0;
                true
            },
        };
        window.count = window.count.saturating_add(1);
        admitted
    }

    pub fn limit(&self) -> i32 {
        self.limit
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
