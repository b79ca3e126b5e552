// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod config;
pub mod inetstack;
pub mod runtime;

pub use self::{
    config::Config,
    inetstack::protocols::tcp::{
        congestion_control,
        ControlBlock,
        Disposition,
        ListenSocket,
        ListenerId,
        Pcb,
        Reply,
        SeqNumber,
        SocketBuffer,
        SynCache,
        TcpInput,
        TcpOutput,
        TcpSegment,
        TcpStat,
        TcpStats,
    },
    runtime::{
        fail::Fail,
        network::config::{
            SynCacheConfig,
            TcpConfig,
        },
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equivalent, bailing out of the enclosing function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(
                        "ensure failed: `(left == right)` left: `{:?}`, right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    }};
}

/// Ensures that two expressions are not equivalent, bailing out of the enclosing function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left != right)` left: `{:?}`, right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    }};
}
