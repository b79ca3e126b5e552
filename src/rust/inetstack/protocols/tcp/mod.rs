// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod established;
pub mod input;
pub mod interface;
mod isn_generator;
pub mod options;
pub mod reassembly;
pub mod segment;
mod sequence_number;
pub mod signature;
pub mod stats;
pub mod syn_cache;

#[cfg(test)]
mod tests;

pub use self::{
    established::{
        congestion_control,
        ControlBlock,
        State,
    },
    input::{
        Disposition,
        Pcb,
        TcpInput,
    },
    interface::{
        ListenSocket,
        ListenerId,
        Reply,
        SocketBuffer,
        TcpOutput,
    },
    segment::{
        IpEcn,
        TcpHeader,
        TcpSegment,
        MAX_TCP_HEADER_SIZE,
        MIN_TCP_HEADER_SIZE,
    },
    sequence_number::SeqNumber,
    stats::{
        TcpStat,
        TcpStats,
    },
    syn_cache::SynCache,
};
