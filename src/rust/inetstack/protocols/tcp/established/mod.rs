// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod congestion_control;
pub mod ctrlblk;
pub mod receiver;
pub mod rto;
pub mod timers;

pub use self::ctrlblk::{
    ControlBlock,
    State,
    TcbFlags,
};
