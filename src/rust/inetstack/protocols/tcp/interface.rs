// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        established::ctrlblk::ControlBlock,
        syn_cache::SynAck,
        SeqNumber,
    },
    runtime::fail::Fail,
};
use ::libc::c_int;
use ::std::net::SocketAddr;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Identifies a listening socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A bare control segment sent outside of a connection's normal output: resets and probe acknowledgements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Our address.
    pub src: SocketAddr,
    /// The peer.
    pub dst: SocketAddr,
    pub seq: SeqNumber,
    pub ack: SeqNumber,
    pub ack_flag: bool,
    pub rst: bool,
    pub window: u16,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// The socket a connection delivers to and sends from.
pub trait SocketBuffer: Send {
    /// Free space in the receive buffer.
    fn receive_space(&self) -> u32;

    /// Appends in-order data to the receive buffer and wakes readers.
    fn append(&mut self, data: Vec<u8>);

    /// Bytes waiting to be read.
    fn receive_buffered(&self) -> u32 {
        0
    }

    /// Whether the user shut down the receive side or a FIN was delivered.
    fn cant_receive_more(&self) -> bool;

    /// Records that no more data will arrive.
    fn mark_cant_receive_more(&mut self);

    /// Bytes queued for sending, acknowledged or not.
    fn send_buffered(&self) -> u32;

    /// Drops acknowledged bytes from the front of the send buffer.
    fn drop_sent(&mut self, bytes: u32);

    fn wake_writers(&mut self) {}

    /// Whether the user still holds the socket.
    fn has_file_reference(&self) -> bool {
        true
    }

    fn connected(&mut self) {}

    fn disconnected(&mut self) {}

    /// Reports an error to the user (`ECONNREFUSED`, `ECONNRESET`).
    fn set_error(&mut self, _errno: c_int) {}

    /// Announces urgent data at offset `mark` of the receive buffer.
    fn out_of_band(&mut self, _mark: u32) {}

    /// Whether idle connections are probed.
    fn keep_alive(&self) -> bool {
        false
    }

    /// Whether urgent data stays in the normal byte stream.
    fn oob_inline(&self) -> bool {
        false
    }
}

/// A socket in LISTEN.
pub trait ListenSocket {
    fn id(&self) -> ListenerId;

    /// Receive space new connections start with.
    fn receive_space(&self) -> u32;

    /// Whether the queue of connections waiting to be accepted is over its limit.
    fn accept_queue_full(&self) -> bool;

    /// Creates the socket of a connection completing its handshake. None refuses the connection.
    fn new_connection(&self, local: SocketAddr, remote: SocketAddr) -> Option<Box<dyn SocketBuffer>>;

    /// Whether segments must carry a signature.
    fn signature_required(&self) -> bool {
        false
    }
}

/// The sending half of the stack.
pub trait TcpOutput: Send + Sync {
    /// Sends whatever the state of `cb` calls for: queued data, window updates, and the acknowledgement requested by
    /// `cb.flags.ack_now`. Implementations call [ControlBlock::ack_sent] once an acknowledgement is on its way.
    fn output(&self, cb: &mut ControlBlock);

    /// Sends a bare control segment.
    fn respond(&self, reply: &Reply);

    /// Sends the SYN+ACK of a half-open connection. The signature digest, when requested, is filled in by the sender.
    fn send_syn_ack(&self, syn_ack: &SynAck) -> Result<(), Fail>;
}
