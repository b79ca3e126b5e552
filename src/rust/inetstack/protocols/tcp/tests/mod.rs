// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod established;
pub mod setup;

use crate::{
    inetstack::protocols::tcp::{
        established::ctrlblk::ControlBlock,
        input::TcpInput,
        interface::{
            ListenSocket,
            ListenerId,
            Reply,
            SocketBuffer,
            TcpOutput,
        },
        options::OptionWriter,
        segment::{
            IpEcn,
            TcpHeader,
            TcpSegment,
        },
        stats::TcpStats,
        syn_cache::{
            SynAck,
            SynCache,
        },
        SeqNumber,
    },
    runtime::{
        fail::Fail,
        network::config::{
            SynCacheConfig,
            TcpConfig,
        },
    },
};
use ::libc::c_int;
use ::std::{
    net::{
        IpAddr,
        Ipv4Addr,
        SocketAddr,
    },
    sync::{
        Arc,
        Mutex,
    },
};

//=============================================================================

pub const ALICE_IPV4: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const BOB_IPV4: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
pub const ALICE_PORT: u16 = 49152;
pub const BOB_PORT: u16 = 80;
pub const RECEIVE_SPACE: u32 = 65535;

pub fn alice() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(ALICE_IPV4), ALICE_PORT)
}

pub fn bob() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(BOB_IPV4), BOB_PORT)
}

//=============================================================================

/// What a socket saw, shared between the test and the connection owning it.
#[derive(Debug, Default)]
pub struct SocketState {
    pub received: Vec<u8>,
    pub receive_space: u32,
    pub send_buffered: u32,
    pub cant_receive_more: bool,
    pub connected: bool,
    pub disconnected: bool,
    pub error: Option<c_int>,
    pub keep_alive: bool,
    pub oob_mark: Option<u32>,
    pub oob_inline: bool,
}

#[derive(Clone)]
pub struct TestSocket(pub Arc<Mutex<SocketState>>);

impl TestSocket {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SocketState {
            receive_space: RECEIVE_SPACE,
            ..Default::default()
        })))
    }

    pub fn state(&self) -> ::std::sync::MutexGuard<SocketState> {
        self.0.lock().unwrap()
    }
}

impl SocketBuffer for TestSocket {
    fn receive_space(&self) -> u32 {
        self.state().receive_space
    }

    fn append(&mut self, data: Vec<u8>) {
        let mut state = self.state();
        state.receive_space = state.receive_space.saturating_sub(data.len() as u32);
        state.received.extend_from_slice(&data);
    }

    fn receive_buffered(&self) -> u32 {
        self.state().received.len() as u32
    }

    fn cant_receive_more(&self) -> bool {
        self.state().cant_receive_more
    }

    fn mark_cant_receive_more(&mut self) {
        self.state().cant_receive_more = true;
    }

    fn send_buffered(&self) -> u32 {
        self.state().send_buffered
    }

    fn drop_sent(&mut self, bytes: u32) {
        let mut state = self.state();
        state.send_buffered = state.send_buffered.saturating_sub(bytes);
    }

    fn connected(&mut self) {
        self.state().connected = true;
    }

    fn disconnected(&mut self) {
        self.state().disconnected = true;
    }

    fn set_error(&mut self, errno: c_int) {
        self.state().error = Some(errno);
    }

    fn keep_alive(&self) -> bool {
        self.state().keep_alive
    }

    fn out_of_band(&mut self, mark: u32) {
        self.state().oob_mark = Some(mark);
    }

    fn oob_inline(&self) -> bool {
        self.state().oob_inline
    }
}

//=============================================================================

pub struct TestListener {
    pub socket: TestSocket,
    pub full: bool,
    pub refuse: bool,
}

impl TestListener {
    pub fn new() -> Self {
        Self {
            socket: TestSocket::new(),
            full: false,
            refuse: false,
        }
    }
}

impl ListenSocket for TestListener {
    fn id(&self) -> ListenerId {
        ListenerId(1)
    }

    fn receive_space(&self) -> u32 {
        RECEIVE_SPACE
    }

    fn accept_queue_full(&self) -> bool {
        self.full
    }

    fn new_connection(&self, _local: SocketAddr, _remote: SocketAddr) -> Option<Box<dyn SocketBuffer>> {
        if self.refuse {
            return None;
        }
        Some(Box::new(self.socket.clone()))
    }
}

//=============================================================================

/// Records everything the engine asks to send.
#[derive(Default)]
pub struct TestOutput {
    /// Connection output calls, with the acknowledgement state at the time of the call.
    pub outputs: Mutex<Vec<(SeqNumber, bool)>>,
    pub replies: Mutex<Vec<Reply>>,
    pub syn_acks: Mutex<Vec<SynAck>>,
}

impl TestOutput {
    pub fn outputs(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn syn_acks(&self) -> Vec<SynAck> {
        self.syn_acks.lock().unwrap().clone()
    }
}

impl TcpOutput for TestOutput {
    fn output(&self, cb: &mut ControlBlock) {
        self.outputs.lock().unwrap().push((cb.rcv_nxt, cb.flags.ack_now));
        if cb.flags.ack_now || cb.flags.del_ack {
            cb.ack_sent();
        }
    }

    fn respond(&self, reply: &Reply) {
        self.replies.lock().unwrap().push(reply.clone());
    }

    fn send_syn_ack(&self, syn_ack: &SynAck) -> Result<(), Fail> {
        self.syn_acks.lock().unwrap().push(syn_ack.clone());
        Ok(())
    }
}

//=============================================================================

pub struct Engine {
    pub input: TcpInput,
    pub output: Arc<TestOutput>,
}

impl Engine {
    pub fn new(config: TcpConfig) -> Self {
        Self::with_syn_cache(config, SynCacheConfig::default())
    }

    pub fn with_syn_cache(config: TcpConfig, syn_cache_config: SynCacheConfig) -> Self {
        let config: Arc<TcpConfig> = Arc::new(config);
        let stats: Arc<TcpStats> = Arc::new(TcpStats::default());
        let syn_cache: Arc<SynCache> = Arc::new(SynCache::new(syn_cache_config, config.clone(), stats, [7; 32], 0));
        let output: Arc<TestOutput> = Arc::new(TestOutput::default());
        let input: TcpInput = TcpInput::new(config, syn_cache, output.clone(), None);
        Self { input, output }
    }
}

/// Default configuration without RFC 1323 and SACK, so that segments carry no options.
pub fn plain_config() -> TcpConfig {
    TcpConfig::default().set_rfc1323(false).set_sack(false)
}

//=============================================================================

/// Segment from Alice to Bob.
pub fn segment(seq: u32, ack: Option<u32>, data: &[u8]) -> TcpSegment {
    let mut tcp_hdr: TcpHeader = TcpHeader::new(ALICE_PORT, BOB_PORT);
    tcp_hdr.seq_num = SeqNumber::from(seq);
    if let Some(ack) = ack {
        tcp_hdr.ack = true;
        tcp_hdr.ack_num = SeqNumber::from(ack);
    }
    tcp_hdr.window_size = 65535;
    TcpSegment {
        src: alice(),
        dst: bob(),
        tcp_hdr,
        data: data.to_vec(),
        ecn: IpEcn::NotEct,
        link_multicast: false,
    }
}

/// SYN from Alice to Bob announcing `mss`.
pub fn syn(seq: u32, mss: u16) -> TcpSegment {
    let mut seg: TcpSegment = segment(seq, None, &[]);
    seg.tcp_hdr.syn = true;
    seg.tcp_hdr.options = OptionWriter::new().maxseg(mss).finish();
    seg
}

pub fn with_timestamp(mut seg: TcpSegment, val: u32, ecr: u32) -> TcpSegment {
    seg.tcp_hdr.options = OptionWriter::new().timestamp(val, ecr).finish();
    seg
}
