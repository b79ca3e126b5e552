// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::{
    established::ctrlblk::{
        ControlBlock,
        State,
    },
    input::{
        Disposition,
        Pcb,
    },
    interface::ListenerId,
    stats::TcpStat,
    syn_cache::SynCacheEntry,
    tests::{
        alice,
        bob,
        plain_config,
        segment,
        syn,
        Engine,
        TestListener,
        TestSocket,
    },
    SeqNumber,
};
use ::anyhow::Result;
use ::libc::{
    ECONNREFUSED,
    ETIMEDOUT,
};

//=============================================================================

/// Runs a passive open of Alice's connection to Bob, Alice's SYN being numbered `irs`. Returns the connection along
/// with Bob's initial sequence number.
pub fn connection_setup(
    engine: &Engine,
    listener: &TestListener,
    irs: u32,
    now: u64,
) -> Result<(Box<ControlBlock>, SeqNumber)> {
    crate::ensure_eq!(
        matches!(
            engine.input.input(syn(irs, 1460), Pcb::Listen(listener), now),
            Disposition::Consumed
        ),
        true
    );
    let entry: SynCacheEntry = match engine.input.syn_cache().lookup(&bob(), &alice()) {
        Some(entry) => entry,
        None => anyhow::bail!("SYN was not cached"),
    };
    let iss: SeqNumber = entry.iss();

    let ack = segment(irs + 1, Some(u32::from(iss) + 1), &[]);
    match engine.input.input(ack, Pcb::Listen(listener), now + 1) {
        Disposition::Established(cb) => Ok((cb, iss)),
        disposition => anyhow::bail!("handshake did not complete: {:?}", disposition),
    }
}

//=============================================================================

/// Passive open, then data arriving out of order.
#[test]
fn test_passive_open_and_reassembly() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();

    let (mut cb, iss): (Box<ControlBlock>, SeqNumber) = connection_setup(&engine, &listener, 100, 1)?;
    let syn_acks = engine.output.syn_acks();
    crate::ensure_eq!(syn_acks.len(), 1);
    crate::ensure_eq!(syn_acks[0].header.seq_num, iss);
    crate::ensure_eq!(syn_acks[0].header.ack_num, SeqNumber::from(101));
    crate::ensure_eq!(cb.state(), State::Established);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(101));
    crate::ensure_eq!(cb.snd_una, iss + 1);
    crate::ensure_eq!(cb.snd_wnd, 65535);
    crate::ensure_eq!(engine.input.syn_cache().is_empty(), true);
    crate::ensure_eq!(listener.socket.state().connected, true);

    let stats = engine.input.stats();
    crate::ensure_eq!(stats.get(TcpStat::ScAdded), 1);
    crate::ensure_eq!(stats.get(TcpStat::ScCompleted), 1);
    crate::ensure_eq!(stats.get(TcpStat::Accepts), 1);
    crate::ensure_eq!(stats.get(TcpStat::Connects), 1);

    let ack: u32 = u32::from(iss) + 1;
    // In order, taken by header prediction.
    let disposition = engine.input.input(segment(101, Some(ack), &[1; 50]), Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(151));
    crate::ensure_eq!(stats.get(TcpStat::PredDat), 1);
    crate::ensure_eq!(cb.flags.del_ack, true);

    // Beyond a hole: queued and acknowledged at once.
    let outputs: usize = engine.output.outputs();
    engine.input.input(segment(201, Some(ack), &[3; 50]), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(151));
    crate::ensure_eq!(cb.reassembly_queue().len(), 1);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);

    // Filling the hole delivers both.
    engine.input.input(segment(151, Some(ack), &[2; 50]), Pcb::Connection(&mut cb), 5);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(251));
    crate::ensure_eq!(cb.reassembly_queue().is_empty(), true);

    let mut expected: Vec<u8> = vec![1; 50];
    expected.extend_from_slice(&[2; 50]);
    expected.extend_from_slice(&[3; 50]);
    crate::ensure_eq!(listener.socket.state().received, expected);
    Ok(())
}

/// A full accept queue leaves SYNs unanswered.
#[test]
fn test_syn_to_full_listener() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let mut listener: TestListener = TestListener::new();
    listener.full = true;

    engine.input.input(syn(100, 1460), Pcb::Listen(&listener), 1);
    crate::ensure_eq!(engine.output.syn_acks().len(), 0);
    crate::ensure_eq!(engine.input.syn_cache().is_empty(), true);
    Ok(())
}

/// A SYN from our own address is dropped.
#[test]
fn test_self_connect_syn() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();

    let mut seg = syn(100, 1460);
    seg.src = seg.dst;
    engine.input.input(seg, Pcb::Listen(&listener), 1);
    crate::ensure_eq!(engine.output.syn_acks().len(), 0);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::BadSyn), 1);
    Ok(())
}

/// An ACK for a handshake that is not cached is answered with a reset numbered after it.
#[test]
fn test_ack_to_listener_without_handshake() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();

    engine.input.input(segment(500, Some(9000), &[]), Pcb::Listen(&listener), 1);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::BadSyn), 1);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].rst, true);
    crate::ensure_eq!(replies[0].ack_flag, false);
    crate::ensure_eq!(replies[0].seq, SeqNumber::from(9000));
    crate::ensure_eq!(replies[0].src, bob());
    crate::ensure_eq!(replies[0].dst, alice());
    Ok(())
}

/// A SYN+ACK sent to a listener is bogus.
#[test]
fn test_syn_ack_to_listener() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();

    let mut seg = segment(500, Some(9000), &[]);
    seg.tcp_hdr.syn = true;
    engine.input.input(seg, Pcb::Listen(&listener), 1);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::BadSyn), 1);
    crate::ensure_eq!(engine.output.replies().len(), 1);
    crate::ensure_eq!(engine.input.syn_cache().is_empty(), true);
    Ok(())
}

/// A reset within the handshake's window removes the half-open connection.
#[test]
fn test_rst_to_listener() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();

    engine.input.input(syn(100, 1460), Pcb::Listen(&listener), 1);
    crate::ensure_eq!(engine.input.syn_cache().len(), 1);

    let mut rst = segment(101, None, &[]);
    rst.tcp_hdr.rst = true;
    engine.input.input(rst, Pcb::Listen(&listener), 2);
    crate::ensure_eq!(engine.input.syn_cache().is_empty(), true);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::ScReset), 1);
    // Resets are never answered.
    crate::ensure_eq!(engine.output.replies().len(), 0);
    Ok(())
}

/// An ACK that does not match our SYN+ACK gets the SYN+ACK again.
#[test]
fn test_wrong_ack_retransmits_syn_ack() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();

    engine.input.input(syn(100, 1460), Pcb::Listen(&listener), 1);
    let iss: SeqNumber = match engine.input.syn_cache().lookup(&bob(), &alice()) {
        Some(entry) => entry.iss(),
        None => anyhow::bail!("SYN was not cached"),
    };
    let ack = segment(101, Some(u32::from(iss) + 2), &[]);
    let disposition = engine.input.input(ack, Pcb::Listen(&listener), 2);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(engine.output.syn_acks().len(), 2);
    crate::ensure_eq!(engine.input.syn_cache().len(), 1);
    crate::ensure_eq!(engine.output.replies().len(), 0);
    Ok(())
}

/// The listener may refuse a connection completing its handshake.
#[test]
fn test_refused_promotion() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let mut listener: TestListener = TestListener::new();
    listener.refuse = true;

    engine.input.input(syn(100, 1460), Pcb::Listen(&listener), 1);
    let iss: SeqNumber = match engine.input.syn_cache().lookup(&bob(), &alice()) {
        Some(entry) => entry.iss(),
        None => anyhow::bail!("SYN was not cached"),
    };
    let ack: u32 = u32::from(iss) + 1;
    let disposition = engine.input.input(segment(101, Some(ack), &[]), Pcb::Listen(&listener), 2);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::ScAborted), 1);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].rst, true);
    crate::ensure_eq!(replies[0].seq, SeqNumber::from(ack));
    Ok(())
}

/// Segments nobody listens for are reset, acknowledging what they carried.
#[test]
fn test_unmatched_segment() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());

    engine.input.input(segment(500, None, &[0; 10]), Pcb::Unmatched, 1);
    engine.input.input(syn(700, 1460), Pcb::Unmatched, 1);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 2);
    crate::ensure_eq!(replies[0].ack_flag, true);
    crate::ensure_eq!(replies[0].seq, SeqNumber::from(0));
    crate::ensure_eq!(replies[0].ack, SeqNumber::from(510));
    crate::ensure_eq!(replies[1].ack, SeqNumber::from(701));

    // Nor are resets to nobody.
    let mut rst = segment(900, None, &[]);
    rst.tcp_hdr.rst = true;
    engine.input.input(rst, Pcb::Unmatched, 1);
    crate::ensure_eq!(engine.output.replies().len(), 2);
    Ok(())
}

/// Resets to unknown peers are rate limited.
#[test]
fn test_unmatched_reset_rate_limit() -> Result<()> {
    let engine: Engine = Engine::new(plain_config().set_ppslim(100, 2));

    for seq in 0..5 {
        engine.input.input(segment(seq * 10, None, &[]), Pcb::Unmatched, 1);
    }
    crate::ensure_eq!(engine.output.replies().len(), 2);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RstRateLimited), 3);
    Ok(())
}

/// Active open answered by a SYN+ACK.
#[test]
fn test_active_open() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let socket: TestSocket = TestSocket::new();

    let mut cb: ControlBlock = engine.input.connect(bob(), alice(), Box::new(socket.clone()), 1);
    crate::ensure_eq!(cb.state(), State::SynSent);
    let iss: SeqNumber = cb.iss;
    crate::ensure_eq!(cb.snd_max, iss + 1);

    let mut syn_ack = syn(1000, 1460);
    syn_ack.tcp_hdr.ack = true;
    syn_ack.tcp_hdr.ack_num = iss + 1;
    let disposition = engine.input.input(syn_ack, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(cb.state(), State::Established);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(1001));
    crate::ensure_eq!(cb.snd_una, iss + 1);
    crate::ensure_eq!(cb.snd_wnd, 65535);
    crate::ensure_eq!(cb.segsz, 1460);
    crate::ensure_eq!(cb.snd_cwnd, 4380);
    crate::ensure_eq!(socket.state().connected, true);

    let stats = engine.input.stats();
    crate::ensure_eq!(stats.get(TcpStat::Connects), 1);
    crate::ensure_eq!(stats.get(TcpStat::RttUpdated), 1);
    // The SYN+ACK is acknowledged right away.
    crate::ensure_eq!(engine.output.outputs(), 1);
    crate::ensure_eq!(cb.flags.ack_now, false);
    crate::ensure_eq!(cb.last_ack_sent, SeqNumber::from(1001));
    Ok(())
}

/// Active open refused by the peer.
#[test]
fn test_active_open_refused() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let socket: TestSocket = TestSocket::new();

    let mut cb: ControlBlock = engine.input.connect(bob(), alice(), Box::new(socket.clone()), 1);
    let mut rst = segment(0, Some(u32::from(cb.iss) + 1), &[]);
    rst.tcp_hdr.rst = true;
    let disposition = engine.input.input(rst, Pcb::Connection(&mut cb), 2);
    crate::ensure_eq!(matches!(disposition, Disposition::Closed), true);
    crate::ensure_eq!(cb.state(), State::Closed);
    crate::ensure_eq!(socket.state().error, Some(ECONNREFUSED));
    crate::ensure_eq!(engine.input.stats().get(TcpStat::ConnDrops), 1);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::Closed), 1);
    Ok(())
}

/// A SYN+ACK acknowledging something we never sent is reset.
#[test]
fn test_active_open_bad_ack() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let mut cb: ControlBlock = engine.input.connect(bob(), alice(), Box::new(TestSocket::new()), 1);

    let mut syn_ack = syn(1000, 1460);
    syn_ack.tcp_hdr.ack = true;
    syn_ack.tcp_hdr.ack_num = cb.iss + 5;
    engine.input.input(syn_ack, Pcb::Connection(&mut cb), 2);
    crate::ensure_eq!(cb.state(), State::SynSent);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].seq, cb.iss + 5);
    crate::ensure_eq!(replies[0].rst, true);
    Ok(())
}

/// The handshake timer gives up on an unanswered SYN.
#[test]
fn test_connection_timeout() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let socket: TestSocket = TestSocket::new();
    let keep_init: u64 = plain_config().get_keep_init();

    let mut cb: ControlBlock = engine.input.connect(bob(), alice(), Box::new(socket.clone()), 0);
    let disposition = engine.input.connection_timers(&mut cb, keep_init);
    crate::ensure_eq!(matches!(disposition, Disposition::Closed), true);
    crate::ensure_eq!(cb.flags.syn_rexmt, true);
    crate::ensure_eq!(socket.state().error, Some(ETIMEDOUT));
    Ok(())
}

/// Closing a listener forgets its half-open connections; the completing ACK is then answered with a reset.
#[test]
fn test_listener_closed() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    engine.input.input(syn(100, 1460), Pcb::Listen(&listener), 1);
    let iss: SeqNumber = match engine.input.syn_cache().lookup(&bob(), &alice()) {
        Some(entry) => entry.iss(),
        None => anyhow::bail!("SYN was not cached"),
    };

    engine.input.listener_closed(ListenerId(1));
    crate::ensure_eq!(engine.input.syn_cache().is_empty(), true);

    let ack = segment(101, Some(u32::from(iss) + 1), &[]);
    let disposition = engine.input.input(ack, Pcb::Listen(&listener), 2);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].seq, iss + 1);
    crate::ensure_eq!(replies[0].rst, true);
    Ok(())
}
