// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::{
    established::{
        ctrlblk::{
            ControlBlock,
            State,
        },
        timers::TimerKind,
    },
    input::{
        Disposition,
        Pcb,
    },
    options::{
        OptionWriter,
        SackBlock,
    },
    segment::IpEcn,
    stats::TcpStat,
    tests::{
        alice,
        bob,
        plain_config,
        segment,
        setup::connection_setup,
        syn,
        with_timestamp,
        Engine,
        TestListener,
    },
    SeqNumber,
};
use ::anyhow::Result;
use ::libc::ECONNRESET;

//=============================================================================

/// Opens a connection for Alice's SYN numbered 100, so that Bob expects byte 101 next.
pub fn established(engine: &Engine, listener: &TestListener) -> Result<(Box<ControlBlock>, u32)> {
    let (cb, iss): (Box<ControlBlock>, SeqNumber) = connection_setup(engine, listener, 100, 1)?;
    crate::ensure_eq!(cb.state(), State::Established);
    Ok((cb, u32::from(iss) + 1))
}

/// Pretends `bytes` were sent and are waiting for an acknowledgement.
pub fn outstanding(cb: &mut ControlBlock, listener: &TestListener, bytes: u32) {
    cb.snd_max = cb.snd_una + bytes;
    cb.snd_nxt = cb.snd_max;
    listener.socket.state().send_buffered = bytes;
    let rto: u64 = cb.rto.rto();
    let now: u64 = cb.now();
    cb.timers.arm(TimerKind::Rexmt, now, rto);
}

//=============================================================================

/// A pure acknowledgement of new data takes the fast path.
#[test]
fn test_header_prediction_ack() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    outstanding(&mut cb, &listener, 1000);
    cb.snd_cwnd = 65535;

    let outputs: usize = engine.output.outputs();
    engine.input.input(segment(101, Some(una + 500), &[]), Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::PredAck), 1);
    crate::ensure_eq!(cb.snd_una, SeqNumber::from(una + 500));
    crate::ensure_eq!(listener.socket.state().send_buffered, 500);
    crate::ensure_eq!(cb.timers.is_armed(TimerKind::Rexmt), true);
    // Data is still queued, so the sender is kicked.
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);

    engine.input.input(segment(101, Some(una + 1000), &[]), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::PredAck), 2);
    crate::ensure_eq!(cb.timers.is_armed(TimerKind::Rexmt), false);
    Ok(())
}

/// Exactly one fast retransmit per window, on the third duplicate acknowledgement.
#[test]
fn test_fast_retransmit_on_third_dupack() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    outstanding(&mut cb, &listener, 3000);
    let snd_max: SeqNumber = cb.snd_max;

    let outputs: usize = engine.output.outputs();
    for now in 3..5 {
        engine.input.input(segment(101, Some(una), &[]), Pcb::Connection(&mut cb), now);
    }
    crate::ensure_eq!(cb.dupacks, 2);
    crate::ensure_eq!(engine.output.outputs(), outputs);

    engine.input.input(segment(101, Some(una), &[]), Pcb::Connection(&mut cb), 5);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);
    crate::ensure_eq!(cb.partialacks, 0);
    crate::ensure_eq!(cb.snd_recover, snd_max);
    crate::ensure_eq!(cb.snd_ssthresh, 2 * cb.segsz);
    crate::ensure_eq!(cb.snd_cwnd, cb.snd_ssthresh + 3 * cb.segsz);
    crate::ensure_eq!(cb.snd_nxt, snd_max);

    engine.input.input(segment(101, Some(una), &[]), Pcb::Connection(&mut cb), 6);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RcvDupAck), 4);
    Ok(())
}

/// Duplicate acknowledgements carrying data or a new window do not count.
#[test]
fn test_dupack_with_data_not_counted() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    outstanding(&mut cb, &listener, 3000);

    engine.input.input(segment(101, Some(una), &[0; 10]), Pcb::Connection(&mut cb), 3);
    let mut seg = segment(111, Some(una), &[]);
    seg.tcp_hdr.window_size = 1000;
    engine.input.input(seg, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.dupacks, 0);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RcvDupAck), 0);
    crate::ensure_eq!(cb.snd_wnd, 1000);
    Ok(())
}

/// A reset exactly at rcv_nxt tears the connection down, one elsewhere in the window does not.
#[test]
fn test_reset() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    let outputs: usize = engine.output.outputs();
    let mut rst = segment(111, Some(una), &[]);
    rst.tcp_hdr.rst = true;
    let disposition = engine.input.input(rst, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(cb.state(), State::Established);
    crate::ensure_eq!(engine.output.outputs(), outputs);

    let mut rst = segment(101, Some(una), &[]);
    rst.tcp_hdr.rst = true;
    let disposition = engine.input.input(rst, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(matches!(disposition, Disposition::Closed), true);
    crate::ensure_eq!(cb.state(), State::Closed);
    crate::ensure_eq!(listener.socket.state().error, Some(ECONNRESET));
    crate::ensure_eq!(engine.input.stats().get(TcpStat::Drops), 1);
    crate::ensure_eq!(engine.output.replies().len(), 0);
    Ok(())
}

/// A SYN at rcv_nxt on a synchronized connection is answered with an acknowledgement.
#[test]
fn test_syn_on_established() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    let mut seg = syn(101, 1460);
    seg.tcp_hdr.ack = true;
    seg.tcp_hdr.ack_num = SeqNumber::from(una);
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.state(), State::Established);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].rst, false);
    crate::ensure_eq!(replies[0].seq, SeqNumber::from(una) - 1);
    crate::ensure_eq!(replies[0].ack, SeqNumber::from(101));
    Ok(())
}

/// FIN handling on both sides of the close.
#[test]
fn test_fin_transitions() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    let mut fin = segment(101, Some(una), &[7; 10]);
    fin.tcp_hdr.fin = true;
    engine.input.input(fin, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.state(), State::CloseWait);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(112));
    crate::ensure_eq!(listener.socket.state().cant_receive_more, true);
    crate::ensure_eq!(listener.socket.state().received, vec![7; 10]);

    // Our FIN goes out and is acknowledged.
    cb.state = State::LastAck;
    cb.snd_max = cb.snd_una + 1;
    cb.snd_nxt = cb.snd_max;
    let disposition = engine.input.input(segment(112, Some(una + 1), &[]), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(matches!(disposition, Disposition::Closed), true);
    crate::ensure_eq!(cb.state(), State::Closed);
    Ok(())
}

/// FIN_WAIT_1 to FIN_WAIT_2 to TIME_WAIT.
#[test]
fn test_active_close() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    cb.state = State::FinWait1;
    cb.snd_max = cb.snd_una + 1;
    cb.snd_nxt = cb.snd_max;
    engine.input.input(segment(101, Some(una + 1), &[]), Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.state(), State::FinWait2);

    let mut fin = segment(101, Some(una + 1), &[]);
    fin.tcp_hdr.fin = true;
    engine.input.input(fin, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.state(), State::TimeWait);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(102));
    let msl: u64 = plain_config().get_msl();
    crate::ensure_eq!(cb.timers.deadline(TimerKind::TwoMsl), Some(4 + 2 * msl));
    crate::ensure_eq!(cb.timers.is_armed(TimerKind::Keep), false);

    let disposition = engine.input.connection_timers(&mut cb, 4 + 2 * msl);
    crate::ensure_eq!(matches!(disposition, Disposition::Closed), true);
    Ok(())
}

/// Segments whose timestamp is older than the last one seen are dropped and acknowledged.
#[test]
fn test_paws() -> Result<()> {
    let engine: Engine = Engine::new(plain_config().set_rfc1323(true));
    let listener: TestListener = TestListener::new();

    let mut seg = syn(100, 1460);
    seg.tcp_hdr.options = OptionWriter::new().maxseg(1460).timestamp(1000, 0).finish();
    engine.input.input(seg, Pcb::Listen(&listener), 1);
    let iss: u32 = match engine.input.syn_cache().lookup(&bob(), &alice()) {
        Some(entry) => entry.iss().into(),
        None => anyhow::bail!("SYN was not cached"),
    };
    let ack = with_timestamp(segment(101, Some(iss + 1), &[]), 1001, 1);
    let mut cb: Box<ControlBlock> = match engine.input.input(ack, Pcb::Listen(&listener), 2) {
        Disposition::Established(cb) => cb,
        disposition => anyhow::bail!("handshake did not complete: {:?}", disposition),
    };
    crate::ensure_eq!(cb.flags.rcvd_tstmp, true);
    crate::ensure_eq!(cb.ts_recent, 1001);
    crate::ensure_eq!(cb.segsz, 1448);

    let outputs: usize = engine.output.outputs();
    let stale = with_timestamp(segment(101, Some(iss + 1), &[5; 10]), 900, 1);
    engine.input.input(stale, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::PawsDrop), 1);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(101));
    crate::ensure_eq!(listener.socket.state().received.is_empty(), true);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);

    let fresh = with_timestamp(segment(101, Some(iss + 1), &[5; 10]), 1002, 1);
    engine.input.input(fresh, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(111));
    crate::ensure_eq!(cb.ts_recent, 1002);
    Ok(())
}

/// Data overlapping what was already received is trimmed.
#[test]
fn test_partial_duplicate() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    engine.input.input(segment(101, Some(una), &[1; 20]), Pcb::Connection(&mut cb), 3);
    let mut data: Vec<u8> = vec![1; 10];
    data.extend_from_slice(&[2; 10]);
    engine.input.input(segment(111, Some(una), &data), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(131));
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RcvPartDupPack), 1);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RcvPartDupByte), 10);

    let mut expected: Vec<u8> = vec![1; 20];
    expected.extend_from_slice(&[2; 10]);
    crate::ensure_eq!(listener.socket.state().received, expected);

    // A complete duplicate is acknowledged at once.
    let outputs: usize = engine.output.outputs();
    engine.input.input(segment(101, Some(una), &[1; 20]), Pcb::Connection(&mut cb), 5);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(131));
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RcvDupPack), 1);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);
    Ok(())
}

/// Data beyond the receive window is cut off.
#[test]
fn test_trim_right() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    listener.socket.state().receive_space = 10;
    cb.rcv_adv = cb.rcv_nxt + 10;
    engine.input.input(segment(101, Some(una), &[4; 30]), Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(111));
    crate::ensure_eq!(listener.socket.state().received, vec![4; 10]);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::RcvByteAfterWin), 20);
    Ok(())
}

/// An idle connection with keep-alives on is probed with an old acknowledgement.
#[test]
fn test_keepalive_probe() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    listener.socket.state().keep_alive = true;

    let deadline: u64 = match cb.timers.deadline(TimerKind::Keep) {
        Some(deadline) => deadline,
        None => anyhow::bail!("keep timer not armed"),
    };
    let disposition = engine.input.connection_timers(&mut cb, deadline);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].seq, SeqNumber::from(una) - 1);
    crate::ensure_eq!(replies[0].ack, SeqNumber::from(101));
    crate::ensure_eq!(replies[0].ack_flag, true);
    crate::ensure_eq!(cb.timers.is_armed(TimerKind::Keep), true);
    Ok(())
}

/// A retransmission timeout collapses the window to one segment and starts over from snd_una.
#[test]
fn test_retransmit_timeout() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    outstanding(&mut cb, &listener, 3000);

    let deadline: u64 = match cb.timers.deadline(TimerKind::Rexmt) {
        Some(deadline) => deadline,
        None => anyhow::bail!("retransmission timer not armed"),
    };
    let outputs: usize = engine.output.outputs();
    engine.input.connection_timers(&mut cb, deadline);
    crate::ensure_eq!(cb.snd_nxt, SeqNumber::from(una));
    crate::ensure_eq!(cb.snd_cwnd, cb.segsz);
    crate::ensure_eq!(cb.snd_recover, SeqNumber::from(una + 3000));
    crate::ensure_eq!(cb.rto.rxtshift(), 1);
    crate::ensure_eq!(cb.timers.is_armed(TimerKind::Rexmt), true);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);
    Ok(())
}

/// Reaches TIME_WAIT after an active close, with nothing left in the receive window.
fn time_wait(engine: &Engine, listener: &TestListener) -> Result<Box<ControlBlock>> {
    let (mut cb, una): (Box<ControlBlock>, u32) = established(engine, listener)?;
    cb.state = State::FinWait2;
    cb.snd_una = cb.snd_una + 1;
    cb.snd_max = cb.snd_una;
    cb.snd_nxt = cb.snd_max;
    let mut fin = segment(101, Some(una + 1), &[]);
    fin.tcp_hdr.fin = true;
    engine.input.input(fin, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.state(), State::TimeWait);
    listener.socket.state().receive_space = 0;
    cb.rcv_adv = cb.rcv_nxt;
    Ok(cb)
}

/// A new SYN beyond the old sequence space closes TIME_WAIT and hands the SYN back for a listener.
#[test]
fn test_syn_reopens_time_wait() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let mut cb: Box<ControlBlock> = time_wait(&engine, &listener)?;

    let seg = match engine.input.input(syn(1000, 1460), Pcb::Connection(&mut cb), 4) {
        Disposition::Reprocess(seg) => seg,
        disposition => anyhow::bail!("SYN was not handed back: {:?}", disposition),
    };
    crate::ensure_eq!(seg.tcp_hdr.syn, true);
    crate::ensure_eq!(seg.tcp_hdr.seq_num, SeqNumber::from(1000));
    crate::ensure_eq!(cb.state(), State::Closed);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::Closed), 1);
    Ok(())
}

/// A SYN that does not lie beyond rcv_nxt leaves TIME_WAIT alone and is only acknowledged.
#[test]
fn test_old_syn_in_time_wait() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let mut cb: Box<ControlBlock> = time_wait(&engine, &listener)?;
    let rcv_nxt: SeqNumber = cb.rcv_nxt;

    let disposition = engine.input.input(syn(u32::from(rcv_nxt), 1460), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(cb.state(), State::TimeWait);
    let replies = engine.output.replies();
    crate::ensure_eq!(replies.len(), 1);
    crate::ensure_eq!(replies[0].ack, rcv_nxt);
    crate::ensure_eq!(replies[0].rst, false);

    let outputs: usize = engine.output.outputs();
    let disposition = engine.input.input(syn(50, 1460), Pcb::Connection(&mut cb), 5);
    crate::ensure_eq!(matches!(disposition, Disposition::Consumed), true);
    crate::ensure_eq!(cb.state(), State::TimeWait);
    crate::ensure_eq!(cb.rcv_nxt, rcv_nxt);
    crate::ensure_eq!(engine.output.outputs(), outputs + 1);
    Ok(())
}

/// An urgent byte in in-order data is pulled out of the stream while rcv_nxt covers it.
#[test]
fn test_urgent_in_order() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    let mut seg = segment(101, Some(una), b"abcdef");
    seg.tcp_hdr.urg = true;
    seg.tcp_hdr.urgent_pointer = 3;
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(107));
    crate::ensure_eq!(cb.rcv_up, SeqNumber::from(104));
    crate::ensure_eq!(cb.iobc, b'c');
    crate::ensure_eq!(cb.oob_have_data, true);
    crate::ensure_eq!(listener.socket.state().received, b"abdef".to_vec());
    crate::ensure_eq!(listener.socket.state().oob_mark, Some(2));

    // Without URG the urgent pointer follows rcv_nxt.
    let mut seg = segment(107, Some(una), &[]);
    seg.tcp_hdr.window_size = 60000;
    engine.input.input(seg, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.rcv_up, SeqNumber::from(107));
    Ok(())
}

/// With out-of-band data inline the urgent byte stays in the stream.
#[test]
fn test_urgent_inline() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    listener.socket.state().oob_inline = true;

    let mut seg = segment(101, Some(una), b"abcdef");
    seg.tcp_hdr.urg = true;
    seg.tcp_hdr.urgent_pointer = 3;
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.rcv_up, SeqNumber::from(104));
    crate::ensure_eq!(cb.oob_have_data, false);
    crate::ensure_eq!(listener.socket.state().received, b"abcdef".to_vec());
    crate::ensure_eq!(listener.socket.state().oob_mark, Some(2));
    Ok(())
}

/// An urgent pointer beyond what the socket could ever buffer is ignored.
#[test]
fn test_urgent_beyond_sb_max() -> Result<()> {
    let engine: Engine = Engine::new(plain_config().set_sb_max(1024));
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    let rcv_up: SeqNumber = cb.rcv_up;

    let mut seg = segment(101, Some(una), b"abcdef");
    seg.tcp_hdr.urg = true;
    seg.tcp_hdr.urgent_pointer = 2000;
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(107));
    crate::ensure_eq!(cb.rcv_up, rcv_up);
    crate::ensure_eq!(cb.oob_have_data, false);
    crate::ensure_eq!(listener.socket.state().received, b"abcdef".to_vec());
    crate::ensure_eq!(listener.socket.state().oob_mark, None);
    Ok(())
}

/// An urgent byte in queued data is removed once the gap before it is filled.
#[test]
fn test_urgent_out_of_order() -> Result<()> {
    let engine: Engine = Engine::new(plain_config());
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    let mut seg = segment(111, Some(una), b"klmnop");
    seg.tcp_hdr.urg = true;
    seg.tcp_hdr.urgent_pointer = 2;
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(101));
    crate::ensure_eq!(cb.rcv_up, SeqNumber::from(113));
    crate::ensure_eq!(cb.iobc, b'l');
    crate::ensure_eq!(listener.socket.state().oob_mark, Some(11));
    crate::ensure_eq!(listener.socket.state().received.is_empty(), true);

    engine.input.input(segment(101, Some(una), b"abcdefghij"), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(117));
    crate::ensure_eq!(listener.socket.state().received, b"abcdefghijkmnop".to_vec());
    crate::ensure_eq!(cb.reass.is_empty(), true);
    Ok(())
}

/// An ECN echo outside of recovery halves the window once and asks the sender to signal CWR.
#[test]
fn test_ecn_echo_reduces_window() -> Result<()> {
    let engine: Engine = Engine::new(plain_config().set_ecn(true));
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    cb.flags.ecn_permit = true;
    outstanding(&mut cb, &listener, 1000);
    cb.snd_wnd = 65535;
    cb.snd_cwnd = 65535;
    cb.snd_recover = cb.snd_una;
    let snd_max: SeqNumber = cb.snd_max;
    let ssthresh: u32 = (65535 / 2 / cb.segsz).max(2) * cb.segsz;

    // Would be a predicted acknowledgement without ECE.
    let mut seg = segment(101, Some(una + 500), &[]);
    seg.tcp_hdr.ece = true;
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::PredAck), 0);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::EcnEce), 1);
    crate::ensure_eq!(cb.snd_una, SeqNumber::from(una + 500));
    crate::ensure_eq!(cb.snd_ssthresh, ssthresh);
    crate::ensure_eq!(cb.snd_cwnd, ssthresh);
    crate::ensure_eq!(cb.snd_recover, snd_max);
    crate::ensure_eq!(cb.flags.ecn_snd_cwr, true);

    // Still recovering from the first echo.
    let mut seg = segment(101, Some(una + 1000), &[]);
    seg.tcp_hdr.ece = true;
    engine.input.input(seg, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::EcnEce), 1);
    crate::ensure_eq!(cb.snd_ssthresh, ssthresh);
    crate::ensure_eq!(cb.snd_cwnd, ssthresh);
    crate::ensure_eq!(cb.snd_una, SeqNumber::from(una + 1000));
    Ok(())
}

/// Congestion experienced is echoed until the peer reports a reduced window.
#[test]
fn test_ecn_congestion_experienced() -> Result<()> {
    let engine: Engine = Engine::new(plain_config().set_ecn(true));
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;

    // Not negotiated: the codepoint is ignored.
    let mut seg = segment(101, Some(una), &[]);
    seg.ecn = IpEcn::Ce;
    engine.input.input(seg, Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.flags.ecn_snd_ece, false);

    cb.flags.ecn_permit = true;
    let mut seg = segment(101, Some(una), &[1; 10]);
    seg.ecn = IpEcn::Ce;
    engine.input.input(seg, Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(cb.flags.ecn_snd_ece, true);
    crate::ensure_eq!(engine.input.stats().get(TcpStat::EcnCe), 1);

    let mut seg = segment(111, Some(una), &[]);
    seg.tcp_hdr.cwr = true;
    engine.input.input(seg, Pcb::Connection(&mut cb), 5);
    crate::ensure_eq!(cb.flags.ecn_snd_ece, false);
    Ok(())
}

/// Duplicate data is reported as a D-SACK block, whether already delivered or already queued.
#[test]
fn test_dsack_on_contained_duplicate() -> Result<()> {
    let engine: Engine = Engine::new(plain_config().set_sack(true));
    let listener: TestListener = TestListener::new();
    let (mut cb, una): (Box<ControlBlock>, u32) = established(&engine, &listener)?;
    cb.flags.will_sack = true;

    engine.input.input(segment(121, Some(una), &[2; 20]), Pcb::Connection(&mut cb), 3);
    crate::ensure_eq!(cb.take_dsack(), None);
    engine.input.input(segment(126, Some(una), &[2; 5]), Pcb::Connection(&mut cb), 4);
    crate::ensure_eq!(
        cb.take_dsack(),
        Some(SackBlock {
            start: SeqNumber::from(126),
            end: SeqNumber::from(131),
        })
    );

    engine.input.input(segment(101, Some(una), &[1; 20]), Pcb::Connection(&mut cb), 5);
    crate::ensure_eq!(cb.rcv_nxt, SeqNumber::from(141));
    engine.input.input(segment(101, Some(una), &[1; 10]), Pcb::Connection(&mut cb), 6);
    crate::ensure_eq!(
        cb.take_dsack(),
        Some(SackBlock {
            start: SeqNumber::from(101),
            end: SeqNumber::from(111),
        })
    );
    Ok(())
}

/// In-order data leaves the connection in the same state whether or not it is predicted.
#[test]
fn test_predicted_data_matches_slow_path() -> Result<()> {
    let fast_engine: Engine = Engine::new(plain_config());
    let fast_listener: TestListener = TestListener::new();
    let (mut fast, una): (Box<ControlBlock>, u32) = established(&fast_engine, &fast_listener)?;
    let slow_engine: Engine = Engine::new(plain_config());
    let slow_listener: TestListener = TestListener::new();
    let (mut slow, _): (Box<ControlBlock>, u32) = established(&slow_engine, &slow_listener)?;
    // A window the segment does not match, without the segment being new enough to update it.
    slow.snd_wnd = 70000;
    slow.snd_wl1 = SeqNumber::from(101);
    slow.snd_wl2 = SeqNumber::from(una);

    let fast_outputs: usize = fast_engine.output.outputs();
    let slow_outputs: usize = slow_engine.output.outputs();
    fast_engine.input.input(segment(101, Some(una), &[9; 10]), Pcb::Connection(&mut fast), 3);
    slow_engine.input.input(segment(101, Some(una), &[9; 10]), Pcb::Connection(&mut slow), 3);
    crate::ensure_eq!(fast_engine.input.stats().get(TcpStat::PredDat), 1);
    crate::ensure_eq!(slow_engine.input.stats().get(TcpStat::PredDat), 0);

    crate::ensure_eq!(fast.rcv_nxt, SeqNumber::from(111));
    crate::ensure_eq!(slow.rcv_nxt, fast.rcv_nxt);
    crate::ensure_eq!(slow.flags.del_ack, fast.flags.del_ack);
    crate::ensure_eq!(slow.flags.ack_now, fast.flags.ack_now);
    crate::ensure_eq!(
        slow.timers.is_armed(TimerKind::DelayedAck),
        fast.timers.is_armed(TimerKind::DelayedAck)
    );
    crate::ensure_eq!(slow_listener.socket.state().received, fast_listener.socket.state().received);
    crate::ensure_eq!(
        slow_engine.input.stats().get(TcpStat::RcvByte),
        fast_engine.input.stats().get(TcpStat::RcvByte)
    );
    crate::ensure_eq!(fast_engine.output.outputs(), fast_outputs);
    crate::ensure_eq!(slow_engine.output.outputs(), slow_outputs);
    Ok(())
}
