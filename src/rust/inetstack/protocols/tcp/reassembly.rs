// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::protocols::tcp::{
    interface::SocketBuffer,
    options::SackBlock,
    stats::{
        TcpStat,
        TcpStats,
    },
    SeqNumber,
};
use ::std::collections::VecDeque;

//======================================================================================================================
// Structures
//======================================================================================================================

/// One contiguous run of received bytes that cannot be delivered yet.
#[derive(Debug, PartialEq, Eq)]
struct ReassemblyEntry {
    seq: SeqNumber,
    data: Vec<u8>,
    fin: bool,
}

/// Out-of-order data of one connection.
///
/// Entries are sorted by starting sequence number, never overlap and are never adjacent: a segment that touches an
/// entry is merged into it.
#[derive(Debug)]
pub struct ReassemblyQueue {
    entries: VecDeque<ReassemblyEntry>,
    limit: usize,
    /// Out-of-band bytes to splice out of the stream on delivery.
    urgent: Vec<SeqNumber>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ReassemblyEntry {
    fn end(&self) -> SeqNumber {
        self.seq + self.data.len() as u32
    }
}

impl ReassemblyQueue {
    /// Creates a queue holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            urgent: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sequence ranges held, in order.
    pub fn ranges(&self) -> Vec<(SeqNumber, SeqNumber)> {
        self.entries.iter().map(|entry| (entry.seq, entry.end())).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.urgent.clear();
    }

    /// Marks the byte at `seq` as out-of-band data, removed from the stream when presented.
    pub fn mark_urgent(&mut self, seq: SeqNumber) {
        if !self.urgent.contains(&seq) {
            self.urgent.push(seq);
        }
    }

    /// Queues a segment. Returns the range to report as a duplicate SACK when every byte was already held.
    pub fn insert(&mut self, seq: SeqNumber, data: Vec<u8>, fin: bool, stats: &TcpStats) -> Option<SackBlock> {
        let mut pkt_seq: SeqNumber = seq;
        let mut data: Vec<u8> = data;
        let mut fin: bool = fin;
        let mut oobytes: u32 = data.len() as u32;
        let mut partdup: u32 = 0;

        if let Some(tail) = self.entries.back_mut() {
            // When a packet is lost, most of what follows arrives in order behind the gap.
            if pkt_seq == tail.end() {
                tail.data.extend_from_slice(&data);
                tail.fin |= fin;
                Self::count_out_of_order(stats, oobytes, 0);
                return None;
            }
            if pkt_seq > tail.end() {
                let at: usize = self.entries.len();
                return self.allocate(at, pkt_seq, data, fin, stats, oobytes, 0);
            }
        }

        if let Some(head) = self.entries.front_mut() {
            if pkt_seq + data.len() as u32 == head.seq {
                data.append(&mut head.data);
                head.data = data;
                head.seq = pkt_seq;
                head.fin |= fin;
                Self::count_out_of_order(stats, oobytes, 0);
                return None;
            }
        }

        // Insertion point: after every entry that starts at or before the segment.
        let mut at: usize = 0;
        let mut merged: bool = false;
        let mut i: usize = 0;
        while i < self.entries.len() {
            let q_seq: SeqNumber = self.entries[i].seq;
            let q_end: SeqNumber = self.entries[i].end();
            let pkt_end: SeqNumber = pkt_seq + data.len() as u32;

            // The segment continues this entry: absorb the entry and keep looking for overlaps.
            if q_end == pkt_seq {
                let mut entry: ReassemblyEntry = self.remove(i);
                entry.data.append(&mut data);
                data = entry.data;
                pkt_seq = entry.seq;
                fin |= entry.fin;
                merged = true;
                continue;
            }
            if q_end < pkt_seq {
                at = i + 1;
                i += 1;
                continue;
            }
            // This entry and the ones after it start beyond the segment.
            if q_seq > pkt_end {
                break;
            }
            // Everything in the segment is already held.
            if q_seq <= pkt_seq && q_end >= pkt_end {
                stats.inc(TcpStat::RcvDupPack);
                stats.add(TcpStat::RcvDupByte, data.len() as u64);
                return Some(SackBlock {
                    start: pkt_seq,
                    end: pkt_end,
                });
            }
            // The segment covers the entry.
            if q_seq >= pkt_seq && q_end <= pkt_end {
                partdup += self.remove(i).data.len() as u32;
                merged = true;
                continue;
            }
            // The entry overlaps the front of the segment: trim ours and absorb the entry.
            if q_seq < pkt_seq && q_end > pkt_seq {
                let overlap: u32 = (q_end - pkt_seq).into();
                data.drain(..overlap as usize);
                partdup += overlap;
                oobytes -= overlap;
                let mut entry: ReassemblyEntry = self.remove(i);
                entry.data.append(&mut data);
                data = entry.data;
                pkt_seq = entry.seq;
                fin |= entry.fin;
                merged = true;
                continue;
            }
            // The entry overlaps the tail of the segment: trim ours.
            if q_seq > pkt_seq && q_seq < pkt_end {
                let overlap: u32 = (pkt_end - q_seq).into();
                data.truncate(data.len() - overlap as usize);
                partdup += overlap;
                oobytes -= overlap;
            }
            // The segment now ends where the entry starts: absorb the entry, nothing after it can overlap.
            if q_seq == pkt_seq + data.len() as u32 {
                let mut entry: ReassemblyEntry = self.remove(i);
                data.append(&mut entry.data);
                fin |= entry.fin;
                merged = true;
                break;
            }
            if q_seq <= pkt_seq {
                at = i + 1;
            }
            i += 1;
        }

        if merged {
            self.entries.insert(at, ReassemblyEntry {
                seq: pkt_seq,
                data,
                fin,
            });
            Self::count_out_of_order(stats, oobytes, partdup);
            return None;
        }
        self.allocate(at, pkt_seq, data, fin, stats, oobytes, partdup)
    }

    /// Delivers the run of entries starting at `rcv_nxt` and advances it. Returns whether the run ended in a FIN.
    /// Data is discarded when the socket cannot receive more.
    pub fn present(&mut self, rcv_nxt: &mut SeqNumber, socket: &mut dyn SocketBuffer) -> bool {
        while self.entries.front().is_some_and(|head| head.seq == *rcv_nxt) {
            let Some(head) = self.entries.pop_front() else {
                break;
            };
            *rcv_nxt = head.end();
            let fin: bool = head.fin;
            let data: Vec<u8> = self.strip_urgent(head);
            if !socket.cant_receive_more() && !data.is_empty() {
                socket.append(data);
            }
            if fin {
                self.prune_urgent(*rcv_nxt);
                return true;
            }
        }
        self.prune_urgent(*rcv_nxt);
        false
    }

    /// Removes the marked out-of-band bytes from an entry being delivered.
    fn strip_urgent(&self, entry: ReassemblyEntry) -> Vec<u8> {
        let mut data: Vec<u8> = entry.data;
        let end: SeqNumber = entry.seq + data.len() as u32;
        let mut offsets: Vec<usize> = self
            .urgent
            .iter()
            .filter(|mark| **mark >= entry.seq && **mark < end)
            .map(|mark| u32::from(*mark - entry.seq) as usize)
            .collect();
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        for offset in offsets {
            data.remove(offset);
        }
        data
    }

    fn prune_urgent(&mut self, rcv_nxt: SeqNumber) {
        self.urgent.retain(|mark| *mark >= rcv_nxt);
    }

    fn remove(&mut self, index: usize) -> ReassemblyEntry {
        match self.entries.remove(index) {
            Some(entry) => entry,
            None => unreachable!("reassembly index {} out of bounds", index),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate(
        &mut self,
        at: usize,
        seq: SeqNumber,
        data: Vec<u8>,
        fin: bool,
        stats: &TcpStats,
        oobytes: u32,
        partdup: u32,
    ) -> Option<SackBlock> {
        if self.entries.len() >= self.limit {
            trace!("reassembly queue full, dropping {} bytes at {}", data.len(), seq);
            stats.inc(TcpStat::RcvMemDrop);
            return None;
        }
        self.entries.insert(at, ReassemblyEntry { seq, data, fin });
        Self::count_out_of_order(stats, oobytes, partdup);
        None
    }

    fn count_out_of_order(stats: &TcpStats, oobytes: u32, partdup: u32) {
        stats.inc(TcpStat::RcvOoPack);
        stats.add(TcpStat::RcvOoByte, oobytes as u64);
        if partdup > 0 {
            stats.inc(TcpStat::RcvPartDupPack);
            stats.add(TcpStat::RcvPartDupByte, partdup as u64);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
