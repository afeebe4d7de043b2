//! Fragment reassembly for large `udpm://` messages.
//!
//! Each sender has at most one message in flight. A fragment that belongs to
//! a different message (new seqno or size) replaces the sender's buffer, so a
//! lost fragment only costs the message it belonged to. Buffers are capped in
//! number and in total bytes; the least recently touched one is evicted first.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::debug;

use crate::packet::FragmentHeader;

/// Maximum number of senders with a partially received message.
pub const MAX_BUFFERS: usize = 1000;
/// Maximum bytes held across all partial messages.
pub const MAX_TOTAL_BYTES: usize = 1 << 24;

struct FragmentBuffer {
    seqno: u32,
    channel: Option<String>,
    data: Vec<u8>,
    received: Vec<bool>,
    remaining: usize,
    last_touch: u64,
}

/// A fully reassembled message.
#[derive(Debug, PartialEq, Eq)]
pub struct Reassembled {
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct FragmentReassembler {
    buffers: HashMap<SocketAddr, FragmentBuffer>,
    total_bytes: usize,
    clock: u64,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of partial messages currently buffered.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Feed one fragment. Returns the message once its last fragment arrives.
    pub fn accept(
        &mut self,
        sender: SocketAddr,
        header: &FragmentHeader,
        channel: Option<&str>,
        data: &[u8],
    ) -> Option<Reassembled> {
        let msg_size = header.msg_size as usize;
        let offset = header.fragment_offset as usize;
        if msg_size > MAX_TOTAL_BYTES {
            debug!(%sender, msg_size, "dropping fragment of oversized message");
            return None;
        }
        if offset.checked_add(data.len()).is_none_or(|end| end > msg_size) {
            debug!(%sender, offset, len = data.len(), msg_size, "dropping out-of-bounds fragment");
            return None;
        }

        let stale = self.buffers.get(&sender).is_some_and(|b| {
            b.seqno != header.seqno
                || b.data.len() != msg_size
                || b.received.len() != header.fragments_in_msg as usize
        });
        if stale {
            self.remove(&sender);
        }
        if !self.buffers.contains_key(&sender) {
            self.make_room(msg_size);
            self.total_bytes += msg_size;
            self.buffers.insert(
                sender,
                FragmentBuffer {
                    seqno: header.seqno,
                    channel: None,
                    data: vec![0; msg_size],
                    received: vec![false; header.fragments_in_msg as usize],
                    remaining: header.fragments_in_msg as usize,
                    last_touch: 0,
                },
            );
        }

        self.clock += 1;
        let buffer = self.buffers.get_mut(&sender)?;
        buffer.last_touch = self.clock;
        let slot = header.fragment_no as usize;
        if buffer.received[slot] {
            return None;
        }
        buffer.received[slot] = true;
        buffer.remaining -= 1;
        buffer.data[offset..offset + data.len()].copy_from_slice(data);
        if let Some(channel) = channel {
            buffer.channel = Some(channel.to_string());
        }

        if buffer.remaining > 0 {
            return None;
        }
        let done = self.remove(&sender)?;
        Some(Reassembled {
            channel: done.channel?,
            payload: done.data,
        })
    }

    fn remove(&mut self, sender: &SocketAddr) -> Option<FragmentBuffer> {
        let buffer = self.buffers.remove(sender)?;
        self.total_bytes -= buffer.data.len();
        Some(buffer)
    }

    fn make_room(&mut self, incoming: usize) {
        while !self.buffers.is_empty()
            && (self.buffers.len() >= MAX_BUFFERS || self.total_bytes + incoming > MAX_TOTAL_BYTES)
        {
            let oldest = self
                .buffers
                .iter()
                .min_by_key(|(_, b)| b.last_touch)
                .map(|(addr, _)| *addr);
            match oldest {
                Some(addr) => {
                    debug!(sender = %addr, "evicting partial message");
                    self.remove(&addr);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{self, Datagram};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn feed(r: &mut FragmentReassembler, from: SocketAddr, dgram: &[u8]) -> Option<Reassembled> {
        match packet::parse(dgram).unwrap() {
            Datagram::Fragment {
                header,
                channel,
                data,
            } => r.accept(from, &header, channel, data),
            Datagram::Short { .. } => panic!("expected a fragment"),
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn reassembles_in_order() {
        let data = payload(4000);
        let frags = packet::encode(1, "STATUS", &data).unwrap();
        let mut r = FragmentReassembler::new();
        let (last, rest) = frags.split_last().unwrap();
        for f in rest {
            assert!(feed(&mut r, addr(1), f).is_none());
        }
        let done = feed(&mut r, addr(1), last).unwrap();
        assert_eq!(done.channel, "STATUS");
        assert_eq!(done.payload, data);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.total_bytes(), 0);
    }

    #[test]
    fn reassembles_out_of_order() {
        let data = payload(4000);
        let mut frags = packet::encode(9, "MODE", &data).unwrap();
        frags.reverse();
        let mut r = FragmentReassembler::new();
        let mut result = None;
        for f in &frags {
            result = feed(&mut r, addr(2), f);
        }
        assert_eq!(result.unwrap().payload, data);
    }

    #[test]
    fn duplicate_fragment_does_not_complete_early() {
        let frags = packet::encode(1, "STATUS", &payload(3000)).unwrap();
        assert_eq!(frags.len(), 3);
        let mut r = FragmentReassembler::new();
        assert!(feed(&mut r, addr(1), &frags[0]).is_none());
        assert!(feed(&mut r, addr(1), &frags[0]).is_none());
        assert!(feed(&mut r, addr(1), &frags[1]).is_none());
        assert!(feed(&mut r, addr(1), &frags[2]).is_some());
    }

    #[test]
    fn new_seqno_replaces_partial_message() {
        let first = packet::encode(1, "STATUS", &payload(3000)).unwrap();
        let second = packet::encode(2, "STATUS", &payload(3000)).unwrap();
        let mut r = FragmentReassembler::new();
        assert!(feed(&mut r, addr(1), &first[0]).is_none());
        assert!(feed(&mut r, addr(1), &first[1]).is_none());
        assert!(feed(&mut r, addr(1), &second[0]).is_none());
        assert_eq!(r.pending(), 1);
        // The tail of message 1 now starts a fresh buffer and cannot complete.
        assert!(feed(&mut r, addr(1), &first[2]).is_none());
        assert!(feed(&mut r, addr(1), &second[1]).is_none());
        assert!(feed(&mut r, addr(1), &second[2]).is_none());
        assert_eq!(r.pending(), 1);
    }

    #[test]
    fn new_size_replaces_partial_message() {
        let first = packet::encode(7, "STATUS", &payload(3000)).unwrap();
        let resized = packet::encode(7, "STATUS", &payload(3500)).unwrap();
        assert_eq!(resized.len(), first.len());
        let mut r = FragmentReassembler::new();
        assert!(feed(&mut r, addr(1), &first[0]).is_none());
        assert!(feed(&mut r, addr(1), &first[1]).is_none());
        assert_eq!(r.total_bytes(), 3000);

        assert!(feed(&mut r, addr(1), &resized[0]).is_none());
        assert_eq!(r.pending(), 1);
        assert_eq!(r.total_bytes(), 3500);
        // The old tail would complete the old buffer; it replaces the new one instead.
        assert!(feed(&mut r, addr(1), &first[2]).is_none());
        assert_eq!(r.total_bytes(), 3000);
    }

    #[test]
    fn senders_are_kept_apart() {
        let data = payload(3000);
        let frags = packet::encode(1, "STATUS", &data).unwrap();
        let mut r = FragmentReassembler::new();
        assert!(feed(&mut r, addr(1), &frags[0]).is_none());
        assert!(feed(&mut r, addr(2), &frags[1]).is_none());
        assert!(feed(&mut r, addr(1), &frags[2]).is_none());
        assert_eq!(r.pending(), 2);
    }

    #[test]
    fn out_of_bounds_fragment_is_dropped() {
        let header = FragmentHeader {
            seqno: 1,
            msg_size: 10,
            fragment_offset: 8,
            fragment_no: 1,
            fragments_in_msg: 2,
        };
        let mut r = FragmentReassembler::new();
        assert!(r.accept(addr(1), &header, None, &[0; 5]).is_none());
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn buffer_count_is_bounded() {
        let frags = packet::encode(1, "STATUS", &payload(3000)).unwrap();
        let mut r = FragmentReassembler::new();
        for port in 0..(MAX_BUFFERS as u16 + 5) {
            feed(&mut r, addr(port), &frags[0]);
        }
        assert_eq!(r.pending(), MAX_BUFFERS);
    }

    #[test]
    fn total_bytes_are_bounded() {
        const MSG: u32 = 2 << 20;
        let header = FragmentHeader {
            seqno: 1,
            msg_size: MSG,
            fragment_offset: 0,
            fragment_no: 0,
            fragments_in_msg: 2,
        };
        let mut r = FragmentReassembler::new();
        for port in 0..20 {
            assert!(r.accept(addr(port), &header, Some("STATUS"), &[1; 16]).is_none());
            assert!(r.total_bytes() <= MAX_TOTAL_BYTES);
        }
        assert_eq!(r.pending(), MAX_TOTAL_BYTES / MSG as usize);
        assert_eq!(r.total_bytes(), MAX_TOTAL_BYTES);

        // The oldest senders were evicted; the newest one still completes.
        let tail = FragmentHeader {
            fragment_offset: MSG - 16,
            fragment_no: 1,
            ..header
        };
        assert!(r.accept(addr(0), &tail, None, &[2; 16]).is_none());
        assert!(r.accept(addr(19), &tail, None, &[2; 16]).is_some());
    }
}
