//! Transparent Mode RLC (§4.2): no header, no sequence number, no
//! retransmission. Used for SRB0 uplink and every circuit-switched AMR
//! sub-flow (§3, §4.5(d)).

use smallvec::SmallVec;

use super::{Pdu, Sdu};

/// A TM entity carries at most one SDU per TTI in steady state; a handful
/// of slots covers bursty submission without spilling to the heap.
type TmQueue = SmallVec<[Sdu; 4]>;

/// TM transmitter: each queued SDU becomes exactly one PDU of the SDU's
/// own bit length, unchanged.
#[derive(Debug, Default)]
pub struct TmTransmitter {
    queue: TmQueue,
}

impl TmTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_sdu(&mut self, sdu: Sdu) {
        self.queue.push(sdu);
    }

    /// Pulled by MAC once per TTI; `None` if nothing is queued.
    pub fn pull_pdu(&mut self) -> Option<Pdu> {
        if self.queue.is_empty() {
            return None;
        }
        Some(Pdu::new(self.queue.remove(0).bytes))
    }

    pub fn has_data(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn queued_bytes(&self) -> usize {
        self.queue.iter().map(Sdu::len).sum()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
    }
}

/// TM receiver: every inbound PDU becomes a new SDU, unchanged.
#[derive(Debug, Default)]
pub struct TmReceiver;

impl TmReceiver {
    pub fn new() -> Self {
        Self
    }

    pub fn receive_pdu(&mut self, pdu: Pdu) -> Vec<u8> {
        pdu.bytes
    }

    pub fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::DiscardMode;

    #[test]
    fn tm_passes_sdu_through_unchanged() {
        let mut tx = TmTransmitter::new();
        tx.write_sdu(Sdu::new(vec![1, 2, 3], DiscardMode::NoDiscard, 0));
        let pdu = tx.pull_pdu().unwrap();
        assert_eq!(pdu.bytes, vec![1, 2, 3]);
        assert!(tx.pull_pdu().is_none());

        let mut rx = TmReceiver::new();
        assert_eq!(rx.receive_pdu(pdu), vec![1, 2, 3]);
    }

    #[test]
    fn tm_preserves_submission_order() {
        let mut tx = TmTransmitter::new();
        for i in 0..5u8 {
            tx.write_sdu(Sdu::new(vec![i], DiscardMode::NoDiscard, i as u64));
        }
        for i in 0..5u8 {
            assert_eq!(tx.pull_pdu().unwrap().bytes, vec![i]);
        }
    }
}
