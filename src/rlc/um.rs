//! Unacknowledged Mode RLC (§4.2): one-byte SN/E header, LI-chained
//! segmentation, no retransmission. Used for SRB0 downlink and most
//! streaming/conversational data RBs (§3, §4.5).

use std::collections::VecDeque;

use crate::config::UmConfig;
use crate::logging::TARGET_RLC;
use crate::sn::SnSpace;

use super::li::{self, Li};
use super::{log_discard, Direction, Pdu, Sdu};

fn width15(direction: Direction, config: &UmConfig) -> bool {
    matches!(direction, Direction::Downlink) && config.li_15_bit_downlink
}

/// UM transmitter: packs as many queued SDUs as fit into each PDU (§4.2),
/// terminating every SDU boundary that falls strictly inside the payload
/// with a `Li::Length` LI. A boundary that lands exactly on the PDU's last
/// byte is instead deferred to the next PDU's leading special LI
/// (`PrevExact`/`PrevShortByOne`), since the reduced alphabet still has no
/// way to mark "this is the last byte" from inside the same LI chain it
/// terminates. Leftover space once nothing more is queued is marked
/// `Li::Padding` rather than left ambiguous.
#[derive(Debug)]
pub struct UmTransmitter {
    config: UmConfig,
    direction: Direction,
    queue: VecDeque<Sdu>,
    current: Option<(Sdu, usize)>,
    pending_retro: Option<Li>,
    next_sn: u32,
}

impl UmTransmitter {
    pub fn new(config: UmConfig, direction: Direction) -> Self {
        Self {
            config,
            direction,
            queue: VecDeque::new(),
            current: None,
            pending_retro: None,
            next_sn: 0,
        }
    }

    pub fn write_sdu(&mut self, sdu: Sdu) {
        self.queue.push_back(sdu);
    }

    pub fn has_data(&self) -> bool {
        self.current.is_some() || !self.queue.is_empty()
    }

    pub fn queued_bytes(&self) -> usize {
        self.current
            .as_ref()
            .map(|(sdu, offset)| sdu.len() - offset)
            .unwrap_or(0)
            + self.queue.iter().map(Sdu::len).sum::<usize>()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.current = None;
        self.pending_retro = None;
        self.next_sn = 0;
    }

    /// Pulled by MAC once per TTI (§4.3 step 1); `None` if there is
    /// nothing left to say.
    pub fn pull_pdu(&mut self) -> Option<Pdu> {
        if self.current.is_none() && self.queue.is_empty() && self.pending_retro.is_none() {
            return None;
        }

        let width15 = width15(self.direction, &self.config);
        let li_width = li::width_bytes(width15);
        let mut lis = Vec::new();
        let mut payload = Vec::new();
        let mut budget = self.config.pdu_size_bytes.saturating_sub(1);

        if let Some(retro) = self.pending_retro.take() {
            if budget < li_width {
                // PDU too small to even carry the retro marker; drop it
                // rather than block forever.
                self.pending_retro = None;
            } else {
                lis.push(retro);
                budget -= li_width;
            }
        }

        loop {
            if self.current.is_none() {
                let Some(sdu) = self.queue.pop_front() else { break };
                if payload.is_empty() {
                    let mandatory = matches!(self.direction, Direction::Uplink);
                    let advisory = matches!(self.direction, Direction::Downlink)
                        && self.config.allow_downlink_start_of_sdu_li;
                    if (mandatory || advisory) && budget >= li_width {
                        lis.push(Li::StartOfSdu);
                        budget -= li_width;
                    }
                }
                self.current = Some((sdu, 0));
            }

            let (sdu, offset) = self.current.as_mut().expect("just populated above");
            let remaining = sdu.len() - *offset;
            let take = remaining.min(budget);
            payload.extend_from_slice(&sdu.bytes[*offset..*offset + take]);
            *offset += take;
            budget -= take;

            if *offset < sdu.len() {
                // PDU is full mid-SDU; the rest continues in a future PDU.
                break;
            }

            self.current = None;

            if budget == 0 {
                // Exact fit: the boundary marker is deferred to the next
                // PDU's leading special LI rather than spent here.
                self.pending_retro = Some(Li::PrevExact);
                break;
            }

            if budget < li_width {
                self.pending_retro = if width15 {
                    Some(Li::PrevShortByOne)
                } else {
                    Some(Li::PrevExact)
                };
                break;
            }

            // Room remains for another LI: record this SDU's own length
            // and, if more is queued, go round again to pack it too.
            lis.push(Li::Length(take.min(Li::max_length(width15) as usize) as u16));
            budget -= li_width;

            if self.queue.is_empty() {
                break;
            }
        }

        if payload.is_empty() && lis.is_empty() {
            return None;
        }

        if self.current.is_none() && self.queue.is_empty() && budget >= li_width && self.pending_retro.is_none()
        {
            // Nothing left queued and the boundary wasn't deferred: the
            // remaining space is genuine padding, not ambiguous trailing
            // bytes.
            lis.push(Li::Padding);
        }

        let sn = self.next_sn;
        self.next_sn = SnSpace::UM.add(sn, 1);
        let mut bytes = li::encode_header_and_lis(sn, width15, &lis);
        bytes.extend(payload);
        Some(Pdu::new(bytes))
    }
}

/// UM receiver: reassembles in SN order and discards whatever it cannot
/// prove complete once a gap is observed (§8 "RLC-UM monotonicity" —
/// delivered SDUs are a subsequence of transmitted ones, never repeated).
#[derive(Debug)]
pub struct UmReceiver {
    config: UmConfig,
    direction: Direction,
    expected_sn: Option<u32>,
    accum: Vec<u8>,
    desynced: bool,
}

impl UmReceiver {
    pub fn new(config: UmConfig, direction: Direction) -> Self {
        Self {
            config,
            direction,
            expected_sn: None,
            accum: Vec::new(),
            desynced: false,
        }
    }

    pub fn reset(&mut self) {
        self.expected_sn = None;
        self.accum.clear();
        self.desynced = false;
    }

    /// Returns every SDU this PDU completes — zero if it only continues an
    /// SDU still in flight, one or more when the PDU packs several SDUs
    /// behind `Li::Length` markers (§4.2).
    pub fn receive_pdu(&mut self, pdu: Pdu) -> Vec<Vec<u8>> {
        let width15 = width15(self.direction, &self.config);
        let (sn, lis, consumed) = match li::decode_header_and_lis(&pdu.bytes, width15) {
            Ok(v) => v,
            Err(_) => {
                log::warn!(target: TARGET_RLC, "dropping malformed UM PDU");
                return Vec::new();
            }
        };

        if let Some(expected) = self.expected_sn {
            let diff = SnSpace::UM.delta(sn, expected);
            if diff < 0 {
                return Vec::new(); // stale, already past this SN
            }
            if diff > 0 && !self.accum.is_empty() {
                log_discard("UM", "sequence number gap before retro marker arrived");
                self.accum.clear();
                self.desynced = true;
            }
        }
        self.expected_sn = Some(SnSpace::UM.add(sn, 1));

        let mut delivered = Vec::new();
        let data = &pdu.bytes[consumed..];
        let mut cursor = 0usize;
        let mut consumed_to_end = false;
        // The reserved "about the previous PDU" codepoints only mean
        // anything as the first LI in the chain (§4.2); every LI after it
        // either closes a segment with an explicit length or terminates
        // the chain (padding / piggybacked status).
        let mut leading = true;

        for li in &lis {
            match li {
                Li::PrevExact if leading && !self.accum.is_empty() => {
                    delivered.push(std::mem::take(&mut self.accum));
                }
                Li::PrevShortByOne if leading && !self.accum.is_empty() => {
                    let mut sdu = std::mem::take(&mut self.accum);
                    sdu.pop();
                    delivered.push(sdu);
                }
                Li::StartOfSdu if leading => {
                    if !self.accum.is_empty() {
                        log_discard("UM", "new SDU start before previous one closed");
                        self.accum.clear();
                    }
                    self.desynced = false;
                }
                Li::WholeSdu if leading => {
                    self.accum.clear();
                    delivered.push(data.to_vec());
                    self.desynced = false;
                    consumed_to_end = true;
                }
                Li::Length(n) => {
                    // A self-contained segment bounded by this chain, not
                    // by cross-PDU state — deliverable regardless of any
                    // past desync, which only taints the trailing leftover.
                    let end = (cursor + *n as usize).min(data.len());
                    self.accum.extend_from_slice(&data[cursor..end]);
                    delivered.push(std::mem::take(&mut self.accum));
                    self.desynced = false;
                    cursor = end;
                }
                Li::Padding | Li::PiggybackStatus => consumed_to_end = true,
                _ => {}
            }
            leading = false;
        }

        if !consumed_to_end && !self.desynced {
            self.accum.extend_from_slice(&data[cursor..]);
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::DiscardMode;

    fn config() -> UmConfig {
        UmConfig {
            pdu_size_bytes: 8,
            ..UmConfig::default()
        }
    }

    #[test]
    fn um_delivers_sdu_that_fits_one_pdu() {
        let mut tx = UmTransmitter::new(config(), Direction::Uplink);
        let mut rx = UmReceiver::new(config(), Direction::Uplink);
        tx.write_sdu(Sdu::new(vec![1, 2, 3], DiscardMode::NoDiscard, 0));

        // room is left over after the SDU, so its own Length LI closes it
        // out in the same PDU rather than deferring to the next one.
        let pdu = tx.pull_pdu().unwrap();
        let delivered = rx.receive_pdu(pdu);
        assert_eq!(delivered, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn um_packs_two_sdus_into_one_pdu() {
        let mut tx = UmTransmitter::new(config(), Direction::Uplink);
        let mut rx = UmReceiver::new(config(), Direction::Uplink);
        tx.write_sdu(Sdu::new(vec![1, 2], DiscardMode::NoDiscard, 0));
        tx.write_sdu(Sdu::new(vec![3, 4], DiscardMode::NoDiscard, 1));

        let pdu = tx.pull_pdu().unwrap();
        assert!(tx.pull_pdu().is_none(), "both SDUs should have fit in one PDU");

        let delivered = rx.receive_pdu(pdu);
        assert_eq!(delivered, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn um_segments_sdu_larger_than_pdu() {
        let mut tx = UmTransmitter::new(config(), Direction::Uplink);
        let mut rx = UmReceiver::new(config(), Direction::Uplink);
        let big: Vec<u8> = (0..20).collect();
        tx.write_sdu(Sdu::new(big.clone(), DiscardMode::NoDiscard, 0));

        let mut delivered = Vec::new();
        while tx.has_data() || delivered.is_empty() {
            // once the SDU is fully sent, pulling again still yields a
            // zero-payload PDU carrying the retro marker that closes it.
            let Some(pdu) = tx.pull_pdu() else { break };
            delivered.extend(rx.receive_pdu(pdu));
        }
        assert_eq!(delivered, vec![big]);

        // a following SDU must not be folded into the one already closed;
        // it gets its own PDU and closes out immediately.
        tx.write_sdu(Sdu::new(vec![0xff], DiscardMode::NoDiscard, 1));
        let pdu = tx.pull_pdu().unwrap();
        let more = rx.receive_pdu(pdu);
        assert_eq!(more, vec![vec![0xff]]);
    }

    #[test]
    fn um_gap_discards_partial_sdu_without_duplicate_delivery() {
        let mut tx = UmTransmitter::new(config(), Direction::Uplink);
        let mut rx = UmReceiver::new(config(), Direction::Uplink);
        let big: Vec<u8> = (0..20).collect();
        tx.write_sdu(Sdu::new(big, DiscardMode::NoDiscard, 0));

        let first = tx.pull_pdu().unwrap();
        let _second = tx.pull_pdu().unwrap(); // lost in flight
        let third = tx.pull_pdu().unwrap();

        let mut delivered = Vec::new();
        delivered.extend(rx.receive_pdu(first));
        delivered.extend(rx.receive_pdu(third));
        assert!(delivered.is_empty(), "partial SDU must not surface after an unrecovered gap");

        tx.write_sdu(Sdu::new(vec![1, 2, 3], DiscardMode::NoDiscard, 1));
        let next = tx.pull_pdu().unwrap();
        delivered.extend(rx.receive_pdu(next));

        assert_eq!(delivered, vec![vec![1, 2, 3]]);
    }
}
