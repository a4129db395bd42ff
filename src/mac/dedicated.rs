//! MAC-D: one UE's dedicated channel (DCH) pair once it has moved to
//! CELL_DCH (§4.3). A UE may multiplex several RBs onto one DCH TrCh (4-bit
//! C/T header) or bind one RB to its own TrCh (no header at all).

use crate::tb::{TransportBlock, TransportBlockSet};
use crate::trch::{Tfcs, TrChConfig};

use super::{header, tfc_select, LogicalChannelPdu, MacEngine, MacError};

pub struct DedicatedMac {
    uplink: Vec<TrChConfig>,
    uplink_tfcs: Tfcs,
    downlink: Vec<TrChConfig>,
    downlink_tfcs: Tfcs,
}

impl DedicatedMac {
    pub fn new(
        uplink: Vec<TrChConfig>,
        uplink_tfcs: Tfcs,
        downlink: Vec<TrChConfig>,
        downlink_tfcs: Tfcs,
    ) -> Self {
        Self {
            uplink,
            uplink_tfcs,
            downlink,
            downlink_tfcs,
        }
    }

    fn trch_for_rb(trchs: &[TrChConfig], rb: crate::types::RbId) -> Option<usize> {
        trchs
            .iter()
            .position(|t| t.bound_rb == Some(rb))
            .or_else(|| trchs.iter().position(|t| t.is_multiplexed()))
    }
}

impl MacEngine for DedicatedMac {
    fn assemble_tti(
        &mut self,
        ready: Vec<LogicalChannelPdu>,
    ) -> Result<TransportBlockSet, MacError> {
        let mut per_trch: Vec<Vec<Vec<u8>>> = vec![Vec::new(); self.downlink.len()];
        for pdu in ready {
            let idx = Self::trch_for_rb(&self.downlink, pdu.rb)
                .ok_or(MacError::UnknownLogicalChannel { ct: pdu.rb.get() })?;
            let trch = &self.downlink[idx];
            let mut wire = header::encode_dedicated_header(trch.is_multiplexed(), pdu.rb);
            wire.extend(pdu.bytes);
            per_trch[idx].push(wire);
        }

        let available: Vec<u32> = per_trch
            .iter()
            .map(|wires| wires.iter().map(|w| w.len() as u32).sum())
            .collect();
        let tfss: Vec<_> = self.downlink.iter().map(|t| t.tfs.clone()).collect();
        let tfci = tfc_select::select_tfc(&self.downlink_tfcs, &tfss, &available)
            .ok_or(MacError::NoMatchingTfc)?;
        let tfc = &self.downlink_tfcs.combinations[tfci];

        let mut tbs = TransportBlockSet::new(tfci as u16);
        for (idx, wires) in per_trch.into_iter().enumerate() {
            let tf_index = tfc.tf_indices[idx];
            let tf = self.downlink[idx]
                .tfs
                .tf(tf_index)
                .ok_or(MacError::NoMatchingTfc)?;
            for wire in wires.into_iter().take(tf.block_count as usize) {
                tbs.push_checked(TransportBlock::from_bits(wire), tf.block_size_bytes() as usize)?;
            }
        }
        Ok(tbs)
    }

    fn disassemble_tti(
        &mut self,
        tbs: TransportBlockSet,
    ) -> Result<Vec<LogicalChannelPdu>, MacError> {
        let tfci = tbs.tfci();
        let tfc = self
            .uplink_tfcs
            .combinations
            .get(tfci as usize)
            .ok_or(MacError::TfciOutOfRange { tfci })?;

        let mut out = Vec::new();
        let mut blocks = tbs.into_iter();
        for (idx, &tf_index) in tfc.tf_indices.iter().enumerate() {
            let trch = &self.uplink[idx];
            let tf = trch
                .tfs
                .tf(tf_index)
                .ok_or(MacError::TfciOutOfRange { tfci })?;
            for _ in 0..tf.block_count {
                let block = blocks.next().ok_or(MacError::MalformedHeader)?;
                let bytes = block.into_bytes();
                if trch.is_multiplexed() {
                    let (rb, consumed) = header::decode_dedicated_header(true, &bytes)
                        .ok_or(MacError::MalformedHeader)?;
                    out.push(LogicalChannelPdu::new(rb, bytes[consumed..].to_vec()));
                } else {
                    let rb = trch.bound_rb.ok_or(MacError::MalformedHeader)?;
                    out.push(LogicalChannelPdu::new(rb, bytes));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trch::{CodingType, CrcSize, SemiStatic, Tfc, TransportFormat, TrChId, TrChKind, Tti};
    use crate::types::RbId;

    fn tfs(block_size_bits: u32, counts: &[u32]) -> crate::trch::TransportFormatSet {
        crate::trch::TransportFormatSet {
            semi_static: SemiStatic {
                tti: Tti::Ms10,
                coding: CodingType::Turbo,
                rate_matching: 100,
                crc_size: CrcSize::Bits16,
            },
            formats: counts
                .iter()
                .map(|&count| TransportFormat {
                    block_size_bits,
                    block_count: count,
                })
                .collect(),
        }
    }

    #[test]
    fn single_rb_dch_needs_no_header() {
        // single-RB TrCh: no C/T header, block is exactly the RLC PDU.
        let downlink = vec![TrChConfig {
            id: TrChId(0),
            kind: TrChKind::DownlinkDch,
            tfs: tfs(32, &[0, 1]),
            bound_rb: Some(RbId::new(5)),
        }];
        let downlink_tfcs = Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![2],
            combinations: vec![
                Tfc { tf_indices: vec![0] },
                Tfc { tf_indices: vec![1] },
            ],
        };
        let uplink = downlink.clone();
        let uplink_tfcs = Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![2],
            combinations: downlink_tfcs.combinations.clone(),
        };
        let mut mac = DedicatedMac::new(uplink, uplink_tfcs, downlink, downlink_tfcs);

        let pdu = LogicalChannelPdu::new(RbId::new(5), vec![1, 2, 3, 4]);
        let tbs = mac.assemble_tti(vec![pdu]).unwrap();
        assert_eq!(tbs.len(), 1);
        assert_eq!(tbs.iter().next().unwrap().as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn multiplexed_dch_round_trips_the_ct_header() {
        let trch = TrChConfig {
            id: TrChId(1),
            kind: TrChKind::DownlinkDch,
            tfs: tfs(40, &[0, 1, 2]),
            bound_rb: None,
        };
        let tfcs = Tfcs {
            trch_ids: vec![TrChId(1)],
            tf_counts: vec![3],
            combinations: (0..3).map(|i| Tfc { tf_indices: vec![i] }).collect(),
        };
        let mut mac = DedicatedMac::new(
            vec![trch.clone()],
            tfcs.clone(),
            vec![trch],
            tfcs,
        );

        let pdu_a = LogicalChannelPdu::new(RbId::new(5), vec![1, 2, 3, 4]);
        let pdu_b = LogicalChannelPdu::new(RbId::new(6), vec![9, 9, 9, 9]);
        let tbs = mac.assemble_tti(vec![pdu_a, pdu_b]).unwrap();
        let decoded = mac.disassemble_tti(tbs).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].rb, RbId::new(5));
        assert_eq!(decoded[0].bytes, vec![1, 2, 3, 4]);
        assert_eq!(decoded[1].rb, RbId::new(6));
        assert_eq!(decoded[1].bytes, vec![9, 9, 9, 9]);
    }
}
