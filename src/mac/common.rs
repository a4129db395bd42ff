//! MAC-C: the common RACH (uplink)/FACH (downlink) pair shared by every UE
//! still in CELL_FACH (§4.3).

use crate::tb::{TransportBlock, TransportBlockSet};
use crate::trch::{Tfcs, TransportFormatSet};
use crate::types::{CRnti, RbId};

use super::{header, tfc_select, LogicalChannelPdu, MacEngine, MacError};

pub struct CommonMac {
    rach: TransportFormatSet,
    rach_tfcs: Tfcs,
    fach: TransportFormatSet,
    fach_tfcs: Tfcs,
}

impl CommonMac {
    pub fn new(
        rach: TransportFormatSet,
        rach_tfcs: Tfcs,
        fach: TransportFormatSet,
        fach_tfcs: Tfcs,
    ) -> Self {
        Self {
            rach,
            rach_tfcs,
            fach,
            fach_tfcs,
        }
    }
}

fn encode_downlink(pdu: &LogicalChannelPdu) -> Vec<u8> {
    let mut out = if pdu.rb == RbId::SRB0 {
        header::encode_downlink_ccch()
    } else {
        let crnti = match pdu.ue_id {
            Some(header::UeIdRef::Crnti(c)) => c,
            Some(header::UeIdRef::Urnti(u)) => u.c_rnti(),
            None => CRnti::from_raw(0),
        };
        header::encode_downlink_dcch_dtch(crnti, pdu.rb)
    };
    out.extend_from_slice(&pdu.bytes);
    out
}

impl MacEngine for CommonMac {
    fn assemble_tti(
        &mut self,
        ready: Vec<LogicalChannelPdu>,
    ) -> Result<TransportBlockSet, MacError> {
        if ready.is_empty() {
            return Ok(TransportBlockSet::new(0));
        }
        let wires: Vec<Vec<u8>> = ready.iter().map(encode_downlink).collect();
        let block_size = wires[0].len() as u32;
        if wires.iter().any(|w| w.len() as u32 != block_size) {
            // One fixed PDU size per RLC config is assumed per TrCh; a
            // mismatch means two RBs with different PDU sizes were handed
            // to the same TTI, which the scheduler shouldn't do.
            return Err(MacError::NoMatchingTfc);
        }
        let available = wires.len() as u32 * block_size;
        let tfci = tfc_select::select_tfc(
            &self.fach_tfcs,
            std::slice::from_ref(&self.fach),
            &[available],
        )
        .ok_or(MacError::NoMatchingTfc)?;
        let tfc = &self.fach_tfcs.combinations[tfci];
        let tf = self
            .fach
            .tf(tfc.tf_indices[0])
            .ok_or(MacError::NoMatchingTfc)?;
        let mut tbs = TransportBlockSet::new(tfci as u16);
        for wire in wires.into_iter().take(tf.block_count as usize) {
            tbs.push_checked(TransportBlock::from_bits(wire), tf.block_size_bytes() as usize)?;
        }
        Ok(tbs)
    }

    fn disassemble_tti(
        &mut self,
        tbs: TransportBlockSet,
    ) -> Result<Vec<LogicalChannelPdu>, MacError> {
        let _ = (&self.rach, &self.rach_tfcs);
        let mut out = Vec::with_capacity(tbs.len());
        for block in tbs {
            let bytes = block.into_bytes();
            let (decoded, consumed) =
                header::decode_uplink_common(&bytes).ok_or(MacError::MalformedHeader)?;
            let payload = bytes[consumed..].to_vec();
            match decoded {
                header::UplinkCommonHeader::Ccch => {
                    out.push(LogicalChannelPdu::new(RbId::SRB0, payload));
                }
                header::UplinkCommonHeader::DcchDtch { ue_id, rb } => {
                    out.push(LogicalChannelPdu::addressed(rb, ue_id, payload));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::header::UeIdRef;
    use crate::trch::{CodingType, CrcSize, SemiStatic, Tfc, TransportFormat, TrChId, Tti};
    use crate::types::URnti;

    fn tfs(block_size_bits: u32, counts: &[u32]) -> TransportFormatSet {
        TransportFormatSet {
            semi_static: SemiStatic {
                tti: Tti::Ms10,
                coding: CodingType::ConvolutionalHalf,
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

    fn single_trch_tfcs(counts: &[usize]) -> Tfcs {
        Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![counts.len()],
            combinations: counts
                .iter()
                .enumerate()
                .map(|(i, _)| Tfc { tf_indices: vec![i] })
                .collect(),
        }
    }

    #[test]
    fn downlink_ccch_pdu_round_trips_through_a_tti() {
        // 1 CCCH header byte + 4 byte payload = 5 bytes = 40 bits per block.
        let fach = tfs(40, &[0, 1, 2]);
        let fach_tfcs = single_trch_tfcs(&[0, 1, 2]);
        let rach = tfs(40, &[0, 1]);
        let rach_tfcs = single_trch_tfcs(&[0, 1]);
        let mut mac = CommonMac::new(rach, rach_tfcs, fach, fach_tfcs);

        let pdu = LogicalChannelPdu::new(RbId::SRB0, vec![1, 2, 3, 4]);
        let tbs = mac.assemble_tti(vec![pdu]).unwrap();
        assert_eq!(tbs.len(), 1);
        let block = tbs.iter().next().unwrap();
        assert_eq!(block.as_bytes()[0], 0x40);
        assert_eq!(&block.as_bytes()[1..], &[1, 2, 3, 4]);
    }

    #[test]
    fn uplink_dcch_pdu_disassembles_with_its_urnti() {
        let fach = tfs(40, &[0, 1]);
        let fach_tfcs = single_trch_tfcs(&[0, 1]);
        let rach = tfs(56, &[0, 1]);
        let rach_tfcs = single_trch_tfcs(&[0, 1]);
        let mut mac = CommonMac::new(rach, rach_tfcs, fach, fach_tfcs);

        let urnti = URnti::new(1, 42);
        let encoded = header::encode_uplink_dcch_dtch(UeIdRef::Urnti(urnti), RbId::SRB1);
        let mut wire = encoded;
        wire.push(0xaa);
        let mut tbs = TransportBlockSet::new(1);
        let wire_len = wire.len();
        tbs.push_checked(TransportBlock::from_bits(wire), wire_len).unwrap();

        let pdus = mac.disassemble_tti(tbs).unwrap();
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].rb, RbId::SRB1);
        assert_eq!(pdus[0].bytes, vec![0xaa]);
        assert_eq!(pdus[0].ue_id, Some(UeIdRef::Urnti(urnti)));
    }

    #[test]
    fn empty_tti_with_nothing_ready_assembles_no_blocks() {
        let fach = tfs(40, &[0]);
        let fach_tfcs = single_trch_tfcs(&[0]);
        let rach = tfs(40, &[0]);
        let rach_tfcs = single_trch_tfcs(&[0]);
        let mut mac = CommonMac::new(rach, rach_tfcs, fach, fach_tfcs);
        let tbs = mac.assemble_tti(vec![]).unwrap();
        assert!(tbs.is_empty());
    }
}
