//! Wire-level MAC header encode/decode, exactly as tabled in §4.3.

use crate::types::{CRnti, RbId, URnti};

const TCTF_CCCH_DOWNLINK: u8 = 0x40;
const TCTF2_CCCH_UPLINK: u8 = 0b00;
const TCTF2_DCCH_DTCH_UPLINK: u8 = 0b01;
const TCTF2_DCCH_DTCH_DOWNLINK: u8 = 0b10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeIdRef {
    Urnti(URnti),
    Crnti(CRnti),
}

/// A decoded RACH (uplink) MAC-C header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkCommonHeader {
    Ccch,
    DcchDtch { ue_id: UeIdRef, rb: RbId },
}

pub fn encode_uplink_ccch() -> Vec<u8> {
    vec![TCTF2_CCCH_UPLINK << 6]
}

pub fn encode_uplink_dcch_dtch(ue_id: UeIdRef, rb: RbId) -> Vec<u8> {
    let (ue_id_type, id_bytes): (u8, Vec<u8>) = match ue_id {
        UeIdRef::Urnti(u) => (0, u.raw().to_be_bytes().to_vec()),
        UeIdRef::Crnti(c) => (1, c.raw().to_be_bytes().to_vec()),
    };
    let ct = rb.get().saturating_sub(1) & 0x0f;
    let mut out = vec![(TCTF2_DCCH_DTCH_UPLINK << 6) | (ue_id_type << 4) | ct];
    out.extend(id_bytes);
    out
}

pub fn decode_uplink_common(bytes: &[u8]) -> Option<(UplinkCommonHeader, usize)> {
    let byte0 = *bytes.first()?;
    let tctf2 = byte0 >> 6;
    match tctf2 {
        TCTF2_CCCH_UPLINK => Some((UplinkCommonHeader::Ccch, 1)),
        TCTF2_DCCH_DTCH_UPLINK => {
            let ue_id_type = (byte0 >> 4) & 0b11;
            let ct = byte0 & 0x0f;
            let rb = RbId::new(ct + 1);
            let (ue_id, consumed) = if ue_id_type == 0 {
                let raw = u32::from_be_bytes(bytes.get(1..5)?.try_into().ok()?);
                (UeIdRef::Urnti(URnti::from_raw(raw)), 5)
            } else {
                let raw = u16::from_be_bytes(bytes.get(1..3)?.try_into().ok()?);
                (UeIdRef::Crnti(CRnti::from_raw(raw)), 3)
            };
            Some((UplinkCommonHeader::DcchDtch { ue_id, rb }, consumed))
        }
        _ => None,
    }
}

/// A decoded FACH (downlink) MAC-C header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownlinkCommonHeader {
    Ccch,
    DcchDtch { crnti: CRnti, rb: RbId },
}

pub fn encode_downlink_ccch() -> Vec<u8> {
    vec![TCTF_CCCH_DOWNLINK]
}

pub fn encode_downlink_dcch_dtch(crnti: CRnti, rb: RbId) -> Vec<u8> {
    let ct = rb.get().saturating_sub(1) & 0x0f;
    let mut out = vec![(TCTF2_DCCH_DTCH_DOWNLINK << 6) | ct];
    out.extend(crnti.raw().to_be_bytes());
    out
}

pub fn decode_downlink_common(bytes: &[u8]) -> Option<(DownlinkCommonHeader, usize)> {
    let byte0 = *bytes.first()?;
    if byte0 == TCTF_CCCH_DOWNLINK {
        return Some((DownlinkCommonHeader::Ccch, 1));
    }
    let tctf2 = byte0 >> 6;
    if tctf2 != TCTF2_DCCH_DTCH_DOWNLINK {
        return None;
    }
    let ct = byte0 & 0x0f;
    let rb = RbId::new(ct + 1);
    let raw = u16::from_be_bytes(bytes.get(1..3)?.try_into().ok()?);
    Some((
        DownlinkCommonHeader::DcchDtch {
            crnti: CRnti::from_raw(raw),
            rb,
        },
        3,
    ))
}

/// Dedicated (DCH) header: a 4-bit C/T when the TrCh is multiplexed across
/// several RBs, or no header at all for a single-RB TrCh (§4.3).
pub fn encode_dedicated_header(multiplexed: bool, rb: RbId) -> Vec<u8> {
    if !multiplexed {
        return Vec::new();
    }
    vec![(rb.get().saturating_sub(1) & 0x0f) << 4]
}

pub fn decode_dedicated_header(multiplexed: bool, bytes: &[u8]) -> Option<(RbId, usize)> {
    if !multiplexed {
        return None;
    }
    let byte0 = *bytes.first()?;
    let ct = (byte0 >> 4) & 0x0f;
    Some((RbId::new(ct + 1), 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uplink_ccch_round_trips() {
        let bytes = encode_uplink_ccch();
        let (header, consumed) = decode_uplink_common(&bytes).unwrap();
        assert_eq!(header, UplinkCommonHeader::Ccch);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn uplink_dcch_with_urnti_round_trips() {
        let urnti = URnti::new(1, 1);
        let bytes = encode_uplink_dcch_dtch(UeIdRef::Urnti(urnti), RbId::SRB2);
        let (header, consumed) = decode_uplink_common(&bytes).unwrap();
        assert_eq!(
            header,
            UplinkCommonHeader::DcchDtch {
                ue_id: UeIdRef::Urnti(urnti),
                rb: RbId::SRB2,
            }
        );
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn downlink_ccch_byte_is_the_reserved_tctf() {
        assert_eq!(encode_downlink_ccch(), vec![0x40]);
        let (header, _) = decode_downlink_common(&[0x40]).unwrap();
        assert_eq!(header, DownlinkCommonHeader::Ccch);
    }

    #[test]
    fn downlink_dcch_with_crnti_round_trips() {
        let crnti = CRnti::from_raw(0x0001);
        let bytes = encode_downlink_dcch_dtch(crnti, RbId::SRB1);
        let (header, consumed) = decode_downlink_common(&bytes).unwrap();
        assert_eq!(header, DownlinkCommonHeader::DcchDtch { crnti, rb: RbId::SRB1 });
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn dedicated_header_is_absent_when_not_multiplexed() {
        assert!(encode_dedicated_header(false, RbId::new(5)).is_empty());
        assert!(decode_dedicated_header(false, &[0xff]).is_none());
    }

    #[test]
    fn dedicated_header_round_trips_when_multiplexed() {
        let bytes = encode_dedicated_header(true, RbId::new(6));
        let (rb, consumed) = decode_dedicated_header(true, &bytes).unwrap();
        assert_eq!(rb, RbId::new(6));
        assert_eq!(consumed, 1);
    }
}
