//! AM status-PDU SUFI (super-field) encoding (§4.2).
//!
//! This core decodes every SUFI type an AM peer might send but only ever
//! *emits* `Ack` and `List`, the two needed to drive the retransmission
//! buffer and advance VT(A): a real RNC peer may emit `Window`, `Rlist`,
//! `Mrw`, or `Poll` too, but nothing downstream of this core's VT(A)/VR(R)
//! bookkeeping needs them.

use crate::rlc::RlcError;
use crate::sn::SnSpace;

/// One NACK'd range inside a `Sufi::List`/`Sufi::Rlist`: `sn` missing, or
/// `[sn, sn+length)` missing when `length` is `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackRange {
    pub sn: u32,
    pub length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sufi {
    /// Terminates a SUFI chain; no payload.
    NoMoreData,
    Win { window_size: u32 },
    Ack { n: u32 },
    List { ranges: Vec<NackRange> },
    Bitmap { sn: u32, bits: Vec<bool> },
    Rlist { ranges: Vec<NackRange> },
    Mrw { sns: Vec<u32> },
    MrwAck { n: u32 },
    Poll,
}

/// One STATUS PDU: an ordered SUFI chain (§4.2 "status PDUs may themselves
/// be fragmented across multiple PDUs").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPdu {
    pub sufis: Vec<Sufi>,
}

impl StatusPdu {
    pub fn new(sufis: Vec<Sufi>) -> Self {
        Self { sufis }
    }

    /// Builds the status for a set of missing ranges below VR(R): one
    /// `List` SUFI naming the gaps, then `Ack` naming the first in-sequence
    /// SN not yet received (§4.2).
    pub fn from_gaps(missing: &[NackRange], ack_sn: u32) -> Self {
        let mut sufis = Vec::new();
        if !missing.is_empty() {
            sufis.push(Sufi::List {
                ranges: missing.to_vec(),
            });
        }
        sufis.push(Sufi::Ack { n: ack_sn });
        Self { sufis }
    }

    pub fn ack_sn(&self) -> Option<u32> {
        self.sufis.iter().find_map(|s| match s {
            Sufi::Ack { n } => Some(*n),
            _ => None,
        })
    }

    /// Every SN named as missing by a `List` or `Rlist` SUFI.
    pub fn nacked_sns(&self, sns: SnSpace) -> Vec<u32> {
        let mut out = Vec::new();
        for sufi in &self.sufis {
            if let Sufi::List { ranges } | Sufi::Rlist { ranges } = sufi {
                for range in ranges {
                    let len = range.length.unwrap_or(1);
                    for k in 0..len {
                        out.push(sns.add(range.sn, k as i32));
                    }
                }
            }
        }
        out
    }

    pub fn has_poll(&self) -> bool {
        self.sufis.iter().any(|s| matches!(s, Sufi::Poll))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for sufi in &self.sufis {
            encode_sufi(&mut out, sufi);
        }
        out.push(0); // NoMoreData terminator
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RlcError> {
        let mut sufis = Vec::new();
        let mut offset = 0;
        loop {
            let tag = *bytes.get(offset).ok_or(RlcError::MalformedLi)?;
            offset += 1;
            if tag == 0 {
                break;
            }
            let (sufi, consumed) = decode_sufi(tag, &bytes[offset..])?;
            sufis.push(sufi);
            offset += consumed;
        }
        Ok(StatusPdu { sufis })
    }
}

fn encode_sufi(out: &mut Vec<u8>, sufi: &Sufi) {
    match sufi {
        Sufi::NoMoreData => out.push(0),
        Sufi::Win { window_size } => {
            out.push(1);
            out.extend_from_slice(&window_size.to_be_bytes());
        }
        Sufi::Ack { n } => {
            out.push(2);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Sufi::List { ranges } => encode_ranges(out, 3, ranges),
        Sufi::Bitmap { sn, bits } => {
            out.push(4);
            out.extend_from_slice(&sn.to_be_bytes());
            out.extend_from_slice(&(bits.len() as u32).to_be_bytes());
            for chunk in bits.chunks(8) {
                let mut byte = 0u8;
                for (i, &bit) in chunk.iter().enumerate() {
                    if bit {
                        byte |= 1 << i;
                    }
                }
                out.push(byte);
            }
        }
        Sufi::Rlist { ranges } => encode_ranges(out, 5, ranges),
        Sufi::Mrw { sns } => {
            out.push(6);
            out.push(sns.len() as u8);
            for sn in sns {
                out.extend_from_slice(&sn.to_be_bytes());
            }
        }
        Sufi::MrwAck { n } => {
            out.push(7);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Sufi::Poll => out.push(8),
    }
}

fn encode_ranges(out: &mut Vec<u8>, tag: u8, ranges: &[NackRange]) {
    out.push(tag);
    out.push(ranges.len() as u8);
    for range in ranges {
        out.extend_from_slice(&range.sn.to_be_bytes());
        match range.length {
            Some(len) => {
                out.push(1);
                out.extend_from_slice(&len.to_be_bytes());
            }
            None => out.push(0),
        }
    }
}

fn decode_ranges(bytes: &[u8]) -> Result<(Vec<NackRange>, usize), RlcError> {
    let count = *bytes.first().ok_or(RlcError::MalformedLi)? as usize;
    let mut offset = 1;
    let mut ranges = Vec::with_capacity(count);
    for _ in 0..count {
        let sn = read_u32(bytes, offset)?;
        offset += 4;
        let has_length = *bytes.get(offset).ok_or(RlcError::MalformedLi)?;
        offset += 1;
        let length = if has_length == 1 {
            let len = read_u32(bytes, offset)?;
            offset += 4;
            Some(len)
        } else {
            None
        };
        ranges.push(NackRange { sn, length });
    }
    Ok((ranges, offset))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, RlcError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes(b.try_into().unwrap()))
        .ok_or(RlcError::MalformedLi)
}

fn decode_sufi(tag: u8, rest: &[u8]) -> Result<(Sufi, usize), RlcError> {
    match tag {
        1 => Ok((
            Sufi::Win {
                window_size: read_u32(rest, 0)?,
            },
            4,
        )),
        2 => Ok((Sufi::Ack { n: read_u32(rest, 0)? }, 4)),
        3 => {
            let (ranges, consumed) = decode_ranges(rest)?;
            Ok((Sufi::List { ranges }, consumed))
        }
        4 => {
            let sn = read_u32(rest, 0)?;
            let bit_count = read_u32(rest, 4)? as usize;
            let byte_count = bit_count.div_ceil(8);
            let packed = rest.get(8..8 + byte_count).ok_or(RlcError::MalformedLi)?;
            let mut bits = Vec::with_capacity(bit_count);
            for i in 0..bit_count {
                bits.push(packed[i / 8] & (1 << (i % 8)) != 0);
            }
            Ok((Sufi::Bitmap { sn, bits }, 8 + byte_count))
        }
        5 => {
            let (ranges, consumed) = decode_ranges(rest)?;
            Ok((Sufi::Rlist { ranges }, consumed))
        }
        6 => {
            let count = *rest.first().ok_or(RlcError::MalformedLi)? as usize;
            let mut sns = Vec::with_capacity(count);
            let mut offset = 1;
            for _ in 0..count {
                sns.push(read_u32(rest, offset)?);
                offset += 4;
            }
            Ok((Sufi::Mrw { sns }, offset))
        }
        7 => Ok((
            Sufi::MrwAck { n: read_u32(rest, 0)? },
            4,
        )),
        8 => Ok((Sufi::Poll, 0)),
        _ => Err(RlcError::MalformedLi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_gaps_builds_list_then_ack() {
        let status = StatusPdu::from_gaps(
            &[NackRange {
                sn: 10,
                length: Some(3),
            }],
            20,
        );
        assert_eq!(status.ack_sn(), Some(20));
        assert_eq!(status.nacked_sns(SnSpace::AM), vec![10, 11, 12]);
    }

    #[test]
    fn from_gaps_with_no_missing_ranges_emits_only_ack() {
        let status = StatusPdu::from_gaps(&[], 5);
        assert_eq!(status.sufis, vec![Sufi::Ack { n: 5 }]);
    }

    #[test]
    fn status_pdu_round_trips_through_wire_bytes() {
        let status = StatusPdu::new(vec![
            Sufi::List {
                ranges: vec![
                    NackRange {
                        sn: 3,
                        length: None,
                    },
                    NackRange {
                        sn: 10,
                        length: Some(2),
                    },
                ],
            },
            Sufi::Ack { n: 42 },
            Sufi::Poll,
        ]);
        let bytes = status.encode();
        let decoded = StatusPdu::decode(&bytes).unwrap();
        assert_eq!(decoded, status);
    }

    #[test]
    fn bitmap_sufi_round_trips() {
        let status = StatusPdu::new(vec![Sufi::Bitmap {
            sn: 7,
            bits: vec![true, false, true, true, false, false, false, false, true],
        }]);
        let bytes = status.encode();
        assert_eq!(StatusPdu::decode(&bytes).unwrap(), status);
    }
}
