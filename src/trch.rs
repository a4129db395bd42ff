//! Transport channel / transport format configuration model (§3, §4.1).
//!
//! This module is the single source of truth the spec's §4.5 closing
//! sentence demands: the same [`TrChConfig`]/[`Tfcs`] values drive both our
//! RLC/MAC wiring and the over-the-air configuration IE built for the UE.

use std::fmt;

use crate::types::RbId;

/// Channel coding applied by PHY; `rate_matching` and `crc_size` below are
/// part of the same semi-static set (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingType {
    ConvolutionalHalf,
    ConvolutionalThird,
    Turbo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcSize {
    None = 0,
    Bits8 = 8,
    Bits12 = 12,
    Bits16 = 16,
    Bits24 = 24,
}

/// TTI granularity in milliseconds (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tti {
    Ms10 = 10,
    Ms20 = 20,
    Ms40 = 40,
    Ms80 = 80,
}

impl Tti {
    pub const fn millis(self) -> u32 {
        self as u32
    }
}

/// The semi-static parameters shared by every TF in one TrCh's TFS (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemiStatic {
    pub tti: Tti,
    pub coding: CodingType,
    pub rate_matching: u16,
    pub crc_size: CrcSize,
}

/// One allowed Transport Format: a block size and a block count per TTI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFormat {
    pub block_size_bits: u32,
    pub block_count: u32,
}

impl TransportFormat {
    pub const fn block_size_bytes(self) -> u32 {
        self.block_size_bits.div_ceil(8)
    }

    pub const fn total_bits(self) -> u32 {
        self.block_size_bits * self.block_count
    }
}

/// The set of allowed TFs for one TrCh, sharing one semi-static set (§3).
#[derive(Debug, Clone)]
pub struct TransportFormatSet {
    pub semi_static: SemiStatic,
    pub formats: Vec<TransportFormat>,
}

impl TransportFormatSet {
    pub fn tf_count(&self) -> usize {
        self.formats.len()
    }

    pub fn tf(&self, index: usize) -> Option<TransportFormat> {
        self.formats.get(index).copied()
    }

    /// Largest single block size among this TrCh's TFs, in bytes — the
    /// pull-through-RLC quantum MAC primes on each TTI (§4.3 step 1).
    pub fn max_block_size_bytes(&self) -> u32 {
        self.formats
            .iter()
            .map(|tf| tf.block_size_bytes())
            .max()
            .unwrap_or(0)
    }
}

/// Direction + underlying channel kind for one TrCh (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrChKind {
    UplinkRach,
    UplinkDch,
    DownlinkFach,
    DownlinkDch,
}

/// A numeric TrCh identifier, unique within one UE's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrChId(pub u8);

/// One transport channel: its TFS plus whether MAC multiplexes several
/// logical channels onto it (§3).
#[derive(Debug, Clone)]
pub struct TrChConfig {
    pub id: TrChId,
    pub kind: TrChKind,
    pub tfs: TransportFormatSet,
    /// `None` when `multiplexed` is true; the single bound RB otherwise.
    pub bound_rb: Option<RbId>,
}

impl TrChConfig {
    pub fn is_multiplexed(&self) -> bool {
        self.bound_rb.is_none()
    }
}

/// One entry of a Transport Format Combination Set: one TF index per TrCh
/// in the cell's simultaneous TrCh set, in the same order as
/// [`Tfcs::trch_ids`] (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tfc {
    pub tf_indices: Vec<usize>,
}

/// A Transport Format Combination Set (§3). `tf_counts[i]` is `L_i`, the TF
/// count of the i-th TrCh, used by the CTFC weighting `P_i = Π_{j<i} L_j`.
#[derive(Debug, Clone)]
pub struct Tfcs {
    pub trch_ids: Vec<TrChId>,
    pub tf_counts: Vec<usize>,
    pub combinations: Vec<Tfc>,
}

impl Tfcs {
    /// `P_i` weights for each TrCh position.
    fn weights(&self) -> Vec<u64> {
        let mut weights = Vec::with_capacity(self.tf_counts.len());
        let mut acc: u64 = 1;
        for &l in &self.tf_counts {
            weights.push(acc);
            acc *= l as u64;
        }
        weights
    }

    /// Compact CTFC integer for a TFC: `Σ tfIndex_i · P_i` (§3).
    pub fn ctfc(&self, tfc: &Tfc) -> u64 {
        let weights = self.weights();
        tfc.tf_indices
            .iter()
            .zip(weights.iter())
            .map(|(&idx, &w)| idx as u64 * w)
            .sum()
    }

    /// Inverse of [`ctfc`](Self::ctfc): decodes a CTFC back into per-TrCh TF
    /// indices (§8 "CTFC round-trip").
    pub fn decode_ctfc(&self, mut ctfc: u64) -> Vec<usize> {
        let mut indices = vec![0usize; self.tf_counts.len()];
        for i in 0..self.tf_counts.len() {
            let l = self.tf_counts[i] as u64;
            if l == 0 {
                continue;
            }
            indices[i] = (ctfc % l) as usize;
            ctfc /= l;
        }
        indices
    }

    pub fn index_of(&self, trch: TrChId) -> Option<usize> {
        self.trch_ids.iter().position(|&id| id == trch)
    }

    /// Projects a joint TFCS (covering several TrChs at once, as the
    /// reference master-channel configs define it) down to the single-TrCh
    /// set one direction's `MacEngine` needs (§4.3's per-direction TFC
    /// selection treats each MAC instance's own TrChs independently).
    pub fn projected_onto(&self, trch: TrChId) -> Self {
        self.projected_onto_many(&[trch])
    }

    /// As [`projected_onto`](Self::projected_onto), but keeps several
    /// TrChs' dimensions jointly (used when one direction multiplexes more
    /// than one TrCh, e.g. the circuit-switched master config's per-AMR
    /// sub-flow TrChs alongside its multiplexed SRB TrCh).
    pub fn projected_onto_many(&self, trchs: &[TrChId]) -> Self {
        let positions: Vec<usize> = trchs
            .iter()
            .map(|&t| self.index_of(t).expect("trch must be a member of this TFCS"))
            .collect();
        let mut seen = std::collections::BTreeSet::new();
        let mut combinations: Vec<Tfc> = self
            .combinations
            .iter()
            .filter_map(|combo| {
                let projected: Vec<usize> = positions.iter().map(|&p| combo.tf_indices[p]).collect();
                seen.insert(projected.clone()).then_some(Tfc { tf_indices: projected })
            })
            .collect();
        combinations.sort_by(|a, b| a.tf_indices.cmp(&b.tf_indices));
        Self {
            trch_ids: trchs.to_vec(),
            tf_counts: positions.iter().map(|&p| self.tf_counts[p]).collect(),
            combinations,
        }
    }
}

impl fmt::Display for TrChId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrCh{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tfcs() -> Tfcs {
        // Three TrChs with TF counts 2, 3, 4 respectively.
        let tf_counts = vec![2, 3, 4];
        let mut combinations = Vec::new();
        for a in 0..2 {
            for b in 0..3 {
                for c in 0..4 {
                    combinations.push(Tfc {
                        tf_indices: vec![a, b, c],
                    });
                }
            }
        }
        Tfcs {
            trch_ids: vec![TrChId(0), TrChId(1), TrChId(2)],
            tf_counts,
            combinations,
        }
    }

    #[test]
    fn ctfc_round_trips_for_every_combination() {
        let tfcs = sample_tfcs();
        for tfc in &tfcs.combinations {
            let ctfc = tfcs.ctfc(tfc);
            let decoded = tfcs.decode_ctfc(ctfc);
            assert_eq!(decoded, tfc.tf_indices, "ctfc={ctfc}");
        }
    }

    #[test]
    fn ctfc_is_injective_over_the_set() {
        let tfcs = sample_tfcs();
        let mut seen = std::collections::HashSet::new();
        for tfc in &tfcs.combinations {
            assert!(seen.insert(tfcs.ctfc(tfc)));
        }
    }

    #[test]
    fn projected_onto_keeps_only_that_trchs_dimension() {
        let tfcs = sample_tfcs();
        let projected = tfcs.projected_onto(TrChId(1));
        assert_eq!(projected.trch_ids, vec![TrChId(1)]);
        assert_eq!(projected.tf_counts, vec![3]);
        assert_eq!(projected.combinations.len(), 3);
        for (i, combo) in projected.combinations.iter().enumerate() {
            assert_eq!(combo.tf_indices, vec![i]);
        }
    }
}
