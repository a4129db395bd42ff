//! TFC selection (§4.3 steps 1–5): among the TFCS entries whose per-TrCh
//! block counts fit what's actually available this TTI, pick the one
//! carrying the most total bytes, ties broken toward the higher TFC index.

use crate::trch::{Tfcs, TransportFormatSet};

/// Chooses a TFC index from `tfcs` given, per TrCh (in `tfcs.trch_ids`
/// order), the `TransportFormatSet` governing it and the bytes actually
/// queued and ready to send. Returns `None` (§4.3 step 5: log and send
/// nothing) when no TFC's per-TrCh block counts all fit.
pub fn select_tfc(
    tfcs: &Tfcs,
    trchs: &[TransportFormatSet],
    available_bytes: &[u32],
) -> Option<usize> {
    debug_assert_eq!(trchs.len(), available_bytes.len());
    debug_assert_eq!(trchs.len(), tfcs.trch_ids.len());

    // Step 2: per TrCh, how many whole transport blocks are ready at each TF.
    let ready_blocks: Vec<Vec<u32>> = trchs
        .iter()
        .zip(available_bytes.iter())
        .map(|(trch, &bytes)| {
            trch.formats
                .iter()
                .map(|tf| {
                    if tf.block_size_bytes() == 0 {
                        0
                    } else {
                        bytes / tf.block_size_bytes()
                    }
                })
                .collect()
        })
        .collect();

    let mut best: Option<(usize, u64)> = None;
    for (idx, tfc) in tfcs.combinations.iter().enumerate() {
        let mut total_bits: u64 = 0;
        let mut fits = true;
        for (trch_pos, &tf_index) in tfc.tf_indices.iter().enumerate() {
            let tf = match trchs[trch_pos].tf(tf_index) {
                Some(tf) => tf,
                None => {
                    fits = false;
                    break;
                }
            };
            if tf.block_count > ready_blocks[trch_pos][tf_index] {
                fits = false;
                break;
            }
            total_bits += tf.total_bits() as u64;
        }
        if !fits {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, best_bits)) => total_bits >= best_bits,
        };
        if better {
            best = Some((idx, total_bits));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trch::{CodingType, CrcSize, SemiStatic, Tfc, TransportFormat, TrChId, Tti};

    fn tfs(formats: &[(u32, u32)]) -> TransportFormatSet {
        TransportFormatSet {
            semi_static: SemiStatic {
                tti: Tti::Ms10,
                coding: CodingType::ConvolutionalHalf,
                rate_matching: 100,
                crc_size: CrcSize::Bits16,
            },
            formats: formats
                .iter()
                .map(|&(size, count)| TransportFormat {
                    block_size_bits: size,
                    block_count: count,
                })
                .collect(),
        }
    }

    #[test]
    fn picks_the_tfc_with_the_most_total_bytes_among_those_that_fit() {
        // One TrCh, two TFs: 0 blocks or 1 block of 80 bits (10 bytes).
        let trch = tfs(&[(80, 0), (80, 1)]);
        let tfcs = Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![2],
            combinations: vec![
                Tfc { tf_indices: vec![0] },
                Tfc { tf_indices: vec![1] },
            ],
        };
        // 10 bytes ready: TF1 (1 block of 10 bytes) fits, TF0 always fits
        // (needs zero blocks). TF1 carries more, so it wins.
        let chosen = select_tfc(&tfcs, &[trch], &[10]).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn falls_back_to_empty_tfc_when_not_enough_bytes_are_ready() {
        let trch = tfs(&[(80, 0), (80, 1)]);
        let tfcs = Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![2],
            combinations: vec![
                Tfc { tf_indices: vec![0] },
                Tfc { tf_indices: vec![1] },
            ],
        };
        let chosen = select_tfc(&tfcs, &[trch], &[5]).unwrap();
        assert_eq!(chosen, 0);
    }

    #[test]
    fn ties_break_toward_the_higher_tfc_index() {
        let trch = tfs(&[(80, 1), (80, 1)]);
        let tfcs = Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![2],
            combinations: vec![
                Tfc { tf_indices: vec![0] },
                Tfc { tf_indices: vec![1] },
            ],
        };
        let chosen = select_tfc(&tfcs, &[trch], &[10]).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn returns_none_when_no_tfc_fits() {
        let trch = tfs(&[(80, 2)]);
        let tfcs = Tfcs {
            trch_ids: vec![TrChId(0)],
            tf_counts: vec![1],
            combinations: vec![Tfc { tf_indices: vec![0] }],
        };
        assert!(select_tfc(&tfcs, &[trch], &[5]).is_none());
    }
}
