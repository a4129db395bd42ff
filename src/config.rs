//! Read-only configuration model (§4.5, §6).
//!
//! Everything here is loaded once at startup into an [`RncConfig`] and
//! handed around as `Arc<RncConfig>` — the explicit context object the
//! REDESIGN FLAGS section asks for in place of a global singleton. The
//! config database itself (§1(e)) is an external collaborator; this module
//! only owns the shape of what it supplies and a `reference()` default set
//! used when nothing external is wired in (and by every test).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::sn::SnSpace;
use crate::trch::{
    CodingType, CrcSize, SemiStatic, Tfc, Tfcs, TrChConfig, TrChId, TrChKind, TransportFormat,
    TransportFormatSet, Tti,
};
use crate::types::{RbId, RlcMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("transmission window {window} exceeds SNS/2 - 1 ({max}) for sequence space of size {sns}")]
    WindowTooLarge { window: u32, max: u32, sns: u32 },

    #[error("no DCH channel-tree node of at least {required_bps} bps bandwidth is available")]
    InsufficientResources { required_bps: u32 },

    #[error("transport format combination set is empty")]
    EmptyTfcs,
}

/// Timer periods named in §5/§6, all checked against [`crate::time::Deadline`].
#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub inactivity_release: Duration,
    pub inactivity_delete: Duration,
    pub poll: Duration,
    pub poll_prohibit: Option<Duration>,
    pub poll_periodic: Option<Duration>,
    pub status_prohibit: Option<Duration>,
    pub status_periodic: Option<Duration>,
    pub rst: Duration,
    pub t300: Duration,
    pub t308: Duration,
    pub t314: Duration,
    pub t315: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            inactivity_release: Duration::from_secs(30),
            inactivity_delete: Duration::from_secs(300),
            poll: Duration::from_millis(500),
            poll_prohibit: Some(Duration::from_millis(100)),
            poll_periodic: None,
            status_prohibit: Some(Duration::from_millis(100)),
            status_periodic: None,
            rst: Duration::from_millis(300),
            t300: Duration::from_millis(1000),
            t308: Duration::from_millis(1000),
            t314: Duration::from_secs(12),
            t315: Duration::from_secs(30),
        }
    }
}

/// AM poll-triggering configuration (§4.2 "Polling is triggered by...").
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub pdu_count: Option<u32>,
    pub sdu_count: Option<u32>,
    pub last_transmission_pdu: bool,
    pub last_retransmission_pdu: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pdu_count: None,
            sdu_count: None,
            last_transmission_pdu: true,
            last_retransmission_pdu: true,
        }
    }
}

/// AM entity configuration: window size, retransmission ceiling, LI width,
/// and reset retry ceiling (§4.2).
#[derive(Debug, Clone)]
pub struct AmConfig {
    pub transmission_window: u32,
    pub max_dat: u32,
    pub max_rst: u32,
    pub li_15_bit: bool,
    pub pdu_size_bytes: usize,
    pub poll: PollConfig,
    pub buffer_limit_bytes: usize,
}

impl AmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sns = SnSpace::AM.modulus();
        let max = sns / 2 - 1;
        if self.transmission_window > max {
            return Err(ConfigError::WindowTooLarge {
                window: self.transmission_window,
                max,
                sns,
            });
        }
        Ok(())
    }
}

impl Default for AmConfig {
    fn default() -> Self {
        Self {
            transmission_window: 2047,
            max_dat: 15,
            max_rst: 3,
            li_15_bit: true,
            pdu_size_bytes: 40,
            poll: PollConfig::default(),
            buffer_limit_bytes: 64 * 1024,
        }
    }
}

/// UM entity configuration: LI width and, per the Open Question in §9,
/// whether the advisory downlink start-of-SDU LI (`0x7ffc`) is honoured.
#[derive(Debug, Clone, Copy)]
pub struct UmConfig {
    pub li_15_bit_downlink: bool,
    pub allow_downlink_start_of_sdu_li: bool,
    pub pdu_size_bytes: usize,
    pub buffer_limit_bytes: usize,
}

impl Default for UmConfig {
    fn default() -> Self {
        Self {
            li_15_bit_downlink: false,
            allow_downlink_start_of_sdu_li: false,
            pdu_size_bytes: 40,
            buffer_limit_bytes: 16 * 1024,
        }
    }
}

/// RLC configuration for one direction of one RB.
#[derive(Debug, Clone)]
pub enum RlcEntityConfig {
    Transparent,
    Unacknowledged(UmConfig),
    Acknowledged(AmConfig),
}

impl RlcEntityConfig {
    pub fn mode(&self) -> RlcMode {
        match self {
            RlcEntityConfig::Transparent => RlcMode::Transparent,
            RlcEntityConfig::Unacknowledged(_) => RlcMode::Unacknowledged,
            RlcEntityConfig::Acknowledged(_) => RlcMode::Acknowledged,
        }
    }
}

/// One RB's binding within a master channel config: which TrCh carries it
/// in each direction and which RLC mode each direction uses (§3, §4.5).
#[derive(Debug, Clone)]
pub struct RbBinding {
    pub rb: RbId,
    pub uplink_trch: TrChId,
    pub downlink_trch: TrChId,
    pub uplink: RlcEntityConfig,
    pub downlink: RlcEntityConfig,
}

/// A named TrCh setup plus the RBs bound to it (§4.5).
#[derive(Debug, Clone)]
pub struct MasterChannelConfig {
    pub name: &'static str,
    pub trchs: Vec<TrChConfig>,
    pub tfcs: Tfcs,
    pub rbs: Vec<RbBinding>,
}

impl MasterChannelConfig {
    pub fn rb(&self, id: RbId) -> Option<&RbBinding> {
        self.rbs.iter().find(|b| b.rb == id)
    }

    pub fn trch(&self, id: TrChId) -> Option<&TrChConfig> {
        self.trchs.iter().find(|t| t.id == id)
    }
}

/// A binary channel tree node for DCH bandwidth allocation
/// (`original_source/UMTS/URRCTrCh.h`): a node at spreading factor `sf`
/// splits into two children at `sf * 2`, each with half its bandwidth.
/// `allocateRabForPdp` (§4.4) halves the QoS requirement until a free node
/// fits, per the original's channel-tree walk (SPEC_FULL §F).
#[derive(Debug, Clone)]
pub struct ChannelTreeNode {
    pub spreading_factor: u16,
    pub bandwidth_bps: u32,
    pub in_use: bool,
    pub children: Option<Box<(ChannelTreeNode, ChannelTreeNode)>>,
}

impl ChannelTreeNode {
    pub fn new(spreading_factor: u16, bandwidth_bps: u32) -> Self {
        Self {
            spreading_factor,
            bandwidth_bps,
            in_use: false,
            children: None,
        }
    }

    fn split(&mut self) {
        if self.children.is_none() {
            let child = ChannelTreeNode::new(self.spreading_factor * 2, self.bandwidth_bps / 2);
            self.children = Some(Box::new((child.clone(), child)));
        }
    }

    /// Finds and reserves the smallest free node with bandwidth at least
    /// `required_bps`, splitting larger nodes as needed (§4.4).
    pub fn allocate(&mut self, required_bps: u32) -> Option<u32> {
        if self.in_use {
            return None;
        }
        if self.bandwidth_bps < required_bps {
            return None;
        }
        self.split();
        if let Some(children) = self.children.as_mut() {
            if let Some(bw) = children.0.allocate(required_bps) {
                return Some(bw);
            }
            if let Some(bw) = children.1.allocate(required_bps) {
                return Some(bw);
            }
        }
        self.in_use = true;
        Some(self.bandwidth_bps)
    }

    /// Releases the node at `bandwidth_bps`, making it available again.
    pub fn release(&mut self, bandwidth_bps: u32) -> bool {
        if self.in_use && self.bandwidth_bps == bandwidth_bps {
            self.in_use = false;
            return true;
        }
        if let Some(children) = self.children.as_mut() {
            return children.0.release(bandwidth_bps) || children.1.release(bandwidth_bps);
        }
        false
    }
}

/// The DCH bandwidth tree (§4.4, SPEC_FULL §F).
#[derive(Debug, Clone)]
pub struct ChannelTree {
    root: ChannelTreeNode,
}

impl ChannelTree {
    pub fn new(root_bandwidth_bps: u32) -> Self {
        Self {
            root: ChannelTreeNode::new(1, root_bandwidth_bps),
        }
    }

    /// Halves `required_bps` until a node fits or the floor (1 bps) is
    /// reached, per §4.4's `allocateRabForPdp` description.
    pub fn allocate_for_qos(&mut self, required_bps: u32) -> Result<u32, ConfigError> {
        let mut want = required_bps.max(1);
        loop {
            if let Some(bw) = self.root.allocate(want) {
                return Ok(bw);
            }
            if want <= 1 {
                return Err(ConfigError::InsufficientResources { required_bps });
            }
            want /= 2;
        }
    }

    pub fn release(&mut self, bandwidth_bps: u32) {
        self.root.release(bandwidth_bps);
    }
}

/// Full runtime configuration, the single source of truth for RLC/MAC
/// wiring and RRC IE construction alike (§4.5).
#[derive(Debug, Clone)]
pub struct RncConfig {
    pub timers: TimerConfig,
    pub rlc_transmission_buffer_size: usize,
    pub best_effort_bytes_per_sec: u32,
    pub use_turbo_codes: bool,
    pub prach_sf: u16,
    pub sccpch_sf: u16,
    pub idle_ccch: MasterChannelConfig,
    pub cell_fach: MasterChannelConfig,
    pub cell_dch_packet: MasterChannelConfig,
    #[cfg(feature = "circuit-switched")]
    pub cell_dch_circuit: MasterChannelConfig,
    pub dch_tree_bandwidth_bps: u32,
}

impl RncConfig {
    /// The shipped defaults: (a) idle CCCH/SRB0, (b) CELL_FACH SRB1-3 on a
    /// shared TrCh, (c) CELL_DCH packet-switched, and — behind the
    /// `circuit-switched` feature — (d) CELL_DCH circuit-switched (§4.5).
    pub fn reference() -> Arc<Self> {
        let idle_ccch = build_idle_ccch();
        let cell_fach = build_cell_fach();
        let cell_dch_packet = build_cell_dch_packet(cfg!(feature = "turbo"));

        Arc::new(Self {
            timers: TimerConfig::default(),
            rlc_transmission_buffer_size: 64 * 1024,
            best_effort_bytes_per_sec: 16_000,
            use_turbo_codes: cfg!(feature = "turbo"),
            prach_sf: 256,
            sccpch_sf: 128,
            idle_ccch,
            cell_fach,
            cell_dch_packet,
            #[cfg(feature = "circuit-switched")]
            cell_dch_circuit: build_cell_dch_circuit(),
            dch_tree_bandwidth_bps: 2_048_000,
        })
    }
}

fn ps_semi_static(turbo: bool) -> SemiStatic {
    SemiStatic {
        tti: Tti::Ms20,
        coding: if turbo {
            CodingType::Turbo
        } else {
            CodingType::ConvolutionalThird
        },
        rate_matching: 128,
        crc_size: CrcSize::Bits16,
    }
}

fn single_tf_tfs(semi_static: SemiStatic, sizes_bits: &[u32]) -> TransportFormatSet {
    TransportFormatSet {
        semi_static,
        formats: sizes_bits
            .iter()
            .map(|&bits| TransportFormat {
                block_size_bits: bits,
                block_count: 1,
            })
            .collect(),
    }
}

fn build_idle_ccch() -> MasterChannelConfig {
    let semi_static = SemiStatic {
        tti: Tti::Ms20,
        coding: CodingType::ConvolutionalHalf,
        rate_matching: 256,
        crc_size: CrcSize::Bits16,
    };
    let rach = TrChConfig {
        id: TrChId(0),
        kind: TrChKind::UplinkRach,
        tfs: single_tf_tfs(semi_static, &[0, 168]),
        bound_rb: Some(RbId::SRB0),
    };
    let fach = TrChConfig {
        id: TrChId(1),
        kind: TrChKind::DownlinkFach,
        tfs: single_tf_tfs(semi_static, &[0, 168]),
        bound_rb: Some(RbId::SRB0),
    };
    let tfcs = Tfcs {
        trch_ids: vec![rach.id, fach.id],
        tf_counts: vec![2, 2],
        combinations: (0..2)
            .flat_map(|a| (0..2).map(move |b| Tfc { tf_indices: vec![a, b] }))
            .collect(),
    };
    MasterChannelConfig {
        name: "idle-ccch",
        rbs: vec![RbBinding {
            rb: RbId::SRB0,
            uplink_trch: rach.id,
            downlink_trch: fach.id,
            uplink: RlcEntityConfig::Transparent,
            downlink: RlcEntityConfig::Unacknowledged(UmConfig::default()),
        }],
        trchs: vec![rach, fach],
        tfcs,
    }
}

fn build_cell_fach() -> MasterChannelConfig {
    let semi_static = SemiStatic {
        tti: Tti::Ms20,
        coding: CodingType::ConvolutionalThird,
        rate_matching: 192,
        crc_size: CrcSize::Bits16,
    };
    let rach = TrChConfig {
        id: TrChId(0),
        kind: TrChKind::UplinkRach,
        tfs: single_tf_tfs(semi_static, &[0, 168, 360]),
        bound_rb: None,
    };
    let fach = TrChConfig {
        id: TrChId(1),
        kind: TrChKind::DownlinkFach,
        tfs: single_tf_tfs(semi_static, &[0, 168, 360]),
        bound_rb: None,
    };
    let tfcs = Tfcs {
        trch_ids: vec![rach.id, fach.id],
        tf_counts: vec![3, 3],
        combinations: (0..3)
            .flat_map(|a| (0..3).map(move |b| Tfc { tf_indices: vec![a, b] }))
            .collect(),
    };
    let srb_um = || RlcEntityConfig::Unacknowledged(UmConfig::default());
    let srb_am = || RlcEntityConfig::Acknowledged(AmConfig::default());
    MasterChannelConfig {
        name: "cell-fach",
        rbs: vec![
            RbBinding {
                rb: RbId::SRB1,
                uplink_trch: rach.id,
                downlink_trch: fach.id,
                uplink: srb_um(),
                downlink: srb_um(),
            },
            RbBinding {
                rb: RbId::SRB2,
                uplink_trch: rach.id,
                downlink_trch: fach.id,
                uplink: srb_am(),
                downlink: srb_am(),
            },
            RbBinding {
                rb: RbId::SRB3,
                uplink_trch: rach.id,
                downlink_trch: fach.id,
                uplink: srb_am(),
                downlink: srb_am(),
            },
        ],
        trchs: vec![rach, fach],
        tfcs,
    }
}

fn build_cell_dch_packet(turbo: bool) -> MasterChannelConfig {
    let semi_static = ps_semi_static(turbo);
    let dch_ul = TrChConfig {
        id: TrChId(0),
        kind: TrChKind::UplinkDch,
        tfs: single_tf_tfs(semi_static, &[0, 336, 1384]),
        bound_rb: None,
    };
    let dch_dl = TrChConfig {
        id: TrChId(1),
        kind: TrChKind::DownlinkDch,
        tfs: single_tf_tfs(semi_static, &[0, 336, 1384]),
        bound_rb: None,
    };
    let tfcs = Tfcs {
        trch_ids: vec![dch_ul.id, dch_dl.id],
        tf_counts: vec![3, 3],
        combinations: (0..3)
            .flat_map(|a| (0..3).map(move |b| Tfc { tf_indices: vec![a, b] }))
            .collect(),
    };
    let am = || RlcEntityConfig::Acknowledged(AmConfig::default());
    MasterChannelConfig {
        name: "cell-dch-packet",
        rbs: vec![
            RbBinding {
                rb: RbId::SRB1,
                uplink_trch: dch_ul.id,
                downlink_trch: dch_dl.id,
                uplink: RlcEntityConfig::Unacknowledged(UmConfig::default()),
                downlink: RlcEntityConfig::Unacknowledged(UmConfig::default()),
            },
            RbBinding {
                rb: RbId::SRB2,
                uplink_trch: dch_ul.id,
                downlink_trch: dch_dl.id,
                uplink: am(),
                downlink: am(),
            },
            RbBinding {
                rb: RbId::SRB3,
                uplink_trch: dch_ul.id,
                downlink_trch: dch_dl.id,
                uplink: am(),
                downlink: am(),
            },
            RbBinding {
                rb: RbId::new(5),
                uplink_trch: dch_ul.id,
                downlink_trch: dch_dl.id,
                uplink: am(),
                downlink: am(),
            },
        ],
        trchs: vec![dch_ul, dch_dl],
        tfcs,
    }
}

#[cfg(feature = "circuit-switched")]
fn build_cell_dch_circuit() -> MasterChannelConfig {
    let amr_semi_static = SemiStatic {
        tti: Tti::Ms20,
        coding: CodingType::ConvolutionalThird,
        rate_matching: 220,
        crc_size: CrcSize::Bits12,
    };
    let srb_semi_static = ps_semi_static(false);

    let mut trchs = Vec::new();
    let mut rbs = Vec::new();
    // Three TM-RLC AMR sub-flows, each on its own dedicated TrCh (§4.5(d)).
    for (i, size_bits) in [244u32, 39, 81].into_iter().enumerate() {
        let id = TrChId(i as u8);
        trchs.push(TrChConfig {
            id,
            kind: TrChKind::DownlinkDch,
            tfs: single_tf_tfs(amr_semi_static, &[0, size_bits]),
            bound_rb: Some(RbId::new(5 + i as u8)),
        });
        rbs.push(RbBinding {
            rb: RbId::new(5 + i as u8),
            uplink_trch: id,
            downlink_trch: id,
            uplink: RlcEntityConfig::Transparent,
            downlink: RlcEntityConfig::Transparent,
        });
    }
    let srb_trch_id = TrChId(3);
    trchs.push(TrChConfig {
        id: srb_trch_id,
        kind: TrChKind::DownlinkDch,
        tfs: single_tf_tfs(srb_semi_static, &[0, 336, 1384]),
        bound_rb: None,
    });
    let am = || RlcEntityConfig::Acknowledged(AmConfig::default());
    for rb in [RbId::SRB1, RbId::SRB2, RbId::SRB3] {
        rbs.push(RbBinding {
            rb,
            uplink_trch: srb_trch_id,
            downlink_trch: srb_trch_id,
            uplink: am(),
            downlink: am(),
        });
    }

    let tf_counts: Vec<usize> = trchs.iter().map(|t| t.tfs.tf_count()).collect();
    let combinations = cartesian_product(&tf_counts)
        .into_iter()
        .map(|tf_indices| Tfc { tf_indices })
        .collect();
    let trch_ids = trchs.iter().map(|t| t.id).collect();

    MasterChannelConfig {
        name: "cell-dch-circuit",
        rbs,
        trchs,
        tfcs: Tfcs {
            trch_ids,
            tf_counts,
            combinations,
        },
    }
}

#[cfg(feature = "circuit-switched")]
fn cartesian_product(tf_counts: &[usize]) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::new()];
    for &count in tf_counts {
        let mut next = Vec::with_capacity(out.len() * count.max(1));
        for prefix in &out {
            for idx in 0..count.max(1) {
                let mut entry = prefix.clone();
                entry.push(idx);
                next.push(entry);
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_am_config_passes_window_validation() {
        AmConfig::default().validate().unwrap();
    }

    #[test]
    fn oversized_window_is_rejected() {
        let mut am = AmConfig::default();
        am.transmission_window = SnSpace::AM.modulus();
        assert!(matches!(
            am.validate(),
            Err(ConfigError::WindowTooLarge { .. })
        ));
    }

    #[test]
    fn channel_tree_allocates_smallest_fitting_node() {
        let mut tree = ChannelTree::new(2_048_000);
        let bw = tree.allocate_for_qos(128_000).unwrap();
        assert!(bw >= 128_000);
        let bw2 = tree.allocate_for_qos(128_000).unwrap();
        assert!(bw2 >= 128_000);
    }

    #[test]
    fn channel_tree_halves_until_it_fits_or_fails() {
        let mut tree = ChannelTree::new(64);
        assert!(tree.allocate_for_qos(1000).is_ok());
    }

    #[test]
    fn channel_tree_release_allows_reallocation() {
        let mut tree = ChannelTree::new(1024);
        let bw = tree.allocate_for_qos(1024).unwrap();
        tree.release(bw);
        assert!(tree.allocate_for_qos(1024).is_ok());
    }

    #[test]
    fn reference_config_has_distinct_master_configs() {
        let cfg = RncConfig::reference();
        assert_eq!(cfg.idle_ccch.rbs.len(), 1);
        assert!(cfg.cell_fach.rb(RbId::SRB1).is_some());
        assert!(cfg.cell_dch_packet.rb(RbId::new(5)).is_some());
    }
}
