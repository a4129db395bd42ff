//! The per-UE RRC state machine (§4.4): connection setup/release, radio
//! bearer setup/release, cell update, direct transfer dispatch, security
//! mode, and the inactivity reaper.

pub mod messages;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use log::{info, warn};
use thiserror::Error;

use crate::asn::{AsnDecode, AsnEncode, AsnError};
use crate::config::{ChannelTree, ConfigError, MasterChannelConfig, RlcEntityConfig, RncConfig};
use crate::integrity::{Direction as IntegrityDirection, IntegrityContext};
use crate::mac::dedicated::DedicatedMac;
use crate::rlc::{DiscardMode, RlcError, Sdu};
use crate::sgsn::{QosBytesPerSec, Sgsn};
use crate::stats::RncStats;
use crate::trch::TrChKind;
use crate::types::{AsnUeId, RabStatus, RbId, RbMask, TransactionId, UeState, URnti};
use crate::ue::{attach_fach_srbs, RbRlc, TransactionKind, UeInfo};

pub use messages::{
    CellUpdateCause, DownlinkMessage, EstablishmentCause, ProtocolDiscriminator, UplinkMessage,
};

#[derive(Debug, Error)]
pub enum RrcError {
    #[error("no UE known for U-RNTI {0:?}")]
    UnknownUe(URnti),

    #[error("transaction {0:?} is not open for this UE")]
    UnknownTransaction(TransactionId),

    #[error("RB {0:?} is not a data bearer (must be RB5-RB15)")]
    NotADataBearer(RbId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rlc(#[from] RlcError),

    #[error(transparent)]
    Asn(#[from] AsnError),
}

/// What a handler did, for a caller driving delivery to PHY/SGSN. Every
/// downlink RRC message is queued on the named RB's RLC (or, for CCCH,
/// the shared common-channel RLC) — this is returned for tests and
/// logging, not meant to be re-encoded by the caller.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub rb: RbId,
    pub message: DownlinkMessage,
}

fn same_rlc_shape(a: &RlcEntityConfig, b: &RlcEntityConfig) -> bool {
    use RlcEntityConfig::*;
    match (a, b) {
        (Transparent, Transparent) => true,
        (Unacknowledged(x), Unacknowledged(y)) => x.pdu_size_bytes == y.pdu_size_bytes,
        (Acknowledged(x), Acknowledged(y)) => x.pdu_size_bytes == y.pdu_size_bytes,
        _ => false,
    }
}

pub(crate) fn build_dedicated_mac(cfg: &MasterChannelConfig) -> DedicatedMac {
    let uplink: Vec<_> = cfg
        .trchs
        .iter()
        .filter(|t| matches!(t.kind, TrChKind::UplinkDch))
        .cloned()
        .collect();
    let downlink: Vec<_> = cfg
        .trchs
        .iter()
        .filter(|t| matches!(t.kind, TrChKind::DownlinkDch))
        .cloned()
        .collect();
    let uplink_ids: Vec<_> = uplink.iter().map(|t| t.id).collect();
    let downlink_ids: Vec<_> = downlink.iter().map(|t| t.id).collect();
    let uplink_tfcs = cfg.tfcs.projected_onto_many(&uplink_ids);
    let downlink_tfcs = cfg.tfcs.projected_onto_many(&downlink_ids);
    DedicatedMac::new(uplink, uplink_tfcs, downlink, downlink_tfcs)
}

/// Builds the shared RACH/FACH [`CommonMac`](crate::mac::common::CommonMac)
/// for a master config whose TrCh set is the common-channel pair every
/// CELL_FACH UE multiplexes onto (§4.3, §4.5).
pub(crate) fn build_common_mac(cfg: &MasterChannelConfig) -> crate::mac::common::CommonMac {
    let rach = cfg
        .trchs
        .iter()
        .find(|t| matches!(t.kind, TrChKind::UplinkRach))
        .expect("common master config always carries a RACH TrCh");
    let fach = cfg
        .trchs
        .iter()
        .find(|t| matches!(t.kind, TrChKind::DownlinkFach))
        .expect("common master config always carries a FACH TrCh");
    let rach_tfcs = cfg.tfcs.projected_onto(rach.id);
    let fach_tfcs = cfg.tfcs.projected_onto(fach.id);
    crate::mac::common::CommonMac::new(rach.tfs.clone(), rach_tfcs, fach.tfs.clone(), fach_tfcs)
}

/// The long-lived RRC controller: one per cell (§5, §9 "global mutable
/// singletons ... model them as explicitly-passed context objects").
pub struct RrcController<S: Sgsn> {
    config: Arc<RncConfig>,
    stats: Arc<RncStats>,
    sgsn: S,
    ues: HashMap<URnti, UeInfo>,
    by_external_id: HashMap<AsnUeId, URnti>,
    by_crnti: HashMap<crate::types::CRnti, URnti>,
    dch_tree: ChannelTree,
    ccch: RbRlc,
    srnc_id: u16,
    next_srnti: u32,
}

impl<S: Sgsn> RrcController<S> {
    pub fn new(config: Arc<RncConfig>, stats: Arc<RncStats>, sgsn: S, srnc_id: u16) -> Self {
        let binding = config
            .idle_ccch
            .rb(RbId::SRB0)
            .expect("idle_ccch master config always binds RB0");
        let ccch = RbRlc::new(&binding.uplink, &binding.downlink);
        Self {
            dch_tree: ChannelTree::new(config.dch_tree_bandwidth_bps),
            config,
            stats,
            sgsn,
            ues: HashMap::new(),
            by_external_id: HashMap::new(),
            by_crnti: HashMap::new(),
            ccch,
            srnc_id,
            next_srnti: 1,
        }
    }

    pub fn ue(&self, urnti: URnti) -> Option<&UeInfo> {
        self.ues.get(&urnti)
    }

    pub fn ue_mut(&mut self, urnti: URnti) -> Option<&mut UeInfo> {
        self.ues.get_mut(&urnti)
    }

    /// Reverses the C-RNTI a common-channel (RACH/FACH) MAC header carries
    /// back to the owning U-RNTI (§4.3: C-RNTI is the low 16 bits of the
    /// U-RNTI and is not reversible by arithmetic alone).
    pub fn by_crnti(&self, crnti: crate::types::CRnti) -> Option<URnti> {
        self.by_crnti.get(&crnti).copied()
    }

    pub fn ccch_rlc_mut(&mut self) -> &mut RbRlc {
        &mut self.ccch
    }

    pub fn config(&self) -> &Arc<RncConfig> {
        &self.config
    }

    pub fn stats(&self) -> &Arc<RncStats> {
        &self.stats
    }

    fn allocate_urnti(&mut self) -> URnti {
        let srnti = self.next_srnti;
        self.next_srnti += 1;
        URnti::new(self.srnc_id, srnti)
    }

    fn require_ue(&mut self, urnti: URnti) -> Result<&mut UeInfo, RrcError> {
        self.ues.get_mut(&urnti).ok_or(RrcError::UnknownUe(urnti))
    }

    /// Protects `message` per §4.6 if the UE's SRB2 integrity context is
    /// installed, and queues the encoded bytes on the named RB's active
    /// RLC. CCCH messages (no per-UE RB) bypass both steps.
    fn emit_on_rb(
        &mut self,
        urnti: URnti,
        rb: RbId,
        mut message: DownlinkMessage,
    ) -> Result<Emitted, RrcError> {
        let ue = self.require_ue(urnti)?;
        if message.is_protected_dcch() {
            if let Some(ctx) = ue.integrity.get_mut(&RbId::SRB2) {
                let draft = message.asn_encode()?;
                let mac = ctx.protect(&draft, IntegrityDirection::Downlink);
                message.set_mac_i(mac);
            }
        }
        let bytes = message.asn_encode()?;
        let rlcs = ue.active_rlcs();
        if let Some(rb_rlc) = rlcs.get_mut(&rb) {
            rb_rlc.write_downlink_sdu(Sdu::new(bytes, DiscardMode::NoDiscard, 0))?;
        } else {
            warn!("no RLC attached for RB {rb:?} on U-RNTI {urnti:?}; dropping {message:?}");
        }
        Ok(Emitted { rb, message })
    }

    fn emit_on_ccch(&mut self, message: DownlinkMessage) -> Result<Emitted, RrcError> {
        let bytes = message.asn_encode()?;
        self.ccch
            .write_downlink_sdu(Sdu::new(bytes, DiscardMode::NoDiscard, 0))?;
        Ok(Emitted { rb: RbId::SRB0, message })
    }

    /// §4.4 "Received `RRCConnectionRequest` (CCCH)".
    pub fn handle_connection_request(
        &mut self,
        now: Instant,
        identity: AsnUeId,
        _cause: EstablishmentCause,
    ) -> Result<Emitted, RrcError> {
        let urnti = match self.by_external_id.get(&identity) {
            Some(existing) => *existing,
            None => {
                let urnti = self.allocate_urnti();
                self.by_external_id.insert(identity.clone(), urnti);
                self.by_crnti.insert(urnti.c_rnti(), urnti);
                let mut ue = UeInfo::new(urnti, Some(identity), now);
                attach_fach_srbs(&mut ue, &self.config.cell_fach);
                self.ues.insert(urnti, ue);
                urnti
            }
        };
        let t300 = self.config.timers.t300;
        let ue = self.require_ue(urnti)?;
        ue.state = UeState::IdleMode;
        ue.integrity.remove(&RbId::SRB2);
        ue.touch(now);
        ue.transactions.open(TransactionKind::ConnectionSetup, now, t300);
        let crnti = ue.c_rnti();
        self.stats.record_connection_setup();
        self.emit_on_ccch(DownlinkMessage::RrcConnectionSetupCcch {
            urnti,
            crnti,
            target_state: UeState::CellFach,
        })
    }

    /// §4.4 "Received `RRCConnectionSetupComplete` (DCCH/SRB1)".
    pub fn handle_connection_setup_complete(
        &mut self,
        urnti: URnti,
        transaction_id: TransactionId,
    ) -> Result<(), RrcError> {
        let ue = self.require_ue(urnti)?;
        ue.transactions
            .close(transaction_id)
            .ok_or(RrcError::UnknownTransaction(transaction_id))?;
        ue.state = UeState::CellFach;
        self.stats.ues_cell_fach.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// §4.4 `allocateRabForPdp(urnti, rb_id, qos)` from SGSN. Idempotent.
    pub fn allocate_rab_for_pdp(
        &mut self,
        urnti: URnti,
        rb_id: RbId,
        qos: QosBytesPerSec,
    ) -> Result<RabStatus, RrcError> {
        if !rb_id.is_data() {
            return Err(RrcError::NotADataBearer(rb_id));
        }
        if let Some(status) = self.require_ue(urnti)?.rabs.get(&rb_id).cloned() {
            return Ok(status);
        }
        let required_bps = (qos.0 as u32).saturating_mul(8);
        let bw = match self.dch_tree.allocate_for_qos(required_bps) {
            Ok(bw) => bw,
            Err(ConfigError::InsufficientResources { required_bps }) => {
                self.require_ue(urnti)?.rabs.insert(rb_id, RabStatus::RabFailure);
                self.sgsn.notify_rab_status(urnti, rb_id, RabStatus::RabFailure);
                warn!("no DCH bandwidth for {required_bps} bps on U-RNTI {urnti:?}");
                return Ok(RabStatus::RabFailure);
            }
            Err(other) => return Err(other.into()),
        };

        let dch_cfg = self.config.cell_dch_packet.clone();
        let trid = {
            let config = &self.config;
            let ue = self.ues.get_mut(&urnti).ok_or(RrcError::UnknownUe(urnti))?;
            for binding in &dch_cfg.rbs {
                let preserve = config.cell_fach.rb(binding.rb).is_some_and(|fb| {
                    same_rlc_shape(&fb.uplink, &binding.uplink)
                        && same_rlc_shape(&fb.downlink, &binding.downlink)
                });
                if preserve {
                    if let Some(existing) = ue.rlcs.fach.remove(&binding.rb) {
                        ue.rlcs.dch.insert(binding.rb, existing);
                        continue;
                    }
                }
                ue.rlcs
                    .dch
                    .insert(binding.rb, RbRlc::new(&binding.uplink, &binding.downlink));
            }
            ue.mac_d = Some(build_dedicated_mac(&dch_cfg));
            ue.rabs.insert(rb_id, RabStatus::RabPending);
            ue.transactions.open(
                TransactionKind::RadioBearerSetup {
                    rb_mask: vec![rb_id],
                    next_state: UeState::CellDch,
                },
                Instant::now(),
                config.timers.t300,
            )
        };
        self.stats.rabs_allocated.fetch_add(1, Ordering::Relaxed);
        info!("allocated {bw} bps DCH for RB {rb_id:?} on U-RNTI {urnti:?}");
        self.emit_on_rb(
            urnti,
            RbId::SRB2,
            DownlinkMessage::RadioBearerSetup {
                transaction_id: trid,
                rb_mask: vec![rb_id],
                mac_i: None,
            },
        )?;
        Ok(RabStatus::RabPending)
    }

    /// §4.4 "Received `RadioBearerSetupComplete`/`Failure`".
    pub fn handle_radio_bearer_setup_complete(
        &mut self,
        urnti: URnti,
        transaction_id: TransactionId,
        success: bool,
    ) -> Result<(), RrcError> {
        let ue = self.require_ue(urnti)?;
        let txn = ue
            .transactions
            .close(transaction_id)
            .ok_or(RrcError::UnknownTransaction(transaction_id))?;
        let (rb_mask, next_state) = match txn.kind {
            TransactionKind::RadioBearerSetup { rb_mask, next_state } => (rb_mask, next_state),
            _ => return Err(RrcError::UnknownTransaction(transaction_id)),
        };
        if success {
            ue.state = next_state;
            self.stats.ues_cell_dch.fetch_add(1, Ordering::Relaxed);
        } else {
            ue.mac_d = None;
        }
        for rb in &rb_mask {
            let status = if success {
                RabStatus::RabAllocated {
                    uplink_bps: 0,
                    downlink_bps: 0,
                }
            } else {
                RabStatus::RabFailure
            };
            let ue = self.require_ue(urnti)?;
            ue.rabs.insert(*rb, status.clone());
            self.sgsn.notify_rab_status(urnti, *rb, status);
        }
        Ok(())
    }

    /// §4.4 `deactivateRabs(urnti, mask)` from SGSN.
    pub fn deactivate_rabs(&mut self, urnti: URnti, mask: Vec<RbId>) -> Result<Emitted, RrcError> {
        let t300 = self.config.timers.t300;
        let next_state;
        let trid;
        {
            let ue = self.require_ue(urnti)?;
            for rb in &mask {
                ue.rabs.insert(*rb, RabStatus::RabDeactPending);
            }
            let mask_bits = RbMask::from_rbs(mask.iter().copied());
            let any_remaining = ue
                .rabs
                .iter()
                .any(|(rb, status)| !mask_bits.contains_rb(*rb) && matches!(status, RabStatus::RabAllocated { .. }));
            next_state = if any_remaining {
                UeState::CellDch
            } else {
                UeState::CellFach
            };
            trid = ue.transactions.open(
                TransactionKind::RadioBearerRelease {
                    rb_mask: mask.clone(),
                    next_state,
                },
                Instant::now(),
                t300,
            );
        }
        self.emit_on_rb(
            urnti,
            RbId::SRB2,
            DownlinkMessage::RadioBearerRelease {
                transaction_id: trid,
                rb_mask: mask,
                mac_i: None,
            },
        )
    }

    /// §4.4 "Received `RadioBearerReleaseComplete`/`Failure`".
    pub fn handle_radio_bearer_release_complete(
        &mut self,
        urnti: URnti,
        transaction_id: TransactionId,
    ) -> Result<(), RrcError> {
        let ue = self.require_ue(urnti)?;
        let txn = ue
            .transactions
            .close(transaction_id)
            .ok_or(RrcError::UnknownTransaction(transaction_id))?;
        let (rb_mask, next_state) = match txn.kind {
            TransactionKind::RadioBearerRelease { rb_mask, next_state } => (rb_mask, next_state),
            _ => return Err(RrcError::UnknownTransaction(transaction_id)),
        };
        if next_state == UeState::CellFach {
            ue.mac_d = None;
            ue.state = UeState::CellFach;
            for rb in ue.rlcs.dch.keys().copied().collect::<Vec<_>>() {
                if let Some(rlc) = ue.rlcs.dch.remove(&rb) {
                    ue.rlcs.fach.entry(rb).or_insert(rlc);
                }
            }
        }
        for rb in &rb_mask {
            ue.rabs.insert(*rb, RabStatus::RabIdle);
        }
        Ok(())
    }

    /// §4.4 "Received `CellUpdate` (CCCH)". §9's open question: a
    /// desynced AM sequence (local SN=0 while the peer's VR(R) is not) is
    /// treated as a forced reset, counted rather than silently absorbed.
    pub fn handle_cell_update(&mut self, urnti: URnti, cause: CellUpdateCause) -> Result<Emitted, RrcError> {
        let in_dch = {
            let ue = self.require_ue(urnti)?;
            if cause == CellUpdateCause::RadioLinkFailure {
                for rb_rlc in ue.active_rlcs().values_mut() {
                    if let Some(am) = rb_rlc.am.as_mut() {
                        am.force_reset();
                    }
                }
            }
            ue.uses_dch()
        };
        if cause == CellUpdateCause::RadioLinkFailure {
            self.stats.record_rlc_reset();
        }
        if in_dch {
            self.emit_on_rb(urnti, RbId::SRB1, DownlinkMessage::CellUpdateConfirmDcch { mac_i: None })
        } else {
            self.emit_on_ccch(DownlinkMessage::CellUpdateConfirmCcch)
        }
    }

    /// §4.4 "Received `UplinkDirectTransfer`/`InitialDirectTransfer`".
    pub fn handle_direct_transfer(
        &mut self,
        urnti: URnti,
        pd: ProtocolDiscriminator,
        nas: Vec<u8>,
    ) -> Result<(), RrcError> {
        self.require_ue(urnti)?;
        match pd {
            ProtocolDiscriminator::Gmm => {
                self.sgsn.write_high_side(urnti, RbId::SRB1, nas, "gmm/sm");
            }
            ProtocolDiscriminator::Mm | ProtocolDiscriminator::Cc | ProtocolDiscriminator::Rr => {
                info!("dispatching MM/CC/RR NAS octets to voice call control for U-RNTI {urnti:?}");
            }
            ProtocolDiscriminator::Sms => {
                info!("dispatching SMS relay octets for U-RNTI {urnti:?}");
            }
        }
        Ok(())
    }

    /// Forwards a completed uplink data-RB SDU to the SGSN boundary (§1
    /// data-plane flow: "complete SDU -> RRC (for signalling RBs) or
    /// SGSN (for data RBs)").
    pub fn deliver_to_sgsn(&mut self, urnti: URnti, rb: RbId, bytes: Vec<u8>) {
        self.sgsn.write_high_side(urnti, rb, bytes, "uplink data");
    }

    /// SGSN-originated NAS downlink delivery on SRB1 (§6 "the set actually
    /// emitted" includes `DownlinkDirectTransfer`; the uplink counterpart
    /// is [`handle_direct_transfer`](Self::handle_direct_transfer)).
    pub fn downlink_direct_transfer(&mut self, urnti: URnti, nas: Vec<u8>) -> Result<Emitted, RrcError> {
        self.emit_on_rb(urnti, RbId::SRB1, DownlinkMessage::DownlinkDirectTransfer { nas, mac_i: None })
    }

    /// §4.4 "Received `RrcStatus`".
    pub fn handle_rrc_status(&mut self, urnti: URnti, error_code: u8, failed_transaction: Option<TransactionId>) {
        warn!("RrcStatus from U-RNTI {urnti:?}: error {error_code}, transaction {failed_transaction:?}");
    }

    /// §4.4 `startIntegrityProtection(urnti, Kcs)` from SGSN.
    pub fn start_integrity_protection(&mut self, urnti: URnti, kc: [u8; 16]) -> Result<Emitted, RrcError> {
        let fresh = u32::from_be_bytes([kc[0], kc[1], kc[2], kc[3]]);
        let ue = self.require_ue(urnti)?;
        ue.integrity.insert(RbId::SRB2, IntegrityContext::new(RbId::SRB2, fresh));
        self.sgsn.start_integrity_protection(urnti, kc);
        self.emit_on_rb(urnti, RbId::SRB2, DownlinkMessage::SecurityModeCommand { fresh, mac_i: None })
    }

    pub fn handle_security_mode_complete(&mut self, urnti: URnti) -> Result<(), RrcError> {
        self.require_ue(urnti)?;
        Ok(())
    }

    pub fn handle_security_mode_failure(&mut self, urnti: URnti, cause: u8) -> Result<(), RrcError> {
        self.require_ue(urnti)?;
        warn!("SecurityModeFailure from U-RNTI {urnti:?}: cause {cause}");
        Ok(())
    }

    /// §4.4 "Received `SignallingConnectionReleaseIndication`" (§8 Scenario
    /// 6). Like the inactivity path, this only requests release; MAC-D,
    /// integrity, and RAB teardown happen once the UE acknowledges with
    /// `RrcConnectionReleaseComplete` (see
    /// [`handle_rrc_connection_release_complete`](Self::handle_rrc_connection_release_complete)).
    pub fn handle_signalling_connection_release(&mut self, urnti: URnti) -> Result<Emitted, RrcError> {
        let emitted = self.emit_on_rb(urnti, RbId::SRB2, DownlinkMessage::RrcConnectionReleaseDcch { mac_i: None })?;
        self.require_ue(urnti)?.release_pending = true;
        Ok(emitted)
    }

    /// §4.4 "Received `RrcConnectionReleaseComplete`" / §8 Scenario 5: "on
    /// RRCConnectionReleaseComplete, MAC-D is detached...". Tears down
    /// MAC-D, SRB2 integrity, and any still-allocated RAB, regardless of
    /// whether the release was network- or UE-initiated.
    pub fn handle_rrc_connection_release_complete(&mut self, urnti: URnti) -> Result<(), RrcError> {
        self.require_ue(urnti)?;
        self.release_ue_resources(urnti);
        Ok(())
    }

    fn release_ue_resources(&mut self, urnti: URnti) {
        let Some(ue) = self.ues.get_mut(&urnti) else { return };
        ue.mac_d = None;
        ue.state = UeState::IdleMode;
        ue.release_pending = false;
        if let Some(ctx) = ue.integrity.get_mut(&RbId::SRB2) {
            ctx.counter_mut().reset_to_idle();
        }
        ue.integrity.remove(&RbId::SRB2);
        let freed_rabs: Vec<RbId> = ue
            .rabs
            .iter()
            .filter(|(_, status)| {
                matches!(status, RabStatus::RabAllocated { .. } | RabStatus::RabPending)
            })
            .map(|(rb, _)| *rb)
            .collect();
        for rb in freed_rabs {
            if let Some(ue) = self.ues.get_mut(&urnti) {
                ue.rabs.insert(rb, RabStatus::RabIdle);
            }
            self.sgsn.notify_rab_status(urnti, rb, RabStatus::RabIdle);
        }
        self.stats.record_connection_release();
    }

    /// §4.4 "Inactivity sweep": run periodically by the pager/reaper.
    pub fn sweep_inactivity(&mut self, now: Instant, release_after: Duration, delete_after: Duration) -> Vec<URnti> {
        let mut to_delete = Vec::new();
        let mut to_release = Vec::new();
        for (urnti, ue) in self.ues.iter() {
            let idle_for = now.duration_since(ue.last_activity);
            if ue.state == UeState::IdleMode && idle_for >= delete_after {
                to_delete.push(*urnti);
            } else if ue.state != UeState::IdleMode && idle_for >= release_after && !ue.release_pending {
                to_release.push(*urnti);
            }
        }
        for urnti in &to_release {
            if self.emit_on_rb(*urnti, RbId::SRB2, DownlinkMessage::RrcConnectionReleaseDcch { mac_i: None }).is_ok() {
                if let Some(ue) = self.ues.get_mut(urnti) {
                    ue.release_pending = true;
                }
            }
        }
        for urnti in &to_delete {
            self.ues.remove(urnti);
            self.by_external_id.retain(|_, v| v != urnti);
            self.by_crnti.retain(|_, v| v != urnti);
        }
        to_delete
    }

    /// §4.4/§5/§7: rolls back a transaction no reply ever closed before its
    /// own T300-style deadline, run alongside [`sweep_inactivity`] by the
    /// reaper.
    pub fn sweep_expired_transactions(&mut self, now: Instant) {
        let expired: Vec<(URnti, TransactionId)> = self
            .ues
            .iter()
            .flat_map(|(&urnti, ue)| {
                ue.transactions
                    .expired(now)
                    .into_iter()
                    .map(move |id| (urnti, id))
            })
            .collect();
        for (urnti, id) in expired {
            self.fail_expired_transaction(urnti, id);
        }
    }

    fn fail_expired_transaction(&mut self, urnti: URnti, id: TransactionId) {
        let Some(ue) = self.ues.get_mut(&urnti) else { return };
        let Some(txn) = ue.transactions.close(id) else { return };
        warn!("transaction {id:?} on U-RNTI {urnti:?} timed out; rolling back");
        match txn.kind {
            TransactionKind::ConnectionSetup => {
                if let Some(ue) = self.ues.get_mut(&urnti) {
                    ue.state = UeState::IdleMode;
                }
            }
            TransactionKind::RadioBearerSetup { rb_mask, .. } => {
                if let Some(ue) = self.ues.get_mut(&urnti) {
                    ue.mac_d = None;
                }
                for rb in rb_mask {
                    if let Some(ue) = self.ues.get_mut(&urnti) {
                        ue.rabs.insert(rb, RabStatus::RabFailure);
                    }
                    self.sgsn.notify_rab_status(urnti, rb, RabStatus::RabFailure);
                }
            }
            TransactionKind::RadioBearerRelease { rb_mask, .. } => {
                for rb in rb_mask {
                    if let Some(ue) = self.ues.get_mut(&urnti) {
                        ue.rabs.insert(rb, RabStatus::RabFailure);
                    }
                    self.sgsn.notify_rab_status(urnti, rb, RabStatus::RabFailure);
                }
            }
        }
    }

    /// §4.3/§7: an uplink PDU from a U-RNTI this controller no longer
    /// recognises gets told to go idle, rather than silently dropped.
    pub fn reject_unknown_uplink(&mut self) -> Result<Emitted, RrcError> {
        self.emit_on_ccch(DownlinkMessage::RrcConnectionReleaseCcch)
    }

    /// U-RNTIs of every UE whose active RLC table is the FACH-backed one
    /// (every state but CELL_DCH) — the scheduler's per-tick candidate set
    /// for MAC-C (§4.3 "U-RNTI mod number_of_FACH").
    pub fn fach_resident_ues(&self) -> Vec<URnti> {
        self.ues
            .iter()
            .filter(|(_, ue)| !ue.uses_dch())
            .map(|(&urnti, _)| urnti)
            .collect()
    }

    /// U-RNTIs of every UE currently in CELL_DCH, i.e. owning the MAC-D
    /// instance the scheduler must service once per tick (§3 invariant i).
    pub fn dch_resident_ues(&self) -> Vec<URnti> {
        self.ues
            .iter()
            .filter(|(_, ue)| ue.uses_dch())
            .map(|(&urnti, _)| urnti)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sgsn::FakeSgsn;

    fn controller() -> RrcController<FakeSgsn> {
        RrcController::new(RncConfig::reference(), Arc::new(RncStats::new()), FakeSgsn::new(), 1)
    }

    use crate::config::RncConfig;

    #[test]
    fn scenario_1_connection_setup() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(
                now,
                AsnUeId::Imsi("1234567890".to_string()),
                EstablishmentCause::OriginatingConversationalCall,
            )
            .unwrap();
        let urnti = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, crnti, target_state } => {
                assert_eq!(urnti.raw(), 0x0010_0001);
                assert_eq!(crnti.raw(), 0x0001);
                assert_eq!(target_state, UeState::CellFach);
                urnti
            }
            other => panic!("unexpected: {other:?}"),
        };
        rrc.handle_connection_setup_complete(urnti, TransactionId::new(0)).unwrap();
        assert_eq!(rrc.ue(urnti).unwrap().state, UeState::CellFach);
    }

    #[test]
    fn scenario_2_duplicate_request_reuses_urnti() {
        let mut rrc = controller();
        let now = Instant::now();
        let identity = AsnUeId::Imsi("1234567890".to_string());
        let first = rrc
            .handle_connection_request(now, identity.clone(), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let second = rrc
            .handle_connection_request(now, identity, EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        assert_eq!(
            match (first.message, second.message) {
                (
                    DownlinkMessage::RrcConnectionSetupCcch { urnti: a, .. },
                    DownlinkMessage::RrcConnectionSetupCcch { urnti: b, .. },
                ) => a == b,
                _ => false,
            },
            true
        );
    }

    #[test]
    fn scenario_3_pdp_activation() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(now, AsnUeId::Imsi("1".to_string()), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let urnti = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, .. } => urnti,
            _ => unreachable!(),
        };
        rrc.handle_connection_setup_complete(urnti, TransactionId::new(0)).unwrap();

        let status = rrc
            .allocate_rab_for_pdp(urnti, RbId::new(5), QosBytesPerSec(16_000))
            .unwrap();
        assert_eq!(status, RabStatus::RabPending);
        assert!(rrc.ue(urnti).unwrap().mac_d.is_some());

        rrc.handle_radio_bearer_setup_complete(urnti, TransactionId::new(1), true).unwrap();
        assert_eq!(rrc.ue(urnti).unwrap().state, UeState::CellDch);
        assert_eq!(
            rrc.ue(urnti).unwrap().rabs.get(&RbId::new(5)),
            Some(&RabStatus::RabAllocated { uplink_bps: 0, downlink_bps: 0 })
        );
    }

    #[test]
    fn unknown_ue_is_rejected() {
        let mut rrc = controller();
        let err = rrc.allocate_rab_for_pdp(URnti::new(1, 999), RbId::new(5), QosBytesPerSec(1000));
        assert!(matches!(err, Err(RrcError::UnknownUe(_))));
    }

    #[test]
    fn data_rb_guard_rejects_signalling_rb() {
        let mut rrc = controller();
        let err = rrc.allocate_rab_for_pdp(URnti::new(1, 1), RbId::SRB1, QosBytesPerSec(1000));
        assert!(matches!(err, Err(RrcError::NotADataBearer(_))));
    }

    #[test]
    fn by_crnti_resolves_back_to_the_owning_urnti() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(now, AsnUeId::Imsi("9".to_string()), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let (urnti, crnti) = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, crnti, .. } => (urnti, crnti),
            _ => unreachable!(),
        };
        assert_eq!(rrc.by_crnti(crnti), Some(urnti));
    }

    #[test]
    fn cell_update_after_radio_link_failure_forces_am_reset_and_counts_it() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(now, AsnUeId::Imsi("2".to_string()), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let urnti = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, .. } => urnti,
            _ => unreachable!(),
        };
        rrc.handle_connection_setup_complete(urnti, TransactionId::new(0)).unwrap();
        assert_eq!(rrc.stats.snapshot().rlc_resets, 0);
        rrc.handle_cell_update(urnti, CellUpdateCause::RadioLinkFailure).unwrap();
        assert_eq!(rrc.stats.snapshot().rlc_resets, 1);
        rrc.handle_cell_update(urnti, CellUpdateCause::Periodical).unwrap();
        assert_eq!(rrc.stats.snapshot().rlc_resets, 1);
    }

    #[test]
    fn scenario_6_signalling_connection_release_defers_teardown_until_complete() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(now, AsnUeId::Imsi("6".to_string()), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let urnti = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, .. } => urnti,
            _ => unreachable!(),
        };
        rrc.handle_connection_setup_complete(urnti, TransactionId::new(0)).unwrap();
        rrc.allocate_rab_for_pdp(urnti, RbId::new(5), QosBytesPerSec(16_000)).unwrap();
        rrc.handle_radio_bearer_setup_complete(urnti, TransactionId::new(1), true).unwrap();
        assert!(rrc.ue(urnti).unwrap().mac_d.is_some());

        rrc.handle_signalling_connection_release(urnti).unwrap();
        assert!(rrc.ue(urnti).unwrap().release_pending);
        assert!(rrc.ue(urnti).unwrap().mac_d.is_some(), "teardown must wait for the Complete ack");

        rrc.handle_rrc_connection_release_complete(urnti).unwrap();
        assert!(!rrc.ue(urnti).unwrap().release_pending);
        assert!(rrc.ue(urnti).unwrap().mac_d.is_none());
        assert_eq!(rrc.ue(urnti).unwrap().state, UeState::IdleMode);
        assert_eq!(rrc.ue(urnti).unwrap().rabs.get(&RbId::new(5)), Some(&RabStatus::RabIdle));
        assert!(rrc
            .sgsn
            .notifications
            .iter()
            .any(|(u, rb, status)| *u == urnti && *rb == RbId::new(5) && *status == RabStatus::RabIdle));
    }

    #[test]
    fn sweep_inactivity_marks_release_pending_and_defers_teardown() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(now, AsnUeId::Imsi("7".to_string()), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let urnti = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, .. } => urnti,
            _ => unreachable!(),
        };
        rrc.handle_connection_setup_complete(urnti, TransactionId::new(0)).unwrap();

        let release_after = Duration::from_secs(30);
        let delete_after = Duration::from_secs(300);
        let later = now + release_after + Duration::from_secs(1);
        rrc.sweep_inactivity(later, release_after, delete_after);
        assert!(rrc.ue(urnti).unwrap().release_pending);
        assert_eq!(rrc.ue(urnti).unwrap().state, UeState::CellFach, "teardown must wait for the Complete ack");

        rrc.handle_rrc_connection_release_complete(urnti).unwrap();
        assert!(!rrc.ue(urnti).unwrap().release_pending);
        assert_eq!(rrc.ue(urnti).unwrap().state, UeState::IdleMode);
    }

    #[test]
    fn expired_radio_bearer_setup_transaction_rolls_back_and_notifies_sgsn() {
        let mut rrc = controller();
        let now = Instant::now();
        let emitted = rrc
            .handle_connection_request(now, AsnUeId::Imsi("8".to_string()), EstablishmentCause::OriginatingConversationalCall)
            .unwrap();
        let urnti = match emitted.message {
            DownlinkMessage::RrcConnectionSetupCcch { urnti, .. } => urnti,
            _ => unreachable!(),
        };
        rrc.handle_connection_setup_complete(urnti, TransactionId::new(0)).unwrap();
        rrc.allocate_rab_for_pdp(urnti, RbId::new(5), QosBytesPerSec(16_000)).unwrap();
        assert!(rrc.ue(urnti).unwrap().mac_d.is_some());

        rrc.sweep_expired_transactions(Instant::now() + Duration::from_secs(5));

        assert!(rrc.ue(urnti).unwrap().mac_d.is_none());
        assert_eq!(rrc.ue(urnti).unwrap().rabs.get(&RbId::new(5)), Some(&RabStatus::RabFailure));
        assert!(rrc
            .sgsn
            .notifications
            .iter()
            .any(|(u, rb, status)| *u == urnti && *rb == RbId::new(5) && *status == RabStatus::RabFailure));
    }

    #[test]
    fn reject_unknown_uplink_emits_release_on_ccch() {
        let mut rrc = controller();
        let emitted = rrc.reject_unknown_uplink().unwrap();
        assert_eq!(emitted.rb, RbId::SRB0);
        assert!(matches!(emitted.message, DownlinkMessage::RrcConnectionReleaseCcch));
    }
}
