//! The RRC message set actually emitted and consumed by this core (§6).
//! Real encoding is 3GPP 25.331 UPER; here each message hand-rolls its
//! own (de)serialization on top of the [`crate::asn`] primitive cursor,
//! tagged by a single discriminant byte per message kind.

use crate::asn::{AsnDecode, AsnEncode, AsnError, Reader, Writer};
use crate::types::{AsnUeId, CRnti, RbId, TransactionId, UeState, URnti};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishmentCause {
    OriginatingConversationalCall,
    OriginatingBackgroundCall,
    RegistrationUpdate,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolDiscriminator {
    Gmm,
    Mm,
    Cc,
    Rr,
    Sms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellUpdateCause {
    CellReselection,
    UplinkDataTransmission,
    Periodical,
    RadioLinkFailure,
}

fn encode_asn_ue_id(w: &mut Writer, id: &AsnUeId) -> Result<(), AsnError> {
    match id {
        AsnUeId::Imsi(s) => {
            w.u8(0);
            w.string(s)?;
        }
        AsnUeId::Ptmsi { ptmsi, routing_area } => {
            w.u8(1);
            w.u32(*ptmsi);
            w.string(routing_area)?;
        }
        AsnUeId::Imei(s) => {
            w.u8(2);
            w.string(s)?;
        }
        AsnUeId::Esn(esn) => {
            w.u8(3);
            w.u32(*esn);
        }
    }
    Ok(())
}

fn decode_asn_ue_id(r: &mut Reader<'_>) -> Result<AsnUeId, AsnError> {
    match r.u8()? {
        0 => Ok(AsnUeId::Imsi(r.string()?)),
        1 => {
            let ptmsi = r.u32()?;
            let routing_area = r.string()?;
            Ok(AsnUeId::Ptmsi { ptmsi, routing_area })
        }
        2 => Ok(AsnUeId::Imei(r.string()?)),
        3 => Ok(AsnUeId::Esn(r.u32()?)),
        _ => Err(AsnError::Truncated),
    }
}

fn cause_tag(cause: EstablishmentCause) -> u8 {
    match cause {
        EstablishmentCause::OriginatingConversationalCall => 0,
        EstablishmentCause::OriginatingBackgroundCall => 1,
        EstablishmentCause::RegistrationUpdate => 2,
        EstablishmentCause::Other => 3,
    }
}

fn cause_from_tag(tag: u8) -> EstablishmentCause {
    match tag {
        0 => EstablishmentCause::OriginatingConversationalCall,
        1 => EstablishmentCause::OriginatingBackgroundCall,
        2 => EstablishmentCause::RegistrationUpdate,
        _ => EstablishmentCause::Other,
    }
}

fn pd_tag(pd: ProtocolDiscriminator) -> u8 {
    match pd {
        ProtocolDiscriminator::Gmm => 0,
        ProtocolDiscriminator::Mm => 1,
        ProtocolDiscriminator::Cc => 2,
        ProtocolDiscriminator::Rr => 3,
        ProtocolDiscriminator::Sms => 4,
    }
}

fn pd_from_tag(tag: u8) -> ProtocolDiscriminator {
    match tag {
        0 => ProtocolDiscriminator::Gmm,
        1 => ProtocolDiscriminator::Mm,
        2 => ProtocolDiscriminator::Cc,
        3 => ProtocolDiscriminator::Rr,
        _ => ProtocolDiscriminator::Sms,
    }
}

/// Messages consumed by the RRC controller (§6 "The set consumed").
/// `MeasurementReport` carries no fields (ignored per §4.4) and
/// `UeCapabilityInformation` is stored, never enforced (SPEC_FULL §F).
#[derive(Debug, Clone)]
pub enum UplinkMessage {
    RrcConnectionRequest {
        identity: AsnUeId,
        cause: EstablishmentCause,
    },
    RrcConnectionSetupComplete {
        transaction_id: TransactionId,
    },
    RrcConnectionReleaseComplete,
    RadioBearerSetupComplete {
        transaction_id: TransactionId,
    },
    RadioBearerSetupFailure {
        transaction_id: TransactionId,
    },
    RadioBearerReleaseComplete {
        transaction_id: TransactionId,
    },
    RadioBearerReleaseFailure {
        transaction_id: TransactionId,
    },
    CellUpdate {
        cause: CellUpdateCause,
    },
    UraUpdate,
    UplinkDirectTransfer {
        pd: ProtocolDiscriminator,
        nas: Vec<u8>,
    },
    InitialDirectTransfer {
        pd: ProtocolDiscriminator,
        nas: Vec<u8>,
    },
    SecurityModeComplete,
    SecurityModeFailure {
        cause: u8,
    },
    RrcStatus {
        error_code: u8,
        failed_transaction: Option<TransactionId>,
    },
    SignallingConnectionReleaseIndication,
    MeasurementReport,
    UeCapabilityInformation {
        raw: Vec<u8>,
    },
}

impl AsnEncode for UplinkMessage {
    fn asn_encode(&self) -> Result<Vec<u8>, AsnError> {
        let mut w = Writer::new();
        match self {
            UplinkMessage::RrcConnectionRequest { identity, cause } => {
                w.u8(0);
                encode_asn_ue_id(&mut w, identity)?;
                w.u8(cause_tag(*cause));
            }
            UplinkMessage::RrcConnectionSetupComplete { transaction_id } => {
                w.u8(1).u8(transaction_id.get());
            }
            UplinkMessage::RrcConnectionReleaseComplete => {
                w.u8(2);
            }
            UplinkMessage::RadioBearerSetupComplete { transaction_id } => {
                w.u8(3).u8(transaction_id.get());
            }
            UplinkMessage::RadioBearerSetupFailure { transaction_id } => {
                w.u8(4).u8(transaction_id.get());
            }
            UplinkMessage::RadioBearerReleaseComplete { transaction_id } => {
                w.u8(5).u8(transaction_id.get());
            }
            UplinkMessage::RadioBearerReleaseFailure { transaction_id } => {
                w.u8(6).u8(transaction_id.get());
            }
            UplinkMessage::CellUpdate { cause } => {
                let tag = match cause {
                    CellUpdateCause::CellReselection => 0,
                    CellUpdateCause::UplinkDataTransmission => 1,
                    CellUpdateCause::Periodical => 2,
                    CellUpdateCause::RadioLinkFailure => 3,
                };
                w.u8(7).u8(tag);
            }
            UplinkMessage::UraUpdate => {
                w.u8(8);
            }
            UplinkMessage::UplinkDirectTransfer { pd, nas } => {
                w.u8(9).u8(pd_tag(*pd));
                w.bytes(nas)?;
            }
            UplinkMessage::InitialDirectTransfer { pd, nas } => {
                w.u8(10).u8(pd_tag(*pd));
                w.bytes(nas)?;
            }
            UplinkMessage::SecurityModeComplete => {
                w.u8(11);
            }
            UplinkMessage::SecurityModeFailure { cause } => {
                w.u8(12).u8(*cause);
            }
            UplinkMessage::RrcStatus {
                error_code,
                failed_transaction,
            } => {
                w.u8(13).u8(*error_code);
                match failed_transaction {
                    Some(id) => {
                        w.u8(1).u8(id.get());
                    }
                    None => {
                        w.u8(0);
                    }
                }
            }
            UplinkMessage::SignallingConnectionReleaseIndication => {
                w.u8(14);
            }
            UplinkMessage::MeasurementReport => {
                w.u8(15);
            }
            UplinkMessage::UeCapabilityInformation { raw } => {
                w.u8(16);
                w.bytes(raw)?;
            }
        }
        Ok(w.into_vec())
    }
}

impl AsnDecode for UplinkMessage {
    fn asn_decode(bytes: &[u8]) -> Result<Self, AsnError> {
        let mut r = Reader::new(bytes);
        Ok(match r.u8()? {
            0 => UplinkMessage::RrcConnectionRequest {
                identity: decode_asn_ue_id(&mut r)?,
                cause: cause_from_tag(r.u8()?),
            },
            1 => UplinkMessage::RrcConnectionSetupComplete {
                transaction_id: TransactionId::new(r.u8()?),
            },
            2 => UplinkMessage::RrcConnectionReleaseComplete,
            3 => UplinkMessage::RadioBearerSetupComplete {
                transaction_id: TransactionId::new(r.u8()?),
            },
            4 => UplinkMessage::RadioBearerSetupFailure {
                transaction_id: TransactionId::new(r.u8()?),
            },
            5 => UplinkMessage::RadioBearerReleaseComplete {
                transaction_id: TransactionId::new(r.u8()?),
            },
            6 => UplinkMessage::RadioBearerReleaseFailure {
                transaction_id: TransactionId::new(r.u8()?),
            },
            7 => {
                let cause = match r.u8()? {
                    0 => CellUpdateCause::CellReselection,
                    1 => CellUpdateCause::UplinkDataTransmission,
                    2 => CellUpdateCause::Periodical,
                    _ => CellUpdateCause::RadioLinkFailure,
                };
                UplinkMessage::CellUpdate { cause }
            }
            8 => UplinkMessage::UraUpdate,
            9 => UplinkMessage::UplinkDirectTransfer {
                pd: pd_from_tag(r.u8()?),
                nas: r.bytes()?,
            },
            10 => UplinkMessage::InitialDirectTransfer {
                pd: pd_from_tag(r.u8()?),
                nas: r.bytes()?,
            },
            11 => UplinkMessage::SecurityModeComplete,
            12 => UplinkMessage::SecurityModeFailure { cause: r.u8()? },
            13 => {
                let error_code = r.u8()?;
                let failed_transaction = match r.u8()? {
                    1 => Some(TransactionId::new(r.u8()?)),
                    _ => None,
                };
                UplinkMessage::RrcStatus {
                    error_code,
                    failed_transaction,
                }
            }
            14 => UplinkMessage::SignallingConnectionReleaseIndication,
            15 => UplinkMessage::MeasurementReport,
            16 => UplinkMessage::UeCapabilityInformation { raw: r.bytes()? },
            _ => return Err(AsnError::Truncated),
        })
    }
}

/// Messages emitted by the RRC controller (§6 "the set actually emitted").
/// `mac_i` is `None` until integrity protection starts on SRB2; once
/// started, every downlink DCCH message carries the 32-bit MAC-I
/// computed per §4.6's two-pass encode.
#[derive(Debug, Clone)]
pub enum DownlinkMessage {
    RrcConnectionSetupCcch {
        urnti: URnti,
        crnti: CRnti,
        target_state: UeState,
    },
    RrcConnectionReleaseCcch,
    RrcConnectionReleaseDcch {
        mac_i: Option<u32>,
    },
    RadioBearerSetup {
        transaction_id: TransactionId,
        rb_mask: Vec<RbId>,
        mac_i: Option<u32>,
    },
    RadioBearerRelease {
        transaction_id: TransactionId,
        rb_mask: Vec<RbId>,
        mac_i: Option<u32>,
    },
    CellUpdateConfirmCcch,
    CellUpdateConfirmDcch {
        mac_i: Option<u32>,
    },
    SecurityModeCommand {
        fresh: u32,
        mac_i: Option<u32>,
    },
    DownlinkDirectTransfer {
        nas: Vec<u8>,
        mac_i: Option<u32>,
    },
}

impl DownlinkMessage {
    /// `true` for messages carried on SRB2/DCCH, i.e. everything the
    /// integrity path in §4.6 applies to. CCCH variants bypass it.
    pub fn is_protected_dcch(&self) -> bool {
        matches!(
            self,
            DownlinkMessage::RrcConnectionReleaseDcch { .. }
                | DownlinkMessage::RadioBearerSetup { .. }
                | DownlinkMessage::RadioBearerRelease { .. }
                | DownlinkMessage::CellUpdateConfirmDcch { .. }
                | DownlinkMessage::SecurityModeCommand { .. }
                | DownlinkMessage::DownlinkDirectTransfer { .. }
        )
    }

    pub fn set_mac_i(&mut self, value: u32) {
        let slot = match self {
            DownlinkMessage::RrcConnectionReleaseDcch { mac_i } => mac_i,
            DownlinkMessage::RadioBearerSetup { mac_i, .. } => mac_i,
            DownlinkMessage::RadioBearerRelease { mac_i, .. } => mac_i,
            DownlinkMessage::CellUpdateConfirmDcch { mac_i } => mac_i,
            DownlinkMessage::SecurityModeCommand { mac_i, .. } => mac_i,
            DownlinkMessage::DownlinkDirectTransfer { mac_i, .. } => mac_i,
            _ => return,
        };
        *slot = Some(value);
    }
}

impl AsnEncode for DownlinkMessage {
    fn asn_encode(&self) -> Result<Vec<u8>, AsnError> {
        let mut w = Writer::new();
        let mac_i_tag = |w: &mut Writer, mac_i: &Option<u32>| {
            match mac_i {
                Some(v) => {
                    w.u8(1).u32(*v);
                }
                None => {
                    w.u8(0).u32(0);
                }
            };
        };
        match self {
            DownlinkMessage::RrcConnectionSetupCcch {
                urnti,
                crnti,
                target_state,
            } => {
                w.u8(0).u32(urnti.raw()).u16(crnti.raw());
                w.u8(state_tag(*target_state));
            }
            DownlinkMessage::RrcConnectionReleaseCcch => {
                w.u8(1);
            }
            DownlinkMessage::RrcConnectionReleaseDcch { mac_i } => {
                w.u8(2);
                mac_i_tag(&mut w, mac_i);
            }
            DownlinkMessage::RadioBearerSetup {
                transaction_id,
                rb_mask,
                mac_i,
            } => {
                w.u8(3).u8(transaction_id.get());
                encode_rb_mask(&mut w, rb_mask)?;
                mac_i_tag(&mut w, mac_i);
            }
            DownlinkMessage::RadioBearerRelease {
                transaction_id,
                rb_mask,
                mac_i,
            } => {
                w.u8(4).u8(transaction_id.get());
                encode_rb_mask(&mut w, rb_mask)?;
                mac_i_tag(&mut w, mac_i);
            }
            DownlinkMessage::CellUpdateConfirmCcch => {
                w.u8(5);
            }
            DownlinkMessage::CellUpdateConfirmDcch { mac_i } => {
                w.u8(6);
                mac_i_tag(&mut w, mac_i);
            }
            DownlinkMessage::SecurityModeCommand { fresh, mac_i } => {
                w.u8(7).u32(*fresh);
                mac_i_tag(&mut w, mac_i);
            }
            DownlinkMessage::DownlinkDirectTransfer { nas, mac_i } => {
                w.u8(8);
                w.bytes(nas)?;
                mac_i_tag(&mut w, mac_i);
            }
        }
        Ok(w.into_vec())
    }
}

fn encode_rb_mask(w: &mut Writer, rb_mask: &[RbId]) -> Result<(), AsnError> {
    let bytes: Vec<u8> = rb_mask.iter().map(|rb| rb.get()).collect();
    w.bytes(&bytes)?;
    Ok(())
}

fn state_tag(state: UeState) -> u8 {
    match state {
        UeState::IdleMode => 0,
        UeState::CellFach => 1,
        UeState::CellDch => 2,
        UeState::CellPch => 3,
        UeState::UraPch => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_request_round_trips() {
        let msg = UplinkMessage::RrcConnectionRequest {
            identity: AsnUeId::Imsi("1234567890".to_string()),
            cause: EstablishmentCause::OriginatingConversationalCall,
        };
        let bytes = msg.asn_encode().unwrap();
        match UplinkMessage::asn_decode(&bytes).unwrap() {
            UplinkMessage::RrcConnectionRequest { identity, cause } => {
                assert_eq!(identity, AsnUeId::Imsi("1234567890".to_string()));
                assert_eq!(cause, EstablishmentCause::OriginatingConversationalCall);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn downlink_message_carries_mac_i_once_set() {
        let mut msg = DownlinkMessage::RadioBearerSetup {
            transaction_id: TransactionId::new(1),
            rb_mask: vec![RbId::new(5)],
            mac_i: None,
        };
        assert!(msg.is_protected_dcch());
        msg.set_mac_i(0xdead_beef);
        let bytes = msg.asn_encode().unwrap();
        assert!(!bytes.is_empty());
    }
}
