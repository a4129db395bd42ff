//! MAC: logical-channel multiplexing onto transport channels (§4.3).
//!
//! MAC-C serves the common RACH/FACH pair shared by every UE in
//! CELL_FACH; MAC-D serves one UE's dedicated DCH pair once it moves to
//! CELL_DCH. Both are driven once per TTI by the scheduler in `context`,
//! which owns UE selection and RLC pulling — this module only knows about
//! bytes, headers, and transport format combinations (§4.3 "TFC selection
//! optimality" is a property of pure functions, not of UE state).

pub mod common;
pub mod dedicated;
pub mod header;
pub mod tfc_select;

use enum_dispatch::enum_dispatch;
use thiserror::Error;

use crate::tb::TransportBlockSet;

#[derive(Debug, Error)]
pub enum MacError {
    #[error("transport block size mismatch: expected {expected}, got {actual}")]
    InvalidSize { expected: usize, actual: usize },

    #[error("no TFC in the combination set matches the data ready to send")]
    NoMatchingTfc,

    #[error("TFCI {tfci} is outside the configured combination set")]
    TfciOutOfRange { tfci: u16 },

    #[error("no logical channel is bound to C/T value {ct}")]
    UnknownLogicalChannel { ct: u8 },

    #[error("malformed MAC header")]
    MalformedHeader,
}

/// One TTI's worth of payload MAC has assembled for one logical channel,
/// tagged with the RB it came from/is bound for. `ue_id` is only present
/// on common-channel DCCH/DTCH traffic, which must carry its own UE
/// addressing in the MAC header (§4.3); dedicated-channel traffic and CCCH
/// leave it `None`.
#[derive(Debug, Clone)]
pub struct LogicalChannelPdu {
    pub rb: crate::types::RbId,
    pub ue_id: Option<header::UeIdRef>,
    pub bytes: Vec<u8>,
}

impl LogicalChannelPdu {
    pub fn new(rb: crate::types::RbId, bytes: Vec<u8>) -> Self {
        Self {
            rb,
            ue_id: None,
            bytes,
        }
    }

    pub fn addressed(rb: crate::types::RbId, ue_id: header::UeIdRef, bytes: Vec<u8>) -> Self {
        Self {
            rb,
            ue_id: Some(ue_id),
            bytes,
        }
    }
}

/// Shared surface both MAC-C and MAC-D expose to the scheduler (§4.3).
#[enum_dispatch]
pub trait MacEngine {
    /// Builds this TTI's transport block set from whatever logical-channel
    /// PDUs are handed in, selecting a TFC per §4.3 steps 1–5. Returns
    /// `Err(NoMatchingTfc)` (logged by the caller, not here) when nothing
    /// ready fits any configured TFC.
    fn assemble_tti(
        &mut self,
        ready: Vec<LogicalChannelPdu>,
    ) -> Result<TransportBlockSet, MacError>;

    /// Splits a received transport block set back into per-RB logical
    /// channel PDUs, stripping MAC headers as it goes.
    fn disassemble_tti(
        &mut self,
        tbs: TransportBlockSet,
    ) -> Result<Vec<LogicalChannelPdu>, MacError>;
}

#[enum_dispatch(MacEngine)]
pub enum MacEntity {
    Common(common::CommonMac),
    Dedicated(dedicated::DedicatedMac),
}
