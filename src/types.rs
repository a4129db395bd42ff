//! Core identifiers shared across the RRC/RLC/MAC layers (§3).

use std::fmt;

/// 32-bit U-RNTI: a 12-bit serving-controller id packed over a 20-bit
/// per-cell id. The low 16 bits double as the C-RNTI (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct URnti(u32);

impl URnti {
    pub const fn new(srnc_id: u16, srnti: u32) -> Self {
        debug_assert!(srnc_id < (1 << 12));
        debug_assert!(srnti < (1 << 20));
        Self(((srnc_id as u32) << 20) | (srnti & 0x000f_ffff))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn srnc_id(self) -> u16 {
        (self.0 >> 20) as u16
    }

    pub const fn srnti(self) -> u32 {
        self.0 & 0x000f_ffff
    }

    /// The C-RNTI is defined as the low 16 bits of the U-RNTI (§3).
    pub const fn c_rnti(self) -> CRnti {
        CRnti((self.0 & 0xffff) as u16)
    }
}

impl fmt::Display for URnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// 16-bit C-RNTI, valid only within the current cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CRnti(u16);

impl CRnti {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CRnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// External identity used only to recognize a duplicate attachment request
/// (§3); never transmitted over the air channels this core owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AsnUeId {
    Imsi(String),
    Ptmsi { ptmsi: u32, routing_area: String },
    Imei(String),
    Esn(u32),
}

/// Radio bearer id, 0–15 (§3). RB0 is the common control channel; RB1–RB3
/// are signalling (SRB1–SRB3); RB5–RB15 are data bearers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RbId(u8);

impl RbId {
    pub const SRB0: RbId = RbId(0);
    pub const SRB1: RbId = RbId(1);
    pub const SRB2: RbId = RbId(2);
    pub const SRB3: RbId = RbId(3);

    pub const fn new(id: u8) -> Self {
        debug_assert!(id <= 15);
        Self(id)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_signalling(self) -> bool {
        self.0 <= 3
    }

    pub const fn is_data(self) -> bool {
        self.0 >= 5
    }
}

impl fmt::Display for RbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RB{}", self.0)
    }
}

bitflags::bitflags! {
    /// A set of radio bearers, one bit per `RbId` (0–15). Used wherever a
    /// procedure needs to test RB membership repeatedly — e.g. `deactivateRabs`
    /// checking which RABs survive a partial release — instead of a linear
    /// scan over a `Vec<RbId>` (§4.4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RbMask: u16 {
        const RB0 = 1 << 0;
        const RB1 = 1 << 1;
        const RB2 = 1 << 2;
        const RB3 = 1 << 3;
        const RB4 = 1 << 4;
        const RB5 = 1 << 5;
        const RB6 = 1 << 6;
        const RB7 = 1 << 7;
        const RB8 = 1 << 8;
        const RB9 = 1 << 9;
        const RB10 = 1 << 10;
        const RB11 = 1 << 11;
        const RB12 = 1 << 12;
        const RB13 = 1 << 13;
        const RB14 = 1 << 14;
        const RB15 = 1 << 15;
    }
}

impl RbMask {
    pub fn from_rb(rb: RbId) -> Self {
        Self::from_bits_truncate(1 << rb.get())
    }

    pub fn from_rbs(rbs: impl IntoIterator<Item = RbId>) -> Self {
        rbs.into_iter().fold(Self::empty(), |acc, rb| acc | Self::from_rb(rb))
    }

    pub fn contains_rb(self, rb: RbId) -> bool {
        self.contains(Self::from_rb(rb))
    }
}

/// RLC mode bound to one direction of one RB (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlcMode {
    Transparent,
    Unacknowledged,
    Acknowledged,
}

/// Connection states a UE cycles through (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeState {
    IdleMode,
    CellFach,
    CellDch,
    CellPch,
    UraPch,
}

impl UeState {
    pub const fn uses_dch(self) -> bool {
        matches!(self, UeState::CellDch)
    }
}

/// Per-RAB allocation status (§4.4), keyed by data [`RbId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RabStatus {
    RabIdle,
    RabPending,
    RabAllocated { uplink_bps: u32, downlink_bps: u32 },
    RabDeactPending,
    RabFailure,
}

/// A 2-bit transaction id, `0..=3` (§3 invariant v).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransactionId(u8);

impl TransactionId {
    pub const fn new(id: u8) -> Self {
        debug_assert!(id < 4);
        Self(id)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}
