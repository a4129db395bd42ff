//! Radio-network control core for a 3G UMTS base station: the RRC
//! connection state machine, RLC entities (TM/UM/AM), and the MAC
//! multiplexer binding logical channels onto transport channels (§1).
//!
//! This crate owns the Uu air-interface control plane only. It is handed
//! transport blocks by a PHY implementation and RAB/paging decisions by an
//! SGSN-facing core network implementation — both are trait boundaries
//! ([`phy`], [`sgsn`]) so a host process can plug in whatever sits below
//! and above this core.

#![warn(rust_2018_idioms)]
#![warn(unused_qualifications)]

pub mod asn;
pub mod config;
pub mod context;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod mac;
pub mod phy;
pub mod rlc;
pub mod rrc;
pub mod sgsn;
pub mod sn;
pub mod stats;
pub mod tb;
pub mod time;
pub mod trch;
pub mod types;
pub mod ue;

pub use error::{Error, Result};
