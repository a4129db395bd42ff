//! Crate-wide error surface.
//!
//! Per §7, most faults named in the spec are *handled* at the point they
//! occur (logged, the partial unit dropped, the state machine rolled back)
//! and never become an `Err` the caller has to deal with. What remains here
//! is the small set of genuinely unrecoverable construction-time and
//! configuration-time failures.

use thiserror::Error;

use crate::config::ConfigError;
use crate::mac::MacError;
use crate::rlc::RlcError;
use crate::rrc::RrcError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rlc(#[from] RlcError),

    #[error(transparent)]
    Mac(#[from] MacError),

    #[error(transparent)]
    Rrc(#[from] RrcError),
}

pub type Result<T> = core::result::Result<T, Error>;
