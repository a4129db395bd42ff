//! SGSN/GGSN boundary (§6): a narrow trait this core calls out through and
//! is called back on. The packet-data session layer itself is out of
//! scope (§1(c)); only the interface shape lives here.

use crate::types::{RabStatus, RbId, URnti};

/// Opaque handle SGSN hands back from [`Sgsn::find_ms`]; this core never
/// interprets it, only threads it through later calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosBytesPerSec(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmCause {
    InsufficientResources,
    MissingOrUnknownApn,
    Unspecified,
}

/// The collaborator surface named in §6. A real deployment wires this to
/// the SGSN/GGSN process; tests use an in-memory fake.
pub trait Sgsn {
    fn find_ms(&self, urnti: URnti) -> Option<UeHandle>;

    fn allocate_rab_for_pdp(
        &mut self,
        urnti: URnti,
        rb_id: RbId,
        qos: QosBytesPerSec,
    ) -> RabStatus;

    fn start_integrity_protection(&mut self, urnti: URnti, kc: [u8; 16]);

    /// Pushes a downlink SDU for `rb_id`; `descr` is a free-form tag used
    /// only for logging.
    fn write_high_side(&mut self, urnti: URnti, rb_id: RbId, bytes: Vec<u8>, descr: &str);

    /// Tells SGSN the final outcome of a RAB it requested (§8 scenario 3:
    /// "SGSN notified with the chosen bit rate").
    fn notify_rab_status(&mut self, urnti: URnti, rb_id: RbId, status: RabStatus);
}

#[cfg(test)]
pub struct FakeSgsn {
    pub allocations: Vec<(URnti, RbId, QosBytesPerSec)>,
    pub delivered: Vec<(URnti, RbId, Vec<u8>)>,
    pub notifications: Vec<(URnti, RbId, RabStatus)>,
}

#[cfg(test)]
impl FakeSgsn {
    pub fn new() -> Self {
        Self {
            allocations: Vec::new(),
            delivered: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Sgsn for FakeSgsn {
    fn find_ms(&self, _urnti: URnti) -> Option<UeHandle> {
        Some(UeHandle(1))
    }

    fn allocate_rab_for_pdp(
        &mut self,
        urnti: URnti,
        rb_id: RbId,
        qos: QosBytesPerSec,
    ) -> RabStatus {
        self.allocations.push((urnti, rb_id, qos));
        RabStatus::RabPending
    }

    fn start_integrity_protection(&mut self, _urnti: URnti, _kc: [u8; 16]) {}

    fn write_high_side(&mut self, urnti: URnti, rb_id: RbId, bytes: Vec<u8>, _descr: &str) {
        self.delivered.push((urnti, rb_id, bytes));
    }

    fn notify_rab_status(&mut self, urnti: URnti, rb_id: RbId, status: RabStatus) {
        self.notifications.push((urnti, rb_id, status));
    }
}
