//! Integrity protection for downlink DCCH RRC messages (§4.6).
//!
//! F9 in the real stack is a KASUMI-based MAC function over (COUNT-I,
//! message, direction, fresh, bearer). This core does not implement
//! KASUMI — that's cryptographic machinery entirely orthogonal to the
//! radio-control logic this crate is about — and instead keys a
//! `core::hash::Hash`-based MAC with the same five inputs, satisfying the
//! same shape (32-bit authentication code, struck to zero, recomputed,
//! written back) and the same monotonicity property (§8 "Integrity
//! monotonicity").

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::types::RbId;

/// Per-bearer RRC-SN width: 4 bits (§4.6).
const RRC_SN_BITS: u32 = 4;
const RRC_SN_MODULUS: u32 = 1 << RRC_SN_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Uplink,
    Downlink,
}

/// `FRESH`, derived from a counter seeded at `SecurityModeCommand` time
/// rather than randomness (`original_source/UMTS/AsnHelper.cpp`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshGenerator {
    next: u32,
}

impl FreshGenerator {
    pub fn seeded(seed: u32) -> Self {
        Self { next: seed }
    }

    pub fn next(&mut self) -> u32 {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        value
    }
}

/// COUNT-I bookkeeping for one signalling bearer: `(HFN << sn_bits) |
/// RRC-SN` (§4.6), advancing the RRC-SN once per protected message and
/// the HFN once per completed RLC-AM RESET (§8 "Reset idempotence").
#[derive(Debug, Clone, Copy)]
pub struct BearerCounter {
    rb: RbId,
    hfn: u32,
    rrc_sn: u32,
}

impl BearerCounter {
    pub fn new(rb: RbId) -> Self {
        Self {
            rb,
            hfn: 0,
            rrc_sn: 0,
        }
    }

    pub fn rb(&self) -> RbId {
        self.rb
    }

    /// `COUNT-I` for the *next* message to protect, without consuming it.
    pub fn peek_count(&self) -> u32 {
        (self.hfn << RRC_SN_BITS) | self.rrc_sn
    }

    /// Advances the RRC-SN by one protected message, rolling the HFN
    /// forward on wraparound so COUNT-I keeps increasing (§3 invariant iv).
    fn advance(&mut self) {
        self.rrc_sn += 1;
        if self.rrc_sn >= RRC_SN_MODULUS {
            self.rrc_sn = 0;
            self.hfn = self.hfn.wrapping_add(1);
        }
    }

    /// Bumps the HFN after a completed RLC-AM RESET on this bearer
    /// (§8 "after a successful RESET exchange ... HFN advanced by one"),
    /// independent of RRC-SN wraparound.
    pub fn bump_hfn_on_reset(&mut self) {
        self.hfn = self.hfn.wrapping_add(1);
        self.rrc_sn = 0;
    }

    /// Resets to zero; only legal when the owning UE re-enters idle
    /// (§3 invariant iv).
    pub fn reset_to_idle(&mut self) {
        self.hfn = 0;
        self.rrc_sn = 0;
    }
}

fn f9(count: u32, message: &[u8], direction: Direction, fresh: u32, bearer: RbId) -> u32 {
    let mut hasher = DefaultHasher::new();
    count.hash(&mut hasher);
    message.hash(&mut hasher);
    matches!(direction, Direction::Uplink).hash(&mut hasher);
    fresh.hash(&mut hasher);
    bearer.get().hash(&mut hasher);
    (hasher.finish() & 0xffff_ffff) as u32
}

/// One signalling bearer's protected-encode context: the counter plus the
/// session-wide key material (§4.6).
pub struct IntegrityContext {
    counter: BearerCounter,
    fresh: u32,
}

impl IntegrityContext {
    pub fn new(rb: RbId, fresh: u32) -> Self {
        Self {
            counter: BearerCounter::new(rb),
            fresh,
        }
    }

    pub fn counter(&self) -> &BearerCounter {
        &self.counter
    }

    pub fn counter_mut(&mut self) -> &mut BearerCounter {
        &mut self.counter
    }

    /// Protects `message` per §4.6's two-pass recipe: the MAC-I slot is
    /// zeroed for the first encode pass, computed over those bytes, then
    /// written back by the caller's re-encode. Here `message` already
    /// carries the zeroed slot; this returns the MAC-I to splice in, and
    /// advances COUNT-I for the next message.
    pub fn protect(&mut self, message: &[u8], direction: Direction) -> u32 {
        let count = self.counter.peek_count();
        let mac = f9(count, message, direction, self.fresh, self.counter.rb);
        self.counter.advance();
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_strictly_increases_across_protected_messages() {
        let mut ctx = IntegrityContext::new(RbId::SRB2, 7);
        let mut prev = ctx.counter().peek_count();
        for _ in 0..40 {
            ctx.protect(b"hello", Direction::Downlink);
            let now = ctx.counter().peek_count();
            assert!(now > prev, "count must strictly increase: {prev} -> {now}");
            prev = now;
        }
    }

    #[test]
    fn hfn_advances_on_rrc_sn_wraparound() {
        let mut counter = BearerCounter::new(RbId::SRB2);
        for _ in 0..RRC_SN_MODULUS {
            counter.advance();
        }
        assert_eq!(counter.hfn, 1);
        assert_eq!(counter.rrc_sn, 0);
    }

    #[test]
    fn reset_bumps_hfn_independent_of_sn_position() {
        let mut counter = BearerCounter::new(RbId::SRB2);
        counter.advance();
        counter.advance();
        let before = counter.hfn;
        counter.bump_hfn_on_reset();
        assert_eq!(counter.hfn, before + 1);
        assert_eq!(counter.rrc_sn, 0);
    }

    #[test]
    fn idle_reset_zeroes_the_counter() {
        let mut counter = BearerCounter::new(RbId::SRB2);
        counter.bump_hfn_on_reset();
        counter.advance();
        counter.reset_to_idle();
        assert_eq!(counter.peek_count(), 0);
    }

    #[test]
    fn mac_differs_when_direction_differs() {
        let mut up = IntegrityContext::new(RbId::SRB2, 1);
        let mut down = IntegrityContext::new(RbId::SRB2, 1);
        let a = up.protect(b"msg", Direction::Uplink);
        let b = down.protect(b"msg", Direction::Downlink);
        assert_ne!(a, b);
    }
}
