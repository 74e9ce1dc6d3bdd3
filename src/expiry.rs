use near_sdk::{near, BlockHeight};

use crate::error::EscrowError;

/// The block height at which a taken deal becomes refundable.
///
/// Only ever moves forward: the attestor may push it out, never pull it in.
#[near(serializers = [json, borsh])]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Expiry(pub BlockHeight);

impl Expiry {
    pub fn new(expiry_block: BlockHeight) -> Self {
        Self(expiry_block)
    }

    pub fn block(&self) -> BlockHeight {
        self.0
    }

    /// True once `now` has reached the expiry block.
    pub fn has_passed(&self, now: BlockHeight) -> bool {
        now >= self.0
    }

    /// Checks the refund window is open at `now`.
    pub fn ensure_refund_window(&self, now: BlockHeight) -> Result<(), EscrowError> {
        if self.has_passed(now) {
            Ok(())
        } else {
            Err(EscrowError::DealNotExpired)
        }
    }

    /// Moves the expiry to `new_block`; an earlier block is rejected.
    pub fn extend_to(&mut self, new_block: BlockHeight) -> Result<(), EscrowError> {
        if new_block < self.0 {
            return Err(EscrowError::InvalidExpiry);
        }
        self.0 = new_block;
        Ok(())
    }
}
