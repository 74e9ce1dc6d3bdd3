use near_sdk::{near, AccountId, BlockHeight, NearToken};

use crate::error::EscrowError;
use crate::expiry::Expiry;

// Index of a deal in the registry. Dense and never reused.
pub type DealId = u32;

/// Longest `deal_type` or `opportunity_name` accepted, in bytes.
pub const MAX_TEXT_LEN: usize = 256;

#[near(serializers = [json, borsh])]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DealStatus {
    Open,
    Taken,
    Settled,
}

/// Privileged roles checked by the registry guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Attestor,
}

impl Role {
    pub fn denial(&self) -> &'static str {
        match self {
            Role::Admin => "Only the contract admin can swap the attestor",
            Role::Attestor => "Only the attestor can extend the expiry",
        }
    }
}

/// One OTC trade held in escrow.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq)]
pub struct Deal {
    pub id: DealId,
    pub deal_type: String,
    pub opportunity_name: String,
    pub seller: AccountId,
    pub buyer: Option<AccountId>,
    pub attestor: Option<AccountId>,
    pub seller_deposit: NearToken,
    pub buyer_deposit: NearToken,
    pub expiry_block: Expiry,
    pub status: DealStatus,

    // Set once a refund was initiated. A refunded deal is never taken again.
    pub refunded: bool,
    pub created_at_block: BlockHeight,
}

/// What a seller declares when posting an offer.
#[derive(Clone, Debug, PartialEq)]
pub struct OfferTerms {
    pub deal_type: String,
    pub opportunity_name: String,
    pub expiry_block: BlockHeight,
    pub seller_deposit: NearToken,
}

/// The two payouts a refund owes, captured before the deposits are zeroed.
#[near(serializers = [json])]
#[derive(Clone, Debug, PartialEq)]
pub struct RefundLegs {
    pub seller: AccountId,
    pub seller_amount: NearToken,
    pub buyer: AccountId,
    pub buyer_amount: NearToken,
}

impl Deal {
    /// Opens a new offer.
    ///
    /// The attached value must equal the declared deposit plus the flat storage
    /// fee, exactly. Only the deposit is escrowed; the fee pays for the record.
    pub fn open(
        id: DealId,
        seller: AccountId,
        terms: OfferTerms,
        attached: NearToken,
        storage_fee: NearToken,
        now: BlockHeight,
    ) -> Result<Self, EscrowError> {
        if terms.deal_type.len() > MAX_TEXT_LEN || terms.opportunity_name.len() > MAX_TEXT_LEN {
            return Err(EscrowError::DescriptionTooLong);
        }
        let owed = terms
            .seller_deposit
            .checked_add(storage_fee)
            .ok_or(EscrowError::InvalidDeposit)?;
        if attached != owed {
            return Err(EscrowError::InvalidDeposit);
        }
        Ok(Self {
            id,
            deal_type: terms.deal_type,
            opportunity_name: terms.opportunity_name,
            seller,
            buyer: None,
            attestor: None,
            seller_deposit: terms.seller_deposit,
            buyer_deposit: NearToken::from_yoctonear(0),
            expiry_block: Expiry::new(terms.expiry_block),
            status: DealStatus::Open,
            refunded: false,
            created_at_block: now,
        })
    }

    /// Total value currently held in escrow for this deal.
    pub fn escrowed(&self) -> NearToken {
        self.seller_deposit.saturating_add(self.buyer_deposit)
    }

    pub fn is_available(&self) -> bool {
        self.status == DealStatus::Open && !self.refunded
    }

    pub fn ensure_attestor(&self, caller: &AccountId) -> Result<(), EscrowError> {
        match &self.attestor {
            Some(attestor) if attestor == caller => Ok(()),
            _ => Err(EscrowError::Unauthorized(Role::Attestor)),
        }
    }

    fn ensure_taken(&self) -> Result<(), EscrowError> {
        if self.status == DealStatus::Taken {
            Ok(())
        } else {
            Err(EscrowError::DealNotTaken)
        }
    }

    /// Buyer side of the trade: deposits must mirror the seller's.
    pub fn take(&mut self, buyer: AccountId, attached: NearToken) -> Result<(), EscrowError> {
        if !self.is_available() {
            return Err(EscrowError::DealNotAvailable);
        }
        if attached != self.seller_deposit {
            return Err(EscrowError::InvalidDeposit);
        }
        self.buyer = Some(buyer);
        self.buyer_deposit = attached;
        self.status = DealStatus::Taken;
        Ok(())
    }

    /// Marks the deal settled and returns the amount owed to the seller.
    ///
    /// Deposits stay recorded as the historical trade amounts. A deal with a
    /// refund in progress is not settleable.
    pub fn settle(&mut self) -> Result<NearToken, EscrowError> {
        self.ensure_taken()?;
        if self.refunded {
            return Err(EscrowError::DealNotTaken);
        }
        self.status = DealStatus::Settled;
        Ok(self.escrowed())
    }

    /// Undo of `settle` after the payout could not be delivered.
    pub fn revert_settlement(&mut self) {
        if self.status == DealStatus::Settled {
            self.status = DealStatus::Taken;
        }
    }

    pub fn swap_attestor(&mut self, new_attestor: AccountId) {
        self.attestor = Some(new_attestor);
    }

    pub fn extend_expiry(
        &mut self,
        caller: &AccountId,
        new_expiry_block: BlockHeight,
    ) -> Result<(), EscrowError> {
        self.ensure_attestor(caller)?;
        self.ensure_taken()?;
        self.expiry_block.extend_to(new_expiry_block)
    }

    /// Empties the escrow once the expiry block has been reached.
    ///
    /// The deal falls back to the `Open` shape with zero deposits and no buyer,
    /// flagged as refunded so it cannot be taken again.
    pub fn refund(&mut self, now: BlockHeight) -> Result<RefundLegs, EscrowError> {
        self.ensure_taken()?;
        self.expiry_block.ensure_refund_window(now)?;
        let Some(buyer) = self.buyer.take() else {
            near_sdk::env::panic_str("Taken deal without a buyer");
        };
        let legs = RefundLegs {
            seller: self.seller.clone(),
            seller_amount: self.seller_deposit,
            buyer,
            buyer_amount: self.buyer_deposit,
        };
        self.seller_deposit = NearToken::from_yoctonear(0);
        self.buyer_deposit = NearToken::from_yoctonear(0);
        self.status = DealStatus::Open;
        self.refunded = true;
        Ok(legs)
    }

    /// Writes back the refund legs that could not be delivered.
    ///
    /// The deal returns to `Taken` so the remaining legs can be refunded again;
    /// it stays flagged as refunded and therefore cannot be settled.
    pub fn restore_refund(&mut self, legs: &RefundLegs, seller_failed: bool, buyer_failed: bool) {
        if !seller_failed && !buyer_failed {
            return;
        }
        if seller_failed {
            self.seller_deposit = self.seller_deposit.saturating_add(legs.seller_amount);
        }
        if buyer_failed {
            self.buyer_deposit = self.buyer_deposit.saturating_add(legs.buyer_amount);
        }
        self.buyer = Some(legs.buyer.clone());
        self.status = DealStatus::Taken;
    }
}
