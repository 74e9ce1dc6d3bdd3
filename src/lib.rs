use near_sdk::store::Vector;
use near_sdk::{
    env, ext_contract, near, require, AccountId, BlockHeight, Gas, NearToken, PanicOnDefault,
    Promise, PromiseResult,
};

mod deal;
mod error;
mod expiry;
mod utils;

pub use deal::{Deal, DealId, DealStatus, OfferTerms, RefundLegs, Role, MAX_TEXT_LEN};
pub use error::EscrowError;
pub use expiry::Expiry;

use utils::log_deal_event;

const CALLBACK_GAS: Gas = Gas::from_tgas(10);
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on the bytes one deal record can ever occupy, buyer and
/// attestor included, with both descriptions at `MAX_TEXT_LEN`.
pub const MAX_DEAL_STORAGE_BYTES: u64 = 1_000;

/// Flat fee a seller pays on top of the deposit for the deal's storage.
pub fn offer_storage_fee() -> NearToken {
    env::storage_byte_cost().saturating_mul(u128::from(MAX_DEAL_STORAGE_BYTES))
}

#[ext_contract(ext_self)]
pub trait SelfCallbacks {
    fn on_deal_settled(&mut self, deal_id: DealId);
    fn on_deal_refunded(&mut self, deal_id: DealId, legs: RefundLegs);
}

// Define the contract structure
#[near(contract_state)]
#[derive(PanicOnDefault)]
pub struct Contract {
    // Fixed at construction, never reassigned.
    pub admin: AccountId,
    // Every deal ever posted, indexed by DealId.
    pub deals: Vector<Deal>,
}

impl Contract {
    fn with_admin(admin: AccountId) -> Self {
        Self {
            admin,
            deals: Vector::new(b"d"),
        }
    }

    fn ensure_admin(&self, caller: &AccountId) -> Result<(), EscrowError> {
        if caller == &self.admin {
            Ok(())
        } else {
            Err(EscrowError::Unauthorized(Role::Admin))
        }
    }

    fn deal_mut(&mut self, deal_id: DealId) -> Result<&mut Deal, EscrowError> {
        self.deals.get_mut(deal_id).ok_or(EscrowError::DealNotFound)
    }
}

#[near]
impl Contract {
    /// Only the contract account itself may initialize, normally in the
    /// deploy batch. `admin` is fixed for the lifetime of the registry.
    #[init]
    #[private]
    pub fn new(admin: AccountId) -> Self {
        Self::with_admin(admin)
    }

    /// Posts a new offer. The attached deposit must equal `seller_deposit`
    /// plus `get_storage_fee()` exactly; only `seller_deposit` is escrowed.
    #[payable]
    #[handle_result]
    pub fn post_offer(
        &mut self,
        deal_type: String,
        opportunity_name: String,
        expiry_block: BlockHeight,
        seller_deposit: NearToken,
    ) -> Result<DealId, EscrowError> {
        let seller = env::predecessor_account_id();
        let deal_id = self.deals.len();
        let terms = OfferTerms {
            deal_type,
            opportunity_name,
            expiry_block,
            seller_deposit,
        };
        let deal = Deal::open(
            deal_id,
            seller.clone(),
            terms,
            env::attached_deposit(),
            offer_storage_fee(),
            env::block_height(),
        )?;

        let storage_before = env::storage_usage();
        self.deals.push(deal);
        self.deals.flush();
        require!(
            env::storage_usage().saturating_sub(storage_before) <= MAX_DEAL_STORAGE_BYTES,
            "Deal record exceeds its storage allowance"
        );

        log_deal_event("POSTED", deal_id, &seller, seller_deposit);
        Ok(deal_id)
    }

    /// Accepts an open offer by attaching a deposit equal to the seller's.
    #[payable]
    #[handle_result]
    pub fn take_offer(&mut self, deal_id: DealId) -> Result<(), EscrowError> {
        let buyer = env::predecessor_account_id();
        let attached = env::attached_deposit();
        self.deal_mut(deal_id)?.take(buyer.clone(), attached)?;

        log_deal_event("TAKEN", deal_id, &buyer, attached);
        Ok(())
    }

    /// Releases both deposits of a taken deal to the seller.
    /// Anyone may trigger settlement once the deal is taken.
    #[handle_result]
    pub fn settle_trade(&mut self, deal_id: DealId) -> Result<Promise, EscrowError> {
        let deal = self.deal_mut(deal_id)?;
        let payout = deal.settle()?;
        let seller = deal.seller.clone();

        log_deal_event(
            "SETTLEMENT_STARTED",
            deal_id,
            &env::predecessor_account_id(),
            payout,
        );

        Ok(Promise::new(seller).transfer(payout).then(
            ext_self::ext(env::current_account_id())
                .with_static_gas(CALLBACK_GAS)
                .on_deal_settled(deal_id),
        ))
    }

    /// Reassigns the attestor of a deal. Admin only, valid in any status.
    #[handle_result]
    pub fn swap_attestor(
        &mut self,
        deal_id: DealId,
        new_attestor: AccountId,
    ) -> Result<(), EscrowError> {
        let caller = env::predecessor_account_id();
        if deal_id >= self.deals.len() {
            return Err(EscrowError::DealNotFound);
        }
        self.ensure_admin(&caller)?;

        self.deal_mut(deal_id)?.swap_attestor(new_attestor.clone());
        env::log_str(&format!(
            "DEAL_ATTESTOR_SWAPPED: deal_id='{}', actor='{}', attestor='{}'",
            deal_id, caller, new_attestor
        ));
        Ok(())
    }

    /// Pushes the expiry of a taken deal further out. Attestor only.
    #[handle_result]
    pub fn extend_expiry(
        &mut self,
        deal_id: DealId,
        new_expiry_block: BlockHeight,
    ) -> Result<(), EscrowError> {
        let caller = env::predecessor_account_id();
        self.deal_mut(deal_id)?
            .extend_expiry(&caller, new_expiry_block)?;

        env::log_str(&format!(
            "DEAL_EXPIRY_EXTENDED: deal_id='{}', actor='{}', expiry_block='{}'",
            deal_id, caller, new_expiry_block
        ));
        Ok(())
    }

    /// Returns each party's deposit once the expiry block has been reached.
    #[handle_result]
    pub fn refund(&mut self, deal_id: DealId) -> Result<Promise, EscrowError> {
        let legs = self.deal_mut(deal_id)?.refund(env::block_height())?;

        log_deal_event(
            "REFUND_STARTED",
            deal_id,
            &env::predecessor_account_id(),
            legs.seller_amount.saturating_add(legs.buyer_amount),
        );

        let seller_transfer = Promise::new(legs.seller.clone()).transfer(legs.seller_amount);
        let buyer_transfer = Promise::new(legs.buyer.clone()).transfer(legs.buyer_amount);

        Ok(seller_transfer.and(buyer_transfer).then(
            ext_self::ext(env::current_account_id())
                .with_static_gas(CALLBACK_GAS)
                .on_deal_refunded(deal_id, legs),
        ))
    }

    // --- VIEWS ---

    pub fn get_admin(&self) -> AccountId {
        self.admin.clone()
    }

    pub fn get_deal(&self, deal_id: DealId) -> Option<Deal> {
        self.deals.get(deal_id).cloned()
    }

    pub fn get_storage_fee(&self) -> NearToken {
        offer_storage_fee()
    }

    pub fn get_deal_count(&self) -> u32 {
        self.deals.len()
    }

    pub fn get_deals(&self, from_index: Option<u32>, limit: Option<u32>) -> Vec<Deal> {
        let from = from_index.unwrap_or(0) as usize;
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE) as usize;
        self.deals.iter().skip(from).take(limit).cloned().collect()
    }

    // --- PRIVATE CALLBACKS ---

    #[private]
    pub fn on_deal_settled(&mut self, deal_id: DealId) {
        let Some(deal) = self.deals.get_mut(deal_id) else {
            env::panic_str("Settled deal vanished");
        };
        let seller = deal.seller.clone();
        let payout = deal.escrowed();

        if let PromiseResult::Successful(_) = env::promise_result(0) {
            log_deal_event("SETTLED", deal_id, &seller, payout);
        } else {
            // Payout bounced back to the contract, let the deal be settled again.
            deal.revert_settlement();
            log_deal_event("SETTLEMENT_FAILED", deal_id, &seller, payout);
        }
    }

    #[private]
    pub fn on_deal_refunded(&mut self, deal_id: DealId, legs: RefundLegs) {
        let seller_failed = !matches!(env::promise_result(0), PromiseResult::Successful(_));
        let buyer_failed = !matches!(env::promise_result(1), PromiseResult::Successful(_));

        let Some(deal) = self.deals.get_mut(deal_id) else {
            env::panic_str("Refunded deal vanished");
        };
        deal.restore_refund(&legs, seller_failed, buyer_failed);

        if seller_failed {
            log_deal_event("REFUND_FAILED", deal_id, &legs.seller, legs.seller_amount);
        }
        if buyer_failed {
            log_deal_event("REFUND_FAILED", deal_id, &legs.buyer, legs.buyer_amount);
        }
        if !seller_failed && !buyer_failed {
            log_deal_event(
                "REFUNDED",
                deal_id,
                &legs.seller,
                legs.seller_amount.saturating_add(legs.buyer_amount),
            );
        }
    }
}
