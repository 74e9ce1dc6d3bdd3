use near_sdk::{env, AccountId, NearToken};

use crate::deal::DealId;

// Helper for consistent logging
pub fn log_deal_event(event: &str, deal_id: DealId, actor: &AccountId, amount: NearToken) {
    env::log_str(&format!(
        "DEAL_{}: deal_id='{}', actor='{}', amount='{}'",
        event,
        deal_id,
        actor,
        amount.as_yoctonear()
    ));
}
