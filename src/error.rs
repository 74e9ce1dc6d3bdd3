use near_sdk::FunctionError;
use thiserror::Error;

use crate::deal::Role;

/// Every way a caller can be turned away by the registry.
///
/// Returned from `#[handle_result]` methods; the runtime aborts the receipt
/// with the error message, which reverts state and refunds any attached deposit.
#[derive(Debug, Clone, PartialEq, Eq, Error, FunctionError)]
pub enum EscrowError {
    #[error("Invalid deal ID")]
    DealNotFound,

    #[error("Deal not available")]
    DealNotAvailable,

    #[error("Deal not taken")]
    DealNotTaken,

    #[error("Deal has not expired yet")]
    DealNotExpired,

    #[error("Attached deposit does not match the required amount")]
    InvalidDeposit,

    #[error("Deal description exceeds 256 bytes")]
    DescriptionTooLong,

    #[error("{}", .0.denial())]
    Unauthorized(Role),

    #[error("Expiry can only be extended")]
    InvalidExpiry,
}
