//! error types for credit-vault

use thiserror::Error;

use crate::risk::HealthFactor;
use crate::types::{Account, Amount, AssetId, RateMode, Shares};

pub type Result<T> = std::result::Result<T, Error>;

/// result alias for calls into external collaborators
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// failures of a vault operation
///
/// every variant aborts the operation it was raised in; no ledger entry is
/// left half-written when one of these surfaces.
#[derive(Debug, Error)]
pub enum Error {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("asset {0} is not supported")]
    AssetNotSupported(AssetId),

    #[error("unsupported interest rate mode: {0:?}")]
    UnsupportedRateMode(RateMode),

    #[error("deposit too small: would mint zero shares")]
    ZeroSharesMinted,

    #[error("withdrawal too small: would burn zero shares")]
    ZeroSharesBurned,

    #[error("insufficient shares: hold {held}, need {required}")]
    InsufficientShares { held: Shares, required: Shares },

    #[error("nothing to withdraw for asset {0}")]
    NothingToWithdraw(AssetId),

    #[error("repay of {requested} exceeds outstanding debt {owed}")]
    RepayExceedsDebt { requested: Amount, owed: Amount },

    #[error("health factor too low: {health_factor} (minimum {minimum})")]
    HealthFactorTooLow {
        health_factor: HealthFactor,
        minimum: HealthFactor,
    },

    #[error("operation re-entered while another operation is in progress")]
    ReentrancyViolation,

    // === administration ===
    #[error("account {0} is not allowed to administer the vault")]
    Unauthorized(Account),

    #[error("invalid loan-to-value: {0} bps exceeds 10000")]
    InvalidLtv(u16),

    #[error("asset {asset} has {decimals} decimals, only {expected} are supported")]
    UnsupportedDecimals {
        asset: AssetId,
        decimals: u8,
        expected: u8,
    },

    #[error("arithmetic overflow or zero divisor")]
    MathOverflow,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// failures reported by the pool, the oracle or a token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("no reserve for asset {0}")]
    ReserveNotFound(AssetId),

    #[error("reserve {0} is frozen")]
    ReserveFrozen(AssetId),

    #[error("insufficient liquidity in reserve {asset}: available {available}, requested {requested}")]
    InsufficientLiquidity {
        asset: AssetId,
        available: Amount,
        requested: Amount,
    },

    #[error("no price for asset {0}")]
    PriceUnavailable(AssetId),

    #[error("insufficient balance of {token} for {holder}: have {available}, need {required}")]
    InsufficientBalance {
        token: AssetId,
        holder: Account,
        available: Amount,
        required: Amount,
    },

    #[error("insufficient allowance of {token} from {owner} to {spender}: have {available}, need {required}")]
    InsufficientAllowance {
        token: AssetId,
        owner: Account,
        spender: Account,
        available: Amount,
        required: Amount,
    },

    #[error("gateway rejected call: {0}")]
    Rejected(String),
}
