//! Capability traits for the vault's external collaborators
//!
//! The vault never re-implements lending, pricing or token bookkeeping. It
//! talks to three collaborators:
//!
//! - [`PoolGateway`]: the custodial lending pool (supply, withdraw, borrow,
//!   repay, reserve metadata)
//! - [`PriceOracle`]: per-asset prices in base currency, 8 decimals
//! - [`AssetToken`]: balance/transfer/approve on underlying, custody and
//!   debt tokens
//!
//! All methods take `&self`. Implementations wrapping a remote protocol keep
//! their own synchronisation; a call may run arbitrary code, including code
//! that calls back into the vault.
//!
//! implementations:
//! - memory: in-memory doubles for tests and the scenario runner

#[cfg(feature = "memory")]
pub mod memory;

use crate::error::GatewayResult;
use crate::types::{Account, AccountSummary, Amount, AssetId, RateMode, ReserveMetadata};

/// Custodial lending facility
pub trait PoolGateway: Send + Sync {
    /// Supply `amount` of `asset` pulled from `on_behalf_of`, crediting it
    /// custody tokens
    fn supply(&self, asset: AssetId, amount: Amount, on_behalf_of: Account) -> GatewayResult<()>;

    /// Release `amount` of `asset` to `to`, returning what was actually sent
    fn withdraw(&self, asset: AssetId, amount: Amount, to: Account) -> GatewayResult<Amount>;

    /// Originate a borrow against `on_behalf_of` and send it the funds
    fn borrow(
        &self,
        asset: AssetId,
        amount: Amount,
        rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<()>;

    /// Repay debt of `on_behalf_of`, returning the amount applied
    fn repay(
        &self,
        asset: AssetId,
        amount: Amount,
        rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<Amount>;

    fn reserve_metadata(&self, asset: AssetId) -> GatewayResult<ReserveMetadata>;

    /// Cross-reserve position of `account` as the pool sees it
    fn account_summary(&self, account: Account) -> GatewayResult<AccountSummary>;
}

/// Price source
pub trait PriceOracle: Send + Sync {
    /// Price of one whole unit of `asset` in base currency, 8 decimals
    fn price(&self, asset: AssetId) -> GatewayResult<u128>;
}

/// Fungible token operations, addressed by token id
pub trait AssetToken: Send + Sync {
    fn balance_of(&self, token: AssetId, holder: Account) -> GatewayResult<Amount>;

    fn transfer(&self, token: AssetId, from: Account, to: Account, amount: Amount) -> GatewayResult<()>;

    /// Move `amount` from `owner` to `to` using `spender`'s allowance
    fn transfer_from(
        &self,
        token: AssetId,
        spender: Account,
        owner: Account,
        to: Account,
        amount: Amount,
    ) -> GatewayResult<()>;

    /// Set `spender`'s allowance over `owner`'s balance to `amount`
    fn approve(&self, token: AssetId, owner: Account, spender: Account, amount: Amount) -> GatewayResult<()>;
}
