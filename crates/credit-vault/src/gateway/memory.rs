//! in-memory collaborators for testing and scenario replay
//!
//! no external protocol behind any of these. state sits behind shared
//! `Arc<RwLock<..>>` handles, so a clone handed to the vault and a clone kept
//! by the test observe and drive the same books.
//!
//! the pool is a single-client model: the account named in a call both pays
//! and is credited, which is how the vault uses it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{AssetToken, PoolGateway, PriceOracle};
use crate::risk::HealthFactor;
use crate::scaling::{narrow, value_of, weighted_value_of, ASSET_DECIMALS, BPS, U256};
use crate::types::{
    Account, AccountSummary, Amount, AssetId, Bps, RateMode, ReserveConfiguration, ReserveMetadata,
};

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Default)]
struct TokenBook {
    balances: HashMap<(AssetId, Account), Amount>,
    allowances: HashMap<(AssetId, Account, Account), Amount>,
}

impl TokenBook {
    fn balance(&self, token: AssetId, holder: Account) -> Amount {
        self.balances.get(&(token, holder)).copied().unwrap_or(0)
    }

    fn debit(&mut self, token: AssetId, holder: Account, amount: Amount) -> GatewayResult<()> {
        let available = self.balance(token, holder);
        if available < amount {
            return Err(GatewayError::InsufficientBalance {
                token,
                holder,
                available,
                required: amount,
            });
        }
        self.balances.insert((token, holder), available - amount);
        Ok(())
    }

    fn credit(&mut self, token: AssetId, holder: Account, amount: Amount) -> GatewayResult<()> {
        let balance = self
            .balance(token, holder)
            .checked_add(amount)
            .ok_or_else(|| GatewayError::Rejected(format!("balance overflow on {token}")))?;
        self.balances.insert((token, holder), balance);
        Ok(())
    }
}

/// shared token ledger for any number of token ids
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokens {
    book: Arc<RwLock<TokenBook>>,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// create `amount` of `token` out of thin air
    pub fn mint(&self, token: AssetId, to: Account, amount: Amount) -> GatewayResult<()> {
        self.book.write().credit(token, to, amount)
    }

    /// destroy `amount` of `token` held by `from`
    pub fn burn(&self, token: AssetId, from: Account, amount: Amount) -> GatewayResult<()> {
        self.book.write().debit(token, from, amount)
    }

    fn balance(&self, token: AssetId, holder: Account) -> Amount {
        self.book.read().balance(token, holder)
    }

    pub fn allowance(&self, token: AssetId, owner: Account, spender: Account) -> Amount {
        self.book
            .read()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(0)
    }

    /// every non-zero balance of `token`
    pub fn holders(&self, token: AssetId) -> Vec<(Account, Amount)> {
        let book = self.book.read();
        let mut holders: Vec<_> = book
            .balances
            .iter()
            .filter(|((t, _), amount)| *t == token && **amount > 0)
            .map(|((_, holder), amount)| (*holder, *amount))
            .collect();
        holders.sort();
        holders
    }
}

impl AssetToken for InMemoryTokens {
    fn balance_of(&self, token: AssetId, holder: Account) -> GatewayResult<Amount> {
        Ok(self.book.read().balance(token, holder))
    }

    fn transfer(&self, token: AssetId, from: Account, to: Account, amount: Amount) -> GatewayResult<()> {
        let mut book = self.book.write();
        book.debit(token, from, amount)?;
        book.credit(token, to, amount)
    }

    fn transfer_from(
        &self,
        token: AssetId,
        spender: Account,
        owner: Account,
        to: Account,
        amount: Amount,
    ) -> GatewayResult<()> {
        let mut book = self.book.write();
        let allowed = book
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(0);
        if allowed < amount {
            return Err(GatewayError::InsufficientAllowance {
                token,
                owner,
                spender,
                available: allowed,
                required: amount,
            });
        }
        book.debit(token, owner, amount)?;
        book.credit(token, to, amount)?;
        book.allowances.insert((token, owner, spender), allowed - amount);
        Ok(())
    }

    fn approve(&self, token: AssetId, owner: Account, spender: Account, amount: Amount) -> GatewayResult<()> {
        self.book.write().allowances.insert((token, owner, spender), amount);
        Ok(())
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// fixed prices set by hand
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    prices: Arc<RwLock<HashMap<AssetId, u128>>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// set price (base currency, 8 decimals)
    pub fn set_price(&self, asset: AssetId, price: u128) {
        self.prices.write().insert(asset, price);
    }
}

impl PriceOracle for StaticOracle {
    fn price(&self, asset: AssetId) -> GatewayResult<u128> {
        match self.prices.read().get(&asset) {
            Some(&price) if price > 0 => Ok(price),
            _ => Err(GatewayError::PriceUnavailable(asset)),
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

const CUSTODY_TAG: u8 = 0xAA;
const DEBT_TAG: u8 = 0xDD;

fn tagged(asset: AssetId, tag: u8) -> AssetId {
    let mut bytes = asset.0;
    bytes[0] = tag;
    AssetId(bytes)
}

#[derive(Debug, Default)]
struct Reserves {
    metadata: HashMap<AssetId, ReserveMetadata>,
    order: Vec<AssetId>,
}

/// lending pool double
///
/// underlying liquidity sits in the pool's own account. supplying mints
/// custody tokens 1:1, borrowing mints debt tokens 1:1, and
/// [`InMemoryPool::accrue_interest`] grows both by a fixed rate.
#[derive(Debug, Clone)]
pub struct InMemoryPool {
    account: Account,
    tokens: InMemoryTokens,
    oracle: StaticOracle,
    reserves: Arc<RwLock<Reserves>>,
}

impl InMemoryPool {
    pub fn new(account: Account, tokens: InMemoryTokens, oracle: StaticOracle) -> Self {
        Self {
            account,
            tokens,
            oracle,
            reserves: Arc::new(RwLock::new(Reserves::default())),
        }
    }

    /// pool account (the spender the vault approves)
    pub fn account(&self) -> Account {
        self.account
    }

    /// list a reserve for `asset` with 18 decimals, active, borrowing enabled
    pub fn add_reserve(&self, asset: AssetId, ltv: Bps, liquidation_threshold: Bps) -> ReserveMetadata {
        let configuration = ReserveConfiguration::new()
            .with_ltv(ltv)
            .with_liquidation_threshold(liquidation_threshold)
            .with_liquidation_bonus(10_500)
            .with_decimals(ASSET_DECIMALS)
            .with_active(true)
            .with_borrowing_enabled(true);
        self.set_reserve(asset, configuration)
    }

    /// list or replace a reserve with an arbitrary configuration word
    pub fn set_reserve(&self, asset: AssetId, configuration: ReserveConfiguration) -> ReserveMetadata {
        let metadata = ReserveMetadata {
            custody_token: tagged(asset, CUSTODY_TAG),
            debt_token: tagged(asset, DEBT_TAG),
            configuration,
        };
        let mut reserves = self.reserves.write();
        if reserves.metadata.insert(asset, metadata).is_none() {
            reserves.order.push(asset);
        }
        metadata
    }

    pub fn set_frozen(&self, asset: AssetId, frozen: bool) -> GatewayResult<()> {
        let mut reserves = self.reserves.write();
        let metadata = reserves
            .metadata
            .get_mut(&asset)
            .ok_or(GatewayError::ReserveNotFound(asset))?;
        metadata.configuration = metadata.configuration.with_frozen(frozen);
        Ok(())
    }

    /// grow every custody and debt balance of `asset` by `rate_bps`
    ///
    /// the extra underlying backing supplier interest is minted into the
    /// pool so withdrawals of accrued interest stay liquid.
    pub fn accrue_interest(&self, asset: AssetId, rate_bps: Bps) -> GatewayResult<()> {
        let metadata = self.metadata(asset)?;
        let mut minted_to_suppliers: Amount = 0;

        for (holder, balance) in self.tokens.holders(metadata.custody_token) {
            let interest = balance.saturating_mul(rate_bps as u128) / BPS;
            self.tokens.mint(metadata.custody_token, holder, interest)?;
            minted_to_suppliers = minted_to_suppliers.saturating_add(interest);
        }
        for (holder, balance) in self.tokens.holders(metadata.debt_token) {
            let interest = balance.saturating_mul(rate_bps as u128) / BPS;
            self.tokens.mint(metadata.debt_token, holder, interest)?;
        }

        self.tokens.mint(asset, self.account, minted_to_suppliers)
    }

    /// credit custody tokens to `holder` without any underlying moving
    ///
    /// models a direct donation into the vault's custodied balance.
    pub fn donate(&self, asset: AssetId, holder: Account, amount: Amount) -> GatewayResult<()> {
        let metadata = self.metadata(asset)?;
        self.tokens.mint(metadata.custody_token, holder, amount)?;
        self.tokens.mint(asset, self.account, amount)
    }

    /// underlying held by the pool for `asset`
    pub fn liquidity(&self, asset: AssetId) -> Amount {
        self.tokens.balance(asset, self.account)
    }

    fn metadata(&self, asset: AssetId) -> GatewayResult<ReserveMetadata> {
        self.reserves
            .read()
            .metadata
            .get(&asset)
            .copied()
            .ok_or(GatewayError::ReserveNotFound(asset))
    }

    fn require_open(&self, asset: AssetId) -> GatewayResult<ReserveMetadata> {
        let metadata = self.metadata(asset)?;
        let config = metadata.configuration;
        if !config.is_active() {
            return Err(GatewayError::Rejected(format!("reserve {asset} is inactive")));
        }
        if config.is_frozen() {
            return Err(GatewayError::ReserveFrozen(asset));
        }
        Ok(metadata)
    }

    fn require_liquidity(&self, asset: AssetId, amount: Amount) -> GatewayResult<()> {
        let available = self.liquidity(asset);
        if available < amount {
            return Err(GatewayError::InsufficientLiquidity {
                asset,
                available,
                requested: amount,
            });
        }
        Ok(())
    }
}

impl PoolGateway for InMemoryPool {
    fn supply(&self, asset: AssetId, amount: Amount, on_behalf_of: Account) -> GatewayResult<()> {
        let metadata = self.require_open(asset)?;
        self.tokens
            .transfer_from(asset, self.account, on_behalf_of, self.account, amount)?;
        self.tokens.mint(metadata.custody_token, on_behalf_of, amount)
    }

    fn withdraw(&self, asset: AssetId, amount: Amount, to: Account) -> GatewayResult<Amount> {
        let metadata = self.metadata(asset)?;
        self.require_liquidity(asset, amount)?;
        self.tokens.burn(metadata.custody_token, to, amount)?;
        self.tokens.transfer(asset, self.account, to, amount)?;
        Ok(amount)
    }

    fn borrow(
        &self,
        asset: AssetId,
        amount: Amount,
        rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<()> {
        if rate_mode != RateMode::Variable {
            return Err(GatewayError::Rejected(format!(
                "rate mode {} not offered",
                rate_mode.code()
            )));
        }
        let metadata = self.require_open(asset)?;
        if !metadata.configuration.borrowing_enabled() {
            return Err(GatewayError::Rejected(format!("borrowing disabled on {asset}")));
        }
        self.require_liquidity(asset, amount)?;
        self.tokens.mint(metadata.debt_token, on_behalf_of, amount)?;
        self.tokens.transfer(asset, self.account, on_behalf_of, amount)
    }

    fn repay(
        &self,
        asset: AssetId,
        amount: Amount,
        _rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<Amount> {
        let metadata = self.metadata(asset)?;
        let owed = self.tokens.balance(metadata.debt_token, on_behalf_of);
        let repaid = amount.min(owed);
        self.tokens
            .transfer_from(asset, self.account, on_behalf_of, self.account, repaid)?;
        self.tokens.burn(metadata.debt_token, on_behalf_of, repaid)?;
        Ok(repaid)
    }

    fn reserve_metadata(&self, asset: AssetId) -> GatewayResult<ReserveMetadata> {
        self.metadata(asset)
    }

    fn account_summary(&self, account: Account) -> GatewayResult<AccountSummary> {
        let reserves: Vec<(AssetId, ReserveMetadata)> = {
            let reserves = self.reserves.read();
            reserves
                .order
                .iter()
                .filter_map(|asset| reserves.metadata.get(asset).map(|m| (*asset, *m)))
                .collect()
        };

        let mut collateral = U256::zero();
        let mut ltv_weighted = U256::zero();
        let mut threshold_weighted = U256::zero();
        let mut debt = U256::zero();

        for (asset, metadata) in reserves {
            let supplied = self.tokens.balance(metadata.custody_token, account);
            let borrowed = self.tokens.balance(metadata.debt_token, account);
            if supplied == 0 && borrowed == 0 {
                continue;
            }
            let price = self.oracle.price(asset)?;
            let config = metadata.configuration;

            collateral = collateral.saturating_add(value_of(supplied, price).map_err(overflow)?);
            ltv_weighted = ltv_weighted
                .saturating_add(weighted_value_of(supplied, price, config.ltv()).map_err(overflow)?);
            threshold_weighted = threshold_weighted.saturating_add(
                weighted_value_of(supplied, price, config.liquidation_threshold()).map_err(overflow)?,
            );
            debt = debt.saturating_add(value_of(borrowed, price).map_err(overflow)?);
        }

        let average_bps = |weighted: U256| -> GatewayResult<Bps> {
            if collateral.is_zero() {
                return Ok(0);
            }
            let bps = narrow(weighted * U256::from(BPS) / collateral).map_err(overflow)?;
            Ok(bps.min(BPS) as Bps)
        };

        let available = if ltv_weighted > debt {
            ltv_weighted - debt
        } else {
            U256::zero()
        };

        Ok(AccountSummary {
            total_collateral_value: narrow(collateral).map_err(overflow)?,
            total_debt_value: narrow(debt).map_err(overflow)?,
            available_borrow_value: narrow(available).map_err(overflow)?,
            liquidation_threshold: average_bps(threshold_weighted)?,
            ltv: average_bps(ltv_weighted)?,
            health_factor: HealthFactor::from_values(threshold_weighted, debt),
        })
    }
}

fn overflow(err: crate::error::Error) -> GatewayError {
    GatewayError::Rejected(err.to_string())
}
