//! Vault - coordinates deposit, withdraw, borrow and repay
//!
//! Every operation runs the same protocol under the vault's reentrancy lock:
//!
//! 1. validate inputs and the asset
//! 2. quote the share or principal delta from live pool balances
//! 3. simulate the post-operation health factor (withdraw, borrow, repay)
//! 4. checkpoint and apply the ledger mutation
//! 5. move funds through the pool and token collaborators
//! 6. emit the event
//!
//! If step 5 fails the ledger checkpoint is restored, tokens already moved
//! are sent back where possible, and no event is emitted.
//!
//! The health check in step 3 is binding. It is not repeated after the
//! external calls.
//!
//! No internal lock is held across a call into a collaborator, so a
//! collaborator may read vault views while an operation is in flight. It
//! cannot start another operation: that fails with `ReentrancyViolation`.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::error::{Error, GatewayError, Result};
use crate::events::{EventLog, VaultEvent};
use crate::gateway::{AssetToken, PoolGateway, PriceOracle};
use crate::guard::{LockGuard, ReentrancyLock};
use crate::ledger::{Checkpoint, Ledger, PoolTotals};
use crate::registry::{AssetConfig, AssetRegistry};
use crate::risk::{AssetValuation, HealthFactor, RiskEngine, Valuation};
use crate::scaling::ASSET_DECIMALS;
use crate::types::{
    Account, AccountSummary, Amount, AssetId, Bps, OperationKind, PendingOperation, RateMode,
    ReserveMetadata, Shares,
};

/// A user's position across every registered asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountPosition {
    pub user: Account,
    pub assets: Vec<AssetValuation>,
    pub collateral_value: u128,
    pub weighted_collateral_value: u128,
    pub debt_value: u128,
    /// Debt value the registry LTVs still allow on top of current debt
    pub borrow_capacity: u128,
    pub health_factor: HealthFactor,
}

impl AccountPosition {
    fn from_valuation(user: Account, valuation: Valuation) -> Self {
        let borrow_capacity = valuation.borrow_capacity();
        Self {
            user,
            assets: valuation.assets,
            collateral_value: valuation.collateral_value,
            weighted_collateral_value: valuation.weighted_collateral_value,
            debt_value: valuation.debt_value,
            borrow_capacity,
            health_factor: valuation.health_factor,
        }
    }
}

/// Reserve must exist and use the decimals the scaling module assumes
fn check_reserve<P: PoolGateway>(pool: &P, asset: AssetId) -> Result<ReserveMetadata> {
    let metadata = pool.reserve_metadata(asset)?;
    let decimals = metadata.configuration.decimals();
    if decimals != ASSET_DECIMALS {
        return Err(Error::UnsupportedDecimals {
            asset,
            decimals,
            expected: ASSET_DECIMALS,
        });
    }
    Ok(metadata)
}

/// Pooled credit vault over an external lending pool
pub struct Vault<P, O, T> {
    account: Account,
    owner: Account,
    pool_account: Account,
    pool: P,
    oracle: O,
    tokens: T,
    registry: RwLock<AssetRegistry>,
    ledger: RwLock<Ledger>,
    events: Mutex<EventLog>,
    lock: ReentrancyLock,
}

impl<P, O, T> Vault<P, O, T>
where
    P: PoolGateway,
    O: PriceOracle,
    T: AssetToken,
{
    /// Build a vault and register every configured asset in order
    pub fn new(config: &VaultConfig, pool: P, oracle: O, tokens: T) -> Result<Self> {
        config.validate()?;

        let mut registry = AssetRegistry::new();
        let mut events = EventLog::new();
        for settings in &config.assets {
            check_reserve(&pool, settings.asset)?;
            let event = registry.register(settings.asset, settings.ltv_bps, &settings.symbol)?;
            info!(asset = %settings.asset, ltv_bps = settings.ltv_bps, symbol = %settings.symbol, "asset registered");
            events.push(event);
        }

        Ok(Self {
            account: config.account,
            owner: config.owner,
            pool_account: config.pool,
            pool,
            oracle,
            tokens,
            registry: RwLock::new(registry),
            ledger: RwLock::new(Ledger::new()),
            events: Mutex::new(events),
            lock: ReentrancyLock::new(),
        })
    }

    // ------------------------------------------------------------------------
    // administration
    // ------------------------------------------------------------------------

    /// Add or overwrite a supported asset (owner only)
    pub fn register_asset(&self, caller: Account, asset: AssetId, ltv_bps: Bps, symbol: &str) -> Result<()> {
        let _guard = self.enter("register_asset")?;
        self.require_owner(caller)?;
        check_reserve(&self.pool, asset)?;

        let event = self.registry.write().register(asset, ltv_bps, symbol)?;
        info!(%asset, ltv_bps, symbol, "asset registered");
        self.emit(event);
        Ok(())
    }

    /// Switch deposits and borrows on `asset` on or off (owner only)
    pub fn set_asset_active(&self, caller: Account, asset: AssetId, active: bool) -> Result<()> {
        let _guard = self.enter("set_asset_active")?;
        self.require_owner(caller)?;

        let event = self.registry.write().set_active(asset, active)?;
        info!(%asset, active, "asset status changed");
        self.emit(event);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // operations
    // ------------------------------------------------------------------------

    /// Deposit `amount` of `asset` from `user` as collateral
    ///
    /// `user` must have approved the vault account for `amount`. Returns the
    /// shares minted.
    pub fn deposit(&self, user: Account, asset: AssetId, amount: Amount) -> Result<Shares> {
        let kind = OperationKind::Deposit;
        let _guard = self.enter(kind)?;
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        self.registry.read().require_active(asset)?;

        let metadata = self.pool.reserve_metadata(asset)?;
        let total_assets = self.tokens.balance_of(metadata.custody_token, self.account)?;

        let (mint, checkpoint) = {
            let mut ledger = self.ledger.write();
            let mint = ledger.shares.quote_mint(asset, amount, total_assets)?;
            let checkpoint = ledger.checkpoint(asset, user);
            ledger.shares.apply_mint(asset, user, mint)?;
            (mint, checkpoint)
        };
        debug!(%user, %asset, amount, total_assets, shares = mint.shares, seeds_pool = mint.seeds_pool, "deposit quoted");

        if let Err(err) = self.settle_deposit(user, asset, amount) {
            return Err(self.rollback(kind, checkpoint, err));
        }

        info!(%user, %asset, amount, shares_minted = mint.shares, "deposit");
        self.emit(VaultEvent::Deposited {
            user,
            asset,
            amount,
            shares_minted: mint.shares,
        });
        Ok(mint.shares)
    }

    /// Withdraw `amount` of `asset` collateral to `user`
    ///
    /// Returns the amount the pool actually released.
    pub fn withdraw(&self, user: Account, asset: AssetId, amount: Amount) -> Result<Amount> {
        let kind = OperationKind::Withdraw;
        let _guard = self.enter(kind)?;
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        self.registry.read().require_registered(asset)?;

        let metadata = self.pool.reserve_metadata(asset)?;
        let total_assets = self.tokens.balance_of(metadata.custody_token, self.account)?;
        let shares = self.ledger.read().shares.quote_burn(asset, user, amount, total_assets)?;
        debug!(%user, %asset, amount, total_assets, shares, "withdraw quoted");

        self.require_healthy(user, PendingOperation::new(kind, asset, amount))?;

        let checkpoint = {
            let mut ledger = self.ledger.write();
            let checkpoint = ledger.checkpoint(asset, user);
            ledger.shares.apply_burn(asset, user, shares)?;
            checkpoint
        };

        let released = match self.settle_withdraw(user, asset, amount) {
            Ok(released) => released,
            Err(err) => return Err(self.rollback(kind, checkpoint, err)),
        };

        info!(%user, %asset, amount = released, shares_burned = shares, "withdraw");
        self.emit(VaultEvent::Withdrawn {
            user,
            asset,
            amount: released,
            shares_burned: shares,
        });
        Ok(released)
    }

    /// Borrow `amount` of `asset` against the user's collateral
    pub fn borrow(&self, user: Account, asset: AssetId, amount: Amount, rate_mode: RateMode) -> Result<()> {
        let kind = OperationKind::Borrow;
        let _guard = self.enter(kind)?;
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        if rate_mode != RateMode::Variable {
            return Err(Error::UnsupportedRateMode(rate_mode));
        }
        self.registry.read().require_active(asset)?;

        self.require_healthy(user, PendingOperation::new(kind, asset, amount))?;

        let checkpoint = {
            let mut ledger = self.ledger.write();
            let checkpoint = ledger.checkpoint(asset, user);
            ledger.debt.apply_borrow(asset, user, amount)?;
            checkpoint
        };

        if let Err(err) = self.settle_borrow(user, asset, amount) {
            return Err(self.rollback(kind, checkpoint, err));
        }

        info!(%user, %asset, amount, principal_added = amount, "borrow");
        self.emit(VaultEvent::Borrowed {
            user,
            asset,
            amount,
            principal_added: amount,
        });
        Ok(())
    }

    /// Repay `amount` of the user's `asset` debt
    ///
    /// `user` must have approved the vault account for `amount`. Returns the
    /// principal retired. If the pool applies only part of `amount`, the rest
    /// goes back to `user` and principal is retired for the applied part.
    pub fn repay(&self, user: Account, asset: AssetId, amount: Amount) -> Result<Amount> {
        let kind = OperationKind::Repay;
        let _guard = self.enter(kind)?;
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        self.registry.read().require_registered(asset)?;

        let metadata = self.pool.reserve_metadata(asset)?;
        let total_debt = self.tokens.balance_of(metadata.debt_token, self.account)?;
        let (owed, principal) = {
            let ledger = self.ledger.read();
            let owed = ledger.debt.debt_of(asset, user, total_debt)?;
            (owed, ledger.debt.quote_repay(asset, user, amount, owed)?)
        };
        debug!(%user, %asset, amount, total_debt, principal, "repay quoted");

        self.require_healthy(user, PendingOperation::new(kind, asset, amount))?;

        let checkpoint = {
            let mut ledger = self.ledger.write();
            let checkpoint = ledger.checkpoint(asset, user);
            ledger.debt.apply_repay(asset, user, principal)?;
            checkpoint
        };

        let repaid = match self.settle_repay(user, asset, amount) {
            Ok(0) => {
                let err = Error::Gateway(GatewayError::Rejected("repayment not applied".into()));
                return Err(self.rollback(kind, checkpoint, err));
            }
            Ok(repaid) => repaid,
            Err(err) => return Err(self.rollback(kind, checkpoint, err)),
        };

        // the pool may apply less than asked; retire only what it took
        let principal = if repaid < amount {
            let mut ledger = self.ledger.write();
            ledger.restore(checkpoint);
            let retired = ledger.debt.quote_repay(asset, user, repaid, owed)?;
            ledger.debt.apply_repay(asset, user, retired)?;
            warn!(%user, %asset, requested = amount, repaid, principal_reduced = retired, "partial repayment");
            retired
        } else {
            principal
        };

        info!(%user, %asset, amount = repaid, principal_reduced = principal, "repay");
        self.emit(VaultEvent::Repaid {
            user,
            asset,
            amount: repaid,
            principal_reduced: principal,
        });
        Ok(principal)
    }

    // ------------------------------------------------------------------------
    // views
    // ------------------------------------------------------------------------

    /// Collateral `user` could claim for `asset` right now
    pub fn balance_of(&self, asset: AssetId, user: Account) -> Result<Amount> {
        let metadata = self.pool.reserve_metadata(asset)?;
        let total_assets = self.tokens.balance_of(metadata.custody_token, self.account)?;
        self.ledger.read().shares.balance_of(asset, user, total_assets)
    }

    /// What `user` owes on `asset` right now
    pub fn debt_of(&self, asset: AssetId, user: Account) -> Result<Amount> {
        let metadata = self.pool.reserve_metadata(asset)?;
        let total_debt = self.tokens.balance_of(metadata.debt_token, self.account)?;
        self.ledger.read().debt.debt_of(asset, user, total_debt)
    }

    pub fn shares_of(&self, asset: AssetId, user: Account) -> Shares {
        self.ledger.read().shares.shares_of(asset, user)
    }

    pub fn principal_of(&self, asset: AssetId, user: Account) -> Amount {
        self.ledger.read().debt.principal_of(asset, user)
    }

    pub fn health_factor(&self, user: Account) -> Result<HealthFactor> {
        self.valuate(user, None).map(|v| v.health_factor)
    }

    pub fn account_position(&self, user: Account) -> Result<AccountPosition> {
        self.valuate(user, None)
            .map(|valuation| AccountPosition::from_valuation(user, valuation))
    }

    /// The pool's own summary of the vault account
    pub fn account_summary(&self) -> Result<AccountSummary> {
        Ok(self.pool.account_summary(self.account)?)
    }

    pub fn ltv(&self, asset: AssetId) -> Result<Bps> {
        self.registry.read().ltv(asset)
    }

    pub fn is_asset_active(&self, asset: AssetId) -> bool {
        self.registry.read().is_active(asset)
    }

    /// Registered assets in registration order
    pub fn assets(&self) -> Vec<AssetId> {
        self.registry.read().assets().to_vec()
    }

    pub fn asset_config(&self, asset: AssetId) -> Option<AssetConfig> {
        self.registry.read().get(asset).cloned()
    }

    /// Accounts holding shares of `asset`, with their shares
    pub fn holders(&self, asset: AssetId) -> Vec<(Account, Shares)> {
        self.ledger.read().shares.holders(asset).collect()
    }

    /// Accounts carrying principal on `asset`, with their principal
    pub fn borrowers(&self, asset: AssetId) -> Vec<(Account, Amount)> {
        self.ledger.read().debt.borrowers(asset).collect()
    }

    pub fn pool_totals(&self, asset: AssetId) -> PoolTotals {
        self.ledger.read().totals(asset)
    }

    pub fn events(&self) -> Vec<VaultEvent> {
        self.events.lock().events().to_vec()
    }

    /// Drain the event log
    pub fn take_events(&self) -> Vec<VaultEvent> {
        self.events.lock().drain()
    }

    pub fn account(&self) -> Account {
        self.account
    }

    pub fn owner(&self) -> Account {
        self.owner
    }

    /// Whether an operation is in flight
    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    // ------------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------------

    fn enter(&self, operation: impl std::fmt::Display) -> Result<LockGuard<'_>> {
        self.lock.acquire().map_err(|err| {
            warn!(%operation, "rejected re-entrant call");
            err
        })
    }

    fn require_owner(&self, caller: Account) -> Result<()> {
        if caller != self.owner {
            warn!(%caller, "unauthorized admin call");
            return Err(Error::Unauthorized(caller));
        }
        Ok(())
    }

    fn valuate(&self, user: Account, pending: Option<PendingOperation>) -> Result<Valuation> {
        // copies, so no vault lock is held while the collaborators run
        let registry = self.registry.read().clone();
        let entries = self.ledger.read().snapshot(user, registry.assets());
        RiskEngine::new(&registry, &self.pool, &self.oracle, &self.tokens, self.account)
            .valuate(&entries, pending)
    }

    fn require_healthy(&self, user: Account, pending: PendingOperation) -> Result<HealthFactor> {
        let health_factor = self.valuate(user, Some(pending))?.health_factor;
        if !health_factor.is_safe() {
            warn!(
                %user,
                operation = %pending.kind,
                asset = %pending.asset,
                amount = pending.amount,
                %health_factor,
                "health factor too low"
            );
            return Err(Error::HealthFactorTooLow {
                health_factor,
                minimum: HealthFactor::MINIMUM,
            });
        }
        Ok(health_factor)
    }

    fn emit(&self, event: VaultEvent) {
        self.events.lock().push(event);
    }

    fn rollback(&self, kind: OperationKind, checkpoint: Checkpoint, err: Error) -> Error {
        self.ledger.write().restore(checkpoint);
        warn!(operation = %kind, error = %err, "external call failed, ledger restored");
        err
    }

    /// Best-effort return of tokens already moved; failures are only logged
    fn compensate(&self, what: &str, result: Result<()>) {
        if let Err(err) = result {
            warn!(error = %err, "failed to {}", what);
        }
    }

    fn settle_deposit(&self, user: Account, asset: AssetId, amount: Amount) -> Result<()> {
        self.tokens
            .transfer_from(asset, self.account, user, self.account, amount)?;

        let supplied = self
            .tokens
            .approve(asset, self.account, self.pool_account, amount)
            .and_then(|_| self.pool.supply(asset, amount, self.account));

        if let Err(err) = supplied {
            self.compensate(
                "refund deposit",
                self.tokens
                    .approve(asset, self.account, self.pool_account, 0)
                    .and_then(|_| self.tokens.transfer(asset, self.account, user, amount))
                    .map_err(Error::from),
            );
            return Err(err.into());
        }
        Ok(())
    }

    fn settle_withdraw(&self, user: Account, asset: AssetId, amount: Amount) -> Result<Amount> {
        let released = self.pool.withdraw(asset, amount, self.account)?;

        if let Err(err) = self.tokens.transfer(asset, self.account, user, released) {
            self.compensate(
                "re-supply withdrawn collateral",
                self.tokens
                    .approve(asset, self.account, self.pool_account, released)
                    .and_then(|_| self.pool.supply(asset, released, self.account))
                    .map_err(Error::from),
            );
            return Err(err.into());
        }
        Ok(released)
    }

    fn settle_borrow(&self, user: Account, asset: AssetId, amount: Amount) -> Result<()> {
        self.pool
            .borrow(asset, amount, RateMode::Variable, self.account)?;

        if let Err(err) = self.tokens.transfer(asset, self.account, user, amount) {
            self.compensate(
                "repay unsent borrow",
                self.tokens
                    .approve(asset, self.account, self.pool_account, amount)
                    .and_then(|_| self.pool.repay(asset, amount, RateMode::Variable, self.account))
                    .map(|_| ())
                    .map_err(Error::from),
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Returns the amount the pool applied, never more than `amount`
    fn settle_repay(&self, user: Account, asset: AssetId, amount: Amount) -> Result<Amount> {
        self.tokens
            .transfer_from(asset, self.account, user, self.account, amount)?;

        let repaid = self
            .tokens
            .approve(asset, self.account, self.pool_account, amount)
            .and_then(|_| self.pool.repay(asset, amount, RateMode::Variable, self.account));

        match repaid {
            Ok(repaid) if repaid < amount => {
                self.compensate(
                    "return unapplied repayment",
                    self.tokens
                        .approve(asset, self.account, self.pool_account, 0)
                        .and_then(|_| self.tokens.transfer(asset, self.account, user, amount - repaid))
                        .map_err(Error::from),
                );
                Ok(repaid)
            }
            Ok(_) => Ok(amount),
            Err(err) => {
                self.compensate(
                    "refund repayment",
                    self.tokens
                        .approve(asset, self.account, self.pool_account, 0)
                        .and_then(|_| self.tokens.transfer(asset, self.account, user, amount))
                        .map_err(Error::from),
                );
                Err(err.into())
            }
        }
    }
}
