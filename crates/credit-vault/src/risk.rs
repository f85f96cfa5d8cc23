//! Risk Engine - cross-asset health factor with simulated pending operations
//!
//! ```text
//!                 Σ collateral × price × liquidation_threshold
//! health_factor = ─────────────────────────────────────────── × 1e18
//!                           Σ debt × price
//! ```
//!
//! Collateral and debt are the live balances implied by the vault's ledgers
//! (shares over the custodied balance, principal over the pooled debt).
//! A pending operation is folded into its asset's balances before valuation,
//! so the result is the health factor the user would have after it commits.
//!
//! The engine only reads. It never touches the ledgers or the collaborators'
//! state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::gateway::{AssetToken, PoolGateway, PriceOracle};
use crate::ledger::debt::principal_to_debt;
use crate::ledger::shares::shares_to_assets;
use crate::ledger::LedgerEntry;
use crate::registry::AssetRegistry;
use crate::scaling::{narrow, value_of, weighted_value_of, U256, WAD};
use crate::types::{Account, Amount, AssetId, Bps, OperationKind, PendingOperation, Shares};

/// Health factor in 18-decimal fixed point (`1e18` = 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthFactor(pub u128);

impl HealthFactor {
    /// No debt
    pub const INFINITE: Self = Self(u128::MAX);

    pub const ONE: Self = Self(WAD);

    /// Operations must leave the health factor strictly above 1.1
    pub const MINIMUM: Self = Self(1_100_000_000_000_000_000);

    /// `weighted_collateral × 1e18 / debt`, infinite when `debt` is zero
    pub fn from_values(weighted_collateral: U256, debt: U256) -> Self {
        if debt.is_zero() {
            return Self::INFINITE;
        }
        weighted_collateral
            .checked_mul(U256::from(WAD))
            .map(|scaled| scaled / debt)
            .and_then(|hf| narrow(hf).ok())
            .map(Self)
            .unwrap_or(Self::INFINITE)
    }

    pub fn is_infinite(&self) -> bool {
        *self == Self::INFINITE
    }

    /// Strictly above [`HealthFactor::MINIMUM`]
    pub fn is_safe(&self) -> bool {
        *self > Self::MINIMUM
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            return f.write_str("inf");
        }
        let whole = self.0 / WAD;
        let frac = self.0 % WAD;
        // four decimal places, truncated
        write!(f, "{}.{:04}", whole, frac / 100_000_000_000_000)
    }
}

/// One asset's contribution to a valuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetValuation {
    pub asset: AssetId,
    pub shares: Shares,
    /// Claimable collateral, after the pending operation
    pub collateral: Amount,
    pub principal: Amount,
    /// Owed amount, after the pending operation
    pub debt: Amount,
    /// Zero when neither collateral nor debt needed a price
    pub price: u128,
    pub liquidation_threshold: Bps,
    pub collateral_value: u128,
    pub debt_value: u128,
}

/// Aggregated valuation of one user's position
///
/// Values are base currency with 18 decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valuation {
    pub assets: Vec<AssetValuation>,
    pub collateral_value: u128,
    /// Collateral value weighted by each reserve's liquidation threshold
    pub weighted_collateral_value: u128,
    /// Collateral value weighted by the vault's LTV for each active asset
    pub borrow_limit_value: u128,
    pub debt_value: u128,
    pub health_factor: HealthFactor,
}

impl Valuation {
    /// Additional debt value the LTV limits still allow, floored at zero
    pub fn borrow_capacity(&self) -> u128 {
        self.borrow_limit_value.saturating_sub(self.debt_value)
    }
}

/// Read-only view over the registry, the collaborators and a ledger snapshot
pub struct RiskEngine<'a, P, O, T> {
    registry: &'a AssetRegistry,
    pool: &'a P,
    oracle: &'a O,
    tokens: &'a T,
    /// Account whose custody and debt balances back the ledgers
    holder: Account,
}

impl<'a, P, O, T> RiskEngine<'a, P, O, T>
where
    P: PoolGateway,
    O: PriceOracle,
    T: AssetToken,
{
    pub fn new(registry: &'a AssetRegistry, pool: &'a P, oracle: &'a O, tokens: &'a T, holder: Account) -> Self {
        Self {
            registry,
            pool,
            oracle,
            tokens,
            holder,
        }
    }

    /// Health factor after `pending`, or as it stands when `None`
    pub fn health_factor(&self, entries: &[LedgerEntry], pending: Option<PendingOperation>) -> Result<HealthFactor> {
        self.valuate(entries, pending).map(|v| v.health_factor)
    }

    /// Value every entry of `entries` with `pending` folded in
    pub fn valuate(&self, entries: &[LedgerEntry], pending: Option<PendingOperation>) -> Result<Valuation> {
        let mut assets = Vec::with_capacity(entries.len());
        let mut collateral_total = U256::zero();
        let mut weighted_total = U256::zero();
        let mut limit_total = U256::zero();
        let mut debt_total = U256::zero();

        for entry in entries {
            let metadata = self.pool.reserve_metadata(entry.asset)?;
            let custodied = self.tokens.balance_of(metadata.custody_token, self.holder)?;
            let pooled_debt = self.tokens.balance_of(metadata.debt_token, self.holder)?;

            let mut collateral = shares_to_assets(entry.shares, entry.total_shares, custodied)?;
            let mut debt = principal_to_debt(entry.principal, entry.total_principal, pooled_debt)?;

            if let Some(op) = pending.filter(|op| op.asset == entry.asset) {
                match op.kind {
                    OperationKind::Deposit => {
                        collateral = collateral
                            .checked_add(op.amount)
                            .ok_or(Error::MathOverflow)?;
                    }
                    OperationKind::Withdraw => collateral = collateral.saturating_sub(op.amount),
                    OperationKind::Borrow => {
                        debt = debt
                            .checked_add(op.amount)
                            .ok_or(Error::MathOverflow)?;
                    }
                    OperationKind::Repay => {
                        if op.amount <= debt {
                            debt -= op.amount;
                        }
                    }
                }
            }

            let threshold = metadata.configuration.liquidation_threshold();
            let mut valued = AssetValuation {
                asset: entry.asset,
                shares: entry.shares,
                collateral,
                principal: entry.principal,
                debt,
                price: 0,
                liquidation_threshold: threshold,
                collateral_value: 0,
                debt_value: 0,
            };

            if collateral > 0 || debt > 0 {
                let price = self.oracle.price(entry.asset)?;
                valued.price = price;

                if collateral > 0 {
                    let value = value_of(collateral, price)?;
                    let ltv = self.registry.ltv(entry.asset).unwrap_or(0);
                    valued.collateral_value = narrow(value)?;
                    collateral_total = collateral_total.saturating_add(value);
                    weighted_total = weighted_total.saturating_add(weighted_value_of(collateral, price, threshold)?);
                    limit_total = limit_total.saturating_add(weighted_value_of(collateral, price, ltv)?);
                }
                if debt > 0 {
                    let value = value_of(debt, price)?;
                    valued.debt_value = narrow(value)?;
                    debt_total = debt_total.saturating_add(value);
                }
            }

            assets.push(valued);
        }

        let health_factor = HealthFactor::from_values(weighted_total, debt_total);
        debug!(
            holder = %self.holder,
            pending = ?pending,
            collateral_value = %collateral_total,
            weighted_collateral_value = %weighted_total,
            debt_value = %debt_total,
            health_factor = %health_factor,
            "valuated position"
        );

        Ok(Valuation {
            assets,
            collateral_value: narrow(collateral_total)?,
            weighted_collateral_value: narrow(weighted_total)?,
            borrow_limit_value: narrow(limit_total)?,
            debt_value: narrow(debt_total)?,
            health_factor,
        })
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::gateway::memory::{InMemoryPool, InMemoryTokens, StaticOracle};
    use crate::ledger::Ledger;

    const WETH: AssetId = AssetId::repeat_byte(1);
    const USDC: AssetId = AssetId::repeat_byte(2);
    const VAULT: Account = Account::repeat_byte(0x77);
    const POOL: Account = Account::repeat_byte(0x99);
    const ALICE: Account = Account::repeat_byte(0xa1);

    const WETH_PRICE: u128 = 2_000 * 100_000_000;
    const USDC_PRICE: u128 = 100_000_000;

    struct Fixture {
        registry: AssetRegistry,
        pool: InMemoryPool,
        oracle: StaticOracle,
        tokens: InMemoryTokens,
        ledger: Ledger,
    }

    impl Fixture {
        fn new() -> Self {
            let tokens = InMemoryTokens::new();
            let oracle = StaticOracle::new();
            oracle.set_price(WETH, WETH_PRICE);
            oracle.set_price(USDC, USDC_PRICE);
            let pool = InMemoryPool::new(POOL, tokens.clone(), oracle.clone());
            pool.add_reserve(WETH, 7_500, 8_000);
            pool.add_reserve(USDC, 8_000, 8_500);

            let mut registry = AssetRegistry::new();
            registry.register(WETH, 7_000, "WETH").unwrap();
            registry.register(USDC, 8_000, "USDC").unwrap();

            Self {
                registry,
                pool,
                oracle,
                tokens,
                ledger: Ledger::new(),
            }
        }

        /// credit alice with `amount` of collateral custodied 1:1 by the vault
        fn seed_collateral(&mut self, asset: AssetId, amount: Amount) {
            let custodied = self.custodied(asset);
            let mint = self.ledger.shares.quote_mint(asset, amount, custodied).unwrap();
            self.ledger.shares.apply_mint(asset, ALICE, mint).unwrap();
            let custody = self.pool.reserve_metadata(asset).unwrap().custody_token;
            // custody tracks total shares so alice's balance equals `amount`
            let target = self.ledger.shares.total_shares(asset);
            self.tokens.mint(custody, VAULT, target - custodied).unwrap();
        }

        fn seed_debt(&mut self, asset: AssetId, amount: Amount) {
            self.ledger.debt.apply_borrow(asset, ALICE, amount).unwrap();
            let debt = self.pool.reserve_metadata(asset).unwrap().debt_token;
            self.tokens.mint(debt, VAULT, amount).unwrap();
        }

        fn custodied(&self, asset: AssetId) -> Amount {
            let custody = self.pool.reserve_metadata(asset).unwrap().custody_token;
            self.tokens.balance_of(custody, VAULT).unwrap()
        }

        fn engine(&self) -> RiskEngine<'_, InMemoryPool, StaticOracle, InMemoryTokens> {
            RiskEngine::new(&self.registry, &self.pool, &self.oracle, &self.tokens, VAULT)
        }

        fn entries(&self) -> Vec<LedgerEntry> {
            self.ledger.snapshot(ALICE, self.registry.assets())
        }

        fn hf(&self, pending: Option<PendingOperation>) -> HealthFactor {
            self.engine().health_factor(&self.entries(), pending).unwrap()
        }
    }

    #[test]
    fn test_infinite_without_debt() {
        let mut fx = Fixture::new();
        assert!(fx.hf(None).is_infinite());

        fx.seed_collateral(WETH, 5 * WAD);
        assert!(fx.hf(None).is_infinite());
        assert_eq!(fx.hf(None).to_string(), "inf");
    }

    #[test]
    fn test_five_unit_collateral_formula() {
        let mut fx = Fixture::new();
        fx.seed_collateral(WETH, 5 * WAD);

        // (5 × 2000 × 0.8) / (4000 × 1) = 2.0
        let borrow = PendingOperation::new(OperationKind::Borrow, USDC, 4_000 * WAD);
        assert_eq!(fx.hf(Some(borrow)), HealthFactor(2 * WAD));

        // 8000 / 7300 = 1.0958.. <= 1.1
        let borrow = PendingOperation::new(OperationKind::Borrow, USDC, 7_300 * WAD);
        let hf = fx.hf(Some(borrow));
        assert!(!hf.is_safe());
        assert_eq!(hf.to_string(), "1.0958");
    }

    #[test]
    fn test_exactly_minimum_is_not_safe() {
        let mut fx = Fixture::new();
        fx.seed_collateral(WETH, 11 * WAD);
        // 11 × 2000 × 0.8 = 17600 weighted; 16000 debt -> exactly 1.1
        let borrow = PendingOperation::new(OperationKind::Borrow, USDC, 16_000 * WAD);
        let hf = fx.hf(Some(borrow));
        assert_eq!(hf, HealthFactor::MINIMUM);
        assert!(!hf.is_safe());
    }

    #[test]
    fn test_pending_withdraw_and_repay() {
        let mut fx = Fixture::new();
        fx.seed_collateral(WETH, 5 * WAD);
        fx.seed_debt(USDC, 4_000 * WAD);
        assert_eq!(fx.hf(None), HealthFactor(2 * WAD));

        // withdrawing 2.5 WETH halves the weighted collateral
        let withdraw = PendingOperation::new(OperationKind::Withdraw, WETH, 5 * WAD / 2);
        assert_eq!(fx.hf(Some(withdraw)), HealthFactor::ONE);

        // withdrawing more than held clamps at zero
        let withdraw = PendingOperation::new(OperationKind::Withdraw, WETH, 50 * WAD);
        assert_eq!(fx.hf(Some(withdraw)), HealthFactor(0));

        let repay = PendingOperation::new(OperationKind::Repay, USDC, 2_000 * WAD);
        assert_eq!(fx.hf(Some(repay)), HealthFactor(4 * WAD));

        // repaying more than owed is ignored by the simulation
        let repay = PendingOperation::new(OperationKind::Repay, USDC, 5_000 * WAD);
        assert_eq!(fx.hf(Some(repay)), HealthFactor(2 * WAD));
    }

    #[test]
    fn test_borrow_without_collateral_is_zero() {
        let fx = Fixture::new();
        let borrow = PendingOperation::new(OperationKind::Borrow, USDC, 1);
        assert_eq!(fx.hf(Some(borrow)), HealthFactor(0));
    }

    #[test]
    fn test_valuation_totals_and_capacity() {
        let mut fx = Fixture::new();
        fx.seed_collateral(WETH, 5 * WAD);
        fx.seed_debt(USDC, 1_000 * WAD);

        let valuation = fx.engine().valuate(&fx.entries(), None).unwrap();
        assert_eq!(valuation.collateral_value, 10_000 * WAD);
        assert_eq!(valuation.weighted_collateral_value, 8_000 * WAD);
        // registry LTV 70%
        assert_eq!(valuation.borrow_limit_value, 7_000 * WAD);
        assert_eq!(valuation.debt_value, 1_000 * WAD);
        assert_eq!(valuation.borrow_capacity(), 6_000 * WAD);

        let weth = &valuation.assets[0];
        assert_eq!(weth.collateral, 5 * WAD);
        assert_eq!(weth.price, WETH_PRICE);
        assert_eq!(weth.liquidation_threshold, 8_000);
    }

    #[test]
    fn test_inactive_asset_still_counts_for_health() {
        let mut fx = Fixture::new();
        fx.seed_collateral(WETH, 5 * WAD);
        fx.seed_debt(USDC, 4_000 * WAD);
        fx.registry.set_active(WETH, false).unwrap();

        let valuation = fx.engine().valuate(&fx.entries(), None).unwrap();
        assert_eq!(valuation.health_factor, HealthFactor(2 * WAD));
        assert_eq!(valuation.borrow_limit_value, 0);
    }

    #[test]
    fn test_interest_raises_debt_value() {
        let mut fx = Fixture::new();
        fx.seed_collateral(WETH, 5 * WAD);
        fx.seed_debt(USDC, 4_000 * WAD);

        // 25% on the pooled usdc debt
        fx.pool.accrue_interest(USDC, 2_500).unwrap();
        assert_eq!(fx.hf(None), HealthFactor(8 * WAD / 5));
    }

    #[test]
    fn test_missing_price_fails_only_when_needed() {
        let mut fx = Fixture::new();
        fx.oracle.set_price(USDC, 0);
        fx.seed_collateral(WETH, WAD);
        assert!(fx.hf(None).is_infinite());

        fx.seed_debt(USDC, 1);
        assert!(fx.engine().health_factor(&fx.entries(), None).is_err());
    }
}
