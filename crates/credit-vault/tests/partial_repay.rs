//! A pool that applies only part of each repayment.

mod common;

use common::*;
use credit_vault::{
    Account, AccountSummary, Amount, AssetId, AssetToken, Error, GatewayError, GatewayResult,
    InMemoryPool, InMemoryTokens, PoolGateway, RateMode, ReserveMetadata, StaticOracle, Vault,
    VaultEvent, WAD,
};

/// Delegates to the in-memory pool, applying `applied_bps` of each repayment
struct ShortPool {
    inner: InMemoryPool,
    applied_bps: u128,
}

impl PoolGateway for ShortPool {
    fn supply(&self, asset: AssetId, amount: Amount, on_behalf_of: Account) -> GatewayResult<()> {
        self.inner.supply(asset, amount, on_behalf_of)
    }

    fn withdraw(&self, asset: AssetId, amount: Amount, to: Account) -> GatewayResult<Amount> {
        self.inner.withdraw(asset, amount, to)
    }

    fn borrow(
        &self,
        asset: AssetId,
        amount: Amount,
        rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<()> {
        self.inner.borrow(asset, amount, rate_mode, on_behalf_of)
    }

    fn repay(
        &self,
        asset: AssetId,
        amount: Amount,
        rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<Amount> {
        let applied = amount * self.applied_bps / 10_000;
        if applied == 0 {
            return Ok(0);
        }
        self.inner.repay(asset, applied, rate_mode, on_behalf_of)
    }

    fn reserve_metadata(&self, asset: AssetId) -> GatewayResult<ReserveMetadata> {
        self.inner.reserve_metadata(asset)
    }

    fn account_summary(&self, account: Account) -> GatewayResult<AccountSummary> {
        self.inner.account_summary(account)
    }
}

struct Setup {
    vault: Vault<ShortPool, StaticOracle, InMemoryTokens>,
    pool: InMemoryPool,
    tokens: InMemoryTokens,
}

impl Setup {
    fn new(applied_bps: u128) -> Self {
        let tokens = InMemoryTokens::new();
        let oracle = StaticOracle::new();
        oracle.set_price(WETH, WETH_PRICE);
        oracle.set_price(USDC, USDC_PRICE);

        let pool = InMemoryPool::new(POOL, tokens.clone(), oracle.clone());
        pool.add_reserve(WETH, 7_500, 8_000);
        pool.add_reserve(USDC, 8_000, 8_500);
        tokens.mint(USDC, POOL, 1_000_000 * WAD).unwrap();

        let short = ShortPool {
            inner: pool.clone(),
            applied_bps,
        };
        let vault = Vault::new(&config(), short, oracle, tokens.clone()).unwrap();
        vault.take_events();

        for user in [ALICE, BOB] {
            tokens.mint(WETH, user, 10 * WAD).unwrap();
            for asset in [WETH, USDC] {
                tokens.approve(asset, user, VAULT, u128::MAX).unwrap();
            }
        }

        Self { vault, pool, tokens }
    }

    fn borrow_against_weth(&self, user: Account, amount: Amount) {
        self.vault.deposit(user, WETH, 5 * WAD).unwrap();
        self.vault
            .borrow(user, USDC, amount, RateMode::Variable)
            .unwrap();
    }

    fn pooled_debt(&self) -> Amount {
        let debt_token = self.pool.reserve_metadata(USDC).unwrap().debt_token;
        self.tokens.balance_of(debt_token, VAULT).unwrap()
    }
}

#[test]
fn test_partial_repay_retires_only_applied_principal() {
    let s = Setup::new(5_000);
    s.borrow_against_weth(ALICE, 1_000 * WAD);
    s.vault.take_events();

    let retired = s.vault.repay(ALICE, USDC, 1_000 * WAD).unwrap();

    assert_eq!(retired, 500 * WAD);
    assert_eq!(s.vault.principal_of(USDC, ALICE), 500 * WAD);
    assert_eq!(s.vault.debt_of(USDC, ALICE).unwrap(), 500 * WAD);
    assert_eq!(s.pooled_debt(), 500 * WAD);

    // the unapplied half went back to the wallet
    assert_eq!(s.tokens.balance_of(USDC, ALICE).unwrap(), 500 * WAD);
    assert_eq!(s.tokens.balance_of(USDC, VAULT).unwrap(), 0);

    assert_eq!(
        s.vault.events(),
        vec![VaultEvent::Repaid {
            user: ALICE,
            asset: USDC,
            amount: 500 * WAD,
            principal_reduced: 500 * WAD,
        }]
    );
}

#[test]
fn test_partial_repay_leaves_other_borrowers_untouched() {
    let s = Setup::new(5_000);
    s.borrow_against_weth(ALICE, 1_000 * WAD);
    s.vault.repay(ALICE, USDC, 1_000 * WAD).unwrap();

    s.borrow_against_weth(BOB, 100 * WAD);

    assert_eq!(s.vault.debt_of(USDC, BOB).unwrap(), 100 * WAD);
    assert_eq!(s.vault.debt_of(USDC, ALICE).unwrap(), 500 * WAD);
    assert_eq!(s.pooled_debt(), 600 * WAD);
    assert_eq!(s.vault.pool_totals(USDC).total_principal, 600 * WAD);
}

#[test]
fn test_unapplied_repay_rolls_back() {
    let s = Setup::new(0);
    s.borrow_against_weth(ALICE, 1_000 * WAD);
    s.vault.take_events();

    let err = s.vault.repay(ALICE, USDC, 400 * WAD).unwrap_err();

    assert!(matches!(err, Error::Gateway(GatewayError::Rejected(_))));
    assert_eq!(s.vault.principal_of(USDC, ALICE), 1_000 * WAD);
    assert_eq!(s.pooled_debt(), 1_000 * WAD);
    assert_eq!(s.tokens.balance_of(USDC, ALICE).unwrap(), 1_000 * WAD);
    assert!(s.vault.events().is_empty());
    assert!(!s.vault.is_locked());
}
