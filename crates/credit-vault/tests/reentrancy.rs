//! A pool that calls back into the vault from inside `supply` and `borrow`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use credit_vault::{
    Account, AccountSummary, Amount, AssetId, AssetSettings, AssetToken, Error, GatewayError,
    GatewayResult, InMemoryPool, InMemoryTokens, PoolGateway, RateMode, ReserveMetadata,
    StaticOracle, Vault, VaultConfig, WAD,
};

const WETH: AssetId = AssetId::repeat_byte(0x11);
const USDC: AssetId = AssetId::repeat_byte(0x22);
const VAULT: Account = Account::repeat_byte(0x77);
const OWNER: Account = Account::repeat_byte(0x01);
const POOL: Account = Account::repeat_byte(0x99);
const ALICE: Account = Account::repeat_byte(0xa1);
const MALLORY: Account = Account::repeat_byte(0xee);

type HostileVault = Vault<ReentrantPool, StaticOracle, InMemoryTokens>;

#[derive(Default)]
struct Observations {
    attempts: AtomicUsize,
    rejected: AtomicUsize,
    views_ok: AtomicUsize,
}

/// Delegates to the in-memory pool after trying every vault operation
struct ReentrantPool {
    inner: InMemoryPool,
    vault: Arc<OnceLock<Weak<HostileVault>>>,
    seen: Arc<Observations>,
    /// fail the outer call after the callbacks
    fail_after: bool,
}

impl ReentrantPool {
    fn attack(&self) {
        let Some(vault) = self.vault.get().and_then(Weak::upgrade) else {
            return;
        };

        let results = [
            vault.deposit(MALLORY, WETH, 1),
            vault.withdraw(MALLORY, WETH, 1).map(|_| 0),
            vault.borrow(MALLORY, USDC, 1, RateMode::Variable).map(|_| 0),
            vault.repay(MALLORY, USDC, 1).map(|_| 0),
            vault.set_asset_active(OWNER, WETH, false).map(|_| 0),
        ];
        for result in results {
            self.seen.attempts.fetch_add(1, Ordering::SeqCst);
            if matches!(result, Err(Error::ReentrancyViolation)) {
                self.seen.rejected.fetch_add(1, Ordering::SeqCst);
            }
        }

        // reads are still served mid-operation
        if vault.is_locked() && vault.health_factor(ALICE).is_ok() {
            self.seen.views_ok.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl PoolGateway for ReentrantPool {
    fn supply(&self, asset: AssetId, amount: Amount, on_behalf_of: Account) -> GatewayResult<()> {
        self.attack();
        if self.fail_after {
            return Err(GatewayError::Rejected("supply aborted".into()));
        }
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
        self.attack();
        self.inner.borrow(asset, amount, rate_mode, on_behalf_of)
    }

    fn repay(
        &self,
        asset: AssetId,
        amount: Amount,
        rate_mode: RateMode,
        on_behalf_of: Account,
    ) -> GatewayResult<Amount> {
        self.inner.repay(asset, amount, rate_mode, on_behalf_of)
    }

    fn reserve_metadata(&self, asset: AssetId) -> GatewayResult<ReserveMetadata> {
        self.inner.reserve_metadata(asset)
    }

    fn account_summary(&self, account: Account) -> GatewayResult<AccountSummary> {
        self.inner.account_summary(account)
    }
}

struct Setup {
    vault: Arc<HostileVault>,
    tokens: InMemoryTokens,
    seen: Arc<Observations>,
}

fn setup(fail_after: bool) -> Setup {
    let tokens = InMemoryTokens::new();
    let oracle = StaticOracle::new();
    oracle.set_price(WETH, 2_000 * 100_000_000);
    oracle.set_price(USDC, 100_000_000);

    let inner = InMemoryPool::new(POOL, tokens.clone(), oracle.clone());
    inner.add_reserve(WETH, 7_500, 8_000);
    inner.add_reserve(USDC, 8_000, 8_500);
    tokens.mint(USDC, POOL, 1_000_000 * WAD).unwrap();

    let slot = Arc::new(OnceLock::new());
    let seen = Arc::new(Observations::default());
    let pool = ReentrantPool {
        inner,
        vault: slot.clone(),
        seen: seen.clone(),
        fail_after,
    };

    let config = VaultConfig {
        account: VAULT,
        owner: OWNER,
        pool: POOL,
        assets: vec![
            AssetSettings {
                asset: WETH,
                ltv_bps: 7_500,
                symbol: "WETH".into(),
            },
            AssetSettings {
                asset: USDC,
                ltv_bps: 8_000,
                symbol: "USDC".into(),
            },
        ],
    };
    let vault = Arc::new(Vault::new(&config, pool, oracle, tokens.clone()).unwrap());
    let _ = slot.set(Arc::downgrade(&vault));

    for user in [ALICE, MALLORY] {
        tokens.mint(WETH, user, 10 * WAD).unwrap();
        tokens.approve(WETH, user, VAULT, u128::MAX).unwrap();
    }

    Setup { vault, tokens, seen }
}

#[test]
fn test_callbacks_during_supply_are_rejected() {
    let s = setup(false);

    let shares = s.vault.deposit(ALICE, WETH, 5 * WAD).unwrap();

    assert_eq!(shares, 5 * WAD);
    assert_eq!(s.seen.attempts.load(Ordering::SeqCst), 5);
    assert_eq!(s.seen.rejected.load(Ordering::SeqCst), 5);
    assert_eq!(s.seen.views_ok.load(Ordering::SeqCst), 1);

    // nothing the callbacks tried left a trace
    assert_eq!(s.vault.shares_of(WETH, MALLORY), 0);
    assert!(s.vault.is_asset_active(WETH));
    assert_eq!(s.tokens.balance_of(WETH, MALLORY).unwrap(), 10 * WAD);
    assert_eq!(s.vault.events().len(), 3);
}

#[test]
fn test_lock_released_after_each_operation() {
    let s = setup(false);

    s.vault.deposit(ALICE, WETH, 5 * WAD).unwrap();
    assert!(!s.vault.is_locked());

    // a second top-level call is not a re-entry
    s.vault.deposit(MALLORY, WETH, WAD).unwrap();
    s.vault
        .borrow(ALICE, USDC, 1_000 * WAD, RateMode::Variable)
        .unwrap();
    assert!(!s.vault.is_locked());
    assert_eq!(s.seen.rejected.load(Ordering::SeqCst), 15);
}

#[test]
fn test_lock_released_when_pool_fails() {
    let s = setup(true);

    let err = s.vault.deposit(ALICE, WETH, 5 * WAD).unwrap_err();
    assert!(matches!(err, Error::Gateway(GatewayError::Rejected(_))));
    assert_eq!(s.seen.rejected.load(Ordering::SeqCst), 5);

    assert!(!s.vault.is_locked());
    assert_eq!(s.vault.shares_of(WETH, ALICE), 0);
    assert_eq!(s.vault.pool_totals(WETH).total_shares, 0);
    assert_eq!(s.tokens.balance_of(WETH, ALICE).unwrap(), 10 * WAD);

    // a failing pool does not wedge the vault
    assert!(matches!(
        s.vault.withdraw(ALICE, WETH, WAD),
        Err(Error::NothingToWithdraw(_))
    ));
}
