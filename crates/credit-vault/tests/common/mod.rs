//! Shared fixture: a vault over the in-memory pool with WETH and USDC listed.

#![allow(dead_code)]

use credit_vault::{
    Account, Amount, AssetId, AssetSettings, InMemoryPool, InMemoryTokens, StaticOracle, Vault,
    VaultConfig, DEAD_SHARES, WAD,
};

pub const WETH: AssetId = AssetId::repeat_byte(0x11);
pub const USDC: AssetId = AssetId::repeat_byte(0x22);

pub const VAULT: Account = Account::repeat_byte(0x77);
pub const OWNER: Account = Account::repeat_byte(0x01);
pub const POOL: Account = Account::repeat_byte(0x99);
pub const ALICE: Account = Account::repeat_byte(0xa1);
pub const BOB: Account = Account::repeat_byte(0xb0);
pub const CAROL: Account = Account::repeat_byte(0xc0);

/// $2000.00000000
pub const WETH_PRICE: u128 = 2_000 * 100_000_000;
/// $1.00000000
pub const USDC_PRICE: u128 = 100_000_000;

pub type MemoryVault = Vault<InMemoryPool, StaticOracle, InMemoryTokens>;

pub fn config() -> VaultConfig {
    VaultConfig {
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
    }
}

pub struct Harness {
    pub vault: MemoryVault,
    pub pool: InMemoryPool,
    pub oracle: StaticOracle,
    pub tokens: InMemoryTokens,
}

impl Harness {
    pub fn new() -> Self {
        let tokens = InMemoryTokens::new();
        let oracle = StaticOracle::new();
        oracle.set_price(WETH, WETH_PRICE);
        oracle.set_price(USDC, USDC_PRICE);

        let pool = InMemoryPool::new(POOL, tokens.clone(), oracle.clone());
        pool.add_reserve(WETH, 7_500, 8_000);
        pool.add_reserve(USDC, 8_000, 8_500);

        // lendable liquidity
        tokens.mint(WETH, POOL, 1_000 * WAD).unwrap();
        tokens.mint(USDC, POOL, 1_000_000 * WAD).unwrap();

        let vault = Vault::new(&config(), pool.clone(), oracle.clone(), tokens.clone()).unwrap();
        vault.take_events();

        Self {
            vault,
            pool,
            oracle,
            tokens,
        }
    }

    /// give `user` tokens and approve the vault to pull them
    pub fn fund(&self, user: Account, asset: AssetId, amount: Amount) {
        self.tokens.mint(asset, user, amount).unwrap();
        self.approve_vault(user, asset);
    }

    /// unlimited allowance for the vault to pull `asset` from `user`
    pub fn approve_vault(&self, user: Account, asset: AssetId) {
        use credit_vault::AssetToken;
        self.tokens.approve(asset, user, VAULT, u128::MAX).unwrap();
    }

    pub fn wallet(&self, user: Account, asset: AssetId) -> Amount {
        use credit_vault::AssetToken;
        self.tokens.balance_of(asset, user).unwrap()
    }

    /// custodied balance the vault holds at the pool
    pub fn custodied(&self, asset: AssetId) -> Amount {
        use credit_vault::{AssetToken, PoolGateway};
        let custody = self.pool.reserve_metadata(asset).unwrap().custody_token;
        self.tokens.balance_of(custody, VAULT).unwrap()
    }

    /// debt the pool records against the vault account
    pub fn pooled_debt(&self, asset: AssetId) -> Amount {
        use credit_vault::{AssetToken, PoolGateway};
        let debt_token = self.pool.reserve_metadata(asset).unwrap().debt_token;
        self.tokens.balance_of(debt_token, VAULT).unwrap()
    }

    /// back the dead shares with real custody so claims equal deposits
    pub fn back_dead_shares(&self, asset: AssetId) {
        self.pool.donate(asset, VAULT, DEAD_SHARES).unwrap();
    }

    /// fund and deposit, backing the dead shares on the first deposit
    pub fn deposit_backed(&self, user: Account, asset: AssetId, amount: Amount) {
        let first = self.vault.pool_totals(asset).total_shares == 0;
        self.fund(user, asset, amount);
        self.vault.deposit(user, asset, amount).unwrap();
        if first {
            self.back_dead_shares(asset);
        }
    }
}
