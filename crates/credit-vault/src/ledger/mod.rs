//! Collateral and debt accounting owned by the vault
//!
//! Both ledgers are plain tables keyed by `(asset, user)` with per-asset
//! totals. Neither stores exchange rates: conversions take the live pool
//! balance as an argument.

pub mod debt;
pub mod shares;

pub use debt::DebtLedger;
pub use shares::{ShareLedger, ShareMint, DEAD_SHARES};

use serde::{Deserialize, Serialize};

use crate::types::{Account, Amount, AssetId, Shares};

/// Aggregate ledger state for one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolTotals {
    /// Includes the dead-share seed
    pub total_shares: Shares,
    pub total_principal: Amount,
}

/// A user's ledger entries for one asset, with the asset totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub asset: AssetId,
    pub shares: Shares,
    pub total_shares: Shares,
    pub principal: Amount,
    pub total_principal: Amount,
}

/// Saved values of the entries one operation may touch
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    asset: AssetId,
    user: Account,
    shares: (Option<Shares>, Option<Shares>),
    debt: (Option<Amount>, Option<Amount>),
}

/// The vault's ledgers
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub shares: ShareLedger,
    pub debt: DebtLedger,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self, asset: AssetId) -> PoolTotals {
        PoolTotals {
            total_shares: self.shares.total_shares(asset),
            total_principal: self.debt.total_principal(asset),
        }
    }

    /// User entries for each of `assets`, in order
    pub fn snapshot(&self, user: Account, assets: &[AssetId]) -> Vec<LedgerEntry> {
        assets
            .iter()
            .map(|&asset| LedgerEntry {
                asset,
                shares: self.shares.shares_of(asset, user),
                total_shares: self.shares.total_shares(asset),
                principal: self.debt.principal_of(asset, user),
                total_principal: self.debt.total_principal(asset),
            })
            .collect()
    }

    pub fn checkpoint(&self, asset: AssetId, user: Account) -> Checkpoint {
        Checkpoint {
            asset,
            user,
            shares: self.shares.entry(asset, user),
            debt: self.debt.entry(asset, user),
        }
    }

    /// Put back everything recorded in `checkpoint`
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        let Checkpoint {
            asset,
            user,
            shares,
            debt,
        } = checkpoint;
        self.shares.restore_entry(asset, user, shares);
        self.debt.restore_entry(asset, user, debt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WETH: AssetId = AssetId::repeat_byte(1);
    const USDC: AssetId = AssetId::repeat_byte(2);
    const ALICE: Account = Account::repeat_byte(0xa1);

    #[test]
    fn test_checkpoint_restores_both_ledgers() {
        let mut ledger = Ledger::new();
        let mint = ledger.shares.quote_mint(WETH, 500, 0).unwrap();
        ledger.shares.apply_mint(WETH, ALICE, mint).unwrap();

        let checkpoint = ledger.checkpoint(WETH, ALICE);
        ledger.shares.apply_burn(WETH, ALICE, 200).unwrap();
        ledger.debt.apply_borrow(WETH, ALICE, 50).unwrap();

        ledger.restore(checkpoint);
        assert_eq!(
            ledger.totals(WETH),
            PoolTotals {
                total_shares: 500 + DEAD_SHARES,
                total_principal: 0,
            }
        );
        assert_eq!(ledger.shares.shares_of(WETH, ALICE), 500);
        assert_eq!(ledger.debt.principal_of(WETH, ALICE), 0);
    }

    #[test]
    fn test_snapshot_follows_asset_order() {
        let mut ledger = Ledger::new();
        ledger.debt.apply_borrow(USDC, ALICE, 7).unwrap();

        let snapshot = ledger.snapshot(ALICE, &[USDC, WETH]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].asset, USDC);
        assert_eq!(snapshot[0].principal, 7);
        assert_eq!(snapshot[1].total_shares, 0);
    }
}
