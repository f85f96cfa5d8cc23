//! Share ledger - proportional ownership of custodied collateral
//!
//! The exchange rate is never stored. It is derived on every call from the
//! live custodied balance the pool reports for the vault (`total_assets`),
//! which grows with interest outside the ledger's control.
//!
//! Rounding always favours the pool: shares minted and shares burned are
//! floored, and so is the balance a holder can claim. The one place this
//! would cost a withdrawer, burning too few shares, is instead rejected
//! outright as a dust withdrawal.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::scaling::mul_div_floor;
use crate::types::{Account, Amount, AssetId, Shares};

/// Shares minted once per asset and attributed to no one
///
/// Seeded at the first deposit so the exchange rate can never be pushed
/// around by a first depositor holding a handful of shares.
pub const DEAD_SHARES: Shares = 1_000;

/// Assets claimable by `shares` out of `total_shares` backed by `total_assets`
pub fn shares_to_assets(shares: Shares, total_shares: Shares, total_assets: Amount) -> Result<Amount> {
    if total_shares == 0 {
        return Ok(0);
    }
    mul_div_floor(shares, total_assets, total_shares)
}

/// Shares corresponding to `amount` at the current rate
pub fn assets_to_shares(amount: Amount, total_shares: Shares, total_assets: Amount) -> Result<Shares> {
    mul_div_floor(amount, total_shares, total_assets)
}

/// Result of quoting a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareMint {
    /// Shares credited to the depositor
    pub shares: Shares,
    /// Whether this deposit seeds [`DEAD_SHARES`] into the pool total
    pub seeds_pool: bool,
}

/// Per-asset, per-user share balances
#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    positions: BTreeMap<(AssetId, Account), Shares>,
    totals: BTreeMap<AssetId, Shares>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shares_of(&self, asset: AssetId, user: Account) -> Shares {
        self.positions.get(&(asset, user)).copied().unwrap_or(0)
    }

    /// Outstanding shares including the dead-share seed
    pub fn total_shares(&self, asset: AssetId) -> Shares {
        self.totals.get(&asset).copied().unwrap_or(0)
    }

    /// Claimable balance of `user`, floored
    pub fn balance_of(&self, asset: AssetId, user: Account, total_assets: Amount) -> Result<Amount> {
        shares_to_assets(self.shares_of(asset, user), self.total_shares(asset), total_assets)
    }

    /// Quote the shares a deposit of `amount` mints
    pub fn quote_mint(&self, asset: AssetId, amount: Amount, total_assets: Amount) -> Result<ShareMint> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }

        let total_shares = self.total_shares(asset);
        if total_shares == 0 {
            return Ok(ShareMint {
                shares: amount,
                seeds_pool: true,
            });
        }

        let shares = assets_to_shares(amount, total_shares, total_assets)?;
        if shares == 0 {
            return Err(Error::ZeroSharesMinted);
        }

        Ok(ShareMint {
            shares,
            seeds_pool: false,
        })
    }

    /// Credit a quoted mint
    pub fn apply_mint(&mut self, asset: AssetId, user: Account, mint: ShareMint) -> Result<()> {
        let seed = if mint.seeds_pool { DEAD_SHARES } else { 0 };
        let total = self
            .total_shares(asset)
            .checked_add(mint.shares)
            .and_then(|t| t.checked_add(seed))
            .ok_or(Error::MathOverflow)?;
        let held = self
            .shares_of(asset, user)
            .checked_add(mint.shares)
            .ok_or(Error::MathOverflow)?;

        self.totals.insert(asset, total);
        self.positions.insert((asset, user), held);
        Ok(())
    }

    /// Quote the shares a withdrawal of `amount` burns
    pub fn quote_burn(
        &self,
        asset: AssetId,
        user: Account,
        amount: Amount,
        total_assets: Amount,
    ) -> Result<Shares> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }

        let total_shares = self.total_shares(asset);
        if total_shares == 0 || total_assets == 0 {
            return Err(Error::NothingToWithdraw(asset));
        }

        let shares = assets_to_shares(amount, total_shares, total_assets)?;
        if shares == 0 {
            return Err(Error::ZeroSharesBurned);
        }

        let held = self.shares_of(asset, user);
        if held < shares {
            return Err(Error::InsufficientShares {
                held,
                required: shares,
            });
        }

        Ok(shares)
    }

    /// Debit a quoted burn
    pub fn apply_burn(&mut self, asset: AssetId, user: Account, shares: Shares) -> Result<()> {
        let held = self.shares_of(asset, user);
        let remaining = held.checked_sub(shares).ok_or(Error::InsufficientShares {
            held,
            required: shares,
        })?;
        let total = self
            .total_shares(asset)
            .checked_sub(shares)
            .ok_or(Error::MathOverflow)?;

        self.totals.insert(asset, total);
        if remaining == 0 {
            self.positions.remove(&(asset, user));
        } else {
            self.positions.insert((asset, user), remaining);
        }
        Ok(())
    }

    /// Holders of an asset and their shares
    pub fn holders(&self, asset: AssetId) -> impl Iterator<Item = (Account, Shares)> + '_ {
        self.positions
            .range((asset, Account::default())..)
            .take_while(move |((a, _), _)| *a == asset)
            .map(|((_, user), shares)| (*user, *shares))
    }

    /// Exact values of the entries an operation on `(asset, user)` touches
    pub(crate) fn entry(&self, asset: AssetId, user: Account) -> (Option<Shares>, Option<Shares>) {
        (
            self.positions.get(&(asset, user)).copied(),
            self.totals.get(&asset).copied(),
        )
    }

    pub(crate) fn restore_entry(
        &mut self,
        asset: AssetId,
        user: Account,
        (position, total): (Option<Shares>, Option<Shares>),
    ) {
        match position {
            Some(shares) => self.positions.insert((asset, user), shares),
            None => self.positions.remove(&(asset, user)),
        };
        match total {
            Some(shares) => self.totals.insert(asset, shares),
            None => self.totals.remove(&asset),
        };
    }
}
