//! Debt ledger - borrowed principal against the vault's pooled debt
//!
//! Principal is additive: a borrow of `n` records `n`. What a user owes is
//! their slice of the live debt balance the vault carries at the pool
//! (`total_debt`), which accrues interest uniformly across all borrowers.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::scaling::mul_div_floor;
use crate::types::{Account, Amount, AssetId};

/// Live debt attributed to `principal` out of `total_principal`
pub fn principal_to_debt(principal: Amount, total_principal: Amount, total_debt: Amount) -> Result<Amount> {
    if principal == 0 || total_principal == 0 {
        return Ok(0);
    }
    mul_div_floor(principal, total_debt, total_principal)
}

/// Per-asset, per-user borrowed principal
#[derive(Debug, Clone, Default)]
pub struct DebtLedger {
    principals: BTreeMap<(AssetId, Account), Amount>,
    totals: BTreeMap<AssetId, Amount>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn principal_of(&self, asset: AssetId, user: Account) -> Amount {
        self.principals.get(&(asset, user)).copied().unwrap_or(0)
    }

    pub fn total_principal(&self, asset: AssetId) -> Amount {
        self.totals.get(&asset).copied().unwrap_or(0)
    }

    /// Amount `user` currently owes, floored
    pub fn debt_of(&self, asset: AssetId, user: Account, total_debt: Amount) -> Result<Amount> {
        principal_to_debt(
            self.principal_of(asset, user),
            self.total_principal(asset),
            total_debt,
        )
    }

    /// Record a borrow of `amount`
    pub fn apply_borrow(&mut self, asset: AssetId, user: Account, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        let principal = self
            .principal_of(asset, user)
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        let total = self
            .total_principal(asset)
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;

        self.principals.insert((asset, user), principal);
        self.totals.insert(asset, total);
        Ok(())
    }

    /// Principal retired by repaying `amount` of an `owed` debt
    ///
    /// Proportional rather than literal: repaying everything owed retires
    /// the whole principal, leaving no dust.
    pub fn quote_repay(&self, asset: AssetId, user: Account, amount: Amount, owed: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        if amount > owed {
            return Err(Error::RepayExceedsDebt {
                requested: amount,
                owed,
            });
        }
        mul_div_floor(self.principal_of(asset, user), amount, owed)
    }

    /// Retire quoted principal
    pub fn apply_repay(&mut self, asset: AssetId, user: Account, principal: Amount) -> Result<()> {
        let remaining = self
            .principal_of(asset, user)
            .checked_sub(principal)
            .ok_or(Error::MathOverflow)?;
        let total = self
            .total_principal(asset)
            .checked_sub(principal)
            .ok_or(Error::MathOverflow)?;

        self.totals.insert(asset, total);
        if remaining == 0 {
            self.principals.remove(&(asset, user));
        } else {
            self.principals.insert((asset, user), remaining);
        }
        Ok(())
    }

    /// Borrowers of an asset and their principal
    pub fn borrowers(&self, asset: AssetId) -> impl Iterator<Item = (Account, Amount)> + '_ {
        self.principals
            .range((asset, Account::default())..)
            .take_while(move |((a, _), _)| *a == asset)
            .map(|((_, user), principal)| (*user, *principal))
    }

    pub(crate) fn entry(&self, asset: AssetId, user: Account) -> (Option<Amount>, Option<Amount>) {
        (
            self.principals.get(&(asset, user)).copied(),
            self.totals.get(&asset).copied(),
        )
    }

    pub(crate) fn restore_entry(
        &mut self,
        asset: AssetId,
        user: Account,
        (principal, total): (Option<Amount>, Option<Amount>),
    ) {
        match principal {
            Some(p) => self.principals.insert((asset, user), p),
            None => self.principals.remove(&(asset, user)),
        };
        match total {
            Some(t) => self.totals.insert(asset, t),
            None => self.totals.remove(&asset),
        };
    }
}
