//! scenario files: a vault config, the pool under it, and steps to replay
//!
//! ```toml
//! [vault]
//! account = "0x7777777777777777777777777777777777777777"
//! owner = "0x0101010101010101010101010101010101010101"
//! pool = "0x9999999999999999999999999999999999999999"
//!
//! [[vault.assets]]
//! asset = "0x1111111111111111111111111111111111111111"
//! ltv_bps = 7500
//! symbol = "WETH"
//!
//! [[reserves]]
//! asset = "0x1111111111111111111111111111111111111111"
//! ltv_bps = 7500
//! liquidation_threshold_bps = 8000
//! price = "2000"
//! liquidity = "1000"
//!
//! [[balances]]
//! user = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
//! asset = "0x1111111111111111111111111111111111111111"
//! amount = "10"
//!
//! [[steps]]
//! action = "deposit"
//! user = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
//! asset = "0x1111111111111111111111111111111111111111"
//! amount = "5"
//! ```
//!
//! amounts are decimal strings in whole tokens (18 decimals), prices are
//! decimal strings in the base currency (8 decimals).

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use credit_vault::{
    Account, AccountPosition, Amount, AssetId, AssetToken, Bps, Error, GatewayError, HealthFactor,
    InMemoryPool, InMemoryTokens, RateMode, StaticOracle, Vault, VaultConfig, VaultEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const AMOUNT_DECIMALS: u32 = 18;
pub const PRICE_DECIMALS: u32 = 8;

pub type MemoryVault = Vault<InMemoryPool, StaticOracle, InMemoryTokens>;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub vault: VaultConfig,
    #[serde(default)]
    pub reserves: Vec<Reserve>,
    #[serde(default)]
    pub balances: Vec<Balance>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// a pool reserve and its oracle price
#[derive(Debug, Clone, Deserialize)]
pub struct Reserve {
    pub asset: AssetId,
    pub ltv_bps: Bps,
    pub liquidation_threshold_bps: Bps,
    pub price: String,
    /// underlying the pool can lend out
    #[serde(default)]
    pub liquidity: Option<String>,
}

/// initial wallet balance
#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    pub user: Account,
    pub asset: AssetId,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// error kind the step must fail with, e.g. "health_factor_too_low"
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Deposit {
        user: Account,
        asset: AssetId,
        amount: String,
    },
    Withdraw {
        user: Account,
        asset: AssetId,
        amount: String,
    },
    Borrow {
        user: Account,
        asset: AssetId,
        amount: String,
        #[serde(default)]
        rate_mode: Option<RateMode>,
    },
    Repay {
        user: Account,
        asset: AssetId,
        amount: String,
    },
    /// grow every custody and debt balance of the reserve
    Accrue { asset: AssetId, bps: Bps },
    SetPrice { asset: AssetId, price: String },
    SetActive { asset: AssetId, active: bool },
    SetFrozen { asset: AssetId, frozen: bool },
    /// print the user's position without changing anything
    Report { user: Account },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::Borrow { .. } => "borrow",
            Action::Repay { .. } => "repay",
            Action::Accrue { .. } => "accrue",
            Action::SetPrice { .. } => "set_price",
            Action::SetActive { .. } => "set_active",
            Action::SetFrozen { .. } => "set_frozen",
            Action::Report { .. } => "report",
        }
    }

    pub fn user(&self) -> Option<Account> {
        match self {
            Action::Deposit { user, .. }
            | Action::Withdraw { user, .. }
            | Action::Borrow { user, .. }
            | Action::Repay { user, .. }
            | Action::Report { user } => Some(*user),
            _ => None,
        }
    }
}

impl Scenario {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(s).context("failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.vault.validate()?;

        let reserves: BTreeSet<AssetId> = self.reserves.iter().map(|r| r.asset).collect();
        if reserves.len() != self.reserves.len() {
            bail!("duplicate reserve in scenario");
        }
        for settings in &self.vault.assets {
            if !reserves.contains(&settings.asset) {
                bail!("vault asset {} ({}) has no reserve", settings.asset, settings.symbol);
            }
        }
        Ok(())
    }

    /// every account that holds a balance or acts in a step
    pub fn users(&self) -> BTreeSet<Account> {
        self.balances
            .iter()
            .map(|b| b.user)
            .chain(self.steps.iter().filter_map(|s| s.action.user()))
            .collect()
    }
}

/// parse a decimal string into an integer with `decimals` fractional digits
pub fn parse_units(s: &str, decimals: u32) -> Result<u128> {
    let s = s.trim().replace('_', "");
    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (s.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        bail!("invalid amount '{}'", s);
    }
    if frac.len() > decimals as usize {
        bail!("'{}' has more than {} decimals", s, decimals);
    }

    let scale = 10u128.pow(decimals);
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse()? };
    let frac: u128 = if frac.is_empty() {
        0
    } else {
        frac.parse::<u128>()? * 10u128.pow(decimals - frac.len() as u32)
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| anyhow!("amount '{}' overflows", s))
}

/// inverse of [`parse_units`], trailing zeros trimmed
pub fn format_units(value: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// stable name of an error kind, as written in `expect_error`
pub fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::InvalidAmount => "invalid_amount",
        Error::AssetNotSupported(_) => "asset_not_supported",
        Error::UnsupportedRateMode(_) => "unsupported_rate_mode",
        Error::ZeroSharesMinted => "zero_shares_minted",
        Error::ZeroSharesBurned => "zero_shares_burned",
        Error::InsufficientShares { .. } => "insufficient_shares",
        Error::NothingToWithdraw(_) => "nothing_to_withdraw",
        Error::RepayExceedsDebt { .. } => "repay_exceeds_debt",
        Error::HealthFactorTooLow { .. } => "health_factor_too_low",
        Error::ReentrancyViolation => "reentrancy_violation",
        Error::Unauthorized(_) => "unauthorized",
        Error::InvalidLtv(_) => "invalid_ltv",
        Error::UnsupportedDecimals { .. } => "unsupported_decimals",
        Error::MathOverflow => "math_overflow",
        Error::Config(_) => "config",
        Error::Gateway(err) => match err {
            GatewayError::ReserveNotFound(_) => "reserve_not_found",
            GatewayError::ReserveFrozen(_) => "reserve_frozen",
            GatewayError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            GatewayError::PriceUnavailable(_) => "price_unavailable",
            GatewayError::InsufficientBalance { .. } => "insufficient_balance",
            GatewayError::InsufficientAllowance { .. } => "insufficient_allowance",
            GatewayError::Rejected(_) => "rejected",
        },
    }
}

/// outcome of one replayed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Account>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub events: Vec<VaultEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_factor: Option<HealthFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<AccountPosition>,
}

/// a vault wired to in-memory collaborators built from a scenario
pub struct Replay {
    pub vault: MemoryVault,
    pub pool: InMemoryPool,
    pub oracle: StaticOracle,
    pub tokens: InMemoryTokens,
}

impl Replay {
    pub fn build(scenario: &Scenario) -> Result<Self> {
        let config = &scenario.vault;
        let tokens = InMemoryTokens::new();
        let oracle = StaticOracle::new();
        let pool = InMemoryPool::new(config.pool, tokens.clone(), oracle.clone());

        for reserve in &scenario.reserves {
            pool.add_reserve(reserve.asset, reserve.ltv_bps, reserve.liquidation_threshold_bps);
            let price = parse_units(&reserve.price, PRICE_DECIMALS)
                .with_context(|| format!("price of {}", reserve.asset))?;
            oracle.set_price(reserve.asset, price);

            if let Some(liquidity) = &reserve.liquidity {
                let liquidity = parse_units(liquidity, AMOUNT_DECIMALS)
                    .with_context(|| format!("liquidity of {}", reserve.asset))?;
                tokens.mint(reserve.asset, config.pool, liquidity)?;
            }
            debug!(asset = %reserve.asset, price, "reserve listed");
        }

        for balance in &scenario.balances {
            let amount = parse_units(&balance.amount, AMOUNT_DECIMALS)
                .with_context(|| format!("balance of {}", balance.user))?;
            tokens.mint(balance.asset, balance.user, amount)?;
        }

        // users pull-approve the vault for every listed asset up front
        for user in scenario.users() {
            for reserve in &scenario.reserves {
                tokens.approve(reserve.asset, user, config.account, u128::MAX)?;
            }
        }

        let vault = Vault::new(config, pool.clone(), oracle.clone(), tokens.clone())
            .context("failed to construct vault")?;
        // registrations belong to construction, not to step 1
        let registered = vault.take_events();
        info!(account = %config.account, assets = registered.len(), "vault ready");

        Ok(Self {
            vault,
            pool,
            oracle,
            tokens,
        })
    }

    /// replay every step, handing each report to `sink` as it completes
    ///
    /// stops at the first step whose outcome differs from its expectation.
    pub fn run<F>(&self, steps: &[Step], mut sink: F) -> Result<Vec<StepReport>>
    where
        F: FnMut(&StepReport) -> Result<()>,
    {
        let mut reports = Vec::with_capacity(steps.len());
        for (index, entry) in steps.iter().enumerate() {
            let step = index + 1;
            let report = self.execute(step, &entry.action)?;
            sink(&report)?;

            match (&entry.expect_error, report.error_kind) {
                (None, None) => {}
                (Some(expected), Some(actual)) if expected == actual => {}
                (Some(expected), Some(actual)) => {
                    bail!("step {}: expected {}, failed with {}", step, expected, actual)
                }
                (Some(expected), None) => {
                    bail!("step {}: expected {}, but {} succeeded", step, expected, report.action)
                }
                (None, Some(_)) => bail!(
                    "step {} ({}) failed: {}",
                    step,
                    report.action,
                    report.error.as_deref().unwrap_or_default()
                ),
            }
            reports.push(report);
        }
        Ok(reports)
    }

    fn execute(&self, step: usize, action: &Action) -> Result<StepReport> {
        let user = action.user();
        let mut position = None;

        let outcome: std::result::Result<(), Error> = match action {
            Action::Deposit { user, asset, amount } => {
                let amount = units(amount)?;
                self.vault.deposit(*user, *asset, amount).map(|_| ())
            }
            Action::Withdraw { user, asset, amount } => {
                let amount = units(amount)?;
                self.vault.withdraw(*user, *asset, amount).map(|_| ())
            }
            Action::Borrow {
                user,
                asset,
                amount,
                rate_mode,
            } => {
                let amount = units(amount)?;
                let rate_mode = rate_mode.unwrap_or(RateMode::Variable);
                self.vault.borrow(*user, *asset, amount, rate_mode)
            }
            Action::Repay { user, asset, amount } => {
                let amount = units(amount)?;
                self.vault.repay(*user, *asset, amount).map(|_| ())
            }
            Action::Accrue { asset, bps } => self.pool.accrue_interest(*asset, *bps).map_err(Error::from),
            Action::SetPrice { asset, price } => {
                let price = parse_units(price, PRICE_DECIMALS)?;
                self.oracle.set_price(*asset, price);
                Ok(())
            }
            Action::SetActive { asset, active } => {
                self.vault.set_asset_active(self.vault.owner(), *asset, *active)
            }
            Action::SetFrozen { asset, frozen } => self.pool.set_frozen(*asset, *frozen).map_err(Error::from),
            Action::Report { user } => self.vault.account_position(*user).map(|p| {
                position = Some(p);
            }),
        };

        let (error, error_kind) = match &outcome {
            Ok(()) => (None, None),
            Err(err) => {
                warn!(step, action = action.name(), error = %err, "step rejected");
                (Some(err.to_string()), Some(error_kind(err)))
            }
        };

        let health_factor = match user {
            Some(user) => Some(self.vault.health_factor(user)?),
            None => None,
        };

        Ok(StepReport {
            step,
            action: action.name(),
            user,
            ok: outcome.is_ok(),
            error,
            error_kind,
            events: self.vault.take_events(),
            health_factor,
            position,
        })
    }
}

fn units(amount: &str) -> Result<Amount> {
    parse_units(amount, AMOUNT_DECIMALS)
}
