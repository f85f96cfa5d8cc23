//! # credit-vault
//!
//! pooled collateral and credit over an external lending pool.
//!
//! many users deposit collateral into one vault account at the pool and
//! borrow against it. the vault keeps the per-user books; custody, interest
//! and prices belong to the pool and the oracle.
//!
//! ## architecture
//!
//! ```text
//!            deposit / withdraw / borrow / repay
//!                           │
//!                           ▼
//!  ┌──────────────────────────────────────────────────┐
//!  │                      Vault                       │
//!  │        (reentrancy lock held for the call)       │
//!  │                                                  │
//!  │  ┌──────────────┐  ┌────────────┐  ┌──────────┐  │
//!  │  │AssetRegistry │  │ShareLedger │  │DebtLedger│  │
//!  │  └──────┬───────┘  └─────┬──────┘  └────┬─────┘  │
//!  │         └────────┬───────┴──────────────┘        │
//!  │                  ▼                               │
//!  │            ┌────────────┐                        │
//!  │            │ RiskEngine │  simulated health      │
//!  │            └─────┬──────┘  factor > 1.1          │
//!  └──────────────────┼───────────────────────────────┘
//!                     │
//!       ┌─────────────┼──────────────┐
//!       ▼             ▼              ▼
//!  ┌──────────┐ ┌───────────┐ ┌────────────┐
//!  │PoolGateway│ │PriceOracle│ │ AssetToken │
//!  └──────────┘ └───────────┘ └────────────┘
//! ```
//!
//! ## accounting
//!
//! - collateral is held as shares of the vault's custodied balance. the
//!   first deposit into an asset seeds [`ledger::DEAD_SHARES`] that belong
//!   to no one
//! - debt is held as principal, converted to an owed amount against the
//!   vault's live pooled debt
//! - every conversion floors, so rounding never lets a user take out more
//!   than they are owed
//!
//! ## usage
//!
//! ```rust,ignore
//! use credit_vault::{Vault, VaultConfig, RateMode};
//!
//! let config = VaultConfig::load("vault.toml")?;
//! let vault = Vault::new(&config, pool, oracle, tokens)?;
//!
//! vault.deposit(alice, weth, 5 * WAD)?;
//! vault.borrow(alice, usdc, 4_000 * WAD, RateMode::Variable)?;
//! println!("health factor {}", vault.health_factor(alice)?);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod guard;
pub mod ledger;
pub mod registry;
pub mod risk;
pub mod scaling;
pub mod types;
pub mod vault;

pub use config::{AssetSettings, VaultConfig};
pub use error::{Error, GatewayError, GatewayResult, Result};
pub use events::VaultEvent;
pub use gateway::{AssetToken, PoolGateway, PriceOracle};
pub use ledger::{PoolTotals, DEAD_SHARES};
pub use registry::{AssetConfig, AssetRegistry};
pub use risk::{HealthFactor, RiskEngine, Valuation};
pub use scaling::{U256, WAD};
pub use types::{
    Account, AccountSummary, Amount, AssetId, Bps, OperationKind, PendingOperation, RateMode,
    ReserveConfiguration, ReserveMetadata, Shares,
};
pub use vault::{AccountPosition, Vault};

#[cfg(feature = "memory")]
pub use gateway::memory::{InMemoryPool, InMemoryTokens, StaticOracle};
