//! Core types shared by the ledgers, the risk engine and the gateways
//!
//! Identifiers are 20-byte addresses, printed and parsed as `0x`-prefixed
//! lowercase hex. Amounts are raw token units (18 decimals assumed, see
//! [`crate::scaling`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::risk::HealthFactor;
use crate::scaling::U256;

/// Raw token amount in the asset's smallest unit
pub type Amount = u128;

/// Units of proportional ownership of a custodied balance
pub type Shares = u128;

/// Basis points (10000 = 100%)
pub type Bps = u16;

/// Error parsing a hex address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("expected 40 hex digits, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

fn parse_address(s: &str) -> Result<[u8; 20], AddressParseError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() != 40 {
        return Err(AddressParseError::InvalidLength(digits.len()));
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
    Ok(out)
}

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 20]);

        impl $name {
            /// Address with every byte set to `byte` (handy for fixtures)
            pub const fn repeat_byte(byte: u8) -> Self {
                Self([byte; 20])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = AddressParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_address(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

address_type!(
    /// Token / reserve identifier
    AssetId
);

address_type!(
    /// A user, the vault itself, or the pool
    Account
);

/// Interest rate mode for borrow and repay calls into the pool
///
/// Only [`RateMode::Variable`] is accepted by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateMode {
    Stable,
    Variable,
}

impl RateMode {
    /// Numeric code used by the pool ABI
    pub fn code(self) -> u8 {
        match self {
            RateMode::Stable => 1,
            RateMode::Variable => 2,
        }
    }
}

/// The four ledger-mutating operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Withdraw,
    Borrow,
    Repay,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Borrow => "borrow",
            OperationKind::Repay => "repay",
        };
        f.write_str(name)
    }
}

/// An operation whose effect the risk engine simulates before commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub asset: AssetId,
    pub amount: Amount,
}

impl PendingOperation {
    pub fn new(kind: OperationKind, asset: AssetId, amount: Amount) -> Self {
        Self { kind, asset, amount }
    }
}

// ============================================================================
// Reserve configuration
// ============================================================================

const LTV_MASK: u64 = 0xFFFF;
const LIQUIDATION_THRESHOLD_SHIFT: usize = 16;
const LIQUIDATION_BONUS_SHIFT: usize = 32;
const DECIMALS_SHIFT: usize = 48;
const ACTIVE_BIT: usize = 56;
const FROZEN_BIT: usize = 57;
const BORROWING_BIT: usize = 58;

/// Packed reserve risk-parameter word as published by the lending pool
///
/// ```text
/// bits  0-15  loan-to-value (bps)
/// bits 16-31  liquidation threshold (bps)
/// bits 32-47  liquidation bonus (bps)
/// bits 48-55  decimals
/// bit  56     active
/// bit  57     frozen
/// bit  58     borrowing enabled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveConfiguration(pub U256);

impl Default for ReserveConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl ReserveConfiguration {
    pub fn new() -> Self {
        Self(U256::zero())
    }

    fn field(&self, shift: usize, mask: u64) -> u64 {
        ((self.0 >> shift) & U256::from(mask)).low_u64()
    }

    fn with_field(self, shift: usize, mask: u64, value: u64) -> Self {
        let cleared = self.0 & !(U256::from(mask) << shift);
        Self(cleared | (U256::from(value & mask) << shift))
    }

    fn flag(&self, bit: usize) -> bool {
        self.0.bit(bit)
    }

    fn with_flag(self, bit: usize, on: bool) -> Self {
        self.with_field(bit, 1, on as u64)
    }

    pub fn ltv(&self) -> Bps {
        self.field(0, LTV_MASK) as Bps
    }

    pub fn liquidation_threshold(&self) -> Bps {
        self.field(LIQUIDATION_THRESHOLD_SHIFT, LTV_MASK) as Bps
    }

    pub fn liquidation_bonus(&self) -> Bps {
        self.field(LIQUIDATION_BONUS_SHIFT, LTV_MASK) as Bps
    }

    pub fn decimals(&self) -> u8 {
        self.field(DECIMALS_SHIFT, 0xFF) as u8
    }

    pub fn is_active(&self) -> bool {
        self.flag(ACTIVE_BIT)
    }

    pub fn is_frozen(&self) -> bool {
        self.flag(FROZEN_BIT)
    }

    pub fn borrowing_enabled(&self) -> bool {
        self.flag(BORROWING_BIT)
    }

    pub fn with_ltv(self, bps: Bps) -> Self {
        self.with_field(0, LTV_MASK, bps as u64)
    }

    pub fn with_liquidation_threshold(self, bps: Bps) -> Self {
        self.with_field(LIQUIDATION_THRESHOLD_SHIFT, LTV_MASK, bps as u64)
    }

    pub fn with_liquidation_bonus(self, bps: Bps) -> Self {
        self.with_field(LIQUIDATION_BONUS_SHIFT, LTV_MASK, bps as u64)
    }

    pub fn with_decimals(self, decimals: u8) -> Self {
        self.with_field(DECIMALS_SHIFT, 0xFF, decimals as u64)
    }

    pub fn with_active(self, on: bool) -> Self {
        self.with_flag(ACTIVE_BIT, on)
    }

    pub fn with_frozen(self, on: bool) -> Self {
        self.with_flag(FROZEN_BIT, on)
    }

    pub fn with_borrowing_enabled(self, on: bool) -> Self {
        self.with_flag(BORROWING_BIT, on)
    }
}

/// Reserve data the vault needs from the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveMetadata {
    /// Interest-bearing token representing custodied supply
    pub custody_token: AssetId,
    /// Token tracking variable-rate debt
    pub debt_token: AssetId,
    pub configuration: ReserveConfiguration,
}

/// Pool-side view of an account across all reserves
///
/// Values are in base currency with 18 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub total_collateral_value: u128,
    pub total_debt_value: u128,
    pub available_borrow_value: u128,
    pub liquidation_threshold: Bps,
    pub ltv: Bps,
    pub health_factor: HealthFactor,
}
