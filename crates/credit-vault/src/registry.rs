//! Asset Registry - supported assets and their vault-side risk parameters
//!
//! The registry is populated at construction and is only written by the
//! vault's owner afterwards. Entries are never removed; an asset can only be
//! switched inactive, which stops new deposits and borrows against it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::VaultEvent;
use crate::scaling::BPS;
use crate::types::{AssetId, Bps};

/// Per-asset configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub asset: AssetId,
    /// Maximum borrowable fraction of collateral value (bps)
    pub ltv_bps: Bps,
    /// Whether new deposits and borrows are accepted
    pub active: bool,
    /// Display symbol
    pub symbol: String,
}

/// Ordered table of supported assets
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    configs: HashMap<AssetId, AssetConfig>,
    /// Registration order; iteration order of the risk engine
    order: Vec<AssetId>,
}

impl AssetRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an asset's configuration and mark it active
    pub fn register(&mut self, asset: AssetId, ltv_bps: Bps, symbol: &str) -> Result<VaultEvent> {
        if ltv_bps as u128 > BPS {
            return Err(Error::InvalidLtv(ltv_bps));
        }

        if !self.configs.contains_key(&asset) {
            self.order.push(asset);
        }
        self.configs.insert(
            asset,
            AssetConfig {
                asset,
                ltv_bps,
                active: true,
                symbol: symbol.to_string(),
            },
        );

        Ok(VaultEvent::AssetRegistered {
            asset,
            ltv_bps,
            symbol: symbol.to_string(),
        })
    }

    /// Switch an asset on or off
    pub fn set_active(&mut self, asset: AssetId, active: bool) -> Result<VaultEvent> {
        let config = self
            .configs
            .get_mut(&asset)
            .ok_or(Error::AssetNotSupported(asset))?;
        config.active = active;
        Ok(VaultEvent::AssetStatusChanged { asset, active })
    }

    /// Get configuration by asset
    pub fn get(&self, asset: AssetId) -> Option<&AssetConfig> {
        self.configs.get(&asset)
    }

    /// Loan-to-value of an active asset
    pub fn ltv(&self, asset: AssetId) -> Result<Bps> {
        self.require_active(asset).map(|c| c.ltv_bps)
    }

    /// Check if asset is registered and active
    pub fn is_active(&self, asset: AssetId) -> bool {
        self.configs.get(&asset).map(|c| c.active).unwrap_or(false)
    }

    pub fn is_registered(&self, asset: AssetId) -> bool {
        self.configs.contains_key(&asset)
    }

    pub fn require_active(&self, asset: AssetId) -> Result<&AssetConfig> {
        self.configs
            .get(&asset)
            .filter(|c| c.active)
            .ok_or(Error::AssetNotSupported(asset))
    }

    pub fn require_registered(&self, asset: AssetId) -> Result<&AssetConfig> {
        self.configs
            .get(&asset)
            .ok_or(Error::AssetNotSupported(asset))
    }

    /// Registered assets in registration order
    pub fn assets(&self) -> &[AssetId] {
        &self.order
    }

    /// Configurations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &AssetConfig> {
        self.order.iter().filter_map(|asset| self.configs.get(asset))
    }

    /// Total registered assets
    pub fn count(&self) -> usize {
        self.order.len()
    }
}
