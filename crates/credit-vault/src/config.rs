//! vault construction config
//!
//! ```toml
//! account = "0x7777777777777777777777777777777777777777"
//! owner = "0x0101010101010101010101010101010101010101"
//! pool = "0x9999999999999999999999999999999999999999"
//!
//! [[assets]]
//! asset = "0x1111111111111111111111111111111111111111"
//! ltv_bps = 7500
//! symbol = "WETH"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scaling::BPS;
use crate::types::{Account, AssetId, Bps};

/// one supported asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    pub asset: AssetId,
    pub ltv_bps: Bps,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// the vault's own account (holds custody and debt positions at the pool)
    pub account: Account,
    /// may register and (de)activate assets
    pub owner: Account,
    /// pool account approved to pull funds from the vault
    pub pool: Account,
    /// supported assets, in risk-engine iteration order
    pub assets: Vec<AssetSettings>,
}

impl VaultConfig {
    /// parse and validate
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(Error::Config("at least one asset is required".into()));
        }

        let mut seen = HashSet::new();
        for settings in &self.assets {
            if settings.ltv_bps as u128 > BPS {
                return Err(Error::InvalidLtv(settings.ltv_bps));
            }
            if !seen.insert(settings.asset) {
                return Err(Error::Config(format!("duplicate asset {}", settings.asset)));
            }
        }

        Ok(())
    }
}
