//! Domain events for off-chain observers

use serde::{Deserialize, Serialize};

use crate::types::{Account, Amount, AssetId, Bps, Shares};

/// Events emitted by the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    Deposited {
        user: Account,
        asset: AssetId,
        amount: Amount,
        shares_minted: Shares,
    },
    Withdrawn {
        user: Account,
        asset: AssetId,
        /// Amount actually released by the pool
        amount: Amount,
        shares_burned: Shares,
    },
    Borrowed {
        user: Account,
        asset: AssetId,
        amount: Amount,
        principal_added: Amount,
    },
    Repaid {
        user: Account,
        asset: AssetId,
        amount: Amount,
        principal_reduced: Amount,
    },
    AssetRegistered {
        asset: AssetId,
        ltv_bps: Bps,
        symbol: String,
    },
    AssetStatusChanged {
        asset: AssetId,
        active: bool,
    },
}

impl VaultEvent {
    /// Asset the event refers to
    pub fn asset(&self) -> AssetId {
        match self {
            VaultEvent::Deposited { asset, .. }
            | VaultEvent::Withdrawn { asset, .. }
            | VaultEvent::Borrowed { asset, .. }
            | VaultEvent::Repaid { asset, .. }
            | VaultEvent::AssetRegistered { asset, .. }
            | VaultEvent::AssetStatusChanged { asset, .. } => *asset,
        }
    }

    /// Acting user, if the event came from a user operation
    pub fn user(&self) -> Option<Account> {
        match self {
            VaultEvent::Deposited { user, .. }
            | VaultEvent::Withdrawn { user, .. }
            | VaultEvent::Borrowed { user, .. }
            | VaultEvent::Repaid { user, .. } => Some(*user),
            VaultEvent::AssetRegistered { .. } | VaultEvent::AssetStatusChanged { .. } => None,
        }
    }
}

/// Append-only log of emitted events
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<VaultEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: VaultEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Remove and return everything logged so far
    pub fn drain(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
