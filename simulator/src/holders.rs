//! Simulated holder wallets.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use assetbank_common::{AssetKind, AssetSpec, HolderId, UnitAmount};
use assetbank_engine::{AssetEndpoint, Bank, Custody, InMemoryAssetEndpoint};

/// A withdrawal to attempt from inside the next delivery.
#[derive(Debug, Clone)]
pub struct Reentry {
    pub asset: AssetKind,
    pub units: UnitAmount,
}

/// Wallets for one asset. Can be armed to call back into the bank.
pub struct WalletEndpoint {
    wallets: InMemoryAssetEndpoint,
    bank: OnceLock<Weak<Bank>>,
    armed: Mutex<Option<Reentry>>,
    reentry_outcomes: Mutex<Vec<String>>,
}

impl WalletEndpoint {
    pub fn new() -> Self {
        Self {
            wallets: InMemoryAssetEndpoint::new(),
            bank: OnceLock::new(),
            armed: Mutex::new(None),
            reentry_outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn wallets(&self) -> &InMemoryAssetEndpoint {
        &self.wallets
    }

    pub fn arm(&self, reentry: Reentry) {
        *self.armed.lock() = Some(reentry);
    }

    /// Error codes (or `OK`) of the re-entrant calls made so far.
    pub fn reentry_outcomes(&self) -> Vec<String> {
        self.reentry_outcomes.lock().clone()
    }

    async fn reenter(&self, holder: &HolderId, reentry: Reentry) {
        let Some(bank) = self.bank.get().and_then(Weak::upgrade) else {
            return;
        };

        let outcome = match bank.withdraw(holder, &reentry.asset, reentry.units).await {
            Ok(_) => "OK".to_string(),
            Err(e) => e.error_code().to_string(),
        };
        warn!(holder = %holder, outcome = %outcome, "Wallet re-entered the bank");
        self.reentry_outcomes.lock().push(outcome);
    }
}

impl Default for WalletEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetEndpoint for WalletEndpoint {
    async fn pull_from(&self, holder: &HolderId, amount: u128) -> bool {
        self.wallets.pull_from(holder, amount).await
    }

    async fn take_attached(&self, holder: &HolderId, amount: u128) -> bool {
        self.wallets.take_attached(holder, amount).await
    }

    async fn push_to(&self, holder: &HolderId, amount: u128) -> bool {
        let delivered = self.wallets.push_to(holder, amount).await;
        let armed = self.armed.lock().take();
        if let Some(reentry) = armed {
            self.reenter(holder, reentry).await;
        }
        delivered
    }
}

/// One wallet endpoint per configured asset.
pub struct Wallets {
    endpoints: BTreeMap<AssetKind, Arc<WalletEndpoint>>,
}

impl Wallets {
    pub fn new<'a>(assets: impl IntoIterator<Item = &'a AssetSpec>) -> Self {
        Self {
            endpoints: assets
                .into_iter()
                .map(|spec| (spec.kind.clone(), Arc::new(WalletEndpoint::new())))
                .collect(),
        }
    }

    /// Custody backed by these wallets.
    pub fn custody(&self) -> Custody {
        self.endpoints
            .iter()
            .fold(Custody::new(), |custody, (kind, endpoint)| {
                custody.with_endpoint(kind.clone(), endpoint.clone())
            })
    }

    /// Let armed wallets reach the bank.
    pub fn bind(&self, bank: &Arc<Bank>) {
        for endpoint in self.endpoints.values() {
            let _ = endpoint.bank.set(Arc::downgrade(bank));
        }
    }

    /// Re-entrant call outcomes across every wallet.
    pub fn reentry_outcomes(&self) -> Vec<String> {
        self.endpoints
            .values()
            .flat_map(|endpoint| endpoint.reentry_outcomes())
            .collect()
    }

    pub fn endpoint(&self, asset: &AssetKind) -> anyhow::Result<&Arc<WalletEndpoint>> {
        self.endpoints
            .get(asset)
            .ok_or_else(|| anyhow::anyhow!("no wallet for {}", asset))
    }
}
