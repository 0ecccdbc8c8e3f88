//! Asset-transfer endpoints and the custody registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use assetbank_common::{AssetKind, BankError, HolderId, NativeAmount, Result};
use tracing::debug;

/// Moves one asset kind between holders and the bank's custody.
#[async_trait]
pub trait AssetEndpoint: Send + Sync {
    /// Take `amount` from the holder into custody. Requires prior
    /// authorization by the holder.
    async fn pull_from(&self, holder: &HolderId, amount: u128) -> bool;

    /// Claim value the holder attached to the current call. Succeeds only
    /// when exactly `amount` is attached; it then sits in custody.
    async fn take_attached(&self, holder: &HolderId, amount: u128) -> bool;

    /// Send `amount` from custody to the holder.
    async fn push_to(&self, holder: &HolderId, amount: u128) -> bool;
}

/// One endpoint per supported asset kind.
#[derive(Clone, Default)]
pub struct Custody {
    endpoints: HashMap<AssetKind, Arc<dyn AssetEndpoint>>,
}

impl Custody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the endpoint for an asset kind.
    pub fn with_endpoint(mut self, asset: AssetKind, endpoint: Arc<dyn AssetEndpoint>) -> Self {
        self.endpoints.insert(asset, endpoint);
        self
    }

    pub fn supports(&self, asset: &AssetKind) -> bool {
        self.endpoints.contains_key(asset)
    }

    fn endpoint(&self, asset: &AssetKind) -> Result<&Arc<dyn AssetEndpoint>> {
        self.endpoints
            .get(asset)
            .ok_or_else(|| BankError::UnsupportedAsset(asset.clone()))
    }

    /// Pull into custody, failing with `TransferFailed`.
    pub async fn pull(&self, asset: &AssetKind, holder: &HolderId, amount: NativeAmount) -> Result<()> {
        let endpoint = self.endpoint(asset)?;
        debug!(asset = %asset, holder = %holder, amount = %amount, "Pulling asset");

        if !endpoint.pull_from(holder, amount.raw).await {
            return Err(BankError::transfer_failed(
                asset,
                format!("pull of {} from {} refused", amount, holder),
            ));
        }
        Ok(())
    }

    /// Claim attached value, failing with `TransferFailed` when it is
    /// missing or differs from `amount`.
    pub async fn take_attached(
        &self,
        asset: &AssetKind,
        holder: &HolderId,
        amount: NativeAmount,
    ) -> Result<()> {
        let endpoint = self.endpoint(asset)?;
        debug!(asset = %asset, holder = %holder, amount = %amount, "Claiming attached value");

        if !endpoint.take_attached(holder, amount.raw).await {
            return Err(BankError::transfer_failed(
                asset,
                format!("{} did not attach {}", holder, amount),
            ));
        }
        Ok(())
    }

    /// Push out of custody, failing with `TransferFailed`.
    pub async fn push(&self, asset: &AssetKind, holder: &HolderId, amount: NativeAmount) -> Result<()> {
        let endpoint = self.endpoint(asset)?;
        debug!(asset = %asset, holder = %holder, amount = %amount, "Pushing asset");

        if !endpoint.push_to(holder, amount.raw).await {
            return Err(BankError::transfer_failed(
                asset,
                format!("push of {} to {} refused", amount, holder),
            ));
        }
        Ok(())
    }
}

/// In-memory endpoint for testing.
///
/// Tracks holder balances, pull allowances and value attached to a pending
/// call. Custody is counted, not enforced: pushes succeed unless failure is
/// injected.
#[cfg(any(test, feature = "test-utils"))]
pub struct InMemoryAssetEndpoint {
    balances: dashmap::DashMap<HolderId, u128>,
    allowances: dashmap::DashMap<HolderId, u128>,
    attached: dashmap::DashMap<HolderId, u128>,
    held: parking_lot::Mutex<u128>,
    refuse_pushes: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl InMemoryAssetEndpoint {
    pub fn new() -> Self {
        Self {
            balances: dashmap::DashMap::new(),
            allowances: dashmap::DashMap::new(),
            attached: dashmap::DashMap::new(),
            held: parking_lot::Mutex::new(0),
            refuse_pushes: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Give a holder funds.
    pub fn fund(&self, holder: &HolderId, amount: u128) {
        *self.balances.entry(holder.clone()).or_insert(0) += amount;
    }

    /// Authorize the bank to pull up to `amount` from the holder.
    pub fn approve(&self, holder: &HolderId, amount: u128) {
        self.allowances.insert(holder.clone(), amount);
    }

    /// Attach value to the holder's next call. It leaves their balance and
    /// waits for the bank to claim it.
    pub fn attach(&self, holder: &HolderId, amount: u128) -> bool {
        if !self.debit_holder(holder, amount) {
            return false;
        }
        *self.attached.entry(holder.clone()).or_insert(0) += amount;
        true
    }

    fn debit_holder(&self, holder: &HolderId, amount: u128) -> bool {
        match self.balances.get_mut(holder) {
            Some(mut balance) if *balance >= amount => {
                *balance -= amount;
                true
            }
            _ => false,
        }
    }

    pub fn balance_of(&self, holder: &HolderId) -> u128 {
        self.balances.get(holder).map(|b| *b).unwrap_or(0)
    }

    pub fn allowance_of(&self, holder: &HolderId) -> u128 {
        self.allowances.get(holder).map(|a| *a).unwrap_or(0)
    }

    /// Value attached and not yet claimed.
    pub fn attached_of(&self, holder: &HolderId) -> u128 {
        self.attached.get(holder).map(|a| *a).unwrap_or(0)
    }

    /// Amount currently held by the bank.
    pub fn held(&self) -> u128 {
        *self.held.lock()
    }

    /// Make every push report failure.
    pub fn set_refuse_pushes(&self, refuse: bool) {
        self.refuse_pushes
            .store(refuse, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for InMemoryAssetEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl AssetEndpoint for InMemoryAssetEndpoint {
    async fn pull_from(&self, holder: &HolderId, amount: u128) -> bool {
        let allowed = self.allowance_of(holder);
        if allowed < amount || self.balance_of(holder) < amount {
            return false;
        }
        self.allowances.insert(holder.clone(), allowed - amount);
        if !self.debit_holder(holder, amount) {
            self.allowances.insert(holder.clone(), allowed);
            return false;
        }
        *self.held.lock() += amount;
        true
    }

    async fn take_attached(&self, holder: &HolderId, amount: u128) -> bool {
        let attached = self.attached.remove(holder).map(|(_, a)| a).unwrap_or(0);
        if attached != amount {
            // the call fails, so whatever was attached goes back
            if attached > 0 {
                self.fund(holder, attached);
            }
            return false;
        }
        *self.held.lock() += amount;
        true
    }

    async fn push_to(&self, holder: &HolderId, amount: u128) -> bool {
        if self.refuse_pushes.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        {
            let mut held = self.held.lock();
            *held = held.saturating_sub(amount);
        }
        self.fund(holder, amount);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetbank_common::AssetSpec;

    #[tokio::test]
    async fn test_pull_requires_allowance() {
        let endpoint = InMemoryAssetEndpoint::new();
        let alice = HolderId::new("alice");
        endpoint.fund(&alice, 100);

        assert!(!endpoint.pull_from(&alice, 40).await);

        endpoint.approve(&alice, 50);
        assert!(endpoint.pull_from(&alice, 40).await);
        assert!(!endpoint.pull_from(&alice, 40).await);

        assert_eq!(endpoint.balance_of(&alice), 60);
        assert_eq!(endpoint.allowance_of(&alice), 10);
        assert_eq!(endpoint.held(), 40);
    }

    #[tokio::test]
    async fn test_attached_value_claimed_once() {
        let endpoint = InMemoryAssetEndpoint::new();
        let alice = HolderId::new("alice");
        endpoint.fund(&alice, 100);

        assert!(!endpoint.take_attached(&alice, 100).await);

        assert!(endpoint.attach(&alice, 100));
        assert_eq!(endpoint.balance_of(&alice), 0);
        assert_eq!(endpoint.held(), 0);

        assert!(endpoint.take_attached(&alice, 100).await);
        assert_eq!(endpoint.held(), 100);
        assert!(!endpoint.take_attached(&alice, 100).await);
        assert_eq!(endpoint.held(), 100);
    }

    #[tokio::test]
    async fn test_short_attachment_returned() {
        let endpoint = InMemoryAssetEndpoint::new();
        let alice = HolderId::new("alice");
        endpoint.fund(&alice, 100);
        assert!(endpoint.attach(&alice, 60));

        assert!(!endpoint.take_attached(&alice, 100).await);
        assert_eq!(endpoint.balance_of(&alice), 100);
        assert_eq!(endpoint.attached_of(&alice), 0);
        assert_eq!(endpoint.held(), 0);
    }

    #[tokio::test]
    async fn test_custody_maps_failures() {
        let usdc = AssetSpec::usdc();
        let endpoint = Arc::new(InMemoryAssetEndpoint::new());
        let custody = Custody::new().with_endpoint(usdc.kind.clone(), endpoint.clone());
        let alice = HolderId::new("alice");

        let err = custody.pull(&usdc.kind, &alice, usdc.amount(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "TRANSFER_FAILED");

        let err = custody
            .take_attached(&usdc.kind, &alice, usdc.amount(1))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRANSFER_FAILED");

        endpoint.set_refuse_pushes(true);
        let err = custody.push(&usdc.kind, &alice, usdc.amount(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "TRANSFER_FAILED");

        let err = custody
            .push(&AssetKind::Native, &alice, usdc.amount(1))
            .await
            .unwrap_err();
        assert_eq!(err, BankError::UnsupportedAsset(AssetKind::Native));
    }
}
