//! Device reconciler
//!
//! Orchestrates the results of one node-local scan against the record store:
//! creates or updates records for devices currently observed, deactivates
//! records whose devices disappeared, and marks every node-owned record
//! Unknown when the agent shuts down. Driven one record at a time by an
//! external scan loop; there is no internal fan-out.

pub mod device;

pub use device::DeviceInfo;

use crate::crd::BlockDevice;
use crate::error::Result;
use crate::store::BlockDeviceStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Facade over the record store for one node agent
pub struct DeviceReconciler {
    store: Arc<dyn BlockDeviceStore>,
    node_attributes: BTreeMap<String, String>,
    /// Names of virtual/sparse devices this node owns. They never show up in
    /// a physical scan, so the stale sweep must not deactivate them.
    sparse_device_names: Vec<String>,
}

impl DeviceReconciler {
    /// Create a reconciler for the local node
    pub fn new(store: Arc<dyn BlockDeviceStore>, node_attributes: BTreeMap<String, String>) -> Self {
        Self {
            store,
            node_attributes,
            sparse_device_names: Vec::new(),
        }
    }

    /// Register the node's virtual/sparse device names
    pub fn with_sparse_devices(mut self, names: Vec<String>) -> Self {
        self.sparse_device_names = names;
        self
    }

    /// Persist one observed device: stamps the local node attributes onto
    /// the observation, converts it to a record, and updates the existing
    /// record when one is in hand or creates a new one otherwise.
    pub async fn push_block_device_resource(
        &self,
        old_device: Option<BlockDevice>,
        mut details: DeviceInfo,
    ) -> Result<()> {
        details.node_attributes = self.node_attributes.clone();
        let device = details.to_block_device();
        match old_device {
            Some(old) => self.store.update_block_device(device, Some(old)).await,
            None => self.store.create_block_device(device).await,
        }
    }

    /// Deactivate records for devices that disappeared from the node.
    ///
    /// Removal is detected by absence: every local managed record whose name
    /// is neither in the currently observed set nor a known sparse device is
    /// marked Inactive. A listing failure skips the sweep; the next scan
    /// cycle self-heals.
    pub async fn deactivate_stale_block_device_resource(&self, observed_names: &[String]) {
        let mut known: Vec<&str> = observed_names.iter().map(String::as_str).collect();
        known.extend(self.sparse_device_names.iter().map(String::as_str));

        let devices = match self.store.list_block_device_resource(false).await {
            Ok(devices) => devices,
            Err(err) => {
                error!("Unable to list blockdevices for stale sweep: {}", err);
                return;
            }
        };

        for device in devices {
            if !known.contains(&device.name()) {
                self.store.deactivate_block_device(device).await;
            }
        }
    }

    /// Find a record by name in an already-fetched list. Returns `None` when
    /// absent; callers use this to decide between create and update.
    pub fn get_existing_block_device_resource<'a>(
        devices: &'a [BlockDevice],
        uuid: &str,
    ) -> Option<&'a BlockDevice> {
        devices.iter().find(|device| device.name() == uuid)
    }

    // =========================================================================
    // Store pass-throughs
    // =========================================================================

    /// Persist a brand-new record
    pub async fn create_block_device(&self, device: BlockDevice) -> Result<()> {
        self.store.create_block_device(device).await
    }

    /// Merge and persist a freshly observed record
    pub async fn update_block_device(
        &self,
        device: BlockDevice,
        old: Option<BlockDevice>,
    ) -> Result<()> {
        self.store.update_block_device(device, old).await
    }

    /// Mark a record Inactive
    pub async fn deactivate_block_device(&self, device: BlockDevice) {
        self.store.deactivate_block_device(device).await
    }

    /// Point lookup by name
    pub async fn get_block_device(&self, name: &str) -> Result<BlockDevice> {
        self.store.get_block_device(name).await
    }

    /// Remove a record by name, best-effort
    pub async fn delete_block_device(&self, name: &str) {
        self.store.delete_block_device(name).await
    }

    /// List managed records, cluster-wide or node-local
    pub async fn list_block_device_resource(&self, list_all: bool) -> Result<Vec<BlockDevice>> {
        self.store.list_block_device_resource(list_all).await
    }

    /// Shutdown hook: every node-owned record transitions to Unknown
    pub async fn mark_block_device_status_to_unknown(&self) {
        self.store.mark_block_device_status_to_unknown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ClaimState, DeviceState, HOST_NAME_KEY};
    use crate::store::{merge_block_device_data, MemoryStore};

    fn node_attributes() -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert(HOST_NAME_KEY.to_string(), "node-1".to_string());
        attrs.insert("nodename".to_string(), "node-1".to_string());
        attrs
    }

    fn reconciler() -> DeviceReconciler {
        let store = Arc::new(MemoryStore::new("kubestor", node_attributes()));
        DeviceReconciler::new(store, node_attributes())
    }

    fn info(uuid: &str, path: &str) -> DeviceInfo {
        let mut info = DeviceInfo::new(uuid, path);
        info.capacity = 100;
        info
    }

    #[tokio::test]
    async fn test_push_creates_then_updates() {
        let r = reconciler();

        r.push_block_device_resource(None, info("dev-a", "/dev/sda"))
            .await
            .unwrap();
        let created = r.get_block_device("dev-a").await.unwrap();
        assert_eq!(created.spec.path, "/dev/sda");
        // node attributes were stamped by the reconciler
        assert_eq!(
            created.spec.node_attributes.get(HOST_NAME_KEY).unwrap(),
            "node-1"
        );

        r.push_block_device_resource(Some(created), info("dev-a", "/dev/sdb"))
            .await
            .unwrap();
        let updated = r.get_block_device("dev-a").await.unwrap();
        assert_eq!(updated.spec.path, "/dev/sdb");
    }

    #[tokio::test]
    async fn test_deactivate_stale() {
        let r = reconciler();
        r.push_block_device_resource(None, info("dev-a", "/dev/sda"))
            .await
            .unwrap();
        r.push_block_device_resource(None, info("dev-b", "/dev/sdb"))
            .await
            .unwrap();

        r.deactivate_stale_block_device_resource(&["dev-a".to_string()])
            .await;

        let a = r.get_block_device("dev-a").await.unwrap();
        assert_eq!(a.state(), DeviceState::Active);
        let b = r.get_block_device("dev-b").await.unwrap();
        assert_eq!(b.state(), DeviceState::Inactive);
    }

    #[tokio::test]
    async fn test_sparse_devices_survive_stale_sweep() {
        let store = Arc::new(MemoryStore::new("kubestor", node_attributes()));
        let r = DeviceReconciler::new(store, node_attributes())
            .with_sparse_devices(vec!["sparse-1".to_string()]);

        let mut sparse = info("sparse-1", "/var/kubestor/sparse-1.img");
        sparse.device_type = "sparse".into();
        r.push_block_device_resource(None, sparse).await.unwrap();
        r.push_block_device_resource(None, info("dev-a", "/dev/sda"))
            .await
            .unwrap();

        // physical scan sees nothing; only the sparse device is spared
        r.deactivate_stale_block_device_resource(&[]).await;

        let sparse = r.get_block_device("sparse-1").await.unwrap();
        assert_eq!(sparse.state(), DeviceState::Active);
        let a = r.get_block_device("dev-a").await.unwrap();
        assert_eq!(a.state(), DeviceState::Inactive);
    }

    #[tokio::test]
    async fn test_get_existing_resource() {
        let r = reconciler();
        r.push_block_device_resource(None, info("dev-a", "/dev/sda"))
            .await
            .unwrap();

        let list = r.list_block_device_resource(false).await.unwrap();
        assert!(DeviceReconciler::get_existing_block_device_resource(&list, "dev-a").is_some());
        assert!(DeviceReconciler::get_existing_block_device_resource(&list, "dev-z").is_none());
    }

    #[tokio::test]
    async fn test_mark_unknown_on_shutdown() {
        let r = reconciler();
        r.push_block_device_resource(None, info("dev-a", "/dev/sda"))
            .await
            .unwrap();

        r.mark_block_device_status_to_unknown().await;

        let a = r.get_block_device("dev-a").await.unwrap();
        assert_eq!(a.state(), DeviceState::Unknown);
    }

    // Full lifecycle: create, refresh while unclaimed, then refresh while
    // claimed. The merge policy is applied between the persisted record and
    // each new observation, the way the Kubernetes backend writes.
    #[tokio::test]
    async fn test_claimed_device_keeps_ownership_through_refresh() {
        let r = reconciler();

        r.push_block_device_resource(None, info("d1", "/dev/sda"))
            .await
            .unwrap();
        assert_eq!(r.get_block_device("d1").await.unwrap().spec.path, "/dev/sda");

        // unclaimed refresh replaces the body wholesale
        let persisted = r.get_block_device("d1").await.unwrap();
        let observed = {
            let mut i = info("d1", "/dev/sdb");
            i.node_attributes = node_attributes();
            i.to_block_device()
        };
        let merged = merge_block_device_data(&observed, &persisted);
        r.update_block_device(merged, Some(persisted)).await.unwrap();
        assert_eq!(r.get_block_device("d1").await.unwrap().spec.path, "/dev/sdb");

        // a consumer claims the device out of band
        let mut persisted = r.get_block_device("d1").await.unwrap();
        persisted.status.as_mut().unwrap().claim_state = ClaimState::Claimed;
        r.update_block_device(persisted.clone(), Some(persisted))
            .await
            .unwrap();

        // claimed refresh: physical fields track reality, the claim survives
        let persisted = r.get_block_device("d1").await.unwrap();
        let observed = {
            let mut i = info("d1", "/dev/sdc");
            i.capacity = 500;
            i.node_attributes = node_attributes();
            i.to_block_device()
        };
        let merged = merge_block_device_data(&observed, &persisted);
        r.update_block_device(merged, Some(persisted)).await.unwrap();

        let d1 = r.get_block_device("d1").await.unwrap();
        assert_eq!(d1.spec.path, "/dev/sdc");
        assert_eq!(d1.spec.capacity.storage, 500);
        assert_eq!(d1.claim_state(), ClaimState::Claimed);
    }
}
