//! In-memory record store
//!
//! A keyed container behind a single mutex, used for tests and standalone
//! operation. Writes go through plain keyed assignment without the merge
//! policy; this backend is a simplified double, not the production
//! overwrite semantics. Listing applies the same managed/hostname/reconcile
//! filters as the Kubernetes backend so callers stay backend-agnostic.

use crate::crd::{
    BlockDevice, BLOCK_DEVICE_KIND, DeviceState, HOST_NAME_KEY,
};
use crate::error::{Error, Result};
use crate::store::{filter_reconcilable, matches_listing, BlockDeviceStore};
use async_trait::async_trait;
use kube::ResourceExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// In-memory implementation of [`BlockDeviceStore`]
pub struct MemoryStore {
    namespace: String,
    node_attributes: BTreeMap<String, String>,
    /// name => record
    devices: Mutex<BTreeMap<String, BlockDevice>>,
}

impl MemoryStore {
    /// Create an empty store for the given namespace and node attributes
    pub fn new(namespace: impl Into<String>, node_attributes: BTreeMap<String, String>) -> Self {
        Self {
            namespace: namespace.into(),
            node_attributes,
            devices: Mutex::new(BTreeMap::new()),
        }
    }

    fn hostname(&self) -> &str {
        self.node_attributes
            .get(HOST_NAME_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}

#[async_trait]
impl BlockDeviceStore for MemoryStore {
    async fn create_block_device(&self, mut device: BlockDevice) -> Result<()> {
        debug!("CreateBlockDevice {}", device.name_any());
        device.metadata.namespace = Some(self.namespace.clone());
        let name = device.name_any();
        self.devices.lock().insert(name, device);
        Ok(())
    }

    async fn update_block_device(
        &self,
        mut device: BlockDevice,
        old: Option<BlockDevice>,
    ) -> Result<()> {
        // keyed by the persisted record's name when one is in hand
        let name = old
            .as_ref()
            .map(|o| o.name_any())
            .unwrap_or_else(|| device.name_any());
        debug!("UpdateBlockDevice {}", name);
        device.metadata.namespace = Some(self.namespace.clone());
        self.devices.lock().insert(name, device);
        Ok(())
    }

    async fn deactivate_block_device(&self, mut device: BlockDevice) {
        debug!("DeactivateBlockDevice {}", device.name_any());
        device.status.get_or_insert_with(Default::default).state = DeviceState::Inactive;
        // same keyed-assignment path as create
        let _ = self.create_block_device(device).await;
    }

    async fn get_block_device(&self, name: &str) -> Result<BlockDevice> {
        self.devices
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: BLOCK_DEVICE_KIND.to_string(),
                name: name.to_string(),
            })
    }

    async fn delete_block_device(&self, name: &str) {
        self.devices.lock().remove(name);
    }

    async fn list_block_device_resource(&self, list_all: bool) -> Result<Vec<BlockDevice>> {
        let hostname = self.hostname();
        let devices: Vec<BlockDevice> = self
            .devices
            .lock()
            .values()
            .filter(|bd| matches_listing(bd, list_all, hostname))
            .cloned()
            .collect();
        Ok(filter_reconcilable(devices))
    }

    async fn mark_block_device_status_to_unknown(&self) {
        let local = match self.list_block_device_resource(false).await {
            Ok(list) => list,
            Err(_) => return,
        };
        let mut devices = self.devices.lock();
        for bd in local {
            let name = bd.name_any();
            if let Some(entry) = devices.get_mut(&name) {
                entry.status.get_or_insert_with(Default::default).state = DeviceState::Unknown;
                info!("Status marked unknown for blockdevice: {}", name);
            }
        }
    }
}
