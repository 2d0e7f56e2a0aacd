//! Observed device facts
//!
//! [`DeviceInfo`] is what the discovery collaborator hands the reconciler
//! for each device seen in a scan. It is converted into a [`BlockDevice`]
//! record just before persisting.

use crate::crd::{
    BlockDevice, BlockDeviceSpec, BlockDeviceStatus, ClaimState, DeviceCapacity, DeviceDetails,
    DeviceDevLink, DeviceState, DEFAULT_DEVICE_TYPE, DEVICE_TYPE_LABEL, HOST_NAME_KEY,
    KUBERNETES_HOST_NAME_LABEL, MANAGED_LABEL, TRUE_STRING,
};
use std::collections::BTreeMap;

/// Facts about one block device as observed on the local node
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Stable device UUID; becomes the record name
    pub uuid: String,
    /// Attributes of the node the device sits on; stamped by the reconciler
    pub node_attributes: BTreeMap<String, String>,
    /// Device type (disk, sparse, loop, ...)
    pub device_type: String,
    /// Current OS device path
    pub path: String,
    /// Alternate paths pointing at the same device
    pub dev_links: Vec<DeviceDevLink>,
    /// Capacity in bytes
    pub capacity: u64,
    /// Device model, when reported
    pub model: String,
    /// Device serial number, when reported
    pub serial: String,
}

impl DeviceInfo {
    /// Create device facts for the given UUID and path
    pub fn new(uuid: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            path: path.into(),
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            ..Default::default()
        }
    }

    /// Convert observed facts into a fresh record: managed, labeled with the
    /// node hostname and device type, Active and Unclaimed.
    pub fn to_block_device(&self) -> BlockDevice {
        let device_type = if self.device_type.is_empty() {
            DEFAULT_DEVICE_TYPE
        } else {
            &self.device_type
        };

        let mut labels = BTreeMap::new();
        labels.insert(
            KUBERNETES_HOST_NAME_LABEL.to_string(),
            self.node_attributes
                .get(HOST_NAME_KEY)
                .cloned()
                .unwrap_or_default(),
        );
        labels.insert(DEVICE_TYPE_LABEL.to_string(), device_type.to_string());
        labels.insert(MANAGED_LABEL.to_string(), TRUE_STRING.to_string());

        let mut device = BlockDevice::new(
            &self.uuid,
            BlockDeviceSpec {
                path: self.path.clone(),
                dev_links: self.dev_links.clone(),
                capacity: DeviceCapacity {
                    storage: self.capacity,
                },
                node_attributes: self.node_attributes.clone(),
                details: DeviceDetails {
                    device_type: device_type.to_string(),
                    model: self.model.clone(),
                    serial: self.serial.clone(),
                },
            },
        );
        device.metadata.labels = Some(labels);
        device.status = Some(BlockDeviceStatus {
            state: DeviceState::Active,
            claim_state: ClaimState::Unclaimed,
        });
        device
    }
}
