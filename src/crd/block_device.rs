//! BlockDevice CRD
//!
//! One record per block device visible on a node. The record name is derived
//! from the device UUID and never changes; it is the join key between the
//! observed device and the persisted record.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Label / Annotation Keys
// =============================================================================

/// String value of true used in labels and annotations
pub const TRUE_STRING: &str = "true";
/// String value of false used in labels and annotations
pub const FALSE_STRING: &str = "false";

/// Kind of the BlockDevice resource
pub const BLOCK_DEVICE_KIND: &str = "BlockDevice";

/// Key for the hostname entry in node attributes
pub const HOST_NAME_KEY: &str = "hostname";
/// Key for the node name entry in node attributes
pub const NODE_NAME_KEY: &str = "nodename";

/// Hostname label applied by Kubernetes to every node
pub const KUBERNETES_HOST_NAME_LABEL: &str = "kubernetes.io/hostname";

/// Label marking a record as managed by this subsystem. A value of
/// [`FALSE_STRING`] excludes the record from management entirely.
pub const MANAGED_LABEL: &str = "kubestor.io/managed";
/// Label carrying the device type (disk, sparse, loop, ...)
pub const DEVICE_TYPE_LABEL: &str = "kubestor.io/blockdevice-type";
/// Annotation controlling reconciliation. A falsy value opts the record out
/// of every listing used for reconciliation decisions.
pub const RECONCILE_ANNOTATION: &str = "kubestor.io/reconcile";

/// Device type used for ordinary disks
pub const DEFAULT_DEVICE_TYPE: &str = "blockdevice";

/// Check whether an annotation value reads as false.
/// Empty strings, "false", "no" and "0" are all falsy, case-insensitive.
pub fn is_falsy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "" | "false" | "no" | "0")
}

// =============================================================================
// BlockDevice CRD
// =============================================================================

/// Spec of a block device record: the physical attributes of the device as
/// last observed on its node.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubestor.io",
    version = "v1alpha1",
    kind = "BlockDevice",
    plural = "blockdevices",
    shortname = "bd",
    status = "BlockDeviceStatus",
    printcolumn = r#"{"name": "Path", "type": "string", "jsonPath": ".spec.path"}"#,
    printcolumn = r#"{"name": "Size", "type": "integer", "jsonPath": ".spec.capacity.storage"}"#,
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "ClaimState", "type": "string", "jsonPath": ".status.claimState"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceSpec {
    /// Current OS device path (e.g. /dev/sdb)
    pub path: String,

    /// Alternate paths pointing at the same device, grouped by link class
    #[serde(default)]
    pub dev_links: Vec<DeviceDevLink>,

    /// Device capacity
    #[serde(default)]
    pub capacity: DeviceCapacity,

    /// Attributes of the node the device is attached to (hostname, node name)
    #[serde(default)]
    pub node_attributes: BTreeMap<String, String>,

    /// Static device details
    #[serde(default)]
    pub details: DeviceDetails,
}

/// A group of persistent device links of one kind (by-id, by-path, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDevLink {
    /// Link class, e.g. "by-id" or "by-path"
    #[serde(default)]
    pub kind: String,
    /// Links of this class, in discovery order
    #[serde(default)]
    pub links: Vec<String>,
}

/// Capacity of the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapacity {
    /// Total storage in bytes
    #[serde(default)]
    pub storage: u64,
}

/// Static details reported by the device itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    /// Device type (disk, sparse, loop, partition, ...)
    #[serde(default)]
    pub device_type: String,
    /// Device model, when reported
    #[serde(default)]
    pub model: String,
    /// Device serial number, when reported
    #[serde(default)]
    pub serial: String,
}

// =============================================================================
// Status
// =============================================================================

/// Status of a block device record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceStatus {
    /// Whether the device is currently present on its node
    #[serde(default)]
    pub state: DeviceState,

    /// Whether a downstream consumer currently owns the device
    #[serde(default)]
    pub claim_state: ClaimState,
}

/// Presence state of a device. Serialized exactly as the PascalCase variant
/// names; these values are part of the wire contract and must round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeviceState {
    /// Device was seen in the latest scan of its node
    Active,
    /// Device disappeared from its node
    Inactive,
    /// Presence cannot be determined (node agent not running)
    #[default]
    Unknown,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Active => write!(f, "Active"),
            DeviceState::Inactive => write!(f, "Inactive"),
            DeviceState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Claim state of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClaimState {
    /// No consumer owns the device
    #[default]
    Unclaimed,
    /// A consumer owns the device
    Claimed,
    /// A consumer released the device; cleanup may still be pending
    Released,
}

impl std::fmt::Display for ClaimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimState::Unclaimed => write!(f, "Unclaimed"),
            ClaimState::Claimed => write!(f, "Claimed"),
            ClaimState::Released => write!(f, "Released"),
        }
    }
}

// =============================================================================
// Implementations
// =============================================================================

impl BlockDevice {
    /// Name of this record (empty when unset)
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Claim state of the record. A record with no status has nothing to
    /// protect and reads as Unclaimed.
    pub fn claim_state(&self) -> ClaimState {
        self.status.map(|s| s.claim_state).unwrap_or_default()
    }

    /// Presence state of the record
    pub fn state(&self) -> DeviceState {
        self.status.map(|s| s.state).unwrap_or_default()
    }

    /// Whether this record is managed by the device manager. Only an
    /// explicit "false" in the managed label opts a record out.
    pub fn is_managed(&self) -> bool {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(MANAGED_LABEL))
            .map(|v| v != FALSE_STRING)
            .unwrap_or(true)
    }

    /// Hostname label of the record, when present
    pub fn hostname_label(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(KUBERNETES_HOST_NAME_LABEL))
            .map(String::as_str)
    }

    /// Whether reconciliation is disabled for this record via the reconcile
    /// annotation. The record still exists in storage; it is only excluded
    /// from listings that drive reconciliation decisions.
    pub fn reconcile_disabled(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(RECONCILE_ANNOTATION))
            .map(|v| is_falsy(v))
            .unwrap_or(false)
    }
}
