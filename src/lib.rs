//! Kubestor Device Manager
//!
//! Reconciles locally observed block-device facts on a cluster node with
//! durable `BlockDevice` records in the Kubernetes control plane, so that
//! every device visible on a node has exactly one record reflecting its
//! latest known state, ownership, and capacity, without clobbering fields
//! owned by a consumer that claimed the device.
//!
//! # Architecture
//!
//! ```text
//!   observed device facts
//!           │
//!           ▼
//!   ┌──────────────────┐     ┌─────────────────────────────────────┐
//!   │ DeviceReconciler │────▶│          BlockDeviceStore           │
//!   │     (facade)     │     │ ┌─────────────────┐ ┌─────────────┐ │
//!   └──────────────────┘     │ │ KubernetesStore │ │ MemoryStore │ │
//!                            │ │  (merge policy) │ │             │ │
//!                            │ └────────┬────────┘ └─────────────┘ │
//!                            └──────────┼──────────────────────────┘
//!                                       ▼
//!                            persisted BlockDevice record
//! ```
//!
//! # Modules
//!
//! - [`crd`]: The `BlockDevice` custom resource and its wire contract
//! - [`store`]: Store trait, merge policy, Kubernetes and in-memory backends
//! - [`reconciler`]: Scan-driven reconciliation facade
//! - [`error`]: Error types and handling

pub mod crd;
pub mod error;
pub mod reconciler;
pub mod store;

// Re-export commonly used types
pub use crd::{
    BlockDevice, BlockDeviceSpec, BlockDeviceStatus,
    ClaimState, DeviceCapacity, DeviceDetails, DeviceDevLink, DeviceState,
    DEVICE_TYPE_LABEL, KUBERNETES_HOST_NAME_LABEL, MANAGED_LABEL, RECONCILE_ANNOTATION,
};

pub use store::{
    merge_block_device_data, merge_metadata,
    BlockDeviceStore, KubernetesStore, KubernetesStoreConfig, MemoryStore,
};

pub use reconciler::{DeviceInfo, DeviceReconciler};

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
