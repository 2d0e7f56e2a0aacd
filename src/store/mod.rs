//! Block device record store
//!
//! The store is the persistence boundary of the device manager. Callers
//! depend on the [`BlockDeviceStore`] trait only; the Kubernetes backend and
//! the in-memory backend are its two implementations.

pub mod kubernetes;
pub mod memory;
pub mod merge;

pub use kubernetes::{KubernetesStore, KubernetesStoreConfig};
pub use memory::MemoryStore;
pub use merge::{merge_block_device_data, merge_metadata};

use crate::crd::BlockDevice;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence operations on block device records.
///
/// Every backend keeps the same caller-visible contract: Get fails with
/// `ResourceNotFound` on an absent name, Create treats "already exists" as an
/// update signal rather than an error, and Deactivate/Delete are best-effort
/// operations that log failures instead of returning them.
#[async_trait]
pub trait BlockDeviceStore: Send + Sync {
    /// Persist a brand-new record. An existing record with the same name is
    /// treated as the same device reappearing (node restart, device moved
    /// between nodes) and updated in place instead of failing.
    async fn create_block_device(&self, device: BlockDevice) -> Result<()>;

    /// Merge the freshly observed record onto the persisted one and write
    /// the result. When `old` is absent the current persisted record is
    /// fetched by name to serve as the merge base.
    async fn update_block_device(&self, device: BlockDevice, old: Option<BlockDevice>)
        -> Result<()>;

    /// Set the record state to Inactive and persist it. Fire-and-forget:
    /// a failure is logged, and the next scan cycle heals the record.
    async fn deactivate_block_device(&self, device: BlockDevice);

    /// Point lookup by name
    async fn get_block_device(&self, name: &str) -> Result<BlockDevice>;

    /// Remove a record by name. Best-effort; failures are logged.
    async fn delete_block_device(&self, name: &str);

    /// List managed records. With `list_all` every managed record in the
    /// cluster is returned, otherwise only records labeled with the local
    /// hostname. Records opted out via the reconcile annotation are always
    /// excluded.
    async fn list_block_device_resource(&self, list_all: bool) -> Result<Vec<BlockDevice>>;

    /// Rewrite the state of every node-local record to Unknown, one write
    /// per record. Called on shutdown; individual failures are logged and do
    /// not abort the remaining writes.
    async fn mark_block_device_status_to_unknown(&self);
}

/// Drop records that opted out of reconciliation. Builds the filtered result
/// in one pass instead of removing from the list being iterated, which would
/// skip the entry shifting into the current index after a removal.
pub(crate) fn filter_reconcilable(devices: Vec<BlockDevice>) -> Vec<BlockDevice> {
    devices
        .into_iter()
        .filter(|bd| !bd.reconcile_disabled())
        .collect()
}

/// Local-filtering equivalent of the server-side label selector: managed
/// records only, restricted to the given hostname unless listing all.
pub(crate) fn matches_listing(device: &BlockDevice, list_all: bool, hostname: &str) -> bool {
    if !device.is_managed() {
        return false;
    }
    list_all || device.hostname_label() == Some(hostname)
}
