//! Kubernetes-backed record store
//!
//! Persists block device records as custom resources in the cluster control
//! plane. Concurrent writers are expected (two node agents during a device
//! migration); consistency relies on the apiserver's resource-version check
//! rather than any local lock, and a write conflict is retried exactly once
//! by the create path to avoid livelock under contention.

use crate::crd::{
    BlockDevice, BLOCK_DEVICE_KIND, DeviceState, FALSE_STRING, HOST_NAME_KEY,
    KUBERNETES_HOST_NAME_LABEL, MANAGED_LABEL,
};
use crate::error::{Error, Result};
use crate::store::{filter_reconcilable, merge_block_device_data, BlockDeviceStore};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Kubernetes store
#[derive(Debug, Clone)]
pub struct KubernetesStoreConfig {
    /// Namespace the records live in
    pub namespace: String,
    /// Attributes of the local node (hostname, node name), stamped onto
    /// records and used for node-local listing
    pub node_attributes: BTreeMap<String, String>,
    /// Deadline applied to every apiserver call
    pub op_timeout: Duration,
}

impl Default for KubernetesStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "kubestor".to_string(),
            node_attributes: BTreeMap::new(),
            op_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Kubernetes Store
// =============================================================================

/// Kubernetes implementation of [`BlockDeviceStore`]
pub struct KubernetesStore {
    api: Api<BlockDevice>,
    namespace: String,
    node_attributes: BTreeMap<String, String>,
    op_timeout: Duration,
}

impl KubernetesStore {
    /// Create a store over the given client
    pub fn new(client: Client, config: KubernetesStoreConfig) -> Self {
        let api = Api::namespaced(client, &config.namespace);
        Self {
            api,
            namespace: config.namespace,
            node_attributes: config.node_attributes,
            op_timeout: config.op_timeout,
        }
    }

    fn hostname(&self) -> &str {
        self.node_attributes
            .get(HOST_NAME_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Run one apiserver call under the configured deadline
    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res.map_err(Error::from),
            Err(_) => Err(Error::OperationTimeout {
                operation: operation.to_string(),
            }),
        }
    }
}

/// Label selector for listing managed records: the managed label must not
/// carry the false sentinel, and unless listing the whole cluster the record
/// must be labeled with the local hostname.
fn listing_selector(list_all: bool, hostname: &str) -> String {
    let mut selector = format!("{MANAGED_LABEL}!={FALSE_STRING}");
    if !list_all {
        selector.push_str(&format!(",{KUBERNETES_HOST_NAME_LABEL}={hostname}"));
    }
    selector
}

#[async_trait]
impl BlockDeviceStore for KubernetesStore {
    async fn create_block_device(&self, mut device: BlockDevice) -> Result<()> {
        device.metadata.namespace = Some(self.namespace.clone());
        let name = device.name_any();

        let err = match self
            .with_timeout("create", self.api.create(&PostParams::default(), &device))
            .await
        {
            Ok(_) => {
                info!("Created blockdevice: {}", name);
                return Ok(());
            }
            Err(err) => err,
        };

        if !err.is_already_exists() {
            error!("Creation of blockdevice {} failed: {}", name, err);
            return Err(err);
        }

        // Creation can fail because the record already exists: the same
        // device reappearing after a node restart, or moving between nodes.
        // The record is updated with the fresh observation instead.
        let err = match self.update_block_device(device.clone(), None).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !err.is_conflict() {
            error!("Update of blockdevice {} failed: {}", name, err);
            return Err(err);
        }

        // A concurrent writer changed the record between fetch and write.
        // Retry exactly once with a fresh base.
        match self.update_block_device(device, None).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_conflict() => {
                error!(
                    "Update of blockdevice {} conflicted again, leaving it for the next scan",
                    name
                );
                Ok(())
            }
            Err(err) => {
                error!("Update of blockdevice {} failed: {}", name, err);
                Err(err)
            }
        }
    }

    async fn update_block_device(
        &self,
        device: BlockDevice,
        old: Option<BlockDevice>,
    ) -> Result<()> {
        let name = device.name_any();

        let base = match old {
            Some(old) => old,
            None => match self.get_block_device(&name).await {
                Ok(base) => base,
                Err(err) => {
                    error!(
                        "Failed to update blockdevice {}: unable to fetch merge base: {}",
                        name, err
                    );
                    return Err(err);
                }
            },
        };

        // The merged record carries the base's resourceVersion, so the
        // apiserver rejects the write if a concurrent writer got in between.
        let merged = merge_block_device_data(&device, &base);
        match self
            .with_timeout("update", self.api.replace(&name, &PostParams::default(), &merged))
            .await
        {
            Ok(_) => {
                info!("Updated blockdevice: {}", name);
                Ok(())
            }
            Err(err) if err.is_conflict() => {
                warn!("Version conflict updating blockdevice: {}", name);
                Err(Error::VersionConflict { name })
            }
            Err(err) => {
                error!("Unable to update blockdevice {}: {}", name, err);
                Err(err)
            }
        }
    }

    async fn deactivate_block_device(&self, mut device: BlockDevice) {
        let name = device.name_any();
        device.status.get_or_insert_with(Default::default).state = DeviceState::Inactive;
        match self
            .with_timeout(
                "deactivate",
                self.api.replace(&name, &PostParams::default(), &device),
            )
            .await
        {
            Ok(_) => info!("Deactivated blockdevice: {}", name),
            Err(err) => error!("Unable to deactivate blockdevice {}: {}", name, err),
        }
    }

    async fn get_block_device(&self, name: &str) -> Result<BlockDevice> {
        match self.with_timeout("get", self.api.get(name)).await {
            Ok(device) => Ok(device),
            Err(err) if err.is_not_found() => Err(Error::ResourceNotFound {
                kind: BLOCK_DEVICE_KIND.to_string(),
                name: name.to_string(),
            }),
            Err(err) => {
                error!("Unable to get blockdevice {}: {}", name, err);
                Err(err)
            }
        }
    }

    async fn delete_block_device(&self, name: &str) {
        match self
            .with_timeout("delete", self.api.delete(name, &DeleteParams::default()))
            .await
        {
            Ok(_) => info!("Deleted blockdevice: {}", name),
            Err(err) => error!("Unable to delete blockdevice {}: {}", name, err),
        }
    }

    async fn list_block_device_resource(&self, list_all: bool) -> Result<Vec<BlockDevice>> {
        let selector = listing_selector(list_all, self.hostname());
        let params = ListParams::default().labels(&selector);
        let list = self.with_timeout("list", self.api.list(&params)).await?;
        Ok(filter_reconcilable(list.items))
    }

    async fn mark_block_device_status_to_unknown(&self) {
        let devices = match self.list_block_device_resource(false).await {
            Ok(list) => list,
            Err(err) => {
                error!("Unable to list blockdevices to mark unknown: {}", err);
                return;
            }
        };

        for mut device in devices {
            let name = device.name_any();
            device.status.get_or_insert_with(Default::default).state = DeviceState::Unknown;
            match self
                .with_timeout(
                    "mark-unknown",
                    self.api.replace(&name, &PostParams::default(), &device),
                )
                .await
            {
                Ok(_) => info!("Status marked unknown for blockdevice: {}", name),
                Err(err) => {
                    // keep going; the remaining records still get their write
                    error!("Unable to mark blockdevice {} unknown: {}", name, err);
                }
            }
        }
    }
}
