//! Merge policy for block device records
//!
//! Decides, field by field, which parts of a persisted record a freshly
//! observed one may overwrite. A device in active use must not have its
//! ownership-relevant fields clobbered by a background rescan, while its
//! physical attributes keep tracking reality.

use crate::crd::{BlockDevice, ClaimState};
use kube::core::ObjectMeta;
use tracing::debug;

/// Merge the freshly observed record `new_bd` onto the persisted record
/// `old_bd` and return the record to write back.
///
/// The result always carries `old_bd`'s control-plane bookkeeping (name,
/// namespace, uid, resourceVersion, timestamps), so it is update-compatible
/// with the persisted record. If the device is in use, only the capacity,
/// node attributes, path, dev links and state are refreshed; these reflect
/// physical reality and stay current even while claimed. An unclaimed
/// device takes the observed spec and status wholesale.
///
/// Neither input is mutated.
pub fn merge_block_device_data(new_bd: &BlockDevice, old_bd: &BlockDevice) -> BlockDevice {
    let mut merged = old_bd.clone();
    merged.metadata = merge_metadata(&new_bd.metadata, old_bd.metadata.clone());

    if old_bd.claim_state() != ClaimState::Unclaimed {
        debug!(
            "device {} is in use, updating only relevant fields",
            new_bd.spec.path
        );
        merged.spec.node_attributes = new_bd.spec.node_attributes.clone();
        merged.spec.capacity.storage = new_bd.spec.capacity.storage;
        merged.spec.path = new_bd.spec.path.clone();
        merged.spec.dev_links = new_bd.spec.dev_links.clone();
        if let Some(status) = merged.status.as_mut() {
            status.state = new_bd.state();
        }
    } else {
        merged.spec = new_bd.spec.clone();
        merged.status = new_bd.status;
    }
    merged
}

/// Merge `new_metadata` onto `old_metadata`.
///
/// Name, namespace, uid, resourceVersion, generation and the timestamps are
/// all populated by the control plane and kept from the old object. Labels
/// and annotations are patched: new keys are added, existing keys take the
/// value from the new metadata. The old maps are never replaced outright,
/// so labels set by other actors survive a rescan.
pub fn merge_metadata(new_metadata: &ObjectMeta, old_metadata: ObjectMeta) -> ObjectMeta {
    let mut merged = old_metadata;

    if let Some(new_labels) = &new_metadata.labels {
        let labels = merged.labels.get_or_insert_with(Default::default);
        for (key, value) in new_labels {
            labels.insert(key.clone(), value.clone());
        }
    }

    if let Some(new_annotations) = &new_metadata.annotations {
        let annotations = merged.annotations.get_or_insert_with(Default::default);
        for (key, value) in new_annotations {
            annotations.insert(key.clone(), value.clone());
        }
    }

    merged
}
