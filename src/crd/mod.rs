//! Custom Resource Definitions
//!
//! The `BlockDevice` resource is the persisted representation of one
//! physical or virtual block device observed on a cluster node.

pub mod block_device;

pub use block_device::*;
