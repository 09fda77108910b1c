//! Disk, partition and volume association maps.
//!
//! Three separately-queried association tables link physical drives to
//! partitions, partitions to mounted logical drives, and partition
//! identifiers to partition details. The maps are scratch state: rebuilt
//! together from scratch on every scan and never patched in place, since
//! partitions can be added, removed or repartitioned between polls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::parse;
use crate::query::{QueryEngine, query_or_empty};

const DRIVE_TO_PARTITION_CLASS: &str = "Win32_DiskDriveToDiskPartition";
const LOGICAL_DISK_TO_PARTITION_CLASS: &str = "Win32_LogicalDiskToPartition";
const PARTITION_CLASS: &str = "Win32_DiskPartition";

const ASSOCIATION_COLUMNS: &[&str] = &["Antecedent", "Dependent"];
const PARTITION_COLUMNS: &[&str] = &[
    "DeviceID",
    "Name",
    "Type",
    "Description",
    "Size",
    "DiskIndex",
    "Index",
];

/// The volume-resolution collaborator.
///
/// Resolves a mount path (drive root such as `C:\`) to the globally unique
/// identifier of the mounted volume. Best effort: `None` when the path has
/// no resolvable volume.
pub trait VolumeResolver {
    fn resolve_volume_id(&self, mount_path: &str) -> Option<String>;
}

/// One partition on a disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition name, e.g. `Disk #0, Partition #1`.
    pub name: String,
    /// Partition type description.
    pub partition_type: String,
    /// Free-form description.
    pub description: String,
    /// Identifier of the mounted volume, empty if unmounted.
    pub volume_id: String,
    /// Partition size in bytes.
    pub size_bytes: u64,
    /// Index of the disk holding this partition. Unique per boot session.
    pub disk_index: u32,
    /// Index of the partition within its disk.
    pub partition_index: u32,
    /// Mount path with trailing separator, empty if unmounted.
    pub logical_drive: String,
}

/// The three association maps, rebuilt atomically together.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Drive identifier to the identifiers of its partitions, in
    /// association-table order. Duplicates are possible and harmless.
    pub drive_partitions: HashMap<String, Vec<String>>,
    /// Partition identifier to mount path (with trailing separator).
    pub partition_logical_drive: HashMap<String, String>,
    /// Partition identifier to partition details.
    pub partitions: HashMap<String, Partition>,
}

impl Topology {
    /// Build a fresh topology from the three association tables.
    ///
    /// The caller swaps the returned value in whole, so a concurrent reader
    /// (serialized externally) never observes a half-rebuilt topology. A
    /// failed query contributes no rows for its table and never aborts the
    /// rebuild. Rows whose identifier cells do not match the embedded
    /// identifier pattern are skipped.
    pub fn rebuild<Q: QueryEngine, V: VolumeResolver>(engine: &Q, resolver: &V) -> Self {
        let mut topology = Self::default();

        let drive_rows = query_or_empty(engine, DRIVE_TO_PARTITION_CLASS, ASSOCIATION_COLUMNS);
        for row in 0..drive_rows.row_count() {
            let antecedent = drive_rows.string(row, "Antecedent").unwrap_or_default();
            let dependent = drive_rows.string(row, "Dependent").unwrap_or_default();
            if let (Some(drive), Some(partition)) = (
                parse::extract_device_id(antecedent),
                parse::extract_device_id(dependent),
            ) {
                topology
                    .drive_partitions
                    .entry(drive)
                    .or_default()
                    .push(partition);
            }
        }

        let logical_rows =
            query_or_empty(engine, LOGICAL_DISK_TO_PARTITION_CLASS, ASSOCIATION_COLUMNS);
        for row in 0..logical_rows.row_count() {
            let antecedent = logical_rows.string(row, "Antecedent").unwrap_or_default();
            let dependent = logical_rows.string(row, "Dependent").unwrap_or_default();
            if let (Some(partition), Some(logical)) = (
                parse::extract_device_id(antecedent),
                parse::extract_device_id(dependent),
            ) {
                topology
                    .partition_logical_drive
                    .insert(partition, format!("{logical}\\"));
            }
        }

        let partition_rows = query_or_empty(engine, PARTITION_CLASS, PARTITION_COLUMNS);
        for row in 0..partition_rows.row_count() {
            let device_id = partition_rows
                .string(row, "DeviceID")
                .unwrap_or_default()
                .to_string();
            let logical_drive = topology
                .partition_logical_drive
                .get(&device_id)
                .cloned()
                .unwrap_or_default();

            // Unmounted partitions are valid; only mounted ones have a
            // volume to resolve.
            let volume_id = if logical_drive.is_empty() {
                String::new()
            } else {
                let resolved = resolver
                    .resolve_volume_id(&logical_drive)
                    .unwrap_or_default();
                parse::extract_volume_id(&resolved).value
            };

            let partition = Partition {
                name: partition_rows
                    .string(row, "Name")
                    .unwrap_or_default()
                    .to_string(),
                partition_type: partition_rows
                    .string(row, "Type")
                    .unwrap_or_default()
                    .to_string(),
                description: partition_rows
                    .string(row, "Description")
                    .unwrap_or_default()
                    .to_string(),
                volume_id,
                size_bytes: parse::parse_u64_or_default(
                    partition_rows.string(row, "Size").unwrap_or_default(),
                )
                .value,
                disk_index: partition_rows.u32(row, "DiskIndex").unwrap_or(0),
                partition_index: partition_rows.u32(row, "Index").unwrap_or(0),
                logical_drive,
            };
            // A repeated identifier overwrites the earlier row.
            if topology.partitions.insert(device_id, partition).is_some() {
                debug!(row = row, "duplicate partition identifier in detail table");
            }
        }

        topology
    }

    /// Partitions of a drive, resolved through the detail map in
    /// association order. Identifiers without a detail row are skipped, so
    /// no partition is ever fabricated.
    pub fn partitions_of(&self, drive: &str) -> Option<Vec<Partition>> {
        let ids = self.drive_partitions.get(drive)?;
        Some(
            ids.iter()
                .filter_map(|id| self.partitions.get(id).cloned())
                .collect(),
        )
    }
}
