//! Full-scan disk enumeration and targeted counter refresh.
//!
//! [`DiskCollector`] owns the cross-cycle state (counter store, topology)
//! and the three collaborator handles. A full scan rebuilds everything and
//! yields the complete disk list; a targeted refresh updates one known
//! disk's counters in place without touching topology.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CollectorConfig;
use crate::counters::{CounterStore, DiskCounters, PerfSource};
use crate::parse;
use crate::query::{QueryEngine, query_or_empty};
use crate::topology::{Partition, Topology, VolumeResolver};

const DISK_DRIVE_CLASS: &str = "Win32_DiskDrive";
const DISK_DRIVE_COLUMNS: &[&str] = &[
    "Index",
    "Manufacturer",
    "Model",
    "Name",
    "SerialNumber",
    "Size",
];

/// One physical storage device with its partitions and counter snapshot.
///
/// Constructed fresh on every full scan; counters may additionally be
/// overwritten in place by a targeted refresh between scans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDevice {
    /// Platform device path, e.g. `\\.\PHYSICALDRIVE0`.
    pub name: String,
    /// Model and manufacturer, concatenated and trimmed.
    pub model: String,
    /// Serial number, hex-decoded when the vendor stores it that way.
    pub serial: String,
    /// Device size in bytes.
    pub size_bytes: u64,
    /// Platform-assigned disk index, unique per boot session.
    pub index: u32,
    /// Partitions on this device, empty when unpartitioned.
    pub partitions: Vec<Partition>,
    /// Last known I/O counter snapshot.
    pub counters: DiskCounters,
}

/// Result of a full scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskInventory {
    /// When the scan completed.
    pub collected_at: DateTime<Utc>,
    /// All enumerated disks, in inventory row order.
    pub disks: Vec<DiskDevice>,
    /// Number of disks whose name found no entry in a non-empty topology
    /// during this scan. A miss is expected for genuinely unpartitioned
    /// disks; a nonzero count on a fully partitioned machine points at a
    /// key mismatch between the inventory and association tables.
    pub join_misses: u64,
}

/// Correlates disk inventory, topology and counter state.
///
/// Synchronous and internally unsynchronized; callers polling from several
/// threads must serialize access externally.
pub struct DiskCollector<Q, P, V> {
    config: CollectorConfig,
    engine: Q,
    perf: P,
    resolver: V,
    counters: CounterStore,
    topology: Topology,
    join_misses: u64,
}

impl<Q, P, V> DiskCollector<Q, P, V>
where
    Q: QueryEngine,
    P: PerfSource,
    V: VolumeResolver,
{
    /// Create a collector over the three collaborator handles.
    pub fn new(config: CollectorConfig, engine: Q, perf: P, resolver: V) -> Self {
        let counters = CounterStore::new(config.perf_object.clone());
        Self {
            config,
            engine,
            perf,
            resolver,
            counters,
            topology: Topology::default(),
            join_misses: 0,
        }
    }

    /// Create a collector with default configuration.
    pub fn with_defaults(engine: Q, perf: P, resolver: V) -> Self {
        Self::new(CollectorConfig::default(), engine, perf, resolver)
    }

    /// Cumulative topology join misses across all scans.
    pub fn join_miss_count(&self) -> u64 {
        self.join_misses
    }

    /// Last known counter snapshot per disk index.
    pub fn counter_store(&self) -> &CounterStore {
        &self.counters
    }

    /// Full scan: refresh all counter state, rebuild the topology, and
    /// enumerate every physical disk.
    ///
    /// Never fails; a collaborator failure degrades to stale counters, an
    /// empty topology or an empty disk list for this cycle, and the next
    /// poll is the retry.
    pub fn list_disks(&mut self) -> DiskInventory {
        self.counters.refresh_all(&mut self.perf);
        self.topology = Topology::rebuild(&self.engine, &self.resolver);

        let rows = query_or_empty(&self.engine, DISK_DRIVE_CLASS, DISK_DRIVE_COLUMNS);
        let mut disks = Vec::with_capacity(rows.row_count());
        let mut scan_misses = 0u64;

        for row in 0..rows.row_count() {
            let name = rows.string(row, "Name").unwrap_or_default().to_string();
            let model = rows.string(row, "Model").unwrap_or_default();
            let manufacturer = rows.string(row, "Manufacturer").unwrap_or_default();
            let serial_raw = rows.string(row, "SerialNumber").unwrap_or_default();
            let index = rows.u32(row, "Index").unwrap_or(0);

            let counters = self
                .counters
                .get(&index.to_string())
                .copied()
                .unwrap_or_default();

            let partitions = match self.topology.partitions_of(&name) {
                Some(partitions) => partitions,
                None => {
                    if !self.topology.drive_partitions.is_empty() {
                        scan_misses += 1;
                        debug!(disk = %name, "disk name not found in drive association map");
                    }
                    Vec::new()
                }
            };

            disks.push(DiskDevice {
                name,
                model: format!("{model} {manufacturer}").trim().to_string(),
                serial: parse::hex_string_to_string(serial_raw).value,
                size_bytes: parse::parse_u64_or_default(
                    rows.string(row, "Size").unwrap_or_default(),
                )
                .value,
                index,
                partitions,
                counters,
            });
        }

        self.join_misses += scan_misses;
        DiskInventory {
            collected_at: Utc::now(),
            disks,
            join_misses: scan_misses,
        }
    }

    /// Targeted refresh: update one disk's counter snapshot in place.
    ///
    /// Returns whether an update occurred. On failure the record is left
    /// unmodified and the caller decides whether stale data is acceptable.
    pub fn refresh_disk_stats(&mut self, disk: &mut DiskDevice) -> bool {
        let Some(index) = self.counter_index_for(disk) else {
            return false;
        };

        if self.counters.refresh_one(&index, &mut self.perf) {
            if let Some(counters) = self.counters.get(&index) {
                disk.counters = *counters;
            }
            true
        } else {
            debug!(disk = %disk.name, index = %index, "no counter instance for disk index");
            false
        }
    }

    /// Infer the counter-index key for an already-built disk record.
    ///
    /// Partitions carry the authoritative disk index, so the first
    /// partition wins. Without partitions the raw physical-drive path
    /// encodes the index as its trailing digits.
    fn counter_index_for(&self, disk: &DiskDevice) -> Option<String> {
        if let Some(first) = disk.partitions.first() {
            return Some(first.disk_index.to_string());
        }
        if let Some(suffix) = disk.name.strip_prefix(&self.config.physical_drive_prefix) {
            return Some(suffix.to_string());
        }
        warn!(disk = %disk.name, "could not determine a counter index for disk");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPerfSource, MockQueryEngine, MockVolumeResolver};
    use crate::query::{Table, Value};
    use tracing::{Level, info};
    use tracing_subscriber::fmt;

    fn init_test_logging() {
        let _ = fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn inventory_row(name: &str, index: i64, model: &str, serial: &str, size: &str) -> Vec<Value> {
        vec![
            Value::Integer(index),
            Value::String("(Standard disk drives)".to_string()),
            Value::String(model.to_string()),
            Value::String(name.to_string()),
            Value::String(serial.to_string()),
            Value::String(size.to_string()),
        ]
    }

    fn inventory_table(rows: Vec<Vec<Value>>) -> Table {
        let mut table = Table::new(DISK_DRIVE_COLUMNS);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    #[test]
    fn test_list_disks_builds_records_in_row_order() {
        init_test_logging();
        info!("TEST START: test_list_disks_builds_records_in_row_order");

        let engine = MockQueryEngine::new().with_table(
            DISK_DRIVE_CLASS,
            inventory_table(vec![
                inventory_row(r"\\.\PHYSICALDRIVE1", 1, "Slow HDD", "31323334", "1000204886016"),
                inventory_row(r"\\.\PHYSICALDRIVE0", 0, "Fast SSD", "WD-RAW", "500107862016"),
            ]),
        );
        let perf = MockPerfSource::new()
            .with_instance("0")
            .with_value(r"\PhysicalDisk(0)\Disk Reads/sec", 500);

        let mut collector =
            DiskCollector::with_defaults(engine, perf, MockVolumeResolver::new());
        let inventory = collector.list_disks();

        info!(disks = inventory.disks.len(), "RESULT: inventory collected");

        assert_eq!(inventory.disks.len(), 2);
        // Inventory row order is preserved, not index order.
        assert_eq!(inventory.disks[0].name, r"\\.\PHYSICALDRIVE1");
        assert_eq!(inventory.disks[1].name, r"\\.\PHYSICALDRIVE0");

        let hdd = &inventory.disks[0];
        assert_eq!(hdd.model, "Slow HDD (Standard disk drives)");
        assert_eq!(hdd.serial, "1234"); // hex-decoded
        assert_eq!(hdd.size_bytes, 1000204886016);
        // No counter instance for index 1; metrics default to zero.
        assert_eq!(hdd.counters, DiskCounters::default());

        let ssd = &inventory.disks[1];
        assert_eq!(ssd.serial, "WD-RAW"); // raw fallback, not hex
        assert_eq!(ssd.counters.reads, 500);

        info!("TEST PASS: test_list_disks_builds_records_in_row_order");
    }

    #[test]
    fn test_list_disks_is_deterministic_for_fixed_inputs() {
        init_test_logging();
        info!("TEST START: test_list_disks_is_deterministic_for_fixed_inputs");

        let engine = MockQueryEngine::new().with_table(
            DISK_DRIVE_CLASS,
            inventory_table(vec![inventory_row(
                r"\\.\PHYSICALDRIVE0",
                0,
                "SSD",
                "",
                "1024",
            )]),
        );
        let perf = MockPerfSource::new().with_instance("0");
        let mut collector =
            DiskCollector::with_defaults(engine, perf, MockVolumeResolver::new());

        let first = collector.list_disks();
        let second = collector.list_disks();

        assert_eq!(first.disks, second.disks);

        info!("TEST PASS: test_list_disks_is_deterministic_for_fixed_inputs");
    }

    #[test]
    fn test_list_disks_malformed_size_defaults_to_zero() {
        init_test_logging();
        info!("TEST START: test_list_disks_malformed_size_defaults_to_zero");

        let engine = MockQueryEngine::new().with_table(
            DISK_DRIVE_CLASS,
            inventory_table(vec![inventory_row(
                r"\\.\PHYSICALDRIVE0",
                0,
                "SSD",
                "",
                "not-a-size",
            )]),
        );
        let mut collector = DiskCollector::with_defaults(
            engine,
            MockPerfSource::new(),
            MockVolumeResolver::new(),
        );

        let inventory = collector.list_disks();
        assert_eq!(inventory.disks[0].size_bytes, 0);

        info!("TEST PASS: test_list_disks_malformed_size_defaults_to_zero");
    }

    #[test]
    fn test_list_disks_empty_on_inventory_query_failure() {
        init_test_logging();
        info!("TEST START: test_list_disks_empty_on_inventory_query_failure");

        // No tables at all: every query fails and degrades to no rows.
        let mut collector = DiskCollector::with_defaults(
            MockQueryEngine::new(),
            MockPerfSource::new(),
            MockVolumeResolver::new(),
        );

        let inventory = collector.list_disks();
        assert!(inventory.disks.is_empty());
        assert_eq!(inventory.join_misses, 0);

        info!("TEST PASS: test_list_disks_empty_on_inventory_query_failure");
    }

    #[test]
    fn test_refresh_uses_physical_drive_suffix_without_partitions() {
        init_test_logging();
        info!("TEST START: test_refresh_uses_physical_drive_suffix_without_partitions");

        let perf = MockPerfSource::new()
            .with_instance("3")
            .with_value(r"\PhysicalDisk(3)\Disk Writes/sec", 777);
        let mut collector = DiskCollector::with_defaults(
            MockQueryEngine::new(),
            perf,
            MockVolumeResolver::new(),
        );

        let mut disk = DiskDevice {
            name: r"\\.\PHYSICALDRIVE3".to_string(),
            ..DiskDevice::default()
        };

        assert!(collector.refresh_disk_stats(&mut disk));
        assert_eq!(disk.counters.writes, 777);

        info!("TEST PASS: test_refresh_uses_physical_drive_suffix_without_partitions");
    }

    #[test]
    fn test_refresh_prefers_partition_disk_index() {
        init_test_logging();
        info!("TEST START: test_refresh_prefers_partition_disk_index");

        let perf = MockPerfSource::new()
            .with_instance("2")
            .with_value(r"\PhysicalDisk(2)\Disk Reads/sec", 42);
        let mut collector = DiskCollector::with_defaults(
            MockQueryEngine::new(),
            perf,
            MockVolumeResolver::new(),
        );

        // The name suffix says 0 but the partition says 2; partitions win.
        let mut disk = DiskDevice {
            name: r"\\.\PHYSICALDRIVE0".to_string(),
            partitions: vec![Partition {
                disk_index: 2,
                ..Partition::default()
            }],
            ..DiskDevice::default()
        };

        assert!(collector.refresh_disk_stats(&mut disk));
        assert_eq!(disk.counters.reads, 42);

        info!("TEST PASS: test_refresh_prefers_partition_disk_index");
    }

    #[test]
    fn test_refresh_unrecognized_name_reports_failure() {
        init_test_logging();
        info!("TEST START: test_refresh_unrecognized_name_reports_failure");

        let mut collector = DiskCollector::with_defaults(
            MockQueryEngine::new(),
            MockPerfSource::new().with_instance("0"),
            MockVolumeResolver::new(),
        );

        let mut disk = DiskDevice {
            name: "virtual-disk-without-prefix".to_string(),
            counters: DiskCounters {
                reads: 11,
                ..DiskCounters::default()
            },
            ..DiskDevice::default()
        };
        let before = disk.clone();

        assert!(!collector.refresh_disk_stats(&mut disk));
        assert_eq!(disk, before);

        info!("TEST PASS: test_refresh_unrecognized_name_reports_failure");
    }

    #[test]
    fn test_join_miss_diagnostics() {
        init_test_logging();
        info!("TEST START: test_join_miss_diagnostics");

        let drive_cell = r#"\\HOST\root\cimv2:Win32_DiskDrive.DeviceID="OTHERDRIVE""#;
        let partition_cell =
            r#"\\HOST\root\cimv2:Win32_DiskPartition.DeviceID="Disk #9, Partition #0""#;
        let mut association = Table::new(&["Antecedent", "Dependent"]);
        association.push_row(vec![
            Value::String(drive_cell.to_string()),
            Value::String(partition_cell.to_string()),
        ]);

        // The association map is non-empty but keyed by a different drive
        // identifier than the inventory name.
        let engine = MockQueryEngine::new()
            .with_table("Win32_DiskDriveToDiskPartition", association)
            .with_table(
                DISK_DRIVE_CLASS,
                inventory_table(vec![inventory_row(
                    r"\\.\PHYSICALDRIVE0",
                    0,
                    "SSD",
                    "",
                    "1024",
                )]),
            );
        let mut collector = DiskCollector::with_defaults(
            engine,
            MockPerfSource::new(),
            MockVolumeResolver::new(),
        );

        let inventory = collector.list_disks();

        info!(join_misses = inventory.join_misses, "RESULT: scan diagnostics");
        assert_eq!(inventory.join_misses, 1);
        assert_eq!(collector.join_miss_count(), 1);
        assert!(inventory.disks[0].partitions.is_empty());

        info!("TEST PASS: test_join_miss_diagnostics");
    }
}
