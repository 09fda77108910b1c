//! Deterministic collaborator implementations for testing.
//!
//! The query engine, performance-counter subsystem and volume resolver are
//! platform services that cannot run in CI; these mocks stand in for them
//! with canned tables, instances and values, plus failure injection for
//! the degradation paths.

use std::collections::{HashMap, HashSet};

use crate::counters::{CounterError, PerfSource};
use crate::query::{QueryEngine, QueryError, Table};
use crate::topology::VolumeResolver;

/// Query engine backed by canned tables.
///
/// Classes without a canned table answer with
/// [`QueryError::InvalidClass`], which exercises the same "no rows this
/// cycle" path a live engine failure would.
#[derive(Debug, Clone, Default)]
pub struct MockQueryEngine {
    tables: HashMap<String, Table>,
    failures: HashMap<String, QueryError>,
}

impl MockQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a canned result table for a class.
    #[must_use]
    pub fn with_table(mut self, class: &str, table: Table) -> Self {
        self.tables.insert(class.to_string(), table);
        self
    }

    /// Make queries for a class fail with the given error.
    #[must_use]
    pub fn with_failure(mut self, class: &str, error: QueryError) -> Self {
        self.failures.insert(class.to_string(), error);
        self
    }
}

impl QueryEngine for MockQueryEngine {
    fn query(&self, class: &str, _columns: &[&str]) -> Result<Table, QueryError> {
        if let Some(error) = self.failures.get(class) {
            return Err(error.clone());
        }
        match self.tables.get(class) {
            Some(table) => Ok(table.clone()),
            None => Err(QueryError::InvalidClass(class.to_string())),
        }
    }
}

/// Performance-counter subsystem backed by canned instances and values.
///
/// Paths without a canned value read as zero, matching a live counter that
/// has not accumulated anything yet. Registration calls are recorded so
/// tests can assert idempotence.
#[derive(Debug, Clone, Default)]
pub struct MockPerfSource {
    instances: Vec<String>,
    values: HashMap<String, u64>,
    timestamps: HashMap<String, u64>,
    value_failures: HashSet<String>,
    registered: HashSet<String>,
    register_calls: Vec<String>,
    fail_enumeration: bool,
}

impl MockPerfSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a counter instance, e.g. `"0 C:"` or `"_Total"`.
    #[must_use]
    pub fn with_instance(mut self, instance: &str) -> Self {
        self.instances.push(instance.to_string());
        self
    }

    /// Install a raw value for a counter path.
    #[must_use]
    pub fn with_value(mut self, path: &str, value: u64) -> Self {
        self.values.insert(path.to_string(), value);
        self
    }

    /// Install a timestamp for a counter path.
    #[must_use]
    pub fn with_timestamp(mut self, path: &str, timestamp: u64) -> Self {
        self.timestamps.insert(path.to_string(), timestamp);
        self
    }

    /// Make value reads for a counter path fail.
    #[must_use]
    pub fn with_value_failure(mut self, path: &str) -> Self {
        self.value_failures.insert(path.to_string());
        self
    }

    /// Make instance enumeration fail, as when the counter object is
    /// unavailable.
    #[must_use]
    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Every registration call received, in order, including repeats.
    pub fn register_calls(&self) -> &[String] {
        &self.register_calls
    }
}

impl PerfSource for MockPerfSource {
    fn enumerate_instances(&self, object: &str) -> Result<Vec<String>, CounterError> {
        if self.fail_enumeration {
            return Err(CounterError::Enumeration(object.to_string()));
        }
        Ok(self.instances.clone())
    }

    fn is_registered(&self, path: &str) -> bool {
        self.registered.contains(path)
    }

    fn register(&mut self, path: &str) -> Result<(), CounterError> {
        self.register_calls.push(path.to_string());
        self.registered.insert(path.to_string());
        Ok(())
    }

    fn query_value(&self, path: &str) -> Result<u64, CounterError> {
        if self.value_failures.contains(path) {
            return Err(CounterError::Query(path.to_string()));
        }
        Ok(self.values.get(path).copied().unwrap_or(0))
    }

    fn query_timestamp(&self, path: &str) -> Result<u64, CounterError> {
        Ok(self.timestamps.get(path).copied().unwrap_or(0))
    }
}

/// Volume resolver backed by a mount-path map.
#[derive(Debug, Clone, Default)]
pub struct MockVolumeResolver {
    mappings: HashMap<String, String>,
}

impl MockVolumeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a mount path (e.g. `C:\`) to a raw resolver result.
    #[must_use]
    pub fn with_mapping(mut self, mount_path: &str, resolved: &str) -> Self {
        self.mappings.insert(mount_path.to_string(), resolved.to_string());
        self
    }
}

impl VolumeResolver for MockVolumeResolver {
    fn resolve_volume_id(&self, mount_path: &str) -> Option<String> {
        self.mappings.get(mount_path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Value;

    #[test]
    fn test_unknown_class_is_an_engine_error() {
        let engine = MockQueryEngine::new();
        assert_eq!(
            engine.query("Win32_DiskDrive", &["Name"]),
            Err(QueryError::InvalidClass("Win32_DiskDrive".to_string()))
        );
    }

    #[test]
    fn test_injected_failure_wins_over_table() {
        let mut table = Table::new(&["Name"]);
        table.push_row(vec![Value::String("disk".to_string())]);

        let engine = MockQueryEngine::new()
            .with_table("Win32_DiskDrive", table)
            .with_failure("Win32_DiskDrive", QueryError::Timeout(5000));

        assert_eq!(
            engine.query("Win32_DiskDrive", &["Name"]),
            Err(QueryError::Timeout(5000))
        );
    }

    #[test]
    fn test_perf_source_defaults_unknown_paths_to_zero() {
        let perf = MockPerfSource::new();
        assert_eq!(perf.query_value(r"\PhysicalDisk(0)\Disk Reads/sec"), Ok(0));
        assert_eq!(perf.query_timestamp(r"\PhysicalDisk(0)\% Disk Time"), Ok(0));
    }

    #[test]
    fn test_resolver_unknown_mount_is_none() {
        let resolver = MockVolumeResolver::new().with_mapping(r"C:\", "volume");
        assert_eq!(resolver.resolve_volume_id(r"C:\"), Some("volume".to_string()));
        assert_eq!(resolver.resolve_volume_id(r"D:\"), None);
    }
}
