//! Collector configuration.
//!
//! The performance-counter subsystem localizes its object names, so the
//! physical-disk object is configurable rather than hard-coded English.
//! Defaults match an en-US install.

/// Default name of the physical-disk counter object.
pub const DEFAULT_PERF_OBJECT: &str = "PhysicalDisk";

/// Default raw device path prefix for physical drives.
pub const DEFAULT_PHYSICAL_DRIVE_PREFIX: &str = r"\\.\PHYSICALDRIVE";

/// Configuration for [`DiskCollector`](crate::DiskCollector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Counter object enumerated for per-disk instances.
    pub perf_object: String,
    /// Device path prefix used to infer a disk index from a disk name when
    /// no partition carries one.
    pub physical_drive_prefix: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            perf_object: DEFAULT_PERF_OBJECT.to_string(),
            physical_drive_prefix: DEFAULT_PHYSICAL_DRIVE_PREFIX.to_string(),
        }
    }
}

impl CollectorConfig {
    /// Build a configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - WINDISK_PERF_OBJECT (localized physical-disk counter object name)
    /// - WINDISK_DRIVE_PREFIX (raw physical-drive device path prefix)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(object) = std::env::var("WINDISK_PERF_OBJECT")
            && !object.trim().is_empty()
        {
            config.perf_object = object.trim().to_string();
        }

        if let Ok(prefix) = std::env::var("WINDISK_DRIVE_PREFIX")
            && !prefix.trim().is_empty()
        {
            config.physical_drive_prefix = prefix.trim().to_string();
        }

        config
    }

    /// Override the counter object name.
    #[must_use]
    pub fn with_perf_object(mut self, object: impl Into<String>) -> Self {
        self.perf_object = object.into();
        self
    }

    /// Override the physical-drive path prefix.
    #[must_use]
    pub fn with_physical_drive_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.physical_drive_prefix = prefix.into();
        self
    }
}
