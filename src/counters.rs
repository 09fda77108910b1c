//! Per-disk counter state from the performance-counter subsystem.
//!
//! The subsystem exposes one counter instance per physical disk plus an
//! aggregate pseudo-instance. [`CounterStore`] keeps the last known sample
//! per disk index across polls, with a full rebuild for scans and a cheap
//! single-index refresh for targeted updates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error};

/// Errors surfaced by the performance-counter subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("failed to enumerate instances for counter object '{0}'")]
    Enumeration(String),

    #[error("failed to register counter '{0}'")]
    Registration(String),

    #[error("failed to query counter '{0}'")]
    Query(String),
}

/// The performance-counter collaborator.
///
/// Registration mutates subsystem state, hence `&mut self`; queries read
/// the most recent raw sample for a registered counter path.
pub trait PerfSource {
    fn enumerate_instances(&self, object: &str) -> Result<Vec<String>, CounterError>;
    fn is_registered(&self, path: &str) -> bool;
    fn register(&mut self, path: &str) -> Result<(), CounterError>;
    fn query_value(&self, path: &str) -> Result<u64, CounterError>;
    fn query_timestamp(&self, path: &str) -> Result<u64, CounterError>;
}

/// Raw counter names under the physical-disk object.
///
/// Although the names say "/sec" these are the raw accumulating counters
/// from which the subsystem derives its formatted per-second values.
const COUNTER_READS: &str = "Disk Reads/sec";
const COUNTER_READ_BYTES: &str = "Disk Read Bytes/sec";
const COUNTER_WRITES: &str = "Disk Writes/sec";
const COUNTER_WRITE_BYTES: &str = "Disk Write Bytes/sec";
const COUNTER_DISK_TIME: &str = "% Disk Time";

/// Aggregate pseudo-instance, excluded from per-disk state.
const TOTAL_INSTANCE: &str = "_Total";

/// Busy time arrives in 100 ns ticks; 10 000 ticks per millisecond.
const HUNDRED_NS_TICKS_PER_MS: u64 = 10_000;

fn counter_path(object: &str, instance: &str, counter: &str) -> String {
    format!(r"\{object}({instance})\{counter}")
}

/// One disk's counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    /// Read operations.
    pub reads: u64,
    /// Bytes read.
    pub read_bytes: u64,
    /// Write operations.
    pub writes: u64,
    /// Bytes written.
    pub write_bytes: u64,
    /// Busy time in milliseconds.
    pub transfer_time_ms: u64,
    /// Subsystem timestamp of the sample.
    pub timestamp: u64,
}

/// Last known counter snapshot per disk index.
///
/// Keyed by disk-index-as-string. This is the only state that survives
/// between polls: a full refresh replaces it wholesale, a targeted refresh
/// upserts one key and never removes others. A disk that disappears leaves
/// a stale entry that is simply never read again until the next full
/// refresh drops it.
#[derive(Debug, Clone, Default)]
pub struct CounterStore {
    object: String,
    by_index: HashMap<String, DiskCounters>,
}

impl CounterStore {
    /// Create an empty store sampling the given counter object.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            by_index: HashMap::new(),
        }
    }

    /// The counter object this store enumerates.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// Last known snapshot for a disk index.
    pub fn get(&self, index: &str) -> Option<&DiskCounters> {
        self.by_index.get(index)
    }

    /// Whether a snapshot exists for a disk index.
    pub fn contains(&self, index: &str) -> bool {
        self.by_index.contains_key(index)
    }

    /// Number of tracked disk indexes.
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Rebuild the store from all currently available counter instances.
    ///
    /// When instance enumeration itself fails the existing state is left
    /// untouched; a stale snapshot beats an empty one. On success the new
    /// state is built completely and then swapped in, so no caller ever
    /// observes a half-populated store.
    pub fn refresh_all<P: PerfSource>(&mut self, perf: &mut P) {
        let instances = match perf.enumerate_instances(&self.object) {
            Ok(instances) => instances,
            Err(err) => {
                error!(object = %self.object, error = %err, "unable to enumerate counter instances");
                return;
            }
        };

        let mut fresh = HashMap::new();
        for instance in instances.iter().filter(|i| *i != TOTAL_INSTANCE) {
            // Instance names may carry a disambiguating suffix after the
            // index ("0 C:"); the leading token is the disk index.
            let Some(index) = instance.split_whitespace().next() else {
                debug!(object = %self.object, "skipping blank counter instance");
                continue;
            };
            fresh.insert(index.to_string(), sample_instance(&self.object, instance, perf));
        }
        self.by_index = fresh;
    }

    /// Refresh the snapshot for one disk index, leaving other entries
    /// untouched.
    ///
    /// Returns whether the index is present in the store afterwards; a
    /// missing index means no matching counter instance exists and the
    /// caller should keep whatever data it already has.
    pub fn refresh_one<P: PerfSource>(&mut self, index: &str, perf: &mut P) -> bool {
        match perf.enumerate_instances(&self.object) {
            Ok(instances) => {
                for instance in instances.iter().filter(|i| *i != TOTAL_INSTANCE) {
                    if instance.split_whitespace().next() == Some(index) {
                        self.by_index
                            .insert(index.to_string(), sample_instance(&self.object, instance, perf));
                    }
                }
            }
            Err(err) => {
                error!(object = %self.object, error = %err, "unable to enumerate counter instances");
            }
        }
        self.by_index.contains_key(index)
    }
}

/// Sample the five counters of one instance.
///
/// Registration is idempotent: already-registered paths are skipped. A
/// failed read defaults that metric to zero rather than dropping the
/// instance.
fn sample_instance<P: PerfSource>(object: &str, instance: &str, perf: &mut P) -> DiskCounters {
    let reads_path = counter_path(object, instance, COUNTER_READS);
    let read_bytes_path = counter_path(object, instance, COUNTER_READ_BYTES);
    let writes_path = counter_path(object, instance, COUNTER_WRITES);
    let write_bytes_path = counter_path(object, instance, COUNTER_WRITE_BYTES);
    let disk_time_path = counter_path(object, instance, COUNTER_DISK_TIME);

    for path in [
        &reads_path,
        &read_bytes_path,
        &writes_path,
        &write_bytes_path,
        &disk_time_path,
    ] {
        ensure_registered(perf, path);
    }

    DiskCounters {
        reads: read_value(perf, &reads_path),
        read_bytes: read_value(perf, &read_bytes_path),
        writes: read_value(perf, &writes_path),
        write_bytes: read_value(perf, &write_bytes_path),
        transfer_time_ms: read_value(perf, &disk_time_path) / HUNDRED_NS_TICKS_PER_MS,
        timestamp: read_timestamp(perf, &disk_time_path),
    }
}

fn ensure_registered<P: PerfSource>(perf: &mut P, path: &str) {
    if !perf.is_registered(path)
        && let Err(err) = perf.register(path)
    {
        debug!(path = %path, error = %err, "counter registration failed");
    }
}

fn read_value<P: PerfSource>(perf: &P, path: &str) -> u64 {
    match perf.query_value(path) {
        Ok(value) => value,
        Err(err) => {
            debug!(path = %path, error = %err, "counter read failed, defaulting to zero");
            0
        }
    }
}

fn read_timestamp<P: PerfSource>(perf: &P, path: &str) -> u64 {
    match perf.query_timestamp(path) {
        Ok(value) => value,
        Err(err) => {
            debug!(path = %path, error = %err, "counter timestamp read failed, defaulting to zero");
            0
        }
    }
}
