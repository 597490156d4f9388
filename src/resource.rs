//! Host resource detection for default sizing.
//!
//! Detects logical CPUs and available RAM, then derives the defaults the
//! splitter uses when the caller does not pin them: shard count, worker
//! count and the membership write-buffer limit. Stateless: each call to
//! `TuningProfile::detect()` re-probes the system.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

// ── Constants ───────────────────────────────────────────────────────

const MB: usize = 1024 * 1024;

/// Minimum number of edge shards regardless of CPU count.
pub const MIN_SHARDS: usize = 4;

/// Estimated bytes per buffered membership entry (hash map slot + key).
const BYTES_PER_ENTRY: usize = 48;

/// Buffer floor (64 MB worth of entries).
const BUFFER_MIN_BYTES: usize = 64 * MB;

/// Buffer ceiling (1 GB worth of entries).
const BUFFER_MAX_BYTES: usize = 1024 * MB;

/// Fraction of available memory given to the membership buffer.
const BUFFER_FRACTION: f64 = 0.10;

// ── SystemResources ─────────────────────────────────────────────────

/// Snapshot of detected hardware resources.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Available (re-usable) RAM in bytes.
    pub available_memory_bytes: u64,
    /// Logical CPU count.
    pub cpu_count: usize,
}

impl SystemResources {
    /// Probe the current system for RAM and CPU information.
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        Self {
            available_memory_bytes: sys.available_memory(),
            cpu_count: cpu_count(),
        }
    }
}

/// Logical CPU count, at least 1.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ── TuningProfile ───────────────────────────────────────────────────

/// Defaults derived from system resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningProfile {
    /// Number of edge shards: `max(4, cpu_count)`.
    pub shard_count: usize,
    /// Upper bound on parallel shard workers.
    pub cpu_count: usize,
    /// Membership entries buffered in memory before a run is spilled.
    pub membership_buffer_entries: usize,
}

impl TuningProfile {
    /// Probe the system and compute a profile.
    pub fn detect() -> Self {
        Self::from_resources(&SystemResources::detect())
    }

    /// Compute a profile from detected resources.
    ///
    /// - `shard_count`: `max(4, cpu_count)`.
    /// - `membership_buffer_entries`:
    ///   `clamp(available * 0.10, 64 MB, 1 GB) / 48`.
    pub fn from_resources(res: &SystemResources) -> Self {
        let raw_bytes = (res.available_memory_bytes as f64 * BUFFER_FRACTION) as usize;
        let buffer_bytes = raw_bytes.clamp(BUFFER_MIN_BYTES, BUFFER_MAX_BYTES);

        Self {
            shard_count: res.cpu_count.max(MIN_SHARDS),
            cpu_count: res.cpu_count.max(1),
            membership_buffer_entries: buffer_bytes / BYTES_PER_ENTRY,
        }
    }

    /// Worker threads for `shards` shards: bounded by both shards and CPUs.
    pub fn workers_for(&self, shards: usize) -> usize {
        shards.min(self.cpu_count).max(1)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
