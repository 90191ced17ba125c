//! Free-disk-space watchdog for the continuous crawl loop (§4.18): when
//! available space at `data_dir` drops below 200 MB, the loop backs off.

use camino::Utf8Path;
use sysinfo::Disks;

/// Threshold, in bytes, below which the crawl loop pauses.
pub const LOW_DISK_THRESHOLD_BYTES: u64 = 200 * 1024 * 1024;

/// Seam over free-space queries so the watchdog is testable without a
/// real filesystem probe.
pub trait DiskSpaceProvider: Send + Sync {
    fn available_bytes(&self, path: &Utf8Path) -> u64;
}

/// Real implementation backed by `sysinfo`'s disk list, matching the
/// system-metrics collection style already used elsewhere in the pack
/// (`sysinfo::System`/`Disks` for host resource sampling).
#[derive(Default)]
pub struct SysinfoDiskSpace;

impl DiskSpaceProvider for SysinfoDiskSpace {
    fn available_bytes(&self, path: &Utf8Path) -> u64 {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| path.as_str().starts_with(disk.mount_point().to_string_lossy().as_ref()))
            .max_by_key(|disk| disk.mount_point().to_string_lossy().len())
            .map_or(u64::MAX, sysinfo::Disk::available_space)
    }
}

#[must_use]
pub fn is_low(provider: &dyn DiskSpaceProvider, data_dir: &Utf8Path) -> bool {
    provider.available_bytes(data_dir) < LOW_DISK_THRESHOLD_BYTES
}
