//! Device naming rules for partitions.

/// Normalize a kernel name (`sda`) or path (`/dev/sda`) to a `/dev` path.
pub fn dev_path(name: &str) -> String {
    if name.starts_with("/dev/") {
        name.to_string()
    } else {
        format!("/dev/{}", name)
    }
}

/// True when partition names need a `p` between disk name and index.
pub fn uses_p_separator(disk: &str) -> bool {
    let base = disk.trim_start_matches("/dev/");
    ["nvme", "mmcblk", "loop"]
        .iter()
        .any(|prefix| base.contains(prefix))
}

/// Device path of the `index`-th (1-based) partition of `disk`.
///
/// `/dev/sda` + 1 gives `/dev/sda1`, `/dev/nvme0n1` + 2 gives `/dev/nvme0n1p2`.
pub fn partition_device(disk: &str, index: usize) -> String {
    let disk = dev_path(disk);
    if uses_p_separator(&disk) {
        format!("{}p{}", disk, index)
    } else {
        format!("{}{}", disk, index)
    }
}

/// Trailing partition number of a partition device path.
pub fn partition_index(device: &str) -> Option<u32> {
    let digits: String = device
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Whole-disk device a partition lives on.
///
/// `/dev/sda2` gives `/dev/sda`; `/dev/nvme0n1p2` gives `/dev/nvme0n1`.
pub fn whole_disk_device(partition: &str) -> String {
    let partition = dev_path(partition);
    let stem = partition.trim_end_matches(|c: char| c.is_ascii_digit());
    if uses_p_separator(&partition) {
        if let Some(disk) = stem.strip_suffix('p') {
            return disk.to_string();
        }
    }
    stem.to_string()
}
