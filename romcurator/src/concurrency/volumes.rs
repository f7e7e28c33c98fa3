//! Mount point enumeration.
//!
//! The drive scheduler needs to know which physical volume a path lives on.
//! On Linux the mount table is read from `/proc/self/mounts`; on Windows
//! every existing drive letter is a volume. Anything else falls back to a
//! single root volume.

use std::path::PathBuf;

/// Filesystem types that live behind a network connection.
const NETWORK_FS_TYPES: &[&str] = &[
    "cifs",
    "smb3",
    "smbfs",
    "nfs",
    "nfs4",
    "fuse.sshfs",
    "afpfs",
    "davfs",
    "fuse.rclone",
];

/// A mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    /// Directory the volume is mounted at.
    pub root: PathBuf,
    /// Whether the volume is a network share.
    pub network: bool,
}

impl MountPoint {
    /// A local volume mounted at `root`.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            network: false,
        }
    }

    /// A network volume mounted at `root`.
    pub fn network(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            network: true,
        }
    }
}

/// Lists the mount points of this machine, longest root first.
///
/// Never fails: if the mount table can't be read, the filesystem root is
/// returned as the only volume.
pub fn mount_points() -> Vec<MountPoint> {
    let mut mounts = platform_mount_points();
    if mounts.is_empty() {
        mounts.push(MountPoint::local(std::path::MAIN_SEPARATOR_STR));
    }
    sort_longest_first(&mut mounts);
    mounts
}

pub(crate) fn sort_longest_first(mounts: &mut Vec<MountPoint>) {
    mounts.sort_by(|a, b| {
        b.root
            .as_os_str()
            .len()
            .cmp(&a.root.as_os_str().len())
            .then_with(|| a.root.cmp(&b.root))
    });
    mounts.dedup_by(|a, b| a.root == b.root);
}

#[cfg(target_os = "linux")]
fn platform_mount_points() -> Vec<MountPoint> {
    match std::fs::read_to_string("/proc/self/mounts") {
        Ok(table) => parse_mount_table(&table),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read mount table");
            Vec::new()
        }
    }
}

#[cfg(windows)]
fn platform_mount_points() -> Vec<MountPoint> {
    (b'A'..=b'Z')
        .map(|letter| format!("{}:\\", letter as char))
        .filter(|root| std::path::Path::new(root).exists())
        .map(MountPoint::local)
        .collect()
}

#[cfg(not(any(target_os = "linux", windows)))]
fn platform_mount_points() -> Vec<MountPoint> {
    Vec::new()
}

/// Parses the `/proc/mounts` format: `device mountpoint fstype options ...`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_mount_table(table: &str) -> Vec<MountPoint> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let root = fields.next()?;
            let fs_type = fields.next()?;

            let network = NETWORK_FS_TYPES.contains(&fs_type)
                || device.starts_with("//")
                || device.starts_with("\\\\");

            Some(MountPoint {
                root: PathBuf::from(unescape_mount_path(root)),
                network,
            })
        })
        .collect()
}

/// Undoes the octal escaping the kernel applies to spaces, tabs, newlines
/// and backslashes in mount paths.
fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
