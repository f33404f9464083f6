//! Backing store validation
//!
//! A user may hand the cluster a directory or a whole block device to keep
//! its data in. [`classify`] inspects the path, [`validate`] refuses
//! anything that could destroy existing data, and [`prepare`] turns an
//! approved store into container parameters.

mod host;

pub use host::{FileKind, HostProbe, HostUser, SystemHost};
#[cfg(test)]
pub use host::MockHostProbe;

use crate::error::{NanoError, Result};
use crate::units;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lines of `parted -m print` output that precede the partition entries.
const PARTED_HEADER_LINES: usize = 2;

/// What kind of backing store a path is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackingStoreKind {
    Directory,
    BlockDevice,
    /// Rejected type, e.g. "socket" or "chardev".
    Unsupported(String),
}

/// Classification of a user supplied backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingStoreDescriptor {
    pub path: PathBuf,
    pub kind: BackingStoreKind,
    pub is_empty: bool,
    pub is_exclusively_openable: bool,
    pub has_filesystem: bool,
    pub filesystem_type: Option<String>,
    pub has_partition_table: bool,
    pub partition_table_type: Option<String>,
    pub partition_count: usize,
}

impl BackingStoreDescriptor {
    fn new(path: &Path, kind: BackingStoreKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            is_empty: false,
            is_exclusively_openable: false,
            has_filesystem: false,
            filesystem_type: None,
            has_partition_table: false,
            partition_table_type: None,
            partition_count: 0,
        }
    }
}

/// Container parameters contributed by an approved backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageBinding {
    pub env: Vec<String>,
    pub binds: Vec<String>,
    /// Raw devices need a privileged container.
    pub privileged: bool,
}

/// Parse `blkid -o export` output into filesystem and partition table types.
pub fn parse_disk_format(output: &str) -> Result<(Option<String>, Option<String>)> {
    let mut fs_type = None;
    let mut pt_type = None;

    for line in output.lines().filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once('=')
            .filter(|(_, v)| !v.contains('='))
            .ok_or_else(|| {
                NanoError::validation(format!(
                    "blkid returns invalid output: {}. This potentially means no partition label on your disk.",
                    output
                ))
            })?;
        match key {
            "TYPE" => fs_type = Some(value.to_string()),
            "PTTYPE" => pt_type = Some(value.to_string()),
            _ => {}
        }
    }

    Ok((fs_type, pt_type))
}

/// Inspect `path` once.
///
/// Block devices require Linux and root before any probe runs. The
/// partition table is only read when blkid reports one.
pub fn classify(host: &dyn HostProbe, path: &Path) -> Result<BackingStoreDescriptor> {
    let descriptor = match host.file_kind(path)? {
        FileKind::Directory => {
            let mut d = BackingStoreDescriptor::new(path, BackingStoreKind::Directory);
            d.is_empty = host.dir_is_empty(path)?;
            d
        }
        FileKind::BlockDevice => {
            let user = host.current_user()?;
            if !user.is_root {
                return Err(NanoError::validation(format!(
                    "Hey {}! Run me as 'root' when using a block device.",
                    user.name
                )));
            }
            if !host.is_linux() {
                return Err(NanoError::validation(format!(
                    "Operating system: {} is not supported in the scenario",
                    std::env::consts::OS
                )));
            }

            let mut d = BackingStoreDescriptor::new(path, BackingStoreKind::BlockDevice);
            d.is_exclusively_openable = !host.exclusive_open_busy(path)?;
            if d.is_exclusively_openable {
                let (fs_type, pt_type) = parse_disk_format(&host.disk_format(path)?)?;
                d.has_filesystem = fs_type.is_some();
                d.filesystem_type = fs_type;
                d.has_partition_table = pt_type.is_some();
                d.partition_table_type = pt_type;
                if d.has_partition_table && !d.has_filesystem {
                    let lines = host.partition_lines(path)?;
                    d.partition_count = lines.len().saturating_sub(PARTED_HEADER_LINES);
                }
            }
            d
        }
        FileKind::Other(kind) => {
            BackingStoreDescriptor::new(path, BackingStoreKind::Unsupported(kind))
        }
    };

    debug!(path = %path.display(), kind = ?descriptor.kind, "Classified backing store");
    Ok(descriptor)
}

/// Refuse stores that are unsafe to hand to the cluster.
pub fn validate(descriptor: &BackingStoreDescriptor) -> Result<()> {
    let path = descriptor.path.display();
    match &descriptor.kind {
        BackingStoreKind::Unsupported(kind) => Err(NanoError::validation(format!(
            "We only accept a directory or a block device, however the specified file type is a {}",
            kind
        ))),
        BackingStoreKind::Directory => {
            if !descriptor.is_empty {
                return Err(NanoError::validation(format!(
                    "{} is not empty, doing nothing.",
                    path
                )));
            }
            Ok(())
        }
        BackingStoreKind::BlockDevice => {
            if !descriptor.is_exclusively_openable {
                return Err(NanoError::validation(format!(
                    "{} is accessed by another process, doing nothing.",
                    path
                )));
            }
            if descriptor.has_filesystem {
                return Err(NanoError::validation(format!(
                    "{} has a filesystem: {}, doing nothing.",
                    path,
                    descriptor.filesystem_type.as_deref().unwrap_or("unknown")
                )));
            }
            if descriptor.partition_count != 0 {
                return Err(NanoError::validation(format!(
                    "{} has a partition table type {} and {} partition(s) doing nothing.",
                    path,
                    descriptor.partition_table_type.as_deref().unwrap_or("unknown"),
                    descriptor.partition_count
                )));
            }
            Ok(())
        }
    }
}

/// Container parameters for an approved store.
///
/// Directories are relabeled when SELinux enforces, which needs root.
/// `size` applies to directories only.
pub fn prepare(
    host: &dyn HostProbe,
    descriptor: &BackingStoreDescriptor,
    size: &str,
) -> Result<StorageBinding> {
    let path = descriptor.path.to_string_lossy().to_string();
    let mut binding = StorageBinding::default();

    match descriptor.kind {
        BackingStoreKind::Directory => {
            if host.is_linux() && host.selinux_enforcing()? {
                let user = host.current_user()?;
                if !user.is_root {
                    return Err(NanoError::validation(format!(
                        "Hey {}! Run me as 'root' so I can apply the right SeLinux label on {}",
                        user.name, path
                    )));
                }
                host.relabel(&descriptor.path)?;
            }

            binding.env.push(format!("OSD_PATH={}", path));
            binding.binds.push(format!("{}:{}", path, path));

            if !size.is_empty() {
                let bytes = units::parse_bytes(size)?;
                if bytes == 0 {
                    return Err(NanoError::invalid_size(size, "size must be greater than zero"));
                }
                binding.env.push(format!("BLUESTORE_BLOCK_SIZE={}", bytes));
            }
        }
        BackingStoreKind::BlockDevice => {
            binding.env.push(format!("OSD_DEVICE={}", path));
            binding.binds.push("/dev:/dev".to_string());
            binding.privileged = true;
        }
        BackingStoreKind::Unsupported(_) => validate(descriptor)?,
    }

    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn root() -> HostUser {
        HostUser {
            name: "root".into(),
            is_root: true,
        }
    }

    fn block_host(format: &'static str, parted: Option<Vec<&'static str>>) -> MockHostProbe {
        let mut host = MockHostProbe::new();
        host.expect_file_kind().returning(|_| Ok(FileKind::BlockDevice));
        host.expect_current_user().returning(|| Ok(root()));
        host.expect_is_linux().return_const(true);
        host.expect_exclusive_open_busy().returning(|_| Ok(false));
        host.expect_disk_format()
            .returning(move |_| Ok(format.to_string()));
        match parted {
            Some(parted) => {
                let lines: Vec<String> = parted.into_iter().map(String::from).collect();
                host.expect_partition_lines()
                    .returning(move |_| Ok(lines.clone()));
            }
            None => {
                host.expect_partition_lines().never();
            }
        }
        host
    }

    #[test]
    fn test_parse_disk_format() {
        assert_eq!(parse_disk_format("").unwrap(), (None, None));
        assert_eq!(
            parse_disk_format("PTTYPE=gpt\n").unwrap(),
            (None, Some("gpt".to_string()))
        );
        assert_eq!(
            parse_disk_format("TYPE=xfs\n").unwrap(),
            (Some("xfs".to_string()), None)
        );
        assert!(parse_disk_format("garbage\n").is_err());
    }

    #[test]
    fn test_empty_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = classify(&SystemHost, dir.path()).unwrap();
        assert_eq!(descriptor.kind, BackingStoreKind::Directory);
        assert!(descriptor.is_empty);
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn test_non_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data"), b"x").unwrap();

        let descriptor = classify(&SystemHost, dir.path()).unwrap();
        assert!(!descriptor.is_empty);
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("is not empty, doing nothing."));
    }

    #[test]
    fn test_unsupported_type_names_kind() {
        let mut host = MockHostProbe::new();
        host.expect_file_kind()
            .returning(|_| Ok(FileKind::Other("socket".into())));

        let descriptor = classify(&host, Path::new("/run/docker.sock")).unwrap();
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().ends_with("the specified file type is a socket"));
    }

    #[test]
    fn test_block_device_requires_root() {
        let mut host = MockHostProbe::new();
        host.expect_file_kind().returning(|_| Ok(FileKind::BlockDevice));
        host.expect_current_user().returning(|| {
            Ok(HostUser {
                name: "alice".into(),
                is_root: false,
            })
        });
        host.expect_exclusive_open_busy().never();

        let err = classify(&host, Path::new("/dev/sdb")).unwrap_err();
        assert!(err.to_string().contains("Hey alice!"));
    }

    #[test]
    fn test_busy_device_fails_before_blkid() {
        let mut host = MockHostProbe::new();
        host.expect_file_kind().returning(|_| Ok(FileKind::BlockDevice));
        host.expect_current_user().returning(|| Ok(root()));
        host.expect_is_linux().return_const(true);
        host.expect_exclusive_open_busy().returning(|_| Ok(true));
        host.expect_disk_format().never();

        let descriptor = classify(&host, Path::new("/dev/sdb")).unwrap();
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("accessed by another process"));
    }

    #[test]
    fn test_filesystem_always_fails() {
        let host = block_host("TYPE=ext4\nPTTYPE=gpt\n", None);

        let descriptor = classify(&host, Path::new("/dev/sdb")).unwrap();
        assert!(descriptor.has_filesystem);
        let err = validate(&descriptor).unwrap_err();
        assert_eq!(err.to_string(), "/dev/sdb has a filesystem: ext4, doing nothing.");

        // Even a device that otherwise looks clean.
        let forged = BackingStoreDescriptor {
            is_exclusively_openable: true,
            has_filesystem: true,
            partition_count: 0,
            ..BackingStoreDescriptor::new(Path::new("/dev/sdc"), BackingStoreKind::BlockDevice)
        };
        assert!(validate(&forged).is_err());
    }

    #[test]
    fn test_partitions_fail() {
        let host = block_host(
            "PTTYPE=gpt\n",
            Some(vec![
                "BYT;",
                "/dev/sdb:100GB:scsi:512:512:gpt:HP LOGICAL VOLUME:;",
                "1:1049kB:100GB:100GB:xfs::;",
            ]),
        );

        let descriptor = classify(&host, Path::new("/dev/sdb")).unwrap();
        assert_eq!(descriptor.partition_count, 1);
        let err = validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("partition table type gpt and 1 partition(s)"));
    }

    #[test]
    fn test_clean_device_is_bound_privileged() {
        let host = block_host(
            "PTTYPE=gpt\n",
            Some(vec!["BYT;", "/dev/sdb:100GB:scsi:512:512:gpt:HP LOGICAL VOLUME:;"]),
        );

        let descriptor = classify(&host, Path::new("/dev/sdb")).unwrap();
        validate(&descriptor).unwrap();

        let binding = prepare(&host, &descriptor, "").unwrap();
        assert!(binding.privileged);
        assert_eq!(binding.env, vec!["OSD_DEVICE=/dev/sdb"]);
        assert_eq!(binding.binds, vec!["/dev:/dev"]);
    }

    #[test]
    fn test_blkid_failure_is_fatal() {
        let mut host = MockHostProbe::new();
        host.expect_file_kind().returning(|_| Ok(FileKind::BlockDevice));
        host.expect_current_user().returning(|| Ok(root()));
        host.expect_is_linux().return_const(true);
        host.expect_exclusive_open_busy().returning(|_| Ok(false));
        host.expect_disk_format()
            .returning(|_| Err(NanoError::validation("no partition label or is a partition")));

        assert!(classify(&host, Path::new("/dev/sdb1")).is_err());
    }

    #[test]
    fn test_directory_binding_with_size() {
        let mut host = MockHostProbe::new();
        host.expect_is_linux().return_const(true);
        host.expect_selinux_enforcing().returning(|| Ok(false));
        host.expect_relabel().never();

        let descriptor = BackingStoreDescriptor {
            is_empty: true,
            ..BackingStoreDescriptor::new(Path::new("/srv/nano"), BackingStoreKind::Directory)
        };

        let binding = prepare(&host, &descriptor, "20GB").unwrap();
        assert!(!binding.privileged);
        assert_eq!(
            binding.env,
            vec!["OSD_PATH=/srv/nano", "BLUESTORE_BLOCK_SIZE=21474836480"]
        );
        assert_eq!(binding.binds, vec!["/srv/nano:/srv/nano"]);

        assert!(prepare(&host, &descriptor, "0").is_err());
        assert!(prepare(&host, &descriptor, "20 bananas").is_err());
    }

    #[test]
    fn test_selinux_relabel_requires_root() {
        let mut host = MockHostProbe::new();
        host.expect_is_linux().return_const(true);
        host.expect_selinux_enforcing().returning(|| Ok(true));
        host.expect_current_user().returning(|| {
            Ok(HostUser {
                name: "bob".into(),
                is_root: false,
            })
        });
        host.expect_relabel().never();

        let descriptor = BackingStoreDescriptor {
            is_empty: true,
            ..BackingStoreDescriptor::new(Path::new("/srv/nano"), BackingStoreKind::Directory)
        };
        let err = prepare(&host, &descriptor, "").unwrap_err();
        assert!(err.to_string().contains("SeLinux label on /srv/nano"));

        let mut host = MockHostProbe::new();
        host.expect_is_linux().return_const(true);
        host.expect_selinux_enforcing().returning(|| Ok(true));
        host.expect_current_user().returning(|| Ok(root()));
        host.expect_relabel()
            .with(always())
            .times(1)
            .returning(|_| Ok(()));
        assert!(prepare(&host, &descriptor, "").is_ok());
    }
}
