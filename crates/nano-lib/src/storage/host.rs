//! Host inspection used by backing store validation

use crate::error::{NanoError, Result};
#[cfg(test)]
use mockall::automock;
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, geteuid, User};
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Kind of file found at a backing store path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    BlockDevice,
    /// Anything else, named as the user would know it.
    Other(String),
}

/// The user running the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUser {
    pub name: String,
    pub is_root: bool,
}

/// Access to host facts and tools. Mocked in tests.
#[cfg_attr(test, automock)]
pub trait HostProbe: Send + Sync {
    fn file_kind(&self, path: &Path) -> Result<FileKind>;

    fn dir_is_empty(&self, path: &Path) -> Result<bool>;

    fn is_linux(&self) -> bool;

    fn current_user(&self) -> Result<HostUser>;

    /// True when an exclusive open fails because the device is busy.
    fn exclusive_open_busy(&self, path: &Path) -> Result<bool>;

    /// `blkid -p -s TYPE -s PTTYPE -o export` output.
    fn disk_format(&self, path: &Path) -> Result<String>;

    /// Non-empty lines of `parted -s -m <dev> print`.
    fn partition_lines(&self, path: &Path) -> Result<Vec<String>>;

    /// Whether SELinux is enforcing. A host without `getenforce` is not.
    fn selinux_enforcing(&self) -> Result<bool>;

    /// Give the container access to `path` under SELinux.
    fn relabel(&self, path: &Path) -> Result<()>;
}

/// [`HostProbe`] backed by the real system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

fn run_tool(tool: &str, args: &[&str]) -> Result<std::process::Output> {
    Command::new(tool).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            NanoError::host_tool(tool, "is not installed!")
        } else {
            NanoError::host_tool(tool, e.to_string())
        }
    })
}

impl HostProbe for SystemHost {
    fn file_kind(&self, path: &Path) -> Result<FileKind> {
        let metadata = fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NanoError::validation(format!("path {:?} does not exist", path))
            } else {
                NanoError::Io(e)
            }
        })?;

        let file_type = metadata.file_type();
        let kind = if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_block_device() {
            FileKind::BlockDevice
        } else if file_type.is_char_device() {
            FileKind::Other("chardev".to_string())
        } else if file_type.is_socket() {
            FileKind::Other("socket".to_string())
        } else if file_type.is_fifo() {
            FileKind::Other("fifo".to_string())
        } else {
            FileKind::Other("file".to_string())
        };
        Ok(kind)
    }

    fn dir_is_empty(&self, path: &Path) -> Result<bool> {
        Ok(fs::read_dir(path)?.next().is_none())
    }

    fn is_linux(&self) -> bool {
        cfg!(target_os = "linux")
    }

    fn current_user(&self) -> Result<HostUser> {
        let uid = geteuid();
        let name = User::from_uid(uid)
            .ok()
            .flatten()
            .map(|user| user.name)
            .unwrap_or_else(|| uid.to_string());
        Ok(HostUser {
            name,
            is_root: uid.is_root(),
        })
    }

    fn exclusive_open_busy(&self, path: &Path) -> Result<bool> {
        match open(path, OFlag::O_RDONLY | OFlag::O_EXCL, Mode::empty()) {
            Ok(fd) => {
                let _ = close(fd);
                Ok(false)
            }
            Err(Errno::EBUSY) => Ok(true),
            Err(errno) => Err(NanoError::Io(std::io::Error::from(errno))),
        }
    }

    fn disk_format(&self, path: &Path) -> Result<String> {
        let disk = path.to_string_lossy();
        let output = run_tool(
            "blkid",
            &["-p", "-s", "TYPE", "-s", "PTTYPE", "-o", "export", &disk],
        )?;
        if !output.status.success() {
            return Err(NanoError::validation(format!(
                "I suspect either the disk {} has no partition label or is a partition.\n\
                 If you gave me a whole device, make sure it has a partition table (e.g: gpt).\n\
                 If you gave me a partition, I don't support partitions yet, give me a whole device.\n\
                 As an alternative, you can create a filesystem on this partition and give the mountpoint to me.\n\
                 \nAlso if the disk was an OSD you need to zap it (e.g: with 'ceph-disk zap').",
                disk
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn partition_lines(&self, path: &Path) -> Result<Vec<String>> {
        let disk = path.to_string_lossy();
        let output = run_tool("parted", &["-s", "-m", &disk, "print"])?;
        if !output.status.success() {
            return Err(NanoError::host_tool(
                "parted",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn selinux_enforcing(&self) -> Result<bool> {
        let output = match Command::new("getenforce").output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("getenforce not found, assuming SELinux is not enforcing");
                return Ok(false);
            }
            Err(e) => return Err(NanoError::host_tool("getenforce", e.to_string())),
        };
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| line.trim() == "Enforcing"))
    }

    fn relabel(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        let dir = path.to_string_lossy();
        info!(path = %dir, "Executing: chcon -Rt svirt_sandbox_file_t");
        let output = run_tool("chcon", &["-Rt", "svirt_sandbox_file_t", &dir])?;
        if !output.status.success() {
            return Err(NanoError::host_tool(
                "chcon",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}
