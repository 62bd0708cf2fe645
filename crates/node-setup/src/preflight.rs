//! Host checks run before any setup step, plus small helpers shared by them.

use std::fs;
use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::error::{Result, SetupError};

pub const SUPPORTED_UBUNTU: &str = "14.04";

/// The process must run with euid 0.
pub fn require_root() -> Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        if unsafe { libc::geteuid() } != 0 {
            return Err(SetupError::precondition(
                "this command must be run as root (use 'sudo' to run)",
            ));
        }
    }
    Ok(())
}

/// Fields of an os-release file relevant to the platform check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
}

pub fn read_os_release(path: &Path) -> Result<OsRelease> {
    let content = fs::read_to_string(path).map_err(|e| SetupError::io(path, e))?;
    let field = |key: &str| {
        content
            .lines()
            .find_map(|l| l.strip_prefix(key)?.strip_prefix('='))
            .map(|v| v.trim().trim_matches('"').to_string())
            .unwrap_or_default()
    };
    Ok(OsRelease {
        id: field("ID"),
        version_id: field("VERSION_ID"),
    })
}

/// Only 64-bit Ubuntu Linux is supported. A release other than the tested one
/// is a warning, not a failure.
pub fn check_platform(os_release: &Path) -> Result<OsRelease> {
    if !cfg!(target_os = "linux") || !cfg!(target_pointer_width = "64") {
        return Err(SetupError::precondition("only 64bit Ubuntu Linux is supported at this time"));
    }
    let release = read_os_release(os_release)?;
    if release.id != "ubuntu" {
        return Err(SetupError::precondition(format!(
            "only 64bit Ubuntu Linux is supported at this time (found '{}')",
            release.id
        )));
    }
    if release.version_id != SUPPORTED_UBUNTU {
        warn!(
            "Ubuntu {} is untested; the federated node setup targets {}",
            release.version_id, SUPPORTED_UBUNTU
        );
    }
    Ok(release)
}

/// Random alphanumeric password for RPC credentials.
pub fn pass_generator(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
