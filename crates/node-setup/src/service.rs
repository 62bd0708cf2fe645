//! runit service registration.
//!
//! A service definition lives in the supervision tree (`/etc/sv/<name>`) and
//! is picked up by runsvdir once linked into the active directory
//! (`/etc/service/<name>`), usually within five seconds. A `down` file inside
//! the definition keeps it from starting until an explicit `sv start`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, SetupError};
use crate::runner::{run_tolerant, Invocation, ShellRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unregistered,
    RegisteredDisabled,
    RegisteredEnabledManual,
    RegisteredEnabledAuto,
}

/// Filesystem locations the registrar works with.
#[derive(Debug, Clone)]
pub struct RunitLayout {
    /// Canonical definitions shipped with the build tree (`<dist>/linux/runit`).
    pub templates: PathBuf,
    /// Supervision tree (`/etc/sv`).
    pub sv_dir: PathBuf,
    /// Active services watched by runsvdir (`/etc/service`).
    pub service_dir: PathBuf,
    /// Legacy upstart job directory (`/etc/init`).
    pub legacy_init_dir: PathBuf,
}

impl RunitLayout {
    /// Same layout rooted under `root`, for staging trees and tests.
    pub fn under(root: &Path, dist: &Path) -> Self {
        Self {
            templates: dist.join("linux/runit"),
            sv_dir: root.join("etc/sv"),
            service_dir: root.join("etc/service"),
            legacy_init_dir: root.join("etc/init"),
        }
    }
}

pub struct ServiceRegistrar<'a> {
    layout: RunitLayout,
    runner: &'a dyn ShellRunner,
}

impl<'a> ServiceRegistrar<'a> {
    pub fn new(layout: RunitLayout, runner: &'a dyn ShellRunner) -> Self {
        Self { layout, runner }
    }

    pub fn layout(&self) -> &RunitLayout {
        &self.layout
    }

    fn definition(&self, name: &str) -> PathBuf {
        self.layout.sv_dir.join(name)
    }

    fn active_link(&self, name: &str) -> PathBuf {
        self.layout.service_dir.join(name)
    }

    /// Install (or re-install) the definition for `name`.
    ///
    /// `enabled` decides whether the service is linked into the active
    /// directory at all; `manual_control` leaves a `down` marker so it waits
    /// for an explicit start.
    pub fn install_definition(&self, name: &str, enabled: bool, manual_control: bool) -> Result<()> {
        let template = self.layout.templates.join(name);
        if !template.is_dir() {
            return Err(SetupError::precondition(format!(
                "service definition template not found: {}",
                template.display()
            )));
        }

        self.remove_legacy(name)?;

        let definition = self.definition(name);
        copy_tree(&template, &definition)?;

        let down = definition.join("down");
        if manual_control {
            fs::write(&down, b"").map_err(|e| SetupError::io(&down, e))?;
        } else {
            remove_if_present(&down)?;
        }

        let link = self.active_link(name);
        if enabled {
            fs::create_dir_all(&self.layout.service_dir)
                .map_err(|e| SetupError::io(&self.layout.service_dir, e))?;
            clear_active_entry(&link)?;
            symlink_dir(&definition, &link)?;
        } else {
            // runsvdir stops the service within its poll interval.
            clear_active_entry(&link)?;
        }

        info!(
            "service {}: installed (enabled={}, manual={})",
            name, enabled, manual_control
        );
        Ok(())
    }

    /// Let an installed service start on its own from now on.
    pub fn release_manual_control(&self, name: &str) -> Result<()> {
        let definition = self.definition(name);
        if !definition.is_dir() {
            return Err(SetupError::UnknownService(name.to_string()));
        }
        remove_if_present(&definition.join("down"))?;
        debug!("service {}: manual control released", name);
        Ok(())
    }

    /// Remove the service from supervision entirely.
    pub fn unregister(&self, name: &str) -> Result<()> {
        clear_active_entry(&self.active_link(name))?;
        let definition = self.definition(name);
        if definition.is_dir() {
            fs::remove_dir_all(&definition).map_err(|e| SetupError::io(&definition, e))?;
        }
        info!("service {}: unregistered", name);
        Ok(())
    }

    pub fn state(&self, name: &str) -> ServiceState {
        let definition = self.definition(name);
        if !definition.is_dir() {
            return ServiceState::Unregistered;
        }
        let linked = fs::read_link(self.active_link(name)).is_ok_and(|target| target == definition);
        if !linked {
            return ServiceState::RegisteredDisabled;
        }
        if definition.join("down").exists() {
            ServiceState::RegisteredEnabledManual
        } else {
            ServiceState::RegisteredEnabledAuto
        }
    }

    /// Stop and delete an upstart job of the same name, if one is installed.
    fn remove_legacy(&self, name: &str) -> Result<()> {
        let job = self.layout.legacy_init_dir.join(format!("{}.conf", name));
        if job.exists() {
            info!("service {}: removing legacy upstart job", name);
            run_tolerant(self.runner, &Invocation::new("service").args([name, "stop"]));
        }
        remove_if_present(&job)?;
        remove_if_present(&self.layout.legacy_init_dir.join(format!("{}.conf.override", name)))?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SetupError::io(path, e)),
    }
}

/// Remove whatever sits at an active-service path: our symlink, a stale
/// link, or a directory someone created by hand.
fn clear_active_entry(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map_err(|e| SetupError::io(path, e)),
        Ok(_) => fs::remove_file(path).map_err(|e| SetupError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SetupError::io(path, e)),
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| SetupError::io(link, e))
}

#[cfg(not(unix))]
fn symlink_dir(_target: &Path, link: &Path) -> Result<()> {
    Err(SetupError::precondition(format!(
        "runit supervision requires a unix host ({})",
        link.display()
    )))
}

/// Recursive copy that overwrites existing files and keeps permission bits
/// (fs::copy carries them) and symlinks.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| SetupError::io(dst, e))?;
    let entries = fs::read_dir(src).map_err(|e| SetupError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SetupError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let ty = entry.file_type().map_err(|e| SetupError::io(&from, e))?;
        if ty.is_dir() {
            copy_tree(&from, &to)?;
        } else if ty.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| SetupError::io(&from, e))?;
            remove_if_present(&to)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &to).map_err(|e| SetupError::io(&to, e))?;
            #[cfg(not(unix))]
            let _ = target;
        } else {
            fs::copy(&from, &to).map_err(|e| SetupError::io(&from, e))?;
        }
    }
    Ok(())
}
