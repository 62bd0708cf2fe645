//! Git checkouts of the sibling source repositories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, SetupError};
use crate::runner::{capture_checked, run_checked, Invocation, ShellRunner};

/// A repository bound to a fixed checkout path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub name: String,
    pub url: String,
    pub dest: PathBuf,
}

impl RepoSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            dest: dest.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSpec {
    Named(String),
    /// Whatever the existing checkout is on; `master` for a fresh clone.
    Auto,
}

pub struct RepoSyncer<'a> {
    runner: &'a dyn ShellRunner,
}

impl<'a> RepoSyncer<'a> {
    pub fn new(runner: &'a dyn ShellRunner) -> Self {
        Self { runner }
    }

    fn git(dest: &Path) -> Invocation {
        Invocation::new("git").arg("-C").path_arg(dest)
    }

    /// Clone `repo` at `branch` if absent, otherwise pull that branch.
    /// `pin` resets the tree to a specific commit afterwards; `owner` hands
    /// the tree to that user with group-writable permissions.
    pub fn sync(&self, repo: &RepoSpec, branch: &BranchSpec, pin: Option<&str>, owner: Option<&str>) -> Result<()> {
        let branch = match branch {
            BranchSpec::Named(b) => b.clone(),
            BranchSpec::Auto => self.auto_branch(&repo.dest),
        };
        info!("checking out/updating {}:{} from git...", repo.name, branch);

        if repo.dest.exists() {
            run_checked(self.runner, &Self::git(&repo.dest).args(["pull", "origin", branch.as_str()]))?;
        } else {
            run_checked(
                self.runner,
                &Invocation::new("git")
                    .args(["clone", "-b", branch.as_str(), repo.url.as_str()])
                    .path_arg(&repo.dest),
            )?;
        }

        if let Some(hash) = pin {
            run_checked(self.runner, &Self::git(&repo.dest).args(["reset", "--hard", hash]))?;
        }

        if let Some(user) = owner {
            if cfg!(unix) {
                self.fix_ownership(&repo.dest, user)?;
            }
        }
        Ok(())
    }

    /// Clone only when the checkout is missing; an existing tree is left alone.
    pub fn ensure_cloned(&self, repo: &RepoSpec, branch: &str) -> Result<bool> {
        if repo.dest.exists() {
            return Ok(false);
        }
        if let Some(parent) = repo.dest.parent() {
            fs::create_dir_all(parent).map_err(|e| SetupError::io(parent, e))?;
        }
        info!("cloning {} ({}) into {}", repo.name, branch, repo.dest.display());
        run_checked(
            self.runner,
            &Invocation::new("git")
                .args(["clone", "-b", branch, repo.url.as_str()])
                .path_arg(&repo.dest),
        )?;
        Ok(true)
    }

    fn auto_branch(&self, dest: &Path) -> String {
        if !dest.exists() {
            return "master".into();
        }
        match capture_checked(self.runner, &Self::git(dest).args(["rev-parse", "--abbrev-ref", "HEAD"])) {
            Ok(out) if !out.trim().is_empty() => out.trim().to_string(),
            _ => "master".into(),
        }
    }

    /// Branch currently checked out at `dest`. A detached HEAD is an error.
    pub fn current_branch(&self, dest: &Path) -> Result<String> {
        let out = self
            .runner
            .output(&Self::git(dest).args(["symbolic-ref", "--short", "-q", "HEAD"]))?;
        let branch = out.stdout.trim();
        if !out.success() || branch.is_empty() {
            return Err(SetupError::precondition(format!(
                "unknown git branch for {}, or repo in detached state",
                dest.display()
            )));
        }
        Ok(branch.to_string())
    }

    /// Pull the branch `dest` is currently on.
    pub fn pull_current(&self, dest: &Path) -> Result<String> {
        let branch = self.current_branch(dest)?;
        run_checked(self.runner, &Self::git(dest).args(["pull", "origin", branch.as_str()]))?;
        Ok(branch)
    }

    fn fix_ownership(&self, dest: &Path, user: &str) -> Result<()> {
        run_checked(
            self.runner,
            &Self::git(dest).args(["config", "core.sharedRepository", "group"]),
        )?;
        run_checked(
            self.runner,
            &Invocation::new("find")
                .path_arg(dest)
                .args(["-type", "d", "-exec", "chmod", "g+s", "{}", "+"]),
        )?;
        run_checked(
            self.runner,
            &Invocation::new("chown")
                .args(["-R", format!("{}:{}", user, user).as_str()])
                .path_arg(dest),
        )?;
        run_checked(
            self.runner,
            &Invocation::new("chmod")
                .args(["-R", "u+rw,g+rw,o+r,o-w"])
                .path_arg(dest),
        )
    }
}

/// Delete `*.egg-info` directories at the top of a checkout so the next
/// container start re-resolves the package's dependencies.
pub fn purge_build_metadata(dest: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let entries = match fs::read_dir(dest) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(SetupError::io(dest, e)),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_meta = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".egg-info"));
        if is_meta && path.is_dir() {
            match fs::remove_dir_all(&path) {
                Ok(()) => removed.push(path),
                Err(e) => warn!("could not remove {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use tempfile::TempDir;

    #[test]
    fn test_clone_when_absent() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let dest = temp.path().join("counterparty-lib");
        let repo = RepoSpec::new("counterparty-lib", "https://github.com/CounterpartyXCP/counterparty-lib.git", &dest);

        RepoSyncer::new(&runner)
            .sync(&repo, &BranchSpec::Named("develop".into()), None, None)
            .unwrap();

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(
            calls[0].args,
            vec![
                "clone".to_string(),
                "-b".into(),
                "develop".into(),
                "https://github.com/CounterpartyXCP/counterparty-lib.git".into(),
                dest.display().to_string(),
            ]
        );
    }

    #[test]
    fn test_pull_when_present_and_fix_owner() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let dest = temp.path().join("federatednode");
        fs::create_dir_all(&dest).unwrap();
        let repo = RepoSpec::new("federatednode", "https://example.invalid/fednode.git", &dest);

        RepoSyncer::new(&runner)
            .sync(&repo, &BranchSpec::Named("master".into()), Some("abc123"), Some("xcp"))
            .unwrap();

        let lines = runner.lines();
        assert_eq!(lines[0], format!("git -C {} pull origin master", dest.display()));
        assert_eq!(lines[1], format!("git -C {} reset --hard abc123", dest.display()));
        if cfg!(unix) {
            let chown = runner
                .invocations()
                .into_iter()
                .find(|inv| inv.program == "chown")
                .unwrap();
            assert_eq!(chown.args, vec!["-R".to_string(), "xcp:xcp".into(), dest.display().to_string()]);
            assert_eq!(lines.len(), 6);
        }
    }

    #[test]
    fn test_auto_branch_uses_checkout_head() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let dest = temp.path().join("counterblock");
        fs::create_dir_all(&dest).unwrap();
        runner.respond("git -C", 0, "");
        runner.respond(&format!("git -C {} rev-parse", dest.display()), 0, "develop\n");
        let repo = RepoSpec::new("counterblock", "https://example.invalid/counterblock.git", &dest);

        RepoSyncer::new(&runner).sync(&repo, &BranchSpec::Auto, None, None).unwrap();

        assert_eq!(
            runner.lines().last().unwrap(),
            &format!("git -C {} pull origin develop", dest.display())
        );
    }

    #[test]
    fn test_clone_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.respond("git clone", 128, "");
        let repo = RepoSpec::new("x", "https://example.invalid/x.git", temp.path().join("x"));

        let err = RepoSyncer::new(&runner)
            .sync(&repo, &BranchSpec::Named("master".into()), None, Some("xcp"))
            .unwrap_err();

        assert!(matches!(err, SetupError::CommandFailed { code: 128, .. }));
        assert_eq!(runner.lines().len(), 1);
    }

    #[test]
    fn test_current_branch_detached() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.respond("git -C", 1, "");
        let err = RepoSyncer::new(&runner).current_branch(temp.path()).unwrap_err();
        assert!(matches!(err, SetupError::Precondition(_)));
    }

    #[test]
    fn test_purge_build_metadata() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("counterpartylib.egg-info")).unwrap();
        fs::create_dir_all(temp.path().join("counterpartylib")).unwrap();
        fs::write(temp.path().join("notes.egg-info"), "file, not dir").unwrap();

        let removed = purge_build_metadata(temp.path()).unwrap();

        assert_eq!(removed, vec![temp.path().join("counterpartylib.egg-info")]);
        assert!(temp.path().join("counterpartylib").exists());
        assert!(temp.path().join("notes.egg-info").exists());
    }
}
