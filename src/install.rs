//! `fednode install` and `fednode uninstall`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use node_setup::repo::{RepoSpec, RepoSyncer};

use crate::color;
use crate::compose::{Compose, PROJECT};
use crate::config::FednodeConfig;
use crate::node::{Console, Node};
use crate::ports;
use crate::topology::Topology;

const TEMPLATE_SUFFIX: &str = ".default";

pub fn install(node: &Node<'_>, topology: Topology, branch: &str) -> Result<()> {
    let busy = ports::busy_ports(node.ports, &topology.ports());
    if !busy.is_empty() {
        let list: Vec<String> = busy.iter().map(u16::to_string).collect();
        bail!(
            "cannot install the '{}' topology: host port(s) {} already in use. \
             Stop whatever holds them and try again",
            topology,
            list.join(", ")
        );
    }

    let config = FednodeConfig::new(topology, branch);
    let compose = node.compose(&config);
    println!("Installing the {} topology from {}...", color::bold(topology.as_str()), branch);

    step("Checking out source repositories", || {
        let syncer = RepoSyncer::new(node.runner);
        for repo in topology.repos() {
            let spec = RepoSpec::new(repo.name, repo.url, node.source_dir(repo.name));
            if !syncer.ensure_cloned(&spec, branch)? {
                debug!("{} already checked out", repo.name);
            }
        }
        Ok(())
    })?;

    step("Pulling images", || compose.run(node.runner, ["pull"]))?;

    step("Creating configs from defaults", || {
        for created in materialize_defaults(&node.root.join("config"))? {
            info!("created {}", created.display());
        }
        Ok(())
    })?;

    if cfg!(unix) {
        step("Linking data volumes", || link_volumes(node, topology))?;
    }

    step("Starting services", || compose.run(node.runner, ["up", "-d"]))?;

    config.save(&node.config_path())?;
    println!();
    println!("{}", color::bold_green("✓ fednode installed."));
    Ok(())
}

pub fn uninstall(node: &Node<'_>, compose: &Compose, force: bool, console: &mut Console) -> Result<()> {
    if !force && !console.confirm("Tear down all fednode containers and remove the install config?")? {
        println!("Aborted.");
        return Ok(());
    }

    step("Stopping and removing containers", || compose.run(node.runner, ["down"]))?;
    let path = node.config_path();
    step(&format!("Removing config ({})", path.display()), || FednodeConfig::remove(&path))?;

    println!();
    println!("{}", color::bold_green("✓ fednode uninstalled."));
    Ok(())
}

fn step(label: &str, f: impl FnOnce() -> Result<()>) -> Result<()> {
    print!("  {}...", label);
    io::stdout().flush().ok();
    match f() {
        Ok(()) => {
            println!(" {}", color::green("done"));
            Ok(())
        }
        Err(e) => {
            println!(" {}", color::red("failed"));
            Err(e).context(label.to_string())
        }
    }
}

/// Copy every `*.default` file under `dir` to its suffix-stripped name when
/// that file does not exist yet. Existing files are never overwritten.
pub fn materialize_defaults(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    if !dir.exists() {
        return Ok(created);
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let template = entry.path();
        let Some(target) = template
            .to_str()
            .and_then(|p| p.strip_suffix(TEMPLATE_SUFFIX))
            .map(PathBuf::from)
        else {
            continue;
        };
        if target.exists() {
            continue;
        }
        fs::copy(template, &target)
            .with_context(|| format!("failed to copy {} to {}", template.display(), target.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta = entry.metadata()?;
            if let Err(e) = std::os::unix::fs::chown(&target, Some(meta.uid()), Some(meta.gid())) {
                debug!("could not copy ownership to {}: {}", target.display(), e);
            }
        }
        created.push(target);
    }
    Ok(created)
}

/// `<root>/data/<volume>` → the volume's mount point in docker's storage.
fn link_volumes(node: &Node<'_>, topology: Topology) -> Result<()> {
    let data = node.root.join("data");
    fs::create_dir_all(&data).with_context(|| format!("failed to create {}", data.display()))?;
    for volume in topology.volumes() {
        let link = data.join(volume);
        if link.symlink_metadata().is_ok() {
            continue;
        }
        let target = node
            .docker_volumes
            .join(format!("{}_{}", PROJECT, volume))
            .join("_data");
        symlink(&target, &link)
            .with_context(|| format!("failed to link {} to {}", link.display(), target.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use crate::node::testing::Harness;
    use tempfile::TempDir;

    fn install_cmd(topology: Topology) -> Commands {
        Commands::Install {
            topology,
            branch: "master".into(),
        }
    }

    #[test]
    fn test_busy_port_blocks_install() {
        let h = Harness::with_busy_ports(&[4000]);

        let err = h.run(install_cmd(Topology::Base)).unwrap_err();

        assert!(err.to_string().contains("4000"));
        assert!(h.runner.is_empty());
        assert!(!h.node().config_path().exists());
        assert!(!h.node().root.join("data").exists());
    }

    #[test]
    fn test_install_order() {
        let h = Harness::new();

        h.run(install_cmd(Topology::Counterblock)).unwrap();

        let calls = h.runner.invocations();
        let clones: Vec<_> = calls.iter().filter(|c| c.program == "git").collect();
        assert_eq!(clones.len(), 3);
        assert_eq!(clones[0].args[..3], ["clone", "-b", "master"]);
        assert_eq!(
            clones[2].args.last().unwrap(),
            &h.node().source_dir("counterblock").display().to_string()
        );
        assert_eq!(h.compose_calls(), vec![vec!["pull".to_string()], vec!["up".into(), "-d".into()]]);
        assert!(calls.last().unwrap().args[1].ends_with("docker-compose.counterblock.yml"));
        assert_eq!(h.ports.asked(), Topology::Counterblock.ports());
    }

    #[test]
    fn test_existing_checkout_not_recloned() {
        let h = Harness::new();
        fs::create_dir_all(h.node().source_dir("counterparty-lib")).unwrap();

        h.run(install_cmd(Topology::Base)).unwrap();

        let clones: Vec<_> = h
            .runner
            .invocations()
            .into_iter()
            .filter(|c| c.program == "git")
            .collect();
        assert_eq!(clones.len(), 1);
        assert!(clones[0].args.last().unwrap().ends_with("counterparty-cli"));
    }

    #[test]
    fn test_failed_pull_leaves_no_config() {
        let h = Harness::new();
        h.runner.respond("docker-compose", 1, "");

        assert!(h.run(install_cmd(Topology::Base)).is_err());
        assert!(!h.node().config_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_volume_links() {
        let h = Harness::new();

        h.run(install_cmd(Topology::Base)).unwrap();

        let link = h.node().root.join("data/counterparty-data");
        assert_eq!(
            fs::read_link(link).unwrap(),
            h.temp.path().join("volumes/federatednode_counterparty-data/_data")
        );
    }

    #[test]
    fn test_materialize_defaults() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("config");
        fs::create_dir_all(dir.join("counterparty")).unwrap();
        fs::write(dir.join("counterparty/server.conf.default"), "rpc-port=4000\n").unwrap();
        fs::write(dir.join("counterparty/client.conf.default"), "defaults\n").unwrap();
        fs::write(dir.join("counterparty/client.conf"), "customized\n").unwrap();

        let created = materialize_defaults(&dir).unwrap();

        assert_eq!(created, vec![dir.join("counterparty/server.conf")]);
        assert_eq!(fs::read_to_string(dir.join("counterparty/server.conf")).unwrap(), "rpc-port=4000\n");
        assert_eq!(fs::read_to_string(dir.join("counterparty/client.conf")).unwrap(), "customized\n");
        assert!(materialize_defaults(&dir).unwrap().is_empty());
    }

    #[test]
    fn test_uninstall_declined_keeps_everything() {
        let h = Harness::new();
        h.installed(Topology::Base);

        h.run_with_input(Commands::Uninstall { force: false }, "n\n").unwrap();

        assert!(h.runner.is_empty());
        assert!(h.node().config_path().exists());
    }

    #[test]
    fn test_uninstall_confirmed() {
        let h = Harness::new();
        h.installed(Topology::Full);

        h.run_with_input(Commands::Uninstall { force: false }, "y\n").unwrap();

        assert_eq!(h.compose_calls(), vec![vec!["down".to_string()]]);
        assert!(!h.node().config_path().exists());
    }
}
