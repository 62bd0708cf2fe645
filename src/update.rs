//! `fednode update` — pull service source checkouts and restart containers.

use anyhow::{bail, Result};
use tracing::info;

use node_setup::repo::{purge_build_metadata, RepoSyncer};

use crate::color;
use crate::compose::Compose;
use crate::config::FednodeConfig;
use crate::node::Node;
use crate::topology::checkouts_for;

/// Services whose code lives in a source checkout mounted into the container.
pub const UPDATE_CHOICES: &[&str] = &[
    "counterparty",
    "counterparty-testnet",
    "counterblock",
    "counterblock-testnet",
    "counterwallet",
    "armory_utxsvr",
    "armory_utxsvr-testnet",
];

/// Services to update: the named ones after validation, or every updatable
/// service in the topology when none are named.
fn select_services(config: &FednodeConfig, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(UPDATE_CHOICES
            .iter()
            .filter(|s| config.topology.has_service(s))
            .map(|s| s.to_string())
            .collect());
    }
    for service in requested {
        if !UPDATE_CHOICES.contains(&service.as_str()) {
            bail!(
                "invalid service '{}': choose one of {}",
                service,
                UPDATE_CHOICES.join(", ")
            );
        }
        if !config.topology.has_service(service) {
            bail!(
                "service '{}' is not part of the installed '{}' topology",
                service,
                config.topology
            );
        }
    }
    Ok(requested.to_vec())
}

/// Distinct checkouts behind `services`, in first-seen order.
fn checkouts(services: &[String]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for repo in services.iter().flat_map(|s| checkouts_for(s)) {
        if !out.contains(repo) {
            out.push(*repo);
        }
    }
    out
}

pub fn run(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, requested: &[String], restart: bool) -> Result<()> {
    let services = select_services(config, requested)?;
    let syncer = RepoSyncer::new(node.runner);

    for repo in checkouts(&services) {
        let dest = node.source_dir(repo);
        let branch = syncer.pull_current(&dest)?;
        println!("  {} updated ({})", color::bold(repo), branch);
        for removed in purge_build_metadata(&dest)? {
            info!("removed stale build metadata {}", removed.display());
        }
    }

    if restart && !services.is_empty() {
        compose.run(
            node.runner,
            std::iter::once("restart").chain(services.iter().map(String::as_str)),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use crate::node::testing::Harness;
    use crate::topology::Topology;
    use std::fs;

    fn update(services: &[&str], no_restart: bool) -> Commands {
        Commands::Update {
            services: services.iter().map(|s| s.to_string()).collect(),
            no_restart,
        }
    }

    fn pulled(h: &Harness) -> Vec<String> {
        h.runner
            .invocations()
            .into_iter()
            .filter(|inv| inv.program == "git" && inv.args.get(2).map(String::as_str) == Some("pull"))
            .map(|inv| inv.args[1].clone())
            .collect()
    }

    #[test]
    fn test_counterparty_fans_out_to_two_checkouts() {
        let h = Harness::new();
        h.installed(Topology::Base);
        h.runner.respond("git -C", 0, "develop\n");

        h.run(update(&["counterparty", "counterparty-testnet"], false)).unwrap();

        let node = h.node();
        assert_eq!(
            pulled(&h),
            vec![
                node.source_dir("counterparty-lib").display().to_string(),
                node.source_dir("counterparty-cli").display().to_string(),
            ]
        );
        let pull = h
            .runner
            .invocations()
            .into_iter()
            .find(|inv| inv.args.get(2).map(String::as_str) == Some("pull"))
            .unwrap();
        assert_eq!(pull.args[3..], ["origin", "develop"]);
        assert_eq!(
            h.compose_calls(),
            vec![vec!["restart".to_string(), "counterparty".into(), "counterparty-testnet".into()]]
        );
    }

    #[test]
    fn test_update_all_in_topology_without_restart() {
        let h = Harness::new();
        h.installed(Topology::Counterblock);
        h.runner.respond("git -C", 0, "master\n");

        h.run(update(&[], true)).unwrap();

        assert_eq!(pulled(&h).len(), 3);
        assert!(h.compose_calls().is_empty());
    }

    #[test]
    fn test_egg_info_purged_after_pull() {
        let h = Harness::new();
        h.installed(Topology::Counterblock);
        h.runner.respond("git -C", 0, "master\n");
        let egg = h.node().source_dir("counterblock").join("counterblock.egg-info");
        fs::create_dir_all(&egg).unwrap();

        h.run(update(&["counterblock"], true)).unwrap();

        assert!(!egg.exists());
    }

    #[test]
    fn test_unknown_service_has_no_side_effects() {
        let h = Harness::new();
        h.installed(Topology::Full);

        let err = h.run(update(&["counterparty", "bitcoin"], false)).unwrap_err();

        assert!(err.to_string().contains("invalid service 'bitcoin'"));
        assert!(h.runner.is_empty());
    }

    #[test]
    fn test_detached_checkout_fails() {
        let h = Harness::new();
        h.installed(Topology::Base);
        h.runner.respond("git -C", 0, "");

        let err = h.run(update(&["counterparty"], false)).unwrap_err();

        assert!(err.to_string().contains("detached"));
        assert!(h.compose_calls().is_empty());
    }
}
