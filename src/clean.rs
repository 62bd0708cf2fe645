//! `fednode docker_clean` — remove every container and image on the host.

use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use node_setup::runner::{capture_checked, run_checked, Invocation};

use crate::color;
use crate::node::{Console, Node};

pub fn run(node: &Node<'_>, force: bool, console: &mut Console) -> Result<()> {
    println!(
        "{}",
        color::yellow("This removes ALL docker containers and images on this host, not just fednode's.")
    );
    if !force && !console.confirm("Proceed?")? {
        println!("Aborted.");
        return Ok(());
    }

    remove_all(node, &["ps", "-a", "-q"], &["rm", "-f"], "containers")?;
    remove_all(node, &["images", "-q"], &["rmi", "-f"], "images")?;
    println!("{}", color::bold_green("✓ docker cleaned."));
    Ok(())
}

/// List ids with `docker <list>` and hand them all to `docker <remove>`.
fn remove_all(node: &Node<'_>, list: &[&str], remove: &[&str], what: &str) -> Result<()> {
    let out = capture_checked(node.runner, &Invocation::new("docker").args(list.iter().copied()))?;
    // `images -q` prints one line per tag, so ids can repeat anywhere.
    let mut seen = HashSet::new();
    let ids: Vec<&str> = out.split_whitespace().filter(|id| seen.insert(*id)).collect();
    if ids.is_empty() {
        info!("no {} to remove", what);
        return Ok(());
    }
    println!("  removing {} {}", ids.len(), what);
    run_checked(
        node.runner,
        &Invocation::new("docker").args(remove.iter().copied()).args(ids),
    )?;
    Ok(())
}
