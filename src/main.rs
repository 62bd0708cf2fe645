//! fednode — manage a Counterparty federated node.
//!
//! Wraps docker-compose for the node's service topologies. Run
//! `fednode --help` for usage.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod clean;
mod cli;
mod color;
mod compose;
mod config;
mod control;
mod install;
mod node;
mod ports;
mod topology;
mod update;

use cli::Cli;
use node::{Console, Node};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_target(false)
        .init();

    node_setup::preflight::require_root()?;

    let root = match cli.root {
        Some(ref root) => root.clone(),
        None => default_root()?,
    };
    let runner = node_setup::SystemRunner;
    let probe = ports::TcpProbe;
    let node = Node {
        root,
        host_interface: cli.host_interface.clone(),
        hostname: hostname(),
        docker_volumes: PathBuf::from(node::DOCKER_VOLUMES),
        runner: &runner,
        ports: &probe,
    };

    node::dispatch(&node, &cli.command, &mut Console::stdio())
}

/// Directory holding the running executable, which ships next to the
/// compose descriptors.
fn default_root() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the fednode executable")?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent()
        .map(PathBuf::from)
        .context("fednode executable has no parent directory")
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates
        // on success when the name fits.
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc == 0 {
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            return String::from_utf8_lossy(&buf[..end]).into_owned();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into())
}
