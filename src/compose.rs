//! docker-compose invocation for the installed topology.

use std::path::{Path, PathBuf};

use node_setup::runner::{run_checked, Invocation, ShellRunner};

use crate::config::FednodeConfig;

/// Compose project name; containers are named `<project>_<service>_1`.
pub const PROJECT: &str = "federatednode";

#[derive(Debug, Clone)]
pub struct Compose {
    file: PathBuf,
    env: Vec<(String, String)>,
}

impl Compose {
    /// Descriptor and environment for `config`. The descriptors reference
    /// `FEDNODE_RELEASE_TAG`, `HOST_INTERFACE` and `HOSTNAME_BASE`.
    pub fn new(root: &Path, config: &FednodeConfig, host_interface: &str, hostname: &str) -> Self {
        Self {
            file: config.topology.compose_file(root),
            env: vec![
                ("FEDNODE_RELEASE_TAG".into(), config.release_tag().to_string()),
                ("HOST_INTERFACE".into(), host_interface.to_string()),
                ("HOSTNAME_BASE".into(), hostname.to_string()),
            ],
        }
    }

    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = Invocation::new("docker-compose")
            .arg("-f")
            .path_arg(&self.file)
            .args(["-p", PROJECT])
            .args(args);
        self.env.iter().fold(inv, |inv, (k, v)| inv.env(k.as_str(), v.as_str()))
    }

    /// Run a compose subcommand; a non-zero exit is fatal.
    pub fn run<I, S>(&self, runner: &dyn ShellRunner, args: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        run_checked(runner, &self.invocation(args))?;
        Ok(())
    }
}

pub fn container_name(service: &str) -> String {
    format!("{}_{}_1", PROJECT, service)
}
