//! Command dispatch against one federated node checkout.

use anyhow::{bail, Result};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use node_setup::questions;
use node_setup::runner::ShellRunner;

use crate::cli::Commands;
use crate::compose::Compose;
use crate::config::FednodeConfig;
use crate::ports::PortProbe;
use crate::{clean, control, install, update};

/// Where docker keeps named volumes on the host.
pub const DOCKER_VOLUMES: &str = "/var/lib/docker/volumes";

/// Operator terminal, swappable for scripted input in tests.
pub struct Console {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Console {
    pub fn stdio() -> Self {
        Self {
            input: Box::new(BufReader::new(io::stdin())),
            output: Box::new(io::stdout()),
        }
    }

    #[cfg(test)]
    pub fn scripted(input: &str) -> Self {
        Self {
            input: Box::new(io::Cursor::new(input.as_bytes().to_vec())),
            output: Box::new(io::sink()),
        }
    }

    pub fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(questions::confirm(prompt, &mut self.input, &mut self.output)?)
    }
}

/// Everything a command needs to act on the host.
pub struct Node<'a> {
    pub root: PathBuf,
    pub host_interface: String,
    pub hostname: String,
    pub docker_volumes: PathBuf,
    pub runner: &'a dyn ShellRunner,
    pub ports: &'a dyn PortProbe,
}

impl<'a> Node<'a> {
    pub fn config_path(&self) -> PathBuf {
        FednodeConfig::path(&self.root)
    }

    pub fn compose(&self, config: &FednodeConfig) -> Compose {
        Compose::new(&self.root, config, &self.host_interface, &self.hostname)
    }

    pub fn source_dir(&self, repo: &str) -> PathBuf {
        self.root.join("src").join(repo)
    }
}

/// Run one command. Without a persisted config only `install` and
/// `docker_clean` are accepted; with one, `install` is refused.
pub fn dispatch(node: &Node<'_>, command: &Commands, console: &mut Console) -> Result<()> {
    let config_path = node.config_path();
    let config = FednodeConfig::load(&config_path)?;

    let config = match (command, config) {
        (Commands::DockerClean { force }, _) => return clean::run(node, *force, console),
        (Commands::Install { topology, branch }, None) => {
            return install::install(node, *topology, branch)
        }
        (Commands::Install { .. }, Some(_)) => bail!(
            "cannot install, as it appears a configuration already exists at {}. \
             Please run the 'uninstall' command first",
            config_path.display()
        ),
        (_, None) => bail!(
            "config file {} does not exist. Please run the 'install' command first",
            config_path.display()
        ),
        (_, Some(config)) => config,
    };

    let compose = node.compose(&config);
    match command {
        Commands::Uninstall { force } => install::uninstall(node, &compose, *force, console),
        Commands::Start { services } => control::forward(node, &config, &compose, "start", services),
        Commands::Stop { services } => control::forward(node, &config, &compose, "stop", services),
        Commands::Restart { services } => control::forward(node, &config, &compose, "restart", services),
        Commands::Reparse { service } => control::reparse(node, &config, &compose, service),
        Commands::Vacuum { service } => control::vacuum(node, &config, &compose, service),
        Commands::Ps => compose.run(node.runner, ["ps"]),
        Commands::Tail { services, lines } => control::tail(node, &config, &compose, services, *lines),
        Commands::Logs { services } => control::forward(node, &config, &compose, "logs", services),
        Commands::Exec { service, cmd } => control::exec(node, &config, service, cmd),
        Commands::Shell { service } => control::shell(node, &config, &compose, service),
        Commands::Update { services, no_restart } => {
            update::run(node, &config, &compose, services, !*no_restart)
        }
        Commands::Rebuild { services } => control::rebuild(node, &config, &compose, services),
        Commands::Install { .. } | Commands::DockerClean { .. } => unreachable!("handled above"),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::ports::fake::FakeProbe;
    use node_setup::runner::RecordingRunner;
    use tempfile::TempDir;

    /// A node rooted in a temp dir with recording collaborators.
    pub struct Harness {
        pub temp: TempDir,
        pub runner: RecordingRunner,
        pub ports: FakeProbe,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_busy_ports(&[])
        }

        pub fn with_busy_ports(ports: &[u16]) -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                runner: RecordingRunner::new(),
                ports: FakeProbe::busy(ports),
            }
        }

        pub fn node(&self) -> Node<'_> {
            Node {
                root: self.temp.path().join("fednode"),
                host_interface: "0.0.0.0".into(),
                hostname: "testhost".into(),
                docker_volumes: self.temp.path().join("volumes"),
                runner: &self.runner,
                ports: &self.ports,
            }
        }

        pub fn run(&self, command: Commands) -> Result<()> {
            self.run_with_input(command, "")
        }

        pub fn run_with_input(&self, command: Commands, input: &str) -> Result<()> {
            let node = self.node();
            std::fs::create_dir_all(&node.root).unwrap();
            dispatch(&node, &command, &mut Console::scripted(input))
        }

        /// Compose arguments after `-f <file> -p federatednode`.
        pub fn compose_calls(&self) -> Vec<Vec<String>> {
            self.runner
                .invocations()
                .into_iter()
                .filter(|inv| inv.program == "docker-compose")
                .map(|inv| inv.args[4..].to_vec())
                .collect()
        }

        pub fn installed(&self, topology: crate::topology::Topology) {
            let node = self.node();
            std::fs::create_dir_all(&node.root).unwrap();
            FednodeConfig::new(topology, "master").save(&node.config_path()).unwrap();
        }
    }
}
