//! CLI definitions for fednode.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::topology::Topology;

#[derive(Parser)]
#[clap(
    name = "fednode",
    version,
    about = "Manage a Counterparty federated node\n\nInstall, control and update the node's docker-compose services.",
    long_about = None
)]
pub struct Cli {
    /// Increase output verbosity
    #[clap(long, short, global = true)]
    pub debug: bool,

    /// Federated node checkout (default: the directory holding this executable)
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,

    /// Host interface the services' published ports bind to
    #[clap(long, global = true, default_value = "0.0.0.0")]
    pub host_interface: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Install fednode services
    Install {
        /// The service configuration to utilize
        #[clap(value_enum)]
        topology: Topology,

        /// The git branch to utilize for the build
        #[clap(value_parser = ["master", "develop"])]
        branch: String,
    },

    /// Tear down the services and forget the install
    Uninstall {
        /// Don't ask for confirmation
        #[clap(long)]
        force: bool,
    },

    /// Start services (all if none given)
    Start { services: Vec<String> },

    /// Stop services (all if none given)
    Stop { services: Vec<String> },

    /// Restart services (all if none given)
    Restart { services: Vec<String> },

    /// Reparse a service's data from the blockchain
    Reparse { service: String },

    /// Vacuum a service's database
    Vacuum { service: String },

    /// List installed services
    Ps,

    /// Follow service logs
    Tail {
        services: Vec<String>,

        /// Number of lines to show before following
        #[clap(long, short = 'n', default_value = "20")]
        lines: u32,
    },

    /// Show service logs
    Logs { services: Vec<String> },

    /// Execute a command in a running service container
    Exec {
        service: String,

        #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },

    /// Open a shell in a service container
    Shell { service: String },

    /// Pull service source code and restart the containers
    Update {
        services: Vec<String>,

        /// Don't restart the containers after updating the code
        #[clap(long)]
        no_restart: bool,
    },

    /// Re-pull images and recreate containers
    Rebuild { services: Vec<String> },

    /// Remove every container and image on this host
    #[clap(name = "docker_clean")]
    DockerClean {
        /// Don't ask for confirmation
        #[clap(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install() {
        let cli = Cli::parse_from(["fednode", "install", "counterblock", "develop"]);
        assert_eq!(
            cli.command,
            Commands::Install {
                topology: Topology::Counterblock,
                branch: "develop".into()
            }
        );
        assert_eq!(cli.host_interface, "0.0.0.0");
    }

    #[test]
    fn test_bad_branch_rejected() {
        assert!(Cli::try_parse_from(["fednode", "install", "base", "feature-x"]).is_err());
    }

    #[test]
    fn test_exec_keeps_hyphenated_args() {
        let cli = Cli::parse_from(["fednode", "exec", "counterparty", "ls", "-la", "/data"]);
        assert_eq!(
            cli.command,
            Commands::Exec {
                service: "counterparty".into(),
                cmd: vec!["ls".into(), "-la".into(), "/data".into()]
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["fednode", "tail", "counterparty", "-n", "50", "-d"]);
        assert!(cli.debug);
        assert_eq!(
            cli.command,
            Commands::Tail {
                services: vec!["counterparty".into()],
                lines: 50
            }
        );
    }

    #[test]
    fn test_docker_clean_name() {
        let cli = Cli::parse_from(["fednode", "docker_clean", "--force"]);
        assert_eq!(cli.command, Commands::DockerClean { force: true });
    }
}
