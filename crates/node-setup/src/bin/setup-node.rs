//! setup-node — provision a federated node directly on an Ubuntu host.
//!
//! Questions not answered by a flag are asked on the terminal, or take their
//! default with `--noninteractive`.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use node_setup::host::{provision, HostContext, SetupPlan};
use node_setup::preflight;
use node_setup::{AppConfigResolver, QuestionGatherer, SystemRunner};

#[derive(Parser)]
#[clap(
    name = "setup-node",
    version,
    about = "Set up a Counterparty federated node on this host",
    long_about = None
)]
struct Cli {
    /// Take defaults for every question not answered by a flag
    #[clap(long, short = 'n')]
    noninteractive: bool,

    /// Account that owns the checkouts and runs the services
    #[clap(long, default_value = "xcp")]
    user: String,

    /// Role to build (counterwallet, vendingmachine, blockexplorer, counterpartyd_only, btcpayescrow)
    #[clap(long)]
    role: Option<String>,

    /// Branch to build from (master or develop)
    #[clap(long)]
    branch: Option<String>,

    /// Networks to run: t(estnet), m(ainnet) or b(oth)
    #[clap(long)]
    run_mode: Option<String>,

    /// Use a hosted blockchain service instead of a local backend (y/n)
    #[clap(long)]
    blockchain_service: Option<String>,

    /// Apply host security hardening (y/n)
    #[clap(long)]
    security_hardening: Option<String>,

    /// Start services automatically, including on boot (y/n)
    #[clap(long)]
    autostart_services: Option<String>,

    /// Expose the counterparty API publicly (y/n)
    #[clap(long)]
    counterpartyd_public: Option<String>,

    /// Address support cases go to (counterwallet role only)
    #[clap(long)]
    support_email: Option<String>,

    /// os-release file used for the platform check
    #[clap(long, default_value = "/etc/os-release", hide = true)]
    os_release: PathBuf,

    /// Verbose logging
    #[clap(long, short)]
    debug: bool,
}

impl Cli {
    fn gatherer(&self) -> QuestionGatherer {
        let flags = [
            ("role", &self.role),
            ("branch", &self.branch),
            ("run_mode", &self.run_mode),
            ("blockchain_service", &self.blockchain_service),
            ("security_hardening", &self.security_hardening),
            ("autostart_services", &self.autostart_services),
            ("counterpartyd_public", &self.counterpartyd_public),
            ("counterwallet_support_email", &self.support_email),
        ];
        flags
            .into_iter()
            .fold(QuestionGatherer::new(!self.noninteractive), |g, (name, value)| match value {
                Some(v) => g.supply(name, v.as_str()),
                None => g,
            })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_target(false)
        .init();

    preflight::require_root()?;
    preflight::check_platform(&cli.os_release)?;

    let answers = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        cli.gatherer().gather(&mut input, &mut output)?
    };
    info!("building role '{}' from branch '{}'", answers.role, answers.branch);

    let resolver = AppConfigResolver::default();
    let home = resolver.home_dir(&cli.user)?;
    let plan = SetupPlan::new(answers, &cli.user, &home);
    let runner = SystemRunner;
    let ctx = HostContext {
        runner: &runner,
        resolver: &resolver,
    };

    let report = match provision(&plan, &ctx) {
        Ok(report) => report,
        Err(e) => {
            for (name, status) in &e.report.steps {
                eprintln!("  {:<32} {}", name, status);
            }
            return Err(e).context("setup aborted");
        }
    };

    println!();
    for (name, status) in &report.steps {
        println!("  {:<32} {}", name, status);
    }
    println!("\nSetup complete. Configs live under {}/.config", home.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_setup::{Network, Role};

    #[test]
    fn test_each_flag_supplies_its_own_question() {
        let cli = Cli::parse_from([
            "setup-node",
            "-n",
            "--role",
            "counterpartyd_only",
            "--run-mode",
            "t",
            "--security-hardening",
            "n",
            "--autostart-services",
            "n",
            "--counterpartyd-public",
            "n",
        ]);
        let answers = cli
            .gatherer()
            .gather(&mut io::Cursor::new(Vec::new()), &mut Vec::new())
            .unwrap();

        assert_eq!(answers.role, Role::CounterpartydOnly);
        assert_eq!(answers.run_mode, Network::Testnet);
        assert!(!answers.security_hardening);
        assert!(!answers.autostart_services);
        assert!(!answers.counterpartyd_public);
        assert_eq!(answers.branch, "master");
    }
}
