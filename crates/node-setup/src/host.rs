//! Native (non-container) provisioning of a federated node host.
//!
//! Everything the run needs (answers, paths, generated credentials) is
//! resolved up front into a [`SetupPlan`]; [`provision`] then turns it into
//! an ordered [`Pipeline`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app_config::{AppConfigResolver, Network};
use crate::config_edit::{self, UpsertOptions};
use crate::error::{Result, SetupError};
use crate::preflight::pass_generator;
use crate::questions::{BuildAnswers, Role};
use crate::repo::{BranchSpec, RepoSpec, RepoSyncer};
use crate::runner::{run_checked, Invocation, ShellRunner};
use crate::service::{RunitLayout, ServiceRegistrar};
use crate::step::{Pipeline, PipelineError, PipelineReport, StepOutcome};

pub const BUILD_REPO_URL: &str = "https://github.com/CounterpartyXCP/federatednode_build.git";
pub const COUNTERPARTY_REPO_URL: &str = "https://github.com/CounterpartyXCP/counterparty-lib.git";
pub const COUNTERBLOCK_REPO_URL: &str = "https://github.com/CounterpartyXCP/counterblock.git";

const HARDENING_PACKAGES: &[&str] = &[
    "unattended-upgrades",
    "fail2ban",
    "psad",
    "rkhunter",
    "chkrootkit",
    "logwatch",
    "apparmor",
    "apparmor-profiles",
    "auditd",
    "audispd-plugins",
    "iwatch",
];

/// RPC passwords for one network: the backend's and counterparty's API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub backend: String,
    pub counterparty: String,
}

impl Credentials {
    pub fn generate() -> Self {
        Self {
            backend: pass_generator(14),
            counterparty: pass_generator(14),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetupPlan {
    pub answers: BuildAnswers,
    pub user: String,
    pub home: PathBuf,
    /// Checkout of the build tree holding the runit templates.
    pub build_dir: PathBuf,
    /// Root that `/etc` paths are resolved against (`/` on a real host).
    pub etc_root: PathBuf,
    pub mainnet: Credentials,
    pub testnet: Credentials,
}

impl SetupPlan {
    pub fn new(answers: BuildAnswers, user: &str, home: &Path) -> Self {
        Self {
            answers,
            user: user.to_string(),
            home: home.to_path_buf(),
            build_dir: home.join("federatednode_build"),
            etc_root: PathBuf::from("/"),
            mainnet: Credentials::generate(),
            testnet: Credentials::generate(),
        }
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.build_dir.join("dist")
    }

    fn etc(&self, rel: &str) -> PathBuf {
        self.etc_root.join("etc").join(rel)
    }

    pub fn repos(&self) -> Vec<RepoSpec> {
        let mut repos = vec![
            RepoSpec::new("federatednode_build", BUILD_REPO_URL, &self.build_dir),
            RepoSpec::new("counterparty-lib", COUNTERPARTY_REPO_URL, self.home.join("counterparty-lib")),
        ];
        if self.answers.role.runs_counterblock() {
            repos.push(RepoSpec::new(
                "counterblock",
                COUNTERBLOCK_REPO_URL,
                self.home.join("counterblock"),
            ));
        }
        repos
    }

    fn credentials(&self, testnet: bool) -> &Credentials {
        if testnet {
            &self.testnet
        } else {
            &self.mainnet
        }
    }

    /// Every service this tooling knows about, with whether the chosen role
    /// and run mode want it (`Some(enabled)`) or not at all (`None`).
    pub fn services(&self) -> Vec<(String, Option<bool>)> {
        let a = &self.answers;
        let mut out = Vec::new();
        let mut push = |base: &str, wanted: bool, local: bool| {
            for testnet in [false, true] {
                let name = if testnet {
                    format!("{}-testnet", base)
                } else {
                    base.to_string()
                };
                let enabled = if testnet {
                    a.run_mode.includes_testnet()
                } else {
                    a.run_mode.includes_mainnet()
                };
                out.push((name, wanted.then_some(enabled && local)));
            }
        };
        push("bitcoin", true, !a.blockchain_service);
        push("counterparty", true, true);
        push("counterblock", a.role.runs_counterblock(), true);
        push("armory_utxsvr", a.role == Role::Counterwallet, true);
        out
    }
}

/// Host-side collaborators the pipeline drives.
pub struct HostContext<'a> {
    pub runner: &'a dyn ShellRunner,
    pub resolver: &'a AppConfigResolver,
}

pub fn provision(plan: &SetupPlan, ctx: &HostContext<'_>) -> std::result::Result<PipelineReport, PipelineError> {
    let registrar = ServiceRegistrar::new(
        RunitLayout::under(&plan.etc_root, &plan.dist_dir()),
        ctx.runner,
    );
    let registrar = &registrar;

    Pipeline::new()
        .then("create service user", || ensure_user(ctx.runner, &plan.user))
        .then("check out source repositories", || {
            let syncer = RepoSyncer::new(ctx.runner);
            let branch = BranchSpec::Named(plan.answers.branch.clone());
            for repo in plan.repos() {
                syncer.sync(&repo, &branch, None, Some(&plan.user))?;
            }
            Ok(())
        })
        .then("create default configs", || {
            let network = plan.answers.run_mode;
            ctx.resolver.materialize("counterparty", network, &plan.user)?;
            if plan.answers.role.runs_counterblock() {
                ctx.resolver.materialize("counterblock", network, &plan.user)?;
            }
            Ok(())
        })
        .then("configure rpc credentials", || configure_credentials(plan, ctx))
        .then("register services", || {
            for (name, wanted) in plan.services() {
                match wanted {
                    Some(enabled) => registrar.install_definition(&name, enabled, true)?,
                    None => registrar.unregister(&name)?,
                }
            }
            Ok(())
        })
        .step("security hardening", || {
            if !plan.answers.security_hardening {
                return Ok(StepOutcome::Soft("not requested".into()));
            }
            harden(plan, ctx.runner).map(|()| StepOutcome::Done)
        })
        .step("release manual control", || {
            if !plan.answers.autostart_services {
                return Ok(StepOutcome::Soft(
                    "autostart not requested; start services with `sv start <name>`".into(),
                ));
            }
            for (name, wanted) in plan.services() {
                if wanted == Some(true) {
                    registrar.release_manual_control(&name)?;
                }
            }
            Ok(StepOutcome::Done)
        })
        .run()
}

fn ensure_user(runner: &dyn ShellRunner, user: &str) -> Result<()> {
    let exists = runner.output(&Invocation::new("id").args(["-u", user]))?.success();
    if exists {
        return Ok(());
    }
    info!("creating user '{}'", user);
    run_checked(
        runner,
        &Invocation::new("adduser").args([
            "--system",
            "--disabled-password",
            "--shell",
            "/bin/bash",
            "--group",
            user,
        ]),
    )
}

/// Backend config for one network: reuse its RPC password when the file
/// already exists, otherwise write a fresh one. Returns the password in use.
fn backend_password(plan: &SetupPlan, resolver: &AppConfigResolver, testnet: bool) -> Result<String> {
    let dir = plan.home.join(if testnet { ".bitcoin-testnet" } else { ".bitcoin" });
    let path = dir.join("bitcoin.conf");
    if path.exists() {
        if let Some(existing) = config_edit::get_key(&path, "rpcpassword")? {
            return Ok(existing);
        }
    }
    let password = plan.credentials(testnet).backend.clone();
    let mut content = format!(
        "rpcuser=rpc\nrpcpassword={}\nserver=1\ndaemon=1\ntxindex=1\n",
        password
    );
    if testnet {
        content.push_str("testnet=1\n");
    }
    fs::create_dir_all(&dir).map_err(|e| SetupError::io(&dir, e))?;
    config_edit::write_atomic(&path, content.as_bytes())?;
    resolver.hand_over(&plan.user, &dir, &path)?;
    Ok(password)
}

fn configure_credentials(plan: &SetupPlan, ctx: &HostContext<'_>) -> Result<()> {
    let user = plan.user.as_str();
    let counterblock = plan.answers.role.runs_counterblock();

    for &testnet in plan.answers.run_mode.testnet_flags() {
        let net = if testnet { Network::Testnet } else { Network::Mainnet };
        let backend = if plan.answers.blockchain_service {
            plan.credentials(testnet).backend.clone()
        } else {
            backend_password(plan, ctx.resolver, testnet)?
        };
        let api = &plan.credentials(testnet).counterparty;

        ctx.resolver.set("counterparty", net, user, "backend-password", &backend)?;
        ctx.resolver.set("counterparty", net, user, "rpc-password", api)?;
        if counterblock {
            ctx.resolver.set("counterblock", net, user, "backend-password", &backend)?;
            ctx.resolver.set("counterblock", net, user, "counterparty-password", api)?;
        }
    }

    let network = plan.answers.run_mode;
    if plan.answers.counterpartyd_public {
        ctx.resolver.set("counterparty", network, user, "rpc-host", "0.0.0.0")?;
    }
    if let Some(email) = &plan.answers.support_email {
        ctx.resolver.set("counterblock", network, user, "support-email", email)?;
    }
    Ok(())
}

fn harden(plan: &SetupPlan, runner: &dyn ShellRunner) -> Result<()> {
    config_edit::upsert(r"^nospoof on$", "nospoof on", &[plan.etc("host.conf")], UpsertOptions::default())?;

    run_checked(
        runner,
        &Invocation::new("apt-get")
            .args(["-y", "install"])
            .args(HARDENING_PACKAGES.iter().copied()),
    )?;

    let psad = [plan.etc("psad/psad.conf")];
    config_edit::upsert(r"^ENABLE_AUTO_IDS\s+[YN];$", "ENABLE_AUTO_IDS\tY;", &psad, UpsertOptions::default())?;
    config_edit::upsert(
        r"^ENABLE_AUTO_IDS_EMAILS\s+[YN];$",
        "ENABLE_AUTO_IDS_EMAILS\tN;",
        &psad,
        UpsertOptions::default(),
    )?;
    for rules in ["ufw/before.rules", "ufw/before6.rules"] {
        config_edit::upsert(
            r"^# End required lines.*?# allow all on loopback$",
            "# End required lines\n\n#CUSTOM: for psad\n-A INPUT -j LOG\n-A FORWARD -j LOG\n\n# allow all on loopback",
            &[plan.etc(rules)],
            UpsertOptions::dotall(),
        )?;
    }

    config_edit::set_key("USE_AUGENRULES", "\"yes\"", &[plan.etc("default/auditd")])?;
    config_edit::set_key("START_DAEMON", "true", &[plan.etc("default/iwatch")])?;

    for svc in ["fail2ban", "psad", "auditd", "iwatch"] {
        run_checked(runner, &Invocation::new("service").args([svc, "restart"]))?;
    }
    Ok(())
}
