//! Service control: commands forwarded to docker-compose or docker.

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use node_setup::runner::{run_checked, Invocation};

use crate::compose::{container_name, Compose};
use crate::config::FednodeConfig;
use crate::node::Node;

const REPARSE_SERVICES: &[&str] = &["counterparty", "counterparty-testnet", "counterblock", "counterblock-testnet"];
const VACUUM_SERVICES: &[&str] = &["counterparty", "counterparty-testnet"];

/// `<action> [services...]`; no services means every service.
pub fn forward(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, action: &str, services: &[String]) -> Result<()> {
    check_services(config, services)?;
    compose.run(node.runner, std::iter::once(action).chain(services.iter().map(String::as_str)))
}

pub fn tail(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, services: &[String], lines: u32) -> Result<()> {
    check_services(config, services)?;
    let tail = format!("--tail={}", lines);
    let args = ["logs", "-f", tail.as_str()]
        .into_iter()
        .chain(services.iter().map(String::as_str));
    compose.run(node.runner, args)
}

pub fn rebuild(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, services: &[String]) -> Result<()> {
    forward(node, config, compose, "pull", services)?;
    let args = ["up", "-d", "--force-recreate", "--no-deps"]
        .into_iter()
        .chain(services.iter().map(String::as_str));
    compose.run(node.runner, args)
}

fn check_services(config: &FednodeConfig, services: &[String]) -> Result<()> {
    services.iter().try_for_each(|service| check_service(config, service, None))
}

/// Ensure `service` is part of the installed topology and, when `allowed` is
/// given, one of those names.
fn check_service(config: &FednodeConfig, service: &str, allowed: Option<&[&str]>) -> Result<()> {
    if let Some(allowed) = allowed {
        if !allowed.contains(&service) {
            bail!("invalid service '{}': choose one of {}", service, allowed.join(", "));
        }
    }
    if !config.topology.has_service(service) {
        bail!(
            "service '{}' is not part of the installed '{}' topology",
            service,
            config.topology
        );
    }
    Ok(())
}

/// Stop `service`, then run it once with `COMMAND=<command>` so its entrypoint
/// performs that maintenance pass instead of the normal server start.
fn rerun_with(node: &Node<'_>, compose: &Compose, service: &str, command: &str) -> Result<()> {
    compose.run(node.runner, ["stop", service])?;
    info!("running {} for {}", command, service);
    let env = format!("COMMAND={}", command);
    compose.run(node.runner, ["run", "-e", env.as_str(), service])
}

pub fn reparse(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, service: &str) -> Result<()> {
    check_service(config, service, Some(REPARSE_SERVICES))?;
    rerun_with(node, compose, service, "reparse")
}

pub fn vacuum(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, service: &str) -> Result<()> {
    check_service(config, service, Some(VACUUM_SERVICES))?;
    rerun_with(node, compose, service, "vacuum")
}

/// Run `cmd` inside the running container, handed to `bash -c` as one
/// shell-quoted argument.
pub fn exec(node: &Node<'_>, config: &FednodeConfig, service: &str, cmd: &[String]) -> Result<()> {
    check_service(config, service, None)?;
    let line = shlex::try_join(cmd.iter().map(String::as_str)).context("command contains a NUL byte")?;
    let inv = Invocation::new("docker")
        .args(["exec", "-i", "-t"])
        .arg(container_name(service))
        .args(["bash", "-c"])
        .arg(line);
    run_checked(node.runner, &inv)?;
    Ok(())
}

/// Interactive shell in the service's container; a throwaway container when
/// the service is not running.
pub fn shell(node: &Node<'_>, config: &FednodeConfig, compose: &Compose, service: &str) -> Result<()> {
    check_service(config, service, None)?;
    let container = container_name(service);
    if is_running(node, &container) {
        let inv = Invocation::new("docker")
            .args(["exec", "-i", "-t"])
            .arg(container)
            .arg("bash");
        run_checked(node.runner, &inv)?;
        Ok(())
    } else {
        println!("Container is not running; starting a temporary one with a shell.");
        compose.run(node.runner, ["run", "--rm", "--entrypoint", "bash", service])
    }
}

fn is_running(node: &Node<'_>, container: &str) -> bool {
    let out = match node
        .runner
        .output(&Invocation::new("docker").args(["inspect", container]))
    {
        Ok(out) if out.success() => out,
        _ => {
            debug!("no container named {}", container);
            return false;
        }
    };
    parse_running(&out.stdout).unwrap_or(false)
}

/// `State.Running` of the first object in `docker inspect` output.
fn parse_running(json: &str) -> Option<bool> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    value.as_array()?.first()?.get("State")?.get("Running")?.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use crate::node::testing::Harness;
    use crate::topology::Topology;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_reparse_stops_then_runs_with_command() {
        let h = Harness::new();
        h.installed(Topology::Counterblock);

        h.run(Commands::Reparse {
            service: "counterblock-testnet".into(),
        })
        .unwrap();

        assert_eq!(
            h.compose_calls(),
            vec![
                s(&["stop", "counterblock-testnet"]),
                s(&["run", "-e", "COMMAND=reparse", "counterblock-testnet"])
            ]
        );
    }

    #[test]
    fn test_vacuum_rejects_other_services() {
        let h = Harness::new();
        h.installed(Topology::Full);

        let err = h
            .run(Commands::Vacuum {
                service: "counterblock".into(),
            })
            .unwrap_err();

        assert!(err.to_string().contains("invalid service"));
        assert!(h.runner.is_empty());
    }

    #[test]
    fn test_reparse_service_outside_topology() {
        let h = Harness::new();
        h.installed(Topology::Base);

        let err = h
            .run(Commands::Reparse {
                service: "counterblock".into(),
            })
            .unwrap_err();

        assert!(err.to_string().contains("not part of the installed 'base' topology"));
        assert!(h.runner.is_empty());
    }

    #[test]
    fn test_service_lists_checked_against_topology() {
        let h = Harness::new();
        h.installed(Topology::Base);

        for command in [
            Commands::Start { services: s(&["counterparty", "counterblock"]) },
            Commands::Logs { services: s(&["armory_utxsvr"]) },
            Commands::Tail { services: s(&["counterblock"]), lines: 20 },
            Commands::Rebuild { services: s(&["counterwallet"]) },
        ] {
            let err = h.run(command).unwrap_err();
            assert!(err.to_string().contains("not part of the installed 'base' topology"));
        }
        assert!(h.runner.is_empty());
    }

    #[test]
    fn test_tail_default_lines() {
        let h = Harness::new();
        h.installed(Topology::Base);

        h.run(Commands::Tail {
            services: s(&["counterparty"]),
            lines: 20,
        })
        .unwrap();

        assert_eq!(h.compose_calls(), vec![s(&["logs", "-f", "--tail=20", "counterparty"])]);
    }

    #[test]
    fn test_rebuild_pulls_then_recreates() {
        let h = Harness::new();
        h.installed(Topology::Base);

        h.run(Commands::Rebuild {
            services: s(&["bitcoin"]),
        })
        .unwrap();

        assert_eq!(
            h.compose_calls(),
            vec![
                s(&["pull", "bitcoin"]),
                s(&["up", "-d", "--force-recreate", "--no-deps", "bitcoin"])
            ]
        );
    }

    #[test]
    fn test_exec_quotes_command_as_one_argument() {
        let h = Harness::new();
        h.installed(Topology::Base);

        h.run(Commands::Exec {
            service: "counterparty".into(),
            cmd: s(&["counterparty-client", "getinfo", "a b"]),
        })
        .unwrap();

        let inv = h.runner.invocations().pop().unwrap();
        assert_eq!(inv.program, "docker");
        assert_eq!(
            inv.args,
            s(&[
                "exec",
                "-i",
                "-t",
                "federatednode_counterparty_1",
                "bash",
                "-c",
                "counterparty-client getinfo 'a b'"
            ])
        );
    }

    #[test]
    fn test_shell_into_running_container() {
        let h = Harness::new();
        h.installed(Topology::Base);
        h.runner
            .respond("docker inspect", 0, r#"[{"Id": "abc", "State": {"Running": true}}]"#);

        h.run(Commands::Shell {
            service: "counterparty".into(),
        })
        .unwrap();

        assert_eq!(
            h.runner.lines().last().unwrap(),
            "docker exec -i -t federatednode_counterparty_1 bash"
        );
    }

    #[test]
    fn test_shell_falls_back_to_disposable_container() {
        let h = Harness::new();
        h.installed(Topology::Base);
        h.runner
            .respond("docker inspect", 0, r#"[{"State": {"Running": false}}]"#);

        h.run(Commands::Shell {
            service: "bitcoin".into(),
        })
        .unwrap();

        assert_eq!(h.compose_calls(), vec![s(&["run", "--rm", "--entrypoint", "bash", "bitcoin"])]);
    }

    #[test]
    fn test_shell_with_missing_container_falls_back() {
        let h = Harness::new();
        h.installed(Topology::Base);
        h.runner.respond("docker inspect", 1, "[]");

        h.run(Commands::Shell {
            service: "bitcoin".into(),
        })
        .unwrap();

        assert_eq!(h.compose_calls().len(), 1);
    }

    #[test]
    fn test_parse_running() {
        assert_eq!(parse_running(r#"[{"State": {"Running": true}}]"#), Some(true));
        assert_eq!(parse_running("[]"), None);
        assert_eq!(parse_running("not json"), None);
    }
}
