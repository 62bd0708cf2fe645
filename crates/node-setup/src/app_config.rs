//! Per-application config file locations.
//!
//! Each application keeps its config under the owning user's home:
//! `~<user>/.config/<app>/<app>.conf` for mainnet and
//! `~<user>/.config/<app>-testnet/<app>.conf` for testnet. One generated
//! password can then be fanned out to every sibling config in a single call.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::config_edit::{self, UpsertOptions};
use crate::error::{Result, SetupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Both,
}

impl Network {
    /// Concrete networks covered, mainnet first.
    pub fn testnet_flags(self) -> &'static [bool] {
        match self {
            Network::Mainnet => &[false],
            Network::Testnet => &[true],
            Network::Both => &[false, true],
        }
    }

    pub fn includes_mainnet(self) -> bool {
        self != Network::Testnet
    }

    pub fn includes_testnet(self) -> bool {
        self != Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Both => "both",
        })
    }
}

impl FromStr for Network {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" | "m" => Ok(Network::Mainnet),
            "testnet" | "t" => Ok(Network::Testnet),
            "both" | "b" => Ok(Network::Both),
            other => Err(SetupError::InvalidAnswer {
                question: "network".into(),
                answer: other.into(),
                expected: "mainnet, testnet, both".into(),
            }),
        }
    }
}

/// The bits of a passwd entry the resolver cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfigResolver {
    passwd: PathBuf,
}

impl Default for AppConfigResolver {
    fn default() -> Self {
        Self::new("/etc/passwd")
    }
}

impl AppConfigResolver {
    pub fn new(passwd: impl Into<PathBuf>) -> Self {
        Self { passwd: passwd.into() }
    }

    /// Look `user` up in the passwd file. `Ok(None)` when absent.
    pub fn lookup_user(&self, user: &str) -> Result<Option<UserEntry>> {
        let content = match fs::read_to_string(&self.passwd) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SetupError::io(&self.passwd, e)),
        };
        for line in content.lines() {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() >= 6 && parts[0] == user {
                let (Ok(uid), Ok(gid)) = (parts[2].parse(), parts[3].parse()) else {
                    return Err(SetupError::precondition(format!(
                        "corrupted passwd entry for '{}' in {}",
                        user,
                        self.passwd.display()
                    )));
                };
                return Ok(Some(UserEntry {
                    uid,
                    gid,
                    home: PathBuf::from(parts[5]),
                }));
            }
        }
        Ok(None)
    }

    pub fn home_dir(&self, user: &str) -> Result<PathBuf> {
        Ok(self
            .lookup_user(user)?
            .map(|e| e.home)
            .unwrap_or_else(|| Path::new("/home").join(user)))
    }

    fn config_dir(home: &Path, app: &str, testnet: bool) -> PathBuf {
        let dir = if testnet {
            format!("{}-testnet", app)
        } else {
            app.to_string()
        };
        home.join(".config").join(dir)
    }

    fn conf_name(app: &str) -> String {
        format!("{}.conf", app)
    }

    /// Config file paths for `app` on `network`, mainnet first.
    pub fn resolve_paths(&self, app: &str, network: Network, user: &str) -> Result<Vec<PathBuf>> {
        let home = self.home_dir(user)?;
        Ok(network
            .testnet_flags()
            .iter()
            .map(|&testnet| Self::config_dir(&home, app, testnet).join(Self::conf_name(app)))
            .collect())
    }

    /// Regex upsert over every config resolved for `app`/`network`.
    pub fn apply(
        &self,
        pattern: &str,
        text: &str,
        app: &str,
        network: Network,
        user: &str,
        opts: UpsertOptions,
    ) -> Result<()> {
        let paths = self.resolve_paths(app, network, user)?;
        config_edit::upsert(pattern, text, &paths, opts)
    }

    /// Typed `key=value` upsert over every config resolved for `app`/`network`.
    pub fn set(&self, app: &str, network: Network, user: &str, key: &str, value: &str) -> Result<()> {
        let paths = self.resolve_paths(app, network, user)?;
        config_edit::set_key(key, value, &paths)
    }

    /// Give `user` a config file written by root: mode 0660, and both the
    /// file and its directory chowned to the user when it is in passwd.
    pub fn hand_over(&self, user: &str, dir: &Path, path: &Path) -> Result<()> {
        let entry = self.lookup_user(user)?;
        set_owner_and_mode(entry.as_ref(), user, dir, path)
    }

    /// Create each missing config from its default template. Existing files
    /// are never touched. Returns the paths that were created.
    pub fn materialize(&self, app: &str, network: Network, user: &str) -> Result<Vec<PathBuf>> {
        let entry = self.lookup_user(user)?;
        let home = entry
            .as_ref()
            .map(|e| e.home.clone())
            .unwrap_or_else(|| Path::new("/home").join(user));

        let mut created = Vec::new();
        for &testnet in network.testnet_flags() {
            let template = default_config(app, testnet).ok_or_else(|| {
                SetupError::precondition(format!("no default config template for '{}'", app))
            })?;
            let dir = Self::config_dir(&home, app, testnet);
            let path = dir.join(Self::conf_name(app));
            if path.exists() {
                info!("{} config file already exists at: '{}'", app, path.display());
                continue;
            }
            fs::create_dir_all(&dir).map_err(|e| SetupError::io(&dir, e))?;
            fs::write(&path, template).map_err(|e| SetupError::io(&path, e))?;
            set_owner_and_mode(entry.as_ref(), user, &dir, &path)?;
            info!("created {} config file at '{}'", app, path.display());
            created.push(path);
        }
        Ok(created)
    }
}

fn set_owner_and_mode(entry: Option<&UserEntry>, user: &str, dir: &Path, path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o660))
            .map_err(|e| SetupError::io(path, e))?;
        if let Some(e) = entry {
            for p in [dir, path] {
                if let Err(err) = std::os::unix::fs::chown(p, Some(e.uid), Some(e.gid)) {
                    warn!("could not chown {} to {}: {}", p.display(), user, err);
                }
            }
        }
    }
    Ok(())
}

/// Built-in default contents for the applications this tooling configures.
pub fn default_config(app: &str, testnet: bool) -> Option<&'static str> {
    match (app, testnet) {
        ("counterparty", false) => Some(
            "[Default]\n\
             backend-connect=localhost\n\
             backend-port=8332\n\
             backend-user=rpc\n\
             backend-password=rpcpw1234\n\
             rpc-host=localhost\n\
             rpc-port=4000\n\
             rpc-user=rpc\n\
             rpc-password=xcppw1234\n",
        ),
        ("counterparty", true) => Some(
            "[Default]\n\
             backend-connect=localhost\n\
             backend-port=18332\n\
             backend-user=rpc\n\
             backend-password=rpcpw1234\n\
             rpc-host=localhost\n\
             rpc-port=14000\n\
             rpc-user=rpc\n\
             rpc-password=xcppw1234\n\
             testnet=1\n",
        ),
        ("counterblock", false) => Some(
            "[Default]\n\
             backend-connect=localhost\n\
             backend-port=8332\n\
             backend-user=rpc\n\
             backend-password=rpcpw1234\n\
             counterparty-host=localhost\n\
             counterparty-port=4000\n\
             counterparty-user=rpc\n\
             counterparty-password=xcppw1234\n\
             rpc-host=0.0.0.0\n\
             rpc-port=4100\n\
             socketio-host=0.0.0.0\n\
             socketio-chat-host=0.0.0.0\n\
             redis-enable-apicache=0\n",
        ),
        ("counterblock", true) => Some(
            "[Default]\n\
             backend-connect=localhost\n\
             backend-port=18332\n\
             backend-user=rpc\n\
             backend-password=rpcpw1234\n\
             counterparty-host=localhost\n\
             counterparty-port=14000\n\
             counterparty-user=rpc\n\
             counterparty-password=xcppw1234\n\
             rpc-host=0.0.0.0\n\
             rpc-port=14100\n\
             socketio-host=0.0.0.0\n\
             socketio-chat-host=0.0.0.0\n\
             redis-enable-apicache=0\n\
             testnet=1\n",
        ),
        _ => None,
    }
}
