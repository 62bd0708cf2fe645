//! Service topologies and the static tables that go with them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A named set of services stood up together, each backed by its own
/// `docker-compose.<name>.yml` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Base,
    Counterblock,
    Full,
}

/// A sibling source checkout mounted into the containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRepo {
    pub name: &'static str,
    pub url: &'static str,
}

const BASE_SERVICES: &[&str] = &["bitcoin", "bitcoin-testnet", "counterparty", "counterparty-testnet"];
const COUNTERBLOCK_SERVICES: &[&str] = &["counterblock", "counterblock-testnet", "mongodb", "redis"];
const FULL_SERVICES: &[&str] = &["counterwallet", "armory_utxsvr", "armory_utxsvr-testnet"];

const BASE_PORTS: &[u16] = &[8332, 18332, 8333, 18333, 4000, 14000];
const COUNTERBLOCK_PORTS: &[u16] = &[4100, 14100, 27017, 6379];
const FULL_PORTS: &[u16] = &[80, 443];

const BASE_REPOS: &[SourceRepo] = &[
    SourceRepo {
        name: "counterparty-lib",
        url: "https://github.com/CounterpartyXCP/counterparty-lib.git",
    },
    SourceRepo {
        name: "counterparty-cli",
        url: "https://github.com/CounterpartyXCP/counterparty-cli.git",
    },
];
const COUNTERBLOCK_REPOS: &[SourceRepo] = &[SourceRepo {
    name: "counterblock",
    url: "https://github.com/CounterpartyXCP/counterblock.git",
}];
const FULL_REPOS: &[SourceRepo] = &[SourceRepo {
    name: "counterwallet",
    url: "https://github.com/CounterpartyXCP/counterwallet.git",
}];

const BASE_VOLUMES: &[&str] = &["bitcoin-data", "counterparty-data"];
const COUNTERBLOCK_VOLUMES: &[&str] = &["counterblock-data", "mongodb-data"];
const FULL_VOLUMES: &[&str] = &["armory-data"];

impl Topology {
    pub fn as_str(self) -> &'static str {
        match self {
            Topology::Base => "base",
            Topology::Counterblock => "counterblock",
            Topology::Full => "full",
        }
    }

    /// How many tiers of each table this topology includes; topologies nest.
    fn tiers(self) -> usize {
        match self {
            Topology::Base => 1,
            Topology::Counterblock => 2,
            Topology::Full => 3,
        }
    }

    fn collect<T: Copy>(self, tables: [&[T]; 3]) -> Vec<T> {
        tables[..self.tiers()].iter().flat_map(|t| t.iter().copied()).collect()
    }

    pub fn services(self) -> Vec<&'static str> {
        self.collect([BASE_SERVICES, COUNTERBLOCK_SERVICES, FULL_SERVICES])
    }

    /// Host ports that must be free before install.
    pub fn ports(self) -> Vec<u16> {
        self.collect([BASE_PORTS, COUNTERBLOCK_PORTS, FULL_PORTS])
    }

    pub fn repos(self) -> Vec<SourceRepo> {
        self.collect([BASE_REPOS, COUNTERBLOCK_REPOS, FULL_REPOS])
    }

    pub fn volumes(self) -> Vec<&'static str> {
        self.collect([BASE_VOLUMES, COUNTERBLOCK_VOLUMES, FULL_VOLUMES])
    }

    pub fn has_service(self, name: &str) -> bool {
        self.services().contains(&name)
    }

    pub fn compose_file(self, root: &Path) -> PathBuf {
        root.join(format!("docker-compose.{}.yml", self))
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source checkouts behind a service. `counterparty` is split across two
/// repositories; testnet variants share their mainnet checkout.
pub fn checkouts_for(service: &str) -> &'static [&'static str] {
    match service.trim_end_matches("-testnet") {
        "counterparty" => &["counterparty-lib", "counterparty-cli"],
        "counterblock" | "armory_utxsvr" => &["counterblock"],
        "counterwallet" => &["counterwallet"],
        _ => &[],
    }
}
