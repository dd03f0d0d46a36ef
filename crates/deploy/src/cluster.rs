//! Cluster identification: well-known environments, endpoint classification and overrides.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

/// Well-known Solana environment tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentTag {
    Localnet,
    Devnet,
    Testnet,
    MainnetBeta,
    /// An endpoint that matches none of the well-known networks.
    Custom,
}

impl EnvironmentTag {
    /// Parse a well-known tag. `custom` is not a tag one can ask for, so it never parses.
    pub fn parse_known(name: &str) -> Option<Self> {
        match name {
            "localnet" => Some(Self::Localnet),
            "devnet" => Some(Self::Devnet),
            "testnet" => Some(Self::Testnet),
            "mainnet-beta" | "mainnet" => Some(Self::MainnetBeta),
            _ => None,
        }
    }

    /// The static descriptor of this environment, if it is a well-known one.
    pub fn descriptor(&self) -> Option<&'static EnvironmentDescriptor> {
        ENVIRONMENTS.iter().find(|env| env.tag == *self)
    }
}

/// Static description of a well-known environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub tag: EnvironmentTag,
    pub display_name: &'static str,
    pub url: &'static str,
    pub description: &'static str,
    /// Whether actions on this network spend real funds.
    pub requires_funds: bool,
}

/// The well-known environments, in menu order.
pub const ENVIRONMENTS: [EnvironmentDescriptor; 4] = [
    EnvironmentDescriptor {
        tag: EnvironmentTag::Localnet,
        display_name: "Localnet",
        url: "http://localhost:8899",
        description: "Local test validator, no real funds needed",
        requires_funds: false,
    },
    EnvironmentDescriptor {
        tag: EnvironmentTag::Devnet,
        display_name: "Devnet",
        url: "https://api.devnet.solana.com",
        description: "Development network, test tokens available from the faucet",
        requires_funds: false,
    },
    EnvironmentDescriptor {
        tag: EnvironmentTag::Testnet,
        display_name: "Testnet",
        url: "https://api.testnet.solana.com",
        description: "Test network with performance close to mainnet",
        requires_funds: false,
    },
    EnvironmentDescriptor {
        tag: EnvironmentTag::MainnetBeta,
        display_name: "Mainnet",
        url: "https://api.mainnet-beta.solana.com",
        description: "Production network, requires real SOL",
        requires_funds: true,
    },
];

/// The cluster the Solana CLI currently points at.
///
/// Recomputed from tool state on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub name: EnvironmentTag,
    pub url: String,
    pub is_local: bool,
}

impl ClusterInfo {
    /// Classify an endpoint URL.
    ///
    /// Precedence is loopback host, then substring matches on `devnet`, `testnet`
    /// and `mainnet`, then custom.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let is_local = is_loopback(&url);

        let name = if is_local {
            EnvironmentTag::Localnet
        } else if url.contains("devnet") {
            EnvironmentTag::Devnet
        } else if url.contains("testnet") {
            EnvironmentTag::Testnet
        } else if url.contains("mainnet") {
            EnvironmentTag::MainnetBeta
        } else {
            EnvironmentTag::Custom
        };

        Self {
            name,
            url,
            is_local,
        }
    }
}

/// Whether an endpoint points at the local machine.
fn is_loopback(endpoint: &str) -> bool {
    let parsed = Url::parse(endpoint).ok();
    match parsed.as_ref().and_then(Url::host) {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        // Bare `host:port` strings have no URL host.
        None => endpoint.contains("localhost") || endpoint.contains("127.0.0.1"),
    }
}

/// The environment an operator asked for: a well-known tag or a literal endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEnvironment {
    Known(EnvironmentTag),
    Endpoint(String),
}

impl TargetEnvironment {
    /// Interpret an override value. Anything that is not a well-known tag is an endpoint.
    pub fn parse(value: &str) -> Self {
        match EnvironmentTag::parse_known(value) {
            Some(tag) => Self::Known(tag),
            None => Self::Endpoint(value.to_string()),
        }
    }

    /// The RPC URL to configure for this target.
    pub fn url(&self) -> String {
        match self {
            Self::Known(tag) => tag
                .descriptor()
                .map(|env| env.url.to_string())
                .unwrap_or_else(|| tag.to_string()),
            Self::Endpoint(url) => url.clone(),
        }
    }

    /// Whether the cluster already satisfies this target.
    ///
    /// Tags compare by classification, literal endpoints by exact URL.
    pub fn matches(&self, cluster: &ClusterInfo) -> bool {
        match self {
            Self::Known(tag) => cluster.name == *tag,
            Self::Endpoint(url) => cluster.url == *url,
        }
    }

    /// Whether this target is the production network.
    pub fn requires_funds(&self) -> bool {
        match self {
            Self::Known(tag) => tag.descriptor().is_some_and(|env| env.requires_funds),
            Self::Endpoint(_) => false,
        }
    }
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(tag) => write!(f, "{tag}"),
            Self::Endpoint(url) => write!(f, "{url}"),
        }
    }
}

/// Map an environment name to its RPC URL. Unknown names are returned unchanged.
pub fn url_for_environment(name: &str) -> String {
    TargetEnvironment::parse(name).url()
}

/// Extract the value of the `RPC URL:` line from a `solana config get` report.
pub fn parse_rpc_url(report: &str) -> Option<String> {
    report
        .lines()
        .find_map(|line| line.split_once("RPC URL:"))
        .map(|(_, url)| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_GET: &str = "Config File: /home/dev/.config/solana/cli/config.yml\n\
        RPC URL: https://api.devnet.solana.com \n\
        WebSocket URL: wss://api.devnet.solana.com/ (computed)\n\
        Keypair Path: /home/dev/.config/solana/id.json\n\
        Commitment: confirmed\n";

    #[test]
    fn test_url_for_known_environments() {
        assert_eq!(url_for_environment("localnet"), "http://localhost:8899");
        assert_eq!(url_for_environment("devnet"), "https://api.devnet.solana.com");
        assert_eq!(url_for_environment("testnet"), "https://api.testnet.solana.com");
        assert_eq!(
            url_for_environment("mainnet-beta"),
            "https://api.mainnet-beta.solana.com"
        );
    }

    #[test]
    fn test_url_for_unknown_is_identity() {
        for value in ["https://rpc.example.org", "custom", "", "Devnet", "http://10.0.0.4:8899"] {
            assert_eq!(url_for_environment(value), value);
        }
    }

    #[test]
    fn test_classify_loopback_hosts() {
        for url in [
            "http://localhost:8899",
            "http://127.0.0.1:8899",
            "http://[::1]:8899",
            "127.0.0.1:8899",
            "localhost:8899",
        ] {
            let cluster = ClusterInfo::from_url(url);
            assert_eq!(cluster.name, EnvironmentTag::Localnet, "{url}");
            assert!(cluster.is_local, "{url}");
        }
    }

    #[test]
    fn test_classify_is_substring_based() {
        let cluster = ClusterInfo::from_url("https://solana-devnet.g.alchemy.com/v2/key");
        assert_eq!(cluster.name, EnvironmentTag::Devnet);
        assert!(!cluster.is_local);

        // devnet wins over testnet and mainnet regardless of position.
        let cluster = ClusterInfo::from_url("https://mainnet-testnet-devnet.example.com");
        assert_eq!(cluster.name, EnvironmentTag::Devnet);

        let cluster = ClusterInfo::from_url("https://testnet.mainnet.example.com");
        assert_eq!(cluster.name, EnvironmentTag::Testnet);

        let cluster = ClusterInfo::from_url("https://api.mainnet-beta.solana.com");
        assert_eq!(cluster.name, EnvironmentTag::MainnetBeta);
    }

    #[test]
    fn test_classify_loopback_beats_network_names() {
        let cluster = ClusterInfo::from_url("http://localhost:8899/devnet");
        assert_eq!(cluster.name, EnvironmentTag::Localnet);
    }

    #[test]
    fn test_classify_custom() {
        let cluster = ClusterInfo::from_url("https://rpc.helius.xyz/?api-key=abc");
        assert_eq!(cluster.name, EnvironmentTag::Custom);
        assert!(!cluster.is_local);
    }

    #[test]
    fn test_parse_rpc_url() {
        assert_eq!(
            parse_rpc_url(CONFIG_GET).as_deref(),
            Some("https://api.devnet.solana.com")
        );
        assert_eq!(parse_rpc_url("Keypair Path: id.json\n"), None);
        assert_eq!(parse_rpc_url("RPC URL:   \n"), None);
    }

    #[test]
    fn test_target_parse_and_match() {
        let target = TargetEnvironment::parse("mainnet");
        assert_eq!(target, TargetEnvironment::Known(EnvironmentTag::MainnetBeta));
        assert!(target.requires_funds());

        let target = TargetEnvironment::parse("custom");
        assert_eq!(target, TargetEnvironment::Endpoint("custom".to_string()));

        let devnet = ClusterInfo::from_url("https://api.devnet.solana.com");
        assert!(TargetEnvironment::parse("devnet").matches(&devnet));
        assert!(!TargetEnvironment::parse("testnet").matches(&devnet));
        assert!(TargetEnvironment::parse("https://api.devnet.solana.com").matches(&devnet));
        assert!(!TargetEnvironment::parse("https://rpc.example.org").matches(&devnet));
    }

    #[test]
    fn test_only_mainnet_requires_funds() {
        let funded: Vec<_> = ENVIRONMENTS
            .iter()
            .filter(|env| env.requires_funds)
            .map(|env| env.tag)
            .collect();
        assert_eq!(funded, vec![EnvironmentTag::MainnetBeta]);
    }
}
