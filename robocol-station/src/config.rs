//! Load config from file and environment.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;

/// Station configuration. File: ~/.config/robocol/config.toml or
/// /etc/robocol/config.toml. Env overrides: ROBOCOL_PORT, ROBOCOL_PEERS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP port, both local bind and remote destination (default 20884).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Candidate robot controller addresses probed during discovery.
    #[serde(default = "default_peers")]
    pub peers: Vec<String>,
}

fn default_port() -> u16 {
    robocol_core::ROBOCOL_PORT
}

fn default_peers() -> Vec<String> {
    vec!["192.168.49.1".to_string(), "192.168.43.1".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            peers: default_peers(),
        }
    }
}

impl Config {
    /// Candidate addresses as socket addresses on the configured port.
    /// Entries that fail to parse as an IP address are skipped.
    pub fn candidate_addrs(&self) -> Vec<SocketAddr> {
        self.peers
            .iter()
            .filter_map(|p| p.parse::<IpAddr>().ok())
            .map(|ip| SocketAddr::new(ip, self.port))
            .collect()
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("ROBOCOL_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.port = p;
        }
    }
    if let Ok(s) = std::env::var("ROBOCOL_PEERS") {
        let peers: Vec<String> = s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if !peers.is_empty() {
            c.peers = peers;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/robocol/config.toml"));
    }
    out.push(PathBuf::from("/etc/robocol/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
