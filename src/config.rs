use std::env;

pub const DEFAULT_SSH_HOST: &str = "119.195.211.150";
pub const DEFAULT_SSH_PORT: u16 = 7001;
pub const DEFAULT_SSH_USER: &str = "mincoding";
pub const DEFAULT_LOCAL_PORT: u16 = 11435;
pub const DEFAULT_REMOTE_PORT: u16 = 11434;

/// Entrypoint configuration, sourced from environment variables.
///
/// Every setting has a default, so the entrypoint also runs with an empty
/// environment. `USE_SSH_TUNNEL=true` is the only value that enables
/// tunneling.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tunnel_enabled: bool,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub ssh_key_path: Option<String>,
    pub github_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Config {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any string-to-string lookup. The process
    /// environment is one such lookup; tests supply a map.
    pub fn from_lookup<F>(get: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            tunnel_enabled: get("USE_SSH_TUNNEL").as_deref() == Some("true"),
            ssh_host: get("SSH_HOST").unwrap_or_else(|| DEFAULT_SSH_HOST.to_string()),
            ssh_port: port_or(get("SSH_PORT"), DEFAULT_SSH_PORT),
            ssh_user: get("SSH_USER").unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            local_port: port_or(get("SSH_LOCAL_PORT"), DEFAULT_LOCAL_PORT),
            remote_port: port_or(get("SSH_REMOTE_PORT"), DEFAULT_REMOTE_PORT),
            ssh_key_path: get("SSH_KEY_PATH").filter(|s| !s.is_empty()),
            github_token: get("GITHUB_TOKEN").filter(|s| !s.is_empty()),
        }
    }
}

// Unparseable values fall back to the default; every setting has one.
fn port_or(value: Option<String>, default: u16) -> u16 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
