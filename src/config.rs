use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC key for session tokens.
    pub secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_allow_anonymous")]
    pub allow_anonymous: bool,
}

fn default_token_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}
fn default_allow_anonymous() -> bool {
    true
}

impl Config {
    /// Configuration used when no file is available (tests, `token issue`
    /// against an ephemeral secret).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/threadkeep.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:7341".to_string(),
                max_body_bytes: default_max_body_bytes(),
            },
            auth: AuthConfig {
                secret: "threadkeep-dev-secret".to_string(),
                token_ttl_secs: default_token_ttl_secs(),
                allow_anonymous: default_allow_anonymous(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.auth.secret.trim().is_empty() {
        anyhow::bail!("auth.secret must not be empty");
    }

    if config.auth.token_ttl_secs == 0 {
        anyhow::bail!("auth.token_ttl_secs must be > 0");
    }

    if config.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[db]
path = "/tmp/tk.sqlite"

[server]
bind = "127.0.0.1:9000"

[auth]
secret = "s3cret"
"#;

    #[test]
    fn test_defaults_applied() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.server.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.auth.token_ttl_secs, 2_592_000);
        assert!(cfg.auth.allow_anonymous);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let content = BASE.replace("s3cret", "  ");
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("auth.secret"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let content = format!("{}token_ttl_secs = 0\n", BASE);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_missing_auth_section_rejected() {
        let content = "[db]\npath = \"x\"\n\n[server]\nbind = \"127.0.0.1:1\"\n";
        assert!(parse_config(content).is_err());
    }
}
