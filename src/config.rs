use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context;
use twelf::{Layer, config};

const DEFAULT_CONFIG_FILE: &str = "book-dl-client.yaml";
const ENV_PREFIX: &str = "BOOK_DL_";

#[config]
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the book-download service, e.g. `http://nas.local:8084`
    #[serde(default)]
    pub service_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Seconds between background status refreshes. 0 disables polling.
    #[serde(default = "default_status_poll_secs")]
    pub status_poll_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_status_poll_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Config {
    /// YAML file (if present) first, then `BOOK_DL_*` environment variables on top.
    pub fn load() -> anyhow::Result<Self> {
        let file = std::env::var("BOOK_DL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&file)
    }

    pub fn load_from(file: &Path) -> anyhow::Result<Self> {
        let mut layers = Vec::with_capacity(2);
        if file.exists() {
            layers.push(Layer::Yaml(file.to_path_buf()));
        }
        layers.push(Layer::Env(Some(ENV_PREFIX.to_string())));
        Config::with_layers(&layers)
            .with_context(|| format!("Failed to load configuration (file: {})", file.display()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.service_url.trim().is_empty() {
            return Err("BOOK_DL_SERVICE_URL is missing".into());
        }
        match reqwest::Url::parse(&self.service_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(format!(
                    "BOOK_DL_SERVICE_URL must be http or https, got {}",
                    url.scheme()
                ));
            }
            Err(e) => return Err(format!("BOOK_DL_SERVICE_URL is invalid: {}", e)),
        }
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(format!("BOOK_DL_BIND_ADDR is invalid: {}", self.bind_addr));
        }
        Ok(())
    }
}
