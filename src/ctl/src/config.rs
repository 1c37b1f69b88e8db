use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CtlError;

const CONFIG_FILE: &str = ".branchrc";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_BASE_PORT: u16 = 8080;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Contents of ~/.branchrc, every field optional.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    pub host: Option<String>,
    pub base_port: Option<u16>,
    pub connect_timeout_ms: Option<u64>,
    /// Bound on waiting for a response, 0 = wait forever
    pub request_timeout_ms: Option<u64>,
}

impl Config {
    /// Get the path to the config file (~/.branchrc)
    pub fn path() -> io::Result<PathBuf> {
        dirs::home_dir()
            .map(|h| h.join(CONFIG_FILE))
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Could not find home directory"))
    }

    /// Load config from ~/.branchrc, or defaults if there is none
    pub fn load() -> Result<Self, CtlError> {
        match Self::path() {
            Ok(path) => Self::load_from(&path),
            Err(_) => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, CtlError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CtlError::Config(e.to_string()))
    }

    /// Layer `BRANCH_HOST` / `BRANCH_BASE_PORT` over the file values.
    pub fn resolve(self) -> Result<Target, CtlError> {
        self.resolve_with(std::env::var("BRANCH_HOST").ok(), std::env::var("BRANCH_BASE_PORT").ok())
    }

    fn resolve_with(self, host: Option<String>, base_port: Option<String>) -> Result<Target, CtlError> {
        let base_port = match base_port {
            Some(raw) => raw
                .parse()
                .map_err(|e| CtlError::Config(format!("invalid port number '{}': {}", raw, e)))?,
            None => self.base_port.unwrap_or(DEFAULT_BASE_PORT),
        };

        Ok(Target {
            host: host.or(self.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            base_port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS)),
            request_timeout: match self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS) {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        })
    }
}

/// Where the branches listen. Branch `id` is at `base_port + id - 1`.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub base_port: u16,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
}

impl Target {
    pub fn addr_for(&self, branch: u32) -> Result<String, CtlError> {
        let port = branch
            .checked_sub(1)
            .and_then(|offset| u16::try_from(offset).ok())
            .and_then(|offset| offset.checked_add(self.base_port))
            .ok_or(CtlError::UnknownBranch(branch))?;
        Ok(format!("{}:{}", self.host, port))
    }
}
