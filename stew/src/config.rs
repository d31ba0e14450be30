use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StewError};
use crate::lockfile::Source;

pub const LOCKFILE_NAME: &str = "Stewfile.lock.json";

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default)]
    pub host: HashMap<String, HostConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultConfig {
    #[serde(default = "default_stew_path")]
    pub stew_path: String,

    #[serde(default = "default_bin_path")]
    pub bin_path: String,

    #[serde(default = "default_lockfile")]
    pub lockfile: String,

    /// Request timeout in seconds. Unset leaves the transport default.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            stew_path: default_stew_path(),
            bin_path: default_bin_path(),
            lockfile: default_lockfile(),
            timeout: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct HostConfig {
    pub source: Option<Source>,
}

fn default_stew_path() -> String {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("stew").display().to_string())
        .unwrap_or_else(|| "~/.local/share/stew".to_string())
}

fn default_bin_path() -> String {
    "~/.local/bin".to_string()
}

fn default_lockfile() -> String {
    directories::BaseDirs::new()
        .map(|dirs| {
            dirs.config_dir()
                .join("stew")
                .join(LOCKFILE_NAME)
                .display()
                .to_string()
        })
        .unwrap_or_else(|| format!("~/.config/stew/{LOCKFILE_NAME}"))
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StewError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("stew").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/stew/config.toml"))
    }

    /// Source configured for a self-hosted host, if any
    pub fn source_for_host(&self, host: &str) -> Option<Source> {
        self.host.get(host).and_then(|h| h.source)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with('~') {
        if let Some(home) = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
        {
            let rest = path.strip_prefix('~').unwrap_or(path);
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Machine profile and managed directories, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub bin_dir: PathBuf,
    pub pkg_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub lockfile_path: PathBuf,
}

impl Platform {
    pub fn from_config(config: &Config) -> Self {
        let stew_path = expand_home(&config.default.stew_path);
        Self {
            os: detect_os().to_string(),
            arch: detect_arch().to_string(),
            bin_dir: expand_home(&config.default.bin_path),
            pkg_dir: stew_path.join("pkg"),
            tmp_dir: stew_path.join("tmp"),
            lockfile_path: expand_home(&config.default.lockfile),
        }
    }

    /// Lay out every managed directory under `root`. Used by tests and by
    /// callers that want a self-contained installation.
    pub fn rooted_at(root: &Path, os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            bin_dir: root.join("bin"),
            pkg_dir: root.join("pkg"),
            tmp_dir: root.join("tmp"),
            lockfile_path: root.join(LOCKFILE_NAME),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.bin_dir, &self.pkg_dir, &self.tmp_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// OS name in the form recorded in lockfiles
pub fn detect_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Architecture name in the form recorded in lockfiles
pub fn detect_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}
