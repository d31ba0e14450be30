use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Component, Path};
use std::str::FromStr;

use crate::error::{Result, StewError};

/// Where an installed package came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Github,
    Gitlab,
    Gitea,
    Other,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Github => "github",
            Source::Gitlab => "gitlab",
            Source::Gitea => "gitea",
            Source::Other => "other",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Source::Github),
            "gitlab" => Ok(Source::Gitlab),
            "gitea" => Ok(Source::Gitea),
            "other" => Ok(Source::Other),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

/// One installed binary as recorded in the lockfile. Field order is the
/// serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageData {
    pub source: Source,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub binary: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub packages: Vec<PackageData>,
}

impl LockFile {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            packages: Vec::new(),
        }
    }

    /// Read the lockfile at `path`, or start a fresh one stamped with the
    /// given machine profile when the file does not exist yet.
    pub fn load_or_new(path: &Path, os: &str, arch: &str) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No lockfile at {}, starting a new one", path.display());
            return Ok(Self::new(os, arch));
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| StewError::Lockfile {
            path: path.display().to_string(),
            source,
        })
    }

    /// Returns a new lockfile with `package` appended. Earlier records for the
    /// same binary are kept.
    pub fn with_package(&self, package: PackageData) -> Self {
        let mut next = self.clone();
        next.packages.push(package);
        next
    }

    /// Split the records into those providing `binary` and the rest.
    pub fn partition_by_binary(&self, binary: &str) -> (Vec<PackageData>, Self) {
        let (matching, kept): (Vec<_>, Vec<_>) = self
            .packages
            .iter()
            .cloned()
            .partition(|p| p.binary == binary);
        (
            matching,
            Self {
                os: self.os.clone(),
                arch: self.arch.clone(),
                packages: kept,
            },
        )
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).map_err(|e| StewError::Io(e.into()))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Rewrite the whole lockfile. The document is written to a sibling
    /// temporary file first and renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let bytes = self.to_json()?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| StewError::Io(e.error))?;

        tracing::info!("Updated {}", path.display());
        Ok(())
    }
}

/// Check that `name` can be joined onto a directory without leaving it.
/// Asset and binary names come from release metadata and the lockfile.
pub fn checked_file_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(StewError::UnsafeFileName {
            name: name.to_string(),
        }),
    }
}

/// Remove a downloaded asset from the package directory and the binary from
/// the bin directory. Missing files are not an error.
pub fn delete_asset_and_binary(
    pkg_dir: &Path,
    bin_dir: &Path,
    asset: &str,
    binary: &str,
) -> Result<()> {
    for (dir, name) in [(pkg_dir, asset), (bin_dir, binary)] {
        if name.is_empty() {
            continue;
        }
        let path = dir.join(checked_file_name(name)?);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
