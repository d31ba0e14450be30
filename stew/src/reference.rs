//! Parsing of user supplied references.
//!
//! A reference is either a raw `http(s)` URL or a repository shorthand of the
//! form `owner/repo[@tag][#asset]`. Stewfile lines may carry a trailing
//! `?host=H&source=S` query that picks the provider.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Result, StewError};
use crate::lockfile::{PackageData, Source};

/// Parsed user intent for a single install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRequest {
    pub owner: String,
    pub repo: String,
    /// Empty or `latest` selects the most recent release
    pub tag: String,
    /// Empty means auto-detect
    pub asset: String,
    pub download_url: String,
    pub is_repo_reference: bool,
}

impl InstallRequest {
    pub fn wants_latest(&self) -> bool {
        self.tag.is_empty() || self.tag == "latest"
    }
}

impl fmt::Display for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_repo_reference {
            return f.write_str(&self.download_url);
        }
        write!(f, "{}/{}", self.owner, self.repo)?;
        if !self.tag.is_empty() {
            write!(f, "@{}", self.tag)?;
        }
        if !self.asset.is_empty() {
            write!(f, "#{}", self.asset)?;
        }
        Ok(())
    }
}

/// Parse a reference into an [`InstallRequest`].
pub fn parse(reference: &str) -> Result<InstallRequest> {
    let reference = reference.trim();
    let malformed = || StewError::MalformedReference {
        input: reference.to_string(),
    };

    if reference.is_empty() {
        return Err(malformed());
    }

    if reference.starts_with("http") {
        let url = url::Url::parse(reference).map_err(|_| malformed())?;
        let asset = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(malformed)?;
        return Ok(InstallRequest {
            asset: asset.to_string(),
            download_url: reference.to_string(),
            is_repo_reference: false,
            ..Default::default()
        });
    }

    let (repo_part, tag_part) = match reference.split_once('@') {
        Some((repo, rest)) => (repo, Some(rest)),
        None => (reference, None),
    };

    let (repo_part, tag, asset) = match tag_part {
        Some(rest) => match rest.split_once('#') {
            Some((tag, asset)) => (repo_part, tag, asset),
            None => (repo_part, rest, ""),
        },
        // `owner/repo#asset` pins an asset of the latest release
        None => match repo_part.split_once('#') {
            Some((repo, asset)) => (repo, "", asset),
            None => (repo_part, "", ""),
        },
    };

    let (owner, repo) = repo_part.split_once('/').ok_or_else(malformed)?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(malformed());
    }

    Ok(InstallRequest {
        owner: owner.to_string(),
        repo: repo.to_string(),
        tag: tag.to_string(),
        asset: asset.to_string(),
        download_url: String::new(),
        is_repo_reference: true,
    })
}

/// One line of a Stewfile: a reference plus the provider it lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StewfileEntry {
    pub request: InstallRequest,
    pub source: Source,
    pub host: String,
}

impl StewfileEntry {
    /// Parse a single Stewfile line. Repository lines without `source=` are
    /// GitHub.
    pub fn parse(line: &str) -> Result<Self> {
        Self::parse_with_default(line, &|_| Source::Github)
    }

    /// Parse a single Stewfile line, asking `default_source` for the source
    /// of a repository line that names none. It receives the line's host.
    pub fn parse_with_default(
        line: &str,
        default_source: &dyn Fn(&str) -> Source,
    ) -> Result<Self> {
        let line = line.trim();
        let (reference, query) = match line.split_once('?') {
            // A `?` inside a raw URL belongs to the URL itself
            Some((reference, query)) if !reference.starts_with("http") => (reference, Some(query)),
            _ => (line, None),
        };

        let mut host = String::new();
        let mut source = None;
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    StewError::MalformedReference {
                        input: line.to_string(),
                    }
                })?;
                match key {
                    "host" => host = value.to_string(),
                    "source" => {
                        source = Some(value.parse::<Source>().map_err(|_| {
                            StewError::MalformedReference {
                                input: line.to_string(),
                            }
                        })?)
                    }
                    other => tracing::warn!("Ignoring unknown Stewfile option '{}'", other),
                }
            }
        }

        let request = parse(reference)?;
        let source = if request.is_repo_reference {
            source.unwrap_or_else(|| default_source(&host))
        } else {
            Source::Other
        };

        Ok(Self {
            request,
            source,
            host,
        })
    }

    /// Rebuild the entry for a recorded package so it can be reinstalled.
    pub fn from_package(package: &PackageData) -> Result<Self> {
        let request = match package.source {
            Source::Other => parse(&package.url)?,
            _ => InstallRequest {
                owner: package.owner.clone(),
                repo: package.repo.clone(),
                tag: package.tag.clone(),
                asset: package.asset.clone(),
                download_url: String::new(),
                is_repo_reference: true,
            },
        };
        Ok(Self {
            request,
            source: package.source,
            host: package.host.clone(),
        })
    }
}

impl fmt::Display for StewfileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request)?;
        if !self.request.is_repo_reference {
            return Ok(());
        }
        let mut options = Vec::new();
        if !self.host.is_empty() {
            options.push(format!("host={}", self.host));
        }
        if self.source != Source::Github {
            options.push(format!("source={}", self.source));
        }
        if !options.is_empty() {
            write!(f, "?{}", options.join("&"))?;
        }
        Ok(())
    }
}

/// Read every entry of a Stewfile in file order. Blank lines and lines
/// starting with `#` are skipped.
pub fn read_stewfile(
    path: &Path,
    default_source: &dyn Fn(&str) -> Source,
) -> Result<Vec<StewfileEntry>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| StewfileEntry::parse_with_default(line, default_source))
        .collect()
}
