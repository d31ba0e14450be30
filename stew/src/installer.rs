use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::archive;
use crate::config::{Config, Platform, LOCKFILE_NAME};
use crate::error::{Result, StewError};
use crate::http::{Auth, HttpClient};
use crate::lockfile::{self, LockFile, PackageData, Source};
use crate::prompt::Prompter;
use crate::provider::{self, HostProject, HostProvider};
use crate::reference::{self, InstallRequest, StewfileEntry};
use crate::selector;

/// Progress of a single install. Each stage is logged when it is reached;
/// a failure reports the last stage that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Pending,
    Downloaded,
    Extracted,
    Installed,
    Recorded,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Pending => "pending",
            InstallStage::Downloaded => "downloaded",
            InstallStage::Extracted => "extracted",
            InstallStage::Installed => "installed",
            InstallStage::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

/// Builds the provider serving a source on a host
pub trait ProviderFactory: Send + Sync {
    fn provider(&self, source: Source, host: Option<&str>) -> Result<Box<dyn HostProvider>>;
}

/// The public hosting services, reached over the shared HTTP client
pub struct HostedProviders {
    http: HttpClient,
}

impl HostedProviders {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl ProviderFactory for HostedProviders {
    fn provider(&self, source: Source, host: Option<&str>) -> Result<Box<dyn HostProvider>> {
        provider::for_source(source, host, &self.http)
    }
}

/// Everything needed to fetch one artifact, once tag and asset are settled
#[derive(Debug, Clone)]
struct Resolved {
    source: Source,
    owner: String,
    repo: String,
    tag: String,
    asset: String,
    url: String,
    host: String,
    auth: Option<Auth>,
}

pub struct Installer {
    platform: Platform,
    config: Config,
    http: HttpClient,
    providers: Box<dyn ProviderFactory>,
    prompter: Box<dyn Prompter>,
}

impl Installer {
    pub fn new(
        platform: Platform,
        config: Config,
        http: HttpClient,
        prompter: Box<dyn Prompter>,
    ) -> Self {
        Self {
            providers: Box::new(HostedProviders::new(http.clone())),
            platform,
            config,
            http,
            prompter,
        }
    }

    /// Replace the provider factory, e.g. to target a local API server
    pub fn with_providers(mut self, providers: Box<dyn ProviderFactory>) -> Self {
        self.providers = providers;
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Install every input in order. An input is a reference, a Stewfile or a
    /// `Stewfile.lock.json` to replay. The first failure aborts the batch;
    /// packages installed before it stay recorded.
    pub async fn install_inputs(
        &self,
        inputs: &[String],
        host: Option<&str>,
        source: Option<Source>,
    ) -> Result<Vec<PackageData>> {
        let mut installed = Vec::new();
        for input in inputs {
            for entry in self.entries_for(input, host, source)? {
                installed.push(self.install(&entry).await?);
            }
        }
        Ok(installed)
    }

    fn entries_for(
        &self,
        input: &str,
        host: Option<&str>,
        source: Option<Source>,
    ) -> Result<Vec<StewfileEntry>> {
        let path = Path::new(input);
        if input.ends_with(LOCKFILE_NAME) {
            tracing::info!("Replaying {}", input);
            let lock = LockFile::load(path)?;
            return lock
                .packages
                .iter()
                .map(StewfileEntry::from_package)
                .collect();
        }

        let is_stewfile = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("Stewfile"));
        if is_stewfile && path.is_file() {
            tracing::info!("Installing from {}", input);
            return reference::read_stewfile(path, &|host| self.resolve_source(None, host));
        }

        let request = reference::parse(input)?;
        let host = host.unwrap_or_default().to_string();
        let source = if request.is_repo_reference {
            self.resolve_source(source, &host)
        } else {
            Source::Other
        };
        Ok(vec![StewfileEntry {
            request,
            source,
            host,
        }])
    }

    /// Explicit source first, then the configured source for the host, then
    /// GitHub.
    fn resolve_source(&self, source: Option<Source>, host: &str) -> Source {
        source
            .or_else(|| {
                if host.is_empty() {
                    None
                } else {
                    self.config.source_for_host(host)
                }
            })
            .unwrap_or(Source::Github)
    }

    fn provider_for(&self, source: Source, host: &str) -> Result<Box<dyn HostProvider>> {
        let host = Some(host).filter(|h| !h.is_empty());
        self.providers.provider(source, host)
    }

    /// Run the full pipeline for one entry: resolve, download, extract,
    /// install and record.
    pub async fn install(&self, entry: &StewfileEntry) -> Result<PackageData> {
        tracing::info!("Installing {} ({})", entry.request, InstallStage::Pending);
        let resolved = self
            .resolve(entry)
            .await
            .map_err(|e| failed(InstallStage::Pending, e))?;
        self.complete(resolved).await
    }

    async fn resolve(&self, entry: &StewfileEntry) -> Result<Resolved> {
        let request = &entry.request;
        if !request.is_repo_reference {
            return Ok(Resolved {
                source: Source::Other,
                owner: String::new(),
                repo: String::new(),
                tag: String::new(),
                asset: request.asset.clone(),
                url: request.download_url.clone(),
                host: String::new(),
                auth: None,
            });
        }

        let provider = self.provider_for(entry.source, &entry.host)?;
        let project = HostProject::fetch(provider.as_ref(), &request.owner, &request.repo).await?;
        let tag = self.resolve_tag(&project, request)?;
        let names = project.asset_names(&tag)?;
        let asset_name = self.resolve_asset(&names, &request.asset)?;
        let asset = project
            .assets(&tag)?
            .iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| StewError::NoAssetsFound { tag: tag.clone() })?;

        tracing::debug!(
            "Resolved {} on {} {} to {}",
            request,
            provider.source(),
            provider.host(),
            asset.download_url
        );
        Ok(Resolved {
            source: provider.source(),
            owner: project.owner.clone(),
            repo: project.repo.clone(),
            tag,
            asset: asset.name.clone(),
            url: asset.download_url.clone(),
            host: entry.host.clone(),
            auth: provider.auth().cloned(),
        })
    }

    fn resolve_tag(&self, project: &HostProject, request: &InstallRequest) -> Result<String> {
        if request.wants_latest() {
            return project
                .latest_tag()
                .map(str::to_string)
                .ok_or_else(|| StewError::NoReleasesFound {
                    owner: project.owner.clone(),
                    repo: project.repo.clone(),
                });
        }
        let tags = project.tags();
        if tags.contains(&request.tag) {
            return Ok(request.tag.clone());
        }
        self.prompter.warning_select(
            &format!(
                "Could not find a release with the tag {} - please select a release:",
                request.tag
            ),
            &tags,
        )
    }

    fn resolve_asset(&self, names: &[String], requested: &str) -> Result<String> {
        if requested.is_empty() {
            let os = &self.platform.os;
            let arch = &self.platform.arch;
            return match selector::select_asset(names, os, arch) {
                Ok(asset) => Ok(asset),
                Err(StewError::SelectionAmbiguity { matches, .. }) => {
                    tracing::debug!("{} asset(s) matched, asking", matches);
                    self.prompter.warning_select(
                        &format!(
                            "Could not automatically detect the release asset for {os}/{arch} - please select an asset:"
                        ),
                        names,
                    )
                }
                Err(e) => Err(e),
            };
        }
        if names.iter().any(|n| n == requested) {
            return Ok(requested.to_string());
        }
        self.prompter.warning_select(
            &format!("Could not find the asset {requested} - please select an asset:"),
            names,
        )
    }

    /// Download, extract, install and record. Artifacts created here are
    /// removed again when a later stage fails.
    async fn complete(&self, resolved: Resolved) -> Result<PackageData> {
        let platform = &self.platform;
        let asset_name = lockfile::checked_file_name(&resolved.asset)
            .map_err(|e| failed(InstallStage::Pending, e))?;
        let lock = LockFile::load_or_new(&platform.lockfile_path, &platform.os, &platform.arch)
            .map_err(|e| failed(InstallStage::Pending, e))?;
        platform.ensure_dirs()?;

        let asset_path = platform.pkg_dir.join(asset_name);
        self.http
            .download(&resolved.url, &asset_path, resolved.auth.as_ref())
            .await
            .map_err(|e| failed(InstallStage::Pending, e))?;
        tracing::info!(
            "Downloaded {} to {} ({})",
            resolved.asset,
            platform.pkg_dir.display(),
            InstallStage::Downloaded
        );

        let hint = &resolved.repo;
        let extracted = match archive::extract_binary(&asset_path, hint, &platform.tmp_dir) {
            Ok(extracted) => extracted,
            Err(e) => {
                remove_quietly(&asset_path);
                return Err(failed(InstallStage::Downloaded, e));
            }
        };
        tracing::debug!("Found {} ({})", extracted.name(), InstallStage::Extracted);

        let binary = match extracted.install(&platform.bin_dir) {
            Ok(binary) => binary,
            Err(e) => {
                remove_quietly(&asset_path);
                return Err(failed(InstallStage::Extracted, e));
            }
        };

        let package = PackageData {
            source: resolved.source,
            owner: resolved.owner,
            repo: resolved.repo,
            tag: resolved.tag,
            asset: resolved.asset,
            binary,
            url: resolved.url,
            host: resolved.host,
        };

        if let Err(e) = lock
            .with_package(package.clone())
            .save(&platform.lockfile_path)
        {
            if let Err(cleanup) = lockfile::delete_asset_and_binary(
                &platform.pkg_dir,
                &platform.bin_dir,
                &package.asset,
                &package.binary,
            ) {
                tracing::warn!("Cleanup after failed install: {}", cleanup);
            }
            return Err(failed(InstallStage::Installed, e));
        }

        tracing::info!(
            "Successfully installed the {} binary in {} ({})",
            package.binary,
            platform.bin_dir.display(),
            InstallStage::Recorded
        );
        Ok(package)
    }

    /// Pick a tag and an asset of `reference` interactively, then install it.
    pub async fn browse(
        &self,
        reference: &str,
        host: Option<&str>,
        source: Option<Source>,
    ) -> Result<PackageData> {
        let request = reference::parse(reference)?;
        if !request.is_repo_reference {
            return Err(StewError::MalformedReference {
                input: reference.to_string(),
            });
        }
        let host = host.unwrap_or_default();
        let source = self.resolve_source(source, host);
        self.browse_repo(&request.owner, &request.repo, host, source)
            .await
    }

    async fn browse_repo(
        &self,
        owner: &str,
        repo: &str,
        host: &str,
        source: Source,
    ) -> Result<PackageData> {
        let provider = self.provider_for(source, host)?;
        let project = HostProject::fetch(provider.as_ref(), owner, repo).await?;

        let tag = self
            .prompter
            .select("Choose a release tag:", &project.tags())?;
        let names = project.asset_names(&tag)?;
        let asset_name = self
            .prompter
            .select("Download and install an asset", &names)?;
        let asset = project
            .assets(&tag)?
            .iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| StewError::NoAssetsFound { tag: tag.clone() })?;

        let resolved = Resolved {
            source: provider.source(),
            owner: project.owner.clone(),
            repo: project.repo.clone(),
            tag: tag.clone(),
            asset: asset.name.clone(),
            url: asset.download_url.clone(),
            host: host.to_string(),
            auth: provider.auth().cloned(),
        };
        self.complete(resolved).await
    }

    /// Search the provider's repositories, let the user pick one and browse
    /// it.
    pub async fn search(
        &self,
        query: &str,
        host: Option<&str>,
        source: Option<Source>,
    ) -> Result<PackageData> {
        let host = host.unwrap_or_default();
        let source = self.resolve_source(source, host);
        let provider = self.provider_for(source, host)?;

        let candidates = provider.search_repositories(query).await?;
        if candidates.is_empty() {
            return Err(StewError::NoSearchResults {
                query: query.to_string(),
            });
        }

        let lines: Vec<String> = candidates.iter().map(|c| c.display_line()).collect();
        let choice = self.prompter.select("Choose a project:", &lines)?;
        let index = lines
            .iter()
            .position(|l| *l == choice)
            .ok_or_else(|| StewError::Prompt(format!("unknown choice '{choice}'")))?;

        // GitLab projects may live in nested groups
        let full_name = &candidates[index].full_name;
        let (owner, repo) =
            full_name
                .rsplit_once('/')
                .ok_or_else(|| StewError::MalformedReference {
                    input: full_name.clone(),
                })?;
        self.browse_repo(owner, repo, host, source).await
    }

    /// Installed packages grouped by where they came from: `github.com` for
    /// public GitHub, the host name for self-hosted providers and `urls` for
    /// raw downloads.
    pub fn list(&self, with_tags: bool) -> Result<BTreeMap<String, Vec<String>>> {
        let lock = LockFile::load_or_new(
            &self.platform.lockfile_path,
            &self.platform.os,
            &self.platform.arch,
        )?;

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for package in &lock.packages {
            let (group, line) = match package.source {
                Source::Other => ("urls".to_string(), package.url.clone()),
                source => {
                    let group = if package.host.is_empty() && source == Source::Github {
                        "github.com".to_string()
                    } else {
                        package.host.clone()
                    };
                    let mut line = format!("{}/{}", package.owner, package.repo);
                    if with_tags {
                        line = format!("{line}@{}", package.tag);
                    }
                    (group, line)
                }
            };
            groups.entry(group).or_default().push(line);
        }
        Ok(groups)
    }

    /// Remove the packages providing `binaries`, or every package when `all`
    /// is set. Every named binary must be installed before anything is
    /// removed.
    pub fn uninstall(&self, binaries: &[String], all: bool) -> Result<Vec<PackageData>> {
        let platform = &self.platform;
        let lock = LockFile::load_or_new(&platform.lockfile_path, &platform.os, &platform.arch)?;
        if lock.packages.is_empty() {
            return Err(StewError::NoPackagesInLockfile);
        }

        let (removed, remaining) = if all {
            (
                lock.packages.clone(),
                LockFile::new(&lock.os, &lock.arch),
            )
        } else {
            let mut removed = Vec::new();
            let mut remaining = lock;
            for binary in binaries {
                let (matching, rest) = remaining.partition_by_binary(binary);
                if matching.is_empty() {
                    return Err(StewError::PackageNotFound {
                        binary: binary.clone(),
                    });
                }
                removed.extend(matching);
                remaining = rest;
            }
            (removed, remaining)
        };

        for package in &removed {
            lockfile::delete_asset_and_binary(
                &platform.pkg_dir,
                &platform.bin_dir,
                &package.asset,
                &package.binary,
            )?;
            tracing::info!("Uninstalled {}", package.binary);
        }
        remaining.save(&platform.lockfile_path)?;
        Ok(removed)
    }
}

fn failed(stage: InstallStage, err: StewError) -> StewError {
    tracing::error!("Install failed after stage {}: {}", stage, err);
    err
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
