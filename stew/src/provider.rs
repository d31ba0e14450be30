//! Provider-agnostic view of hosted releases.
//!
//! Each hosting service decodes its own JSON shape into [`Release`] and
//! [`Asset`]; everything downstream only ever sees these types.

use async_trait::async_trait;

use crate::error::{Result, StewError};
use crate::gitea::GiteaProvider;
use crate::github::GitHubProvider;
use crate::gitlab::GitLabProvider;
use crate::http::{Auth, HttpClient};
use crate::lockfile::Source;

/// Releases are requested one page at a time at this size
pub const PER_PAGE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    pub assets: Vec<Asset>,
}

/// A repository candidate returned by a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCandidate {
    pub full_name: String,
    pub stars: u64,
    pub description: String,
}

impl RepoCandidate {
    /// Single line shown in the search prompt
    pub fn display_line(&self) -> String {
        format!("{} [⭐{}] {}", self.full_name, self.stars, self.description)
            .trim_end()
            .to_string()
    }
}

#[async_trait]
pub trait HostProvider: Send + Sync {
    fn source(&self) -> Source;

    /// Host recorded in the lockfile; empty for the default public host
    fn host(&self) -> &str;

    /// Credential attached to API calls and asset downloads
    fn auth(&self) -> Option<&Auth>;

    /// Releases of `owner/repo`, most recent first
    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>>;

    async fn search_repositories(&self, query: &str) -> Result<Vec<RepoCandidate>>;
}

/// A repository's releases as fetched for one install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProject {
    pub owner: String,
    pub repo: String,
    pub releases: Vec<Release>,
}

impl HostProject {
    /// Fetch every release of `owner/repo`. A repository without releases
    /// is an error.
    pub async fn fetch(provider: &dyn HostProvider, owner: &str, repo: &str) -> Result<Self> {
        let releases = provider.list_releases(owner, repo).await?;
        if releases.is_empty() {
            return Err(StewError::NoReleasesFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
            });
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            releases,
        })
    }

    pub fn tags(&self) -> Vec<String> {
        self.releases.iter().map(|r| r.tag_name.clone()).collect()
    }

    pub fn latest_tag(&self) -> Option<&str> {
        self.releases.first().map(|r| r.tag_name.as_str())
    }

    pub fn release(&self, tag: &str) -> Option<&Release> {
        self.releases.iter().find(|r| r.tag_name == tag)
    }

    /// Assets of the release tagged `tag`; fails when there are none.
    pub fn assets(&self, tag: &str) -> Result<&[Asset]> {
        match self.release(tag) {
            Some(release) if !release.assets.is_empty() => Ok(&release.assets),
            _ => Err(StewError::NoAssetsFound {
                tag: tag.to_string(),
            }),
        }
    }

    pub fn asset_names(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self.assets(tag)?.iter().map(|a| a.name.clone()).collect())
    }
}

/// Environment variable holding the token for a self-hosted `host`,
/// e.g. `GIT_EXAMPLE_COM_TOKEN` for `git.example.com`.
pub fn token_env_var(host: &str) -> String {
    let normalized: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{normalized}_TOKEN")
}

pub(crate) fn env_token(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|t| !t.is_empty())
}

/// Build the provider serving `source` on `host`.
pub fn for_source(
    source: Source,
    host: Option<&str>,
    http: &HttpClient,
) -> Result<Box<dyn HostProvider>> {
    let host = host.filter(|h| !h.is_empty());
    let missing = || StewError::MissingHost {
        provider: source.to_string(),
    };
    let provider: Box<dyn HostProvider> = match source {
        Source::Github => Box::new(GitHubProvider::new(http.clone(), host)),
        Source::Gitlab => Box::new(GitLabProvider::new(
            http.clone(),
            host.ok_or_else(missing)?,
        )),
        Source::Gitea => Box::new(GiteaProvider::new(
            http.clone(),
            host.ok_or_else(missing)?,
        )),
        Source::Other => {
            return Err(StewError::MalformedReference {
                input: "raw URLs have no release provider".to_string(),
            })
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider(Vec<Release>);

    #[async_trait]
    impl HostProvider for StaticProvider {
        fn source(&self) -> Source {
            Source::Github
        }

        fn host(&self) -> &str {
            ""
        }

        fn auth(&self) -> Option<&Auth> {
            None
        }

        async fn list_releases(&self, _owner: &str, _repo: &str) -> Result<Vec<Release>> {
            Ok(self.0.clone())
        }

        async fn search_repositories(&self, _query: &str) -> Result<Vec<RepoCandidate>> {
            Ok(Vec::new())
        }
    }

    fn release(tag: &str, assets: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            assets: assets
                .iter()
                .map(|name| Asset {
                    name: name.to_string(),
                    download_url: format!("https://example.com/{tag}/{name}"),
                    size: None,
                    content_type: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_fetch_project() {
        let provider = StaticProvider(vec![
            release("v2.0.0", &["tool-linux-amd64.tar.gz"]),
            release("v1.0.0", &[]),
        ]);
        let project = HostProject::fetch(&provider, "owner", "tool").await.unwrap();

        assert_eq!(project.latest_tag(), Some("v2.0.0"));
        assert_eq!(project.tags(), vec!["v2.0.0", "v1.0.0"]);
        assert_eq!(
            project.asset_names("v2.0.0").unwrap(),
            vec!["tool-linux-amd64.tar.gz"]
        );
        assert!(matches!(
            project.assets("v1.0.0"),
            Err(StewError::NoAssetsFound { .. })
        ));
        assert!(matches!(
            project.assets("v9.9.9"),
            Err(StewError::NoAssetsFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_project_without_releases() {
        let provider = StaticProvider(Vec::new());
        let err = HostProject::fetch(&provider, "owner", "tool")
            .await
            .unwrap_err();
        assert!(matches!(err, StewError::NoReleasesFound { .. }));
    }

    #[test]
    fn test_token_env_var() {
        assert_eq!(token_env_var("git.example.com"), "GIT_EXAMPLE_COM_TOKEN");
        assert_eq!(token_env_var("gitlab.com"), "GITLAB_COM_TOKEN");
        assert_eq!(token_env_var("my-git.io:8443"), "MY_GIT_IO_8443_TOKEN");
    }

    #[test]
    fn test_for_source_requires_host() {
        let http = HttpClient::new(None).unwrap();
        assert!(matches!(
            for_source(Source::Gitea, None, &http),
            Err(StewError::MissingHost { .. })
        ));
        assert!(matches!(
            for_source(Source::Gitlab, Some(""), &http),
            Err(StewError::MissingHost { .. })
        ));
        let provider = for_source(Source::Gitea, Some("gitea.com"), &http).unwrap();
        assert_eq!(provider.source(), Source::Gitea);
        assert_eq!(provider.host(), "gitea.com");
        assert_eq!(
            for_source(Source::Github, None, &http).unwrap().source(),
            Source::Github
        );
    }

    #[test]
    fn test_display_line() {
        let candidate = RepoCandidate {
            full_name: "junegunn/fzf".to_string(),
            stars: 60000,
            description: "A command-line fuzzy finder".to_string(),
        };
        assert_eq!(
            candidate.display_line(),
            "junegunn/fzf [⭐60000] A command-line fuzzy finder"
        );
    }
}
