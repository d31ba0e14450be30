use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::http::{Auth, HttpClient};
use crate::lockfile::Source;
use crate::provider::{
    env_token, token_env_var, Asset, HostProvider, Release, RepoCandidate, PER_PAGE,
};

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_HOST: &str = "github.com";

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    size: Option<u64>,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubSearch {
    #[serde(default)]
    items: Vec<GitHubRepo>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    #[serde(default)]
    stargazers_count: u64,
    description: Option<String>,
}

impl From<GitHubRelease> for Release {
    fn from(release: GitHubRelease) -> Self {
        Release {
            tag_name: release.tag_name,
            assets: release
                .assets
                .into_iter()
                .map(|a| Asset {
                    name: a.name,
                    download_url: a.browser_download_url,
                    size: a.size,
                    content_type: a.content_type,
                })
                .collect(),
        }
    }
}

/// Releases on github.com or a GitHub Enterprise host
pub struct GitHubProvider {
    http: HttpClient,
    api_base: String,
    host: String,
    auth: Option<Auth>,
}

impl GitHubProvider {
    pub fn new(http: HttpClient, host: Option<&str>) -> Self {
        match host.filter(|h| *h != GITHUB_HOST) {
            None => Self {
                http,
                api_base: GITHUB_API.to_string(),
                host: host.unwrap_or_default().to_string(),
                auth: env_token("GITHUB_TOKEN").map(Auth::Token),
            },
            Some(enterprise) => Self {
                http,
                api_base: format!("https://{enterprise}/api/v3"),
                host: enterprise.to_string(),
                auth: env_token(&token_env_var(enterprise)).map(Auth::Token),
            },
        }
    }

    /// Point the provider at an arbitrary API root
    pub fn with_base_url(http: HttpClient, api_base: &str, auth: Option<Auth>) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            host: String::new(),
            auth,
        }
    }
}

#[async_trait]
impl HostProvider for GitHubProvider {
    fn source(&self) -> Source {
        Source::Github
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases?per_page={PER_PAGE}",
            self.api_base
        );
        let releases: Vec<GitHubRelease> = self.http.get_json(&url, self.auth()).await?;
        tracing::debug!("{}/{} has {} release(s)", owner, repo, releases.len());
        Ok(releases.into_iter().map(Release::from).collect())
    }

    async fn search_repositories(&self, query: &str) -> Result<Vec<RepoCandidate>> {
        let per_page = PER_PAGE.to_string();
        let url = url::Url::parse_with_params(
            &format!("{}/search/repositories", self.api_base),
            &[("q", query), ("per_page", per_page.as_str())],
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let search: GitHubSearch = self.http.get_json(url.as_str(), self.auth()).await?;
        Ok(search
            .items
            .into_iter()
            .map(|r| RepoCandidate {
                full_name: r.full_name,
                stars: r.stargazers_count,
                description: r.description.unwrap_or_default(),
            })
            .collect())
    }
}
