use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::http::{Auth, HttpClient};
use crate::lockfile::Source;
use crate::provider::{
    env_token, token_env_var, Asset, HostProvider, Release, RepoCandidate, PER_PAGE,
};

#[derive(Debug, Deserialize)]
struct GiteaRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GiteaAsset>,
}

#[derive(Debug, Deserialize)]
struct GiteaAsset {
    name: String,
    browser_download_url: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GiteaSearch {
    #[serde(default)]
    data: Vec<GiteaRepo>,
}

#[derive(Debug, Deserialize)]
struct GiteaRepo {
    full_name: String,
    #[serde(default)]
    stars_count: u64,
    #[serde(default)]
    description: String,
}

/// Releases on a self-hosted Gitea (or Forgejo) instance
pub struct GiteaProvider {
    http: HttpClient,
    base_url: String,
    host: String,
    auth: Option<Auth>,
}

impl GiteaProvider {
    pub fn new(http: HttpClient, host: &str) -> Self {
        Self {
            http,
            base_url: format!("https://{host}"),
            host: host.to_string(),
            auth: env_token(&token_env_var(host)).map(Auth::Token),
        }
    }

    pub fn with_base_url(http: HttpClient, host: &str, base_url: &str, auth: Option<Auth>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            host: host.to_string(),
            auth,
        }
    }
}

#[async_trait]
impl HostProvider for GiteaProvider {
    fn source(&self) -> Source {
        Source::Gitea
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let url = format!(
            "{}/api/v1/repos/{owner}/{repo}/releases?per_page={PER_PAGE}",
            self.base_url
        );
        let releases: Vec<GiteaRelease> = self.http.get_json(&url, self.auth()).await?;
        Ok(releases
            .into_iter()
            .map(|r| Release {
                tag_name: r.tag_name,
                assets: r
                    .assets
                    .into_iter()
                    .map(|a| Asset {
                        name: a.name,
                        download_url: a.browser_download_url,
                        size: a.size,
                        content_type: None,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn search_repositories(&self, query: &str) -> Result<Vec<RepoCandidate>> {
        let per_page = PER_PAGE.to_string();
        let url = url::Url::parse_with_params(
            &format!("{}/api/v1/repos/search", self.base_url),
            &[("q", query), ("limit", per_page.as_str())],
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let search: GiteaSearch = self.http.get_json(url.as_str(), self.auth()).await?;
        Ok(search
            .data
            .into_iter()
            .map(|r| RepoCandidate {
                full_name: r.full_name,
                stars: r.stars_count,
                description: r.description,
            })
            .collect())
    }
}
