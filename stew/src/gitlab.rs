use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::http::{Auth, HttpClient};
use crate::lockfile::Source;
use crate::provider::{
    env_token, token_env_var, Asset, HostProvider, Release, RepoCandidate, PER_PAGE,
};

#[derive(Debug, Deserialize)]
struct GitLabRelease {
    tag_name: String,
    #[serde(default)]
    assets: GitLabAssets,
}

#[derive(Debug, Default, Deserialize)]
struct GitLabAssets {
    #[serde(default)]
    links: Vec<GitLabLink>,
}

#[derive(Debug, Deserialize)]
struct GitLabLink {
    name: String,
    url: String,
    direct_asset_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    path_with_namespace: String,
    #[serde(default)]
    star_count: u64,
    description: Option<String>,
}

/// Releases on gitlab.com or a self-managed GitLab instance. Only release
/// links are treated as assets; generated source archives are ignored.
pub struct GitLabProvider {
    http: HttpClient,
    base_url: String,
    host: String,
    auth: Option<Auth>,
}

impl GitLabProvider {
    pub fn new(http: HttpClient, host: &str) -> Self {
        Self {
            http,
            base_url: format!("https://{host}"),
            host: host.to_string(),
            auth: env_token(&token_env_var(host)).map(Auth::Bearer),
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

/// `owner/repo` as the URL-encoded project id GitLab expects
fn project_id(owner: &str, repo: &str) -> String {
    format!("{}%2F{}", owner.replace('/', "%2F"), repo)
}

#[async_trait]
impl HostProvider for GitLabProvider {
    fn source(&self) -> Source {
        Source::Gitlab
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let url = format!(
            "{}/api/v4/projects/{}/releases?per_page={PER_PAGE}",
            self.base_url,
            project_id(owner, repo)
        );
        let releases: Vec<GitLabRelease> = self.http.get_json(&url, self.auth()).await?;
        Ok(releases
            .into_iter()
            .map(|r| Release {
                tag_name: r.tag_name,
                assets: r
                    .assets
                    .links
                    .into_iter()
                    .map(|l| Asset {
                        name: l.name,
                        download_url: l.direct_asset_url.unwrap_or(l.url),
                        size: None,
                        content_type: None,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn search_repositories(&self, query: &str) -> Result<Vec<RepoCandidate>> {
        let per_page = PER_PAGE.to_string();
        let url = url::Url::parse_with_params(
            &format!("{}/api/v4/projects", self.base_url),
            &[
                ("search", query),
                ("order_by", "star_count"),
                ("per_page", per_page.as_str()),
            ],
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let projects: Vec<GitLabProject> = self.http.get_json(url.as_str(), self.auth()).await?;
        Ok(projects
            .into_iter()
            .map(|p| RepoCandidate {
                full_name: p.path_with_namespace,
                stars: p.star_count,
                description: p.description.unwrap_or_default(),
            })
            .collect())
    }
}
