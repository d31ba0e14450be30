use futures_util::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, StewError};

/// Authorization scheme a provider expects its token in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: token <value>` (GitHub, Gitea)
    Token(String),
    /// `Authorization: Bearer <value>` (GitLab)
    Bearer(String),
}

impl Auth {
    fn header_value(&self) -> Result<HeaderValue> {
        let raw = match self {
            Auth::Token(t) => format!("token {t}"),
            Auth::Bearer(t) => format!("Bearer {t}"),
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|e| {
            StewError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Shared HTTP client for API calls and downloads. Only GET requests are
/// ever issued.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder =
            Client::builder().user_agent(concat!("stew/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    async fn get(&self, url: &str, auth: Option<&Auth>) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/octet-stream"));
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION, auth.header_value()?);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            tracing::debug!("GET {} returned {}", url, response.status());
            return Err(StewError::NonSuccessStatus {
                code: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// GET `url` and decode the body as JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: Option<&Auth>,
    ) -> Result<T> {
        tracing::debug!("Fetching {}", url);
        let body = self.get(url, auth).await?.text().await?;
        serde_json::from_str(&body).map_err(|source| StewError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Stream the body of `url` into `dest`. On any failure the destination
    /// file is removed.
    pub async fn download(&self, url: &str, dest: &Path, auth: Option<&Auth>) -> Result<()> {
        tracing::info!("Downloading {}", url);

        let result = self.download_inner(url, dest, auth).await;
        if result.is_err() && dest.exists() {
            if let Err(e) = fs::remove_file(dest) {
                tracing::warn!("Failed to remove partial download {}: {}", dest.display(), e);
            }
        }
        result
    }

    async fn download_inner(&self, url: &str, dest: &Path, auth: Option<&Auth>) -> Result<()> {
        let response = self.get(url, auth).await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(dest)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?)?;
        }
        file.flush()?;

        tracing::debug!("Wrote {}", dest.display());
        Ok(())
    }
}
