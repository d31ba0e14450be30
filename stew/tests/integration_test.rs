//! End-to-end install tests against a local release server.
//!
//! Every test runs the real pipeline (resolve, download, extract, install and
//! record) with provider APIs and downloads served by wiremock.

use std::fs;
use std::io::Write;
use std::sync::Mutex;

use stew::config::{Config, Platform};
use stew::error::{Result, StewError};
use stew::github::GitHubProvider;
use stew::http::HttpClient;
use stew::installer::{Installer, ProviderFactory};
use stew::lockfile::{LockFile, PackageData, Source};
use stew::prompt::Prompter;
use stew::provider::HostProvider;
use stew::reference::StewfileEntry;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ASSET: &str = "tool-linux-amd64.tar.gz";

struct LocalGitHub {
    base_url: String,
}

impl ProviderFactory for LocalGitHub {
    fn provider(&self, _source: Source, _host: Option<&str>) -> Result<Box<dyn HostProvider>> {
        Ok(Box::new(GitHubProvider::with_base_url(
            HttpClient::new(None)?,
            &self.base_url,
            None,
        )))
    }
}

/// Fails the test on any prompt unless an answer was queued
struct ScriptedPrompter(Mutex<Vec<String>>);

impl Prompter for ScriptedPrompter {
    fn select(&self, label: &str, _options: &[String]) -> Result<String> {
        self.0
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| StewError::Prompt(format!("unexpected prompt '{label}'")))
    }
}

fn tool_archive(contents: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    builder
        .append_data(&mut header, "tool-1.0.0/tool", contents)
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

async fn release_server() -> MockServer {
    let server = MockServer::start().await;
    let release = |tag: &str| {
        serde_json::json!({
            "tag_name": tag,
            "assets": [
                {
                    "name": ASSET,
                    "browser_download_url": format!("{}/dl/{}/{}", server.uri(), tag, ASSET),
                },
                {
                    "name": "tool-darwin-arm64.tar.gz",
                    "browser_download_url": format!("{}/dl/{}/darwin", server.uri(), tag),
                },
                {
                    "name": "checksums.txt",
                    "browser_download_url": format!("{}/dl/{}/checksums.txt", server.uri(), tag),
                }
            ]
        })
    };
    Mock::given(method("GET"))
        .and(path("/repos/owner/tool/releases"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([release("v1.1.0"), release("v1.0.0")])),
        )
        .mount(&server)
        .await;
    for tag in ["v1.1.0", "v1.0.0"] {
        Mock::given(method("GET"))
            .and(path(format!("/dl/{tag}/{ASSET}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tool_archive(tag.as_bytes())))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/raw/other-tool"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"#!/bin/sh\n".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/missing-tool"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn installer(root: &TempDir, server: &MockServer) -> Installer {
    Installer::new(
        Platform::rooted_at(root.path(), "linux", "amd64"),
        Config::default(),
        HttpClient::new(None).unwrap(),
        Box::new(ScriptedPrompter(Mutex::new(Vec::new()))),
    )
    .with_providers(Box::new(LocalGitHub {
        base_url: server.uri(),
    }))
}

fn entry(line: &str) -> StewfileEntry {
    StewfileEntry::parse(line).unwrap()
}

fn recorded(platform: &Platform) -> Vec<PackageData> {
    LockFile::load(&platform.lockfile_path).unwrap().packages
}

#[tokio::test]
async fn test_install_latest_from_github() {
    let server = release_server().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&root, &server);

    let package = installer.install(&entry("owner/tool")).await.unwrap();

    let platform = installer.platform();
    assert_eq!(package.tag, "v1.1.0");
    assert_eq!(package.asset, ASSET);
    assert_eq!(package.binary, "tool");
    assert_eq!(package.url, format!("{}/dl/v1.1.0/{ASSET}", server.uri()));
    assert_eq!(fs::read(platform.bin_dir.join("tool")).unwrap(), b"v1.1.0");
    assert!(platform.pkg_dir.join(ASSET).exists());
    assert_eq!(fs::read_dir(&platform.tmp_dir).unwrap().count(), 0);

    let lock = LockFile::load(&platform.lockfile_path).unwrap();
    assert_eq!((lock.os.as_str(), lock.arch.as_str()), ("linux", "amd64"));
    assert_eq!(lock.packages, vec![package]);
}

#[tokio::test]
async fn test_install_raw_url() {
    let server = release_server().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&root, &server);
    let url = format!("{}/raw/other-tool", server.uri());

    let package = installer.install(&entry(&url)).await.unwrap();

    assert_eq!(package.source, Source::Other);
    assert_eq!(package.binary, "other-tool");
    assert_eq!(package.url, url);
    assert!(package.owner.is_empty() && package.tag.is_empty());
    assert!(installer.platform().bin_dir.join("other-tool").exists());
}

#[tokio::test]
async fn test_failed_download_leaves_lockfile_untouched() {
    let server = release_server().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&root, &server);
    installer.install(&entry("owner/tool@v1.0.0")).await.unwrap();

    let platform = installer.platform();
    let before = fs::read(&platform.lockfile_path).unwrap();

    let err = installer
        .install(&entry(&format!("{}/raw/missing-tool", server.uri())))
        .await
        .unwrap_err();

    assert!(matches!(err, StewError::NonSuccessStatus { code: 404, .. }));
    assert!(!platform.pkg_dir.join("missing-tool").exists());
    assert!(!platform.bin_dir.join("missing-tool").exists());
    assert_eq!(fs::read(&platform.lockfile_path).unwrap(), before);
}

#[tokio::test]
async fn test_stewfile_installs_entries_in_order() {
    let server = release_server().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&root, &server);

    let stewfile = root.path().join("Stewfile");
    fs::write(
        &stewfile,
        format!(
            "# tools\n{}/raw/other-tool\n\nowner/tool@v1.0.0#{ASSET}\n",
            server.uri()
        ),
    )
    .unwrap();

    let installed = installer
        .install_inputs(&[stewfile.display().to_string()], None, None)
        .await
        .unwrap();

    assert_eq!(installed.len(), 2);
    let packages = recorded(installer.platform());
    assert_eq!(packages, installed);
    assert_eq!(packages[0].source, Source::Other);
    assert_eq!(packages[1].source, Source::Github);
    assert_eq!(packages[1].tag, "v1.0.0");
    assert_eq!(packages[1].asset, ASSET);
}

#[tokio::test]
async fn test_installing_twice_appends_two_records() {
    let server = release_server().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&root, &server);

    installer.install(&entry("owner/tool@v1.0.0")).await.unwrap();
    installer.install(&entry("owner/tool@v1.1.0")).await.unwrap();

    let packages = recorded(installer.platform());
    assert_eq!(packages.len(), 2);
    assert!(packages.iter().all(|p| p.binary == "tool"));
    assert_eq!(
        fs::read(installer.platform().bin_dir.join("tool")).unwrap(),
        b"v1.1.0"
    );
}

#[tokio::test]
async fn test_lockfile_replay() {
    let server = release_server().await;
    let source_root = TempDir::new().unwrap();
    let first = installer(&source_root, &server);
    first
        .install_inputs(
            &[
                "owner/tool@v1.0.0".to_string(),
                format!("{}/raw/other-tool", server.uri()),
            ],
            None,
            None,
        )
        .await
        .unwrap();

    let target_root = TempDir::new().unwrap();
    let second = installer(&target_root, &server);
    let lockfile = first.platform().lockfile_path.display().to_string();
    second.install_inputs(&[lockfile], None, None).await.unwrap();

    assert_eq!(recorded(second.platform()), recorded(first.platform()));
    assert!(second.platform().bin_dir.join("tool").exists());
    assert!(second.platform().bin_dir.join("other-tool").exists());
}

#[tokio::test]
async fn test_batch_stops_at_first_failure() {
    let server = release_server().await;
    let root = TempDir::new().unwrap();
    let installer = installer(&root, &server);

    let inputs = [
        "owner/tool@v1.0.0".to_string(),
        "not-a-reference".to_string(),
        format!("{}/raw/other-tool", server.uri()),
    ];
    let err = installer
        .install_inputs(&inputs, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, StewError::MalformedReference { .. }));
    let packages = recorded(installer.platform());
    assert_eq!(packages.len(), 1);
    assert!(!installer.platform().bin_dir.join("other-tool").exists());
}
