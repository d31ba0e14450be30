use thiserror::Error;

#[derive(Error, Debug)]
pub enum StewError {
    #[error("Invalid reference '{input}'. Expected format: owner/repo[@tag][#asset] or an http(s) URL")]
    MalformedReference { input: String },

    #[error("Request to {url} returned non-success status {code}")]
    NonSuccessStatus { code: u16, url: String },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No releases found for {owner}/{repo}")]
    NoReleasesFound { owner: String, repo: String },

    #[error("No assets found in release {tag}")]
    NoAssetsFound { tag: String },

    #[error("Could not automatically detect an asset for {os}/{arch}: {matches} candidate(s) matched")]
    SelectionAmbiguity {
        os: String,
        arch: String,
        matches: usize,
    },

    #[error("A host is required for {provider} repositories")]
    MissingHost { provider: String },

    #[error("Refusing to use '{name}' as a file name: it must be a single path component")]
    UnsafeFileName { name: String },

    #[error("Unsupported archive {file}: {reason}")]
    UnsupportedArchive { file: String, reason: String },

    #[error("Archive extraction failed for {file}: {reason}. Supported formats: .zip, .tar.gz, .tgz, .gz, .tar.bz2, .tar.xz")]
    ArchiveExtraction { file: String, reason: String },

    #[error("More than one executable candidate found in {archive}: {candidates}")]
    AmbiguousBinary { archive: String, candidates: String },

    #[error("No executable files found in archive {archive}")]
    NoBinaryFound { archive: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lockfile at {path} is corrupt: {source}")]
    Lockfile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error at {path}: {message}")]
    Config { path: String, message: String },

    #[error("Prompt cancelled: {0}")]
    Prompt(String),

    #[error("No search results found for '{query}'")]
    NoSearchResults { query: String },

    #[error("No installed package provides the binary '{binary}'")]
    PackageNotFound { binary: String },

    #[error("The lockfile does not contain any packages")]
    NoPackagesInLockfile,
}

pub type Result<T> = std::result::Result<T, StewError>;
