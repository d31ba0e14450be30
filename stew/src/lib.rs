//! # stew
//!
//! Install pre-built binaries from GitHub, GitLab and Gitea releases, or from
//! any direct download URL, and keep a reproducible record of them.
//!
//! ## Overview
//!
//! A reference such as `junegunn/fzf@0.46.0` is resolved against the hosting
//! service's release API. The asset built for the current OS and
//! architecture is picked automatically when that is unambiguous, otherwise
//! the user is asked. The asset is downloaded, the executable extracted and
//! installed into the bin directory, and the installation appended to
//! `Stewfile.lock.json`.
//!
//! ## Usage
//!
//! ```bash
//! # Install the latest release
//! stew install junegunn/fzf
//!
//! # Pin a tag and an asset
//! stew install cli/cli@v2.40.0#gh_2.40.0_linux_amd64.tar.gz
//!
//! # Self-hosted Gitea
//! stew install gitea/tea --host gitea.com --source gitea
//!
//! # Reinstall everything recorded in a lockfile
//! stew install ~/.config/stew/Stewfile.lock.json
//! ```
//!
//! ## Configuration
//!
//! Paths, the request timeout and the source of self-hosted hosts can be set
//! in `<config_dir>/stew/config.toml`.

/// Archive detection, extraction and binary placement
pub mod archive;

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration file handling and resolved platform paths
pub mod config;

/// Error types and error handling utilities
pub mod error;

pub mod gitea;
pub mod github;
pub mod gitlab;

/// HTTP transport shared by every provider
pub mod http;

/// Install pipeline and the browse, search, list and uninstall commands
pub mod installer;

/// Lockfile model and persistence
pub mod lockfile;

/// Interactive selection prompts
pub mod prompt;

/// Provider-independent release model
pub mod provider;

/// Reference and Stewfile parsing
pub mod reference;

/// Automatic asset selection for the current platform
pub mod selector;
