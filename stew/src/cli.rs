use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::lockfile::Source;

#[derive(Parser, Debug)]
#[clap(
    name = "stew",
    version,
    about = "Install binaries from GitHub, GitLab and Gitea releases",
    long_about = None
)]
pub struct Cli {
    /// Configuration file path
    #[clap(long, global = true, env = "STEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// Where a repository is hosted. Shared by every command that talks to a
/// provider.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct HostArgs {
    /// Self-hosted instance, e.g. gitea.com or a GitHub Enterprise host
    #[clap(long)]
    pub host: Option<String>,

    /// Hosting service of --host. Inferred from the configuration file when
    /// omitted
    #[clap(long, value_enum)]
    pub source: Option<Source>,
}

impl HostArgs {
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install binaries from references, a Stewfile or a Stewfile.lock.json
    Install {
        /// owner/repo[@tag][#asset], an http(s) URL or a path to a Stewfile
        #[clap(required = true, value_name = "INPUT")]
        inputs: Vec<String>,

        #[clap(flatten)]
        host: HostArgs,
    },

    /// Pick a release and asset of a repository interactively
    Browse {
        #[clap(value_name = "OWNER/REPO")]
        repo: String,

        #[clap(flatten)]
        host: HostArgs,
    },

    /// Search repositories and install from the chosen one
    Search {
        query: String,

        #[clap(flatten)]
        host: HostArgs,
    },

    /// List installed packages
    List {
        /// Include the installed tag of each package
        #[clap(long)]
        tags: bool,
    },

    /// Remove installed binaries
    Uninstall {
        #[clap(value_name = "BINARY", required_unless_present = "all")]
        binaries: Vec<String>,

        /// Remove every installed binary
        #[clap(long, conflicts_with = "binaries")]
        all: bool,
    },
}
