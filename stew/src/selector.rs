//! Automatic release asset selection.
//!
//! Asset names are matched against a closed table of OS and architecture
//! aliases. Selection only succeeds when exactly one asset matches both the
//! OS and the architecture; ties and misses are left to the user.

use crate::error::{Result, StewError};

struct Alias {
    canonical: &'static str,
    aliases: &'static [&'static str],
    /// Canonical names whose aliases, when present, rule this entry out
    conflicts: &'static [&'static str],
}

const OS_ALIASES: &[Alias] = &[
    Alias {
        canonical: "linux",
        aliases: &["linux"],
        conflicts: &["android"],
    },
    Alias {
        canonical: "darwin",
        aliases: &["darwin", "macos", "macosx", "osx", "apple"],
        conflicts: &[],
    },
    Alias {
        canonical: "windows",
        aliases: &["windows", "win64", "win32"],
        conflicts: &[],
    },
    Alias {
        canonical: "freebsd",
        aliases: &["freebsd"],
        conflicts: &[],
    },
    Alias {
        canonical: "netbsd",
        aliases: &["netbsd"],
        conflicts: &[],
    },
    Alias {
        canonical: "openbsd",
        aliases: &["openbsd"],
        conflicts: &[],
    },
    Alias {
        canonical: "android",
        aliases: &["android"],
        conflicts: &[],
    },
];

const ARCH_ALIASES: &[Alias] = &[
    Alias {
        canonical: "amd64",
        aliases: &["amd64", "x86_64", "x86-64", "x64"],
        conflicts: &[],
    },
    Alias {
        canonical: "arm64",
        aliases: &["arm64", "aarch64", "armv8"],
        conflicts: &[],
    },
    Alias {
        canonical: "386",
        aliases: &["386", "i386", "i586", "i686", "x86_32"],
        conflicts: &["amd64"],
    },
    Alias {
        canonical: "arm",
        aliases: &["armv7", "armv6", "armhf", "armel", "arm"],
        conflicts: &["arm64"],
    },
    Alias {
        canonical: "riscv64",
        aliases: &["riscv64"],
        conflicts: &[],
    },
    Alias {
        canonical: "ppc64le",
        aliases: &["ppc64le", "powerpc64le"],
        conflicts: &[],
    },
    Alias {
        canonical: "s390x",
        aliases: &["s390x"],
        conflicts: &[],
    },
];

/// Suffixes that never name an installable binary
const EXCLUDED_SUFFIXES: &[&str] = &[
    ".sha256",
    ".sha256sum",
    ".sha512",
    ".sha512sum",
    ".sha1",
    ".md5",
    ".asc",
    ".sig",
    ".pem",
    ".cert",
    ".sbom",
    ".spdx",
    ".intoto.jsonl",
    ".json",
    ".txt",
    ".deb",
    ".rpm",
    ".apk",
    ".msi",
    ".dmg",
    ".pkg",
];

fn lookup(table: &'static [Alias], canonical: &str) -> Option<&'static Alias> {
    table.iter().find(|a| a.canonical == canonical)
}

fn any_alias(alias: &Alias, name: &str) -> bool {
    alias.aliases.iter().any(|a| name.contains(a))
}

fn matches_token(table: &'static [Alias], token: &str, name: &str) -> bool {
    let Some(alias) = lookup(table, token) else {
        return name.contains(token);
    };
    if !any_alias(alias, name) {
        return false;
    }
    !alias
        .conflicts
        .iter()
        .filter_map(|c| lookup(table, c))
        .any(|c| any_alias(c, name))
}

/// Text after the last `.` when it looks like a file extension. Version
/// dots such as the one in `tool_1.2.0_linux_amd64` do not count.
fn extension(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    let looks_like_extension = !ext.is_empty()
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && !ext.chars().all(|c| c.is_ascii_digit());
    looks_like_extension.then_some(ext)
}

/// Whether `name` is eligible for auto-detection at all
pub fn is_candidate(name: &str) -> bool {
    let lower = name.to_lowercase();
    if extension(&lower).is_none() {
        return false;
    }
    !EXCLUDED_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

pub fn matches_os(name: &str, os: &str) -> bool {
    matches_token(OS_ALIASES, &os.to_lowercase(), &name.to_lowercase())
}

pub fn matches_arch(name: &str, arch: &str) -> bool {
    matches_token(ARCH_ALIASES, &arch.to_lowercase(), &name.to_lowercase())
}

/// Pick the single asset built for `os`/`arch`.
pub fn select_asset(assets: &[String], os: &str, arch: &str) -> Result<String> {
    let matches: Vec<&String> = assets
        .iter()
        .filter(|a| is_candidate(a))
        .filter(|a| matches_os(a, os) && matches_arch(a, arch))
        .collect();

    tracing::debug!("{} asset(s) matched {}/{}", matches.len(), os, arch);

    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        _ => Err(StewError::SelectionAmbiguity {
            os: os.to_string(),
            arch: arch.to_string(),
            matches: matches.len(),
        }),
    }
}

/// Whether `rest` of a file name begins with an OS or architecture alias,
/// e.g. `linux64` or `x86_64-unknown-linux-gnu`
pub fn starts_with_platform_token(rest: &str) -> bool {
    let rest = rest.to_lowercase();
    OS_ALIASES
        .iter()
        .chain(ARCH_ALIASES.iter())
        .flat_map(|a| a.aliases.iter())
        .any(|alias| rest.starts_with(alias))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_exact_platform() {
        let assets = names(&["tool-darwin-amd64.tar.gz", "tool-linux-amd64.tar.gz"]);
        assert_eq!(
            select_asset(&assets, "darwin", "amd64").unwrap(),
            "tool-darwin-amd64.tar.gz"
        );
        assert_eq!(
            select_asset(&assets, "linux", "amd64").unwrap(),
            "tool-linux-amd64.tar.gz"
        );
    }

    #[test]
    fn test_no_match_requires_choice() {
        let assets = names(&["tool-darwin-amd64.tar.gz", "tool-linux-amd64.tar.gz"]);
        let err = select_asset(&assets, "windows", "arm64").unwrap_err();
        assert!(matches!(err, StewError::SelectionAmbiguity { matches: 0, .. }));
    }

    #[test]
    fn test_tie_requires_choice() {
        let assets = names(&[
            "tool-linux-amd64-gnu.tar.gz",
            "tool-linux-amd64-musl.tar.gz",
        ]);
        let err = select_asset(&assets, "linux", "amd64").unwrap_err();
        assert!(matches!(err, StewError::SelectionAmbiguity { matches: 2, .. }));
    }

    #[test]
    fn test_aliases_and_case() {
        let assets = names(&[
            "ripgrep-14.1.0-x86_64-apple-darwin.tar.gz",
            "ripgrep-14.1.0-aarch64-apple-darwin.tar.gz",
            "ripgrep-14.1.0-x86_64-unknown-linux-musl.tar.gz",
        ]);
        assert_eq!(
            select_asset(&assets, "darwin", "arm64").unwrap(),
            "ripgrep-14.1.0-aarch64-apple-darwin.tar.gz"
        );

        let assets = names(&["Tool_MacOS_X64.zip", "Tool_Windows_X64.zip"]);
        assert_eq!(
            select_asset(&assets, "darwin", "amd64").unwrap(),
            "Tool_MacOS_X64.zip"
        );
    }

    #[test]
    fn test_checksums_and_signatures_excluded() {
        let assets = names(&[
            "tool-linux-amd64.tar.gz",
            "tool-linux-amd64.tar.gz.sha256",
            "tool-linux-amd64.tar.gz.asc",
            "tool-linux-amd64.deb",
        ]);
        assert_eq!(
            select_asset(&assets, "linux", "amd64").unwrap(),
            "tool-linux-amd64.tar.gz"
        );
    }

    #[test]
    fn test_extensionless_excluded() {
        assert!(!is_candidate("tool-linux-amd64"));
        assert!(is_candidate("tool-linux-amd64.exe"));
        assert!(is_candidate("tool-x86_64.AppImage"));
    }

    #[test]
    fn test_version_dots_are_not_extensions() {
        assert!(!is_candidate("tool_1.2.0_linux_amd64"));
        assert!(!is_candidate("tool-linux-amd64-v1.2"));
        assert!(is_candidate("tool_1.2.0_linux_amd64.tar.gz"));

        let assets = names(&["tool_1.2.0_linux_amd64", "tool_1.2.0_darwin_amd64"]);
        assert!(matches!(
            select_asset(&assets, "linux", "amd64"),
            Err(StewError::SelectionAmbiguity { matches: 0, .. })
        ));
    }

    #[test]
    fn test_arch_conflicts() {
        assert!(!matches_arch("tool-linux-arm64.tar.gz", "arm"));
        assert!(matches_arch("tool-linux-armv7.tar.gz", "arm"));
        assert!(!matches_arch("tool-linux-x86_64.tar.gz", "386"));
        assert!(matches_arch("tool-linux-i686.tar.gz", "386"));
        assert!(!matches_os("tool-android-arm64.tar.gz", "linux"));
        assert!(!matches_os("tool-darwin-amd64.tar.gz", "windows"));
    }

    #[test]
    fn test_unknown_tokens_match_literally() {
        assert!(matches_os("tool-solaris-amd64.tar.gz", "solaris"));
        assert!(matches_arch("tool-linux-mips64.tar.gz", "mips64"));
    }

    #[test]
    fn test_platform_tokens() {
        assert!(starts_with_platform_token("Linux-amd64"));
        assert!(starts_with_platform_token("linux64"));
        assert!(starts_with_platform_token("x86_64-unknown-linux-gnu"));
        assert!(!starts_with_platform_token("tool"));
    }
}
