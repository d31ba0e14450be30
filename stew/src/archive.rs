use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::config::Platform;
use crate::error::{Result, StewError};
use crate::selector;

const TAR_BLOCK_SIZE: usize = 512;
const USTAR_OFFSET: usize = 257;

/// Container format of a downloaded asset, detected from its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    /// A single gzip-compressed file
    Gzip,
    TarBz2,
    TarXz,
    /// Not an archive; the file is the binary
    Plain,
}

/// Detect the archive format of `path` from its magic bytes
pub fn detect_kind(path: &Path) -> Result<ArchiveKind> {
    let mut magic = [0u8; 6];
    let read = read_prefix(fs::File::open(path)?, &mut magic)?;
    let magic = &magic[..read];

    let kind = if magic.starts_with(b"PK\x03\x04") {
        ArchiveKind::Zip
    } else if magic.starts_with(&[0x1f, 0x8b]) {
        if is_tar(GzDecoder::new(fs::File::open(path)?)) {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Gzip
        }
    } else if magic.starts_with(b"BZh") {
        if !is_tar(bzip2::read::BzDecoder::new(fs::File::open(path)?)) {
            return Err(unsupported(path, "bzip2 stream does not contain a tar archive"));
        }
        ArchiveKind::TarBz2
    } else if magic.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        if !is_tar(xz2::read::XzDecoder::new(fs::File::open(path)?)) {
            return Err(unsupported(path, "xz stream does not contain a tar archive"));
        }
        ArchiveKind::TarXz
    } else {
        ArchiveKind::Plain
    };

    tracing::debug!("{} detected as {:?}", path.display(), kind);
    Ok(kind)
}

fn unsupported(path: &Path, reason: &str) -> StewError {
    StewError::UnsupportedArchive {
        file: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn extraction_error(path: &Path, err: impl ToString) -> StewError {
    StewError::ArchiveExtraction {
        file: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn read_prefix(mut reader: impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn is_tar(reader: impl Read) -> bool {
    let mut header = [0u8; TAR_BLOCK_SIZE];
    match read_prefix(reader, &mut header) {
        Ok(TAR_BLOCK_SIZE) => &header[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar",
        _ => false,
    }
}

/// A binary pulled out of a downloaded asset, staged in a scratch directory
/// that is removed when this value is dropped
#[derive(Debug)]
pub struct ExtractedBinary {
    _scratch: tempfile::TempDir,
    path: PathBuf,
    name: String,
}

impl ExtractedBinary {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Move the binary into `bin_dir`, replacing any previous file of the
    /// same name, and return its installed name.
    pub fn install(self, bin_dir: &Path) -> Result<String> {
        let dest = place_binary(&self.path, bin_dir, &self.name)?;
        tracing::info!("Installed {} to {}", self.name, dest.display());
        Ok(self.name)
    }
}

/// Stage the binary contained in the downloaded asset at `asset_path`.
///
/// Archives are unpacked into a scratch directory under `tmp_dir`. An
/// executable whose extension-stripped name equals `repo_hint` is preferred;
/// otherwise the archive must hold exactly one executable within two levels
/// of its root. Plain files are staged as-is under a name derived from the asset.
pub fn extract_binary(
    asset_path: &Path,
    repo_hint: &str,
    tmp_dir: &Path,
) -> Result<ExtractedBinary> {
    let kind = detect_kind(asset_path)?;

    fs::create_dir_all(tmp_dir)?;
    let scratch = tempfile::Builder::new().prefix("stew-").tempdir_in(tmp_dir)?;

    let asset_name = asset_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| extraction_error(asset_path, "invalid file name"))?;

    let (path, name) = match kind {
        ArchiveKind::Plain => {
            let name = plain_binary_name(asset_name, repo_hint);
            let staged = scratch.path().join(&name);
            fs::copy(asset_path, &staged)?;
            (staged, name)
        }
        ArchiveKind::Gzip => {
            let inner = asset_name
                .strip_suffix(".gz")
                .or_else(|| asset_name.strip_suffix(".GZ"))
                .unwrap_or(asset_name);
            let name = plain_binary_name(inner, repo_hint);
            let staged = scratch.path().join(&name);
            let mut decoder = GzDecoder::new(fs::File::open(asset_path)?);
            let mut out = fs::File::create(&staged)?;
            io::copy(&mut decoder, &mut out).map_err(|e| extraction_error(asset_path, e))?;
            (staged, name)
        }
        _ => {
            unpack(kind, asset_path, scratch.path())?;
            let found = find_binary(scratch.path(), repo_hint, asset_name)?;
            let name = found
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| extraction_error(asset_path, "invalid binary name"))?;
            (found, name)
        }
    };

    tracing::debug!("Staged {} from {}", name, asset_name);
    Ok(ExtractedBinary {
        _scratch: scratch,
        path,
        name,
    })
}

/// Extract the binary from `asset_path` and install it into the platform's
/// bin directory. Scratch files are removed whether or not this succeeds.
pub fn install_binary(asset_path: &Path, repo_hint: &str, platform: &Platform) -> Result<String> {
    extract_binary(asset_path, repo_hint, &platform.tmp_dir)?.install(&platform.bin_dir)
}

fn unpack(kind: ArchiveKind, archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let result = match kind {
        ArchiveKind::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(dest),
        ArchiveKind::TarBz2 => {
            tar::Archive::new(bzip2::read::BzDecoder::new(file)).unpack(dest)
        }
        ArchiveKind::TarXz => tar::Archive::new(xz2::read::XzDecoder::new(file)).unpack(dest),
        ArchiveKind::Zip => extract_zip(file, dest),
        ArchiveKind::Gzip | ArchiveKind::Plain => Ok(()),
    };
    result.map_err(|e| extraction_error(archive_path, e))
}

fn extract_zip(file: fs::File, dest_dir: &Path) -> io::Result<()> {
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(io::Error::other)?;
        // Entries escaping the destination are skipped
        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        let outpath = dest_dir.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

fn find_binary(root: &Path, repo_hint: &str, archive_name: &str) -> Result<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push((entry.depth(), entry.into_path()));
        }
    }

    if !repo_hint.is_empty() {
        let hint = repo_hint.to_lowercase();
        // Completions and man pages often share the binary's stem
        let mut named: Vec<&(usize, PathBuf)> = files
            .iter()
            .filter(|(_, path)| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.to_lowercase() == hint)
                    && is_executable(path)
            })
            .collect();
        named.sort_by_key(|(depth, _)| *depth);
        if let Some((_, path)) = named.first() {
            tracing::debug!("Matched {} by name", path.display());
            return Ok(path.clone());
        }
    }

    let executables: Vec<&PathBuf> = files
        .iter()
        .filter(|(depth, path)| *depth <= 2 && is_executable(path))
        .map(|(_, path)| path)
        .collect();

    match executables.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(StewError::NoBinaryFound {
            archive: archive_name.to_string(),
        }),
        many => Err(StewError::AmbiguousBinary {
            archive: archive_name.to_string(),
            candidates: many
                .iter()
                .filter_map(|p| p.strip_prefix(root).ok())
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Name for a binary shipped as a bare file: the leading part of the asset
/// name up to the first version or platform segment, e.g. `tool` for
/// `tool-v1.2.0-linux-amd64`. Without a hint the asset name is kept.
fn plain_binary_name(file_name: &str, repo_hint: &str) -> String {
    if repo_hint.is_empty() {
        return file_name.to_string();
    }
    let (stem, exe) = match file_name.strip_suffix(".exe") {
        Some(stem) => (stem, ".exe"),
        None => (file_name, ""),
    };

    let mut end = stem.len();
    if is_version_like(stem) || selector::starts_with_platform_token(stem) {
        end = 0;
    } else {
        for (idx, c) in stem.char_indices() {
            if c != '-' && c != '_' {
                continue;
            }
            let rest = &stem[idx + 1..];
            if is_version_like(rest) || selector::starts_with_platform_token(rest) {
                end = idx;
                break;
            }
        }
    }

    match &stem[..end] {
        "" => format!("{repo_hint}{exe}"),
        prefix => format!("{prefix}{exe}"),
    }
}

fn is_version_like(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('v') | Some('V') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn place_binary(source: &Path, bin_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(bin_dir)?;
    let dest = bin_dir.join(name);
    if fs::rename(source, &dest).is_err() {
        // Cross-device moves fall back to copying
        if dest.exists() {
            fs::remove_file(&dest)?;
        }
        fs::copy(source, &dest)?;
        fs::remove_file(source)?;
    }
    make_executable(&dest)?;
    Ok(dest)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "exe" | "bat" | "cmd" | "ps1"))
        .unwrap_or(false)
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(windows)]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
