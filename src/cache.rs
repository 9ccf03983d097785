use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::LlvmError;

/// What the cache holds for a given digest. A binary artifact wins over a
/// textual one when both exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Missing,
    IrText,
    Bitcode,
}

/// A resolved cache slot: where an artifact for this source lives, or where
/// a freshly produced one should be published.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    dir: PathBuf,
    stem: String,
    digest: String,
    kind: ArtifactKind,
}

impl CacheEntry {
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn ir_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}.ll", self.stem, self.digest))
    }

    pub fn bitcode_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}.bc", self.stem, self.digest))
    }

    /// Path of the existing artifact, if any.
    pub fn path(&self) -> Option<PathBuf> {
        match self.kind {
            ArtifactKind::Missing => None,
            ArtifactKind::IrText => Some(self.ir_path()),
            ArtifactKind::Bitcode => Some(self.bitcode_path()),
        }
    }
}

/// Resolve a source to its content-addressed slot in `cache_dir`.
///
/// The key is a SHA-256 digest of the source bytes and the compiler flags,
/// never the file name. Without a `cache_dir` a process-scoped temporary
/// directory is used, which is not reuse-safe across runs.
pub fn resolve(
    source: &[u8],
    flags: &[String],
    stem: &str,
    cache_dir: Option<&Path>,
) -> Result<CacheEntry, LlvmError> {
    let dir = match cache_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            dir.to_path_buf()
        }
        None => process_cache_dir()?.to_path_buf(),
    };

    let digest = content_digest(source, flags);
    let entry = |kind| CacheEntry {
        dir: dir.clone(),
        stem: stem.to_string(),
        digest: digest.clone(),
        kind,
    };

    let found = entry(ArtifactKind::Bitcode);
    if found.bitcode_path().is_file() {
        debug!(path = %found.bitcode_path().display(), "cache hit (bitcode)");
        return Ok(found);
    }
    let found = entry(ArtifactKind::IrText);
    if found.ir_path().is_file() {
        debug!(path = %found.ir_path().display(), "cache hit (ir text)");
        return Ok(found);
    }
    debug!(digest = %digest, "cache miss");
    Ok(entry(ArtifactKind::Missing))
}

/// Write `bytes` to `path` without ever exposing a partial file: the data
/// goes to a temporary sibling first and is renamed into place.
pub fn publish(path: &Path, bytes: &[u8]) -> Result<(), LlvmError> {
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Temporary name next to `path` for write-then-rename publishing.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}.tmp", process::id()));
    PathBuf::from(name)
}

fn content_digest(source: &[u8], flags: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    for flag in flags {
        hasher.update([0u8]);
        hasher.update(flag.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// One temporary directory per process, created lazily.
fn process_cache_dir() -> Result<&'static Path, LlvmError> {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    let dir = DIR.get_or_init(|| {
        std::env::temp_dir().join(format!("llvm-invoke-{}", process::id()))
    });
    fs::create_dir_all(dir)?;
    Ok(dir)
}
