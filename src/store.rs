//! Artifact store: durable raw responses keyed by identifier
//!
//! The existence of a key is the resumption checkpoint. Content is never
//! re-validated.

use crate::error::HarvestError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bytes that cannot appear in a file name on common filesystems, plus `%` itself
const KEY_UNSAFE: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|');

pub trait ArtifactStore {
    /// Durable location of the artifact for `identifier`
    fn key_path(&self, identifier: &str) -> PathBuf;

    fn exists(&self, identifier: &str) -> bool {
        self.key_path(identifier).exists()
    }

    /// Persist the full body; must be durable before returning
    fn write(&self, identifier: &str, body: &[u8]) -> Result<PathBuf, HarvestError>;
}

/// A directory of `<prefix>_<identifier>.<extension>` files
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl DirStore {
    /// Open (and create if needed) the artifact directory
    pub fn open(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self, HarvestError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| HarvestError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an identifier; distinct identifiers never share a name
    pub fn file_name(&self, identifier: &str) -> String {
        format!("{}_{}.{}", self.prefix, encode_key(identifier), self.extension)
    }
}

impl ArtifactStore for DirStore {
    fn key_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(self.file_name(identifier))
    }

    fn write(&self, identifier: &str, body: &[u8]) -> Result<PathBuf, HarvestError> {
        let target = self.key_path(identifier);
        let partial = self.dir.join(format!(".{}.partial", self.file_name(identifier)));
        let to_store_err = |source| HarvestError::Store {
            key: identifier.to_string(),
            source,
        };

        let mut file = fs::File::create(&partial).map_err(to_store_err)?;
        file.write_all(body).map_err(to_store_err)?;
        file.sync_all().map_err(to_store_err)?;
        drop(file);

        // Rename is the commit point: a crash before it leaves no checkpoint
        fs::rename(&partial, &target).map_err(to_store_err)?;
        Ok(target)
    }
}

pub fn encode_key(identifier: &str) -> String {
    utf8_percent_encode(identifier, KEY_UNSAFE).to_string()
}

/// Recover the identifier from a `<prefix>_<key>.<ext>` file name written by [`DirStore`]
///
/// Returns `None` for files that do not carry `prefix`.
pub fn shard_key(path: &Path, prefix: &str) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let key = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    Some(percent_decode_str(key).decode_utf8_lossy().into_owned())
}
