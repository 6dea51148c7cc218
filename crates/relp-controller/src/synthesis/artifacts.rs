//! Artifact set model
//!
//! An [`ArtifactSet`] is everything one tenant needs on a node: files keyed by
//! absolute path and the systemd units to install. Files either embed their
//! bytes or name a Secret key that the distribution agent resolves on the node.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("artifact path '{0}' is not absolute")]
    RelativePath(String),

    #[error("artifact path '{0}' is emitted twice")]
    DuplicatePath(String),

    #[error("unit '{0}' is emitted twice")]
    DuplicateUnit(String),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("{field} references '{reference}' which is not part of the cluster resources")]
    UnresolvedReference { field: &'static str, reference: String },

    #[error("audit rules could not be read: {0}")]
    AuditRules(String),
}

pub type Result<T, E = SynthesisError> = std::result::Result<T, E>;

/// Node file permissions. Only these three modes are ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum FileMode {
    /// 0600, secrets
    Private,
    /// 0644, plain configuration
    Public,
    /// 0744, scripts run by root
    Executable,
}

impl FileMode {
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Private => 0o600,
            Self::Public => 0o644,
            Self::Executable => 0o744,
        }
    }
}

impl From<FileMode> for u32 {
    fn from(mode: FileMode) -> Self {
        mode.bits()
    }
}

impl TryFrom<u32> for FileMode {
    type Error = String;

    fn try_from(bits: u32) -> std::result::Result<Self, Self::Error> {
        match bits {
            0o600 => Ok(Self::Private),
            0o644 => Ok(Self::Public),
            0o744 => Ok(Self::Executable),
            other => Err(format!("unsupported file mode {other:o}")),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Encoding {
    Plain,
    Base64,
}

/// Where the bytes of a file come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArtifactSource {
    Inline { encoding: Encoding, data: String },
    #[serde(rename_all = "camelCase")]
    SecretKey { secret_name: String, key: String },
}

impl ArtifactSource {
    pub fn plain(data: impl Into<String>) -> Self {
        Self::Inline {
            encoding: Encoding::Plain,
            data: data.into(),
        }
    }

    /// Base64-wraps `bytes` for transport.
    pub fn base64(bytes: impl AsRef<[u8]>) -> Self {
        Self::Inline {
            encoding: Encoding::Base64,
            data: STANDARD.encode(bytes),
        }
    }

    pub fn secret_key(secret_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::SecretKey {
            secret_name: secret_name.into(),
            key: key.into(),
        }
    }

    /// Decoded bytes of an inline source; `None` for late-bound sources.
    #[must_use]
    pub fn inline_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Inline {
                encoding: Encoding::Plain,
                data,
            } => Some(data.as_bytes().to_vec()),
            Self::Inline {
                encoding: Encoding::Base64,
                data,
            } => STANDARD.decode(data).ok(),
            Self::SecretKey { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub permissions: FileMode,
    pub source: ArtifactSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDef {
    pub name: String,
    pub enable: bool,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    files: BTreeMap<String, Artifact>,
    units: Vec<UnitDef>,
}

impl ArtifactSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file. Paths must be absolute and unique within the set.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        permissions: FileMode,
        source: ArtifactSource,
    ) -> Result<()> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(SynthesisError::RelativePath(path));
        }
        if self.files.contains_key(&path) {
            return Err(SynthesisError::DuplicatePath(path));
        }
        self.files.insert(
            path.clone(),
            Artifact {
                path,
                permissions,
                source,
            },
        );
        Ok(())
    }

    /// Appends a unit, keeping declaration order.
    pub fn add_unit(&mut self, unit: UnitDef) -> Result<()> {
        if self.units.iter().any(|u| u.name == unit.name) {
            return Err(SynthesisError::DuplicateUnit(unit.name));
        }
        self.units.push(unit);
        Ok(())
    }

    /// Files in path order.
    pub fn files(&self) -> impl Iterator<Item = &Artifact> {
        self.files.values()
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<&Artifact> {
        self.files.get(path)
    }

    #[must_use]
    pub fn units(&self) -> &[UnitDef] {
        &self.units
    }

    /// Inline content of `path` as text.
    #[must_use]
    pub fn text(&self, path: &str) -> Option<String> {
        self.file(path)
            .and_then(|a| a.source.inline_bytes())
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Paths below `prefix`, in order.
    pub fn paths_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .range(prefix.to_string()..)
            .take_while(move |(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.as_str())
    }

    /// Stable content hash used to detect real changes between reconciles.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for artifact in self.files.values() {
            hasher.update(artifact.path.as_bytes());
            hasher.update(artifact.permissions.bits().to_be_bytes());
            match &artifact.source {
                ArtifactSource::Inline { encoding, data } => {
                    hasher.update(match encoding {
                        Encoding::Plain => b"p",
                        Encoding::Base64 => b"b",
                    });
                    hasher.update(data.as_bytes());
                }
                ArtifactSource::SecretKey { secret_name, key } => {
                    hasher.update(b"s");
                    hasher.update(secret_name.as_bytes());
                    hasher.update([0]);
                    hasher.update(key.as_bytes());
                }
            }
            hasher.update([0]);
        }
        for unit in &self.units {
            hasher.update(unit.name.as_bytes());
            hasher.update([u8::from(unit.enable)]);
            hasher.update(unit.content.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}
