//! Artifact registry: named, versioned, content-addressed blobs.
//!
//! The cleaning step talks to the registry only through [`ArtifactRegistry`].
//! [`FsArtifactRegistry`] is the filesystem-backed implementation used by the
//! binary and the tests.

pub mod cas_fs;
pub mod fs;
pub mod ledger;
pub mod manifest;

pub use fs::FsArtifactRegistry;
pub use manifest::{ArtifactManifest, ChecksumMeta, PayloadMeta};

use crate::error::{CleaningError, Result};
use crate::run::RunRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());
static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v(\d+)$").unwrap());

/// Check that `name` can be used both as an artifact name and a plain file name.
pub fn validate_artifact_name(name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(CleaningError::InvalidIdentifier(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSpec {
    Latest,
    Exact(u32),
}

/// `name`, `name:latest` or `name:vN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId {
    name: String,
    version: VersionSpec,
}

impl ArtifactId {
    pub fn latest(name: &str) -> Result<Self> {
        validate_artifact_name(name)?;
        Ok(Self { name: name.to_string(), version: VersionSpec::Latest })
    }

    pub fn exact(name: &str, version: u32) -> Result<Self> {
        validate_artifact_name(name)?;
        Ok(Self { name: name.to_string(), version: VersionSpec::Exact(version) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> VersionSpec {
        self.version
    }
}

impl FromStr for ArtifactId {
    type Err = CleaningError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CleaningError::InvalidIdentifier(s.to_string());
        let (name, version) = match s.rsplit_once(':') {
            None => (s, VersionSpec::Latest),
            Some((name, "latest")) => (name, VersionSpec::Latest),
            Some((name, tag)) => {
                let caps = VERSION_RE.captures(tag).ok_or_else(invalid)?;
                let n = caps[1].parse::<u32>().map_err(|_| invalid())?;
                (name, VersionSpec::Exact(n))
            }
        };
        if !NAME_RE.is_match(name) {
            return Err(invalid());
        }
        Ok(Self { name: name.to_string(), version })
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            VersionSpec::Latest => write!(f, "{}:latest", self.name),
            VersionSpec::Exact(n) => write!(f, "{}:v{}", self.name, n),
        }
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = CleaningError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}

/// An artifact that has been created locally but not yet published.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub name: String,
    pub artifact_type: String,
    pub description: String,
    pub file: PathBuf,
    pub metadata: BTreeMap<String, Value>,
}

impl ArtifactDraft {
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A registered artifact version together with its content on local disk.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub manifest: ArtifactManifest,
    pub local_path: PathBuf,
}

pub trait ArtifactRegistry {
    /// Find the requested version, check its type and materialize its file locally.
    fn resolve(&self, id: &ArtifactId, expected_type: &str) -> Result<ResolvedArtifact>;

    /// Store the draft's content and register it as the next version of its
    /// name, returning only once the registry has confirmed it is durable.
    fn publish_and_wait(&self, run_id: Uuid, draft: ArtifactDraft) -> Result<ArtifactManifest>;

    /// Persist the current state of a run for provenance.
    fn record_run(&self, record: &RunRecord) -> Result<()>;

    fn create(&self, name: &str, artifact_type: &str, description: &str, file: &Path) -> Result<ArtifactDraft> {
        validate_artifact_name(name)?;
        if artifact_type.trim().is_empty() {
            return Err(CleaningError::Config(format!("artifact '{}' needs a non-empty type", name)));
        }
        if !file.is_file() {
            return Err(CleaningError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("artifact file '{}' does not exist", file.display()),
            )));
        }
        Ok(ArtifactDraft {
            name: name.to_string(),
            artifact_type: artifact_type.to_string(),
            description: description.to_string(),
            file: file.to_path_buf(),
            metadata: BTreeMap::new(),
        })
    }
}
