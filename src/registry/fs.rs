use super::cas_fs::{self, parse_payload_ref, payload_ref, read_cas, sha256_hex, write_cas};
use super::ledger::{self, LedgerEntry};
use super::manifest::{mime_type_for, ArtifactManifest, ChecksumMeta, PayloadMeta};
use super::{validate_artifact_name, ArtifactDraft, ArtifactId, ArtifactRegistry, ResolvedArtifact, VersionSpec};
use crate::config::RegistryConfig;
use crate::constants::MANIFEST_VERSION;
use crate::error::{CleaningError, Result};
use crate::run::RunRecord;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry laid out on a local (or mounted) filesystem:
///
/// ```text
/// <root>/cas/sha256/ab/cd/<hex>        payload bytes
/// <root>/artifacts/<name>/v<N>.json    manifests
/// <root>/ledger/artifacts.ndjson       publish log
/// <root>/runs/<run_id>.json            run records
/// <cache_dir>/<name>-v<N>/<file>       resolved copies
/// ```
pub struct FsArtifactRegistry {
    config: RegistryConfig,
}

impl FsArtifactRegistry {
    pub fn open(config: RegistryConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        info!(root = %config.root.display(), "Artifact registry opened");
        Ok(Self { config })
    }

    fn cas_root(&self) -> PathBuf {
        self.config.root.join("cas")
    }

    fn artifact_dir(&self, name: &str) -> PathBuf {
        self.config.root.join("artifacts").join(name)
    }

    fn manifest_path(&self, name: &str, version: u32) -> PathBuf {
        self.artifact_dir(name).join(format!("v{}.json", version))
    }

    fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.config.root.join("runs").join(format!("{}.json", run_id))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.config.root.join("ledger").join("artifacts.ndjson")
    }

    pub fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
        ledger::read_entries(&self.ledger_path())
    }

    /// Registered versions of `name`, ascending.
    pub fn versions(&self, name: &str) -> Result<Vec<u32>> {
        let entries = match fs::read_dir(self.artifact_dir(name)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let file_name = entry?.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(n) = file_name
                .strip_prefix('v')
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                versions.push(n);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn manifest(&self, name: &str, version: u32) -> Result<Option<ArtifactManifest>> {
        match fs::read(self.manifest_path(name, version)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn run_record(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        match fs::read(self.run_path(run_id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn lookup(&self, id: &ArtifactId) -> Result<ArtifactManifest> {
        let version = match id.version() {
            VersionSpec::Exact(n) => n,
            VersionSpec::Latest => *self
                .versions(id.name())?
                .last()
                .ok_or_else(|| CleaningError::ArtifactNotFound(id.to_string()))?,
        };
        self.manifest(id.name(), version)?
            .ok_or_else(|| CleaningError::ArtifactNotFound(id.to_string()))
    }

    /// Read a payload back from the store, failing if its content no longer
    /// matches the digest recorded in the manifest.
    fn read_payload(&self, manifest: &ArtifactManifest) -> Result<Vec<u8>> {
        let hex = parse_payload_ref(&manifest.payload_ref)
            .ok_or_else(|| CleaningError::InvalidIdentifier(manifest.payload_ref.clone()))?;
        let (bytes, actual) = read_cas(&self.cas_root(), hex).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CleaningError::ArtifactNotFound(format!(
                "{} (payload {} missing)",
                manifest.reference(),
                manifest.payload_ref
            )),
            _ => e.into(),
        })?;
        if actual != hex || actual != manifest.payload.checksum.sha256 {
            return Err(CleaningError::ChecksumMismatch {
                payload_ref: manifest.payload_ref.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Claim the next free version slot for `name` by hard-linking a fully
    /// written manifest into place. Concurrent publishers racing for the same
    /// slot lose the link and retry with the next number.
    fn claim_version(&self, mut manifest: ArtifactManifest) -> Result<ArtifactManifest> {
        let dir = self.artifact_dir(&manifest.name);
        fs::create_dir_all(&dir)?;
        let mut version = self.versions(&manifest.name)?.last().map_or(0, |v| v + 1);
        loop {
            manifest.version = version;
            let tmp = dir.join(format!(".v{}.{}.tmp", version, manifest.run_id));
            write_synced(&tmp, &serde_json::to_vec_pretty(&manifest)?)?;
            let outcome = fs::hard_link(&tmp, self.manifest_path(&manifest.name, version));
            let _ = fs::remove_file(&tmp);
            match outcome {
                Ok(()) => {
                    cas_fs::sync_dir(&dir);
                    return Ok(manifest);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %manifest.name, version, "Version slot taken, retrying");
                    version += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Check that the object just stored under `hex` reads back intact.
    fn verify_stored(&self, hex: &str) -> Result<()> {
        let (_, actual) = read_cas(&self.cas_root(), hex)?;
        if actual != hex {
            return Err(CleaningError::ChecksumMismatch {
                payload_ref: payload_ref(hex),
                actual,
            });
        }
        Ok(())
    }

    /// Give back a version slot claimed by a publish that did not complete.
    fn release_version(&self, manifest: &ArtifactManifest) {
        let path = self.manifest_path(&manifest.name, manifest.version);
        match fs::remove_file(&path) {
            Ok(()) => {
                cas_fs::sync_dir(&self.artifact_dir(&manifest.name));
                warn!(artifact = %manifest.reference(), "Released version of incomplete publish");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(artifact = %manifest.reference(), error = %e, "Failed to release version slot"),
        }
    }

    /// Poll until the manifest reads back and its payload verifies.
    fn wait_until_durable(&self, manifest: &ArtifactManifest) -> Result<()> {
        let deadline = Instant::now() + self.config.publish_timeout;
        loop {
            match self.manifest(&manifest.name, manifest.version) {
                Ok(Some(stored))
                    if stored.run_id == manifest.run_id && stored.payload_ref == manifest.payload_ref =>
                {
                    match self.read_payload(&stored) {
                        Ok(_) => return Ok(()),
                        Err(CleaningError::ArtifactNotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(_) => {}
                Err(CleaningError::Json(_)) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(CleaningError::PublishTimeout {
                    reference: manifest.reference(),
                    timeout: self.config.publish_timeout,
                });
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

impl ArtifactRegistry for FsArtifactRegistry {
    fn resolve(&self, id: &ArtifactId, expected_type: &str) -> Result<ResolvedArtifact> {
        let manifest = self.lookup(id)?;
        if manifest.artifact_type != expected_type {
            return Err(CleaningError::TypeMismatch {
                reference: manifest.reference(),
                expected: expected_type.to_string(),
                actual: manifest.artifact_type.clone(),
            });
        }
        let bytes = self.read_payload(&manifest)?;

        let local_dir = self
            .config
            .cache_dir
            .join(format!("{}-v{}", manifest.name, manifest.version));
        let local_path = local_dir.join(&manifest.file_name);
        let cached = fs::read(&local_path).map(|b| sha256_hex(&b)).ok();
        if cached.as_deref() != Some(manifest.payload.checksum.sha256.as_str()) {
            fs::create_dir_all(&local_dir)?;
            fs::write(&local_path, &bytes)?;
        }
        debug!(artifact = %manifest.reference(), path = %local_path.display(), "Artifact resolved");
        Ok(ResolvedArtifact { manifest, local_path })
    }

    fn publish_and_wait(&self, run_id: Uuid, draft: ArtifactDraft) -> Result<ArtifactManifest> {
        validate_artifact_name(&draft.name)?;
        let bytes = fs::read(&draft.file)?;
        let hex = write_cas(&self.cas_root(), &bytes)?;
        self.verify_stored(&hex)?;
        let file_name = draft
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| draft.name.clone());

        let previous = self.versions(&draft.name)?;
        let mut dedupe_of = None;
        for version in previous.iter().rev() {
            if let Some(existing) = self.manifest(&draft.name, *version)? {
                if existing.payload.checksum.sha256 == hex {
                    dedupe_of = Some(existing.reference());
                    break;
                }
            }
        }

        let manifest = self.claim_version(ArtifactManifest {
            manifest_version: MANIFEST_VERSION.to_string(),
            name: draft.name,
            version: 0,
            artifact_type: draft.artifact_type,
            description: draft.description,
            payload: PayloadMeta {
                mime_type: mime_type_for(&file_name).to_string(),
                size_bytes: bytes.len() as u64,
                checksum: ChecksumMeta { sha256: hex.clone() },
            },
            file_name,
            payload_ref: payload_ref(&hex),
            run_id,
            created_at: Utc::now(),
            dedupe_of,
            metadata: draft.metadata,
        })?;

        if let Err(e) = self.wait_until_durable(&manifest) {
            self.release_version(&manifest);
            return Err(e);
        }

        if let Err(e) = ledger::append(&self.ledger_path(), &LedgerEntry::published(&manifest)) {
            // the manifest is authoritative; the ledger is an audit trail
            warn!(artifact = %manifest.reference(), error = %e, "Failed to append publish ledger entry");
        }
        info!(
            artifact = %manifest.reference(),
            payload_ref = %manifest.payload_ref,
            size_bytes = manifest.payload.size_bytes,
            "Artifact published"
        );
        Ok(manifest)
    }

    fn record_run(&self, record: &RunRecord) -> Result<()> {
        let path = self.run_path(record.run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        write_synced(&tmp, &serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
