use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use uuid::Uuid;

/// One line of the publish ledger (`ledger/artifacts.ndjson`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LedgerEntry {
    pub event: String,
    pub reference: String,
    pub artifact_type: String,
    pub payload_ref: String,
    pub run_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn published(manifest: &super::ArtifactManifest) -> Self {
        Self {
            event: "artifact_published".to_string(),
            reference: manifest.reference(),
            artifact_type: manifest.artifact_type.clone(),
            payload_ref: manifest.payload_ref.clone(),
            run_id: manifest.run_id,
            recorded_at: Utc::now(),
        }
    }
}

/// Append one entry; the file is only ever extended, never rewritten.
pub fn append(path: &Path, entry: &LedgerEntry) -> crate::error::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{}", line)?;
    file.sync_data()?;
    Ok(())
}

/// Read every entry, skipping blank lines. A missing ledger reads as empty.
pub fn read_entries(path: &Path) -> crate::error::Result<Vec<LedgerEntry>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(reference: &str) -> LedgerEntry {
        LedgerEntry {
            event: "artifact_published".into(),
            reference: reference.into(),
            artifact_type: "clean_sample".into(),
            payload_ref: format!("cas:sha256:{}", "0".repeat(64)),
            run_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("artifacts.ndjson");
        append(&path, &entry("clean.csv:v0")).unwrap();
        append(&path, &entry("clean.csv:v1")).unwrap();

        let refs: Vec<String> = read_entries(&path).unwrap().into_iter().map(|e| e.reference).collect();
        assert_eq!(refs, vec!["clean.csv:v0", "clean.csv:v1"]);
    }

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_entries(&dir.path().join("nope.ndjson")).unwrap().is_empty());
    }
}
