use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChecksumMeta {
    pub sha256: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PayloadMeta {
    pub mime_type: String,
    pub size_bytes: u64,
    pub checksum: ChecksumMeta,
}

/// One registered version of an artifact, stored as `artifacts/<name>/v<N>.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ArtifactManifest {
    pub manifest_version: String, // "1.0.0"
    pub name: String,
    pub version: u32,
    pub artifact_type: String,
    pub description: String,
    pub file_name: String,
    pub payload: PayloadMeta,
    pub payload_ref: String, // cas:sha256:<hex>
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Earlier version of the same name holding byte-identical content
    pub dedupe_of: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ArtifactManifest {
    /// `name:vN`, the form accepted back by `resolve`.
    pub fn reference(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }
}

pub fn mime_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "csv" => "text/csv",
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "parquet" => "application/vnd.apache.parquet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(mime_type_for("clean_sample.CSV"), "text/csv");
        assert_eq!(mime_type_for("summary.json"), "application/json");
        assert_eq!(mime_type_for("blob"), "application/octet-stream");
    }
}
