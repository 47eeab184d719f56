//! Run context: the explicit handle a step uses to read and publish artifacts.
//!
//! Lifecycle is `open -> use_artifact / log_artifact -> finish | fail`. Every
//! transition is persisted through [`ArtifactRegistry::record_run`] so the
//! configuration and lineage of a run survive even when it fails.

use crate::error::{CleaningError, Result};
use crate::registry::{ArtifactDraft, ArtifactId, ArtifactManifest, ArtifactRegistry, ResolvedArtifact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub phase: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub job_type: String,
    pub state: RunState,
    pub config: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub used_artifacts: Vec<String>,
    #[serde(default)]
    pub logged_artifacts: Vec<String>,
    #[serde(default)]
    pub summary: BTreeMap<String, Value>,
    pub failure: Option<RunFailure>,
}

pub struct RunContext<'r> {
    registry: &'r dyn ArtifactRegistry,
    record: RunRecord,
}

impl<'r> RunContext<'r> {
    /// Start a run and record its full configuration.
    pub fn open<C: Serialize>(registry: &'r dyn ArtifactRegistry, job_type: &str, config: &C) -> Result<Self> {
        let record = RunRecord {
            run_id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            state: RunState::Running,
            config: serde_json::to_value(config)?,
            started_at: Utc::now(),
            finished_at: None,
            used_artifacts: Vec::new(),
            logged_artifacts: Vec::new(),
            summary: BTreeMap::new(),
            failure: None,
        };
        registry.record_run(&record)?;
        info!(run_id = %record.run_id, job_type, "Run opened");
        Ok(Self { registry, record })
    }

    pub fn id(&self) -> Uuid {
        self.record.run_id
    }

    pub fn registry(&self) -> &'r dyn ArtifactRegistry {
        self.registry
    }

    /// Resolve an input artifact and record it as consumed by this run.
    pub fn use_artifact(&mut self, id: &ArtifactId, expected_type: &str) -> Result<ResolvedArtifact> {
        let resolved = self.registry.resolve(id, expected_type)?;
        self.record.used_artifacts.push(resolved.manifest.reference());
        self.registry.record_run(&self.record)?;
        debug!(run_id = %self.record.run_id, artifact = %resolved.manifest.reference(), "Input artifact recorded");
        Ok(resolved)
    }

    /// Publish an artifact under this run and wait until it is durable.
    pub fn log_artifact(&mut self, draft: ArtifactDraft) -> Result<ArtifactManifest> {
        let manifest = self.registry.publish_and_wait(self.record.run_id, draft)?;
        self.record.logged_artifacts.push(manifest.reference());
        self.registry.record_run(&self.record)?;
        Ok(manifest)
    }

    pub fn set_summary(&mut self, key: &str, value: impl Into<Value>) {
        self.record.summary.insert(key.to_string(), value.into());
    }

    pub fn finish(mut self) -> Result<RunRecord> {
        self.record.state = RunState::Finished;
        self.record.finished_at = Some(Utc::now());
        self.registry.record_run(&self.record)?;
        info!(run_id = %self.record.run_id, "Run finished");
        Ok(self.record)
    }

    pub fn fail(mut self, error: &CleaningError) -> Result<RunRecord> {
        self.record.state = RunState::Failed;
        self.record.finished_at = Some(Utc::now());
        self.record.failure = Some(RunFailure {
            phase: error.phase().map(|p| p.to_string()),
            message: error.to_string(),
        });
        self.registry.record_run(&self.record)?;
        info!(run_id = %self.record.run_id, "Run marked failed");
        Ok(self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Phase;
    use std::cell::RefCell;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingRegistry {
        records: RefCell<Vec<RunRecord>>,
    }

    impl ArtifactRegistry for RecordingRegistry {
        fn resolve(&self, id: &ArtifactId, _expected_type: &str) -> Result<ResolvedArtifact> {
            Err(CleaningError::ArtifactNotFound(id.to_string()))
        }

        fn publish_and_wait(&self, _run_id: Uuid, draft: ArtifactDraft) -> Result<ArtifactManifest> {
            Err(CleaningError::ArtifactNotFound(draft.name))
        }

        fn record_run(&self, record: &RunRecord) -> Result<()> {
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn open_records_configuration() {
        let registry = RecordingRegistry::default();
        let ctx = RunContext::open(&registry, "basic_cleaning", &serde_json::json!({"min_price": 10.0})).unwrap();
        let records = registry.records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, RunState::Running);
        assert_eq!(records[0].config["min_price"], 10.0);
        assert_eq!(records[0].run_id, ctx.id());
    }

    #[test]
    fn finish_persists_terminal_state_and_summary() {
        let registry = RecordingRegistry::default();
        let mut ctx = RunContext::open(&registry, "basic_cleaning", &()).unwrap();
        ctx.set_summary("rows_out", 3);
        let record = ctx.finish().unwrap();
        assert_eq!(record.state, RunState::Finished);
        assert!(record.finished_at.is_some());
        assert_eq!(record.summary["rows_out"], 3);
        assert_eq!(registry.records.borrow().last().unwrap(), &record);
    }

    #[test]
    fn fail_records_phase_and_message() {
        let registry = RecordingRegistry::default();
        let mut ctx = RunContext::open(&registry, "basic_cleaning", &()).unwrap();
        let id: ArtifactId = "missing.csv:latest".parse().unwrap();
        let err = ctx.use_artifact(&id, "raw_data").unwrap_err().in_phase(Phase::Load);
        let record = ctx.fail(&err).unwrap();
        assert_eq!(record.state, RunState::Failed);
        let failure = record.failure.unwrap();
        assert_eq!(failure.phase.as_deref(), Some("load"));
        assert!(failure.message.contains("missing.csv:latest"));
        assert!(record.used_artifacts.is_empty());
    }

    #[test]
    fn create_rejects_missing_files() {
        let registry = RecordingRegistry::default();
        let err = registry
            .create("clean.csv", "clean", "d", Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, CleaningError::Io(_)));
    }

    #[test]
    fn create_rejects_blank_artifact_type() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clean.csv");
        std::fs::write(&file, "price\n50\n").unwrap();
        let registry = RecordingRegistry::default();
        let err = registry.create("clean.csv", "  ", "d", &file).unwrap_err();
        assert!(matches!(err, CleaningError::Config(ref m) if m.contains("clean.csv")));
        assert!(registry.create("clean.csv", "clean_sample", "d", &file).is_ok());
    }
}
