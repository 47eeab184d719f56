use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stage of a cleaning run, used to tag failures in logs and run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configure,
    Load,
    Filter,
    Convert,
    Save,
    Publish,
    Finalize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Configure => "configure",
            Phase::Load => "load",
            Phase::Filter => "filter",
            Phase::Convert => "convert",
            Phase::Save => "save",
            Phase::Publish => "publish",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Input table has no header row: {0}")]
    EmptyTable(String),

    #[error("Invalid artifact identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact '{reference}' has type '{actual}', expected '{expected}'")]
    TypeMismatch {
        reference: String,
        expected: String,
        actual: String,
    },

    #[error("Checksum mismatch for {payload_ref}: stored content hashes to {actual}")]
    ChecksumMismatch { payload_ref: String, actual: String },

    #[error("Timed out after {timeout:?} waiting for artifact '{reference}' to persist")]
    PublishTimeout { reference: String, timeout: Duration },

    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<CleaningError>,
    },
}

impl CleaningError {
    /// Phase the error was raised in, if it has been tagged.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            CleaningError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The underlying error with any phase tag stripped.
    pub fn root(&self) -> &CleaningError {
        match self {
            CleaningError::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            // keep the innermost tag, it names where the failure happened
            tagged @ CleaningError::Phase { .. } => tagged,
            other => CleaningError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }
}

pub trait PhaseExt<T> {
    fn in_phase(self, phase: Phase) -> Result<T>;
}

impl<T, E: Into<CleaningError>> PhaseExt<T> for std::result::Result<T, E> {
    fn in_phase(self, phase: Phase) -> Result<T> {
        self.map_err(|e| e.into().in_phase(phase))
    }
}

pub type Result<T> = std::result::Result<T, CleaningError>;
