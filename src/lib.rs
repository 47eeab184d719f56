pub mod cleaning;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod run;
pub mod step;

pub use config::{CleaningArgs, RegistryConfig, RunConfig};
pub use error::{CleaningError, Phase, Result};
pub use registry::{ArtifactId, ArtifactRegistry, FsArtifactRegistry};
pub use run::RunContext;
pub use step::{CleaningOutcome, CleaningStep};
