use basic_cleaning::constants::JOB_TYPE;
use basic_cleaning::error::{CleaningError, Phase, PhaseExt};
use basic_cleaning::{logging, metrics};
use basic_cleaning::{CleaningArgs, CleaningStep, FsArtifactRegistry, RegistryConfig, RunConfig, RunContext};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Usage errors exit here with clap's message and status 2
    let args = CleaningArgs::parse();

    let _guard = logging::init_logging();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let phase = e.phase().map(|p| p.as_str()).unwrap_or("unknown");
            error!(phase, error = %e, "Cleaning run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: CleaningArgs) -> Result<(), CleaningError> {
    let config = RunConfig::try_from(args).in_phase(Phase::Configure)?;
    metrics::init_metrics();

    let registry_config = RegistryConfig::load().in_phase(Phase::Configure)?;
    let registry = FsArtifactRegistry::open(registry_config).in_phase(Phase::Configure)?;
    let work_dir = std::env::current_dir().in_phase(Phase::Configure)?;
    let mut ctx = RunContext::open(&registry, JOB_TYPE, &config).in_phase(Phase::Configure)?;
    let instance = ctx.id().to_string();

    let outcome = CleaningStep::new(work_dir).run(&mut ctx, &config);

    let result = match outcome {
        Ok(outcome) => ctx.finish().in_phase(Phase::Finalize).map(|_| {
            info!(
                input = %outcome.input,
                output = %outcome.output.reference(),
                rows_out = outcome.filter.kept,
                "Cleaning run completed"
            );
        }),
        Err(e) => {
            if let Err(record_err) = ctx.fail(&e) {
                warn!(error = %record_err, "Could not record run failure");
            }
            Err(e)
        }
    };

    metrics::run_finished(result.is_ok());
    metrics::push_to_gateway(&instance);
    result
}
