use crate::cleaning::{drop_price_outliers, normalize_review_dates, DateReport, FilterReport, PriceRange};
use crate::config::RunConfig;
use crate::constants::{LAST_REVIEW_COLUMN, PRICE_COLUMN, RAW_DATA_TYPE};
use crate::dataset::Dataset;
use crate::error::{Phase, PhaseExt, Result};
use crate::metrics;
use crate::registry::ArtifactManifest;
use crate::run::RunContext;
use std::path::PathBuf;
use tracing::{info, info_span, warn};

/// What a successful cleaning run produced.
#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    pub input: String,
    pub output: ArtifactManifest,
    pub output_path: PathBuf,
    pub filter: FilterReport,
    pub dates: DateReport,
}

/// Load, filter, convert, save, publish. The output file is written under
/// `work_dir` using the output artifact name as file name.
pub struct CleaningStep {
    work_dir: PathBuf,
}

impl CleaningStep {
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> Self {
        Self { work_dir: work_dir.into() }
    }

    pub fn run(&self, ctx: &mut RunContext<'_>, config: &RunConfig) -> Result<CleaningOutcome> {
        let span = info_span!("basic_cleaning", run_id = %ctx.id());
        let _enter = span.enter();

        let range = PriceRange::new(config.min_price, config.max_price);
        if range.is_inverted() {
            warn!(
                min_price = config.min_price,
                max_price = config.max_price,
                "min_price is greater than max_price; every row will be dropped"
            );
        }

        // load
        info!("Loading input artifact: {}", config.input_artifact);
        let input = ctx
            .use_artifact(&config.input_artifact, RAW_DATA_TYPE)
            .in_phase(Phase::Load)?;
        let mut dataset = Dataset::from_path(&input.local_path).in_phase(Phase::Load)?;
        let rows_in = dataset.len();
        metrics::rows_loaded(rows_in);
        info!(artifact = %input.manifest.reference(), rows = rows_in, "Input artifact loaded");

        // filter
        info!("Dropping price outliers out of {}-{} range", range.min, range.max);
        let filter = drop_price_outliers(&mut dataset, PRICE_COLUMN, range).in_phase(Phase::Filter)?;
        metrics::filter_applied(&filter);
        info!(kept = filter.kept, dropped = filter.dropped, "Price outliers dropped");

        // convert
        info!("Converting {} to date", LAST_REVIEW_COLUMN);
        let dates = normalize_review_dates(&mut dataset, LAST_REVIEW_COLUMN).in_phase(Phase::Convert)?;
        metrics::dates_converted(&dates);

        // save
        info!("Saving output artifact");
        let output_path = self.work_dir.join(&config.output_artifact);
        dataset.write_to_path(&output_path).in_phase(Phase::Save)?;
        info!(path = %output_path.display(), rows = dataset.len(), "Cleaned table written");

        // publish
        let draft = ctx
            .registry()
            .create(
                &config.output_artifact,
                &config.output_type,
                &config.output_description,
                &output_path,
            )
            .in_phase(Phase::Publish)?
            .with_metadata("input_artifact", input.manifest.reference())
            .with_metadata("min_price", config.min_price)
            .with_metadata("max_price", config.max_price)
            .with_metadata("rows_in", rows_in)
            .with_metadata("rows_out", dataset.len())
            .with_metadata("rows_dropped", filter.dropped)
            .with_metadata("dates_parsed", dates.parsed)
            .with_metadata("dates_missing", dates.missing);
        let output = ctx.log_artifact(draft).in_phase(Phase::Publish)?;
        metrics::artifact_published(&output);

        ctx.set_summary("rows_in", rows_in);
        ctx.set_summary("rows_out", dataset.len());
        ctx.set_summary("output_artifact", output.reference());

        Ok(CleaningOutcome {
            input: input.manifest.reference(),
            output,
            output_path,
            filter,
            dates,
        })
    }
}
