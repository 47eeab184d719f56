use basic_cleaning::constants::{JOB_TYPE, RAW_DATA_TYPE};
use basic_cleaning::dataset::Dataset;
use basic_cleaning::error::{CleaningError, Phase};
use basic_cleaning::registry::{ArtifactManifest, VersionSpec};
use basic_cleaning::run::RunState;
use basic_cleaning::{
    ArtifactId, ArtifactRegistry, CleaningStep, FsArtifactRegistry, RegistryConfig, RunConfig, RunContext,
};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

const SAMPLE: &str = include_str!("resources/listings_sample.csv");

fn registry_at(root: &Path) -> FsArtifactRegistry {
    let mut config = RegistryConfig::at_root(root);
    config.publish_timeout = Duration::from_secs(5);
    config.poll_interval = Duration::from_millis(5);
    FsArtifactRegistry::open(config).unwrap()
}

/// Publish `csv` as a raw_data artifact named `name`, the way an upload step would.
fn seed_raw(registry: &FsArtifactRegistry, scratch: &Path, name: &str, csv: &str) -> ArtifactManifest {
    let file = scratch.join(name);
    fs::write(&file, csv).unwrap();
    let mut ctx = RunContext::open(registry, "download", &serde_json::json!({ "sample": name })).unwrap();
    let draft = registry
        .create(name, RAW_DATA_TYPE, "Raw listings", &file)
        .unwrap();
    let manifest = ctx.log_artifact(draft).unwrap();
    ctx.finish().unwrap();
    manifest
}

fn config(input: &str, min_price: f64, max_price: f64) -> RunConfig {
    RunConfig {
        input_artifact: input.parse().unwrap(),
        output_artifact: "clean_sample.csv".to_string(),
        output_type: "clean_sample".to_string(),
        output_description: "Data with outliers and null values removed".to_string(),
        min_price,
        max_price,
    }
}

struct Fixture {
    dir: TempDir,
    registry: FsArtifactRegistry,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("work")).unwrap();
        fs::create_dir_all(dir.path().join("scratch")).unwrap();
        let registry = registry_at(&dir.path().join("registry"));
        Self { dir, registry }
    }

    fn work_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("work")
    }

    fn seed(&self, name: &str, csv: &str) -> ArtifactManifest {
        seed_raw(&self.registry, &self.dir.path().join("scratch"), name, csv)
    }
}

fn read_output(path: &Path) -> Dataset {
    Dataset::from_path(path).unwrap()
}

#[test]
fn keeps_rows_within_price_range() {
    let fx = Fixture::new();
    fx.seed("prices.csv", "id,price,last_review\n1,5,2019-01-01\n2,50,2019-01-02\n3,500,2019-01-03\n4,,2019-01-04\n");

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &config("prices.csv", 10.0, 100.0)).unwrap();
    let outcome = CleaningStep::new(fx.work_dir())
        .run(&mut ctx, &config("prices.csv", 10.0, 100.0))
        .unwrap();
    ctx.finish().unwrap();

    let out = read_output(&outcome.output_path);
    let ids: Vec<&str> = out.column("id").unwrap().collect();
    assert_eq!(ids, vec!["2"]);
    assert_eq!(outcome.filter.kept, 1);
    assert_eq!(outcome.filter.dropped, 3);
}

#[test]
fn cleans_listings_sample_end_to_end() {
    let fx = Fixture::new();
    let raw = fx.seed("sample.csv", SAMPLE);
    let cfg = config("sample.csv:latest", 10.0, 350.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let run_id = ctx.id();
    let outcome = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap();
    let record = ctx.finish().unwrap();

    // 9 and 1500 are out of range, one price is missing
    assert_eq!(outcome.filter.rows_in, 12);
    assert_eq!(outcome.filter.kept, 9);
    assert_eq!(outcome.filter.unparsable, 1);
    assert_eq!(outcome.filter.kept + outcome.filter.dropped, outcome.filter.rows_in);
    assert_eq!(outcome.dates.parsed, 7);
    assert_eq!(outcome.dates.missing, 2);
    assert_eq!(outcome.dates.coerced, 1);

    let out = read_output(&outcome.output_path);
    let input = Dataset::from_reader(SAMPLE.as_bytes()).unwrap();
    assert_eq!(out.headers(), input.headers());
    let dates: Vec<&str> = out.column("last_review").unwrap().collect();
    assert_eq!(
        dates,
        vec![
            "2018-10-19",
            "2019-05-21",
            "",
            "2019-07-05",
            "2018-11-19",
            "2019-06-22",
            "2017-10-05",
            "2019-06-24",
            "",
        ]
    );
    // untouched cells come through verbatim
    let names: Vec<&str> = out.column("name").unwrap().collect();
    assert_eq!(names[2], "THE VILLAGE OF HARLEM....NEW YORK !");

    let published = &outcome.output;
    assert_eq!(published.reference(), "clean_sample.csv:v0");
    assert_eq!(published.artifact_type, "clean_sample");
    assert_eq!(published.description, "Data with outliers and null values removed");
    assert_eq!(published.run_id, run_id);
    assert_eq!(published.metadata["input_artifact"], raw.reference());
    assert_eq!(published.metadata["rows_out"], 9);

    assert_eq!(record.state, RunState::Finished);
    assert_eq!(record.used_artifacts, vec![raw.reference()]);
    assert_eq!(record.logged_artifacts, vec![published.reference()]);
    assert_eq!(record.summary["rows_in"], 12);
    assert_eq!(record.config["min_price"], 10.0);

    let stored = fx.registry.run_record(run_id).unwrap().unwrap();
    assert_eq!(stored, record);
}

#[test]
fn published_output_resolves_to_written_bytes() {
    let fx = Fixture::new();
    fx.seed("sample.csv", SAMPLE);
    let cfg = config("sample.csv", 10.0, 350.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let outcome = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap();
    ctx.finish().unwrap();

    let id = ArtifactId::latest("clean_sample.csv").unwrap();
    assert_eq!(id.version(), VersionSpec::Latest);
    let resolved = fx.registry.resolve(&id, "clean_sample").unwrap();
    assert_eq!(
        fs::read(&resolved.local_path).unwrap(),
        fs::read(&outcome.output_path).unwrap()
    );
}

#[test]
fn iso_review_date_is_preserved() {
    let fx = Fixture::new();
    fx.seed("one.csv", "id,price,last_review\n2595,225,2019-05-21\n");
    let cfg = config("one.csv", 10.0, 350.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let outcome = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap();

    let out = read_output(&outcome.output_path);
    let dates: Vec<&str> = out.column("last_review").unwrap().collect();
    assert_eq!(dates, vec!["2019-05-21"]);
}

#[test]
fn empty_review_date_becomes_missing_not_error() {
    let fx = Fixture::new();
    fx.seed("one.csv", "id,price,last_review\n3647,150,\n");
    let cfg = config("one.csv", 10.0, 350.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let outcome = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap();

    let out = read_output(&outcome.output_path);
    assert_eq!(out.len(), 1);
    let dates: Vec<&str> = out.column("last_review").unwrap().collect();
    assert_eq!(dates, vec![""]);
    assert_eq!(outcome.dates.missing, 1);
    assert_eq!(outcome.dates.coerced, 0);
}

#[test]
fn unknown_input_fails_in_load_and_publishes_nothing() {
    let fx = Fixture::new();
    let cfg = config("missing.csv:latest", 10.0, 350.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let run_id = ctx.id();
    let err = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Load));
    assert!(matches!(err.root(), CleaningError::ArtifactNotFound(_)));

    let record = ctx.fail(&err).unwrap();
    assert_eq!(record.state, RunState::Failed);
    assert_eq!(record.failure.unwrap().phase.as_deref(), Some("load"));
    assert_eq!(fx.registry.run_record(run_id).unwrap().unwrap().state, RunState::Failed);

    assert!(fx.registry.versions("clean_sample.csv").unwrap().is_empty());
    assert!(!fx.work_dir().join("clean_sample.csv").exists());
}

#[test]
fn input_of_wrong_type_is_rejected() {
    let fx = Fixture::new();
    let file = fx.dir.path().join("scratch").join("model.bin");
    fs::write(&file, b"weights").unwrap();
    let mut seed = RunContext::open(&fx.registry, "train", &serde_json::json!({})).unwrap();
    let draft = fx.registry.create("model.bin", "model", "", &file).unwrap();
    seed.log_artifact(draft).unwrap();
    seed.finish().unwrap();

    let cfg = config("model.bin", 10.0, 350.0);
    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let err = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Load));
    assert!(matches!(err.root(), CleaningError::TypeMismatch { .. }));
}

#[test]
fn all_rows_out_of_range_still_publishes_header_only_table() {
    let fx = Fixture::new();
    fx.seed("sample.csv", SAMPLE);
    let cfg = config("sample.csv", 10_000.0, 20_000.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let outcome = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap();
    ctx.finish().unwrap();

    assert_eq!(outcome.filter.kept, 0);
    let out = read_output(&outcome.output_path);
    assert!(out.is_empty());
    assert_eq!(out.headers(), Dataset::from_reader(SAMPLE.as_bytes()).unwrap().headers());
    assert_eq!(fx.registry.versions("clean_sample.csv").unwrap(), vec![0]);
    assert!(outcome.output.payload.size_bytes > 0);
}

#[test]
fn missing_price_column_fails_in_filter() {
    let fx = Fixture::new();
    fx.seed("noprice.csv", "id,last_review\n1,2019-01-01\n");
    let cfg = config("noprice.csv", 10.0, 350.0);

    let mut ctx = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let err = CleaningStep::new(fx.work_dir()).run(&mut ctx, &cfg).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Filter));
    assert!(matches!(err.root(), CleaningError::MissingColumn(c) if c == "price"));
    assert!(fx.registry.versions("clean_sample.csv").unwrap().is_empty());
}

#[test]
fn rerun_with_same_input_dedupes_against_previous_version() {
    let fx = Fixture::new();
    fx.seed("sample.csv", SAMPLE);
    let cfg = config("sample.csv", 10.0, 350.0);

    let mut first = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let a = CleaningStep::new(fx.work_dir()).run(&mut first, &cfg).unwrap();
    first.finish().unwrap();

    let mut second = RunContext::open(&fx.registry, JOB_TYPE, &cfg).unwrap();
    let b = CleaningStep::new(fx.work_dir()).run(&mut second, &cfg).unwrap();
    second.finish().unwrap();

    assert_eq!(a.output.version, 0);
    assert_eq!(b.output.version, 1);
    assert_eq!(a.output.payload_ref, b.output.payload_ref);
    assert_eq!(a.output.dedupe_of, None);
    assert_eq!(b.output.dedupe_of.as_deref(), Some("clean_sample.csv:v0"));

    let published: Vec<String> = fx
        .registry
        .ledger_entries()
        .unwrap()
        .into_iter()
        .map(|e| e.reference)
        .collect();
    assert_eq!(published, vec!["sample.csv:v0", "clean_sample.csv:v0", "clean_sample.csv:v1"]);
}

fn cleaning_command(fx: &Fixture) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_basic_cleaning"));
    cmd.current_dir(fx.work_dir())
        .env("CLEANING_REGISTRY_ROOT", fx.dir.path().join("registry"))
        .env("CLEANING_LOG_DIR", fx.dir.path().join("logs"))
        .env("CLEANING_PUBLISH_TIMEOUT_SECS", "5")
        .env_remove("CLEANING_CONFIG")
        .env_remove("CLEANING_CACHE_DIR")
        .env_remove("CLEANING_PUSHGATEWAY_URL");
    cmd
}

const CLI_ARGS: [&str; 8] = [
    "--output_artifact",
    "clean_sample.csv",
    "--output_type",
    "clean_sample",
    "--output_description",
    "Data with outliers and null values removed",
    "--min_price",
    "10",
];

#[test]
fn binary_cleans_and_publishes() {
    let fx = Fixture::new();
    fx.seed("sample.csv", SAMPLE);

    let status = cleaning_command(&fx)
        .args(["--input_artifact", "sample.csv:latest"])
        .args(CLI_ARGS)
        .args(["--max_price", "350"])
        .status()
        .unwrap();

    assert!(status.success());
    assert!(fx.work_dir().join("clean_sample.csv").exists());
    assert_eq!(fx.registry.versions("clean_sample.csv").unwrap(), vec![0]);
}

#[test]
fn binary_exits_non_zero_for_unknown_input() {
    let fx = Fixture::new();

    let status = cleaning_command(&fx)
        .args(["--input_artifact", "nothing_here.csv"])
        .args(CLI_ARGS)
        .args(["--max_price", "350"])
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(fx.registry.versions("clean_sample.csv").unwrap().is_empty());
}

#[test]
fn binary_rejects_malformed_price_before_any_io() {
    let fx = Fixture::new();

    let status = cleaning_command(&fx)
        .args(["--input_artifact", "sample.csv"])
        .args(CLI_ARGS)
        .args(["--max_price", "lots"])
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(2));
    assert!(!fx.dir.path().join("registry").join("runs").exists());
}
