use crate::constants::*;
use crate::error::{CleaningError, Result};
use crate::registry::{validate_artifact_name, ArtifactId};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A very basic data cleaning: drop price outliers, normalize review dates,
/// publish the result as a new artifact.
#[derive(Parser, Debug, Clone)]
#[command(name = "basic_cleaning")]
#[command(about = "A very basic data cleaning")]
#[command(version)]
pub struct CleaningArgs {
    /// Raw data to be cleaned (name, name:latest or name:vN)
    #[arg(long = "input_artifact", visible_alias = "input-artifact")]
    pub input_artifact: String,

    /// Cleaned data (artifact name and local output file)
    #[arg(long = "output_artifact", visible_alias = "output-artifact")]
    pub output_artifact: String,

    /// Type of output artifact
    #[arg(long = "output_type", visible_alias = "output-type")]
    pub output_type: String,

    /// Description of output artifact
    #[arg(long = "output_description", visible_alias = "output-description")]
    pub output_description: String,

    /// Minimum acceptable price
    #[arg(
        long = "min_price",
        visible_alias = "min-price",
        allow_negative_numbers = true,
        value_parser = parse_price_bound
    )]
    pub min_price: f64,

    /// Maximum acceptable price
    #[arg(
        long = "max_price",
        visible_alias = "max-price",
        allow_negative_numbers = true,
        value_parser = parse_price_bound
    )]
    pub max_price: f64,
}

fn parse_price_bound(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{}' is not a finite number", raw))
    }
}

/// Validated configuration of a single cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub input_artifact: ArtifactId,
    pub output_artifact: String,
    pub output_type: String,
    pub output_description: String,
    pub min_price: f64,
    pub max_price: f64,
}

impl TryFrom<CleaningArgs> for RunConfig {
    type Error = CleaningError;

    fn try_from(args: CleaningArgs) -> Result<Self> {
        let input_artifact: ArtifactId = args.input_artifact.parse()?;
        validate_artifact_name(&args.output_artifact)?;
        if args.output_type.trim().is_empty() {
            return Err(CleaningError::Config("output_type must not be empty".into()));
        }
        for (flag, value) in [("min_price", args.min_price), ("max_price", args.max_price)] {
            if !value.is_finite() {
                return Err(CleaningError::Config(format!("{} must be a finite number", flag)));
            }
        }
        Ok(Self {
            input_artifact,
            output_artifact: args.output_artifact,
            output_type: args.output_type,
            output_description: args.output_description,
            min_price: args.min_price,
            max_price: args.max_price,
        })
    }
}

/// Where the artifact registry lives and how long publishing may block.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub publish_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    registry: RegistrySection,
}

#[derive(Debug, Default, Deserialize)]
struct RegistrySection {
    root: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    publish_timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl RegistryConfig {
    /// Registry rooted at `root` with default cache location and timeouts.
    pub fn at_root<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join("downloads"),
            root,
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Load from the optional TOML file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let file = if explicit || path.exists() {
            Self::read_file(&path)?
        } else {
            ConfigFile::default()
        };

        Self::from_parts(file.registry, |key| std::env::var(key).ok())
    }

    fn read_file(path: &Path) -> Result<ConfigFile> {
        let content = fs::read_to_string(path).map_err(|e| {
            CleaningError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn from_parts(section: RegistrySection, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = env(ENV_REGISTRY_ROOT)
            .map(PathBuf::from)
            .or(section.root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_ROOT));
        let mut config = Self::at_root(root);

        if let Some(cache_dir) = env(ENV_CACHE_DIR).map(PathBuf::from).or(section.cache_dir) {
            config.cache_dir = cache_dir;
        }

        let timeout_secs = match env(ENV_PUBLISH_TIMEOUT_SECS) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                CleaningError::Config(format!("{} must be a whole number of seconds, got '{}'", ENV_PUBLISH_TIMEOUT_SECS, raw))
            })?),
            None => section.publish_timeout_secs,
        };
        if let Some(secs) = timeout_secs {
            config.publish_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = section.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }
}
