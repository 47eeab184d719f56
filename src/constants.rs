/// Job type recorded on every run opened by the cleaning binary
pub const JOB_TYPE: &str = "basic_cleaning";

/// Artifact type the input dataset must be registered under
pub const RAW_DATA_TYPE: &str = "raw_data";

// Columns the cleaning step operates on
pub const PRICE_COLUMN: &str = "price";
pub const LAST_REVIEW_COLUMN: &str = "last_review";

/// Date format written back into `last_review`
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

// Environment variables
pub const ENV_CONFIG_PATH: &str = "CLEANING_CONFIG";
pub const ENV_REGISTRY_ROOT: &str = "CLEANING_REGISTRY_ROOT";
pub const ENV_CACHE_DIR: &str = "CLEANING_CACHE_DIR";
pub const ENV_PUBLISH_TIMEOUT_SECS: &str = "CLEANING_PUBLISH_TIMEOUT_SECS";
pub const ENV_LOG_DIR: &str = "CLEANING_LOG_DIR";
pub const ENV_PUSHGATEWAY_URL: &str = "CLEANING_PUSHGATEWAY_URL";

pub const DEFAULT_CONFIG_FILE: &str = "cleaning.toml";
pub const DEFAULT_REGISTRY_ROOT: &str = "artifacts";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Version stamped into every manifest written by this crate
pub const MANIFEST_VERSION: &str = "1.0.0";
