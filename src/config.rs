/*!
 * Configuration types for the audit exporter
 *
 * All settings are read from the process environment once at startup.
 * Variable names match the ones the exporter has always used, so existing
 * deployments keep working.
 */

use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ExportError, Result};

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_ORG: &str = "GITHUB_ORG";
pub const ENV_GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const ENV_BUCKET_NAME: &str = "BUCKET_NAME";
pub const ENV_FOLDER_PREFIX: &str = "FOLDER_PREFIX";
pub const ENV_BOOKMARK_TABLE: &str = "BOOKMARK_TABLE";
pub const ENV_BOOKMARK_LOOKBACK_DAYS: &str = "BOOKMARK_LOOKBACK_DAYS";
pub const ENV_TIME_ZONE: &str = "TIME_ZONE";
pub const ENV_OPTION_INCLUDE: &str = "AUDIT_LOG_OPTION_INCLUDE";
pub const ENV_OPTION_ORDER: &str = "AUDIT_LOG_OPTION_ORDER";
pub const ENV_OPTION_PER_PAGE: &str = "AUDIT_LOG_OPTION_PER_PAGE";
pub const ENV_OPTION_PHRASE: &str = "AUDIT_LOG_OPTION_PHRASE";
/// Misspelled name accepted for older deployments
pub const ENV_OPTION_PHRASE_LEGACY: &str = "AUDIT_LOG_OPTION_PRHASE";
pub const ENV_WINDOW_MINUTES: &str = "EXPORT_WINDOW_MINUTES";
pub const ENV_ARCHIVE_COMPRESSION: &str = "ARCHIVE_COMPRESSION";
pub const ENV_S3_ENDPOINT_URL: &str = "S3_ENDPOINT_URL";
pub const ENV_S3_FORCE_PATH_STYLE: &str = "S3_FORCE_PATH_STYLE";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_FOLDER_PREFIX: &str = "Github/Audit";
pub const DEFAULT_INCLUDE: &str = "web";
pub const DEFAULT_PER_PAGE: u32 = 30;
pub const DEFAULT_WINDOW_MINUTES: i64 = 60;
/// Longest window; one daily checkpoint partition
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Complete exporter configuration
#[derive(Debug)]
pub struct ExporterConfig {
    /// Audit log source settings
    pub source: SourceConfig,

    /// Archive destination settings
    pub archive: ArchiveConfig,

    /// Checkpoint table settings
    pub checkpoint: CheckpointConfig,

    /// Length of each export window
    pub window: chrono::Duration,

    /// Timezone used for checkpoint partitions and archive key segments
    pub time_zone: Tz,

    /// Log output format
    pub log_format: LogFormat,
}

/// Audit log source (GitHub organization audit log)
#[derive(Debug)]
pub struct SourceConfig {
    /// Base API URL; override for GitHub Enterprise Server
    pub api_url: String,

    /// Access token with `read:audit_log` scope
    pub token: SecretString,

    /// Organization whose audit log is exported
    pub org: String,

    /// Event category filter (`web`, `git`, `all`)
    pub include: String,

    /// Sort order requested from the API
    pub order: SortOrder,

    /// Page size hint
    pub per_page: u32,

    /// Extra search phrase appended after the time range
    pub phrase: Option<String>,

    /// Per-request timeout, applied to the GitHub, S3 and DynamoDB clients
    pub timeout: Duration,
}

/// Archive destination (S3 bucket and key prefix)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub bucket: String,

    /// Key prefix, without trailing slash
    pub prefix: String,

    pub compression: CompressionType,

    /// S3-compatible endpoint (MinIO, LocalStack)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,
}

/// Checkpoint table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub table: String,

    /// Earlier daily partitions consulted when today's has no checkpoint
    #[serde(default)]
    pub lookback_days: u32,
}

/// Sort order for audit log queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ExportError::Config(format!(
                "{} must be 'asc' or 'desc', got '{}'",
                ENV_OPTION_ORDER, other
            ))),
        }
    }
}

/// Compression applied to archive objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// LZ4 frame compression (fast)
    Lz4,

    /// Zstd compression with level (1-22)
    #[serde(rename = "zstd")]
    Zstd { level: i32 },
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::Zstd {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

impl std::str::FromStr for CompressionType {
    type Err = ExportError;

    /// Accepts `lz4`, `zstd` or `zstd:<level>`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "lz4" => Ok(CompressionType::Lz4),
            None if s == "zstd" => Ok(CompressionType::default()),
            Some(("zstd", level)) => {
                let level: i32 = level.parse().map_err(|_| {
                    ExportError::Config(format!("Invalid zstd level '{}'", level))
                })?;
                if !(1..=22).contains(&level) {
                    return Err(ExportError::Config(format!(
                        "zstd level must be between 1 and 22, got {}",
                        level
                    )));
                }
                Ok(CompressionType::Zstd { level })
            }
            _ => Err(ExportError::Config(format!(
                "{} must be 'zstd', 'zstd:<level>' or 'lz4', got '{}'",
                ENV_ARCHIVE_COMPRESSION, s
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Compact,

    /// One JSON object per line, for log aggregators
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ExportError::Config(format!(
                "{} must be 'compact' or 'json', got '{}'",
                ENV_LOG_FORMAT, other
            ))),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = [
            ENV_GITHUB_TOKEN,
            ENV_GITHUB_ORG,
            ENV_BUCKET_NAME,
            ENV_BOOKMARK_TABLE,
        ]
        .into_iter()
        .filter(|key| get(key).is_none())
        .collect();
        if !missing.is_empty() {
            return Err(ExportError::Config(format!(
                "You need to specify a non-empty value for the environment variables {}",
                missing.join(", ")
            )));
        }

        let time_zone = match get(ENV_TIME_ZONE) {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ExportError::Config(format!("could not set timezone: {}", name)))?,
            None => Tz::UTC,
        };

        let per_page = match get(ENV_OPTION_PER_PAGE) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => {
                    warn!(
                        value = %raw,
                        "could not convert per page option, using default value {}",
                        DEFAULT_PER_PAGE
                    );
                    DEFAULT_PER_PAGE
                }
            },
            None => DEFAULT_PER_PAGE,
        };

        let window_minutes = parse_or(&get, ENV_WINDOW_MINUTES, DEFAULT_WINDOW_MINUTES)?;
        let window = chrono::Duration::try_minutes(window_minutes).ok_or_else(|| {
            ExportError::Config(format!("{} is out of range", ENV_WINDOW_MINUTES))
        })?;

        let timeout_secs = parse_or(&get, ENV_HTTP_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS)?;
        let lookback_days = parse_or(&get, ENV_BOOKMARK_LOOKBACK_DAYS, 0u32)?;
        let force_path_style = parse_or(&get, ENV_S3_FORCE_PATH_STYLE, false)?;

        let config = ExporterConfig {
            source: SourceConfig {
                api_url: get(ENV_GITHUB_API_URL)
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                token: SecretString::from(get(ENV_GITHUB_TOKEN).unwrap_or_default()),
                org: get(ENV_GITHUB_ORG).unwrap_or_default(),
                include: get(ENV_OPTION_INCLUDE).unwrap_or_else(|| DEFAULT_INCLUDE.to_string()),
                order: get(ENV_OPTION_ORDER)
                    .map(|raw| raw.parse::<SortOrder>())
                    .transpose()?
                    .unwrap_or_default(),
                per_page,
                phrase: get(ENV_OPTION_PHRASE).or_else(|| get(ENV_OPTION_PHRASE_LEGACY)),
                timeout: Duration::from_secs(timeout_secs),
            },
            archive: ArchiveConfig {
                bucket: get(ENV_BUCKET_NAME).unwrap_or_default(),
                prefix: get(ENV_FOLDER_PREFIX)
                    .map(|p| p.trim_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_FOLDER_PREFIX.to_string()),
                compression: get(ENV_ARCHIVE_COMPRESSION)
                    .map(|raw| raw.parse::<CompressionType>())
                    .transpose()?
                    .unwrap_or_default(),
                endpoint: get(ENV_S3_ENDPOINT_URL),
                force_path_style,
            },
            checkpoint: CheckpointConfig {
                table: get(ENV_BOOKMARK_TABLE).unwrap_or_default(),
                lookback_days,
            },
            window,
            time_zone,
            log_format: get(ENV_LOG_FORMAT)
                .map(|raw| raw.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.window <= chrono::Duration::zero()
            || self.window > chrono::Duration::minutes(MAX_WINDOW_MINUTES)
        {
            return Err(ExportError::Config(format!(
                "{} must be between 1 and {}",
                ENV_WINDOW_MINUTES, MAX_WINDOW_MINUTES
            )));
        }

        if self.source.timeout.is_zero() {
            return Err(ExportError::Config(format!(
                "{} must be positive",
                ENV_HTTP_TIMEOUT_SECS
            )));
        }

        url::Url::parse(&self.source.api_url).map_err(|e| {
            ExportError::Config(format!("Invalid {} '{}': {}", ENV_GITHUB_API_URL, self.source.api_url, e))
        })?;

        if self.archive.prefix.is_empty() {
            return Err(ExportError::Config(format!(
                "{} must not be only slashes",
                ENV_FOLDER_PREFIX
            )));
        }

        Ok(())
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ExportError::Config(format!("Invalid value for {}: '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (ENV_GITHUB_TOKEN, "ghp_test"),
            (ENV_GITHUB_ORG, "acme"),
            (ENV_BUCKET_NAME, "acme-audit"),
            (ENV_BOOKMARK_TABLE, "audit-bookmarks"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<ExporterConfig> {
        ExporterConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.source.api_url, DEFAULT_API_URL);
        assert_eq!(config.source.token.expose_secret(), "ghp_test");
        assert_eq!(config.source.org, "acme");
        assert_eq!(config.source.include, "web");
        assert_eq!(config.source.order, SortOrder::Desc);
        assert_eq!(config.source.per_page, 30);
        assert!(config.source.phrase.is_none());
        assert_eq!(config.archive.prefix, "Github/Audit");
        assert_eq!(config.archive.compression, CompressionType::Zstd { level: 3 });
        assert_eq!(config.checkpoint.lookback_days, 0);
        assert_eq!(config.window, chrono::Duration::hours(1));
        assert_eq!(config.time_zone, Tz::UTC);
        assert_eq!(config.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_missing_required_values_are_listed() {
        let mut vars = required();
        vars.remove(ENV_GITHUB_ORG);
        vars.insert(ENV_BOOKMARK_TABLE, "  ");

        let err = load(&vars).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GITHUB_ORG"));
        assert!(message.contains("BOOKMARK_TABLE"));
        assert!(!message.contains("BUCKET_NAME"));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn test_s3_compatible_endpoint() {
        let mut vars = required();
        vars.insert(ENV_S3_ENDPOINT_URL, "http://localhost:9000");
        vars.insert(ENV_S3_FORCE_PATH_STYLE, "true");

        let config = load(&vars).unwrap();
        assert_eq!(config.archive.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.archive.force_path_style);

        vars.insert(ENV_S3_FORCE_PATH_STYLE, "sometimes");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_bad_timezone_is_fatal() {
        let mut vars = required();
        vars.insert(ENV_TIME_ZONE, "Mars/Olympus_Mons");

        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("could not set timezone"));
    }

    #[test]
    fn test_timezone_override() {
        let mut vars = required();
        vars.insert(ENV_TIME_ZONE, "Europe/Berlin");

        let config = load(&vars).unwrap();
        assert_eq!(config.time_zone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_unparsable_per_page_falls_back() {
        let mut vars = required();
        vars.insert(ENV_OPTION_PER_PAGE, "lots");
        assert_eq!(load(&vars).unwrap().source.per_page, DEFAULT_PER_PAGE);

        vars.insert(ENV_OPTION_PER_PAGE, "100");
        assert_eq!(load(&vars).unwrap().source.per_page, 100);
    }

    #[test]
    fn test_legacy_phrase_variable() {
        let mut vars = required();
        vars.insert(ENV_OPTION_PHRASE_LEGACY, "action:repo.create");
        assert_eq!(
            load(&vars).unwrap().source.phrase.as_deref(),
            Some("action:repo.create")
        );

        vars.insert(ENV_OPTION_PHRASE, "actor:octocat");
        assert_eq!(
            load(&vars).unwrap().source.phrase.as_deref(),
            Some("actor:octocat")
        );
    }

    #[test]
    fn test_invalid_order_rejected() {
        let mut vars = required();
        vars.insert(ENV_OPTION_ORDER, "sideways");
        assert!(load(&vars).is_err());

        vars.insert(ENV_OPTION_ORDER, "ASC");
        assert_eq!(load(&vars).unwrap().source.order, SortOrder::Asc);
    }

    #[test]
    fn test_window_must_be_positive() {
        let mut vars = required();
        vars.insert(ENV_WINDOW_MINUTES, "0");
        assert!(load(&vars).is_err());

        vars.insert(ENV_WINDOW_MINUTES, "15");
        assert_eq!(load(&vars).unwrap().window, chrono::Duration::minutes(15));
    }

    #[test]
    fn test_window_longer_than_a_day_rejected() {
        let mut vars = required();
        vars.insert(ENV_WINDOW_MINUTES, "153722867280912");
        let err = load(&vars).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert!(err.to_string().contains(ENV_WINDOW_MINUTES));

        vars.insert(ENV_WINDOW_MINUTES, "1441");
        assert!(load(&vars).is_err());

        vars.insert(ENV_WINDOW_MINUTES, "1440");
        assert_eq!(load(&vars).unwrap().window, chrono::Duration::days(1));
    }

    #[test]
    fn test_compression_parsing() {
        assert_eq!("lz4".parse::<CompressionType>().unwrap(), CompressionType::Lz4);
        assert_eq!(
            "zstd:19".parse::<CompressionType>().unwrap(),
            CompressionType::Zstd { level: 19 }
        );
        assert!("zstd:40".parse::<CompressionType>().is_err());
        assert!("gzip".parse::<CompressionType>().is_err());
    }

    #[test]
    fn test_prefix_and_api_url_are_normalized() {
        let mut vars = required();
        vars.insert(ENV_FOLDER_PREFIX, "/audit/github/");
        vars.insert(ENV_GITHUB_API_URL, "https://ghe.example.com/api/v3/");

        let config = load(&vars).unwrap();
        assert_eq!(config.archive.prefix, "audit/github");
        assert_eq!(config.source.api_url, "https://ghe.example.com/api/v3");
    }
}
