//! Configuration for remote clients and the `promload` binary.
//!
//! Migration settings come from an optional YAML file and from command line
//! flags (or their environment variables). Flags win over the file.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use clap::Parser;
use serde::Deserialize;

use crate::codec::DEFAULT_BUFFER_CAPACITY;
use crate::error::{Error, Result};
use crate::window::TimeRange;

/// Default number of idle connections kept per remote host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Default segment size when none is configured.
pub const DEFAULT_STEP: &str = "1m";

/// Settings for one [`RemoteClient`](crate::RemoteClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote read or remote write endpoint URL.
    pub url: String,

    /// Per-request deadline. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,

    /// Maximum idle pooled connections per host.
    pub pool_max_idle_per_host: usize,

    /// Initial capacity of each staging buffer, in bytes.
    pub initial_buffer_capacity: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            initial_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// CLI arguments for the `promload` binary.
#[derive(Parser, Debug, Default)]
#[command(name = "promload")]
#[command(about = "Copy historical series from a remote read endpoint to a remote write endpoint")]
pub struct CliArgs {
    /// Path to a YAML migration config file
    #[arg(short, long, env = "PROMLOAD_CONFIG_FILE")]
    pub config: Option<String>,

    /// Remote read URL of the source
    #[arg(long, env = "PROMLOAD_SOURCE_URL")]
    pub source_url: Option<String>,

    /// Remote write URL of the destination
    #[arg(long, env = "PROMLOAD_DESTINATION_URL")]
    pub destination_url: Option<String>,

    /// Start of the range (RFC 3339 or Unix seconds)
    #[arg(long, env = "PROMLOAD_START")]
    pub start: Option<String>,

    /// End of the range (RFC 3339 or Unix seconds); defaults to now
    #[arg(long, env = "PROMLOAD_END")]
    pub end: Option<String>,

    /// Size of each read segment, e.g. 15s, 1m, 2h
    #[arg(long, env = "PROMLOAD_STEP")]
    pub step: Option<String>,

    /// Per-request timeout, e.g. 30s
    #[arg(long, env = "PROMLOAD_TIMEOUT")]
    pub timeout: Option<String>,
}

/// Migration settings as written in the YAML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub source: Option<EndpointConfig>,
    #[serde(default)]
    pub destination: Option<EndpointConfig>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
}

/// A remote endpoint in the YAML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Fully validated settings for one migration run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub source: ClientConfig,
    pub destination: ClientConfig,
    pub range: TimeRange,
}

/// Load a migration config from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MigrationConfig> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::InvalidInput(format!("Failed to read config file: {}", e)))?;

    serde_yaml::from_str(&contents)
        .map_err(|e| Error::InvalidInput(format!("Failed to parse config file: {}", e)))
}

impl MigrationConfig {
    /// Merges CLI flags over this file config and validates the result.
    /// `now` is used when no end time is given.
    pub fn resolve(self, args: &CliArgs, now: SystemTime) -> Result<ResolvedConfig> {
        let cli_timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

        let source = endpoint(
            "source",
            args.source_url.as_deref(),
            self.source.as_ref(),
            cli_timeout,
        )?;
        let destination = endpoint(
            "destination",
            args.destination_url.as_deref(),
            self.destination.as_ref(),
            cli_timeout,
        )?;

        let start = args
            .start
            .as_deref()
            .or(self.start.as_deref())
            .ok_or_else(|| Error::InvalidInput("start time is required".to_string()))
            .and_then(parse_timestamp)?;
        let end = match args.end.as_deref().or(self.end.as_deref()) {
            Some(s) => parse_timestamp(s)?,
            None => now,
        };
        let step = parse_duration(
            args.step
                .as_deref()
                .or(self.step.as_deref())
                .unwrap_or(DEFAULT_STEP),
        )?;

        Ok(ResolvedConfig {
            source,
            destination,
            range: TimeRange::new(start, end, step)?,
        })
    }
}

fn endpoint(
    role: &str,
    cli_url: Option<&str>,
    file: Option<&EndpointConfig>,
    cli_timeout: Option<Duration>,
) -> Result<ClientConfig> {
    let url = cli_url
        .or(file.map(|e| e.url.as_str()))
        .ok_or_else(|| Error::InvalidInput(format!("{} URL is required", role)))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::InvalidInput(format!(
            "{} URL must be http or https: {}",
            role, url
        )));
    }

    let file_timeout = file
        .and_then(|e| e.timeout.as_deref())
        .map(parse_duration)
        .transpose()?;

    let mut config = ClientConfig::new(url);
    config.timeout = cli_timeout.or(file_timeout);
    Ok(config)
}

/// Parse a duration such as "15s", "1.5h" or "1h30m". Terms add up; a bare
/// number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let input = s.trim();
    if input.is_empty() {
        return Err(Error::InvalidInput("Empty duration string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let (value, unit, tail) = split_duration_term(rest)
            .ok_or_else(|| Error::InvalidInput(format!("Invalid duration: {}", input)))?;
        let unit_ms = match unit {
            "" if tail.is_empty() && rest == input => 1_000.0,
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            "w" => 604_800_000.0,
            "y" => 31_536_000_000.0,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "Unknown duration unit {:?} in {}",
                    unit, input
                )));
            }
        };
        total = Duration::try_from_secs_f64(value * unit_ms / 1_000.0)
            .ok()
            .and_then(|term| total.checked_add(term))
            .ok_or_else(|| Error::InvalidInput(format!("Duration out of range: {}", input)))?;
        rest = tail;
    }
    Ok(total)
}

/// Splits "1.5h30m" into (1.5, "h", "30m").
fn split_duration_term(s: &str) -> Option<(f64, &str, &str)> {
    let num_len = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let value = s[..num_len].parse::<f64>().ok()?;
    let after = &s[num_len..];
    let unit_len = after
        .find(|c: char| c.is_ascii_digit() || c == '.')
        .unwrap_or(after.len());
    Some((value, &after[..unit_len], &after[unit_len..]))
}

/// Largest Unix time whose millisecond value still fits in an `i64`.
const MAX_UNIX_SECS: f64 = (i64::MAX / 1_000) as f64;

/// Parse an RFC 3339 timestamp or Unix seconds (fractions allowed).
pub fn parse_timestamp(s: &str) -> Result<SystemTime> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<f64>() {
        let out_of_range = || Error::InvalidInput(format!("Invalid Unix timestamp: {}", s));
        if !(0.0..=MAX_UNIX_SECS).contains(&secs) {
            return Err(out_of_range());
        }
        let offset = Duration::try_from_secs_f64(secs).map_err(|_| out_of_range())?;
        return UNIX_EPOCH.checked_add(offset).ok_or_else(out_of_range);
    }

    let parsed = DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp {}: {}", s, e)))?;
    let millis = parsed.timestamp_millis();
    Ok(crate::window::from_millis(millis))
}
