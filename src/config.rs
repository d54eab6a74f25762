use crate::services::policy::{AdmissionPolicy, BYTES_PER_MB};
use anyhow::{Context, Result, ensure};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub max_size_mb: u64,
    pub allowed_mime_regex: String,
    pub fetch_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Link snapshot capture and storage service")]
pub struct Args {
    /// Host to bind to (overrides LEENKZ_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LEENKZ_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where snapshot payloads are stored (overrides LEENKZ_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides LEENKZ_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum snapshot size in MiB (overrides SNAPSHOT_MAX_SIZE_MB)
    #[arg(long)]
    pub max_size_mb: Option<u64>,

    /// Regex matched from the start of a MIME type to admit it (overrides SNAPSHOT_ALLOWED_MIME_REGEX)
    #[arg(long)]
    pub allowed_mime_regex: Option<String>,

    /// Whole-fetch timeout in seconds (overrides SNAPSHOT_FETCH_TIMEOUT_SECS)
    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::resolve(Args::parse(), |key| env::var(key))
    }

    fn resolve(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<(Self, bool)> {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|_| default.into());

        let cfg = Self {
            host: args.host.unwrap_or_else(|| env_or("LEENKZ_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => parse_env(&lookup, "LEENKZ_PORT", 3000)?,
            },
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("LEENKZ_STORAGE_DIR", "./data/snapshots")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or("LEENKZ_DATABASE_URL", "sqlite://./data/meta/leenkz.db")
            }),
            max_size_mb: match args.max_size_mb {
                Some(mb) => mb,
                None => parse_env(&lookup, "SNAPSHOT_MAX_SIZE_MB", 25)?,
            },
            allowed_mime_regex: args
                .allowed_mime_regex
                .unwrap_or_else(|| env_or("SNAPSHOT_ALLOWED_MIME_REGEX", ".*")),
            fetch_timeout_secs: match args.fetch_timeout_secs {
                Some(secs) => secs,
                None => parse_env(&lookup, "SNAPSHOT_FETCH_TIMEOUT_SECS", 30)?,
            },
        };

        ensure!(cfg.max_size_mb > 0, "maximum snapshot size must be at least 1 MiB");
        ensure!(cfg.fetch_timeout_secs > 0, "fetch timeout must be at least 1 second");
        cfg.admission_policy()?;

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn admission_policy(&self) -> Result<AdmissionPolicy> {
        let max_bytes = self
            .max_size_mb
            .checked_mul(BYTES_PER_MB)
            .context("maximum snapshot size overflows")?;
        AdmissionPolicy::new(max_bytes, &self.allowed_mime_regex).with_context(|| {
            format!("compiling allowed MIME regex `{}`", self.allowed_mime_regex)
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_env<T>(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(argv: &[&str], vars: &[(&str, &str)]) -> Result<(AppConfig, bool)> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args = Args::parse_from(std::iter::once("leenkz-snapshot-store").chain(argv.iter().copied()));
        AppConfig::resolve(args, |key| vars.get(key).cloned().ok_or(env::VarError::NotPresent))
    }

    #[test]
    fn defaults_apply_without_input() {
        let (cfg, migrate) = resolve(&[], &[]).unwrap();
        assert!(!migrate);
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.max_size_mb, 25);
        assert_eq!(cfg.allowed_mime_regex, ".*");
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.admission_policy().unwrap().max_size_bytes(), 25 * 1024 * 1024);
    }

    #[test]
    fn flags_override_environment() {
        let (cfg, migrate) = resolve(
            &["--port", "8080", "--max-size-mb", "2", "--migrate"],
            &[
                ("LEENKZ_PORT", "9000"),
                ("SNAPSHOT_MAX_SIZE_MB", "10"),
                ("SNAPSHOT_ALLOWED_MIME_REGEX", "text/.*"),
            ],
        )
        .unwrap();
        assert!(migrate);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_size_mb, 2);
        assert_eq!(cfg.allowed_mime_regex, "text/.*");
    }

    #[test]
    fn malformed_values_fail_loudly() {
        assert!(resolve(&[], &[("SNAPSHOT_MAX_SIZE_MB", "lots")]).is_err());
        assert!(resolve(&[], &[("SNAPSHOT_MAX_SIZE_MB", "0")]).is_err());
        assert!(resolve(&[], &[("SNAPSHOT_ALLOWED_MIME_REGEX", "text/(")]).is_err());
        assert!(resolve(&["--fetch-timeout-secs", "0"], &[]).is_err());
    }
}
