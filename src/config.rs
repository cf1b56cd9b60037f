use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Relational engine backing the metadata store. Resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatabaseDialect {
    Sqlite,
}

impl FromStr for DatabaseDialect {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DatabaseDialect::Sqlite),
            other => bail!("unsupported database dialect `{}`", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub dialect: DatabaseDialect,
    /// Upper bound applied to S3 `max-keys`.
    pub s3_max_keys: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Single-node object store with native and S3-compatible APIs")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides OBJECT_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Database dialect (overrides OBJECT_STORE_DATABASE_DIALECT)
    #[arg(long, value_enum)]
    pub dialect: Option<DatabaseDialect>,

    /// Ceiling for S3 list max-keys (overrides OBJECT_STORE_S3_MAX_KEYS)
    #[arg(long)]
    pub s3_max_keys: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("OBJECT_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("OBJECT_STORE_PORT", 3000u16)?;
        let env_storage =
            env::var("OBJECT_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("OBJECT_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_store.db".into());
        let env_dialect = parse_env("OBJECT_STORE_DATABASE_DIALECT", DatabaseDialect::Sqlite)?;
        let env_max_keys = parse_env("OBJECT_STORE_S3_MAX_KEYS", 1000usize)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            dialect: args.dialect.unwrap_or(env_dialect),
            s3_max_keys: args.s3_max_keys.unwrap_or(env_max_keys),
        };

        if cfg.s3_max_keys == 0 {
            bail!("s3 max-keys ceiling must be at least 1");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable, falling back to
/// `default` when it is unset.
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_parses_known_names_only() {
        assert_eq!(
            "SQLite".parse::<DatabaseDialect>().unwrap(),
            DatabaseDialect::Sqlite
        );
        assert!("postgres".parse::<DatabaseDialect>().is_err());
    }

    #[test]
    fn args_override_parse() {
        let args = Args::parse_from([
            "bucketd",
            "--port",
            "9000",
            "--dialect",
            "sqlite",
            "--s3-max-keys",
            "250",
            "--migrate",
        ]);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.dialect, Some(DatabaseDialect::Sqlite));
        assert_eq!(args.s3_max_keys, Some(250));
        assert!(args.migrate);
    }
}
