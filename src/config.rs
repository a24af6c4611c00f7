use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Container watched for source uploads.
    pub raw_container: String,
}

/// What the binary should do after loading config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Serve the HTTP host.
    Serve,
    /// Apply the schema and exit.
    Migrate,
    /// Process one local file under the given source name and exit.
    Once { input: PathBuf, name: String },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Resizes uploaded images into per-user derivatives")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_RESIZER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_RESIZER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides IMAGE_RESIZER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IMAGE_RESIZER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Raw-uploads container (overrides IMAGE_RESIZER_RAW_CONTAINER)
    #[arg(long)]
    pub raw_container: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Process this file once and exit (requires --name)
    #[arg(long, requires = "name")]
    pub input: Option<PathBuf>,

    /// Source name for --input, e.g. `12345678:user:avatar:png:32:dog.png`
    #[arg(long, requires = "input")]
    pub name: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = env::var("IMAGE_RESIZER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("IMAGE_RESIZER_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing IMAGE_RESIZER_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading IMAGE_RESIZER_PORT"),
        };
        let env_storage =
            env::var("IMAGE_RESIZER_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("IMAGE_RESIZER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/image_resizer.db".into());
        let env_raw =
            env::var("IMAGE_RESIZER_RAW_CONTAINER").unwrap_or_else(|_| "raw-images".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            raw_container: args.raw_container.unwrap_or(env_raw),
        };

        let mode = match (args.migrate, args.input, args.name) {
            (true, _, _) => RunMode::Migrate,
            (false, Some(input), Some(name)) => RunMode::Once { input, name },
            _ => RunMode::Serve,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
