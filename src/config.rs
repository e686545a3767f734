use anyhow::{Context, Result};
use clap::Parser;
use point_service::EngineConfig;
use std::path::{Path, PathBuf};

/// Trait for reading configuration parameters
pub trait Config {
    fn input_path(&self) -> &Path;

    fn audit_path(&self) -> Option<&Path>;

    fn engine_config(&self) -> Result<EngineConfig>;
}

/// CLI configuration
#[derive(Parser, Debug)]
#[command(
    name = "points-ledger",
    about = "Replays point operations from CSV against an audited balance store",
    version
)]
pub struct CliConfig {
    /// Path to the input CSV file containing operations
    #[arg(value_name = "INPUT_FILE")]
    input_file: PathBuf,

    /// TOML file with engine settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Balance granted to a user on their first add (overrides the config file)
    #[arg(long)]
    initial_points: Option<u32>,

    /// Write the audit log as CSV to this file
    #[arg(long, value_name = "FILE")]
    audit_log: Option<PathBuf>,
}

impl Config for CliConfig {
    fn input_path(&self) -> &Path {
        &self.input_file
    }

    fn audit_path(&self) -> Option<&Path> {
        self.audit_log.as_deref()
    }

    fn engine_config(&self) -> Result<EngineConfig> {
        let mut engine_config = match &self.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                parse_engine_config(&content)?
            }
            None => EngineConfig::default(),
        };

        if let Some(initial_points) = self.initial_points {
            engine_config.initial_points = initial_points;
        }

        Ok(engine_config)
    }
}

fn parse_engine_config(content: &str) -> Result<EngineConfig> {
    toml::from_str(content).context("Failed to parse config file")
}
