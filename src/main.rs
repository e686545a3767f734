mod config;
mod replay;

use anyhow::{Context, Result};
use clap::Parser;
use config::{CliConfig, Config};
use point_service::{EntryFilter, MemoryStore, PointEngine};
use replay::{AuditRow, OperationRow, Replayer, PLUGIN_NAME};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CliConfig::parse();

    replay_operations(&config)?;

    info!("Replay completed successfully");

    Ok(())
}

fn replay_operations<C: Config>(config: &C) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let engine = PointEngine::with_store(store.clone(), config.engine_config()?);
    let mut replayer = Replayer::new(&engine);

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(config.input_path())
        .context("Failed to open input file")?;

    let mut applied = 0;
    let mut rejected = 0;

    for result in reader.deserialize() {
        let row: OperationRow = match result {
            Ok(row) => row,
            Err(e) => {
                warn!("Failed to parse operation: {e}");
                rejected += 1;

                continue;
            }
        };

        if let Err(e) = replayer.apply(row) {
            warn!("Operation rejected: {e}");
            rejected += 1;
        } else {
            applied += 1;
        }
    }

    info!("Applied {applied} operations, rejected {rejected} operations");

    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::WriterBuilder::new().from_writer(handle);

    let account_count = store.account_count();
    if account_count > 0 {
        for entry in engine.top_n(account_count, Some(PLUGIN_NAME))? {
            writer
                .serialize(&entry)
                .context("Failed to serialize account")?;
        }
    }

    writer.flush().context("Failed to flush stdout")?;

    if let Some(path) = config.audit_path() {
        write_audit_log(&engine, path)?;
    }

    Ok(())
}

fn write_audit_log(engine: &PointEngine, path: &Path) -> Result<()> {
    let entries = engine
        .audit()
        .query(&EntryFilter::default())
        .context("Failed to read audit log")?;

    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .context("Failed to create audit log file")?;

    for entry in &entries {
        writer
            .serialize(AuditRow::from(entry))
            .context("Failed to serialize audit entry")?;
    }

    writer.flush().context("Failed to flush audit log")?;

    info!("Wrote {} audit entries to {}", entries.len(), path.display());

    Ok(())
}
