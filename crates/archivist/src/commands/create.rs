//! Create command

use anyhow::{Context, Result};
use archivist_backup::{ArtifactStrategy, BackupOptions};
use archivist_core::ArtifactKind;
use camino::Utf8Path;
use clap::Args;

use super::{build_engine, load_config, KindArg, StrategyArg};
use crate::output;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Artifact kind
    #[arg(short, long, value_enum, default_value = "manual")]
    pub kind: KindArg,

    /// Artifact strategy
    #[arg(short, long, value_enum, default_value = "envelope")]
    pub strategy: StrategyArg,

    /// Write an uncompressed envelope
    #[arg(long)]
    pub no_compress: bool,

    /// Skip the retention sweep after writing
    #[arg(long)]
    pub no_cleanup: bool,

    /// Override the recorded creator
    #[arg(long)]
    pub created_by: Option<String>,
}

pub async fn run(args: CreateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let kind = ArtifactKind::from(args.kind);
    let keep = config.retention.keep_for(kind);
    let engine = build_engine(config)?;

    output::header("Create Backup");
    output::kv("Kind", kind.as_str());
    output::kv("Strategy", &ArtifactStrategy::from(args.strategy).to_string());
    output::kv("Root", &engine.root().display().to_string());
    println!();

    let mut options = BackupOptions::default()
        .with_strategy(args.strategy.into())
        .with_compression(!args.no_compress)
        .with_auto_cleanup(!args.no_cleanup);
    if let Some(created_by) = args.created_by {
        options = options.with_created_by(created_by);
    }

    let spinner = output::spinner("Writing backup...");
    let result = engine.create_backup(kind, options).await;
    spinner.finish_and_clear();

    let artifact = result.context("Backup failed")?;

    output::success(&format!("Backup created: {}", artifact.filename));
    output::kv("Path", &artifact.path.display().to_string());
    output::kv("Size", &output::format_bytes(artifact.size_bytes));
    if let Some(checksum) = &artifact.checksum {
        output::kv("SHA-256", checksum);
    }
    if !args.no_cleanup {
        output::kv("Retention", &format!("newest {} {} backups kept", keep, kind));
    }
    println!();

    output::info("Restore with:");
    println!("  archivist restore {} --kind {}", artifact.filename, kind);

    Ok(())
}
