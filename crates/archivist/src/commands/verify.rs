//! Verify command

use anyhow::{bail, Context, Result};
use archivist_backup::ChecksumStatus;
use archivist_core::ArtifactKind;
use camino::Utf8Path;
use clap::Args;

use super::{build_engine, load_config, KindArg};
use crate::output;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Backup filename
    pub filename: String,

    /// Kind directory the backup lives in
    #[arg(short, long, value_enum, default_value = "manual")]
    pub kind: KindArg,
}

pub async fn run(args: VerifyArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let engine = build_engine(load_config(config_path)?)?;
    let kind = ArtifactKind::from(args.kind);

    output::header("Verify Backup");

    let spinner = output::spinner("Checking backup...");
    let result = engine.verify(kind, &args.filename).await;
    spinner.finish_and_clear();

    let report = result.with_context(|| format!("{} failed validation", args.filename))?;

    output::kv("Path", &report.path.display().to_string());
    output::kv("Size", &output::format_bytes(report.size_bytes));
    output::kv("SHA-256", &report.checksum);
    output::kv("Format version", &report.metadata.version);
    output::kv("Type", &report.metadata.backup_type);
    output::kv("Taken", &report.metadata.timestamp_label());
    output::kv("Collections", &report.statistics.collections.to_string());
    output::kv("Records", &output::format_number(report.statistics.total_documents as u64));
    println!();

    match &report.checksum_status {
        ChecksumStatus::Match => output::success("Checksum matches the registry"),
        ChecksumStatus::Unregistered => {
            output::warning("No registered checksum to compare with; contents are valid")
        }
        ChecksumStatus::Mismatch { expected } => {
            output::error(&format!("Checksum mismatch (registered {})", expected));
            bail!("{} does not match its registered checksum", args.filename);
        }
    }

    Ok(())
}
