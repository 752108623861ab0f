//! Restore command

use anyhow::{bail, Context, Result};
use archivist_backup::RestoreOutcome;
use archivist_core::ArtifactKind;
use camino::Utf8Path;
use clap::Args;

use super::{build_engine, load_config, KindArg};
use crate::output;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup filename (see `archivist list`)
    pub filename: Option<String>,

    /// Kind directory the backup lives in
    #[arg(short, long, value_enum, default_value = "manual")]
    pub kind: KindArg,

    /// Write restored collections back into the collections directory
    #[arg(long)]
    pub apply: bool,
}

pub async fn run(args: RestoreArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let Some(filename) = args.filename else {
        output::info("Usage: archivist restore <filename> [--kind manual|auto] [--apply]");
        bail!("No backup filename given");
    };

    let engine = build_engine(load_config(config_path)?)?;
    let kind = ArtifactKind::from(args.kind);

    output::header("Restore Backup");
    output::kv("Backup", &filename);
    output::kv("Kind", kind.as_str());
    println!();

    if args.apply {
        let spinner = output::spinner("Validating and applying backup...");
        let result = engine.restore_and_apply(kind, &filename).await;
        spinner.finish_and_clear();

        let applied = result.with_context(|| format!("Restore of {} failed", filename))?;
        output::success(&format!(
            "Applied {} collection(s), {} record(s)",
            applied.collections,
            output::format_number(applied.records as u64)
        ));
        return Ok(());
    }

    let spinner = output::spinner("Restoring backup...");
    let result = engine.restore(kind, &filename).await;
    spinner.finish_and_clear();

    let outcome = result.with_context(|| format!("Restore of {} failed", filename))?;
    let metadata = outcome.metadata();
    let statistics = outcome.statistics();
    output::kv("Format version", &metadata.version);
    output::kv("Taken", &metadata.timestamp_label());
    if !metadata.created_by.is_empty() {
        output::kv("Created by", &metadata.created_by);
    }

    match &outcome {
        RestoreOutcome::Envelope(_) => {
            output::kv("Collections", &statistics.collections.to_string());
            output::kv("Records", &output::format_number(statistics.total_documents as u64));
            println!();
            output::success("Backup is valid");
            output::info("Re-run with --apply to write the data back");
        }
        RestoreOutcome::Tree(report) => {
            for entry in &report.entries {
                let action = if entry.replaced_existing { "replaced" } else { "created" };
                output::kv(&entry.name, &format!("{} ({})", entry.destination.display(), action));
            }
            println!();
            output::success(&format!(
                "Restored {} file(s) into {} location(s)",
                output::format_number(statistics.total_documents as u64),
                report.entries.len()
            ));
        }
    }

    Ok(())
}
