//! List command

use anyhow::Result;
use archivist_backup::{KindFilter, RegistryEntry};
use camino::Utf8Path;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use super::{build_engine, load_config, KindFilterArg};
use crate::output;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Which kinds to list
    #[arg(short, long, value_enum, default_value = "all")]
    pub kind: KindFilterArg,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct BackupRow {
    filename: String,
    kind: String,
    strategy: String,
    size: String,
    created: String,
    #[tabled(rename = "sha-256")]
    checksum: String,
}

impl From<&RegistryEntry> for BackupRow {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            filename: entry.filename.clone(),
            kind: entry.kind.to_string(),
            strategy: entry.strategy.to_string(),
            size: output::format_bytes(entry.size_bytes),
            created: entry.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            checksum: entry
                .checksum
                .as_deref()
                .map(|c| c.chars().take(12).collect())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub async fn run(args: ListArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let engine = build_engine(load_config(config_path)?)?;
    let filter = KindFilter::from(args.kind);
    let entries = engine.list_backups(filter).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    output::header("Backups");
    if entries.is_empty() {
        output::info(&format!("No backups registered under {}", engine.root().display()));
        return Ok(());
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let rows: Vec<BackupRow> = entries.iter().map(BackupRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    println!();

    output::kv("Count", &output::format_number(entries.len() as u64));
    output::kv("Total size", &output::format_bytes(total));

    Ok(())
}
