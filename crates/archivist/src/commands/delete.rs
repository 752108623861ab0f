//! Delete command

use anyhow::{Context, Result};
use archivist_core::ArtifactKind;
use camino::Utf8Path;
use clap::Args;

use super::{build_engine, load_config, KindArg};
use crate::output;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Backup filename
    pub filename: String,

    /// Kind directory the backup lives in
    #[arg(short, long, value_enum, default_value = "manual")]
    pub kind: KindArg,
}

pub async fn run(args: DeleteArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let engine = build_engine(load_config(config_path)?)?;
    let kind = ArtifactKind::from(args.kind);

    engine
        .delete_backup(kind, &args.filename)
        .await
        .with_context(|| format!("Failed to delete {}", args.filename))?;

    output::success(&format!("Deleted {} backup {}", kind, args.filename));
    Ok(())
}
