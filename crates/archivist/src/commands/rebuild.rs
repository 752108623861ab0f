//! Rebuild command

use anyhow::Result;
use camino::Utf8Path;
use clap::Args;

use super::{build_engine, load_config};
use crate::output;

#[derive(Args, Debug)]
pub struct RebuildArgs {}

pub async fn run(_args: RebuildArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let engine = build_engine(load_config(config_path)?)?;

    let spinner = output::spinner("Scanning backup directories...");
    let result = engine.rebuild_registry().await;
    spinner.finish_and_clear();

    let count = result?;
    output::success(&format!(
        "Registry rebuilt with {} entr{}",
        count,
        if count == 1 { "y" } else { "ies" }
    ));
    output::kv("Registry", &engine.registry().path().display().to_string());
    Ok(())
}
