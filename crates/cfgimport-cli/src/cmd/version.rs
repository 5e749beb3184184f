use super::Context;
use crate::output::print_json;
use cfgimport_core::{paths, update};

/// `cfgimport version` — show the recorded executor version.
pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let recorded = update::read_version(&paths::version_path(ctx.dir()))?;

    if ctx.json {
        return print_json(&serde_json::json!({
            "binary": env!("CARGO_PKG_VERSION"),
            "executor": recorded,
        }));
    }

    println!("binary:   {}", env!("CARGO_PKG_VERSION"));
    println!(
        "executor: {}",
        recorded.as_deref().unwrap_or("none (never updated)")
    );
    Ok(())
}
