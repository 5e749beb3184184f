use super::Context;
use crate::output::{print_json, print_table};
use crate::prompt;
use cfgimport_core::pipeline::ImportPlan;
use cfgimport_core::settings::ImportSettings;
use serde::Serialize;

const HIDDEN: &str = "***";

#[derive(Serialize)]
struct Entry {
    path: String,
    value: String,
}

#[derive(Serialize)]
struct Preview<'a> {
    #[serde(flatten)]
    plan: &'a ImportPlan,
    entries: Vec<Entry>,
}

/// `cfgimport preview` — resolve and print the merged values without writing.
///
/// Values are masked unless `showValuesToClient` is on.
pub fn run(ctx: &Context, stage: Option<&str>) -> anyhow::Result<()> {
    let settings = ImportSettings::resolve(ctx.settings())?;
    let stage = prompt::choose_stage(stage, &settings.stages, ctx.json)?;
    let plan = ImportPlan::prepare(ctx.settings(), ctx.dir(), &settings, &stage)?;

    let entries: Vec<Entry> = plan
        .values
        .iter()
        .map(|(key, value)| Entry {
            path: plan.sd.key_path(key),
            value: if plan.show_values {
                value.clone()
            } else {
                HIDDEN.to_string()
            },
        })
        .collect();

    if ctx.json {
        return print_json(&Preview {
            plan: &plan,
            entries,
        });
    }

    println!("Stage {} → {}", plan.stage, plan.sd.target());
    println!("  base:     {}", plan.base_file.display());
    println!(
        "  override: {}{}",
        plan.stage_file.display(),
        if plan.stage_file_found { "" } else { " (not found)" }
    );
    println!();
    print_table(
        &["PATH", "VALUE"],
        entries.into_iter().map(|e| vec![e.path, e.value]).collect(),
    );
    Ok(())
}
