use super::Context;
use crate::output::{print_json, print_table};
use cfgimport_core::settings::{
    sd_address_key, sd_prefix_key, sd_token_key, SettingsProvider, KEY_STAGES,
};
use cfgimport_core::stage::AllowedStages;
use serde::Serialize;

#[derive(Serialize)]
struct StageRow {
    stage: String,
    address: Option<String>,
    prefix: Option<String>,
    token: bool,
}

/// `cfgimport stages` — list allowed stages and where each one imports to.
pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let settings = ctx.settings();
    let stages = AllowedStages::parse(&settings.require(KEY_STAGES, "stages allowed for import")?)?;

    let rows: Vec<StageRow> = stages
        .as_slice()
        .iter()
        .map(|stage| StageRow {
            stage: stage.clone(),
            address: settings.get_non_blank(&sd_address_key(stage)),
            prefix: settings.get_non_blank(&sd_prefix_key(stage)),
            token: settings.get_non_blank(&sd_token_key(stage)).is_some(),
        })
        .collect();

    if ctx.json {
        return print_json(&rows);
    }

    let missing = || "(missing)".to_string();
    print_table(
        &["STAGE", "ADDRESS", "PREFIX", "TOKEN"],
        rows.into_iter()
            .map(|r| {
                vec![
                    r.stage,
                    r.address.unwrap_or_else(missing),
                    r.prefix.unwrap_or_else(missing),
                    if r.token { "yes" } else { "no" }.to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}
