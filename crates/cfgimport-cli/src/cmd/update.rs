use super::Context;
use crate::output::print_json;
use anyhow::Context as _;
use cfgimport_core::update::{HttpReleases, UpdateConfig, UpdateState, Updater};

/// `cfgimport update` — run the update check on demand.
///
/// Ignores `update.enabled`; a failed check or download is reported but is not
/// an error exit, matching how `run` treats it.
pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let config = UpdateConfig::from_settings(ctx.settings(), ctx.dir())
        .context("invalid update settings")?;
    let source = HttpReleases::new(&config.feed_url, config.timeout)?;
    let outcome = Updater::new(&source, &config).run();

    if ctx.json {
        return print_json(&outcome);
    }

    let local = outcome.local_version.as_deref().unwrap_or("none");
    let latest = outcome.latest_version.as_deref().unwrap_or("unknown");
    match outcome.state {
        UpdateState::Updated => println!("Updated executor: {local} → {latest}"),
        UpdateState::UpdateFailed => println!(
            "Update to {latest} failed, still on {local}: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
        _ => match &outcome.error {
            Some(e) => println!("Could not check for updates ({e}); still on {local}"),
            None => println!("Executor is up to date ({local})"),
        },
    }
    Ok(())
}
