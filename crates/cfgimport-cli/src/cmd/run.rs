use super::Context;
use crate::output::print_json;
use crate::prompt;
use anyhow::Context as _;
use cfgimport_core::paths;
use cfgimport_core::pipeline::ImportPlan;
use cfgimport_core::settings::ImportSettings;
use cfgimport_core::update::{self, HttpReleases, UpdateConfig, UpdateState, Updater};
use std::path::Path;
use std::process::Command;

/// `cfgimport run` — check for an executor update, then import.
///
/// When an executor binary sits in the working directory it is launched for
/// the import step; otherwise the import runs in this process.
pub fn run(ctx: &Context, stage: Option<&str>, no_update: bool) -> anyhow::Result<()> {
    let config = UpdateConfig::from_settings(ctx.settings(), ctx.dir())
        .context("invalid update settings")?;

    if no_update || !config.enabled {
        tracing::info!("update check skipped");
    } else {
        match HttpReleases::new(&config.feed_url, config.timeout) {
            Ok(source) => {
                let outcome = Updater::new(&source, &config).run();
                if outcome.state == UpdateState::Updated {
                    progress(
                        ctx,
                        &format!(
                            "Executor updated to {}",
                            outcome.latest_version.as_deref().unwrap_or("?")
                        ),
                    );
                }
            }
            Err(e) => tracing::warn!("update check skipped: {e}"),
        }
    }

    if let Some(exe) = config.executor_path().filter(|p| is_external_executor(p)) {
        return delegate(ctx, &exe, stage);
    }
    import(ctx, stage)
}

/// `cfgimport import` — resolve settings, choose the stage, import.
pub fn import(ctx: &Context, stage: Option<&str>) -> anyhow::Result<()> {
    let version = update::read_version(&paths::version_path(ctx.dir()))?;
    progress(
        ctx,
        &format!(
            "cfgimport {} (executor version: {})",
            env!("CARGO_PKG_VERSION"),
            version.as_deref().unwrap_or("none")
        ),
    );
    progress(ctx, "Starting import into Consul");

    let settings = ImportSettings::resolve(ctx.settings())?;
    let stage = prompt::choose_stage(stage, &settings.stages, ctx.json)?;
    let plan = ImportPlan::prepare(ctx.settings(), ctx.dir(), &settings, &stage)?;
    if !plan.stage_file_found {
        progress(
            ctx,
            &format!(
                "No override file {} for stage {stage}; importing base values only",
                plan.stage_file.display()
            ),
        );
    }

    let report = plan.execute()?;
    if ctx.json {
        print_json(&report)?;
    } else {
        println!(
            "Imported {} keys into Consul ({})",
            report.written, report.target
        );
    }
    Ok(())
}

/// Status line for the operator. Stdout carries only the report under `--json`.
fn progress(ctx: &Context, line: &str) {
    if ctx.json {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

/// True when `path` is a file and not the binary already running.
fn is_external_executor(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let current = std::env::current_exe().and_then(|p| p.canonicalize());
    match (current, path.canonicalize()) {
        (Ok(current), Ok(candidate)) => current != candidate,
        _ => true,
    }
}

fn delegate(ctx: &Context, exe: &Path, stage: Option<&str>) -> anyhow::Result<()> {
    tracing::info!(executor = %exe.display(), "running import in executor");
    let mut cmd = Command::new(exe);
    cmd.arg("--dir")
        .arg(ctx.dir())
        .arg("--settings")
        .arg(ctx.settings_path());
    if ctx.json {
        cmd.arg("--json");
    }
    cmd.arg("import");
    if let Some(s) = stage {
        cmd.args(["--stage", s]);
    }

    let status = cmd
        .status()
        .with_context(|| format!("failed to start executor {}", exe.display()))?;
    if !status.success() {
        anyhow::bail!("executor {} exited with {status}", exe.display());
    }
    Ok(())
}
