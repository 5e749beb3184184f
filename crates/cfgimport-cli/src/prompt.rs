use cfgimport_core::stage::{AllowedStages, StageName};
use std::io::{BufRead, Write};

/// Ask for a stage until the answer is on the allow-list.
pub fn prompt_stage<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    stages: &AllowedStages,
) -> anyhow::Result<StageName> {
    loop {
        write!(out, "Enter the stage to import ({stages}): ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            anyhow::bail!("no stage given: input closed (pass --stage to run non-interactively)");
        }
        match stages.select(&line) {
            Ok(stage) => return Ok(stage),
            Err(_) => {
                writeln!(out, "Stage '{}' is not one of: {stages}", line.trim())?;
                tracing::warn!(target: crate::logging::FILE_ONLY, "rejected stage '{}'", line.trim());
            }
        }
    }
}

/// Use `explicit` if given, otherwise prompt on stdin. Under `--json` the
/// prompt is written to stderr so stdout stays parseable.
pub fn choose_stage(
    explicit: Option<&str>,
    stages: &AllowedStages,
    json: bool,
) -> anyhow::Result<StageName> {
    let mut input = std::io::stdin().lock();
    match explicit {
        Some(s) => Ok(stages.select(s)?),
        None if json => prompt_stage(&mut input, &mut std::io::stderr(), stages),
        None => prompt_stage(&mut input, &mut std::io::stdout(), stages),
    }
}

/// Keep the console open until Enter (or end of input).
pub fn wait_for_enter<R: BufRead, W: Write>(input: &mut R, out: &mut W) {
    let _ = write!(out, "Press Enter to exit");
    let _ = out.flush();
    let mut line = String::new();
    let _ = input.read_line(&mut line);
}
