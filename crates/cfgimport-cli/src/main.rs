mod cmd;
mod logging;
mod output;
mod prompt;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cfgimport",
    about = "Import stage-specific JSON config into Consul KV",
    version,
    propagate_version = true
)]
struct Cli {
    /// Working directory holding the settings, value files and version file
    /// (default: nearest directory upward with cfgimport.yaml, else cwd)
    #[arg(long, global = true, env = "CFGIMPORT_DIR")]
    dir: Option<PathBuf>,

    /// Settings file (default: <dir>/cfgimport.yaml)
    #[arg(long, global = true, env = "CFGIMPORT_SETTINGS")]
    settings: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for an executor update, then import (default)
    Run {
        /// Stage to import (prompted for when omitted)
        #[arg(long)]
        stage: Option<String>,

        /// Skip the update check
        #[arg(long)]
        no_update: bool,

        /// Wait for Enter before exiting
        #[arg(long)]
        wait: bool,
    },

    /// Import without checking for updates
    Import {
        /// Stage to import (prompted for when omitted)
        #[arg(long)]
        stage: Option<String>,

        /// Wait for Enter before exiting
        #[arg(long)]
        wait: bool,
    },

    /// Check the release feed and replace the executor if it is stale
    Update,

    /// Show the recorded executor version
    Version,

    /// List allowed stages and their store targets
    Stages,

    /// Show what an import would write, without writing
    Preview {
        /// Stage to preview (prompted for when omitted)
        #[arg(long)]
        stage: Option<String>,
    },
}

impl Commands {
    fn wait(&self) -> bool {
        match self {
            Commands::Run { wait, .. } | Commands::Import { wait, .. } => *wait,
            _ => false,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        stage: None,
        no_update: false,
        wait: false,
    });

    // Only commands that change something keep a log file.
    let (default_level, log_file) = match &command {
        Commands::Run { .. } | Commands::Import { .. } | Commands::Update => {
            (tracing::Level::INFO, true)
        }
        _ => (tracing::Level::WARN, false),
    };

    let dir = root::resolve_dir(cli.dir.as_deref());
    logging::init(&dir, default_level, log_file);

    let wait = command.wait();
    let result = cmd::Context::load(dir, cli.settings, cli.json).and_then(|ctx| match command {
        Commands::Run {
            stage,
            no_update,
            ..
        } => cmd::run::run(&ctx, stage.as_deref(), no_update),
        Commands::Import { stage, .. } => cmd::run::import(&ctx, stage.as_deref()),
        Commands::Update => cmd::update::run(&ctx),
        Commands::Version => cmd::version::run(&ctx),
        Commands::Stages => cmd::stages::run(&ctx),
        Commands::Preview { stage } => cmd::preview::run(&ctx, stage.as_deref()),
    });

    if let Err(e) = &result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        tracing::error!(target: logging::FILE_ONLY, "{e:#}");
    }

    if wait {
        let mut input = std::io::stdin().lock();
        if cli.json {
            prompt::wait_for_enter(&mut input, &mut std::io::stderr());
        } else {
            prompt::wait_for_enter(&mut input, &mut std::io::stdout());
        }
    }

    if result.is_err() {
        std::process::exit(1);
    }
}
