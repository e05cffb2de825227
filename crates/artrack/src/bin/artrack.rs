use std::path::PathBuf;
use std::process::ExitCode;

use artrack::tracking::replay::ReplayScript;
use artrack::tracking::{replay_script, ParamsError, ReplayIoError};
use clap::{Parser, Subcommand};

#[cfg(not(feature = "tracing"))]
use log::{info, LevelFilter};

#[cfg(feature = "tracing")]
use tracing::info;

#[cfg(feature = "tracing")]
use artrack::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use artrack::core::init_with_level;

#[derive(Parser, Debug)]
#[command(name = "artrack", version, about = "Fiducial marker tracking tools")]
struct Cli {
    /// Log per-frame decisions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON detection script and report every dispatched event.
    Replay {
        /// Script with controller params, group layouts and per-frame detections.
        script: PathBuf,

        /// Write the report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scale applied to reported translations (overrides the script).
        #[arg(long)]
        scale: Option<f64>,

        /// Do not report squares without a pattern or matrix identity.
        #[arg(long)]
        no_unclassified: bool,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{path}: {source}")]
    Script {
        path: String,
        #[source]
        source: ReplayIoError,
    },
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Report(#[from] ReplayIoError),
}

fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(feature = "tracing"))]
    {
        let level = if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        };
        init_with_level(level)?;
    }

    #[cfg(feature = "tracing")]
    {
        let _ = verbose;
        init_tracing(false);
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Replay {
            script,
            output,
            scale,
            no_unclassified,
        } => run_replay(script, output, scale, no_unclassified),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info"))]
fn run_replay(
    script_path: PathBuf,
    output: Option<PathBuf>,
    scale: Option<f64>,
    no_unclassified: bool,
) -> Result<(), CliError> {
    let display = script_path.to_string_lossy().into_owned();
    let mut script = ReplayScript::load_json(&script_path).map_err(|source| CliError::Script {
        path: display.clone(),
        source,
    })?;
    if scale.is_some() {
        script.params.transform_scale = scale;
    }
    if no_unclassified {
        script.params.report_unclassified = false;
    }

    let mut report = replay_script(script)?;
    report.script_path = Some(display);
    info!(
        "{} of {} frames processed",
        report.frames_processed,
        report.frames.len()
    );

    match output {
        Some(path) => {
            report.write_json(&path)?;
            info!("report written to {}", path.display());
        }
        None => println!("{}", report.to_json_string()?),
    }
    Ok(())
}
