mod display;
mod threshold;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use predictree_format::{load, normalize, read_version, to_changes};
use tracing::info;

use crate::threshold::Thresholds;

#[derive(Parser)]
#[command(name = "predictree", version, about = "Inspect and auto-review extraction result files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize documents, models, reviews and final predictions
    Inspect {
        /// Result file (JSON)
        file: PathBuf,
    },
    /// Print the normalized form of a result file
    Normalize {
        /// Result file (JSON)
        file: PathBuf,
    },
    /// Auto-review final predictions by confidence and print the change-set
    Changes {
        /// Result file (JSON)
        file: PathBuf,
        /// Accept predictions at or above this confidence
        #[arg(long, env = "PREDICTREE_ACCEPT_ABOVE")]
        accept_above: Option<f64>,
        /// Reject predictions below this confidence
        #[arg(long, env = "PREDICTREE_REJECT_BELOW")]
        reject_below: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { file } => {
            let result = load(&read(&file)?)
                .with_context(|| format!("parsing {}", file.display()))?;
            display::print_result_card(&result)?;
        }
        Command::Normalize { file } => {
            let raw: serde_json::Value = serde_json::from_slice(&read(&file)?)
                .with_context(|| format!("decoding {}", file.display()))?;
            let version = read_version(&raw)?;
            println!("{}", serde_json::to_string_pretty(&normalize(raw, version))?);
        }
        Command::Changes {
            file,
            accept_above,
            reject_below,
        } => {
            let thresholds = Thresholds {
                accept_above,
                reject_below,
            };
            thresholds.validate()?;
            let mut result = load(&read(&file)?)
                .with_context(|| format!("parsing {}", file.display()))?;
            let tally = thresholds.apply(&mut result);
            info!(
                submission_id = result.submission_id,
                accepted = tally.accepted,
                rejected = tally.rejected,
                skipped = tally.skipped,
                "applied thresholds"
            );
            let changes = to_changes(&result.final_predictions(), &result)?;
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}
