//! Command line arguments.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use contentlens::pipeline::analysis::Stage;

#[derive(Parser, Debug)]
#[command(
    name = "contentlens",
    version,
    about = "Streaming five-stage analysis of creator content",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API until Ctrl-C
    Serve(ServeArgs),
    /// Run the pipeline once and write events to stdout
    Analyze(AnalyzeArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address (defaults to CONTENTLENS_BIND or 127.0.0.1:8787)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// File holding the content to analyze ("-" reads stdin)
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Stage to resume from (A-E)
    #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
    pub from_stage: Option<Stage>,

    /// JSON file with previous outputs ({"stageA": ..., "stageB": ...})
    #[arg(long, value_name = "FILE")]
    pub previous: Option<PathBuf>,

    /// Print the folded final state instead of the raw event stream
    #[arg(long)]
    pub summary: bool,
}

fn parse_stage(raw: &str) -> Result<Stage, String> {
    let letter = raw.trim().to_ascii_uppercase();
    Stage::ALL
        .into_iter()
        .find(|stage| stage.to_string() == letter)
        .ok_or_else(|| format!("unknown stage '{raw}' (expected one of A, B, C, D, E)"))
}
