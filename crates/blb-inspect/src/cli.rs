use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use blb_core::Version;

use crate::commands;
use crate::error::Result;
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "blb-inspect",
    about = "Inspect and edit the version history of .blb level files",
    version
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr. The filter comes from BLB_LOG.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the header, history summary and decode warnings.
    Header(FileArgs),

    /// List every version, newest first.
    Versions(ListArgs),

    /// Print the tiles of one version.
    Show(ShowArgs),

    /// Check the version graph for structural problems.
    Validate(FileArgs),

    /// Write one version as a new single-version file.
    Export(ExportArgs),

    /// Write several versions as a new file; selected autosaves become manual saves.
    Extract(ExtractArgs),

    /// Write the newest manual save as a new single-version file.
    Flatten(FlattenArgs),

    /// Promote autosaves to manual saves.
    Promote(EditArgs),

    /// Delete versions, keeping every later save intact.
    Delete(EditArgs),
}

#[derive(Debug, Args)]
pub struct FileArgs {
    /// Level file to read.
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    pub file: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub file: PathBuf,

    /// MANUAL or MANUAL.AUTO; defaults to the newest manual save.
    #[arg(long)]
    pub version: Option<Version>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// File to write.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Overwrite the output if it exists.
    #[arg(long)]
    pub force: bool,

    /// Write an uncompressed body.
    #[arg(long)]
    pub plain: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    pub file: PathBuf,

    #[arg(long)]
    pub version: Version,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    pub file: PathBuf,

    /// Comma-separated versions to keep.
    #[arg(long, required = true, value_delimiter = ',')]
    pub versions: Vec<Version>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct FlattenArgs {
    pub file: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub file: PathBuf,

    /// Versions to edit; repeat or separate with commas.
    #[arg(long = "version", required = true, value_delimiter = ',')]
    pub versions: Vec<Version>,

    /// Write here instead of rewriting FILE in place.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

pub fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    match cli.command {
        Commands::Header(args) => commands::header(&args, out),
        Commands::Versions(args) => commands::versions(&args, out),
        Commands::Show(args) => commands::show(&args, out),
        Commands::Validate(args) => commands::validate(&args, out),
        Commands::Export(args) => commands::export(&args, out),
        Commands::Extract(args) => commands::extract(&args, out),
        Commands::Flatten(args) => commands::flatten(&args, out),
        Commands::Promote(args) => commands::promote(&args, out),
        Commands::Delete(args) => commands::delete(&args, out),
    }
}
