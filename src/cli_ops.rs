use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Debug, Args)]
#[command(about = "List recorded slots.")]
pub struct HistoryArgs {
    #[arg(short = 'n', long, help = "Only the most recent N slots.")]
    pub last: Option<usize>,

    #[arg(short = 'c', long, help = "Only slots under this main category.")]
    pub category: Option<String>,

    #[arg(long, help = "Only slots that selected this node name.")]
    pub node: Option<String>,

    #[arg(long, help = "Only slots generated at or after this RFC3339 time.")]
    pub since: Option<String>,

    #[arg(long, help = "Only slots generated at or before this RFC3339 time.")]
    pub until: Option<String>,

    #[arg(long, conflicts_with = "last", help = "Only the most recent slot.")]
    pub latest: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct HistoryRemoveArgs {
    #[arg(help = "History entry id.")]
    pub id: i64,
}

#[derive(Debug, Args)]
#[command(
    about = "Export commands.",
    long_about = "Write recorded slots as CSV/JSON, or the tree as JSON."
)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub command: ExportSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ExportSubcommands {
    #[command(about = "Export recorded slots.")]
    Slots(ExportSlotsArgs),
    #[command(about = "Export the tree with a validation report.")]
    Tree(ExportTreeArgs),
}

#[derive(Debug, Args)]
pub struct ExportSlotsArgs {
    #[arg(short = 'f', long, default_value = "csv", help = "csv or json.")]
    pub format: String,

    #[arg(
        short = 'o',
        long,
        help = "Output file (defaults to a timestamped file in the export dir)."
    )]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExportTreeArgs {
    #[arg(
        short = 'o',
        long,
        help = "Output file (defaults to a timestamped file in the export dir)."
    )]
    pub out: Option<PathBuf>,
}
