use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, CommandFactory, Parser, Subcommand};

pub use crate::cli_ops::*;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[derive(Debug, Parser)]
#[command(name = "slotree")]
#[command(bin_name = "slotree")]
#[command(version)]
#[command(about = "Weighted decision tree slot generator")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'D',
        long,
        env = "SLOTREE_DATA_DIR",
        default_value = "data",
        help = "Directory holding the tree, history database and settings."
    )]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Print the tree with percentages.")]
    Tree(TreeArgs),
    #[command(about = "Add a child node under a parent.")]
    Add(AddArgs),
    #[command(about = "Remove a node and its subtree.")]
    Remove(RemoveArgs),
    #[command(about = "Move a node under another parent.")]
    Move(MoveArgs),
    #[command(about = "Edit node fields; siblings absorb percentage changes.")]
    Update(UpdateArgs),
    #[command(about = "Replace the tree with the default tree.")]
    Reset,
    #[command(about = "Check percentage sums and ids across the tree.")]
    Validate(ValidateArgs),
    #[command(about = "Generate slots by weighted descent.")]
    Generate(GenerateArgs),
    #[command(about = "List recorded slots.")]
    History(HistoryArgs),
    #[command(about = "Delete one recorded slot.")]
    HistoryRemove(HistoryRemoveArgs),
    #[command(about = "Delete every recorded slot.")]
    HistoryClear,
    #[command(about = "Summarize recorded slots.")]
    Stats(StatsArgs),
    #[command(about = "Export slots or the tree.")]
    Export(ExportArgs),
    #[command(about = "Replace the tree from a JSON file.")]
    Import(ImportArgs),
    #[command(about = "Generate or install shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
#[command(about = "Generate or install shell completions.")]
pub struct CompletionsArgs {
    #[arg(help = "Shell name (bash, zsh, fish). Auto-detected if omitted.")]
    pub shell: Option<String>,

    #[arg(
        short = 'i',
        long = "install",
        help = "Write completions to the canonical path for the shell."
    )]
    pub install: bool,
}

#[derive(Debug, Args)]
pub struct TreeArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
#[command(about = "Add a child node.")]
pub struct AddArgs {
    #[arg(short = 'p', long, help = "Parent node id.")]
    pub parent: String,

    #[arg(short = 'l', long, help = "Node label.")]
    pub label: String,

    #[arg(
        short = 'P',
        long,
        help = "Requested percentage (defaults to an equal share)."
    )]
    pub percentage: Option<f64>,

    #[arg(short = 'e', long, help = "Emoji shown before the label.")]
    pub emoji: Option<String>,

    #[arg(short = 'd', long, help = "Free-form description.")]
    pub description: Option<String>,

    #[arg(short = 'c', long, help = "Display color (#RGB or #RRGGBB).")]
    pub color: Option<String>,

    #[arg(
        long = "no-redistribute",
        help = "Keep sibling percentages as they are."
    )]
    pub no_redistribute: bool,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    #[arg(help = "Node id.")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    #[arg(help = "Node id.")]
    pub id: String,

    #[arg(short = 't', long = "to", help = "New parent node id.")]
    pub to: String,
}

#[derive(Debug, Args)]
#[command(about = "Update node fields.")]
pub struct UpdateArgs {
    #[arg(help = "Node id.")]
    pub id: String,

    #[arg(short = 'l', long, help = "Set label.")]
    pub label: Option<String>,

    #[arg(short = 'P', long, help = "Set percentage (0-100).")]
    pub percentage: Option<f64>,

    #[arg(short = 'e', long, help = "Set emoji (empty clears).")]
    pub emoji: Option<String>,

    #[arg(short = 'd', long, help = "Set description (empty clears).")]
    pub description: Option<String>,

    #[arg(short = 'c', long, help = "Set display color.")]
    pub color: Option<String>,

    #[arg(long, help = "Set expanded state (true|false).")]
    pub expanded: Option<bool>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,

    #[arg(
        short = 'f',
        long = "fix",
        value_name = "PARENT_ID",
        help = "Rescale the children of this parent to 100%."
    )]
    pub fix: Option<String>,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(short = 'n', long, default_value_t = 1, help = "Number of slots.")]
    pub count: usize,

    #[arg(
        short = 's',
        long,
        env = "SLOTREE_SEED",
        help = "Seed for reproducible draws."
    )]
    pub seed: Option<u64>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,

    #[arg(long = "no-record", help = "Do not store the slots in history.")]
    pub no_record: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[arg(help = "Tree JSON file (bare tree or export envelope).")]
    pub path: PathBuf,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
