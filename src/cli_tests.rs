use clap::Parser;

use super::{Cli, Commands, ExportSubcommands};

fn parse(args: &[&str]) -> Cli {
    Cli::parse_from(args)
}

#[test]
fn add_parses_all_fields() {
    let cli = parse(&[
        "slotree",
        "add",
        "--parent",
        "brancheA",
        "--label",
        "Item A3",
        "-P",
        "25",
        "--no-redistribute",
    ]);
    match cli.command {
        Commands::Add(args) => {
            assert_eq!(args.parent, "brancheA");
            assert_eq!(args.label, "Item A3");
            assert_eq!(args.percentage, Some(25.0));
            assert!(args.no_redistribute);
            assert!(args.emoji.is_none());
        }
        other => panic!("expected Add, got {:?}", other),
    }
}

#[test]
fn move_requires_target() {
    let cli = parse(&["slotree", "move", "subA1", "--to", "brancheB"]);
    match cli.command {
        Commands::Move(args) => {
            assert_eq!(args.id, "subA1");
            assert_eq!(args.to, "brancheB");
        }
        other => panic!("expected Move, got {:?}", other),
    }
    assert!(Cli::try_parse_from(["slotree", "move", "subA1"]).is_err());
}

#[test]
fn generate_defaults_to_one_recorded_slot() {
    let cli = parse(&["slotree", "generate"]);
    match cli.command {
        Commands::Generate(args) => {
            assert_eq!(args.count, 1);
            assert!(!args.no_record);
            assert!(!args.json);
        }
        other => panic!("expected Generate, got {:?}", other),
    }
}

#[test]
fn update_parses_expanded_flag() {
    let cli = parse(&["slotree", "update", "subA1", "--expanded", "false", "-P", "80"]);
    match cli.command {
        Commands::Update(args) => {
            assert_eq!(args.expanded, Some(false));
            assert_eq!(args.percentage, Some(80.0));
        }
        other => panic!("expected Update, got {:?}", other),
    }
}

#[test]
fn export_subcommands_parse() {
    let cli = parse(&["slotree", "export", "slots", "--format", "json", "-o", "out.json"]);
    match cli.command {
        Commands::Export(args) => match args.command {
            ExportSubcommands::Slots(slots) => {
                assert_eq!(slots.format, "json");
                assert_eq!(
                    slots.out.as_deref(),
                    Some(std::path::Path::new("out.json"))
                );
            }
            other => panic!("expected Slots, got {:?}", other),
        },
        other => panic!("expected Export, got {:?}", other),
    }

    let cli = parse(&["slotree", "export", "tree"]);
    match cli.command {
        Commands::Export(args) => {
            assert!(matches!(args.command, ExportSubcommands::Tree(ref tree) if tree.out.is_none()));
        }
        other => panic!("expected Export, got {:?}", other),
    }
}

#[test]
fn data_dir_flag_is_global_position() {
    let cli = parse(&["slotree", "--data-dir", "/tmp/slots", "validate", "--fix", "root"]);
    assert_eq!(cli.data_dir, std::path::PathBuf::from("/tmp/slots"));
    match cli.command {
        Commands::Validate(args) => assert_eq!(args.fix.as_deref(), Some("root")),
        other => panic!("expected Validate, got {:?}", other),
    }
}

#[test]
fn history_subcommands_parse() {
    let cli = parse(&["slotree", "history-remove", "12"]);
    assert!(matches!(cli.command, Commands::HistoryRemove(ref args) if args.id == 12));
    let cli = parse(&["slotree", "history", "--last", "5", "--category", "Branch A"]);
    match cli.command {
        Commands::History(args) => {
            assert_eq!(args.last, Some(5));
            assert_eq!(args.category.as_deref(), Some("Branch A"));
        }
        other => panic!("expected History, got {:?}", other),
    }
    assert!(matches!(parse(&["slotree", "history-clear"]).command, Commands::HistoryClear));
}

#[test]
fn command_definition_is_consistent() {
    super::styled_command().debug_assert();
}
