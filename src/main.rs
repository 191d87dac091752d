mod app;
mod cli;
mod cli_ops;
mod completions;
mod config;
mod engine;
mod export;
mod history;
mod logging;
mod redistribute;
mod slot;
mod stats;
mod store;
mod tree;
mod ui;
mod validation;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn run() -> Result<(), app::AppError> {
    use app::{require_saved, App, HistoryQuery, NewNode};
    use clap::Parser;
    use cli::{Commands, ExportSubcommands};

    let cli = cli::Cli::parse();
    if let Commands::Completions(args) = &cli.command {
        return completions::run_completions_command(args.shell.as_deref(), args.install);
    }

    let seed = match &cli.command {
        Commands::Generate(args) => args.seed,
        _ => None,
    };
    let settings = config::Settings::load(&cli.data_dir)?.with_seed(seed);
    logging::init(settings.log_filter.as_deref());
    let mut app = App::open(settings)?;

    match cli.command {
        Commands::Tree(args) => {
            if args.json {
                print_json(&export::tree_export(app.tree()));
            } else {
                ui::print_tree(app.tree(), &app.validate());
            }
        }
        Commands::Add(args) => {
            let (id, persisted) = app.add_node(NewNode {
                parent_id: args.parent,
                label: args.label,
                percentage: args.percentage,
                emoji: args.emoji,
                description: args.description,
                color: args.color,
                redistribute: !args.no_redistribute,
            })?;
            println!("added {id}");
            require_saved(&persisted)?;
        }
        Commands::Remove(args) => {
            let removed = app.remove_node(&args.id)?;
            println!(
                "removed {} ({} node(s))",
                removed.node,
                removed.node.summary().node_count
            );
            require_saved(&removed.persisted)?;
        }
        Commands::Move(args) => {
            let persisted = app.move_node(&args.id, &args.to)?;
            println!("moved {} under {}", args.id, args.to);
            require_saved(&persisted)?;
        }
        Commands::Update(args) => {
            let edit = store::NodeEdit {
                label: args.label,
                percentage: args.percentage,
                emoji: args.emoji,
                description: args.description,
                color: args.color,
                expanded: args.expanded,
            };
            let persisted = app.update_node(&args.id, edit)?;
            println!("updated {}", args.id);
            require_saved(&persisted)?;
        }
        Commands::Reset => {
            let persisted = app.reset_tree();
            println!("tree reset to default");
            require_saved(&persisted)?;
        }
        Commands::Validate(args) => {
            if let Some(parent_id) = args.fix {
                match app.fix_percentages(&parent_id)? {
                    None => println!("children of {parent_id} already sum to 100%"),
                    Some(applied) => {
                        if args.json {
                            print_json(&applied.corrections);
                        } else {
                            ui::print_corrections(&applied.corrections);
                            ui::print_validation(&applied.status);
                        }
                        require_saved(&applied.persisted)?;
                    }
                }
            } else {
                let status = app.validate();
                if args.json {
                    print_json(&status);
                } else {
                    ui::print_validation(&status);
                }
            }
        }
        Commands::Generate(args) => {
            let generated = app.generate(args.count, !args.no_record)?;
            if args.json {
                print_json(&generated);
            } else {
                ui::print_slots(&generated.slots);
            }
        }
        Commands::History(args) => {
            let slots = app.history(&HistoryQuery {
                last: args.last,
                latest: args.latest,
                category: args.category,
                node: args.node,
                since: args.since.as_deref().map(app::parse_timestamp).transpose()?,
                until: args.until.as_deref().map(app::parse_timestamp).transpose()?,
            })?;
            if args.json {
                print_json(&slots);
            } else {
                ui::print_slots(&slots);
            }
        }
        Commands::HistoryRemove(args) => {
            if !app.remove_history_entry(args.id)? {
                return Err(app::AppError::InvalidArgument(format!(
                    "history entry #{} not found",
                    args.id
                )));
            }
            println!("removed history entry #{}", args.id);
        }
        Commands::HistoryClear => {
            let removed = app.clear_history()?;
            println!("cleared {removed} history entr{}", plural_y(removed));
        }
        Commands::Stats(args) => {
            let view = app.stats()?;
            if args.json {
                print_json(&view);
            } else {
                ui::print_stats(&view);
            }
        }
        Commands::Export(args) => {
            let path = match args.command {
                ExportSubcommands::Slots(export_args) => app.export_slots(
                    app::parse_slot_format(&export_args.format)?,
                    export_args.out.as_deref(),
                )?,
                ExportSubcommands::Tree(export_args) => {
                    app.export_tree(export_args.out.as_deref())?
                }
            };
            println!("exported to {}", path.display());
        }
        Commands::Import(args) => {
            let outcome = app.import_tree(&args.path)?;
            ui::print_import(&outcome.report);
            println!("previous tree backed up to {}", outcome.backup.display());
            require_saved(&outcome.persisted)?;
        }
        Commands::Completions(_) => unreachable!("handled before opening the app"),
    }
    Ok(())
}

fn plural_y(count: usize) -> &'static str {
    if count == 1 {
        "y"
    } else {
        "ies"
    }
}
