use super::{parse_slot_format, parse_timestamp, App, AppError, HistoryQuery, NewNode, SlotFormat};
use crate::config::Settings;
use crate::store::{NodeEdit, Persisted, StoreError, StructuralError};
use crate::validation::ValidationLevel;
use std::path::PathBuf;
use uuid::Uuid;

fn unique_workspace() -> PathBuf {
    let root = std::env::temp_dir().join(format!("slotree-app-test-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
    root
}

fn open_app(root: &PathBuf) -> App {
    App::open(Settings::defaults(root).with_seed(Some(17))).expect("app should open")
}

#[test]
fn first_open_installs_and_saves_the_default_tree() {
    let root = unique_workspace();
    let app = open_app(&root);
    assert_eq!(app.tree().id(), "root");
    assert_eq!(app.summary().leaf_count, 4);
    assert!(app.settings().tree_file.exists());
    assert_eq!(app.validate().level, ValidationLevel::Valid);
}

#[test]
fn edits_survive_a_reopen() {
    let root = unique_workspace();
    let new_id = {
        let mut app = open_app(&root);
        let (id, persisted) = app
            .add_node(NewNode {
                parent_id: "brancheB".to_string(),
                label: "Item B3".to_string(),
                emoji: Some("🔸".to_string()),
                redistribute: true,
                ..NewNode::default()
            })
            .expect("add should succeed");
        assert_eq!(persisted, Persisted::Saved);
        app.update_node(
            "subA1",
            NodeEdit {
                percentage: Some(90.0),
                ..NodeEdit::default()
            },
        )
        .expect("update should succeed");
        id
    };

    let app = open_app(&root);
    let added = app.tree().find_by_id(&new_id).expect("added node persisted");
    assert_eq!(added.label, "Item B3");
    let branch_b = app.tree().find_by_id("brancheB").expect("branch B");
    assert!((branch_b.children_sum() - 100.0).abs() < 0.001);
    assert!((added.percentage - 100.0 / 3.0).abs() < 0.01);
    let a2 = app.tree().find_by_id("subA2").expect("A2");
    assert!((a2.percentage - 10.0).abs() < 0.001);
}

#[test]
fn add_rejects_blank_labels_and_unknown_parents() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    let blank = app.add_node(NewNode {
        parent_id: "root".to_string(),
        label: "   ".to_string(),
        ..NewNode::default()
    });
    assert!(matches!(blank, Err(AppError::InvalidArgument(_))));

    let missing = app.add_node(NewNode {
        parent_id: "nope".to_string(),
        label: "Orphan".to_string(),
        ..NewNode::default()
    });
    assert!(matches!(missing, Err(AppError::NotFound(id)) if id == "nope"));
}

#[test]
fn move_into_descendant_is_refused() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    let result = app.move_node("brancheA", "subA1");
    assert!(matches!(
        result,
        Err(AppError::Store(StoreError::Structural(StructuralError::Cycle { .. })))
    ));
    assert_eq!(
        app.tree().find_by_id("subA1").and_then(|node| node.parent_id()),
        Some("brancheA")
    );
}

#[test]
fn generate_records_history_and_feeds_stats() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    let generated = app.generate(40, true).expect("generate should succeed");
    assert!(generated.recorded);
    assert_eq!(generated.slots.len(), 40);
    assert_eq!(generated.slots[0].id, Some(1));

    let dry = app.generate(5, false).expect("dry run");
    assert!(dry.slots.iter().all(|slot| slot.id.is_none()));

    let last = app
        .history(&HistoryQuery {
            last: Some(3),
            ..HistoryQuery::default()
        })
        .expect("history");
    assert_eq!(
        last.iter().filter_map(|slot| slot.id).collect::<Vec<_>>(),
        vec![38, 39, 40]
    );

    let branch_a = app
        .history(&HistoryQuery {
            category: Some("📊 Branch A".to_string()),
            ..HistoryQuery::default()
        })
        .expect("category filter");
    assert!(branch_a
        .iter()
        .all(|slot| slot.selected_node_id.starts_with("subA")));

    let latest = app
        .history(&HistoryQuery {
            latest: true,
            ..HistoryQuery::default()
        })
        .expect("latest");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, Some(40));

    let future = app
        .history(&HistoryQuery {
            since: Some(parse_timestamp("2999-01-01T00:00:00Z").expect("valid timestamp")),
            ..HistoryQuery::default()
        })
        .expect("range filter");
    assert!(future.is_empty());
    let ranged = app
        .history(&HistoryQuery {
            since: Some(parse_timestamp("2000-01-01T00:00:00Z").expect("valid timestamp")),
            last: Some(5),
            ..HistoryQuery::default()
        })
        .expect("range filter");
    assert_eq!(ranged.len(), 5);
    assert!(parse_timestamp("yesterday").is_err());

    let stats = app.stats().expect("stats");
    assert_eq!(stats.report.total, 40);
    assert_eq!(stats.expected.len(), 4);

    assert!(app.remove_history_entry(1).expect("remove"));
    assert_eq!(app.clear_history().expect("clear"), 39);
    assert!(matches!(app.generate(0, true), Err(AppError::InvalidArgument(_))));
}

#[test]
fn export_then_import_round_trips_and_writes_a_backup() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    app.generate(3, true).expect("generate");

    let csv = app
        .export_slots(SlotFormat::Csv, None)
        .expect("csv export");
    assert!(csv.starts_with(&app.settings().export_dir));
    let text = std::fs::read_to_string(&csv).expect("csv readable");
    assert_eq!(text.lines().count(), 4);

    let tree_path = root.join("tree-export.json");
    app.export_tree(Some(&tree_path)).expect("tree export");
    app.remove_node("brancheB").expect("remove");
    assert!(app.tree().find_by_id("subB1").is_none());

    let outcome = app.import_tree(&tree_path).expect("import");
    assert!(outcome.backup.exists());
    assert_eq!(outcome.report.node_count, 7);
    assert_eq!(outcome.persisted, Persisted::Saved);
    assert!(app.tree().find_by_id("subB1").is_some());
}

#[test]
fn rejected_import_leaves_tree_and_backups_alone() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    let bad = root.join("bad.json");
    std::fs::write(
        &bad,
        r#"{"id":"r","label":"R","children":[{"id":"r","label":"dup","percentage":100}]}"#,
    )
    .expect("write bad import");
    assert!(matches!(app.import_tree(&bad), Err(AppError::Export(_))));
    assert!(!app.settings().backup_dir.exists());
    assert_eq!(app.tree().id(), "root");
}

#[test]
fn fix_percentages_normalizes_a_drifting_parent() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    app.add_node(NewNode {
        parent_id: "brancheA".to_string(),
        label: "Extra".to_string(),
        percentage: Some(50.0),
        redistribute: false,
        ..NewNode::default()
    })
    .expect("add without redistribution");
    assert_eq!(app.validate().level, ValidationLevel::Error);

    let applied = app
        .fix_percentages("brancheA")
        .expect("fix")
        .expect("corrections applied");
    assert_eq!(applied.corrections.len(), 3);
    assert_eq!(app.validate().level, ValidationLevel::Valid);
}

#[test]
fn parses_slot_formats() {
    assert_eq!(parse_slot_format("CSV").expect("csv"), SlotFormat::Csv);
    assert_eq!(parse_slot_format(" json ").expect("json"), SlotFormat::Json);
    assert!(matches!(
        parse_slot_format("xml"),
        Err(AppError::InvalidArgument(_))
    ));
}
