use super::{format_problem, format_slot_row, level_color_code, tree_lines, Palette};
use crate::slot::GeneratedSlot;
use crate::store::{MemoryPersistence, NodeEdit, TreeStore};
use crate::tree::{default_tree, TreeNode};
use crate::validation::{validate_tree, ValidationLevel};

fn plain() -> Palette {
    Palette { enabled: false }
}

#[test]
fn tree_lines_draw_branches_and_percentages() {
    let root = default_tree();
    let status = validate_tree(&root);
    let lines = tree_lines(&root, &status, &plain());
    assert_eq!(
        lines,
        vec![
            "🌳 Main Tree (100.0%) [root]",
            "├── 📊 Branch A (60.0%) [brancheA]",
            "│   ├── 🔹 Item A1 (70.0%) [subA1]",
            "│   └── 🔹 Item A2 (30.0%) [subA2]",
            "└── 📈 Branch B (40.0%) [brancheB]",
            "    ├── 🔸 Item B1 (50.0%) [subB1]",
            "    └── 🔸 Item B2 (50.0%) [subB2]",
        ]
    );
}

#[test]
fn collapsed_nodes_hide_their_children() {
    let mut store = TreeStore::with_root(default_tree(), Box::new(MemoryPersistence::new()));
    store
        .update_node(
            "brancheB",
            NodeEdit {
                expanded: Some(false),
                ..NodeEdit::default()
            },
        )
        .expect("collapse should succeed");
    let status = validate_tree(store.root());
    let lines = tree_lines(store.root(), &status, &plain());
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[5], "    └── … 2 hidden");
}

#[test]
fn invalid_parents_carry_their_message() {
    let root = TreeNode::new("root", "Root", 100.0)
        .with_child(TreeNode::new("a", "A", 70.0))
        .with_child(TreeNode::new("b", "B", 70.0));
    let status = validate_tree(&root);
    let lines = tree_lines(&root, &status, &plain());
    assert_eq!(
        lines[0],
        "Root (100.0%) [root] children sum to 140.0% instead of 100%"
    );

    let problem = format_problem("root", &status.nodes["root"], &plain());
    assert_eq!(
        problem,
        "  error root children sum to 140.0% instead of 100% (first child -> 50.0%)"
    );
}

#[test]
fn slot_rows_show_id_time_and_path() {
    let mut slot = GeneratedSlot::new("Root > A > A1", "a1", "A1");
    slot.generated_at = "2024-03-01T09:00:00Z".to_string();
    assert_eq!(
        format_slot_row(&slot, &plain()),
        "- 2024-03-01T09:00:00Z Root > A > A1"
    );
    slot.id = Some(4);
    assert!(format_slot_row(&slot, &plain()).starts_with("#4 "));
}

#[test]
fn palette_wraps_only_when_enabled() {
    let colored = Palette { enabled: true };
    assert_eq!(colored.dim("x"), "\x1b[2mx\x1b[0m");
    assert_eq!(plain().heading("x"), "x");
    assert_eq!(level_color_code(ValidationLevel::Error), "31");
    assert_eq!(level_color_code(ValidationLevel::Warning), "33");
}

#[test]
fn zero_weight_children_show_their_share() {
    let root = TreeNode::new("root", "Root", 100.0)
        .with_child(TreeNode::new("a", "A", 100.0))
        .with_child(TreeNode::new("z", "Z", 0.0));
    let status = validate_tree(&root);
    let lines = tree_lines(&root, &status, &plain());
    assert_eq!(lines[2], "└── Z (0.0%) [z]");
}
