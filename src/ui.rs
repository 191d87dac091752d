use std::io::{self, IsTerminal};

use crate::app::StatsView;
use crate::export::ImportReport;
use crate::slot::GeneratedSlot;
use crate::stats::StatisticsReport;
use crate::tree::TreeNode;
use crate::validation::{NodeValidation, PercentageCorrection, ValidationLevel, ValidationStatus};

pub fn print_tree(root: &TreeNode, status: &ValidationStatus) {
    let palette = Palette::auto();
    for line in tree_lines(root, status, &palette) {
        println!("{line}");
    }
    let summary = root.summary();
    println!(
        "{}",
        palette.dim(&format!(
            "{} node(s), {} leaf/leaves, depth {}",
            summary.node_count, summary.leaf_count, summary.max_depth
        ))
    );
}

fn tree_lines(root: &TreeNode, status: &ValidationStatus, palette: &Palette) -> Vec<String> {
    let mut lines = vec![format_node_row(root, status, palette)];
    push_children(root, "", status, palette, &mut lines);
    lines
}

fn push_children(
    node: &TreeNode,
    prefix: &str,
    status: &ValidationStatus,
    palette: &Palette,
    lines: &mut Vec<String>,
) {
    if !node.is_expanded() && node.has_children() {
        lines.push(format!(
            "{prefix}{}",
            palette.dim(&format!("└── … {} hidden", node.children().len()))
        ));
        return;
    }
    let count = node.children().len();
    for (index, child) in node.children().iter().enumerate() {
        let last = index + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        lines.push(format!(
            "{prefix}{}{}",
            palette.dim(branch),
            format_node_row(child, status, palette)
        ));
        let next = format!("{prefix}{}", if last { "    " } else { "│   " });
        push_children(child, &next, status, palette, lines);
    }
}

fn format_node_row(node: &TreeNode, status: &ValidationStatus, palette: &Palette) -> String {
    let mut line = format!("{} {}", node, palette.id(&format!("[{}]", node.id())));
    if let Some(result) = status.nodes.get(node.id()) {
        if result.level != ValidationLevel::Valid {
            line.push(' ');
            line.push_str(&palette.level(result.level, &result.message));
        }
    }
    line
}

pub fn print_validation(status: &ValidationStatus) {
    let palette = Palette::auto();
    println!(
        "{} {}",
        palette.level(status.level, &format!("[{}]", status.level.as_str().to_ascii_uppercase())),
        status.message
    );
    for (id, result) in status.problems() {
        println!("{}", format_problem(id, result, &palette));
    }
}

fn format_problem(id: &str, result: &NodeValidation, palette: &Palette) -> String {
    let mut line = format!(
        "  {} {} {}",
        palette.level(result.level, result.level.as_str()),
        palette.id(id),
        result.message
    );
    if let Some(suggested) = result.suggested_percentage {
        line.push_str(&palette.dim(&format!(" (first child -> {suggested:.1}%)")));
    }
    line
}

pub fn print_corrections(corrections: &[PercentageCorrection]) {
    let palette = Palette::auto();
    for correction in corrections {
        println!(
            "  {} {}: {:.1}% -> {:.1}% {}",
            palette.id(&correction.node_id),
            correction.label,
            correction.current,
            correction.corrected,
            palette.dim(&format!("({:+.1})", correction.delta))
        );
    }
}

pub fn print_slots(slots: &[GeneratedSlot]) {
    let palette = Palette::auto();
    if slots.is_empty() {
        println!("{}", palette.dim("no slots"));
        return;
    }
    for slot in slots {
        println!("{}", format_slot_row(slot, &palette));
    }
    println!("{}", palette.dim(&format!("{} slot(s)", slots.len())));
}

fn format_slot_row(slot: &GeneratedSlot, palette: &Palette) -> String {
    let id = slot
        .id
        .map(|id| format!("#{id}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} {}",
        palette.id(&id),
        palette.dim(&slot.generated_at),
        slot.decision_path
    )
}

pub fn print_stats(view: &StatsView) {
    let palette = Palette::auto();
    let report = &view.report;
    println!("{}", palette.heading(&format!("{} slot(s)", report.total)));
    if report.total == 0 {
        return;
    }
    if let (Some(first), Some(last)) = (&report.temporal.first, &report.temporal.last) {
        println!("{}", palette.dim(&format!("from {first} to {last}")));
    }

    println!("{}", palette.heading("By category"));
    for (key, count, share) in StatisticsReport::ranked(&report.by_main_category, report.total) {
        println!("  {key}: {count} ({share:.1}%)");
    }

    println!("{}", palette.heading("Expected vs observed"));
    for row in &view.expected {
        let label = report
            .by_node
            .get(&row.id)
            .map(|node| node.label.clone())
            .unwrap_or_else(|| row.path.clone());
        println!(
            "  {label}: {:.1}% expected, {:.1}% observed ({})",
            row.expected, row.observed, row.count
        );
    }

    println!("{}", palette.heading("By day"));
    for (day, count) in &report.temporal.daily {
        println!("  {day}: {count}");
    }
}

pub fn print_import(report: &ImportReport) {
    let palette = Palette::auto();
    println!("imported {} node(s)", report.node_count);
    for warning in &report.warnings {
        println!("  {}", palette.level(ValidationLevel::Warning, warning));
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn level(&self, level: ValidationLevel, text: &str) -> String {
        self.paint(level_color_code(level), text)
    }
}

fn level_color_code(level: ValidationLevel) -> &'static str {
    match level {
        ValidationLevel::Valid => "32",
        ValidationLevel::Warning => "33",
        ValidationLevel::Error => "31",
    }
}

#[cfg(test)]
#[path = "ui_tests_ext.rs"]
mod tests;
