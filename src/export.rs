use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::redistribute::{redistribute_to_hundred, FULL_SHARE};
use crate::slot::{now_utc_rfc3339, GeneratedSlot};
use crate::store::check_percentage;
use crate::tree::{TreeNode, TreeNodeRecord};
use crate::validation::{validate_tree, ValidationStatus, ERROR_TOLERANCE};

pub const EXPORT_VERSION: &str = "1.0";
const EXPORT_DESCRIPTION: &str = "slotree tree configuration";
const CSV_HEADER: [&str; 6] = [
    "id",
    "generated_at",
    "decision_path",
    "selected_node_id",
    "selected_node_name",
    "metadata",
];

#[derive(Debug)]
pub enum ExportError {
    Io(io::Error),
    Json(serde_json::Error),
    Rejected(Vec<String>),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(err) => write!(f, "I/O error: {}", err),
            ExportError::Json(err) => write!(f, "JSON error: {}", err),
            ExportError::Rejected(errors) => {
                write!(f, "tree import rejected: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(err) => Some(err),
            ExportError::Json(err) => Some(err),
            ExportError::Rejected(_) => None,
        }
    }
}

impl From<io::Error> for ExportError {
    fn from(value: io::Error) -> Self {
        ExportError::Io(value)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(value: serde_json::Error) -> Self {
        ExportError::Json(value)
    }
}

#[derive(Debug, Serialize)]
pub struct TreeExport {
    pub exported_at: String,
    pub version: String,
    pub description: String,
    pub root: TreeNodeRecord,
    pub validation: ValidationStatus,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Envelope { root: TreeNodeRecord },
    Bare(TreeNodeRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub node_count: usize,
    pub normalized: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn export_slots_csv<W: Write>(slots: &[GeneratedSlot], mut writer: W) -> Result<(), ExportError> {
    writeln!(writer, "{}", CSV_HEADER.join(","))?;
    for slot in slots {
        let id = slot.id.map(|id| id.to_string()).unwrap_or_default();
        let fields = [
            id,
            slot.generated_at.clone(),
            slot.decision_path.clone(),
            slot.selected_node_id.clone(),
            slot.selected_node_name.clone(),
            metadata_cell(slot),
        ];
        let row = fields
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{row}")?;
    }
    writer.flush()?;
    info!(count = slots.len(), "slots exported as CSV");
    Ok(())
}

pub fn export_slots_json<W: Write>(slots: &[GeneratedSlot], mut writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, slots)?;
    writeln!(writer)?;
    writer.flush()?;
    info!(count = slots.len(), "slots exported as JSON");
    Ok(())
}

pub fn tree_export(root: &TreeNode) -> TreeExport {
    TreeExport {
        exported_at: now_utc_rfc3339(),
        version: EXPORT_VERSION.to_string(),
        description: EXPORT_DESCRIPTION.to_string(),
        root: TreeNodeRecord::from(root),
        validation: validate_tree(root),
    }
}

pub fn export_tree_json<W: Write>(root: &TreeNode, mut writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, &tree_export(root))?;
    writeln!(writer)?;
    writer.flush()?;
    info!(nodes = root.summary().node_count, "tree exported");
    Ok(())
}

/// Parses either a bare tree record or a [`TreeExport`] envelope.
///
/// Duplicate ids and out-of-range percentages reject the whole document.
/// Parents whose children drift from 100% are rescaled and reported.
pub fn import_tree_json<R: Read>(reader: R) -> Result<(TreeNode, ImportReport), ExportError> {
    let record = match serde_json::from_reader::<_, ImportDocument>(reader)? {
        ImportDocument::Envelope { root } => root,
        ImportDocument::Bare(root) => root,
    };
    let mut root = record.into_tree();

    let errors = import_errors(&root);
    if !errors.is_empty() {
        warn!(errors = errors.len(), "tree import rejected");
        return Err(ExportError::Rejected(errors));
    }

    let mut report = ImportReport {
        node_count: root.summary().node_count,
        ..ImportReport::default()
    };
    if (root.percentage - FULL_SHARE).abs() > ERROR_TOLERANCE {
        report.warnings.push(format!(
            "root percentage is {:.1}%, expected 100%",
            root.percentage
        ));
    }

    let drifting = root
        .all_nodes()
        .into_iter()
        .filter(|node| node.has_children())
        .filter(|node| (node.children_sum() - FULL_SHARE).abs() > ERROR_TOLERANCE)
        .map(|node| (node.id().to_string(), node.label.clone(), node.children_sum()))
        .collect::<Vec<_>>();
    for (id, label, sum) in drifting {
        if let Some(parent) = root.find_by_id_mut(&id) {
            redistribute_to_hundred(parent);
        }
        report.warnings.push(format!(
            "children of '{label}' summed to {sum:.1}%, rescaled to 100%"
        ));
        report.normalized.push(id);
    }

    info!(
        nodes = report.node_count,
        normalized = report.normalized.len(),
        "tree imported"
    );
    Ok((root, report))
}

fn import_errors(root: &TreeNode) -> Vec<String> {
    let mut errors = root
        .duplicate_ids()
        .into_iter()
        .map(|id| format!("duplicate id '{id}'"))
        .collect::<Vec<_>>();
    for node in root.all_nodes() {
        if let Err(err) = check_percentage(node.id(), node.percentage) {
            let path = root
                .path_string(node.id())
                .unwrap_or_else(|| node.label.clone());
            errors.push(format!("{err} (at {path})"));
        }
    }
    errors
}

/// `<base>_<YYYYMMDD>_<HHMMSS>.<extension>` in UTC.
pub fn timestamped_file_name(base: &str, extension: &str) -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{base}_{:04}{:02}{:02}_{:02}{:02}{:02}.{extension}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn metadata_cell(slot: &GeneratedSlot) -> String {
    slot.metadata
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}={text}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        csv_field, export_slots_csv, export_slots_json, export_tree_json, import_tree_json,
        timestamped_file_name, ExportError,
    };
    use crate::slot::GeneratedSlot;
    use crate::tree::{default_tree, TreeNode};

    fn sample_slot() -> GeneratedSlot {
        let mut slot = GeneratedSlot::new("Root > Branch, A > Item \"A1\"", "subA1", "Item \"A1\"")
            .with_metadata("node_level", 2)
            .with_metadata("node_color", "#81A1C1");
        slot.id = Some(7);
        slot.generated_at = "2024-03-01T09:00:00Z".to_string();
        slot
    }

    #[test]
    fn csv_quotes_commas_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let mut out = Vec::new();
        export_slots_csv(&[sample_slot()], &mut out).expect("csv export");
        let text = String::from_utf8(out).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,generated_at,decision_path,selected_node_id,selected_node_name,metadata")
        );
        assert_eq!(
            lines.next(),
            Some(
                "7,2024-03-01T09:00:00Z,\"Root > Branch, A > Item \"\"A1\"\"\",subA1,\"Item \"\"A1\"\"\",node_color=#81A1C1; node_level=2"
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn json_export_is_an_array_of_slots() {
        let mut out = Vec::new();
        export_slots_json(&[sample_slot()], &mut out).expect("json export");
        let parsed: Vec<GeneratedSlot> = serde_json::from_slice(&out).expect("parse back");
        assert_eq!(parsed, vec![sample_slot()]);
    }

    #[test]
    fn tree_export_round_trips_through_import() {
        let mut out = Vec::new();
        export_tree_json(&default_tree(), &mut out).expect("tree export");
        let envelope: serde_json::Value = serde_json::from_slice(&out).expect("valid json");
        assert_eq!(envelope["version"], "1.0");
        assert_eq!(envelope["validation"]["level"], "valid");
        assert_eq!(envelope["root"]["id"], "root");

        let (root, report) = import_tree_json(out.as_slice()).expect("import");
        assert_eq!(root, default_tree());
        assert_eq!(report.node_count, 7);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn bare_record_import_normalizes_drifting_parents() {
        let raw = r#"{
            "id": "root", "label": "Root", "percentage": 100,
            "children": [
                {"id": "a", "label": "A", "percentage": 60},
                {"id": "b", "label": "B", "percentage": 90}
            ]
        }"#;
        let (root, report) = import_tree_json(raw.as_bytes()).expect("import");
        assert_eq!(report.normalized, vec!["root".to_string()]);
        assert_eq!(report.warnings.len(), 1);
        assert!((root.children_sum() - 100.0).abs() < 0.001);
        let a = root.find_by_id("a").expect("a");
        assert!((a.percentage - 40.0).abs() < 1e-9);
        assert_eq!(a.parent_id(), Some("root"));
    }

    #[test]
    fn import_rejects_duplicates_and_bad_percentages() {
        let raw = r#"{
            "id": "root", "label": "Root", "percentage": 100,
            "children": [
                {"id": "x", "label": "X", "percentage": 50},
                {"id": "x", "label": "Other X", "percentage": 150}
            ]
        }"#;
        match import_tree_json(raw.as_bytes()) {
            Err(ExportError::Rejected(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("duplicate id 'x'"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(
            import_tree_json("not json".as_bytes()),
            Err(ExportError::Json(_))
        ));
    }

    #[test]
    fn root_percentage_mismatch_is_a_warning() {
        let root = TreeNode::new("root", "Root", 80.0).with_child(TreeNode::new("a", "A", 100.0));
        let raw = serde_json::to_vec(&crate::tree::TreeNodeRecord::from(&root)).expect("record");
        let (_, report) = import_tree_json(raw.as_slice()).expect("import");
        assert_eq!(report.warnings, vec!["root percentage is 80.0%, expected 100%"]);
    }

    #[test]
    fn file_names_carry_a_timestamp() {
        let name = timestamped_file_name("slots", "csv");
        assert!(name.starts_with("slots_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "slots_20240301_090000.csv".len());
    }
}
