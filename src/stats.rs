use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use time::UtcOffset;

use crate::engine::SlotEngine;
use crate::slot::GeneratedSlot;
use crate::tree::PATH_SEPARATOR;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemporalStats {
    pub first: Option<String>,
    pub last: Option<String>,
    pub daily: BTreeMap<String, usize>,
    pub hourly: BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub total: usize,
    pub by_main_category: BTreeMap<String, usize>,
    /// Keyed by node id; the label says where the node sits.
    pub by_node: BTreeMap<String, NodeCount>,
    pub by_path: BTreeMap<String, usize>,
    pub temporal: TemporalStats,
    pub metadata: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyComparison {
    pub id: String,
    pub path: String,
    pub count: usize,
    pub expected: f64,
    pub observed: f64,
}

impl StatisticsReport {
    pub fn from_slots(slots: &[GeneratedSlot]) -> Self {
        let mut report = StatisticsReport {
            total: slots.len(),
            ..StatisticsReport::default()
        };
        let mut timestamps = Vec::new();

        for slot in slots {
            *report
                .by_main_category
                .entry(slot.main_category().to_string())
                .or_default() += 1;
            *report
                .by_path
                .entry(slot.decision_path.clone())
                .or_default() += 1;
            report
                .by_node
                .entry(slot.selected_node_id.clone())
                .or_insert_with(|| NodeCount {
                    label: node_label(slot),
                    count: 0,
                })
                .count += 1;

            for (key, value) in &slot.metadata {
                *report
                    .metadata
                    .entry(key.clone())
                    .or_default()
                    .entry(metadata_text(value))
                    .or_default() += 1;
            }

            if let Some(at) = slot.generated_at_datetime() {
                timestamps.push((at.to_offset(UtcOffset::UTC), slot.generated_at.as_str()));
            }
        }

        timestamps.sort_by_key(|(at, _)| *at);
        for (at, _) in &timestamps {
            *report.temporal.daily.entry(at.date().to_string()).or_default() += 1;
            *report.temporal.hourly.entry(at.hour()).or_default() += 1;
        }
        report.temporal.first = timestamps.first().map(|(_, raw)| raw.to_string());
        report.temporal.last = timestamps.last().map(|(_, raw)| raw.to_string());
        report
    }

    /// `(key, count, share)` rows, most frequent first.
    pub fn ranked(counts: &BTreeMap<String, usize>, total: usize) -> Vec<(&str, usize, f64)> {
        let mut rows = counts
            .iter()
            .map(|(key, count)| (key.as_str(), *count, share(*count, total)))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }
}

/// Percentage of `total`, rounded to one decimal.
pub fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 100.0 / total as f64 * 10.0).round() / 10.0
}

/// Observed share of every leaf next to the share its weights predict.
pub fn compare_with_tree(report: &StatisticsReport, engine: &SlotEngine) -> Vec<FrequencyComparison> {
    engine
        .leaf_probabilities()
        .into_iter()
        .map(|leaf| {
            let count = report.by_node.get(&leaf.id).map_or(0, |node| node.count);
            FrequencyComparison {
                expected: (leaf.probability * 1000.0).round() / 10.0,
                observed: share(count, report.total),
                count,
                id: leaf.id,
                path: leaf.path,
            }
        })
        .collect()
}

/// "Name [Parent > Path]" without the root segment and without pictographs.
fn node_label(slot: &GeneratedSlot) -> String {
    let name = strip_symbols(&slot.selected_node_name);
    let segments = slot.path_segments();
    if segments.len() < 3 {
        return name;
    }
    let parents = segments[1..segments.len() - 1]
        .iter()
        .map(|segment| strip_symbols(segment))
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR);
    format!("{name} [{parents}]")
}

pub fn strip_symbols(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii() || c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn metadata_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{compare_with_tree, share, strip_symbols, StatisticsReport};
    use crate::engine::SlotEngine;
    use crate::slot::GeneratedSlot;
    use crate::store::{MemoryPersistence, TreeStore};
    use crate::tree::default_tree;

    fn slot(path: &str, id: &str, at: &str) -> GeneratedSlot {
        let name = path.rsplit(" > ").next().unwrap_or(path).to_string();
        let mut slot = GeneratedSlot::new(path, id, name).with_metadata("node_color", "#88C0D0");
        slot.generated_at = at.to_string();
        slot
    }

    fn sample() -> Vec<GeneratedSlot> {
        vec![
            slot("🌳 Main Tree > 📊 Branch A > 🔹 Item A1", "subA1", "2024-03-01T09:10:00Z"),
            slot("🌳 Main Tree > 📊 Branch A > 🔹 Item A1", "subA1", "2024-03-01T09:50:00Z"),
            slot("🌳 Main Tree > 📊 Branch A > 🔹 Item A2", "subA2", "2024-03-01T14:00:00Z"),
            slot("🌳 Main Tree > 📈 Branch B > 🔸 Item B1", "subB1", "2024-03-02T09:00:00+02:00"),
        ]
    }

    #[test]
    fn groups_by_category_node_and_path() {
        let report = StatisticsReport::from_slots(&sample());
        assert_eq!(report.total, 4);
        assert_eq!(report.by_main_category["📊 Branch A"], 3);
        assert_eq!(report.by_main_category["📈 Branch B"], 1);
        assert_eq!(report.by_node["subA1"].count, 2);
        assert_eq!(report.by_node["subA1"].label, "Item A1 [Branch A]");
        assert_eq!(
            report.by_path["🌳 Main Tree > 📊 Branch A > 🔹 Item A1"],
            2
        );
        assert_eq!(report.metadata["node_color"]["#88C0D0"], 4);
    }

    #[test]
    fn temporal_distribution_uses_utc() {
        let report = StatisticsReport::from_slots(&sample());
        assert_eq!(report.temporal.first.as_deref(), Some("2024-03-01T09:10:00Z"));
        assert_eq!(report.temporal.last.as_deref(), Some("2024-03-02T09:00:00+02:00"));
        assert_eq!(report.temporal.daily["2024-03-01"], 3);
        assert_eq!(report.temporal.daily["2024-03-02"], 1);
        assert_eq!(report.temporal.hourly[&9], 2);
        assert_eq!(report.temporal.hourly[&7], 1);
    }

    #[test]
    fn empty_history_gives_an_empty_report() {
        let report = StatisticsReport::from_slots(&[]);
        assert_eq!(report.total, 0);
        assert!(report.temporal.first.is_none());
        assert_eq!(share(0, 0), 0.0);
    }

    #[test]
    fn shares_round_to_one_decimal_and_rank_by_count() {
        assert_eq!(share(1, 3), 33.3);
        assert_eq!(share(2, 3), 66.7);
        let report = StatisticsReport::from_slots(&sample());
        let ranked = StatisticsReport::ranked(&report.by_main_category, report.total);
        assert_eq!(ranked[0], ("📊 Branch A", 3, 75.0));
        assert_eq!(ranked[1], ("📈 Branch B", 1, 25.0));
    }

    #[test]
    fn strips_pictographs_but_keeps_accents() {
        assert_eq!(strip_symbols("🔹 Élément A1"), "Élément A1");
        assert_eq!(strip_symbols("🌳"), "");
    }

    #[test]
    fn compares_observed_with_expected_frequencies() {
        let mut store = TreeStore::with_root(default_tree(), Box::new(MemoryPersistence::new()));
        let engine = SlotEngine::attach(&mut store, Some(3));
        let report = StatisticsReport::from_slots(&sample());
        let rows = compare_with_tree(&report, &engine);
        assert_eq!(rows.len(), 4);
        let a1 = rows.iter().find(|row| row.id == "subA1").expect("A1 row");
        assert_eq!(a1.expected, 42.0);
        assert_eq!(a1.observed, 50.0);
        let b2 = rows.iter().find(|row| row.id == "subB2").expect("B2 row");
        assert_eq!(b2.count, 0);
        assert_eq!(b2.observed, 0.0);
    }
}
