use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::tree::PATH_SEPARATOR;

pub const NODE_LEVEL_KEY: &str = "node_level";
pub const NODE_COLOR_KEY: &str = "node_color";
pub const FINAL_PERCENTAGE_KEY: &str = "final_percentage";
pub const TREE_DIGEST_KEY: &str = "tree_digest";

/// One generated outcome: the path from the root to the chosen leaf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedSlot {
    pub id: Option<i64>,
    pub generated_at: String,
    pub decision_path: String,
    pub selected_node_id: String,
    pub selected_node_name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl GeneratedSlot {
    pub fn new(
        decision_path: impl Into<String>,
        selected_node_id: impl Into<String>,
        selected_node_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            generated_at: now_utc_rfc3339(),
            decision_path: decision_path.into(),
            selected_node_id: selected_node_id.into(),
            selected_node_name: selected_node_name.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn path_segments(&self) -> Vec<&str> {
        self.decision_path.split(PATH_SEPARATOR).collect()
    }

    /// The first level below the root, or the selected name for a
    /// single-segment path.
    pub fn main_category(&self) -> &str {
        self.decision_path
            .split(PATH_SEPARATOR)
            .nth(1)
            .unwrap_or(&self.selected_node_name)
    }

    #[cfg(test)]
    pub fn last_level(&self) -> &str {
        if !self.decision_path.contains(PATH_SEPARATOR) {
            return &self.selected_node_name;
        }
        self.decision_path
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or(&self.selected_node_name)
    }

    pub fn generated_at_datetime(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.generated_at, &Rfc3339).ok()
    }
}

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}
