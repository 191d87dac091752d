use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::config::{ConfigError, Settings};
use crate::engine::{GenerationError, SlotEngine};
use crate::export::{self, ExportError, ImportReport};
use crate::history::{HistoryError, SlotHistory};
use crate::redistribute::FULL_SHARE;
use crate::slot::GeneratedSlot;
use crate::stats::{compare_with_tree, FrequencyComparison, StatisticsReport};
use crate::store::{JsonFilePersistence, NodeEdit, Persisted, Removed, StoreError, TreeStore};
use crate::tree::TreeNode;
use crate::validation::{self, AppliedCorrections, ValidationStatus};

/// Owns the store, the engine attached to it, and the slot history.
pub struct App {
    settings: Settings,
    store: TreeStore,
    engine: SlotEngine,
    history: SlotHistory,
}

#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub parent_id: String,
    pub label: String,
    pub percentage: Option<f64>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub redistribute: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub last: Option<usize>,
    pub latest: bool,
    pub category: Option<String>,
    pub node: Option<String>,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub report: StatisticsReport,
    pub expected: Vec<FrequencyComparison>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Generated {
    pub slots: Vec<GeneratedSlot>,
    pub recorded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub report: ImportReport,
    pub backup: PathBuf,
    #[serde(skip)]
    pub persisted: Persisted,
}

impl App {
    pub fn open(settings: Settings) -> Result<Self, AppError> {
        std::fs::create_dir_all(&settings.data_dir)?;
        ensure_parent_dir(&settings.tree_file)?;
        ensure_parent_dir(&settings.history_db)?;

        let mut store = TreeStore::open(Box::new(JsonFilePersistence::new(&settings.tree_file)));
        let engine = SlotEngine::attach(&mut store, settings.seed);
        let history = SlotHistory::open(&settings.history_db)?;
        info!(
            data_dir = %settings.data_dir.display(),
            engine_attached = engine.is_attached(),
            "slotree opened"
        );
        Ok(Self {
            settings,
            store,
            engine,
            history,
        })
    }

    #[cfg(test)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tree(&self) -> &TreeNode {
        self.store.root()
    }

    #[cfg(test)]
    pub fn summary(&self) -> crate::tree::TreeSummary {
        self.store.root().summary()
    }

    /// Adds a node and returns its generated id. Without an explicit
    /// percentage the node ends up with an equal share once its siblings are
    /// rescaled.
    pub fn add_node(&mut self, new: NewNode) -> Result<(String, Persisted), AppError> {
        let label = new.label.trim();
        if label.is_empty() {
            return Err(AppError::InvalidArgument(
                "node label must not be empty".to_string(),
            ));
        }
        let siblings = self
            .store
            .find(&new.parent_id)
            .ok_or_else(|| AppError::NotFound(new.parent_id.clone()))?
            .children()
            .len();
        let percentage = new.percentage.unwrap_or(if siblings == 0 {
            FULL_SHARE
        } else {
            FULL_SHARE / siblings as f64
        });

        let mut node = TreeNode::with_generated_id(label, percentage);
        if let Some(emoji) = new.emoji.filter(|emoji| !emoji.trim().is_empty()) {
            node = node.with_emoji(emoji.trim());
        }
        if let Some(description) = new.description.filter(|text| !text.trim().is_empty()) {
            node = node.with_description(description.trim());
        }
        if let Some(color) = new.color.as_deref() {
            node = node.with_color(color);
        }
        let id = node.id().to_string();

        let persisted = if new.redistribute {
            self.store.add_child(&new.parent_id, node)?
        } else {
            self.store
                .add_child_without_redistribution(&new.parent_id, node)?
        };
        Ok((id, persisted))
    }

    pub fn remove_node(&mut self, id: &str) -> Result<Removed, AppError> {
        Ok(self.store.remove_node(id)?)
    }

    pub fn move_node(&mut self, id: &str, new_parent_id: &str) -> Result<Persisted, AppError> {
        Ok(self.store.move_node(id, new_parent_id)?)
    }

    pub fn update_node(&mut self, id: &str, edit: NodeEdit) -> Result<Persisted, AppError> {
        Ok(self.store.update_node(id, edit)?)
    }

    pub fn reset_tree(&mut self) -> Persisted {
        self.store.reset_to_default()
    }

    pub fn validate(&self) -> ValidationStatus {
        validation::validate_tree(self.store.root())
    }

    pub fn fix_percentages(
        &mut self,
        parent_id: &str,
    ) -> Result<Option<AppliedCorrections>, AppError> {
        Ok(validation::apply_corrections(&mut self.store, parent_id)?)
    }

    pub fn generate(&mut self, count: usize, record: bool) -> Result<Generated, AppError> {
        if count == 0 {
            return Err(AppError::InvalidArgument(
                "count must be at least 1".to_string(),
            ));
        }
        let slots = self.engine.generate_slots(count)?;
        if !record {
            return Ok(Generated {
                slots,
                recorded: false,
            });
        }
        let slots = self.history.add_all(&slots)?;
        info!(
            recorded = slots.len(),
            total = self.history.count()?,
            "slots recorded"
        );
        Ok(Generated {
            slots,
            recorded: true,
        })
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<GeneratedSlot>, AppError> {
        if query.latest {
            return Ok(self.history.latest()?.into_iter().collect());
        }
        let mut slots = if query.since.is_some() || query.until.is_some() {
            let from = query.since.unwrap_or(OffsetDateTime::UNIX_EPOCH);
            let to = query.until.unwrap_or_else(OffsetDateTime::now_utc);
            self.history.by_date_range(from, to)?
        } else if let Some(node) = query.node.as_deref() {
            self.history.by_selected_node(node)?
        } else if let Some(category) = query.category.as_deref() {
            self.history.by_main_category(category)?
        } else {
            return match query.last {
                Some(count) => Ok(self.history.last(count)?),
                None => Ok(self.history.all()?),
            };
        };

        if let Some(category) = query.category.as_deref() {
            slots.retain(|slot| slot.main_category() == category);
        }
        if let Some(node) = query.node.as_deref() {
            slots.retain(|slot| slot.selected_node_name == node);
        }
        if let Some(count) = query.last {
            let skip = slots.len().saturating_sub(count);
            slots.drain(..skip);
        }
        Ok(slots)
    }

    pub fn remove_history_entry(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.history.remove(id)?)
    }

    pub fn clear_history(&mut self) -> Result<usize, AppError> {
        Ok(self.history.clear()?)
    }

    pub fn stats(&self) -> Result<StatsView, AppError> {
        let report = StatisticsReport::from_slots(&self.history.all()?);
        let expected = compare_with_tree(&report, &self.engine);
        Ok(StatsView { report, expected })
    }

    /// Writes the whole history; `out` defaults to a timestamped file in the
    /// export directory.
    pub fn export_slots(
        &self,
        format: SlotFormat,
        out: Option<&Path>,
    ) -> Result<PathBuf, AppError> {
        let extension = match format {
            SlotFormat::Csv => "csv",
            SlotFormat::Json => "json",
        };
        let path = self.export_target(out, "slots", extension)?;
        let slots = self.history.all()?;
        let writer = BufWriter::new(File::create(&path)?);
        match format {
            SlotFormat::Csv => export::export_slots_csv(&slots, writer)?,
            SlotFormat::Json => export::export_slots_json(&slots, writer)?,
        }
        Ok(path)
    }

    pub fn export_tree(&self, out: Option<&Path>) -> Result<PathBuf, AppError> {
        let path = self.export_target(out, "tree_config", "json")?;
        let writer = BufWriter::new(File::create(&path)?);
        export::export_tree_json(self.store.root(), writer)?;
        Ok(path)
    }

    /// Replaces the tree with the one in `path` after backing up the current
    /// tree. A rejected document leaves the tree and backups untouched.
    pub fn import_tree(&mut self, path: &Path) -> Result<ImportOutcome, AppError> {
        let reader = std::io::BufReader::new(File::open(path)?);
        let (root, report) = export::import_tree_json(reader)?;

        std::fs::create_dir_all(&self.settings.backup_dir)?;
        let backup = self
            .settings
            .backup_dir
            .join(export::timestamped_file_name("tree_backup", "json"));
        export::export_tree_json(self.store.root(), BufWriter::new(File::create(&backup)?))?;

        let persisted = self.store.replace_root(root)?;
        info!(
            source = %path.display(),
            backup = %backup.display(),
            saved = persisted.is_saved(),
            "tree imported"
        );
        Ok(ImportOutcome {
            report,
            backup,
            persisted,
        })
    }

    fn export_target(
        &self,
        out: Option<&Path>,
        base: &str,
        extension: &str,
    ) -> Result<PathBuf, AppError> {
        let path = match out {
            Some(path) => path.to_path_buf(),
            None => self
                .settings
                .export_dir
                .join(export::timestamped_file_name(base, extension)),
        };
        ensure_parent_dir(&path)?;
        Ok(path)
    }
}

/// Turns a failed save into an error once the caller has reported the change.
pub fn require_saved(persisted: &Persisted) -> Result<(), AppError> {
    match persisted {
        Persisted::Saved => Ok(()),
        Persisted::Failed(message) => Err(AppError::Unsaved(message.clone())),
    }
}

pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|err| {
        AppError::InvalidArgument(format!("invalid RFC3339 timestamp '{}': {}", raw, err))
    })
}

pub fn parse_slot_format(raw: &str) -> Result<SlotFormat, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "csv" => Ok(SlotFormat::Csv),
        "json" => Ok(SlotFormat::Json),
        _ => Err(AppError::InvalidArgument(format!(
            "unsupported export format '{}'; use csv|json",
            raw
        ))),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Config(ConfigError),
    Store(StoreError),
    Generation(GenerationError),
    History(HistoryError),
    Export(ExportError),
    InvalidArgument(String),
    NotFound(String),
    Unsaved(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Generation(err) => write!(f, "generation error: {}", err),
            AppError::History(err) => write!(f, "{}", err),
            AppError::Export(err) => write!(f, "{}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
            AppError::NotFound(id) => write!(f, "node '{}' not found", id),
            AppError::Unsaved(message) => {
                write!(f, "change applied but not saved: {}", message)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Generation(err) => Some(err),
            AppError::History(err) => Some(err),
            AppError::Export(err) => Some(err),
            AppError::InvalidArgument(_) => None,
            AppError::NotFound(_) => None,
            AppError::Unsaved(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<GenerationError> for AppError {
    fn from(value: GenerationError) -> Self {
        AppError::Generation(value)
    }
}

impl From<HistoryError> for AppError {
    fn from(value: HistoryError) -> Self {
        AppError::History(value)
    }
}

impl From<ExportError> for AppError {
    fn from(value: ExportError) -> Self {
        AppError::Export(value)
    }
}

#[cfg(test)]
mod tests;
