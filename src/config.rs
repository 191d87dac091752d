use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const SETTINGS_FILE: &str = "slotree.toml";
const DEFAULT_TREE_FILE: &str = "tree_config.json";
const DEFAULT_HISTORY_DB: &str = "slot_history.sqlite";
const DEFAULT_EXPORT_DIR: &str = "exports";
const BACKUP_DIR: &str = "backups";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Toml(err) => write!(f, "invalid settings TOML: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid settings: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettingsFile {
    tree_file: Option<PathBuf>,
    history_db: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    seed: Option<u64>,
    log_filter: Option<String>,
}

/// Where the tree, history and exports live, resolved against the data dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub tree_file: PathBuf,
    pub history_db: PathBuf,
    pub export_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub seed: Option<u64>,
    pub log_filter: Option<String>,
}

impl Settings {
    /// Reads `<data_dir>/slotree.toml` when present; defaults otherwise.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(SETTINGS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml(data_dir, &raw),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::defaults(data_dir)),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn defaults(data_dir: &Path) -> Self {
        Self::resolve(data_dir, RawSettingsFile::default())
    }

    pub(crate) fn from_toml(data_dir: &Path, raw: &str) -> Result<Self, ConfigError> {
        let file: RawSettingsFile = toml::from_str(raw)?;
        if let Some(filter) = file.log_filter.as_deref() {
            if filter.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "log_filter must not be empty".to_string(),
                ));
            }
        }
        Ok(Self::resolve(data_dir, file))
    }

    fn resolve(data_dir: &Path, file: RawSettingsFile) -> Self {
        let under = |value: Option<PathBuf>, default: &str| {
            let path = value.unwrap_or_else(|| PathBuf::from(default));
            if path.is_absolute() {
                path
            } else {
                data_dir.join(path)
            }
        };
        Self {
            data_dir: data_dir.to_path_buf(),
            tree_file: under(file.tree_file, DEFAULT_TREE_FILE),
            history_db: under(file.history_db, DEFAULT_HISTORY_DB),
            export_dir: under(file.export_dir, DEFAULT_EXPORT_DIR),
            backup_dir: data_dir.join(BACKUP_DIR),
            seed: file.seed,
            log_filter: file.log_filter,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Settings};
    use std::path::{Path, PathBuf};
    use uuid::Uuid;

    #[test]
    fn defaults_live_under_the_data_dir() {
        let settings = Settings::defaults(Path::new("/var/slotree"));
        assert_eq!(settings.tree_file, PathBuf::from("/var/slotree/tree_config.json"));
        assert_eq!(
            settings.history_db,
            PathBuf::from("/var/slotree/slot_history.sqlite")
        );
        assert_eq!(settings.export_dir, PathBuf::from("/var/slotree/exports"));
        assert_eq!(settings.backup_dir, PathBuf::from("/var/slotree/backups"));
        assert_eq!(settings.seed, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = Settings::from_toml(
            Path::new("/data"),
            r#"
tree_file = "trees/main.json"
history_db = "/tmp/history.sqlite"
seed = 42
log_filter = "slotree=debug"
"#,
        )
        .expect("settings should parse");
        assert_eq!(settings.tree_file, PathBuf::from("/data/trees/main.json"));
        assert_eq!(settings.history_db, PathBuf::from("/tmp/history.sqlite"));
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.log_filter.as_deref(), Some("slotree=debug"));
        assert_eq!(settings.clone().with_seed(None).seed, Some(42));
        assert_eq!(settings.with_seed(Some(7)).seed, Some(7));
    }

    #[test]
    fn rejects_unknown_keys_and_empty_filters() {
        let unknown = Settings::from_toml(Path::new("/data"), "colour = true\n");
        assert!(matches!(unknown, Err(ConfigError::Toml(_))));
        let empty = Settings::from_toml(Path::new("/data"), "log_filter = \"  \"\n");
        assert!(matches!(empty, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reads_the_settings_file_when_present() {
        let dir = std::env::temp_dir().join(format!("slotree-config-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        assert_eq!(
            Settings::load(&dir).expect("missing file uses defaults"),
            Settings::defaults(&dir)
        );

        std::fs::write(dir.join("slotree.toml"), "seed = 9\n").expect("settings write");
        assert_eq!(Settings::load(&dir).expect("settings load").seed, Some(9));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
