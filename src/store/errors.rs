use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    NotFound(String),
    DuplicateId(String),
    Cycle { node: String, target: String },
    RootNode(&'static str),
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::NotFound(id) => write!(f, "node '{}' not found in tree", id),
            StructuralError::DuplicateId(id) => write!(f, "node id '{}' is already in use", id),
            StructuralError::Cycle { node, target } => write!(
                f,
                "cannot move '{}' under '{}': target is the node itself or one of its descendants",
                node, target
            ),
            StructuralError::RootNode(operation) => {
                write!(f, "the root node cannot be the subject of {}", operation)
            }
        }
    }
}

impl Error for StructuralError {}

#[derive(Debug, Clone, PartialEq)]
pub enum PercentageError {
    NotFinite { node: String },
    OutOfRange { node: String, value: f64 },
    OnlyChild { node: String, value: f64 },
}

impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentageError::NotFinite { node } => {
                write!(f, "percentage of '{}' is not a finite number", node)
            }
            PercentageError::OutOfRange { node, value } => write!(
                f,
                "percentage of '{}' is {} but must be between 0 and 100",
                node, value
            ),
            PercentageError::OnlyChild { node, value } => write!(
                f,
                "'{}' is the only child of its parent and must stay at 100%, not {}",
                node, value
            ),
        }
    }
}

impl Error for PercentageError {}

#[derive(Debug)]
pub enum PersistenceError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(err) => write!(f, "I/O error: {}", err),
            PersistenceError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PersistenceError::Io(err) => Some(err),
            PersistenceError::Json(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(value: std::io::Error) -> Self {
        PersistenceError::Io(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        PersistenceError::Json(value)
    }
}

#[derive(Debug)]
pub enum StoreError {
    Structural(StructuralError),
    Percentage(PercentageError),
    Persistence(PersistenceError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Structural(err) => write!(f, "{}", err),
            StoreError::Percentage(err) => write!(f, "{}", err),
            StoreError::Persistence(err) => write!(f, "persistence error: {}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Structural(err) => Some(err),
            StoreError::Percentage(err) => Some(err),
            StoreError::Persistence(err) => Some(err),
        }
    }
}

impl From<StructuralError> for StoreError {
    fn from(value: StructuralError) -> Self {
        StoreError::Structural(value)
    }
}

impl From<PercentageError> for StoreError {
    fn from(value: PercentageError) -> Self {
        StoreError::Percentage(value)
    }
}

impl From<PersistenceError> for StoreError {
    fn from(value: PersistenceError) -> Self {
        StoreError::Persistence(value)
    }
}
