use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("ALREADY_EXISTS: {0}")]
    AlreadyExists(String),
    #[error("AMBIGUOUS_ID: '{prefix}' matches {}", .matches.join(", "))]
    AmbiguousId { prefix: String, matches: Vec<String> },
    #[error("DEPENDENCY_NOT_FOUND: {0}")]
    DependencyNotFound(String),
    #[error("DEPENDENCY_CYCLE: {from} -> {to}")]
    DependencyCycle { from: String, to: String },
    #[error("CHILDREN_NOT_CLOSED: {id} has open children: {}", .open.join(", "))]
    ChildrenNotClosed { id: String, open: Vec<String> },
    #[error("INVALID_FRONTMATTER: {0}")]
    InvalidFrontmatter(String),
    #[error("INVALID_STATUS: {0}")]
    InvalidStatus(String),
    #[error("INVALID_ID: {0}")]
    InvalidId(String),
    #[error("INVALID_CONFIG: {0}")]
    InvalidConfig(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{:#}", value))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
