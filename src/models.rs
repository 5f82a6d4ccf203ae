use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PRIORITY: u8 = 2;
pub const MAX_PRIORITY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Open,
    Active,
    Closed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Parses a header status value. `done` is accepted as an alias for `closed`.
    pub fn parse(value: &str) -> StoreResult<Self> {
        match value {
            "open" => Ok(Self::Open),
            "active" => Ok(Self::Active),
            "closed" | "done" => Ok(Self::Closed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Stored in the dependent's `blocks` list and checked for cycles.
    Blocks,
    /// Expressed by file location only.
    ParentChild,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: u8,
    pub assignee: Option<String>,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub close_reason: Option<String>,
    pub blocks: Vec<String>,
    pub order: f64,
    /// Derived from the file location, never written to the header.
    pub parent: Option<String>,
    /// Derived from the file location, never written to the header.
    pub archived: bool,
}

impl Issue {
    pub fn new(id: &str, title: &str, created_at: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            status: Status::Open,
            priority: DEFAULT_PRIORITY,
            assignee: None,
            created_at: created_at.to_string(),
            closed_at: None,
            close_reason: None,
            blocks: Vec::new(),
            order: 0.0,
            parent: None,
            archived: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueRequest {
    /// Explicit identifier, used when importing. Generated when absent.
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Option<u8>,
    pub assignee: Option<String>,
    pub parent: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIssueRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some("")` clears the assignee.
    pub assignee: Option<String>,
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildIssue {
    #[serde(flatten)]
    pub issue: Issue,
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ResolveOutcome {
    Found(String),
    NotFound,
    Ambiguous(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ArchiveOutcome {
    Moved { path: PathBuf },
    AlreadyArchived,
    /// The record is a child; it moves with its parent's folder.
    AwaitingParent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanParent {
    pub id: String,
    pub dir: PathBuf,
    pub self_file_missing: bool,
}
