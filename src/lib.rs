pub mod archive;
pub mod atomic;
pub mod config;
pub mod errors;
pub mod frontmatter;
pub mod graph;
pub mod hierarchy;
pub mod ids;
pub mod models;
pub mod ordering;
pub mod resolver;
pub mod telemetry;
pub mod workspace;

pub use crate::errors::{StoreError, StoreResult};
pub use crate::frontmatter::HeaderMode;
pub use crate::models::{
    ArchiveOutcome, ChildIssue, CreateIssueRequest, DependencyKind, Issue, OrphanParent, ResolveOutcome, Status,
    UpdateIssueRequest,
};
pub use crate::ordering::Placement;
pub use crate::telemetry::init_tracing;
pub use crate::workspace::{Workspace, WorkspaceOptions};
