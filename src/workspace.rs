use crate::archive;
use crate::atomic;
use crate::config;
use crate::errors::{StoreError, StoreResult};
use crate::frontmatter::{self, HeaderMode};
use crate::graph;
use crate::hierarchy;
use crate::ids;
use crate::models::{
    ArchiveOutcome, ChildIssue, CreateIssueRequest, DependencyKind, Issue, OrphanParent, ResolveOutcome, Status,
    UpdateIssueRequest, MAX_PRIORITY,
};
use crate::ordering::{self, Placement};
use crate::resolver::{self, record_file_name, Location};
use chrono::{SecondsFormat, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

const DEFAULT_PREFIX: &str = "issue";
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceOptions {
    /// Reject documents with invalid `blocks` entries instead of dropping the entries.
    pub strict_headers: bool,
}

/// The issue store rooted at one directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    options: WorkspaceOptions,
}

impl Workspace {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(root, WorkspaceOptions::default())
    }

    pub fn open_with(root: impl Into<PathBuf>, options: WorkspaceOptions) -> StoreResult<Self> {
        let workspace = Self {
            root: root.into(),
            options,
        };
        workspace.ensure_topology()?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_topology(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(resolver::archive_root(&self.root))?;
        Ok(())
    }

    fn mode(&self) -> HeaderMode {
        if self.options.strict_headers {
            HeaderMode::Strict
        } else {
            HeaderMode::Lenient
        }
    }

    pub fn get(&self, id: &str) -> StoreResult<Issue> {
        let path = resolver::locate(&self.root, id)?;
        self.read_issue(&path)
    }

    /// Reads a record from a path relative to the root (or an absolute path inside it).
    pub fn get_by_path(&self, path: &Path) -> StoreResult<Issue> {
        if path.components().any(|component| matches!(component, Component::ParentDir)) {
            return Err(StoreError::NotFound(format!(
                "path escapes the store: {}",
                path.to_string_lossy()
            )));
        }
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !resolver::is_record_file(&path) || !path.is_file() {
            return Err(StoreError::NotFound(format!("no record file at {}", path.to_string_lossy())));
        }
        self.read_issue(&path)
    }

    pub fn list(&self, status: Option<Status>) -> StoreResult<Vec<Issue>> {
        let mut issues: Vec<Issue> = self
            .scan(false)?
            .into_iter()
            .map(|(_, issue)| issue)
            .filter(|issue| status.map_or(true, |wanted| issue.status == wanted))
            .collect();
        issues.sort_by(compare_for_listing);
        Ok(issues)
    }

    pub fn list_all(&self) -> StoreResult<Vec<Issue>> {
        let mut issues: Vec<Issue> = self.scan(true)?.into_iter().map(|(_, issue)| issue).collect();
        issues.sort_by(compare_for_listing);
        Ok(issues)
    }

    /// Recomputed on every call from the live tree; archived blockers count as resolved.
    pub fn ready(&self) -> StoreResult<Vec<Issue>> {
        let issues = self.list(None)?;
        Ok(graph::compute_ready(&issues).into_iter().cloned().collect())
    }

    pub fn children(&self, parent_id: &str) -> StoreResult<Vec<ChildIssue>> {
        let location = self.locate(parent_id)?;
        let children = self.children_of(&location)?;
        if children.is_empty() {
            return Ok(Vec::new());
        }
        let live = self.list(None)?;
        let statuses = graph::status_index(&live);
        Ok(children
            .into_iter()
            .map(|issue| {
                let blocked = graph::is_blocked(&issue, &statuses);
                ChildIssue { issue, blocked }
            })
            .collect())
    }

    pub fn roots(&self) -> StoreResult<Vec<Issue>> {
        let files = resolver::member_files(&self.root, None, true)?;
        let mut issues = self.load_many(files);
        issues.sort_by(compare_siblings);
        Ok(issues)
    }

    /// Case-insensitive substring match over text fields and timestamps, archive included.
    pub fn search(&self, query: &str) -> StoreResult<Vec<Issue>> {
        let needle = query.to_lowercase();
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|issue| {
                [
                    Some(issue.title.as_str()),
                    Some(issue.description.as_str()),
                    issue.close_reason.as_deref(),
                    Some(issue.created_at.as_str()),
                    issue.closed_at.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect())
    }

    pub fn resolve_id(&self, prefix: &str) -> StoreResult<String> {
        resolver::resolve_prefix(&self.root, prefix)
    }

    pub fn resolve_ids(&self, prefixes: &[&str]) -> StoreResult<Vec<ResolveOutcome>> {
        resolver::resolve_prefixes(&self.root, prefixes)
    }

    pub fn create(&self, request: CreateIssueRequest) -> StoreResult<Issue> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidFrontmatter("title is empty".to_string()));
        }
        let priority = validate_priority(request.priority.unwrap_or(crate::models::DEFAULT_PRIORITY))?;
        for id in [&request.parent, &request.after, &request.before].into_iter().flatten() {
            ids::validate(id)?;
        }

        let mut blocks: Vec<String> = Vec::with_capacity(request.blocks.len());
        for blocker in &request.blocks {
            ids::validate(blocker)?;
            if !resolver::exists(&self.root, blocker)? {
                return Err(StoreError::DependencyNotFound(blocker.clone()));
            }
            if !blocks.contains(blocker) {
                blocks.push(blocker.clone());
            }
        }

        let parent = match request.parent.as_deref() {
            Some(parent_id) => Some(self.locate_live(parent_id)?),
            None => None,
        };

        let id = match request.id.as_deref() {
            Some(explicit) => {
                validate_new_id(explicit)?;
                if resolver::exists(&self.root, explicit)? {
                    return Err(StoreError::AlreadyExists(format!("issue '{}' already exists", explicit)));
                }
                explicit.to_string()
            }
            None => self.generate_id(title)?,
        };

        let siblings = match &parent {
            Some(location) => match location.children_dir() {
                Some(dir) => self.load_many(resolver::member_files(&dir, Some(location.id.as_str()), false)?),
                None => Vec::new(),
            },
            None => self.roots()?,
        };
        let placement = Placement::from_anchors(request.after.as_deref(), request.before.as_deref());
        let keyed: Vec<(&str, f64)> = siblings.iter().map(|issue| (issue.id.as_str(), issue.order)).collect();
        let order = ordering::compute_order_key(&keyed, placement)?;

        let target_dir = match &parent {
            Some(location) => hierarchy::ensure_parent_folder(&location.container_dir(), &location.id)?,
            None => self.root.clone(),
        };

        let now = now_timestamp();
        let mut issue = Issue::new(&id, title, &now);
        issue.description = request.description;
        issue.status = request.status;
        issue.priority = priority;
        issue.assignee = request.assignee.filter(|value| !value.is_empty());
        issue.blocks = blocks;
        issue.order = order;
        if issue.status.is_closed() {
            issue.closed_at = Some(now);
        }

        let path = target_dir.join(record_file_name(&id));
        self.write_issue(&path, &issue)?;
        issue.parent = parent.map(|location| location.id);
        tracing::info!(id = %issue.id, parent = ?issue.parent, "created issue");
        Ok(issue)
    }

    pub fn update(&self, id: &str, request: UpdateIssueRequest) -> StoreResult<Issue> {
        let path = resolver::locate(&self.root, id)?;
        let mut issue = self.read_issue(&path)?;

        if let Some(title) = request.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(StoreError::InvalidFrontmatter("title is empty".to_string()));
            }
            issue.title = title.to_string();
        }
        if let Some(description) = request.description {
            issue.description = description;
        }
        if let Some(assignee) = request.assignee {
            issue.assignee = (!assignee.is_empty()).then_some(assignee);
        }
        if let Some(priority) = request.priority {
            issue.priority = validate_priority(priority)?;
        }

        self.write_issue(&path, &issue)?;
        Ok(issue)
    }

    /// Writes the new status; closing archives the record (or its folder) when it can move.
    pub fn update_status(&self, id: &str, status: Status, reason: Option<&str>) -> StoreResult<Issue> {
        let mut location = self.locate(id)?;
        let mut issue = self.read_issue(&location.path)?;

        if status.is_closed() {
            archive::ensure_subtree_closed(&location, self.mode())?;

            if !issue.status.is_closed() || issue.closed_at.is_none() {
                issue.closed_at = Some(now_timestamp());
            }
            issue.status = Status::Closed;
            if let Some(reason) = reason {
                issue.close_reason = Some(reason.to_string());
            }
            self.write_issue(&location.path, &issue)?;

            if let ArchiveOutcome::Moved { path } = archive::archive_entry(&self.root, &location, self.mode())? {
                location = resolver::classify(&self.root, &path)?;
            }
        } else {
            if location.archived {
                archive::restore_entry(&self.root, &location)?;
                location = self.locate(id)?;
            }
            issue.status = status;
            issue.closed_at = None;
            issue.close_reason = None;
            self.write_issue(&location.path, &issue)?;
        }

        issue.parent = location.parent;
        issue.archived = location.archived;
        tracing::info!(id = %id, status = status.as_str(), archived = issue.archived, "status updated");
        Ok(issue)
    }

    pub fn add_dependency(&self, from: &str, to: &str, kind: DependencyKind) -> StoreResult<()> {
        ids::validate(from)?;
        ids::validate(to)?;
        let from_path = resolver::locate(&self.root, from)?;
        if !resolver::exists(&self.root, to)? {
            return Err(StoreError::DependencyNotFound(to.to_string()));
        }

        match kind {
            DependencyKind::ParentChild => Ok(()),
            DependencyKind::Blocks => {
                let all = self.list_all()?;
                if graph::would_create_cycle(&graph::build_graph(&all), from, to) {
                    return Err(StoreError::DependencyCycle {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                let mut issue = self.read_issue(&from_path)?;
                if issue.blocks.iter().any(|blocker| blocker == to) {
                    return Ok(());
                }
                issue.blocks.push(to.to_string());
                self.write_issue(&from_path, &issue)?;
                tracing::info!(from = %from, to = %to, "added blocks edge");
                Ok(())
            }
        }
    }

    /// Returns whether an edge was removed.
    pub fn remove_dependency(&self, from: &str, to: &str) -> StoreResult<bool> {
        ids::validate(to)?;
        let path = resolver::locate(&self.root, from)?;
        let mut issue = self.read_issue(&path)?;
        let before = issue.blocks.len();
        issue.blocks.retain(|blocker| blocker != to);
        if issue.blocks.len() == before {
            return Ok(false);
        }
        self.write_issue(&path, &issue)?;
        Ok(true)
    }

    /// Changes an id and rewrites every `blocks` reference to it.
    pub fn rename(&self, old_id: &str, new_id: &str) -> StoreResult<Issue> {
        validate_new_id(new_id)?;
        let location = self.locate(old_id)?;
        if resolver::exists(&self.root, new_id)? {
            return Err(StoreError::AlreadyExists(format!("issue '{}' already exists", new_id)));
        }

        let container = location.container_dir();
        let new_path = if location.is_folder {
            let new_folder = container.join(new_id);
            if new_folder.exists() {
                return Err(StoreError::AlreadyExists(new_folder.to_string_lossy().to_string()));
            }
            let old_folder = location.entry_path();
            atomic::rename(&old_folder, &new_folder)?;
            let new_path = new_folder.join(record_file_name(new_id));
            if let Err(error) = atomic::rename(&new_folder.join(record_file_name(old_id)), &new_path) {
                if let Err(undo) = atomic::rename(&new_folder, &old_folder) {
                    tracing::error!(from = %new_folder.to_string_lossy(), error = %undo, "failed to restore folder after rename error");
                }
                return Err(error);
            }
            new_path
        } else {
            let new_path = container.join(record_file_name(new_id));
            atomic::rename(&location.path, &new_path)?;
            new_path
        };

        self.rewrite_references(|blocks| {
            let mut changed = false;
            for blocker in blocks.iter_mut().filter(|blocker| blocker.as_str() == old_id) {
                *blocker = new_id.to_string();
                changed = true;
            }
            if changed {
                let mut seen = HashSet::new();
                blocks.retain(|blocker| seen.insert(blocker.clone()));
            }
            changed
        })?;

        tracing::info!(from = %old_id, to = %new_id, "renamed issue");
        self.read_issue(&new_path)
    }

    /// Deletes a record (and a parent's whole folder), then strips references to every deleted id.
    pub fn delete(&self, id: &str) -> StoreResult<Vec<String>> {
        let location = self.locate(id)?;
        let mut deleted = vec![location.id.clone()];

        if location.is_folder {
            let folder = location.entry_path();
            for path in resolver::all_record_files(&folder, false)? {
                if let Some(stem) = path.file_stem().and_then(|value| value.to_str()) {
                    if !deleted.iter().any(|existing| existing == stem) {
                        deleted.push(stem.to_string());
                    }
                }
            }
            fs::remove_dir_all(&folder)?;
        } else {
            fs::remove_file(&location.path)?;
        }

        {
            let gone: HashSet<&str> = deleted.iter().map(String::as_str).collect();
            self.rewrite_references(|blocks| {
                let before = blocks.len();
                blocks.retain(|blocker| !gone.contains(blocker.as_str()));
                blocks.len() != before
            })?;
        }

        tracing::info!(id = %id, removed = deleted.len(), "deleted issue");
        Ok(deleted)
    }

    /// Files a record into the archive without a status transition.
    pub fn archive_issue(&self, id: &str) -> StoreResult<ArchiveOutcome> {
        let location = self.locate(id)?;
        archive::archive_entry(&self.root, &location, self.mode())
    }

    pub fn purge_archive(&self) -> StoreResult<()> {
        archive::purge(&self.root)
    }

    pub fn list_orphan_parents(&self) -> StoreResult<Vec<OrphanParent>> {
        hierarchy::list_orphan_parents(&self.root, self.mode())
    }

    pub fn fix_orphans(&self) -> StoreResult<Vec<String>> {
        hierarchy::fix_orphans(&self.root, self.mode())
    }

    pub fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        config::get(&self.root, key)
    }

    pub fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        config::set(&self.root, key, value)
    }

    fn locate(&self, id: &str) -> StoreResult<Location> {
        let path = resolver::locate(&self.root, id)?;
        resolver::classify(&self.root, &path)
    }

    fn locate_live(&self, id: &str) -> StoreResult<Location> {
        let path = resolver::locate_live(&self.root, id)?;
        resolver::classify(&self.root, &path)
    }

    fn read_issue(&self, path: &Path) -> StoreResult<Issue> {
        let location = resolver::classify(&self.root, path)?;
        let content = fs::read_to_string(path)
            .map_err(|error| StoreError::Io(format!("failed to read {}: {}", path.to_string_lossy(), error)))?;
        let mut issue = frontmatter::decode(&location.id, &content, self.mode())?;
        issue.parent = location.parent;
        issue.archived = location.archived;
        Ok(issue)
    }

    fn write_issue(&self, path: &Path, issue: &Issue) -> StoreResult<()> {
        atomic::write(path, frontmatter::encode(issue).as_bytes())
    }

    /// Reads every path, skipping records that fail to decode.
    fn load_many(&self, paths: Vec<PathBuf>) -> Vec<Issue> {
        self.load_with_paths(paths).into_iter().map(|(_, issue)| issue).collect()
    }

    fn load_with_paths(&self, paths: Vec<PathBuf>) -> Vec<(PathBuf, Issue)> {
        let mut issues = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read_issue(&path) {
                Ok(issue) => issues.push((path, issue)),
                Err(error) => {
                    tracing::warn!(path = %path.to_string_lossy(), error = %error, "skipping malformed issue file");
                }
            }
        }
        issues
    }

    fn scan(&self, include_archive: bool) -> StoreResult<Vec<(PathBuf, Issue)>> {
        let mut paths = resolver::all_record_files(&self.root, true)?;
        if include_archive {
            paths.extend(resolver::all_record_files(&resolver::archive_root(&self.root), false)?);
        }
        Ok(self.load_with_paths(paths))
    }

    fn children_of(&self, location: &Location) -> StoreResult<Vec<Issue>> {
        let Some(dir) = location.children_dir() else {
            return Ok(Vec::new());
        };
        let mut children = self.load_many(resolver::member_files(&dir, Some(location.id.as_str()), false)?);
        children.sort_by(compare_siblings);
        Ok(children)
    }

    /// Applies `edit` to every record's `blocks`, rewriting the ones it reports as changed.
    fn rewrite_references(&self, mut edit: impl FnMut(&mut Vec<String>) -> bool) -> StoreResult<()> {
        for (path, mut issue) in self.scan(true)? {
            if edit(&mut issue.blocks) {
                self.write_issue(&path, &issue)?;
                tracing::debug!(id = %issue.id, "rewrote blocks references");
            }
        }
        Ok(())
    }

    fn generate_id(&self, title: &str) -> StoreResult<String> {
        let prefix = self.id_prefix()?;
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = ids::generate(&prefix, Some(title));
            validate_new_id(&candidate)?;
            if !resolver::exists(&self.root, &candidate)? {
                return Ok(candidate);
            }
        }
        Err(StoreError::AlreadyExists(format!(
            "could not generate a free id with prefix '{}'",
            prefix
        )))
    }

    fn id_prefix(&self) -> StoreResult<String> {
        if let Some(prefix) = self.get_config(config::PREFIX_KEY)? {
            if !prefix.is_empty() {
                return Ok(prefix);
            }
        }
        let derived = self
            .root
            .canonicalize()
            .ok()
            .and_then(|root| root.parent().and_then(|parent| parent.file_name()).map(|name| name.to_string_lossy().to_string()))
            .map(|name| ids::slugify(&name))
            .filter(|slug| slug != "untitled");
        Ok(derived.unwrap_or_else(|| DEFAULT_PREFIX.to_string()))
    }
}

fn validate_new_id(id: &str) -> StoreResult<()> {
    ids::validate(id)?;
    if id == resolver::ARCHIVE_DIR {
        return Err(StoreError::InvalidId(format!("'{}' is reserved", id)));
    }
    Ok(())
}

fn validate_priority(priority: u8) -> StoreResult<u8> {
    if priority > MAX_PRIORITY {
        return Err(StoreError::InvalidFrontmatter(format!(
            "priority must be 0..={}, got {}",
            MAX_PRIORITY, priority
        )));
    }
    Ok(priority)
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn compare_siblings(a: &Issue, b: &Issue) -> Ordering {
    a.order
        .total_cmp(&b.order)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn compare_for_listing(a: &Issue, b: &Issue) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
