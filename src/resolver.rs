use crate::atomic;
use crate::errors::{StoreError, StoreResult};
use crate::ids;
use crate::models::ResolveOutcome;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const EXTENSION: &str = "md";
pub const ARCHIVE_DIR: &str = "archive";
pub const MAX_WALK_DEPTH: usize = 10;

/// Where a record file sits in the tree, derived purely from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub id: String,
    pub path: PathBuf,
    pub parent: Option<String>,
    pub archived: bool,
    /// True when the file is `{id}/{id}.md`.
    pub is_folder: bool,
}

impl Location {
    /// The file or folder that moves when this record moves.
    pub fn entry_path(&self) -> PathBuf {
        if self.is_folder {
            self.path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.path.clone())
        } else {
            self.path.clone()
        }
    }

    /// The directory holding this record and its siblings.
    pub fn container_dir(&self) -> PathBuf {
        self.entry_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// The folder holding this record's children, if it has one.
    pub fn children_dir(&self) -> Option<PathBuf> {
        self.is_folder.then(|| self.entry_path())
    }
}

pub fn record_file_name(id: &str) -> String {
    format!("{}.{}", id, EXTENSION)
}

pub fn archive_root(root: &Path) -> PathBuf {
    root.join(ARCHIVE_DIR)
}

pub fn is_record_file(path: &Path) -> bool {
    !atomic::is_temp_file(path) && path.extension().and_then(|value| value.to_str()) == Some(EXTENSION)
}

pub fn is_archived(root: &Path, path: &Path) -> bool {
    path.starts_with(archive_root(root))
}

pub fn classify(root: &Path, path: &Path) -> StoreResult<Location> {
    let relative = path.strip_prefix(root).map_err(|_| {
        StoreError::NotFound(format!("{} is outside the issue root", path.to_string_lossy()))
    })?;
    let id = path
        .file_stem()
        .and_then(|value| value.to_str())
        .ok_or_else(|| StoreError::InvalidId(format!("unreadable file name: {}", path.to_string_lossy())))?
        .to_string();

    let mut dirs: Vec<String> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|component| match component {
                    Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let archived = dirs.first().is_some_and(|first| first == ARCHIVE_DIR);
    if archived {
        dirs.remove(0);
    }
    let is_folder = dirs.last().is_some_and(|last| *last == id);
    if is_folder {
        dirs.pop();
    }

    Ok(Location {
        id,
        path: path.to_path_buf(),
        parent: dirs.last().cloned(),
        archived,
        is_folder,
    })
}

/// Finds a record's file: root file, root folder, archive file, archive folder, then a bounded walk.
pub fn locate(root: &Path, id: &str) -> StoreResult<PathBuf> {
    ids::validate(id)?;
    if let Some(path) = locate_in(root, id, true)? {
        return Ok(path);
    }
    let archive = archive_root(root);
    if let Some(path) = locate_in(&archive, id, false)? {
        return Ok(path);
    }
    Err(StoreError::NotFound(format!("issue '{}' not found", id)))
}

/// Same as [`locate`] but ignores the archive subtree.
pub fn locate_live(root: &Path, id: &str) -> StoreResult<PathBuf> {
    ids::validate(id)?;
    locate_in(root, id, true)?.ok_or_else(|| StoreError::NotFound(format!("issue '{}' not found", id)))
}

pub fn exists(root: &Path, id: &str) -> StoreResult<bool> {
    match locate(root, id) {
        Ok(_) => Ok(true),
        Err(StoreError::NotFound(_)) => Ok(false),
        Err(error) => Err(error),
    }
}

fn locate_in(base: &Path, id: &str, skip_archive: bool) -> StoreResult<Option<PathBuf>> {
    if let Some(path) = direct_candidate(base, id) {
        return Ok(Some(path));
    }
    if !base.is_dir() {
        return Ok(None);
    }
    walk_for(base, id, 0, skip_archive)
}

fn direct_candidate(dir: &Path, id: &str) -> Option<PathBuf> {
    let file = dir.join(record_file_name(id));
    if file.is_file() {
        return Some(file);
    }
    let nested = dir.join(id).join(record_file_name(id));
    if nested.is_file() {
        return Some(nested);
    }
    None
}

fn walk_for(dir: &Path, id: &str, depth: usize, skip_archive: bool) -> StoreResult<Option<PathBuf>> {
    if depth >= MAX_WALK_DEPTH {
        return Ok(None);
    }
    for subdir in subdirectories(dir, depth == 0 && skip_archive)? {
        if let Some(path) = direct_candidate(&subdir, id) {
            return Ok(Some(path));
        }
        if let Some(path) = walk_for(&subdir, id, depth + 1, skip_archive)? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Real (non-symlink) subdirectories of `dir`, sorted by name.
pub fn subdirectories(dir: &Path, skip_archive: bool) -> StoreResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() || !file_type.is_dir() {
            continue;
        }
        if skip_archive && entry.file_name() == ARCHIVE_DIR {
            continue;
        }
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

/// Record files directly inside `dir`, sorted by name.
pub fn record_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        if is_record_file(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// The records that are direct members of `dir`: loose files plus each subfolder's self-file.
/// `owner` excludes the folder's own self-file when `dir` is a parent folder.
pub fn member_files(dir: &Path, owner: Option<&str>, skip_archive: bool) -> StoreResult<Vec<PathBuf>> {
    let owner_file = owner.map(record_file_name);
    let mut out: Vec<PathBuf> = record_files(dir)?
        .into_iter()
        .filter(|path| {
            owner_file
                .as_deref()
                .map_or(true, |name| path.file_name().and_then(|value| value.to_str()) != Some(name))
        })
        .collect();
    for subdir in subdirectories(dir, skip_archive)? {
        let Some(name) = subdir.file_name().and_then(|value| value.to_str()) else {
            continue;
        };
        let self_file = subdir.join(record_file_name(name));
        if self_file.is_file() {
            out.push(self_file);
        }
    }
    Ok(out)
}

/// Every record file under `dir`, depth-bounded, skipping symlinks.
pub fn all_record_files(dir: &Path, skip_archive: bool) -> StoreResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    if dir.is_dir() {
        collect_record_files(dir, 0, skip_archive, &mut out)?;
    }
    Ok(out)
}

fn collect_record_files(dir: &Path, depth: usize, skip_archive: bool, out: &mut Vec<PathBuf>) -> StoreResult<()> {
    out.extend(record_files(dir)?);
    if depth + 1 >= MAX_WALK_DEPTH {
        return Ok(());
    }
    for subdir in subdirectories(dir, depth == 0 && skip_archive)? {
        collect_record_files(&subdir, depth + 1, false, out)?;
    }
    Ok(())
}

/// Every record name (file stems and folder names) under the live tree and the archive.
fn collect_names(root: &Path) -> StoreResult<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    if root.is_dir() {
        collect_names_in(root, 0, true, &mut names)?;
    }
    let archive = archive_root(root);
    if archive.is_dir() {
        collect_names_in(&archive, 0, false, &mut names)?;
    }
    Ok(names)
}

fn collect_names_in(dir: &Path, depth: usize, skip_archive: bool, names: &mut BTreeSet<String>) -> StoreResult<()> {
    for path in record_files(dir)? {
        if let Some(stem) = path.file_stem().and_then(|value| value.to_str()) {
            names.insert(stem.to_string());
        }
    }
    if depth + 1 >= MAX_WALK_DEPTH {
        return Ok(());
    }
    for subdir in subdirectories(dir, depth == 0 && skip_archive)? {
        if let Some(name) = subdir.file_name().and_then(|value| value.to_str()) {
            names.insert(name.to_string());
        }
        collect_names_in(&subdir, depth + 1, false, names)?;
    }
    Ok(())
}

/// Every name starting with `prefix` is a candidate, including a name equal to it.
fn match_prefix(names: &BTreeSet<String>, prefix: &str) -> ResolveOutcome {
    let matches: Vec<String> = names
        .range(prefix.to_string()..)
        .take_while(|name| name.starts_with(prefix))
        .cloned()
        .collect();
    match matches.len() {
        0 => ResolveOutcome::NotFound,
        1 => ResolveOutcome::Found(matches[0].clone()),
        _ => ResolveOutcome::Ambiguous(matches),
    }
}

pub fn resolve_prefix(root: &Path, prefix: &str) -> StoreResult<String> {
    ids::validate(prefix)?;
    match match_prefix(&collect_names(root)?, prefix) {
        ResolveOutcome::Found(id) => Ok(id),
        ResolveOutcome::NotFound => Err(StoreError::NotFound(format!("no issue matches '{}'", prefix))),
        ResolveOutcome::Ambiguous(matches) => Err(StoreError::AmbiguousId {
            prefix: prefix.to_string(),
            matches,
        }),
    }
}

/// Resolves several prefixes against a single scan of the tree.
pub fn resolve_prefixes(root: &Path, prefixes: &[&str]) -> StoreResult<Vec<ResolveOutcome>> {
    for prefix in prefixes {
        ids::validate(prefix)?;
    }
    let names = collect_names(root)?;
    Ok(prefixes.iter().map(|prefix| match_prefix(&names, prefix)).collect())
}
