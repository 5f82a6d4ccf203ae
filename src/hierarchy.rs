use crate::atomic;
use crate::errors::{StoreError, StoreResult};
use crate::frontmatter::{self, HeaderMode};
use crate::ids;
use crate::models::OrphanParent;
use crate::resolver::{self, record_file_name};
use std::fs;
use std::path::{Path, PathBuf};

/// Makes `{container}/{parent_id}/` exist and moves a loose `{parent_id}.md` into it.
///
/// Folder creation and the self-file move are two separate steps; [`fix_orphans`] repairs a
/// folder left behind if the process dies between them.
pub fn ensure_parent_folder(container: &Path, parent_id: &str) -> StoreResult<PathBuf> {
    ids::validate(parent_id)?;
    let folder = container.join(parent_id);
    if !folder.is_dir() {
        fs::create_dir_all(&folder)?;
        tracing::debug!(folder = %folder.to_string_lossy(), "created parent folder");
    }
    let loose = container.join(record_file_name(parent_id));
    if loose.is_file() {
        atomic::rename(&loose, &folder.join(record_file_name(parent_id)))?;
    }
    Ok(folder)
}

/// Parent folders whose own `{id}/{id}.md` is missing or does not decode.
pub fn list_orphan_parents(root: &Path, mode: HeaderMode) -> StoreResult<Vec<OrphanParent>> {
    let mut orphans = Vec::new();
    if root.is_dir() {
        collect_orphans(root, 0, true, mode, &mut orphans)?;
    }
    let archive = resolver::archive_root(root);
    if archive.is_dir() {
        collect_orphans(&archive, 0, false, mode, &mut orphans)?;
    }
    Ok(orphans)
}

fn collect_orphans(
    dir: &Path,
    depth: usize,
    skip_archive: bool,
    mode: HeaderMode,
    orphans: &mut Vec<OrphanParent>,
) -> StoreResult<()> {
    if depth + 1 >= resolver::MAX_WALK_DEPTH {
        return Ok(());
    }
    for subdir in resolver::subdirectories(dir, depth == 0 && skip_archive)? {
        let Some(id) = subdir.file_name().and_then(|value| value.to_str()).map(str::to_string) else {
            continue;
        };
        let self_file = subdir.join(record_file_name(&id));
        if !self_file.is_file() {
            orphans.push(OrphanParent {
                id,
                dir: subdir.clone(),
                self_file_missing: true,
            });
        } else if let Err(error) = fs::read_to_string(&self_file)
            .map_err(StoreError::from)
            .and_then(|content| frontmatter::decode(&id, &content, mode))
        {
            tracing::warn!(path = %self_file.to_string_lossy(), error = %error, "parent self-file does not decode");
            orphans.push(OrphanParent {
                id,
                dir: subdir.clone(),
                self_file_missing: false,
            });
        }
        collect_orphans(&subdir, depth + 1, false, mode, orphans)?;
    }
    Ok(())
}

/// Promotes every entry of each orphan folder into the folder's container and removes the folder.
/// Returns the ids of the repaired folders.
pub fn fix_orphans(root: &Path, mode: HeaderMode) -> StoreResult<Vec<String>> {
    let mut orphans = list_orphan_parents(root, mode)?;
    orphans.sort_by_key(|orphan| std::cmp::Reverse(orphan.dir.components().count()));

    let mut fixed = Vec::with_capacity(orphans.len());
    for orphan in orphans {
        promote_children(&orphan.dir)?;
        tracing::info!(id = %orphan.id, dir = %orphan.dir.to_string_lossy(), "repaired orphan parent folder");
        fixed.push(orphan.id);
    }
    Ok(fixed)
}

fn promote_children(dir: &Path) -> StoreResult<()> {
    let container = dir
        .parent()
        .ok_or_else(|| StoreError::Io(format!("orphan folder has no parent: {}", dir.to_string_lossy())))?;

    let mut moves = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let source = entry.path();
        if atomic::is_temp_file(&source) {
            fs::remove_file(&source)?;
            continue;
        }
        let target = container.join(entry.file_name());
        if target.exists() {
            return Err(StoreError::AlreadyExists(format!(
                "cannot promote {}: {} already exists",
                source.to_string_lossy(),
                target.to_string_lossy()
            )));
        }
        moves.push((source, target));
    }

    for (source, target) in moves {
        atomic::rename(&source, &target)?;
    }
    fs::remove_dir(dir)?;
    Ok(())
}
