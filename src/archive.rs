use crate::atomic;
use crate::errors::{StoreError, StoreResult};
use crate::frontmatter::{self, HeaderMode};
use crate::models::ArchiveOutcome;
use crate::resolver::{self, record_file_name, Location};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Fails with `ChildrenNotClosed` unless every record nested anywhere under a parent's folder
/// is closed. A record that cannot be read or decoded counts as not closed.
pub fn ensure_subtree_closed(location: &Location, mode: HeaderMode) -> StoreResult<()> {
    let Some(dir) = location.children_dir() else {
        return Ok(());
    };
    let own = dir.join(record_file_name(&location.id));

    let mut open = Vec::new();
    for path in resolver::all_record_files(&dir, false)? {
        if path == own {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|value| value.to_str()).map(str::to_string) else {
            continue;
        };
        let closed = match fs::read_to_string(&path)
            .map_err(StoreError::from)
            .and_then(|content| frontmatter::decode(&id, &content, mode))
        {
            Ok(issue) => issue.status.is_closed(),
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "unreadable record holds back archiving");
                false
            }
        };
        if !closed {
            open.push(id);
        }
    }

    if open.is_empty() {
        Ok(())
    } else {
        open.sort();
        Err(StoreError::ChildrenNotClosed {
            id: location.id.clone(),
            open,
        })
    }
}

/// Moves a closed record, or its whole folder, under the archive root.
///
/// Children never move on their own; they travel with their parent's folder.
pub fn archive_entry(root: &Path, location: &Location, mode: HeaderMode) -> StoreResult<ArchiveOutcome> {
    if location.archived {
        return Ok(ArchiveOutcome::AlreadyArchived);
    }
    if location.parent.is_some() {
        return Ok(ArchiveOutcome::AwaitingParent);
    }

    let archive = resolver::archive_root(root);
    fs::create_dir_all(&archive)?;

    let (source, target) = if location.is_folder {
        ensure_subtree_closed(location, mode)?;
        (location.entry_path(), archive.join(&location.id))
    } else {
        (location.path.clone(), archive.join(record_file_name(&location.id)))
    };
    if target.exists() {
        return Err(StoreError::AlreadyExists(format!(
            "archive already holds {}",
            target.to_string_lossy()
        )));
    }

    atomic::rename(&source, &target)?;
    tracing::info!(id = %location.id, from = %source.to_string_lossy(), to = %target.to_string_lossy(), "archived issue");

    let path = if location.is_folder {
        target.join(record_file_name(&location.id))
    } else {
        target
    };
    Ok(ArchiveOutcome::Moved { path })
}

/// Moves the top-level archive entry that contains `location` back to the live root.
/// Returns the restored entry path.
pub fn restore_entry(root: &Path, location: &Location) -> StoreResult<PathBuf> {
    let archive = resolver::archive_root(root);
    let relative = location.path.strip_prefix(&archive).map_err(|_| {
        StoreError::NotFound(format!("{} is not archived", location.id))
    })?;
    let Some(Component::Normal(top)) = relative.components().next() else {
        return Err(StoreError::NotFound(format!("{} is not archived", location.id)));
    };

    let source = archive.join(top);
    let target = root.join(top);
    if target.exists() {
        return Err(StoreError::AlreadyExists(format!(
            "cannot restore {}: {} already exists",
            location.id,
            target.to_string_lossy()
        )));
    }
    atomic::rename(&source, &target)?;
    tracing::info!(id = %location.id, entry = %target.to_string_lossy(), "restored issue from archive");
    Ok(target)
}

/// Deletes everything under the archive root and recreates it empty. Not recoverable.
pub fn purge(root: &Path) -> StoreResult<()> {
    let archive = resolver::archive_root(root);
    if archive.exists() {
        fs::remove_dir_all(&archive)?;
    }
    fs::create_dir_all(&archive)?;
    tracing::info!(archive = %archive.to_string_lossy(), "purged archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = "---\ntitle: t\nstatus: open\ncreated-at: c\n---\n\n";
    const CLOSED: &str = "---\ntitle: t\nstatus: closed\ncreated-at: c\nclosed-at: d\n---\n\n";

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn simple_record_moves_as_a_file() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        write(&root.join("solo.md"), CLOSED);
        let location = resolver::classify(root, &root.join("solo.md")).expect("classify");

        let outcome = archive_entry(root, &location, HeaderMode::Lenient).expect("archive");
        assert_eq!(outcome, ArchiveOutcome::Moved { path: root.join("archive/solo.md") });
        assert!(!root.join("solo.md").exists());

        let archived = resolver::classify(root, &root.join("archive/solo.md")).expect("classify archived");
        assert_eq!(
            archive_entry(root, &archived, HeaderMode::Lenient).expect("again"),
            ArchiveOutcome::AlreadyArchived
        );
    }

    #[test]
    fn children_wait_and_parents_move_whole_folder() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        write(&root.join("p/p.md"), CLOSED);
        write(&root.join("p/c1.md"), OPEN);

        let child = resolver::classify(root, &root.join("p/c1.md")).expect("child");
        assert_eq!(
            archive_entry(root, &child, HeaderMode::Lenient).expect("child"),
            ArchiveOutcome::AwaitingParent
        );

        let parent = resolver::classify(root, &root.join("p/p.md")).expect("parent");
        let error = archive_entry(root, &parent, HeaderMode::Lenient).expect_err("open child");
        assert!(matches!(error, StoreError::ChildrenNotClosed { open, .. } if open == vec!["c1".to_string()]));
        assert!(root.join("p/p.md").exists());

        write(&root.join("p/c1.md"), CLOSED);
        let outcome = archive_entry(root, &parent, HeaderMode::Lenient).expect("archive parent");
        assert_eq!(outcome, ArchiveOutcome::Moved { path: root.join("archive/p/p.md") });
        assert!(root.join("archive/p/c1.md").is_file());
        assert!(!root.join("p").exists());
    }

    #[test]
    fn nested_open_records_hold_back_the_whole_folder() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        write(&root.join("p/p.md"), CLOSED);
        write(&root.join("p/c/c.md"), CLOSED);
        write(&root.join("p/c/g.md"), OPEN);
        let parent = resolver::classify(root, &root.join("p/p.md")).expect("parent");

        let error = ensure_subtree_closed(&parent, HeaderMode::Lenient).expect_err("open grandchild");
        assert!(matches!(error, StoreError::ChildrenNotClosed { open, .. } if open == vec!["g".to_string()]));
        assert!(archive_entry(root, &parent, HeaderMode::Lenient).is_err());
        assert!(root.join("p/c/g.md").is_file());
    }

    #[test]
    fn undecodable_children_count_as_open() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        write(&root.join("p/p.md"), CLOSED);
        write(&root.join("p/broken.md"), "---\ntitle: t\nstatus: closed\n---\n");
        let parent = resolver::classify(root, &root.join("p/p.md")).expect("parent");

        let error = archive_entry(root, &parent, HeaderMode::Lenient).expect_err("broken child");
        assert!(matches!(error, StoreError::ChildrenNotClosed { open, .. } if open == vec!["broken".to_string()]));
        assert!(root.join("p/broken.md").is_file());
    }

    #[test]
    fn restore_brings_back_the_top_level_entry() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        write(&root.join("archive/p/p.md"), CLOSED);
        write(&root.join("archive/p/kid.md"), CLOSED);

        let kid = resolver::classify(root, &root.join("archive/p/kid.md")).expect("kid");
        let restored = restore_entry(root, &kid).expect("restore");
        assert_eq!(restored, root.join("p"));
        assert!(root.join("p/kid.md").is_file());
        assert!(!root.join("archive/p").exists());
    }

    #[test]
    fn purge_empties_the_archive() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        write(&root.join("archive/a.md"), CLOSED);
        write(&root.join("archive/p/p.md"), CLOSED);
        purge(root).expect("purge");
        assert!(root.join("archive").is_dir());
        assert_eq!(fs::read_dir(root.join("archive")).expect("read").count(), 0);
    }
}
