//! Directory-tree mirroring with on-the-fly instrumentation.
//!
//! The engine's external collaborator: walks a source tree depth-first,
//! writes instrumented (or, when instrumentation fails, original) bytes to
//! the mirrored path, preserves file modes and modification times, prunes
//! entries that exist only in the destination, and skips version-control
//! metadata. One broken entry is logged and skipped, never fatal to the
//! tree.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, FileTimes, Metadata};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::rewrite;

/// Version-control metadata, never mirrored.
const IGNORE_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Mirror `from` into `to`, instrumenting every eligible `.rs` file.
pub fn sync_tree(from: &Path, to: &Path) -> Result<()> {
    sync_dir(from, from, to)
}

fn sync_dir(root: &Path, from: &Path, to: &Path) -> Result<()> {
    if let Some(name) = from.file_name().and_then(|n| n.to_str()) {
        if IGNORE_DIRS.contains(&name) {
            return Ok(());
        }
    }
    tracing::debug!(dir = %from.display(), "syncing");

    fs::create_dir_all(to).with_context(|| format!("creating {}", to.display()))?;

    let from_entries = read_dir_metadata(from)?;
    let to_entries = read_dir_metadata(to)?;

    for (name, meta) in &from_entries {
        let from_path = from.join(name);
        let to_path = to.join(name);

        if let Some(existing) = to_entries.get(name) {
            if meta.is_dir() && existing.is_dir() {
                if let Err(error) = sync_dir(root, &from_path, &to_path) {
                    tracing::warn!(dir = %from_path.display(), %error, "could not sync directory");
                }
                continue;
            }
            if stats_equal(meta, existing) {
                continue;
            }
            if let Err(error) = remove_entry(&to_path, existing) {
                tracing::warn!(path = %to_path.display(), %error, "could not remove stale entry");
                continue;
            }
        }

        if meta.is_dir() {
            if let Err(error) = sync_dir(root, &from_path, &to_path) {
                tracing::warn!(dir = %from_path.display(), %error, "could not sync directory");
            }
        } else if let Err(error) = sync_entry(root, &from_path, &to_path, meta) {
            tracing::warn!(path = %from_path.display(), %error, "could not sync entry");
        }
    }

    // Entries present only in the destination are removed.
    for (name, meta) in &to_entries {
        if from_entries.contains_key(name) {
            continue;
        }
        let stale = to.join(name);
        if let Err(error) = remove_entry(&stale, meta) {
            tracing::warn!(path = %stale.display(), %error, "could not remove stale entry");
        }
    }

    Ok(())
}

fn read_dir_metadata(dir: &Path) -> Result<HashMap<OsString, Metadata>> {
    let mut entries = HashMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        entries.insert(entry.file_name(), entry.path().symlink_metadata()?);
    }
    Ok(entries)
}

/// Unchanged entries (same kind, same mtime for regular files) are left in
/// place so repeated syncs only touch what moved.
fn stats_equal(a: &Metadata, b: &Metadata) -> bool {
    if a.is_dir() || b.is_dir() {
        return a.is_dir() == b.is_dir();
    }
    if a.is_file() != b.is_file() {
        return false;
    }
    if a.is_file() {
        match (a.modified(), b.modified()) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    } else {
        true
    }
}

fn remove_entry(path: &Path, meta: &Metadata) -> io::Result<()> {
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn sync_entry(root: &Path, from: &Path, to: &Path, meta: &Metadata) -> Result<()> {
    if meta.file_type().is_symlink() {
        return mirror_symlink(from, to);
    }
    if !meta.is_file() {
        tracing::warn!(path = %from.display(), "only regular files and symlinks are mirrored");
        return Ok(());
    }

    let bytes = match rewrite::rewrite_file(root, from) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(path = %from.display(), %error, "copying unmodified");
            fs::read(from)?
        }
    };

    fs::write(to, &bytes).with_context(|| format!("writing {}", to.display()))?;
    fs::set_permissions(to, meta.permissions())?;
    if let Ok(mtime) = meta.modified() {
        File::options()
            .write(true)
            .open(to)?
            .set_times(FileTimes::new().set_modified(mtime))?;
    }
    Ok(())
}

#[cfg(unix)]
fn mirror_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(&target, to)
        .with_context(|| format!("linking {}", to.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn mirror_symlink(from: &Path, _to: &Path) -> Result<()> {
    tracing::warn!(path = %from.display(), "symlinks are not mirrored on this platform");
    Ok(())
}

/// Keep a `.bak` copy beside `path` before it gets overwritten in place.
///
/// An existing backup is authoritative and never replaced: it still holds
/// the pristine pre-instrumentation bytes.
pub fn create_backup(path: &Path) -> Result<()> {
    let contents = fs::read(path)?;
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");

    match File::options().write(true).create_new(true).open(&backup) {
        Ok(mut file) => {
            file.write_all(&contents)?;
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(error) => Err(error).with_context(|| format!("creating backup of {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code.rs");
        fs::write(&path, "fn original() {}\n").unwrap();

        create_backup(&path).unwrap();
        let backup = dir.path().join("code.rs.bak");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "fn original() {}\n");

        // A later call must not clobber the authoritative first backup.
        fs::write(&path, "fn changed() {}\n").unwrap();
        create_backup(&path).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "fn original() {}\n");
    }

    #[test]
    fn test_sync_instruments_rust_and_copies_rest() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("lib.rs"), "fn answer() -> i32 {\n    42\n}\n").unwrap();
        fs::write(src.path().join("notes.txt"), "not rust\n").unwrap();

        sync_tree(src.path(), dst.path()).unwrap();

        let mirrored = fs::read_to_string(dst.path().join("lib.rs")).unwrap();
        assert!(mirrored.contains("SOFT_FLAG_"));
        assert!(mirrored.contains("softmock::runtime::register"));
        assert_eq!(
            fs::read_to_string(dst.path().join("notes.txt")).unwrap(),
            "not rust\n"
        );
    }

    #[test]
    fn test_sync_preserves_mtime() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let file = src.path().join("data.txt");
        fs::write(&file, "payload").unwrap();

        sync_tree(src.path(), dst.path()).unwrap();

        let original = fs::metadata(&file).unwrap().modified().unwrap();
        let mirrored = fs::metadata(dst.path().join("data.txt"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(original, mirrored);
    }

    #[test]
    fn test_sync_removes_destination_only_entries() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("kept.txt"), "kept").unwrap();
        fs::write(dst.path().join("stale.txt"), "stale").unwrap();

        sync_tree(src.path(), dst.path()).unwrap();

        assert!(dst.path().join("kept.txt").exists());
        assert!(!dst.path().join("stale.txt").exists());
    }

    #[test]
    fn test_sync_skips_vcs_metadata() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join(".git")).unwrap();
        fs::write(src.path().join(".git").join("HEAD"), "ref").unwrap();
        fs::write(src.path().join("real.txt"), "real").unwrap();

        sync_tree(src.path(), dst.path()).unwrap();

        assert!(!dst.path().join(".git").exists());
        assert!(dst.path().join("real.txt").exists());
    }

    #[test]
    fn test_broken_rust_file_copied_unmodified() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("broken.rs"), "fn nope( {").unwrap();

        sync_tree(src.path(), dst.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dst.path().join("broken.rs")).unwrap(),
            "fn nope( {"
        );
    }
}
