// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Full tree mirroring.
//!
//! Unlike an incremental sync, a __mirror__ throws away everything in the
//! target directory and copies the source tree over in full. No manifest is
//! kept. This is how a project's own sources are handed over to the shared
//! backend, where the target must end up an exact copy.

use crate::sync::{atomic::copy_atomic, SyncError};

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Replace target directory contents with a copy of source directory.
///
/// Returns number of files copied.
///
/// # Errors
///
/// - Return [`MirrorError::Sync`] wrapping [`SyncError::SourceMissing`] if
///   source directory does not exist.
/// - Return [`MirrorError::Clear`] if target entries cannot be removed.
/// - Return [`MirrorError::Copy`] if any file or directory cannot be copied.
#[instrument(skip(source, target), level = "debug")]
pub fn mirror_dirs(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<usize> {
    let source = source.as_ref();
    let target = target.as_ref();

    if !source.is_dir() {
        return Err(SyncError::SourceMissing {
            path: source.to_path_buf(),
        }
        .into());
    }

    if target.exists() {
        clear_dir(target)?;
    }

    let count = copy_tree(source, target)?;
    info!(
        "mirrored {count} files from {:?} into {:?}",
        source.display(),
        target.display()
    );

    Ok(count)
}

fn clear_dir(dir: &Path) -> Result<()> {
    let clear_err = |path: &Path| {
        let path = path.to_path_buf();
        move |err: io::Error| MirrorError::Clear { source: err, path }
    };

    for entry in fs::read_dir(dir).map_err(clear_err(dir))? {
        let entry = entry.map_err(clear_err(dir))?;
        let path = entry.path();

        // INVARIANT: Never follow symbolic links while deleting.
        if entry.file_type().map_err(clear_err(path.as_path()))?.is_dir() {
            fs::remove_dir_all(&path).map_err(clear_err(path.as_path()))?;
        } else {
            fs::remove_file(&path).map_err(clear_err(path.as_path()))?;
        }
        debug!("removed {:?}", path.display());
    }

    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    let copy_err = |path: &Path| {
        let path = path.to_path_buf();
        move |err: io::Error| MirrorError::Copy { source: err, path }
    };

    fs::create_dir_all(target).map_err(copy_err(target))?;

    let mut count = 0;
    for entry in fs::read_dir(source).map_err(copy_err(source))? {
        let entry = entry.map_err(copy_err(source))?;
        let from = entry.path();
        let to = target.join(entry.file_name());

        if entry.file_type().map_err(copy_err(from.as_path()))?.is_dir() {
            count += copy_tree(&from, &to)?;
        } else {
            copy_atomic(&from, &to).map_err(copy_err(from.as_path()))?;
            count += 1;
        }
    }

    Ok(count)
}

/// Mirror error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Precondition of sync engine not met.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Target entry cannot be removed.
    #[error("failed to clear {:?}", path.display())]
    Clear {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Source entry cannot be copied.
    #[error("failed to copy {:?}", path.display())]
    Copy {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::manifest::MANIFEST_FILE_NAME;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn mirror_replaces_target_contents() -> anyhow::Result<()> {
        fs::create_dir_all("src/nested/deeper")?;
        fs::write("src/a.txt", "a")?;
        fs::write("src/nested/b.txt", "b")?;
        fs::write("src/nested/deeper/c.txt", "c")?;

        fs::create_dir_all("dst/stale_dir")?;
        fs::write("dst/stale.txt", "stale")?;
        fs::write("dst/stale_dir/old.txt", "old")?;
        fs::write(format!("dst/{MANIFEST_FILE_NAME}"), "{}")?;

        let count = mirror_dirs("src", "dst")?;
        assert_eq!(count, 3);
        assert_eq!(fs::read_to_string("dst/a.txt")?, "a");
        assert_eq!(fs::read_to_string("dst/nested/b.txt")?, "b");
        assert_eq!(fs::read_to_string("dst/nested/deeper/c.txt")?, "c");
        assert!(!Path::new("dst/stale.txt").exists());
        assert!(!Path::new("dst/stale_dir").exists());
        assert!(!Path::new("dst").join(MANIFEST_FILE_NAME).exists());

        Ok(())
    }

    #[sealed_test]
    fn mirror_creates_missing_target() -> anyhow::Result<()> {
        fs::create_dir_all("src")?;
        fs::write("src/a.txt", "a")?;

        assert_eq!(mirror_dirs("src", "deep/new/dst")?, 1);
        assert_eq!(fs::read_to_string("deep/new/dst/a.txt")?, "a");

        Ok(())
    }

    #[sealed_test]
    fn mirror_missing_source_keeps_target() -> anyhow::Result<()> {
        fs::create_dir_all("dst")?;
        fs::write("dst/keep.txt", "keep")?;

        let result = mirror_dirs("nope", "dst");
        assert!(matches!(
            result,
            Err(MirrorError::Sync(SyncError::SourceMissing { .. }))
        ));
        assert!(Path::new("dst/keep.txt").exists());

        Ok(())
    }
}
