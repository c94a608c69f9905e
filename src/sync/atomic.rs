// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Atomic file replacement.
//!
//! Both manifest flushes and file copies are staged in a temporary file that
//! lives next to the destination, and then renamed over it. A crash or a
//! failed write therefore never leaves a truncated file under the real name.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::Path,
};
use tempfile::NamedTempFile;

/// Replace contents of file at target path in one rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut staged = stage_next_to(path)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;

    Ok(())
}

/// Copy file from source to destination in one rename.
///
/// Permissions of the source file are carried over to the destination.
/// Returns number of bytes copied.
pub(crate) fn copy_atomic(source: &Path, destination: &Path) -> io::Result<u64> {
    let mut reader = File::open(source)?;
    let permissions = reader.metadata()?.permissions();

    let mut staged = stage_next_to(destination)?;
    let count = io::copy(&mut reader, &mut staged)?;
    staged.as_file().sync_all()?;
    fs::set_permissions(staged.path(), permissions)?;
    staged.persist(destination).map_err(|err| err.error)?;

    Ok(count)
}

// INVARIANT: Temporary file must share the destination's directory so the
// final rename never crosses file systems.
fn stage_next_to(path: &Path) -> io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    tempfile::Builder::new()
        .prefix(".pbk-")
        .suffix(".tmp")
        .tempfile_in(parent)
}
