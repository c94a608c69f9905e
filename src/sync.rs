// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Incremental directory synchronization.
//!
//! Pbk keeps sections of a project in step with a shared backend by
//! __syncing__ directory trees: walk a source tree in lock-step with a target
//! tree, copy only what changed, and remove what disappeared. No version
//! control system is consulted for any of this. Instead, each target
//! directory carries its own [`Manifest`] that remembers where every file
//! came from and what its content looked like at copy time.
//!
//! # Sync Pass
//!
//! One pass over a directory goes like so:
//!
//! 1. Make sure the target directory exists.
//! 2. Load the target directory's manifest, healing it if corrupt.
//! 3. For every entry of the source directory, recurse into directories,
//!    and copy files that are eligible and changed.
//! 4. Flush the manifest if anything changed.
//! 5. Optionally prune entries whose source file vanished, deleting their
//!    target file too, then flush again if needed.
//! 6. When pruning, also visit target subdirectories whose source directory
//!    vanished as a whole, and prune every manifest found beneath them.
//!
//! Each directory level has its own manifest. Entries never leak from one
//! level into another.
//!
//! # Eligibility
//!
//! A file is __eligible__ if no filter patterns were given, or if its name
//! contains at least one pattern as a plain case-sensitive substring. Files
//! that are not eligible are never touched, not even pruned when they are
//! deleted from the source, because they never got a manifest entry.
//!
//! # Failures
//!
//! Only a missing source root is fatal. A file that fails to copy, or a
//! subdirectory that fails to sync, is logged and recorded in the returned
//! [`SyncReport`], and the pass moves on to the next entry. A failed copy
//! never gets a manifest entry, so it will be retried on the next pass.

pub mod fingerprint;
pub mod manifest;
pub mod mirror;

mod atomic;

use crate::sync::{
    atomic::copy_atomic,
    fingerprint::Fingerprint,
    manifest::{Manifest, ManifestEntry, ManifestError, PruneOutcome, MANIFEST_FILE_NAME},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Options for a sync pass.
///
/// Defaults to no filter patterns, and pruning enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Substrings of which a file name must contain at least one to be
    /// eligible for copy. Empty means every file is eligible.
    pub patterns: Vec<String>,

    /// Delete target files whose source vanished.
    pub prune: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            prune: true,
        }
    }
}

impl SyncOptions {
    /// Construct default sync options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace filter patterns.
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable pruning.
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Check if file name is eligible for copy.
    pub fn is_eligible(&self, file_name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| file_name.contains(pattern.as_str()))
    }
}

/// Path that failed to sync, and why.
#[derive(Debug)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl Display for SyncFailure {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}: {}", self.path.display(), self.reason)
    }
}

/// Summary of what a sync pass did.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Target files written.
    pub copied: Vec<PathBuf>,

    /// Target files deleted by pruning.
    pub pruned: Vec<PathBuf>,

    /// Eligible files already up to date.
    pub unchanged: usize,

    /// Files filtered out by patterns.
    pub skipped: usize,

    /// Files or directories that failed without aborting the pass.
    pub failures: Vec<SyncFailure>,

    /// Number of manifest flushes across every directory level.
    pub manifest_writes: usize,
}

impl SyncReport {
    /// Fold report of a subdirectory into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.copied.extend(other.copied);
        self.pruned.extend(other.pruned);
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.manifest_writes += other.manifest_writes;
    }

    /// Check if pass finished without any failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Check if pass changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.copied.is_empty() && self.pruned.is_empty() && self.manifest_writes == 0
    }
}

impl Display for SyncReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} copied, {} pruned, {} unchanged, {} skipped, {} failed",
            self.copied.len(),
            self.pruned.len(),
            self.unchanged,
            self.skipped,
            self.failures.len()
        )
    }
}

/// Sync source directory tree into target directory tree.
///
/// Runs one full pass as described in the [module documentation](self).
///
/// # Errors
///
/// - Return [`SyncError::SourceMissing`] if source directory does not exist.
/// - Return [`SyncError::CreateTarget`] if target directory cannot be
///   created.
/// - Return [`SyncError::ReadSource`] if source directory cannot be listed.
/// - Return [`SyncError::Manifest`] if the target manifest cannot be
///   written.
#[instrument(skip(source, target, options), level = "debug")]
pub fn sync_dirs(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let source = source.as_ref();
    let target = target.as_ref();

    // INVARIANT: Never treat a missing source as an empty one.
    if !source.is_dir() {
        return Err(SyncError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    // INVARIANT: Record absolute source paths so pruning does not depend on
    // the working directory of later passes.
    let source = std::path::absolute(source).map_err(|err| SyncError::ReadSource {
        source: err,
        path: source.to_path_buf(),
    })?;

    info!("sync {:?} into {:?}", source.display(), target.display());
    sync_level(&source, target, options)
}

fn sync_level(source: &Path, target: &Path, options: &SyncOptions) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    fs::create_dir_all(target).map_err(|err| SyncError::CreateTarget {
        source: err,
        path: target.to_path_buf(),
    })?;
    let mut manifest = Manifest::load(target)?;
    let entries = list_entries(source).map_err(|err| SyncError::ReadSource {
        source: err,
        path: source.to_path_buf(),
    })?;

    for (file_name, is_dir) in &entries {
        let (file_name, is_dir) = (file_name.as_str(), *is_dir);
        let source_path = source.join(file_name);
        let target_path = target.join(file_name);

        if is_dir {
            match sync_level(&source_path, &target_path, options) {
                Ok(child) => report.merge(child),
                Err(err) => record_failure(&mut report, source_path, &err),
            }
            continue;
        }

        if !options.is_eligible(file_name) {
            debug!("skip {:?}: no pattern matches", source_path.display());
            report.skipped += 1;
            continue;
        }

        match sync_file(&mut manifest, file_name, &source_path, &target_path) {
            Ok(true) => report.copied.push(target_path),
            Ok(false) => report.unchanged += 1,
            Err(err) => {
                warn!("cannot copy {:?}: {err}", source_path.display());
                report.failures.push(SyncFailure {
                    path: source_path,
                    reason: err.to_string(),
                });
            }
        }
    }

    manifest.flush_if_dirty()?;

    if options.prune {
        record_prune(&mut report, manifest.prune(target)?);

        for (file_name, is_dir) in list_entries(target).map_err(|err| SyncError::ReadTarget {
            source: err,
            path: target.to_path_buf(),
        })? {
            let orphan = target.join(&file_name);
            let still_in_source = entries
                .iter()
                .any(|(name, source_is_dir)| *source_is_dir && *name == file_name);
            if !is_dir || still_in_source || !orphan.join(MANIFEST_FILE_NAME).is_file() {
                continue;
            }

            debug!("source of {:?} vanished, pruning it", orphan.display());
            match prune_orphan(&orphan) {
                Ok(child) => report.merge(child),
                Err(err) => record_failure(&mut report, orphan, &err),
            }
        }
    }

    report.manifest_writes += manifest.writes();

    Ok(report)
}

// Prune a target directory whose source directory no longer exists, along
// with every synced directory beneath it. Only files recorded in a manifest
// are ever deleted, so foreign files and the directories themselves stay.
fn prune_orphan(target: &Path) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for (file_name, is_dir) in list_entries(target).map_err(|err| SyncError::ReadTarget {
        source: err,
        path: target.to_path_buf(),
    })? {
        let child = target.join(&file_name);
        if !is_dir || !child.join(MANIFEST_FILE_NAME).is_file() {
            continue;
        }

        match prune_orphan(&child) {
            Ok(child_report) => report.merge(child_report),
            Err(err) => record_failure(&mut report, child, &err),
        }
    }

    let mut manifest = Manifest::load(target)?;
    record_prune(&mut report, manifest.prune(target)?);
    report.manifest_writes += manifest.writes();

    Ok(report)
}

fn record_prune(report: &mut SyncReport, outcome: PruneOutcome) {
    report.pruned.extend(outcome.removed);
    report
        .failures
        .extend(outcome.failed.into_iter().map(|(path, err)| SyncFailure {
            path,
            reason: err.to_string(),
        }));
}

fn record_failure(report: &mut SyncReport, path: PathBuf, err: &SyncError) {
    warn!("cannot sync {:?}: {err}", path.display());
    report.failures.push(SyncFailure {
        path,
        reason: error_chain(err),
    });
}

// Returns whether a copy happened.
fn sync_file(
    manifest: &mut Manifest,
    file_name: &str,
    source_path: &Path,
    target_path: &Path,
) -> io::Result<bool> {
    let current = Fingerprint::of_file(source_path)?;
    let up_to_date = target_path.is_file()
        && manifest
            .get(file_name)
            .is_some_and(|entry| entry.fingerprint.matches(&current));

    if up_to_date {
        debug!("{:?} is up to date at {current}", target_path.display());
        return Ok(false);
    }

    copy_atomic(source_path, target_path)?;
    info!("copied {:?}", target_path.display());
    debug!("record {current} for {:?}", target_path.display());

    // INVARIANT: Record entry only after a successful copy.
    manifest.upsert(file_name, ManifestEntry::new(source_path, current));

    Ok(true)
}

// List immediate entries of a directory sorted by name, flagging
// directories. Symbolic links are treated as files and followed on copy.
// The manifest file itself is never part of the listing.
fn list_entries(dir: &Path) -> io::Result<Vec<(String, bool)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                warn!("skip non UTF-8 file name {name:?} in {:?}", dir.display());
                continue;
            }
        };

        if file_name == MANIFEST_FILE_NAME {
            continue;
        }

        let is_dir = entry.file_type()?.is_dir();
        entries.push((file_name, is_dir));
    }
    entries.sort();

    Ok(entries)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

/// Sync engine error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Source directory does not exist.
    #[error("source directory {:?} does not exist", path.display())]
    SourceMissing { path: PathBuf },

    /// Source directory cannot be listed.
    #[error("failed to read source directory {:?}", path.display())]
    ReadSource {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Target directory cannot be listed.
    #[error("failed to read target directory {:?}", path.display())]
    ReadTarget {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Target directory cannot be created.
    #[error("failed to create target directory {:?}", path.display())]
    CreateTarget {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Manifest cannot be persisted.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
