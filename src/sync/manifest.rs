// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-directory sync manifest.
//!
//! Every directory that pbk synchronizes into carries a __manifest__ at
//! `<target>/file_details.json`. The manifest maps each file name directly
//! under that directory to the source path it was copied from, the
//! fingerprint of its content at copy time, and a human-readable timestamp.
//! It acts as both audit trail and change-detection cache.
//!
//! # Manifest Layout
//!
//! The manifest is a pretty-printed JSON object keyed by bare file names:
//!
//! ```json
//! {
//!   "gamesZod.ts": {
//!     "sourceFilePath": "/work/shared/src/games/gamesZod.ts",
//!     "hash": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
//!     "localDate": "2025-03-01 12:00:00 +00:00"
//!   }
//! }
//! ```
//!
//! Older manifests recorded `"mtime"` instead of `"hash"`. Those entries are
//! still read, but never match a content hash, so the file is copied once
//! more and the entry is upgraded.
//!
//! # Self-Healing
//!
//! A manifest that is empty, truncated, or otherwise unparsable is never
//! fatal. It is logged, replaced on disk with an empty document, and the sync
//! proceeds as if the directory had no history.

use crate::sync::{atomic::write_atomic, fingerprint::Fingerprint};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Fixed name of manifest file inside each synchronized directory.
pub const MANIFEST_FILE_NAME: &str = "file_details.json";

/// Provenance of one synchronized file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct ManifestEntry {
    /// Path of the file's origin at last sync.
    pub source_file_path: PathBuf,

    /// Fingerprint of the source content at last sync.
    pub fingerprint: Fingerprint,

    /// Local time of last copy.
    pub last_synced_at: String,
}

impl ManifestEntry {
    /// Construct new entry stamped with current local time.
    pub fn new(source_file_path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            source_file_path: source_file_path.into(),
            fingerprint,
            last_synced_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string(),
        }
    }
}

// On-disk shape of an entry. Kept separate so missing or legacy fingerprint
// fields collapse into one exhaustively matched enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    source_file_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mtime: Option<i64>,

    #[serde(default, alias = "lastSyncedAt")]
    local_date: String,
}

impl From<RawEntry> for ManifestEntry {
    fn from(raw: RawEntry) -> Self {
        // INVARIANT: Content hash takes precedence over modification time.
        let fingerprint = match (raw.hash, raw.mtime) {
            (Some(hash), _) => Fingerprint::ContentHash(hash),
            (None, Some(mtime)) => Fingerprint::ModTime(mtime),
            (None, None) => Fingerprint::None,
        };

        Self {
            source_file_path: raw.source_file_path,
            fingerprint,
            last_synced_at: raw.local_date,
        }
    }
}

impl From<ManifestEntry> for RawEntry {
    fn from(entry: ManifestEntry) -> Self {
        Self {
            source_file_path: entry.source_file_path,
            hash: entry.fingerprint.content_hash().map(str::to_owned),
            mtime: entry.fingerprint.mod_time(),
            local_date: entry.last_synced_at,
        }
    }
}

/// Result of pruning stale manifest entries.
#[derive(Debug, Default)]
pub struct PruneOutcome {
    /// Target files whose entries were removed.
    pub removed: Vec<PathBuf>,

    /// Target files that could not be deleted, and why.
    pub failed: Vec<(PathBuf, io::Error)>,
}

/// In-memory manifest of one synchronized directory.
///
/// # Invariant
///
/// - Dirtiness is always judged against the entries exactly as loaded, never
///   against the last flush.
/// - Keys are bare file names, never paths.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    entries: BTreeMap<String, ManifestEntry>,
    snapshot: BTreeMap<String, ManifestEntry>,
    writes: usize,
}

impl Manifest {
    /// Load manifest of target directory.
    ///
    /// Creates an empty manifest file if none exists. A manifest that cannot
    /// be read or parsed is reset to an empty document instead of failing.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Write`] if a missing or corrupt manifest
    ///   cannot be replaced with an empty one.
    #[instrument(skip(directory), level = "debug")]
    pub fn load(directory: impl AsRef<Path>) -> Result<Self> {
        let path = directory.as_ref().join(MANIFEST_FILE_NAME);
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match parse_entries(&content) {
                Ok(entries) => entries,
                Err(reason) => {
                    warn!("reset corrupt manifest {:?}: {reason}", path.display());
                    reset(&path)?;
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("create new manifest {:?}", path.display());
                reset(&path)?;
                BTreeMap::new()
            }
            Err(err) => {
                warn!("reset unreadable manifest {:?}: {err}", path.display());
                reset(&path)?;
                BTreeMap::new()
            }
        };

        Ok(Self {
            path,
            snapshot: entries.clone(),
            entries,
            writes: 0,
        })
    }

    /// Lookup entry by file name.
    pub fn get(&self, file_name: &str) -> Option<&ManifestEntry> {
        self.entries.get(file_name)
    }

    /// Iterate over all entries by file name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times this manifest has been flushed since loading.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Insert or replace entry of target file name.
    pub fn upsert(&mut self, file_name: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(file_name.into(), entry);
    }

    /// Check if entries differ from what was loaded.
    pub fn is_dirty(&self) -> bool {
        self.entries != self.snapshot
    }

    /// Write manifest to disk unconditionally.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Serialize`] if entries cannot be serialized.
    /// - Return [`ManifestError::Write`] if the manifest file cannot be
    ///   replaced.
    pub fn flush(&mut self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.entries).map_err(|err| ManifestError::Serialize {
                source: err,
                path: self.path.clone(),
            })?;
        write_atomic(&self.path, content.as_bytes()).map_err(|err| ManifestError::Write {
            source: err,
            path: self.path.clone(),
        })?;
        self.writes += 1;
        debug!("flushed manifest {:?}", self.path.display());

        Ok(())
    }

    /// Write manifest to disk only if entries changed since loading.
    ///
    /// Returns whether a write happened.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError`] if [`Manifest::flush`] fails.
    pub fn flush_if_dirty(&mut self) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }

        self.flush()?;
        Ok(true)
    }

    /// Prune entries whose source file no longer exists.
    ///
    /// Deletes the matching file in the target directory along with the
    /// entry. A target file that is already gone is not an error. A target
    /// file that cannot be deleted keeps its entry so the next pass retries.
    /// Flushes afterwards if anything changed since loading.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError`] if the final flush fails.
    #[instrument(skip(self, target_dir), level = "debug")]
    pub fn prune(&mut self, target_dir: impl AsRef<Path>) -> Result<PruneOutcome> {
        let mut outcome = PruneOutcome::default();
        let stale = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.source_file_path.exists())
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();

        for file_name in stale {
            // INVARIANT: Never delete anything outside of target directory.
            if !is_bare_file_name(&file_name) {
                warn!("drop manifest entry with invalid file name {file_name:?}");
                self.entries.remove(&file_name);
                continue;
            }

            let target = target_dir.as_ref().join(&file_name);
            match fs::remove_file(&target) {
                Ok(()) => info!("deleted {:?}", target.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!("{:?} already gone", target.display());
                }
                Err(err) => {
                    warn!("cannot delete {:?}: {err}", target.display());
                    outcome.failed.push((target, err));
                    continue;
                }
            }

            self.entries.remove(&file_name);
            outcome.removed.push(target);
        }

        self.flush_if_dirty()?;

        Ok(outcome)
    }
}

fn parse_entries(content: &str) -> std::result::Result<BTreeMap<String, ManifestEntry>, String> {
    if content.trim().is_empty() {
        return Err("manifest is empty".into());
    }

    serde_json::from_str(content).map_err(|err| err.to_string())
}

fn reset(path: &Path) -> Result<()> {
    write_atomic(path, b"{}").map_err(|err| ManifestError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

fn is_bare_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file cannot be written to.
    #[error("failed to write manifest at {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Manifest entries cannot be serialized.
    #[error("failed to serialize manifest for {:?}", path.display())]
    Serialize {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn entry(source: &str, fingerprint: Fingerprint) -> ManifestEntry {
        ManifestEntry {
            source_file_path: source.into(),
            fingerprint,
            last_synced_at: "2025-01-01 00:00:00 +00:00".into(),
        }
    }

    #[sealed_test]
    fn load_creates_missing_manifest() -> anyhow::Result<()> {
        let manifest = Manifest::load(".")?;
        assert!(manifest.is_empty());
        assert!(!manifest.is_dirty());
        assert_eq!(fs::read_to_string(MANIFEST_FILE_NAME)?, "{}");

        Ok(())
    }

    #[sealed_test]
    fn load_resets_truncated_manifest() -> anyhow::Result<()> {
        fs::write(MANIFEST_FILE_NAME, r#"{ "a.txt": { "sourceFilePath": "#)?;
        let manifest = Manifest::load(".")?;
        assert!(manifest.is_empty());
        assert_eq!(fs::read_to_string(MANIFEST_FILE_NAME)?, "{}");

        Ok(())
    }

    #[sealed_test]
    fn load_resets_empty_manifest() -> anyhow::Result<()> {
        fs::write(MANIFEST_FILE_NAME, "  \n")?;
        let manifest = Manifest::load(".")?;
        assert!(manifest.is_empty());
        assert_eq!(fs::read_to_string(MANIFEST_FILE_NAME)?, "{}");

        Ok(())
    }

    #[sealed_test]
    fn load_understands_legacy_entries() -> anyhow::Result<()> {
        fs::write(
            MANIFEST_FILE_NAME,
            indoc! {r#"
                {
                  "old.ts": {
                    "sourceFilePath": "/src/old.ts",
                    "mtime": 1700000000000,
                    "localDate": "11/14/2023, 10:13:20 PM"
                  },
                  "bare.ts": {
                    "sourceFilePath": "/src/bare.ts"
                  },
                  "new.ts": {
                    "sourceFilePath": "/src/new.ts",
                    "hash": "abc",
                    "mtime": 1700000000000,
                    "lastSyncedAt": "2025-01-01 00:00:00 +00:00"
                  }
                }
            "#},
        )?;

        let manifest = Manifest::load(".")?;
        assert_eq!(
            manifest.get("old.ts").map(|e| &e.fingerprint),
            Some(&Fingerprint::ModTime(1_700_000_000_000))
        );
        assert_eq!(
            manifest.get("bare.ts").map(|e| &e.fingerprint),
            Some(&Fingerprint::None)
        );
        assert_eq!(
            manifest.get("new.ts"),
            Some(&entry("/src/new.ts", Fingerprint::ContentHash("abc".into())))
        );

        Ok(())
    }

    #[sealed_test]
    fn flush_writes_pretty_json() -> anyhow::Result<()> {
        let mut manifest = Manifest::load(".")?;
        manifest.upsert(
            "a.txt",
            entry("/src/a.txt", Fingerprint::ContentHash("abc".into())),
        );
        assert!(manifest.flush_if_dirty()?);

        let expect = indoc! {r#"
            {
              "a.txt": {
                "sourceFilePath": "/src/a.txt",
                "hash": "abc",
                "localDate": "2025-01-01 00:00:00 +00:00"
              }
            }"#};
        assert_eq!(fs::read_to_string(MANIFEST_FILE_NAME)?, expect);
        assert_eq!(manifest.writes(), 1);

        Ok(())
    }

    #[sealed_test]
    fn dirty_check_compares_against_loaded_state() -> anyhow::Result<()> {
        let original = entry("/src/a.txt", Fingerprint::ContentHash("abc".into()));
        let mut manifest = Manifest::load(".")?;
        manifest.upsert("a.txt", original.clone());
        manifest.flush()?;

        let mut manifest = Manifest::load(".")?;
        manifest.upsert(
            "a.txt",
            entry("/src/a.txt", Fingerprint::ContentHash("def".into())),
        );
        assert!(manifest.is_dirty());

        // Restoring what was loaded makes it clean again.
        manifest.upsert("a.txt", original);
        assert!(!manifest.is_dirty());
        assert!(!manifest.flush_if_dirty()?);
        assert_eq!(manifest.writes(), 0);

        Ok(())
    }

    #[sealed_test]
    fn prune_removes_stale_entries_and_targets() -> anyhow::Result<()> {
        fs::create_dir_all("src")?;
        fs::create_dir_all("dst")?;
        fs::write("src/kept.txt", "kept")?;
        fs::write("dst/kept.txt", "kept")?;
        fs::write("dst/gone.txt", "gone")?;
        let cwd = std::env::current_dir()?;

        let mut manifest = Manifest::load("dst")?;
        manifest.upsert(
            "kept.txt",
            entry(cwd.join("src/kept.txt").to_str().unwrap(), Fingerprint::None),
        );
        manifest.upsert(
            "gone.txt",
            entry(cwd.join("src/gone.txt").to_str().unwrap(), Fingerprint::None),
        );
        manifest.upsert(
            "never-copied.txt",
            entry(cwd.join("src/never.txt").to_str().unwrap(), Fingerprint::None),
        );

        let outcome = manifest.prune("dst")?;
        assert_eq!(outcome.removed.len(), 2);
        assert!(outcome.failed.is_empty());
        assert!(!Path::new("dst/gone.txt").exists());
        assert!(Path::new("dst/kept.txt").exists());
        assert_eq!(manifest.entries().map(|(name, _)| name).collect::<Vec<_>>(), vec!["kept.txt"]);

        Ok(())
    }

    #[sealed_test]
    fn prune_keeps_entry_of_undeletable_target() -> anyhow::Result<()> {
        fs::create_dir_all("dst/gone.txt/occupied")?;
        let cwd = std::env::current_dir()?;

        let mut manifest = Manifest::load("dst")?;
        manifest.upsert(
            "gone.txt",
            entry(cwd.join("src/gone.txt").to_str().unwrap(), Fingerprint::None),
        );
        manifest.flush()?;

        let mut manifest = Manifest::load("dst")?;
        let outcome = manifest.prune("dst")?;
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, PathBuf::from("dst/gone.txt"));
        assert!(manifest.get("gone.txt").is_some());
        assert!(!manifest.is_dirty());
        assert_eq!(manifest.writes(), 0);
        assert!(Path::new("dst/gone.txt/occupied").is_dir());

        Ok(())
    }

    #[sealed_test]
    fn prune_never_escapes_target_dir() -> anyhow::Result<()> {
        fs::create_dir_all("dst")?;
        fs::write("precious.txt", "precious")?;

        let mut manifest = Manifest::load("dst")?;
        manifest.upsert("../precious.txt", entry("/nope/precious.txt", Fingerprint::None));
        let outcome = manifest.prune("dst")?;

        assert!(outcome.removed.is_empty());
        assert!(manifest.is_empty());
        assert!(Path::new("precious.txt").exists());

        Ok(())
    }
}
