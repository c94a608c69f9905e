// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project orchestration.
//!
//! Turn a [`PbkConfig`] into concrete jobs for the sync engine. There are two
//! kinds of jobs:
//!
//! 1. __Section sync__: incrementally sync a project's directory in the
//!    shared backend into every section's repository checkout, using each
//!    section's own filter patterns and prune flag.
//! 2. __Transfer__: mirror a project's directory from its source repository
//!    into the shared backend, replacing whatever was there.
//!
//! Jobs are planned up front so callers can report on them one at a time.

use crate::{
    config::{PbkConfig, Project, Section},
    sync::{
        mirror::{self, mirror_dirs},
        sync_dirs, SyncOptions, SyncReport, SyncError,
    },
};

use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Sync of one section from its project's shared backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionJob {
    pub project: String,
    pub section: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub options: SyncOptions,
}

impl SectionJob {
    fn new(project: &Project, section: &Section, shared_src_dir: PathBuf) -> Self {
        Self {
            project: project.name.clone(),
            section: section.name.clone(),
            source: shared_src_dir,
            target: section.target_dir(project),
            options: SyncOptions::new()
                .with_patterns(section.include.iter().cloned())
                .with_prune(section.prune),
        }
    }

    /// Run sync engine for this section.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError`] if the sync pass fails as a whole.
    pub fn run(&self) -> Result<SyncReport, SyncError> {
        sync_dirs(&self.source, &self.target, &self.options)
    }
}

/// Mirror of one project's sources into its shared backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub project: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

impl TransferJob {
    /// Mirror project sources into shared backend.
    ///
    /// Returns number of files copied.
    ///
    /// # Errors
    ///
    /// - Return [`mirror::MirrorError`] if mirroring fails.
    pub fn run(&self) -> mirror::Result<usize> {
        mirror_dirs(&self.source, &self.target)
    }
}

/// Plan section syncs of selected projects.
///
/// Projects without a shared backend are skipped with a warning.
///
/// # Errors
///
/// - Return [`ProjectError::UnknownProject`] if a project name was given but
///   no such project is configured.
#[instrument(skip(config), level = "debug")]
pub fn plan_section_syncs(config: &PbkConfig, name: Option<&str>) -> Result<Vec<SectionJob>> {
    let mut jobs = Vec::new();
    for project in selected(config, name)? {
        let Some(shared_src_dir) = project.shared_src_dir() else {
            warn!("project {:?} has no shared backend, skipping", project.name);
            continue;
        };

        if project.sections.is_empty() {
            info!("no sections in {:?}", project.name);
        }

        jobs.extend(
            project
                .sections
                .iter()
                .map(|section| SectionJob::new(project, section, shared_src_dir.clone())),
        );
    }

    Ok(jobs)
}

/// Plan transfers of selected projects.
///
/// Projects lacking either a source repository or a shared backend are
/// skipped with a warning. So are projects whose directory does not exist in
/// the shared backend yet, since a transfer only ever refreshes a project the
/// shared backend already knows about.
///
/// # Errors
///
/// - Return [`ProjectError::UnknownProject`] if a project name was given but
///   no such project is configured.
#[instrument(skip(config), level = "debug")]
pub fn plan_transfers(config: &PbkConfig, name: Option<&str>) -> Result<Vec<TransferJob>> {
    let mut jobs = Vec::new();
    for project in selected(config, name)? {
        match (project.source_src_dir(), project.shared_src_dir()) {
            (Some(_), Some(target)) if !target.is_dir() => warn!(
                "project {:?} has no directory {:?} in shared backend, skipping",
                project.name,
                target.display()
            ),
            (Some(source), Some(target)) => jobs.push(TransferJob {
                project: project.name.clone(),
                source,
                target,
            }),
            _ => warn!(
                "project {:?} needs both source and shared backend to transfer, skipping",
                project.name
            ),
        }
    }

    Ok(jobs)
}

/// Outcome of one section sync.
#[derive(Debug)]
pub struct SectionOutcome {
    pub job: SectionJob,
    pub result: Result<SyncReport, SyncError>,
}

impl SectionOutcome {
    /// Check if section synced without any failure.
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_ok_and(SyncReport::is_clean)
    }
}

/// Run every planned section sync in order.
///
/// Each job is handed to `run`, which normally is just [`SectionJob::run`],
/// but lets callers wrap a job in progress reporting. One failing section
/// never stops the others.
///
/// # Errors
///
/// - Return [`ProjectError::UnknownProject`] if a project name was given but
///   no such project is configured.
pub fn sync_sections(
    config: &PbkConfig,
    name: Option<&str>,
    mut run: impl FnMut(&SectionJob) -> Result<SyncReport, SyncError>,
) -> Result<Vec<SectionOutcome>> {
    Ok(plan_section_syncs(config, name)?
        .into_iter()
        .map(|job| {
            let result = run(&job);
            if let Err(err) = &result {
                warn!("section {:?} of {:?} failed: {err}", job.section, job.project);
            }
            SectionOutcome { job, result }
        })
        .collect())
}

fn selected<'a>(config: &'a PbkConfig, name: Option<&'a str>) -> Result<Vec<&'a Project>> {
    let projects = config.select(name).collect::<Vec<_>>();
    if let (Some(name), true) = (name, projects.is_empty()) {
        return Err(ProjectError::UnknownProject(name.to_string()));
    }

    Ok(projects)
}

/// Project orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// No project of given name is configured.
    #[error("no project named {0:?} in configuration")]
    UnknownProject(String),
}

/// Friendly result alias :3
pub type Result<T, E = ProjectError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{fs, path::Path};

    fn config() -> PbkConfig {
        PbkConfig {
            projects: vec![
                Project {
                    name: "games".into(),
                    base_dir: "portal/games".into(),
                    source: Some("games".into()),
                    shared_backend: Some("shared".into()),
                    sections: vec![
                        Section {
                            name: "api".into(),
                            local_path: "api".into(),
                            include: vec!["Zod".into()],
                            prune: true,
                        },
                        Section {
                            name: "web".into(),
                            local_path: "web".into(),
                            include: vec![],
                            prune: false,
                        },
                    ],
                },
                Project {
                    name: "lonely".into(),
                    base_dir: "lonely".into(),
                    source: Some("lonely".into()),
                    shared_backend: None,
                    sections: vec![Section {
                        name: "api".into(),
                        local_path: "api".into(),
                        ..Default::default()
                    }],
                },
            ],
        }
    }

    #[test]
    fn plan_section_syncs_skips_projects_without_backend() -> anyhow::Result<()> {
        let jobs = plan_section_syncs(&config(), None)?;
        let expect = vec![
            SectionJob {
                project: "games".into(),
                section: "api".into(),
                source: "shared/src/portal/games".into(),
                target: "api/src/portal/games".into(),
                options: SyncOptions::new().with_patterns(["Zod"]),
            },
            SectionJob {
                project: "games".into(),
                section: "web".into(),
                source: "shared/src/portal/games".into(),
                target: "web/src/portal/games".into(),
                options: SyncOptions::new().with_prune(false),
            },
        ];
        assert_eq!(jobs, expect);

        Ok(())
    }

    #[sealed_test]
    fn plan_transfers_needs_source_and_backend() -> anyhow::Result<()> {
        fs::create_dir_all("shared/src/portal/games")?;
        let jobs = plan_transfers(&config(), None)?;
        let expect = vec![TransferJob {
            project: "games".into(),
            source: "games/src/portal/games".into(),
            target: "shared/src/portal/games".into(),
        }];
        assert_eq!(jobs, expect);

        Ok(())
    }

    #[sealed_test]
    fn plan_transfers_skips_project_missing_from_backend() -> anyhow::Result<()> {
        let jobs = plan_transfers(&config(), Some("games"))?;
        assert!(jobs.is_empty());
        assert!(!Path::new("shared").exists());

        Ok(())
    }

    #[test]
    fn unknown_project_is_error() {
        let result = plan_section_syncs(&config(), Some("nope"));
        assert!(matches!(result, Err(ProjectError::UnknownProject(name)) if name == "nope"));
    }

    #[sealed_test]
    fn sync_sections_runs_every_section() -> anyhow::Result<()> {
        fs::create_dir_all("shared/src/portal/games")?;
        fs::write("shared/src/portal/games/gamesZod.ts", "zod")?;
        fs::write("shared/src/portal/games/plainHelper.ts", "plain")?;

        let outcomes = sync_sections(&config(), Some("games"), SectionJob::run)?;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(SectionOutcome::is_success));

        assert!(Path::new("api/src/portal/games/gamesZod.ts").exists());
        assert!(!Path::new("api/src/portal/games/plainHelper.ts").exists());
        assert!(Path::new("web/src/portal/games/gamesZod.ts").exists());
        assert!(Path::new("web/src/portal/games/plainHelper.ts").exists());

        Ok(())
    }

    #[sealed_test]
    fn sync_sections_continues_past_missing_source() -> anyhow::Result<()> {
        let outcomes = sync_sections(&config(), None, SectionJob::run)?;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome.result, Err(SyncError::SourceMissing { .. }))));

        Ok(())
    }
}
