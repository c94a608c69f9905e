// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the `pbk.toml` configuration file. The configuration
//! lists every __project__ that pbk keeps in step with a shared backend, and
//! every __section__ of each project, i.e., every repository checkout that
//! receives files from that shared backend.
//!
//! # General Layout
//!
//! ```toml
//! [[project]]
//! name = "Example Project"
//! base_dir = "b2fPortal/example"
//! source = "~/projects/example"
//! shared_backend = "$WORK/shared-backend"
//!
//! [[project.section]]
//! name = "API"
//! local_path = "~/projects/api"
//! include = ["Zod"]
//! prune = true
//! ```
//!
//! Every path goes through shell expansion when parsed, so `~` and
//! environment variables may be used freely.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Pbk configuration layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PbkConfig {
    /// Listing of managed projects.
    #[serde(rename = "project", default)]
    pub projects: Vec<Project>,
}

impl PbkConfig {
    /// Read and parse configuration file at target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?
            .parse()
    }

    /// Write configuration to target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Serialize`] if configuration cannot be
    ///   serialized.
    /// - Return [`ConfigError::Write`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::ser::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        write(path.as_ref(), content).map_err(|err| ConfigError::Write {
            source: err,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Example configuration handed out by `pbk init`.
    pub fn example() -> Self {
        Self {
            projects: vec![Project {
                name: "Example Project".into(),
                base_dir: "example".into(),
                source: Some("~/projects/example".into()),
                shared_backend: Some("~/projects/shared-backend".into()),
                sections: vec![Section {
                    name: "API".into(),
                    local_path: "~/projects/example-api".into(),
                    include: vec!["Zod".into()],
                    prune: true,
                }],
            }],
        }
    }

    /// Select projects by name, or all projects if no name is given.
    pub fn select<'a>(&'a self, name: Option<&'a str>) -> impl Iterator<Item = &'a Project> + 'a {
        self.projects
            .iter()
            .filter(move |project| name.is_none_or(|name| project.name == name))
    }
}

impl FromStr for PbkConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: PbkConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        for project in &mut config.projects {
            if let Some(source) = project.source.take() {
                project.source = Some(expand(&source)?);
            }
            if let Some(shared_backend) = project.shared_backend.take() {
                project.shared_backend = Some(expand(&shared_backend)?);
            }
            for section in &mut project.sections {
                section.local_path = expand(&section.local_path)?;
            }
        }

        Ok(config)
    }
}

impl Display for PbkConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Project that shares a backend with its sections.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Project {
    /// Human readable name of project.
    pub name: String,

    /// Directory of project relative to each repository's `src` directory.
    pub base_dir: PathBuf,

    /// Repository that owns the project's sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Repository of shared backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_backend: Option<PathBuf>,

    /// Sections receiving files from shared backend.
    #[serde(rename = "section", default)]
    pub sections: Vec<Section>,
}

impl Project {
    /// Project directory inside source repository.
    pub fn source_src_dir(&self) -> Option<PathBuf> {
        self.source
            .as_ref()
            .map(|source| source.join("src").join(&self.base_dir))
    }

    /// Project directory inside shared backend repository.
    pub fn shared_src_dir(&self) -> Option<PathBuf> {
        self.shared_backend
            .as_ref()
            .map(|shared| shared.join("src").join(&self.base_dir))
    }
}

/// Repository checkout receiving files from shared backend.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Section {
    /// Human readable name of section.
    pub name: String,

    /// Path to repository checkout of section.
    pub local_path: PathBuf,

    /// File name patterns to sync. Empty means everything.
    #[serde(default)]
    pub include: Vec<String>,

    /// Delete files whose shared source vanished.
    #[serde(default = "default_prune")]
    pub prune: bool,
}

impl Section {
    /// Project directory inside section's repository.
    pub fn target_dir(&self, project: &Project) -> PathBuf {
        self.local_path.join("src").join(&project.base_dir)
    }
}

impl Default for Section {
    fn default() -> Self {
        Self {
            name: String::new(),
            local_path: PathBuf::new(),
            include: Vec::new(),
            prune: default_prune(),
        }
    }
}

fn default_prune() -> bool {
    true
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Configuration file cannot be read.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write configuration at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
