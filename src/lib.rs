// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep project repositories in step with a shared backend.
//!
//! Pbk copies files from a shared backend repository into the repositories
//! of every __section__ of a __project__, and hands project sources back to
//! the shared backend. Copies are incremental: each target directory keeps a
//! manifest of what was copied from where, so repeated runs only touch what
//! changed, and files that vanished from the source are pruned.
//!
//! # See Also
//!
//! 1. [`sync`] for the incremental sync engine.
//! 2. [`config`] for the configuration layout.
//! 3. [`project`] for turning configuration into sync jobs.

pub mod config;
pub mod path;
pub mod project;
pub mod sync;

pub use sync::{sync_dirs, SyncOptions, SyncReport};
