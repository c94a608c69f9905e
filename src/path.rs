// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where pbk should look for its configuration file.

use std::path::{Path, PathBuf};

/// Name of pbk configuration file.
pub const CONFIG_FILE_NAME: &str = "pbk.toml";

/// Determine default absolute path to user-wide configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/pbk/pbk.toml`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("pbk").join(CONFIG_FILE_NAME))
        .ok_or(NoConfigDir)
}

/// Locate configuration file to use.
///
/// An explicit path always wins. Otherwise `pbk.toml` in the current
/// directory is used if it exists, falling back to
/// [`default_config_path`].
///
/// # Errors
///
/// - Return [`NoConfigDir`] if fallback is needed but configuration directory
///   cannot be determined.
pub fn locate_config(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    default_config_path()
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn explicit_path_wins() -> anyhow::Result<()> {
        let result = locate_config(Some(Path::new("/etc/blah.toml")))?;
        assert_eq!(result, PathBuf::from("/etc/blah.toml"));

        Ok(())
    }

    #[sealed_test]
    fn local_config_before_user_config() -> anyhow::Result<()> {
        std::fs::write(CONFIG_FILE_NAME, "")?;
        assert_eq!(locate_config(None)?, PathBuf::from(CONFIG_FILE_NAME));

        Ok(())
    }

    #[sealed_test(env = [("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn user_config_fallback() -> anyhow::Result<()> {
        if cfg!(target_os = "linux") {
            assert_eq!(
                locate_config(None)?,
                PathBuf::from("/home/blah/.config/pbk/pbk.toml")
            );
        }

        Ok(())
    }
}
