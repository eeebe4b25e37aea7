use std::path::{Path, PathBuf};

use crate::error::PlatformError;

/// Shell used when the configured one does not exist on disk.
pub const FALLBACK_SHELL: &str = "/usr/bin/sh";

/// Trait providing standard directory paths for sde.
pub trait PlatformPaths: Send + Sync {
    /// Returns the configuration directory (`~/.config/sde`).
    fn config_dir(&self) -> PathBuf;
    /// Returns the data directory (`~/.local/share/sde`).
    fn data_dir(&self) -> PathBuf;
    /// Returns the log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
    /// Returns the default shell executable path.
    fn default_shell(&self) -> PathBuf;
    /// Returns the user's home directory.
    fn home_dir(&self) -> PathBuf;
}

/// Default implementation of [`PlatformPaths`] using the `dirs` crate and
/// environment variables.
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Creates a new `DefaultPaths` instance, resolving the home directory.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        Ok(Self { home })
    }

    /// Creates paths rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join("sde")
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("sde")
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn default_shell(&self) -> PathBuf {
        std::env::var("SHELL")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/bin/bash"))
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }
}

/// Pick the shell used to wrap containerized commands.
///
/// The configured shell wins when it exists; otherwise [`FALLBACK_SHELL`].
pub fn resolve_shell(configured: &Path) -> PathBuf {
    if configured.exists() {
        configured.to_path_buf()
    } else {
        tracing::debug!(
            "shell {} not found, falling back to {}",
            configured.display(),
            FALLBACK_SHELL
        );
        PathBuf::from(FALLBACK_SHELL)
    }
}
