//! sde-platform — host paths and system detection for sde.
pub mod error;
pub mod paths;
pub mod system_info;

pub use error::PlatformError;
pub use paths::{resolve_shell, DefaultPaths, PlatformPaths, FALLBACK_SHELL};
pub use system_info::{Arch, OsKind, SystemInfo};
