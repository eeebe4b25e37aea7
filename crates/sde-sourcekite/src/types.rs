//! Plain data types shared across the sourcekite client.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for launching the sourcekite backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcekiteServerConfig {
    /// Executable name or path of the sourcekite binary.
    pub command: String,
    /// Arguments passed to `command` in direct mode.
    pub args: Vec<String>,
    /// Launch through `docker run` instead of directly.
    pub docker_mode: bool,
    /// Image used in docker mode.
    pub docker_image: String,
    /// Shell wrapping the docker invocation.
    pub shell_path: PathBuf,
    /// Exported as `TOOLCHAIN_DIR` when present.
    pub toolchain_path: Option<PathBuf>,
    /// Directories bind-mounted into the container in docker mode.
    pub workspace_paths: Vec<PathBuf>,
    /// Log request payloads and raw output chunks.
    pub trace: bool,
    /// Resubmissions allowed per request.
    pub max_retries: u32,
}

impl Default for SourcekiteServerConfig {
    fn default() -> Self {
        Self {
            command: "sourcekite".to_string(),
            args: Vec::new(),
            docker_mode: false,
            docker_image: "jinmingjian/docker-sourcekite".to_string(),
            shell_path: PathBuf::from("/bin/bash"),
            toolchain_path: None,
            workspace_paths: Vec::new(),
            trace: false,
            max_retries: 5,
        }
    }
}

/// Options for `editor.formattext` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Indentation width in columns.
    pub indent_width: u8,
    /// Tab width in columns.
    pub tab_width: u8,
    /// Indent with tabs.
    pub use_tabs: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent_width: 4,
            tab_width: 4,
            use_tabs: false,
        }
    }
}

/// Replacement of a range of one line produced by the formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEdit {
    /// 1-based line number.
    pub line: u32,
    /// Byte offset into the line where the replaced range starts.
    pub offset: u64,
    /// Length of the replaced range.
    pub length: u64,
    /// Replacement text.
    pub text: String,
}
