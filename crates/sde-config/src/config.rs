use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How the sourcekite backend process is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcekiteConfig {
    /// Path (or bare name on `PATH`) of the sourcekite binary.
    #[serde(default = "default_sourcekite_path")]
    pub path: String,
    /// Extra arguments for the sourcekite binary.
    #[serde(default)]
    pub args: Vec<String>,
    /// Run sourcekite inside a docker container through a shell wrapper.
    #[serde(default)]
    pub docker_mode: bool,
    /// Image used in docker mode.
    #[serde(default = "default_docker_image")]
    pub docker_image: String,
    /// Shell that wraps the docker invocation; the login shell when unset.
    #[serde(default)]
    pub shell_path: Option<PathBuf>,
    /// Exported to the child as `TOOLCHAIN_DIR` when set.
    #[serde(default)]
    pub toolchain_path: Option<PathBuf>,
    /// Log every request and raw response chunk at debug level.
    #[serde(default)]
    pub trace: bool,
    /// How many times a failed request is resubmitted after a restart.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_sourcekite_path() -> String {
    "sourcekite".to_string()
}

fn default_docker_image() -> String {
    "jinmingjian/docker-sourcekite".to_string()
}

fn default_max_retries() -> u32 {
    5
}

impl Default for SourcekiteConfig {
    fn default() -> Self {
        Self {
            path: default_sourcekite_path(),
            args: Vec::new(),
            docker_mode: false,
            docker_image: default_docker_image(),
            shell_path: None,
            toolchain_path: None,
            trace: false,
            max_retries: default_max_retries(),
        }
    }
}

/// Swift toolchain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwiftConfig {
    /// The `swift` driver used for `swift package describe`.
    #[serde(default = "default_swift_path")]
    pub path: String,
    /// Extra compiler options appended to package-described targets.
    #[serde(default)]
    pub compiler_options: Vec<String>,
}

fn default_swift_path() -> String {
    "swift".to_string()
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            path: default_swift_path(),
            compiler_options: Vec::new(),
        }
    }
}

/// Options sent with `editor.formattext` requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Indentation width in columns (1–16).
    #[serde(default = "default_width")]
    pub indent_width: u8,
    /// Tab width in columns (1–16).
    #[serde(default = "default_width")]
    pub tab_width: u8,
    /// Indent with tab characters.
    #[serde(default)]
    pub use_tabs: bool,
}

fn default_width() -> u8 {
    4
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            indent_width: 4,
            tab_width: 4,
            use_tabs: false,
        }
    }
}

/// A target declared by hand in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Module name.
    pub name: String,
    /// Target directory, absolute or relative to the workspace.
    pub path: PathBuf,
    /// Source globs relative to `path`; `**/*.swift` when absent.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    /// Compiler arguments passed verbatim to sourcekite.
    #[serde(default)]
    pub compiler_arguments: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level sde configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Sourcekite backend.
    #[serde(default)]
    pub sourcekite: SourcekiteConfig,
    /// Swift toolchain.
    #[serde(default)]
    pub swift: SwiftConfig,
    /// Formatting options.
    #[serde(default)]
    pub format: FormatConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Hand-declared targets, merged ahead of discovered ones.
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}
