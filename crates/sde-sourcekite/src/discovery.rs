//! Target discovery for a workspace.
//!
//! Targets come from four providers, consulted in order: hand-declared
//! targets, the build system's `.build/debug.yaml` (or `release.yaml`),
//! `swift package describe`, and finally a plain walk for `.swift` files.
//! A provider that fails contributes nothing. The results are flattened so
//! that each source file belongs to the first target that claimed it.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::SourcekiteError;
use crate::target::{flatten_unique, Target};

/// Glob used when a configured target names no sources.
pub const DEFAULT_SOURCE_GLOB: &str = "**/*.swift";

/// A target declared by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredTarget {
    pub name: String,
    /// Absolute, or relative to the workspace.
    pub path: PathBuf,
    /// Globs relative to `path`.
    pub sources: Option<Vec<String>>,
    pub compiler_arguments: Vec<String>,
}

/// Inputs for [`discover_targets`].
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// The `swift` driver.
    pub swift_path: String,
    /// Appended to targets described by `swift package describe`.
    pub default_compiler_arguments: Vec<String>,
    pub configured: Vec<ConfiguredTarget>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            swift_path: "swift".to_string(),
            default_compiler_arguments: Vec::new(),
            configured: Vec::new(),
        }
    }
}

/// Collect every target of `workspace`.
pub async fn discover_targets(workspace: &Path, options: &DiscoveryOptions) -> Vec<Target> {
    let configured = or_empty("config", configured_targets(workspace, &options.configured));
    let build_yaml = or_empty("build yaml", build_yaml_targets(workspace));
    let described = or_empty(
        "package description",
        described_targets(workspace, options).await,
    );
    let walked = vec![swift_file_target(workspace)];

    let targets = flatten_unique([configured, build_yaml, described, walked]);
    tracing::info!(
        "discovered {} targets in {}",
        targets.len(),
        workspace.display()
    );
    targets
}

fn or_empty(provider: &str, result: Result<Vec<Target>, SourcekiteError>) -> Vec<Target> {
    match result {
        Ok(targets) => {
            tracing::debug!("{} provider found {} targets", provider, targets.len());
            targets
        }
        Err(e) => {
            tracing::debug!("{} provider skipped: {}", provider, e);
            Vec::new()
        }
    }
}

/// Resolve `path` against `base` and drop `.`/`..` components lexically.
pub fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SourcekiteError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern.trim())
            .literal_separator(true)
            .build()
            .map_err(|e| SourcekiteError::Discovery(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SourcekiteError::Discovery(format!("invalid glob set: {}", e)))
}

/// Targets declared by hand, with their source globs expanded.
pub fn configured_targets(
    workspace: &Path,
    configured: &[ConfiguredTarget],
) -> Result<Vec<Target>, SourcekiteError> {
    let mut targets = Vec::new();
    for entry in configured {
        let path = normalize(workspace, &entry.path);
        if !entry.path.is_absolute() && !path.exists() {
            tracing::debug!("configured target {} has no directory, skipping", entry.name);
            continue;
        }

        let patterns = entry
            .sources
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_SOURCE_GLOB.to_string()]);
        let globs = build_globset(&patterns)?;

        let sources = WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .strip_prefix(&path)
                    .is_ok_and(|rel| globs.is_match(rel))
            })
            .map(|e| normalize(&path, e.path()))
            .collect();

        targets.push(Target {
            name: entry.name.clone(),
            path,
            sources,
            compiler_arguments: entry.compiler_arguments.clone(),
        });
    }
    Ok(targets)
}

#[derive(Debug, Deserialize)]
struct BuildYaml {
    #[serde(default)]
    commands: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct BuildCommand {
    #[serde(rename = "module-name")]
    module_name: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(rename = "import-paths", default)]
    import_paths: Vec<String>,
    #[serde(rename = "other-args", default)]
    other_args: Vec<String>,
}

impl BuildCommand {
    fn compiler_arguments(&self) -> Vec<String> {
        let mut args = self.other_args.clone();
        if let Some(module) = &self.module_name {
            args.extend(["-module-name".to_string(), module.clone(), "-Onone".to_string()]);
        }
        for import in &self.import_paths {
            // Each search path is passed to both swiftc and clang, as -I and -F.
            for flag in ["-I", "-F"] {
                args.extend(
                    ["-Xcc", flag, "-Xcc", import.as_str(), flag, import.as_str()]
                        .iter()
                        .map(|s| s.to_string()),
                );
            }
        }
        args
    }
}

/// Targets recorded by the last build in `.build/debug.yaml` or `release.yaml`.
pub fn build_yaml_targets(workspace: &Path) -> Result<Vec<Target>, SourcekiteError> {
    let build_dir = workspace.join(".build");
    let contents = std::fs::read_to_string(build_dir.join("debug.yaml"))
        .or_else(|_| std::fs::read_to_string(build_dir.join("release.yaml")))?;
    parse_build_yaml(workspace, &contents)
}

fn parse_build_yaml(workspace: &Path, contents: &str) -> Result<Vec<Target>, SourcekiteError> {
    let manifest: BuildYaml = serde_yaml::from_str(contents)
        .map_err(|e| SourcekiteError::Discovery(format!("build yaml: {}", e)))?;

    let mut targets = Vec::new();
    for (name, raw) in manifest.commands {
        let Ok(command) = serde_yaml::from_value::<BuildCommand>(raw) else {
            continue;
        };
        if command.sources.is_empty() {
            continue;
        }
        targets.push(Target {
            name: command.module_name.clone().unwrap_or(name),
            path: workspace.to_path_buf(),
            sources: command
                .sources
                .iter()
                .map(|s| normalize(workspace, Path::new(s)))
                .collect(),
            compiler_arguments: command.compiler_arguments(),
        });
    }
    Ok(targets)
}

#[derive(Debug, Deserialize)]
struct PackageDescription {
    modules: Option<Vec<ModuleDescription>>,
    targets: Option<Vec<ModuleDescription>>,
}

#[derive(Debug, Deserialize)]
struct ModuleDescription {
    name: String,
    path: PathBuf,
    #[serde(default)]
    sources: Vec<PathBuf>,
}

/// Targets reported by `swift package describe --type json`.
pub async fn described_targets(
    workspace: &Path,
    options: &DiscoveryOptions,
) -> Result<Vec<Target>, SourcekiteError> {
    let output = tokio::process::Command::new(&options.swift_path)
        .args(["package", "describe", "--type", "json"])
        .current_dir(workspace)
        .stdin(std::process::Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(SourcekiteError::Discovery(format!(
            "{} package describe exited with {}: {}",
            options.swift_path,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_package_description(workspace, &json, &options.default_compiler_arguments)
}

fn parse_package_description(
    workspace: &Path,
    json: &str,
    default_compiler_arguments: &[String],
) -> Result<Vec<Target>, SourcekiteError> {
    let description: PackageDescription = serde_json::from_str(json)
        .map_err(|e| SourcekiteError::Discovery(format!("package description: {}", e)))?;
    let modules = description
        .modules
        .or(description.targets)
        .unwrap_or_default();

    let build_debug = workspace.join(".build").join("debug");
    Ok(modules
        .into_iter()
        .map(|module| {
            let path = normalize(workspace, &module.path);
            let mut compiler_arguments =
                vec!["-I".to_string(), build_debug.to_string_lossy().into_owned()];
            compiler_arguments.extend(default_compiler_arguments.iter().cloned());
            Target {
                name: module.name,
                sources: module.sources.iter().map(|s| normalize(&path, s)).collect(),
                path,
                compiler_arguments,
            }
        })
        .collect())
}

/// One target holding every `.swift` file under `workspace`.
///
/// Hidden directories and `Carthage` checkouts are skipped.
pub fn swift_file_target(workspace: &Path) -> Target {
    let sources: BTreeSet<PathBuf> = WalkDir::new(workspace)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || {
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && name != "Carthage"
            }
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "swift"))
        .map(|e| normalize(workspace, e.path()))
        .collect();

    Target {
        name: workspace
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: workspace.to_path_buf(),
        sources,
        compiler_arguments: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn normalize_resolves_relative_and_dots() {
        assert_eq!(
            normalize(Path::new("/ws"), Path::new("Sources/./App/../Lib/x.swift")),
            PathBuf::from("/ws/Sources/Lib/x.swift")
        );
        assert_eq!(
            normalize(Path::new("/ws"), Path::new("/abs/y.swift")),
            PathBuf::from("/abs/y.swift")
        );
    }

    #[test]
    fn configured_target_expands_default_glob() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path();
        touch(&ws.join("Sources/App/main.swift"));
        touch(&ws.join("Sources/App/nested/util.swift"));
        touch(&ws.join("Sources/App/readme.md"));

        let targets = configured_targets(
            ws,
            &[ConfiguredTarget {
                name: "App".into(),
                path: "Sources/App".into(),
                sources: None,
                compiler_arguments: vec!["-DDEBUG".into()],
            }],
        )
        .unwrap();

        assert_eq!(targets.len(), 1);
        let t = &targets[0];
        assert_eq!(t.sources.len(), 2);
        assert!(t.contains(&ws.join("Sources/App/nested/util.swift")));
        assert_eq!(t.compiler_arguments, vec!["-DDEBUG"]);
    }

    #[test]
    fn configured_target_with_explicit_glob() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path();
        touch(&ws.join("App/a.swift"));
        touch(&ws.join("App/sub/b.swift"));

        let targets = configured_targets(
            ws,
            &[ConfiguredTarget {
                name: "App".into(),
                path: "App".into(),
                sources: Some(vec!["*.swift".into()]),
                compiler_arguments: vec![],
            }],
        )
        .unwrap();
        assert_eq!(
            targets[0].sources,
            BTreeSet::from([ws.join("App/a.swift")])
        );
    }

    #[test]
    fn configured_target_missing_dir_skipped() {
        let tmp = TempDir::new().unwrap();
        let targets = configured_targets(
            tmp.path(),
            &[ConfiguredTarget {
                name: "Gone".into(),
                path: "Nope".into(),
                sources: None,
                compiler_arguments: vec![],
            }],
        )
        .unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn build_yaml_commands_become_targets() {
        let yaml = r#"
client:
  name: swift-build
commands:
  "<App.module>":
    module-name: App
    sources: ["Sources/App/main.swift"]
    import-paths: ["/ws/.build/debug"]
    other-args: ["-j8"]
  "<link>":
    tool: shell
    inputs: ["a.o"]
"#;
        let targets = parse_build_yaml(Path::new("/ws"), yaml).unwrap();
        assert_eq!(targets.len(), 1);
        let t = &targets[0];
        assert_eq!(t.name, "App");
        assert!(t.contains(Path::new("/ws/Sources/App/main.swift")));
        assert_eq!(&t.compiler_arguments[..4], &["-j8", "-module-name", "App", "-Onone"]);
        assert!(t
            .compiler_arguments
            .windows(2)
            .any(|w| w[0] == "-I" && w[1] == "/ws/.build/debug"));
    }

    #[test]
    fn build_yaml_missing_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(build_yaml_targets(tmp.path()).is_err());
    }

    #[test]
    fn release_yaml_used_when_debug_absent() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join(".build");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(
            build.join("release.yaml"),
            "commands:\n  c:\n    sources: [\"a.swift\"]\n",
        )
        .unwrap();
        let targets = build_yaml_targets(tmp.path()).unwrap();
        assert_eq!(targets[0].name, "c");
    }

    #[test]
    fn package_description_modules() {
        let json = r#"{"name":"Pkg","modules":[{"name":"Lib","path":"Sources/Lib","sources":["Lib.swift"]}]}"#;
        let targets =
            parse_package_description(Path::new("/ws"), json, &["-swift-version".into(), "5".into()])
                .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].path, PathBuf::from("/ws/Sources/Lib"));
        assert!(targets[0].contains(Path::new("/ws/Sources/Lib/Lib.swift")));
        assert_eq!(
            targets[0].compiler_arguments,
            vec!["-I", "/ws/.build/debug", "-swift-version", "5"]
        );
    }

    #[test]
    fn package_description_falls_back_to_targets_key() {
        let json = r#"{"targets":[{"name":"T","path":"/abs/T","sources":[]}]}"#;
        let targets = parse_package_description(Path::new("/ws"), json, &[]).unwrap();
        assert_eq!(targets[0].name, "T");
    }

    #[test]
    fn swift_walk_skips_hidden_and_carthage() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path();
        touch(&ws.join("a.swift"));
        touch(&ws.join("Sources/b.swift"));
        touch(&ws.join(".build/checkouts/c.swift"));
        touch(&ws.join("Carthage/Checkouts/d.swift"));
        touch(&ws.join("notes.txt"));

        let t = swift_file_target(ws);
        assert_eq!(t.sources.len(), 2);
        assert!(t.contains(&ws.join("Sources/b.swift")));
    }

    #[tokio::test]
    async fn discovery_claims_each_source_once() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path();
        touch(&ws.join("Sources/App/main.swift"));
        touch(&ws.join("Tests/t.swift"));

        let options = DiscoveryOptions {
            swift_path: "/nonexistent/swift".into(),
            default_compiler_arguments: vec![],
            configured: vec![ConfiguredTarget {
                name: "App".into(),
                path: "Sources/App".into(),
                sources: None,
                compiler_arguments: vec![],
            }],
        };
        let targets = discover_targets(ws, &options).await;
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "App");
        assert!(targets[0].contains(&ws.join("Sources/App/main.swift")));
        assert_eq!(targets[1].sources, BTreeSet::from([ws.join("Tests/t.swift")]));
    }
}
