use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{error, info};

use sde_config::{load_config, Config};
use sde_platform::{DefaultPaths, PlatformPaths};
use sde_sourcekite::discovery::{discover_targets, ConfiguredTarget, DiscoveryOptions};
use sde_sourcekite::{
    FormatOptions, SourcekiteClient, SourcekiteServerConfig, Target, TargetIndex,
};

const USAGE: &str = "usage: sde <command> [args]

commands:
  complete <file> <offset>        completion items at a byte offset
  cursor-info <file> <offset>     raw cursor info
  hover <file> <offset>           hover contents
  definition <file> <offset>      declaration location
  demangle <name>...              demangle mangled names
  format <file> <start> <end>     format lines start..=end (1-based)
  targets                         list discovered targets";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Complete { file: PathBuf, offset: u64 },
    CursorInfo { file: PathBuf, offset: u64 },
    Hover { file: PathBuf, offset: u64 },
    Definition { file: PathBuf, offset: u64 },
    Demangle { names: Vec<String> },
    Format { file: PathBuf, start: u32, end: u32 },
    Targets,
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let Some((command, rest)) = args.split_first() else {
        bail!("missing command\n\n{}", USAGE);
    };

    let file_and_offset = |rest: &[String]| -> Result<(PathBuf, u64)> {
        match rest {
            [file, offset] => Ok((
                PathBuf::from(file),
                offset
                    .parse()
                    .with_context(|| format!("invalid offset: {}", offset))?,
            )),
            _ => bail!("{} expects <file> <offset>", command),
        }
    };

    let invocation = match command.as_str() {
        "complete" => {
            let (file, offset) = file_and_offset(rest)?;
            Invocation::Complete { file, offset }
        }
        "cursor-info" => {
            let (file, offset) = file_and_offset(rest)?;
            Invocation::CursorInfo { file, offset }
        }
        "hover" => {
            let (file, offset) = file_and_offset(rest)?;
            Invocation::Hover { file, offset }
        }
        "definition" => {
            let (file, offset) = file_and_offset(rest)?;
            Invocation::Definition { file, offset }
        }
        "demangle" if !rest.is_empty() => Invocation::Demangle {
            names: rest.to_vec(),
        },
        "demangle" => bail!("demangle expects at least one name"),
        "format" => match rest {
            [file, start, end] => Invocation::Format {
                file: PathBuf::from(file),
                start: start
                    .parse()
                    .with_context(|| format!("invalid line: {}", start))?,
                end: end.parse().with_context(|| format!("invalid line: {}", end))?,
            },
            _ => bail!("format expects <file> <start> <end>"),
        },
        "targets" => Invocation::Targets,
        other => bail!("unknown command: {}\n\n{}", other, USAGE),
    };
    Ok(invocation)
}

fn init_logging(config: &Config, paths: &DefaultPaths) {
    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| paths.log_dir().join("sde.log"));
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let filter_str = config.log.level.as_filter();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(filter_str))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(log_file) => tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .with_env_filter(env_filter)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init(),
    }

    info!("sde starting, log level: {}", filter_str);
}

fn server_config(
    config: &Config,
    workspace: &Path,
    paths: &dyn PlatformPaths,
) -> SourcekiteServerConfig {
    let sk = &config.sourcekite;
    SourcekiteServerConfig {
        command: sk.path.clone(),
        args: sk.args.clone(),
        docker_mode: sk.docker_mode,
        docker_image: sk.docker_image.clone(),
        shell_path: sk
            .shell_path
            .clone()
            .unwrap_or_else(|| paths.default_shell()),
        toolchain_path: sk.toolchain_path.clone(),
        workspace_paths: vec![workspace.to_path_buf()],
        trace: sk.trace,
        max_retries: sk.max_retries,
    }
}

fn discovery_options(config: &Config) -> DiscoveryOptions {
    DiscoveryOptions {
        swift_path: config.swift.path.clone(),
        default_compiler_arguments: config.swift.compiler_options.clone(),
        configured: config
            .targets
            .iter()
            .map(|t| ConfiguredTarget {
                name: t.name.clone(),
                path: t.path.clone(),
                sources: t.sources.clone(),
                compiler_arguments: t.compiler_arguments.clone(),
            })
            .collect(),
    }
}

fn format_options(config: &Config) -> FormatOptions {
    FormatOptions {
        indent_width: config.format.indent_width,
        tab_width: config.format.tab_width,
        use_tabs: config.format.use_tabs,
    }
}

fn target_json(target: &Target) -> serde_json::Value {
    json!({
        "name": target.name,
        "path": target.path,
        "sources": target.sources,
        "compiler_arguments": target.compiler_arguments,
    })
}

/// Absolute path and contents of a source file named on the command line.
fn open_source(file: &Path) -> Result<(PathBuf, String)> {
    let path = env::current_dir()
        .context("failed to read current directory")?
        .join(file);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read: {}", path.display()))?;
    Ok((path, text))
}

async fn execute(
    client: &SourcekiteClient,
    config: &Config,
    invocation: Invocation,
) -> Result<serde_json::Value> {
    let output = match invocation {
        Invocation::Complete { file, offset } => {
            let (file, text) = open_source(&file)?;
            serde_json::to_value(client.completions(&text, &file, offset).await?)?
        }
        Invocation::CursorInfo { file, offset } => {
            let (file, text) = open_source(&file)?;
            client.cursor_info(&text, &file, offset).await?
        }
        Invocation::Hover { file, offset } => {
            let (file, text) = open_source(&file)?;
            match client.hover(&text, &file, offset).await? {
                Some(hover) => json!({ "markdown": hover.to_markdown(), "hover": hover }),
                None => serde_json::Value::Null,
            }
        }
        Invocation::Definition { file, offset } => {
            let (file, text) = open_source(&file)?;
            serde_json::to_value(client.definition(&text, &file, offset).await?)?
        }
        Invocation::Demangle { names } => client.demangle(&names).await?,
        Invocation::Format { file, start, end } => {
            let (file, text) = open_source(&file)?;
            let edits = client
                .editor_format_text(&text, &file, start, end, format_options(config))
                .await?;
            serde_json::to_value(edits)?
        }
        Invocation::Targets => {
            let targets = client.targets().await;
            json!(targets.iter().map(target_json).collect::<Vec<_>>())
        }
    };
    Ok(output)
}

fn run(args: Vec<String>) -> Result<()> {
    let invocation = parse_args(&args)?;

    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let workspace = env::current_dir().context("failed to read current directory")?;
    let config = load_config(&paths.config_dir(), Some(&workspace))
        .context("failed to load configuration")?;

    init_logging(&config, &paths);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        let targets = discover_targets(&workspace, &discovery_options(&config)).await;

        let client = SourcekiteClient::start(
            server_config(&config, &workspace, &paths),
            TargetIndex::new(targets),
        )
        .context("failed to start sourcekite")?;

        let result = execute(&client, &config, invocation).await;
        if let Err(e) = client.shutdown().await {
            error!("shutdown failed: {}", e);
        }

        let output = result?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        info!("sde exited cleanly");
        Ok(())
    })
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if let Err(e) = run(args) {
        eprintln!("sde: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_offset_commands() {
        assert_eq!(
            parse_args(&args(&["complete", "main.swift", "42"])).unwrap(),
            Invocation::Complete {
                file: PathBuf::from("main.swift"),
                offset: 42
            }
        );
        assert_eq!(
            parse_args(&args(&["hover", "a.swift", "0"])).unwrap(),
            Invocation::Hover {
                file: PathBuf::from("a.swift"),
                offset: 0
            }
        );
    }

    #[test]
    fn parses_format_and_demangle() {
        assert_eq!(
            parse_args(&args(&["format", "a.swift", "1", "3"])).unwrap(),
            Invocation::Format {
                file: PathBuf::from("a.swift"),
                start: 1,
                end: 3
            }
        );
        assert_eq!(
            parse_args(&args(&["demangle", "$sSi", "$sSS"])).unwrap(),
            Invocation::Demangle {
                names: vec!["$sSi".into(), "$sSS".into()]
            }
        );
        assert_eq!(parse_args(&args(&["targets"])).unwrap(), Invocation::Targets);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["complete", "a.swift"])).is_err());
        assert!(parse_args(&args(&["complete", "a.swift", "x"])).is_err());
        assert!(parse_args(&args(&["demangle"])).is_err());
        assert!(parse_args(&args(&["explode"])).is_err());
    }

    #[test]
    fn server_config_carries_workspace() {
        let mut config = Config::default();
        config.sourcekite.docker_mode = true;
        config.sourcekite.max_retries = 2;
        let paths = DefaultPaths::with_home("/home/tester");
        let server = server_config(&config, Path::new("/ws"), &paths);
        assert!(server.docker_mode);
        assert_eq!(server.max_retries, 2);
        assert_eq!(server.workspace_paths, vec![PathBuf::from("/ws")]);
        assert_eq!(server.shell_path, paths.default_shell());
    }

    #[test]
    fn configured_shell_overrides_login_shell() {
        let mut config = Config::default();
        config.sourcekite.shell_path = Some(PathBuf::from("/bin/zsh"));
        let paths = DefaultPaths::with_home("/home/tester");
        let server = server_config(&config, Path::new("/ws"), &paths);
        assert_eq!(server.shell_path, PathBuf::from("/bin/zsh"));
    }

    #[test]
    fn discovery_options_map_configured_targets() {
        let config: Config = sde_config::load_from_str(
            r#"
[swift]
compiler_options = ["-DDEBUG"]

[[targets]]
name = "App"
path = "Sources/App"
"#,
        )
        .unwrap();
        let opts = discovery_options(&config);
        assert_eq!(opts.default_compiler_arguments, vec!["-DDEBUG".to_string()]);
        assert_eq!(opts.configured.len(), 1);
        assert_eq!(opts.configured[0].name, "App");
    }
}
