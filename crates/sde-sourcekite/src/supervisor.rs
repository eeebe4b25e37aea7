//! Lifecycle of the sourcekite child process.
//!
//! The supervisor owns at most one child. Its stdout is forwarded as raw
//! chunks over an event channel by a reader task; every spawn gets a new
//! generation number so that output and EOF from a replaced process can be
//! told apart from the live one.
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use sde_platform::resolve_shell;

use crate::error::SourcekiteError;
use crate::transport::id_line;
use crate::types::SourcekiteServerConfig;

const READ_CHUNK_SIZE: usize = 8192;

/// Something the child's reader tasks observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Bytes read from stdout.
    Stdout { generation: u64, chunk: Vec<u8> },
    /// Stdout reached EOF or failed.
    Closed { generation: u64 },
}

impl ProcessEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ProcessEvent::Stdout { generation, .. } | ProcessEvent::Closed { generation } => {
                *generation
            }
        }
    }
}

/// Owns the sourcekite child process.
pub struct ProcessSupervisor {
    config: SourcekiteServerConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    generation: u64,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl ProcessSupervisor {
    /// Create a supervisor reporting to `events`. Nothing is spawned yet.
    pub fn new(config: SourcekiteServerConfig, events: mpsc::UnboundedSender<ProcessEvent>) -> Self {
        Self {
            config,
            child: None,
            stdin: None,
            generation: 0,
            events,
        }
    }

    pub fn config(&self) -> &SourcekiteServerConfig {
        &self.config
    }

    /// Generation of the most recent spawn; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// OS pid of the live child.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// The command that launches sourcekite with the current configuration.
    ///
    /// Direct mode runs the binary itself. Docker mode runs
    /// `<shell> -c "docker run --rm -v '<ws>:<ws>' ... -i <image>"`.
    pub fn build_command(&self) -> Command {
        let mut cmd = if self.config.docker_mode {
            let volumes: Vec<String> = self
                .config
                .workspace_paths
                .iter()
                .map(|p| format!("-v '{0}:{0}'", p.display()))
                .collect();
            let mut docker_run = String::from("docker run --rm ");
            for volume in &volumes {
                docker_run.push_str(volume);
                docker_run.push(' ');
            }
            docker_run.push_str("-i ");
            docker_run.push_str(&self.config.docker_image);

            let mut cmd = Command::new(resolve_shell(&self.config.shell_path));
            cmd.arg("-c").arg(docker_run);
            cmd
        } else {
            let mut cmd = Command::new(&self.config.command);
            cmd.args(&self.config.args);
            cmd
        };

        if let Some(toolchain) = &self.config.toolchain_path {
            cmd.env("TOOLCHAIN_DIR", toolchain);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn the child unless one is already tracked.
    pub fn initialize(&mut self) -> Result<(), SourcekiteError> {
        if self.child.is_some() {
            return Ok(());
        }
        self.spawn()
    }

    fn spawn(&mut self) -> Result<(), SourcekiteError> {
        tracing::info!(
            "starting sourcekite ({})",
            if self.config.docker_mode {
                format!("docker image {}", self.config.docker_image)
            } else {
                self.config.command.clone()
            }
        );

        let mut child = self.build_command().spawn().map_err(|e| {
            let program = if self.config.docker_mode {
                resolve_shell(&self.config.shell_path).display().to_string()
            } else {
                self.config.command.clone()
            };
            tracing::error!(
                "the '{}' command is not available ({}). Check the sourcekite.path setting and make sure sourcekite is installed",
                program,
                e
            );
            SourcekiteError::SpawnFailed(format!("{}: {}", program, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SourcekiteError::SpawnFailed("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourcekiteError::SpawnFailed("could not capture stdout".into()))?;

        self.generation += 1;
        let generation = self.generation;

        tokio::spawn(read_stdout(stdout, generation, self.events.clone()));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, generation));
        }

        tracing::info!(
            "sourcekite running (pid {:?}, generation {})",
            child.id(),
            generation
        );
        self.stdin = Some(stdin);
        self.child = Some(child);
        Ok(())
    }

    /// Kill the tracked child, if any, without waiting for it to exit.
    pub fn terminate(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            tracing::info!("terminating sourcekite (pid {:?})", child.id());
            if let Err(e) = child.start_kill() {
                tracing::debug!("kill failed: {}", e);
            }
        }
    }

    /// Terminate then spawn a fresh child.
    pub fn restart(&mut self) -> Result<(), SourcekiteError> {
        self.terminate();
        self.initialize()
    }

    /// React to stdout closing.
    ///
    /// When `generation` is the live child the process is considered dead
    /// and a replacement is spawned. Returns whether a respawn happened.
    pub fn handle_closed(&mut self, generation: u64) -> Result<bool, SourcekiteError> {
        if generation != self.generation || self.child.is_none() {
            tracing::debug!("ignoring close of stale generation {}", generation);
            return Ok(false);
        }

        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(status)) => tracing::warn!("sourcekite exited: {}", status),
                Ok(None) => {
                    tracing::warn!("sourcekite closed its output, killing it");
                    let _ = child.start_kill();
                }
                Err(e) => tracing::warn!("sourcekite exited, status unknown: {}", e),
            }
        }

        self.spawn()?;
        Ok(true)
    }

    /// Write one request: the id line, then the payload.
    pub async fn write_request(
        &mut self,
        request_id: u64,
        payload: &str,
    ) -> Result<(), SourcekiteError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(SourcekiteError::ProcessUnavailable)?;
        stdin.write_all(id_line(request_id).as_bytes()).await?;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

async fn read_stdout(
    mut stdout: ChildStdout,
    generation: u64,
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let event = ProcessEvent::Stdout {
                    generation,
                    chunk: buf[..n].to_vec(),
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("stdout read failed: {}", e);
                break;
            }
        }
    }
    let _ = events.send(ProcessEvent::Closed { generation });
}

async fn forward_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(target: "sourcekite", generation, "stderr: {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn supervisor(config: SourcekiteServerConfig) -> (ProcessSupervisor, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProcessSupervisor::new(config, tx), rx)
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn env(cmd: &Command, key: &str) -> Option<String> {
        cmd.as_std()
            .get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v.map(|v| v.to_string_lossy().into_owned()))
    }

    #[test]
    fn direct_command() {
        let (sup, _rx) = supervisor(SourcekiteServerConfig {
            command: "/opt/bin/sourcekite".into(),
            args: vec!["--verbose".into()],
            ..Default::default()
        });
        let cmd = sup.build_command();
        assert_eq!(cmd.as_std().get_program(), "/opt/bin/sourcekite");
        assert_eq!(args(&cmd), vec!["--verbose"]);
        assert_eq!(env(&cmd, "TOOLCHAIN_DIR"), None);
    }

    #[test]
    fn toolchain_dir_exported() {
        let (sup, _rx) = supervisor(SourcekiteServerConfig {
            toolchain_path: Some(PathBuf::from("/tc")),
            ..Default::default()
        });
        assert_eq!(env(&sup.build_command(), "TOOLCHAIN_DIR").as_deref(), Some("/tc"));
    }

    #[test]
    fn docker_command_mounts_workspaces() {
        let (sup, _rx) = supervisor(SourcekiteServerConfig {
            docker_mode: true,
            shell_path: PathBuf::from("/definitely/not/a/shell"),
            workspace_paths: vec![PathBuf::from("/ws/a"), PathBuf::from("/ws/b")],
            ..Default::default()
        });
        let cmd = sup.build_command();
        assert_eq!(cmd.as_std().get_program(), "/usr/bin/sh");
        assert_eq!(
            args(&cmd),
            vec![
                "-c",
                "docker run --rm -v '/ws/a:/ws/a' -v '/ws/b:/ws/b' -i jinmingjian/docker-sourcekite"
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let (mut sup, _rx) = supervisor(SourcekiteServerConfig {
            command: "/nonexistent/sourcekite-binary".into(),
            ..Default::default()
        });
        let err = sup.initialize().unwrap_err();
        assert!(matches!(err, SourcekiteError::SpawnFailed(_)));
        assert!(!sup.is_running());
        assert_eq!(sup.generation(), 0);
    }

    #[tokio::test]
    async fn write_without_process_fails() {
        let (mut sup, _rx) = supervisor(SourcekiteServerConfig::default());
        let err = sup.write_request(1, "{\n}\n\n").await.unwrap_err();
        assert!(matches!(err, SourcekiteError::ProcessUnavailable));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn initialize_is_idempotent_and_echoes() {
        let (mut sup, mut rx) = supervisor(SourcekiteServerConfig {
            command: "cat".into(),
            ..Default::default()
        });
        sup.initialize().unwrap();
        let pid = sup.pid();
        sup.initialize().unwrap();
        assert_eq!(sup.pid(), pid);
        assert_eq!(sup.generation(), 1);

        sup.write_request(3, "{\n}\n\n").await.unwrap();
        let mut echoed = Vec::new();
        while !echoed.ends_with(b"}\n\n") {
            match rx.recv().await.unwrap() {
                ProcessEvent::Stdout { generation, chunk } => {
                    assert_eq!(generation, 1);
                    echoed.extend(chunk);
                }
                ProcessEvent::Closed { .. } => panic!("closed early"),
            }
        }
        assert_eq!(echoed, b"3\n{\n}\n\n");
        sup.terminate();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_bumps_generation_and_ignores_stale_close() {
        let (mut sup, _rx) = supervisor(SourcekiteServerConfig {
            command: "cat".into(),
            ..Default::default()
        });
        sup.initialize().unwrap();
        sup.restart().unwrap();
        assert_eq!(sup.generation(), 2);
        assert!(!sup.handle_closed(1).unwrap());
        assert!(sup.is_running());

        assert!(sup.handle_closed(2).unwrap());
        assert_eq!(sup.generation(), 3);
        sup.terminate();
        assert!(!sup.is_running());
        assert!(!sup.handle_closed(3).unwrap());
    }
}
