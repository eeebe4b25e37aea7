//! Public async API over a sourcekite session.
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};

use sde_platform::SystemInfo;

use crate::completion::{completion_items, CompletionItem};
use crate::cursor::{
    container_type_name, container_type_usr, definition_from_cursor_info, hover_from_cursor_info,
    DefinitionLocation, HoverContents,
};
use crate::error::SourcekiteError;
use crate::request::{
    demangle_request, editor_open_request, format_text_request, resolve_compiler_arguments,
    source_request, RequestKind, RequestPayload,
};
use crate::response::{decode, project};
use crate::retry::RetryPolicy;
use crate::session::{start_session, SessionCommand, SessionStatus};
use crate::target::{Target, TargetIndex};
use crate::types::{FormatOptions, LineEdit, SourcekiteServerConfig};

/// Handle to a running sourcekite session.
///
/// Cheap to clone; every clone talks to the same backend process. The
/// session stops when the last clone is dropped or [`shutdown`] is called.
///
/// [`shutdown`]: SourcekiteClient::shutdown
#[derive(Clone)]
pub struct SourcekiteClient {
    commands: mpsc::UnboundedSender<SessionCommand>,
    retry: RetryPolicy,
    targets: Arc<RwLock<TargetIndex>>,
    host: SystemInfo,
}

/// Progress of a multi-line format request.
#[derive(Debug)]
enum FormatState {
    Opened,
    Formatting(u32),
    Done,
    Failed(SourcekiteError),
}

impl SourcekiteClient {
    /// Spawn sourcekite and start its session.
    pub fn start(
        config: SourcekiteServerConfig,
        targets: TargetIndex,
    ) -> Result<Self, SourcekiteError> {
        let retry = RetryPolicy::new(config.max_retries);
        let (commands, _handle) = start_session(config)?;
        Ok(Self {
            commands,
            retry,
            targets: Arc::new(RwLock::new(targets)),
            host: SystemInfo::detect(),
        })
    }

    /// Override the host used for default `-target` inference.
    pub fn with_host(mut self, host: SystemInfo) -> Self {
        self.host = host;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send one request and wait for its raw payload. No retry.
    pub async fn send(&self, payload: RequestPayload) -> Result<String, SourcekiteError> {
        let (responder, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Request { payload, responder })
            .map_err(|_| SourcekiteError::SessionClosed)?;
        rx.await.map_err(|_| SourcekiteError::SessionClosed)?
    }

    /// Send a request under the retry policy and decode the response.
    pub async fn request(&self, payload: RequestPayload) -> Result<Value, SourcekiteError> {
        let client = self;
        let kind = payload.kind;
        let raw = self
            .retry
            .run(
                move |retries| {
                    if retries > 0 {
                        tracing::debug!("retrying {} (retry {})", kind, retries);
                    }
                    client.send(payload.clone())
                },
                move || async move {
                    if let Err(e) = client.restart().await {
                        tracing::warn!("restart during retry failed: {}", e);
                    }
                },
            )
            .await?;
        decode(&raw)
    }

    async fn compiler_arguments(&self, path: &Path, text: &str) -> Vec<String> {
        let target = self.target_for_source(path).await;
        resolve_compiler_arguments(&target, path, text, &self.host)
    }

    /// Completion candidates at `offset`, the `key.results` array.
    pub async fn code_complete(
        &self,
        text: &str,
        path: &Path,
        offset: u64,
    ) -> Result<Value, SourcekiteError> {
        let args = self.compiler_arguments(path, text).await;
        let payload = source_request(RequestKind::CodeComplete, path, offset, &args, text);
        let response = self.request(payload).await?;
        Ok(project(&response, "key.results"))
    }

    /// Symbol information at `offset`.
    pub async fn cursor_info(
        &self,
        text: &str,
        path: &Path,
        offset: u64,
    ) -> Result<Value, SourcekiteError> {
        let args = self.compiler_arguments(path, text).await;
        let payload = source_request(RequestKind::CursorInfo, path, offset, &args, text);
        self.request(payload).await
    }

    /// Completion candidates at `offset` as editor items.
    pub async fn completions(
        &self,
        text: &str,
        path: &Path,
        offset: u64,
    ) -> Result<Vec<CompletionItem>, SourcekiteError> {
        let results = self.code_complete(text, path, offset).await?;
        Ok(completion_items(&results, text, offset as usize))
    }

    /// Hover contents for the symbol at `offset`.
    ///
    /// The enclosing type is demangled with a second request; if that fails
    /// the hover is returned without it.
    pub async fn hover(
        &self,
        text: &str,
        path: &Path,
        offset: u64,
    ) -> Result<Option<HoverContents>, SourcekiteError> {
        let info = self.cursor_info(text, path, offset).await?;
        let container_type = match container_type_usr(&info) {
            Some(usr) => match self.demangle(&[usr.to_string()]).await {
                Ok(results) => container_type_name(&results),
                Err(e) => {
                    tracing::debug!("demangling {} failed: {}", usr, e);
                    None
                }
            },
            None => None,
        };
        Ok(hover_from_cursor_info(&info, container_type))
    }

    /// Where the symbol at `offset` is declared.
    pub async fn definition(
        &self,
        text: &str,
        path: &Path,
        offset: u64,
    ) -> Result<Option<DefinitionLocation>, SourcekiteError> {
        let info = self.cursor_info(text, path, offset).await?;
        Ok(definition_from_cursor_info(&info))
    }

    /// Demangle symbol names, the `key.results` array.
    pub async fn demangle(&self, names: &[String]) -> Result<Value, SourcekiteError> {
        let response = self.request(demangle_request(names)).await?;
        Ok(project(&response, "key.results"))
    }

    /// Register a buffer with sourcekite.
    pub async fn editor_open(&self, text: &str, path: &Path) -> Result<Value, SourcekiteError> {
        let args = self.compiler_arguments(path, text).await;
        self.request(editor_open_request(path, text, &args)).await
    }

    /// Format lines `line_start..=line_end` (1-based) of a buffer.
    ///
    /// The buffer is opened first, then each line is formatted in turn.
    /// The first failure ends the run. An empty range yields no edits.
    pub async fn editor_format_text(
        &self,
        text: &str,
        path: &Path,
        line_start: u32,
        line_end: u32,
        options: FormatOptions,
    ) -> Result<Vec<LineEdit>, SourcekiteError> {
        let mut edits = Vec::new();
        let mut state = match self.editor_open(text, path).await {
            Ok(_) => FormatState::Opened,
            Err(e) => FormatState::Failed(e),
        };

        loop {
            state = match state {
                FormatState::Opened if line_start > line_end => FormatState::Done,
                FormatState::Opened => FormatState::Formatting(line_start),
                FormatState::Formatting(line) => {
                    match self.request(format_text_request(path, line, &options)).await {
                        Ok(response) => {
                            edits.push(line_edit(line, &response));
                            if line >= line_end {
                                FormatState::Done
                            } else {
                                FormatState::Formatting(line + 1)
                            }
                        }
                        Err(e) => FormatState::Failed(e),
                    }
                }
                FormatState::Done => return Ok(edits),
                FormatState::Failed(e) => {
                    tracing::debug!("formatting {} stopped: {}", path.display(), e);
                    return Err(e);
                }
            };
        }
    }

    /// Kill and respawn the backend. Pending requests stay pending.
    pub async fn restart(&self) -> Result<(), SourcekiteError> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Restart { done })
            .map_err(|_| SourcekiteError::SessionClosed)?;
        rx.await.map_err(|_| SourcekiteError::SessionClosed)?
    }

    /// Kill the backend and stop the session.
    pub async fn shutdown(&self) -> Result<(), SourcekiteError> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Shutdown { done })
            .map_err(|_| SourcekiteError::SessionClosed)?;
        rx.await.map_err(|_| SourcekiteError::SessionClosed)
    }

    pub async fn status(&self) -> Result<SessionStatus, SourcekiteError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Status { reply })
            .map_err(|_| SourcekiteError::SessionClosed)?;
        rx.await.map_err(|_| SourcekiteError::SessionClosed)
    }

    /// The target whose compiler arguments apply to `path`.
    pub async fn target_for_source(&self, path: &Path) -> Target {
        self.targets.read().await.target_for_source(path)
    }

    /// Snapshot of the known targets.
    pub async fn targets(&self) -> Vec<Target> {
        self.targets.read().await.targets().to_vec()
    }

    /// Replace the known targets, e.g. after rediscovery.
    pub async fn set_targets(&self, targets: TargetIndex) {
        *self.targets.write().await = targets;
    }

    pub async fn source_created(&self, path: &Path) -> Option<String> {
        self.targets.write().await.source_created(path)
    }

    pub async fn source_deleted(&self, path: &Path) -> bool {
        self.targets.write().await.source_deleted(path)
    }
}

fn line_edit(line: u32, response: &Value) -> LineEdit {
    LineEdit {
        line: response
            .get("key.line")
            .and_then(Value::as_u64)
            .and_then(|l| u32::try_from(l).ok())
            .unwrap_or(line),
        offset: response.get("key.offset").and_then(Value::as_u64).unwrap_or(0),
        length: response.get("key.length").and_then(Value::as_u64).unwrap_or(0),
        text: response
            .get("key.sourcetext")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}
