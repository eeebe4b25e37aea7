//! The session task.
//!
//! One task owns the process supervisor, the correlator and the request-id
//! counter. Clients send it [`SessionCommand`]s; the child's reader tasks
//! send it [`ProcessEvent`]s. Nothing else touches that state, so no locks
//! are needed.
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::correlator::{Correlator, ResponseResult};
use crate::error::SourcekiteError;
use crate::request::RequestPayload;
use crate::supervisor::{ProcessEvent, ProcessSupervisor};
use crate::types::SourcekiteServerConfig;

/// Messages accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Assign an id, write the payload and answer through `responder`.
    Request {
        payload: RequestPayload,
        responder: oneshot::Sender<ResponseResult>,
    },
    /// Kill and respawn the backend.
    Restart {
        done: oneshot::Sender<Result<(), SourcekiteError>>,
    },
    /// Kill the backend and stop the task.
    Shutdown { done: oneshot::Sender<()> },
    /// Report the current state.
    Status { reply: oneshot::Sender<SessionStatus> },
}

/// Snapshot of a session, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub generation: u64,
    pub pending: usize,
    pub next_request_id: u64,
}

struct Session {
    supervisor: ProcessSupervisor,
    correlator: Correlator,
    next_request_id: u64,
    trace: bool,
}

/// Spawn the backend and the task that owns it.
///
/// Fails when the first spawn fails; no task is left running in that case.
pub fn start_session(
    config: SourcekiteServerConfig,
) -> Result<(mpsc::UnboundedSender<SessionCommand>, JoinHandle<()>), SourcekiteError> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let trace = config.trace;
    let mut supervisor = ProcessSupervisor::new(config, event_tx);
    supervisor.initialize()?;

    let session = Session {
        supervisor,
        correlator: Correlator::new(),
        next_request_id: 0,
        trace,
    };
    let handle = tokio::spawn(session.run(command_rx, event_rx));
    Ok((command_tx, handle))
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("all clients gone, stopping session");
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = events.recv() => self.handle_event(event),
            }
        }
        self.supervisor.terminate();
    }

    /// Returns false when the session should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Request { payload, responder } => {
                self.submit(payload, responder).await;
            }
            SessionCommand::Restart { done } => {
                let result = self.supervisor.restart();
                self.correlator.discard_buffer();
                let _ = done.send(result);
            }
            SessionCommand::Shutdown { done } => {
                tracing::info!("shutting down sourcekite session");
                self.supervisor.terminate();
                let _ = done.send(());
                return false;
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
        true
    }

    async fn submit(&mut self, payload: RequestPayload, responder: oneshot::Sender<ResponseResult>) {
        if let Err(e) = self.supervisor.initialize() {
            let _ = responder.send(Err(e));
            return;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        if self.trace {
            tracing::debug!("request {} ({}):\n{}", request_id, payload.kind, payload.text);
        } else {
            tracing::debug!("request {} ({})", request_id, payload.kind);
        }

        self.correlator.insert(request_id, responder);
        if let Err(e) = self.supervisor.write_request(request_id, &payload.text).await {
            tracing::warn!("writing request {} failed: {}", request_id, e);
            self.correlator.reject(request_id, e);
        }
    }

    fn handle_event(&mut self, event: ProcessEvent) {
        if event.generation() != self.supervisor.generation() {
            tracing::debug!("ignoring output of generation {}", event.generation());
            return;
        }

        match event {
            ProcessEvent::Stdout { chunk, .. } => {
                if self.trace {
                    tracing::debug!("sourcekite output: {}", String::from_utf8_lossy(&chunk));
                }
                match self.correlator.on_data(&chunk) {
                    Ok(Some(request_id)) => tracing::debug!("response for request {}", request_id),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("discarding response: {}", e),
                }
            }
            ProcessEvent::Closed { generation } => {
                match self.supervisor.handle_closed(generation) {
                    Ok(true) => self.correlator.discard_buffer(),
                    Ok(false) => {}
                    Err(e) => tracing::error!("could not respawn sourcekite: {}", e),
                }
            }
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            running: self.supervisor.is_running(),
            pid: self.supervisor.pid(),
            generation: self.supervisor.generation(),
            pending: self.correlator.pending_count(),
            next_request_id: self.next_request_id,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::request::RequestKind;

    fn payload(text: &str) -> RequestPayload {
        RequestPayload {
            kind: RequestKind::Demangle,
            text: text.to_string(),
        }
    }

    async fn status(tx: &mpsc::UnboundedSender<SessionCommand>) -> SessionStatus {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Status { reply }).unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn start_fails_for_missing_binary() {
        let result = start_session(SourcekiteServerConfig {
            command: "/nonexistent/sourcekite".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SourcekiteError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn echo_backend_round_trips() {
        // `cat` echoes the id line and payload back, which is a valid frame.
        let (tx, handle) = start_session(SourcekiteServerConfig {
            command: "cat".into(),
            ..Default::default()
        })
        .unwrap();

        // Sent one at a time: two echoed frames coalesced into a single
        // chunk would read as one frame.
        for n in 1..=2 {
            let text = format!("{{\n  key.n: {}\n}}\n\n", n);
            let (responder, rx) = oneshot::channel();
            tx.send(SessionCommand::Request {
                payload: payload(&text),
                responder,
            })
            .unwrap();
            assert_eq!(rx.await.unwrap().unwrap(), text);
        }

        let st = status(&tx).await;
        assert!(st.running);
        assert_eq!(st.pending, 0);
        assert_eq!(st.next_request_id, 2);

        let (done, done_rx) = oneshot::channel();
        tx.send(SessionCommand::Shutdown { done }).unwrap();
        done_rx.await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn restart_keeps_id_counter() {
        let (tx, _handle) = start_session(SourcekiteServerConfig {
            command: "cat".into(),
            ..Default::default()
        })
        .unwrap();

        let (rtx, rrx) = oneshot::channel();
        tx.send(SessionCommand::Request {
            payload: payload("{\n}\n\n"),
            responder: rtx,
        })
        .unwrap();
        rrx.await.unwrap().unwrap();

        let (done, done_rx) = oneshot::channel();
        tx.send(SessionCommand::Restart { done }).unwrap();
        done_rx.await.unwrap().unwrap();

        let st = status(&tx).await;
        assert_eq!(st.generation, 2);
        assert_eq!(st.next_request_id, 1);
    }

    #[tokio::test]
    async fn dropping_all_senders_stops_task() {
        let (tx, handle) = start_session(SourcekiteServerConfig {
            command: "cat".into(),
            ..Default::default()
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
