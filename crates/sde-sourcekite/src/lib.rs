//! sde-sourcekite — client for the sourcekite code-intelligence backend.
//!
//! Sourcekite speaks a line-oriented protocol over a child process's
//! stdin/stdout: each request is an id line followed by a key/value block,
//! each response is an id line followed by a payload ending in `}\n\n`.
//! This crate supervises that process, multiplexes concurrent requests over
//! the single stream, and restarts the backend when requests fail.
pub mod client;
pub mod completion;
pub mod correlator;
pub mod cursor;
pub mod discovery;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod session;
pub mod supervisor;
pub mod target;
pub mod transport;
pub mod types;

// Re-export key types for convenience.
pub use client::SourcekiteClient;
pub use completion::{CompletionItem, CompletionItemKind, OffsetEdit};
pub use correlator::{Correlator, SLOT_COUNT};
pub use cursor::{DefinitionLocation, HoverContents};
pub use discovery::{discover_targets, ConfiguredTarget, DiscoveryOptions};
pub use error::{ErrorKind, SourcekiteError};
pub use request::{RequestKind, RequestPayload};
pub use retry::RetryPolicy;
pub use session::SessionStatus;
pub use supervisor::ProcessSupervisor;
pub use target::{Target, TargetIndex};
pub use types::{FormatOptions, LineEdit, SourcekiteServerConfig};
