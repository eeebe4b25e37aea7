//! Response correlator for the sourcekite stream.
//!
//! Requests are slotted by `id % SLOT_COUNT`. Output from the process is
//! accumulated until a frame terminator shows up, then the frame's id picks
//! the slot whose caller receives the payload. A slot holds at most one
//! outstanding request: registering into an occupied slot rejects the
//! previous occupant with [`SourcekiteError::Superseded`].
use tokio::sync::oneshot;

use crate::error::SourcekiteError;
use crate::transport::{is_complete_frame, split_frame};

/// Number of request slots.
pub const SLOT_COUNT: usize = 64;

/// What a pending caller eventually receives: raw payload text or a rejection.
pub type ResponseResult = Result<String, SourcekiteError>;

struct PendingSlot {
    request_id: u64,
    responder: oneshot::Sender<ResponseResult>,
}

/// Fixed slot table plus the output accumulator.
pub struct Correlator {
    slots: Vec<Option<PendingSlot>>,
    output: Vec<u8>,
}

impl Correlator {
    /// Create a correlator with every slot free.
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| None).collect(),
            output: Vec::new(),
        }
    }

    /// The slot a request id maps to.
    pub fn slot_for(request_id: u64) -> usize {
        (request_id % SLOT_COUNT as u64) as usize
    }

    /// Register a pending request and return a receiver for its response.
    pub fn register(&mut self, request_id: u64) -> oneshot::Receiver<ResponseResult> {
        let (tx, rx) = oneshot::channel();
        self.insert(request_id, tx);
        rx
    }

    /// Register a pending request answered through `responder`.
    ///
    /// A request still pending in the same slot is rejected first.
    pub fn insert(&mut self, request_id: u64, responder: oneshot::Sender<ResponseResult>) {
        let slot = Self::slot_for(request_id);
        if let Some(previous) = self.slots[slot].take() {
            tracing::debug!(
                "request {} superseded by {} in slot {}",
                previous.request_id,
                request_id,
                slot
            );
            let _ = previous.responder.send(Err(SourcekiteError::Superseded {
                request_id: previous.request_id,
            }));
        }
        self.slots[slot] = Some(PendingSlot {
            request_id,
            responder,
        });
    }

    /// Fail a pending request. Returns true if it was still pending.
    pub fn reject(&mut self, request_id: u64, error: SourcekiteError) -> bool {
        let slot = Self::slot_for(request_id);
        match self.slots[slot].take() {
            Some(pending) if pending.request_id == request_id => {
                let _ = pending.responder.send(Err(error));
                true
            }
            other => {
                self.slots[slot] = other;
                false
            }
        }
    }

    /// Whether `request_id` is still waiting for its response.
    pub fn is_pending(&self, request_id: u64) -> bool {
        self.slots[Self::slot_for(request_id)]
            .as_ref()
            .is_some_and(|p| p.request_id == request_id)
    }

    /// How many slots are occupied.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Bytes buffered since the last complete frame.
    pub fn buffered_len(&self) -> usize {
        self.output.len()
    }

    /// Drop a partial frame left behind by a process that went away.
    ///
    /// Pending requests are kept.
    pub fn discard_buffer(&mut self) {
        if !self.output.is_empty() {
            tracing::debug!("discarding {} buffered bytes", self.output.len());
            self.output.clear();
        }
    }

    /// Feed a chunk of process output.
    ///
    /// Returns the id of the request that was answered, `None` when the
    /// frame is still incomplete or belonged to no pending request, and an
    /// error when a completed frame has an unreadable id line. The
    /// accumulator is cleared whenever a frame completes.
    pub fn on_data(&mut self, chunk: &[u8]) -> Result<Option<u64>, SourcekiteError> {
        self.output.extend_from_slice(chunk);
        if !is_complete_frame(&self.output) {
            return Ok(None);
        }

        let frame = std::mem::take(&mut self.output);
        let (request_id, payload) = split_frame(&frame)?;

        let slot = Self::slot_for(request_id);
        let pending = match self.slots[slot].take() {
            Some(pending) if pending.request_id == request_id => pending,
            other => {
                tracing::warn!(
                    "dropping response for request {} (slot {} holds {:?})",
                    request_id,
                    slot,
                    other.as_ref().map(|p| p.request_id)
                );
                self.slots[slot] = other;
                return Ok(None);
            }
        };

        let result = String::from_utf8(payload.to_vec()).map_err(|e| {
            SourcekiteError::MalformedResponse(format!("payload is not UTF-8: {}", e))
        });
        // If the receiver was dropped, that's ok
        let _ = pending.responder.send(result);
        Ok(Some(request_id))
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64, body: &str) -> Vec<u8> {
        format!("{}\n{{\n{}\n}}\n\n", id, body).into_bytes()
    }

    #[test]
    fn correlator_new_empty() {
        let corr = Correlator::new();
        assert_eq!(corr.pending_count(), 0);
        assert_eq!(corr.buffered_len(), 0);
    }

    #[test]
    fn slot_wraps_at_slot_count() {
        assert_eq!(Correlator::slot_for(5), 5);
        assert_eq!(Correlator::slot_for(69), 5);
        assert_eq!(Correlator::slot_for(64), 0);
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let mut corr = Correlator::new();
        let rx = corr.register(1);
        assert!(corr.is_pending(1));

        let answered = corr.on_data(&frame(1, "  key.name: \"x\"")).unwrap();
        assert_eq!(answered, Some(1));
        assert_eq!(corr.pending_count(), 0);
        assert_eq!(corr.buffered_len(), 0);

        let payload = rx.await.unwrap().unwrap();
        assert_eq!(payload, "{\n  key.name: \"x\"\n}\n\n");
    }

    #[tokio::test]
    async fn partial_chunks_wait_for_terminator() {
        let mut corr = Correlator::new();
        let mut rx = corr.register(3);
        let bytes = frame(3, "  key.results: []");
        let (head, tail) = bytes.split_at(10);

        assert_eq!(corr.on_data(head).unwrap(), None);
        assert!(rx.try_recv().is_err());
        assert_eq!(corr.buffered_len(), 10);

        assert_eq!(corr.on_data(tail).unwrap(), Some(3));
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn terminator_split_across_chunks() {
        let mut corr = Correlator::new();
        let rx = corr.register(8);
        assert_eq!(corr.on_data(b"8\n{\n}\n").unwrap(), None);
        assert_eq!(corr.on_data(b"\n").unwrap(), Some(8));
        assert_eq!(rx.await.unwrap().unwrap(), "{\n}\n\n");
    }

    #[tokio::test]
    async fn colliding_registration_supersedes_older() {
        let mut corr = Correlator::new();
        let old = corr.register(5);
        let new = corr.register(69);

        match old.await.unwrap() {
            Err(SourcekiteError::Superseded { request_id }) => assert_eq!(request_id, 5),
            other => panic!("expected Superseded, got {:?}", other),
        }
        assert!(!corr.is_pending(5));
        assert!(corr.is_pending(69));

        assert_eq!(
            corr.on_data(b"69\n{\n  key.results: []\n}\n\n").unwrap(),
            Some(69)
        );
        assert!(new.await.unwrap().unwrap().contains("key.results"));
    }

    #[tokio::test]
    async fn stale_frame_for_superseded_request_is_dropped() {
        let mut corr = Correlator::new();
        let _old = corr.register(5);
        let mut new = corr.register(69);

        assert_eq!(corr.on_data(&frame(5, "  key.stale: 1")).unwrap(), None);
        assert!(corr.is_pending(69));
        assert!(new.try_recv().is_err());
        assert_eq!(corr.buffered_len(), 0);
    }

    #[tokio::test]
    async fn responses_out_of_order_reach_their_callers() {
        let mut corr = Correlator::new();
        let receivers: Vec<_> = (0..SLOT_COUNT as u64).map(|id| (id, corr.register(id))).collect();
        assert_eq!(corr.pending_count(), SLOT_COUNT);

        for id in (0..SLOT_COUNT as u64).rev() {
            let body = format!("  key.id: {}", id);
            assert_eq!(corr.on_data(&frame(id, &body)).unwrap(), Some(id));
        }

        for (id, rx) in receivers {
            let payload = rx.await.unwrap().unwrap();
            assert!(payload.contains(&format!("key.id: {}\n", id)));
        }
    }

    #[test]
    fn unknown_id_ignored() {
        let mut corr = Correlator::new();
        assert_eq!(corr.on_data(&frame(999, "")).unwrap(), None);
        assert_eq!(corr.buffered_len(), 0);
    }

    #[test]
    fn bad_id_line_clears_buffer() {
        let mut corr = Correlator::new();
        let _rx = corr.register(1);
        let result = corr.on_data(b"oops\n{\n}\n\n");
        assert!(matches!(result, Err(SourcekiteError::MalformedFrame(_))));
        assert_eq!(corr.buffered_len(), 0);
        assert!(corr.is_pending(1));
    }

    #[tokio::test]
    async fn invalid_utf8_payload_rejects_caller() {
        let mut corr = Correlator::new();
        let rx = corr.register(2);
        let mut bytes = b"2\n{\xff".to_vec();
        bytes.extend_from_slice(b"}\n\n");
        assert_eq!(corr.on_data(&bytes).unwrap(), Some(2));
        assert!(matches!(
            rx.await.unwrap(),
            Err(SourcekiteError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn reject_pending_request() {
        let mut corr = Correlator::new();
        let rx = corr.register(4);
        assert!(corr.reject(4, SourcekiteError::ProcessUnavailable));
        assert!(!corr.reject(4, SourcekiteError::ProcessUnavailable));
        assert!(matches!(
            rx.await.unwrap(),
            Err(SourcekiteError::ProcessUnavailable)
        ));
    }

    #[test]
    fn reject_leaves_other_occupant() {
        let mut corr = Correlator::new();
        let _rx = corr.register(69);
        assert!(!corr.reject(5, SourcekiteError::ProcessUnavailable));
        assert!(corr.is_pending(69));
    }

    #[test]
    fn discard_buffer_keeps_pending() {
        let mut corr = Correlator::new();
        let _rx = corr.register(2);
        corr.on_data(b"2\n{\n  key.partial").unwrap();
        corr.discard_buffer();
        assert_eq!(corr.buffered_len(), 0);
        assert!(corr.is_pending(2));
    }

    #[tokio::test]
    async fn dropped_receiver_doesnt_panic() {
        let mut corr = Correlator::new();
        let rx = corr.register(1);
        drop(rx);
        assert_eq!(corr.on_data(&frame(1, "")).unwrap(), Some(1));
    }

    #[test]
    fn payload_containing_terminator_is_cut_short() {
        let mut corr = Correlator::new();
        let _rx = corr.register(6);
        let answered = corr.on_data(b"6\n{\n  key.sourcetext: \"}\n\n").unwrap();
        assert_eq!(answered, Some(6));
        // The remainder of the real payload now starts a fresh, id-less buffer.
        assert!(corr.on_data(b"\"\n}\n\n").is_err());
    }
}
