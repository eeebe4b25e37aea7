//! Sourcekite wire framing.
//!
//! A request is written as the decimal id on its own line followed by the
//! payload block. A response is the decimal id on its own line followed by
//! the payload; the frame ends when the buffered output ends in `}\n\n`.
//! There is no length prefix and no escaping, so a payload carrying that
//! sequence as data is cut short.
use crate::error::SourcekiteError;

/// Byte sequence that ends every response frame.
pub const FRAME_TERMINATOR: &[u8] = b"}\n\n";

/// The id line written ahead of a request payload.
pub fn id_line(request_id: u64) -> String {
    format!("{}\n", request_id)
}

/// True when `buffer` holds a complete frame.
pub fn is_complete_frame(buffer: &[u8]) -> bool {
    buffer.ends_with(FRAME_TERMINATOR)
}

/// Split a complete frame into its request id and payload bytes.
pub fn split_frame(frame: &[u8]) -> Result<(u64, &[u8]), SourcekiteError> {
    let newline = frame
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| SourcekiteError::MalformedFrame("missing id line".into()))?;

    let id_text = std::str::from_utf8(&frame[..newline])
        .map_err(|_| SourcekiteError::MalformedFrame("id line is not UTF-8".into()))?
        .trim();
    let request_id = id_text
        .parse::<u64>()
        .map_err(|_| SourcekiteError::MalformedFrame(id_text.to_string()))?;

    Ok((request_id, &frame[newline + 1..]))
}
