//! NDJSON line codec for agent stdout.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving agent cannot make the reader allocate without bound. The
//! codec's internal buffer is the session's partial-line buffer: bytes are
//! held until a `\n` arrives.
//!
//! An oversized line is not an error: it is replaced by
//! [`OVERSIZED_LINE_MARKER`] and the rest of it is discarded up to the next
//! newline, so the stream keeps flowing.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted from an agent: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Emitted in place of a line longer than [`MAX_LINE_BYTES`].
pub const OVERSIZED_LINE_MARKER: &str = "[agent output line exceeded 1048576 bytes and was dropped]";

/// Line decoder for agent stdout.
#[derive(Debug)]
pub struct AgentCodec(LinesCodec);

impl AgentCodec {
    /// Create a new `AgentCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for AgentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AgentCodec {
    type Item = String;
    type Error = AppError;

    /// Returns `Ok(None)` while `src` holds no complete line.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        absorb_oversized(self.0.decode(src))
    }

    /// Flushes a final unterminated line at EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        absorb_oversized(self.0.decode_eof(src))
    }
}

/// `LinesCodec` keeps discarding the oversized line on the next call, so
/// the error only has to become the marker here.
fn absorb_oversized(
    decoded: std::result::Result<Option<String>, LinesCodecError>,
) -> Result<Option<String>> {
    match decoded {
        Err(LinesCodecError::MaxLineLengthExceeded) => {
            warn!(max_bytes = MAX_LINE_BYTES, "agent output line too long, dropping it");
            Ok(Some(OVERSIZED_LINE_MARKER.to_owned()))
        }
        other => other.map_err(map_codec_error),
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => AppError::SubprocessFailure(format!(
            "line too long: exceeded {MAX_LINE_BYTES} bytes"
        )),
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
