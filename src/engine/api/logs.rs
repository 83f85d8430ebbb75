//! Decoding of container log bodies.
//!
//! Containers without a TTY have their output multiplexed: each frame is an
//! eight-byte header (stream type, three zero bytes, big-endian payload
//! length) followed by the payload. TTY containers stream raw text.

use serde::Serialize;

/// Content type the daemon uses for multiplexed log bodies.
pub const MULTIPLEXED_CONTENT_TYPE: &str = "application/vnd.docker.multiplexed-stream";

const FRAME_HEADER_LEN: usize = 8;

/// Which standard stream a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard input echo.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl LogStream {
    const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }
}

/// One frame of a multiplexed log body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFrame {
    /// Originating stream.
    pub stream: LogStream,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

/// Whether `body` starts with a plausible multiplexed frame header.
#[must_use]
pub fn looks_multiplexed(body: &[u8]) -> bool {
    match body.get(..FRAME_HEADER_LEN) {
        Some([kind, 0, 0, 0, ..]) => LogStream::from_byte(*kind).is_some(),
        _ => false,
    }
}

/// Split a multiplexed body into frames.
///
/// Walking stops at the first header with an unknown stream type and at a
/// frame claiming more bytes than remain, so a truncated tail is dropped
/// without disturbing earlier frames.
#[must_use]
#[expect(clippy::big_endian_bytes, reason = "frame lengths are big-endian on the wire")]
pub fn demux_frames(body: &[u8]) -> Vec<LogFrame> {
    let mut frames = Vec::new();
    let mut rest = body;
    while let Some((header, after_header)) = rest.split_first_chunk::<FRAME_HEADER_LEN>() {
        let [kind, _, _, _, len @ ..] = *header;
        let Some(stream) = LogStream::from_byte(kind) else {
            tracing::debug!(kind, "unknown log stream type, stopping");
            break;
        };
        let Ok(length) = usize::try_from(u32::from_be_bytes(len)) else {
            break;
        };
        let Some((payload, remaining)) = after_header.split_at_checked(length) else {
            tracing::debug!(
                claimed = length,
                available = after_header.len(),
                "dropping truncated log frame"
            );
            break;
        };
        frames.push(LogFrame {
            stream,
            payload: payload.to_vec(),
        });
        rest = remaining;
    }
    frames
}

/// Turn a log response body into text.
///
/// Bodies labelled multiplexed, or whose first bytes form a frame header,
/// are demultiplexed and their payloads concatenated in order. Anything else
/// is taken as raw TTY text. Invalid UTF-8 is replaced.
#[must_use]
pub fn decode_log_body(content_type: Option<&str>, body: &[u8]) -> String {
    let labelled = content_type.is_some_and(|value| {
        value
            .split(';')
            .next()
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(MULTIPLEXED_CONTENT_TYPE))
    });
    if !labelled && !looks_multiplexed(body) {
        return String::from_utf8_lossy(body).into_owned();
    }
    let payload: Vec<u8> = demux_frames(body)
        .into_iter()
        .flat_map(|frame| frame.payload)
        .collect();
    String::from_utf8_lossy(&payload).into_owned()
}
