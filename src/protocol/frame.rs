//! Telemetry frame codec
//!
//! A frame is one JSON object followed by `\n`:
//!
//! ```text
//! {"simulation_time":45.23,"position":{...},...,"ml_predictions":{...}}\n
//! ```
//!
//! Decoding is stateless and works on whatever bytes are buffered: zero, one
//! or many frames, or a partial one. Every outcome other than
//! [`Decoded::NeedMoreData`] reports how many bytes to consume, so a caller
//! can always resume at the next frame boundary.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::telemetry::TelemetryRecord;

/// Frame terminator
pub const FRAME_DELIMITER: u8 = b'\n';

/// Default maximum frame length, excluding the terminator
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Outcome of a single decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete, valid record
    Record {
        record: TelemetryRecord,
        /// Bytes to drop from the front of the buffer, terminator included
        consumed: usize,
    },
    /// No complete frame buffered yet
    NeedMoreData,
    /// A frame was rejected; dropping `consumed` bytes resynchronizes
    Malformed { error: FrameError, consumed: usize },
}

/// Decode the first frame in `buf` with the default size limit
pub fn decode(buf: &[u8]) -> Decoded {
    decode_with_limit(buf, DEFAULT_MAX_FRAME_SIZE)
}

/// Decode the first frame in `buf`
///
/// Blank lines before a frame are skipped and counted in `consumed`. When no
/// terminator is buffered and the buffer already exceeds `max_frame_size`,
/// the whole buffer is reported as malformed; the rest of that line has not
/// arrived yet, so the caller must keep discarding up to the next terminator.
pub fn decode_with_limit(buf: &[u8], max_frame_size: usize) -> Decoded {
    let mut offset = 0;

    loop {
        let rest = &buf[offset..];
        let pos = match rest.iter().position(|&b| b == FRAME_DELIMITER) {
            Some(pos) => pos,
            None => {
                if rest.len() > max_frame_size {
                    return Decoded::Malformed {
                        error: FrameError::TooLong {
                            len: rest.len(),
                            max: max_frame_size,
                        },
                        consumed: buf.len(),
                    };
                }
                return Decoded::NeedMoreData;
            }
        };

        let consumed = offset + pos + 1;
        let line = trim_line(&rest[..pos]);

        if line.is_empty() {
            offset = consumed;
            continue;
        }

        if line.len() > max_frame_size {
            return Decoded::Malformed {
                error: FrameError::TooLong {
                    len: line.len(),
                    max: max_frame_size,
                },
                consumed,
            };
        }

        return match parse_line(line) {
            Ok(record) => Decoded::Record { record, consumed },
            Err(error) => Decoded::Malformed { error, consumed },
        };
    }
}

/// Parse and validate the payload of one frame (no terminator)
pub fn parse_line(line: &[u8]) -> std::result::Result<TelemetryRecord, FrameError> {
    let text = std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
    let record: TelemetryRecord =
        serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    record.validate()?;
    Ok(record)
}

/// Encode a record as a complete frame, terminator included
pub fn encode(record: &TelemetryRecord) -> Result<Bytes> {
    let json = serde_json::to_vec(record)?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(FRAME_DELIMITER);
    Ok(buf.freeze())
}

/// Strip surrounding ASCII whitespace, including a trailing `\r`
fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &line[start..end]
}
