//! Streaming frame decoder
//!
//! Owns the read buffer of one producer connection. Socket reads are
//! appended with [`FrameDecoder::buffer_mut`] and frames are pulled out with
//! [`FrameDecoder::next_frame`] until it returns `None`. Read boundaries
//! never need to line up with frame boundaries.

use bytes::{Buf, BytesMut};

use super::frame::{decode_with_limit, Decoded, DEFAULT_MAX_FRAME_SIZE, FRAME_DELIMITER};
use crate::error::FrameError;
use crate::telemetry::TelemetryRecord;

/// Incremental decoder for newline-delimited telemetry
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
    /// Dropping the tail of an oversize line until its terminator shows up
    discarding: bool,
}

impl FrameDecoder {
    /// Create a decoder with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom frame size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_size.min(64 * 1024)),
            max_frame_size,
            discarding: false,
        }
    }

    /// Buffer to read socket data into
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Append bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet decoded
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Whether the decoder is skipping the rest of an oversize line
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Pull the next frame out of the buffer
    ///
    /// Returns `None` when more data is needed. A malformed frame is
    /// consumed before it is returned, so calling again continues with the
    /// following frame.
    pub fn next_frame(&mut self) -> Option<Result<TelemetryRecord, FrameError>> {
        if self.discarding {
            match self.buf.iter().position(|&b| b == FRAME_DELIMITER) {
                Some(pos) => {
                    self.buf.advance(pos + 1);
                    self.discarding = false;
                }
                None => {
                    self.buf.clear();
                    return None;
                }
            }
        }

        match decode_with_limit(&self.buf, self.max_frame_size) {
            Decoded::Record { record, consumed } => {
                self.buf.advance(consumed);
                Some(Ok(record))
            }
            Decoded::NeedMoreData => None,
            Decoded::Malformed { error, consumed } => {
                let terminated = self.buf[..consumed].last() == Some(&FRAME_DELIMITER);
                self.buf.advance(consumed);
                if !terminated {
                    self.discarding = true;
                }
                Some(Err(error))
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::encode;

    fn frame_at(t: f64) -> Vec<u8> {
        encode(&TelemetryRecord::at(t)).unwrap().to_vec()
    }

    fn drain(decoder: &mut FrameDecoder) -> (Vec<f64>, usize) {
        let mut times = Vec::new();
        let mut malformed = 0;
        while let Some(result) = decoder.next_frame() {
            match result {
                Ok(record) => times.push(record.simulation_time),
                Err(_) => malformed += 1,
            }
        }
        (times, malformed)
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut stream = frame_at(1.0);
        stream.extend(frame_at(2.0));

        let mut decoder = FrameDecoder::new();
        let mut times = Vec::new();
        for byte in stream {
            decoder.extend(&[byte]);
            let (decoded, malformed) = drain(&mut decoder);
            assert_eq!(malformed, 0);
            times.extend(decoded);
        }

        assert_eq!(times, vec![1.0, 2.0]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_many_frames_in_one_read() {
        let mut decoder = FrameDecoder::new();
        for t in 1..=5 {
            decoder.extend(&frame_at(t as f64));
        }

        let (times, malformed) = drain(&mut decoder);
        assert_eq!(times, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(malformed, 0);
    }

    #[test]
    fn test_resync_after_malformed() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"simulation_time\": oops}\n");
        for t in 1..=3 {
            decoder.extend(&frame_at(t as f64));
        }

        let (times, malformed) = drain(&mut decoder);
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert_eq!(malformed, 1);
    }

    #[test]
    fn test_oversize_line_split_across_reads() {
        let mut decoder = FrameDecoder::with_max_frame_size(300);

        decoder.extend(&[b'a'; 400]);
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(FrameError::TooLong { .. }))
        ));
        assert!(decoder.is_discarding());
        assert!(decoder.next_frame().is_none());

        // tail of the oversize line, then a valid frame
        decoder.extend(&[b'a'; 50]);
        decoder.extend(b"\n");
        decoder.extend(&frame_at(7.0));

        let (times, malformed) = drain(&mut decoder);
        assert_eq!(times, vec![7.0]);
        assert_eq!(malformed, 0);
        assert!(!decoder.is_discarding());
    }

    #[test]
    fn test_clear() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"partial\":");
        assert!(decoder.next_frame().is_none());
        assert!(decoder.pending() > 0);

        decoder.clear();
        assert_eq!(decoder.pending(), 0);
    }
}
