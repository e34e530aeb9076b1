// Frame extraction from a continuous MJPEG byte stream
// Bytes are appended as they arrive. Whenever the buffer holds a complete
// image, the most recent one is extracted and everything up to its end is
// discarded. Frames that arrived faster than they were consumed are dropped
// instead of queued.

use bytes::Bytes;
use tracing::debug;

use super::jpeg::{self, EOI, SOI};
use crate::config::{ASSEMBLER_MAX_BUFFER, ASSEMBLER_TAIL_WINDOW};

/// One complete encoded image and its raster size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
    width: u32,
    height: u32,
}

impl Frame {
    /// Fully decode `data` as a JPEG. Anything that does not decode is not a frame.
    pub fn decode(data: Bytes) -> Option<Self> {
        let dims = match jpeg::decode(&data) {
            Ok(dims) => dims,
            Err(e) => {
                debug!("Candidate of {} bytes is not a JPEG: {}", data.len(), e);
                return None;
            }
        };
        Some(Self {
            data,
            width: dims.width,
            height: dims.height,
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

fn rfind_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).rposition(|w| w == marker)
}

/// Extracts complete JPEG frames from an append-only byte buffer
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_buffer: usize,
    tail_window: usize,
    decode_failures: u64,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_limits(ASSEMBLER_MAX_BUFFER, ASSEMBLER_TAIL_WINDOW)
    }

    /// Once the buffer exceeds `max_buffer` without a complete frame, only
    /// the last `tail_window` bytes are kept
    pub fn with_limits(max_buffer: usize, tail_window: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_buffer.min(ASSEMBLER_MAX_BUFFER)),
            max_buffer,
            tail_window: tail_window.min(max_buffer),
            decode_failures: 0,
        }
    }

    /// Append `bytes` and return the latest complete frame, if any
    pub fn ingest(&mut self, bytes: &[u8]) -> Option<Frame> {
        self.buffer.extend_from_slice(bytes);

        let start = rfind_marker(&self.buffer, SOI);
        let end = rfind_marker(&self.buffer, EOI);

        match (start, end) {
            (Some(start), Some(end)) if end > start => {
                let stop = end + EOI.len();
                let candidate = Bytes::copy_from_slice(&self.buffer[start..stop]);
                // Everything up to the end of this frame is stale now
                self.buffer.drain(..stop);

                let frame = Frame::decode(candidate);
                if frame.is_none() {
                    self.decode_failures += 1;
                    debug!("Dropped undecodable frame ({} so far)", self.decode_failures);
                }
                frame
            }
            _ => {
                if self.buffer.len() > self.max_buffer {
                    let cut = self.buffer.len() - self.tail_window;
                    self.buffer.drain(..cut);
                    debug!(
                        "No frame boundary in {} bytes, kept last {}",
                        cut + self.tail_window,
                        self.tail_window
                    );
                }
                None
            }
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::jpeg::fixtures::{corrupt_scan, encoded_jpeg};

    fn part(jpeg: &[u8]) -> Vec<u8> {
        crate::camera::multipart_part(jpeg).to_vec()
    }

    #[test]
    fn test_single_frame() {
        let mut assembler = FrameAssembler::new();
        let frame = assembler.ingest(&part(&encoded_jpeg(320, 240))).unwrap();
        assert_eq!((frame.width(), frame.height()), (320, 240));
        assert_eq!(frame.data().as_ref(), encoded_jpeg(320, 240).as_slice());
        // Only the trailing CRLF of the part is left
        assert_eq!(assembler.buffer_len(), 2);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut assembler = FrameAssembler::new();
        let bytes = part(&encoded_jpeg(64, 48));
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        assert!(assembler.ingest(head).is_none());
        let frame = assembler.ingest(tail).unwrap();
        assert_eq!(frame.width(), 64);
    }

    #[test]
    fn test_back_to_back_frames_yield_only_the_last() {
        let mut assembler = FrameAssembler::new();
        let mut bytes = Vec::new();
        for width in [100u32, 200, 300] {
            bytes.extend(part(&encoded_jpeg(width, 50)));
        }

        let frame = assembler.ingest(&bytes).unwrap();
        assert_eq!(frame.width(), 300);
        // Nothing older can come out later
        assert!(assembler.ingest(&[]).is_none());
    }

    #[test]
    fn test_bytes_after_frame_are_kept() {
        let mut assembler = FrameAssembler::new();
        let second = part(&encoded_jpeg(20, 10));
        let cut = rfind_marker(&second, SOI).unwrap() + 4;
        let mut bytes = part(&encoded_jpeg(10, 10));
        bytes.extend_from_slice(&second[..cut]);

        // Last SOI belongs to the incomplete second frame: nothing yet
        assert!(assembler.ingest(&bytes).is_none());
        let frame = assembler.ingest(&second[cut..]).unwrap();
        assert_eq!(frame.width(), 20);
    }

    #[test]
    fn test_corrupt_frame_is_swallowed() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.ingest(b"\xff\xd8garbage\xff\xd9").is_none());
        assert_eq!(assembler.decode_failures(), 1);
        assert_eq!(assembler.buffer_len(), 0);

        let frame = assembler.ingest(&encoded_jpeg(8, 8)).unwrap();
        assert_eq!(frame.width(), 8);
    }

    #[test]
    fn test_valid_header_with_corrupt_scan_is_dropped() {
        let mut assembler = FrameAssembler::new();
        let damaged = corrupt_scan(&encoded_jpeg(640, 480));
        assert!(assembler.ingest(&part(&damaged)).is_none());
        assert_eq!(assembler.decode_failures(), 1);

        // The stream carries on with the next good frame
        let frame = assembler.ingest(&part(&encoded_jpeg(640, 480))).unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(assembler.decode_failures(), 1);
    }

    #[test]
    fn test_buffer_bounded_without_boundaries() {
        let mut assembler = FrameAssembler::with_limits(1_000, 100);
        let noise: Vec<u8> = (0..5_000u32).map(|i| (i % 200) as u8).collect();

        for chunk_len in [1usize, 7, 333, 1_001, 4_096] {
            for chunk in noise.chunks(chunk_len) {
                assert!(assembler.ingest(chunk).is_none());
                assert!(assembler.buffer_len() <= 1_000);
            }
        }

        assembler.reset();
        assembler.ingest(&noise);
        assert_eq!(assembler.buffer_len(), 100);
    }
}
