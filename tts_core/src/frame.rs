//! Fixed-size delivery frames.

use crate::error::{Result, TtsError};
use crate::wav::WAV_HEADER_LEN;

/// Smallest frame size accepted; frame 0 must hold the whole WAV header.
pub const MIN_FRAME_SIZE: usize = 1024;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// One delivery unit of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub sequence: u64,
    pub payload: Vec<u8>,
    pub carries_header: bool,
}

impl AudioFrame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Slices one response's byte stream into frames of `frame_size` bytes.
///
/// Bytes that do not fill a frame are carried into the next [`push`], so
/// only the frame returned by [`finish`] may be short.
///
/// [`push`]: FrameAssembler::push
/// [`finish`]: FrameAssembler::finish
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<u8>,
    next_sequence: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Result<Self> {
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&frame_size) {
            return Err(TtsError::Validation(format!(
                "chunk size must be between {} and {} bytes",
                MIN_FRAME_SIZE, MAX_FRAME_SIZE
            )));
        }
        debug_assert!(frame_size >= WAV_HEADER_LEN);
        Ok(Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
            next_sequence: 0,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of frames handed out so far.
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Append bytes and return every frame that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut input = bytes;

        if !self.pending.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.pending.len() < self.frame_size {
                return frames;
            }
            let payload = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
            frames.push(self.next_frame(payload));
        }

        let mut chunks = input.chunks_exact(self.frame_size);
        for chunk in &mut chunks {
            frames.push(self.next_frame(chunk.to_vec()));
        }
        self.pending.extend_from_slice(chunks.remainder());
        frames
    }

    /// Flush the trailing short frame, if any.
    pub fn finish(mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.pending);
        Some(self.next_frame(payload))
    }

    fn next_frame(&mut self, payload: Vec<u8>) -> AudioFrame {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        AudioFrame {
            sequence,
            payload,
            carries_header: sequence == 0,
        }
    }
}
