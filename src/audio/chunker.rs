//! Frame grouping with an energy-based silence gate.

use super::{bytes_for_seconds, rms};

pub const DEFAULT_CHUNK_FRAMES: usize = 10;
const VAD_WINDOW_SECS: f64 = 0.02;

/// Groups incoming PCM frames into larger chunks.
///
/// A frame whose leading 20 ms falls under the RMS threshold is treated as
/// silence: it is discarded and whatever was buffered so far is emitted, so
/// speech is never held back waiting for the chunk to fill.
#[derive(Debug)]
pub struct AudioChunker {
    chunk_frames: usize,
    vad_window_bytes: usize,
    vad_rms_threshold: f64,
    frames: Vec<Vec<u8>>,
}

impl AudioChunker {
    #[must_use]
    pub fn new(sample_rate: u32, chunk_frames: usize, vad_rms_threshold: f64) -> Self {
        Self {
            chunk_frames: chunk_frames.max(1),
            vad_window_bytes: bytes_for_seconds(sample_rate, VAD_WINDOW_SECS),
            vad_rms_threshold,
            frames: Vec::new(),
        }
    }

    /// Feed one frame; returns a combined chunk when one is ready.
    pub fn push(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.is_empty() {
            return None;
        }
        if self.is_silence(frame) {
            return self.flush();
        }
        self.frames.push(frame.to_vec());
        if self.frames.len() >= self.chunk_frames {
            return self.flush();
        }
        None
    }

    /// Emit whatever is buffered.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.frames.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.frames).concat())
    }

    #[cfg(test)]
    #[must_use]
    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    fn is_silence(&self, frame: &[u8]) -> bool {
        if self.vad_rms_threshold <= 0.0 || self.vad_window_bytes == 0 || frame.len() < self.vad_window_bytes {
            return false;
        }
        rms(&frame[..self.vad_window_bytes]) < self.vad_rms_threshold
    }
}

#[cfg(test)]
#[path = "chunker_test.rs"]
mod tests;
