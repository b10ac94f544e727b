//! Windowing buffer that paces speech-to-text calls.

use std::time::{Duration, Instant};

use super::bytes_for_seconds;

const MAX_OVERLAP_SECS: f64 = 0.5;

/// Accumulates PCM and hands out fixed-size windows for transcription.
///
/// A window is released only when a full `buffer_seconds` of audio is present
/// and at least `buffer_seconds` of wall time has passed since the previous
/// one. The last half second (at most half a window) stays in the buffer so
/// consecutive windows overlap and words on the boundary are not cut.
#[derive(Debug)]
pub struct SttBuffer {
    buf: Vec<u8>,
    window_bytes: usize,
    overlap_bytes: usize,
    min_interval: Duration,
    last_window: Option<Instant>,
}

impl SttBuffer {
    #[must_use]
    pub fn new(sample_rate: u32, buffer_seconds: f64) -> Self {
        let window_bytes = bytes_for_seconds(sample_rate, buffer_seconds).max(2);
        let overlap_bytes = bytes_for_seconds(sample_rate, MAX_OVERLAP_SECS.min(buffer_seconds / 2.0));
        Self {
            buf: Vec::new(),
            window_bytes,
            overlap_bytes: overlap_bytes.min(window_bytes.saturating_sub(2)),
            min_interval: Duration::from_secs_f64(buffer_seconds.max(0.0)),
            last_window: None,
        }
    }

    pub fn extend(&mut self, pcm: &[u8]) {
        self.buf.extend_from_slice(pcm);
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[cfg(test)]
    #[must_use]
    pub fn window_bytes(&self) -> usize {
        self.window_bytes
    }

    /// Take the next window if one is due.
    pub fn take_window(&mut self) -> Option<Vec<u8>> {
        self.take_window_at(Instant::now())
    }

    pub(crate) fn take_window_at(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.buf.len() < self.window_bytes {
            return None;
        }
        if let Some(last) = self.last_window {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }
        let window = self.buf[..self.window_bytes].to_vec();
        let trim = self.window_bytes - self.overlap_bytes;
        self.buf.drain(..trim);
        self.last_window = Some(now);
        Some(window)
    }

    /// Drain everything left, regardless of size or pacing.
    pub fn drain_all(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < 2 {
            self.buf.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod tests;
