//! Chunk recorder seam.
//!
//! [`ChunkRecorder`] abstracts "something that accumulates samples between
//! chunk boundaries and hands back an encoded payload on stop".  The
//! production implementation encodes WAV; tests swap in scripted recorders
//! that simulate the empty and near-empty payloads real platform recorders
//! occasionally deliver.

use crate::audio::codec::SAMPLE_RATE;
use crate::wav::encode_wav;

/// Accumulates one chunk's samples and yields an encoded payload.
///
/// A recorder cycles: `start()` begins a fresh accumulation (discarding any
/// previous one), `push_samples` feeds it while recording, `stop()` ends the
/// cycle and returns the payload.  Pushing while stopped is a no-op.
pub trait ChunkRecorder: Send {
    /// Begin a fresh cycle, discarding any accumulated samples.
    fn start(&mut self);

    /// Feed samples into the current cycle.  Ignored while stopped.
    fn push_samples(&mut self, samples: &[f32]);

    /// End the cycle and return the encoded payload.
    fn stop(&mut self) -> Vec<u8>;

    fn is_recording(&self) -> bool;
}

/// Production recorder: accumulates normalized samples and encodes them as
/// PCM16 mono 48 kHz WAV on stop.
#[derive(Default)]
pub struct WavChunkRecorder {
    samples: Vec<f32>,
    recording: bool,
}

impl WavChunkRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkRecorder for WavChunkRecorder {
    fn start(&mut self) {
        self.samples.clear();
        self.recording = true;
    }

    fn push_samples(&mut self, samples: &[f32]) {
        if self.recording {
            self.samples.extend_from_slice(samples);
        }
    }

    fn stop(&mut self) -> Vec<u8> {
        self.recording = false;
        let samples = std::mem::take(&mut self.samples);
        encode_wav(&samples, SAMPLE_RATE)
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

/// Test recorder that returns scripted payload sizes, cycle by cycle.
///
/// An empty script falls through to a fixed default size.  Used to
/// simulate platform recorders that fire their data callback with
/// zero-byte or near-zero-byte payloads.
#[cfg(test)]
pub struct ScriptedRecorder {
    /// Payload size returned by each successive `stop()`.
    pub script: std::collections::VecDeque<usize>,
    /// Size used once the script is exhausted.
    pub default_size: usize,
    recording: bool,
}

#[cfg(test)]
impl ScriptedRecorder {
    pub fn new(sizes: &[usize], default_size: usize) -> Self {
        Self {
            script: sizes.iter().copied().collect(),
            default_size,
            recording: false,
        }
    }

    /// Recorder that always returns healthy payloads.
    pub fn healthy(size: usize) -> Self {
        Self::new(&[], size)
    }
}

#[cfg(test)]
impl ChunkRecorder for ScriptedRecorder {
    fn start(&mut self) {
        self.recording = true;
    }

    fn push_samples(&mut self, _samples: &[f32]) {}

    fn stop(&mut self) -> Vec<u8> {
        self.recording = false;
        let size = self.script.pop_front().unwrap_or(self.default_size);
        vec![0xAB; size]
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
