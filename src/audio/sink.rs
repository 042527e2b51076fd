//! Per-session audio sink
//!
//! Owned by the decode thread. Before presentation begins, samples are
//! staged in a single capped prebuffer; afterwards they go straight to the
//! device through a write path that parks instead of blocking.
//!
//! The render side only ever touches [`AudioControl`]: gain changes and a
//! stop that closes the device synchronously.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::device::{AudioDevice, AudioFormat, AudioOutput};
use super::pcm::{to_pcm16le, SampleBlock};
use crate::error::AudioError;

/// Smallest prebuffer ceiling in bytes
pub const MIN_PREBUFFER_BYTES: usize = 64 * 1024;

/// Seconds of audio the prebuffer may hold
pub const PREBUFFER_SECONDS: usize = 4;

/// Handle shared between a session's decode thread and its owner
pub struct AudioControl {
    /// f32 bits
    gain: AtomicU32,
    stopped: AtomicBool,
    output: Mutex<Option<Box<dyn AudioOutput>>>,
}

impl AudioControl {
    pub fn new(gain: f32) -> Arc<Self> {
        Arc::new(Self {
            gain: AtomicU32::new(gain.max(0.0).to_bits()),
            stopped: AtomicBool::new(false),
            output: Mutex::new(None),
        })
    }

    /// Gain applied to samples written from now on
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Release);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether a device is currently open
    pub fn has_output(&self) -> bool {
        self.output.lock().is_some()
    }

    /// Stop for good and close the device
    ///
    /// Idempotent. Any write in progress aborts at its next retry.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.release();
    }

    fn install(&self, mut output: Box<dyn AudioOutput>) {
        let mut slot = self.output.lock();
        if self.is_stopped() {
            output.close();
            return;
        }
        if let Some(mut old) = slot.replace(output) {
            old.close();
        }
    }

    fn release(&self) {
        let taken = self.output.lock().take();
        if let Some(mut output) = taken {
            output.close();
        }
    }

    /// Run `f` against the open device, if any
    fn with_output<R>(&self, f: impl FnOnce(&mut dyn AudioOutput) -> R) -> Option<R> {
        let mut slot = self.output.lock();
        slot.as_mut().map(|out| f(out.as_mut()))
    }
}

impl std::fmt::Debug for AudioControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioControl")
            .field("gain", &self.gain())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Audio output for one decode session
#[derive(Debug)]
pub struct AudioSink {
    control: Arc<AudioControl>,
    format: AudioFormat,
    prebuffer: Vec<u8>,
    prebuffer_cap: usize,
    scratch: Vec<u8>,
    started: bool,
    park: Duration,
}

impl AudioSink {
    /// Open the device for `format`
    ///
    /// On error the session continues video-only.
    pub fn open(
        device: &dyn AudioDevice,
        format: AudioFormat,
        control: Arc<AudioControl>,
        park: Duration,
    ) -> Result<Self, AudioError> {
        let output = device.open(format)?;
        control.install(output);

        let prebuffer_cap = MIN_PREBUFFER_BYTES.max(format.bytes_per_second() * PREBUFFER_SECONDS);
        tracing::debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            prebuffer_cap = prebuffer_cap,
            "Audio output opened"
        );

        Ok(Self {
            control,
            format,
            prebuffer: Vec::new(),
            prebuffer_cap,
            scratch: Vec::new(),
            started: false,
            park,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn prebuffer_cap(&self) -> usize {
        self.prebuffer_cap
    }

    pub fn prebuffered(&self) -> usize {
        self.prebuffer.len()
    }

    pub fn has_prebuffer(&self) -> bool {
        !self.prebuffer.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Stage a block until presentation begins
    ///
    /// Returns `false` if the block was dropped because the prebuffer is at
    /// its ceiling.
    pub fn prebuffer(&mut self, block: &SampleBlock) -> bool {
        let n = to_pcm16le(block, self.format.channels, self.control.gain(), &mut self.scratch);
        if n == 0 {
            return true;
        }
        if self.prebuffer.len() + n > self.prebuffer_cap {
            return false;
        }
        self.prebuffer.extend_from_slice(&self.scratch);
        true
    }

    /// Start the device if it is not running yet
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        if self.control.with_output(|out| out.start()).is_some() {
            self.started = true;
        }
    }

    /// Write everything staged so far
    pub fn flush_prebuffer(&mut self) {
        if self.prebuffer.is_empty() {
            return;
        }
        let staged = std::mem::take(&mut self.prebuffer);
        self.write_pcm(&staged);
    }

    /// Convert and write a block
    pub fn write(&mut self, block: &SampleBlock) {
        let mut pcm = std::mem::take(&mut self.scratch);
        if to_pcm16le(block, self.format.channels, self.control.gain(), &mut pcm) > 0 {
            self.write_pcm(&pcm);
        }
        self.scratch = pcm;
    }

    /// Device position in microseconds
    pub fn position_us(&self) -> Option<i64> {
        self.control.with_output(|out| out.position_us())
    }

    /// Returns `false` if the write was abandoned because of a stop
    fn write_pcm(&mut self, pcm: &[u8]) -> bool {
        let mut off = 0;
        while off < pcm.len() {
            if self.control.is_stopped() {
                return false;
            }
            let written = self.control.with_output(|out| match out.available() {
                0 => 0,
                avail => out.write(&pcm[off..off + avail.min(pcm.len() - off)]),
            });
            match written {
                None => return false,
                Some(0) => std::thread::park_timeout(self.park),
                Some(n) => off += n,
            }
        }
        true
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.control.release();
    }
}
