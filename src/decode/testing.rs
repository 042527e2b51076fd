//! Scripted decode backend for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::backend::{DecodedUnit, MediaBackend, MediaStream, StreamInfo, VideoImage};
use super::options::NetOptions;
use crate::audio::SampleBlock;
use crate::error::DecodeError;

/// Stream producing `frames` video frames at `fps`, timestamps from 0
#[derive(Debug, Clone)]
pub(crate) struct ScriptedStream {
    fps: f64,
    frames: u32,
    next: u32,
    position_us: i64,
    width: u32,
    height: u32,
    seek_landing: Option<i64>,
    audio: Option<(i32, i32)>,
    audio_due: bool,
    fail_at: Option<u32>,
    grab_delay: Duration,
    /// Seek targets, shared by every copy of the stream
    pub seeks: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedStream {
    pub fn video(fps: f64, frames: u32) -> Self {
        Self {
            fps,
            frames,
            next: 0,
            position_us: 0,
            width: 4,
            height: 2,
            seek_landing: None,
            audio: None,
            audio_due: false,
            fail_at: None,
            grab_delay: Duration::ZERO,
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Where a seek lands; `None` makes seeks fail
    pub fn with_seek_landing(mut self, landing_us: Option<i64>) -> Self {
        self.seek_landing = landing_us;
        self
    }

    /// Emit an audio block before every video frame
    pub fn with_audio(mut self, sample_rate: i32, channels: i32) -> Self {
        self.audio = Some((sample_rate, channels));
        self.audio_due = true;
        self
    }

    /// Fail when the given video frame is reached
    pub fn failing_at(mut self, frame: u32) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    fn frame_us(&self) -> i64 {
        (1_000_000.0 / self.fps) as i64
    }
}

impl MediaStream for ScriptedStream {
    fn seek(&mut self, timestamp_us: i64) -> Result<(), DecodeError> {
        self.seeks.lock().push(timestamp_us);
        let landing = self
            .seek_landing
            .ok_or_else(|| DecodeError::Seek("not seekable".into()))?;
        self.next = (landing / self.frame_us()) as u32;
        self.position_us = landing;
        Ok(())
    }

    fn position_us(&self) -> i64 {
        self.position_us
    }

    fn grab(&mut self) -> Result<Option<DecodedUnit>, DecodeError> {
        if !self.grab_delay.is_zero() {
            std::thread::sleep(self.grab_delay);
        }
        if self.next >= self.frames {
            return Ok(None);
        }
        if self.fail_at == Some(self.next) {
            return Err(DecodeError::Grab("scripted failure".into()));
        }

        let ts = self.next as i64 * self.frame_us();
        self.position_us = ts;

        if self.audio.is_some() && self.audio_due {
            self.audio_due = false;
            return Ok(Some(DecodedUnit::Audio {
                block: SampleBlock::interleaved(vec![1000; 64]),
                timestamp_us: ts,
            }));
        }
        self.audio_due = true;
        self.next += 1;

        let shade = (self.next % 256) as u8;
        Ok(Some(DecodedUnit::Video {
            image: VideoImage {
                data: vec![shade; (self.width * self.height * 3) as usize],
                stride: 0,
                width: self.width,
                height: self.height,
            },
            timestamp_us: ts,
        }))
    }

    fn audio_params(&self) -> Option<(i32, i32)> {
        self.audio
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }
}

/// Backend handing out copies of one scripted stream
pub(crate) struct FakeBackend {
    pub info: StreamInfo,
    pub stream: ScriptedStream,
    pub fail_probe: bool,
    pub open_delay: Duration,
    pub probes: AtomicUsize,
    pub opens: Mutex<Vec<(String, u32, u32)>>,
}

impl FakeBackend {
    pub fn new(info: StreamInfo, stream: ScriptedStream) -> Arc<Self> {
        Arc::new(Self {
            info,
            stream,
            fail_probe: false,
            open_delay: Duration::ZERO,
            probes: AtomicUsize::new(0),
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            info: StreamInfo {
                width: 0,
                height: 0,
                fps: 0.0,
                duration_ms: 0,
            },
            stream: ScriptedStream::video(30.0, 0),
            fail_probe: true,
            open_delay: Duration::ZERO,
            probes: AtomicUsize::new(0),
            opens: Mutex::new(Vec::new()),
        })
    }

    /// Backend whose `open` blocks for `delay`, like a slow network source
    pub fn slow_open(info: StreamInfo, stream: ScriptedStream, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            info,
            stream,
            fail_probe: false,
            open_delay: delay,
            probes: AtomicUsize::new(0),
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl MediaBackend for FakeBackend {
    fn probe(&self, url: &str, _options: &NetOptions) -> Result<StreamInfo, DecodeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe {
            return Err(DecodeError::Probe {
                url: url.to_string(),
                reason: "unreachable".into(),
            });
        }
        Ok(self.info)
    }

    fn open(
        &self,
        url: &str,
        width: u32,
        height: u32,
        _options: &NetOptions,
    ) -> Result<Box<dyn MediaStream>, DecodeError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        self.opens.lock().push((url.to_string(), width, height));
        Ok(Box::new(self.stream.clone().with_size(width, height)))
    }
}
