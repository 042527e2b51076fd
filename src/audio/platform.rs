//! Platform audio output through cpal
//!
//! `cpal::Stream` cannot move between threads on every platform, so each
//! output gets a small thread that builds the stream, owns it, and waits for
//! commands. Written PCM goes through a bounded ring shared with the stream
//! callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use super::device::{AudioDevice, AudioFormat, AudioOutput};
use crate::error::AudioError;

/// Milliseconds of audio the ring may hold
const RING_MS: usize = 250;

/// Opens outputs on the host's default device
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalDevice;

enum Command {
    Play,
    Close,
}

struct Shared {
    ring: Mutex<VecDeque<i16>>,
    capacity: usize,
    /// Interleaved samples consumed by the callback
    played: AtomicU64,
}

/// One open cpal stream
pub struct CpalOutput {
    shared: Arc<Shared>,
    format: AudioFormat,
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl AudioDevice for CpalDevice {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn AudioOutput>, AudioError> {
        let capacity = format.sample_rate as usize * format.channels as usize * RING_MS / 1000;
        let shared = Arc::new(Shared {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            played: AtomicU64::new(0),
        });

        let (commands, rx) = channel::unbounded::<Command>();
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), AudioError>>(1);
        let thread_shared = Arc::clone(&shared);

        let thread = std::thread::Builder::new()
            .name("collins-audio".into())
            .spawn(move || {
                let stream = match build_stream(format, Arc::clone(&thread_shared)) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        Command::Play => {
                            if let Err(e) = stream.play() {
                                tracing::warn!(error = %e, "Audio stream play failed");
                            }
                        }
                        Command::Close => break,
                    }
                }
                let _ = stream.pause();
            })
            .map_err(|e| AudioError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalOutput {
                shared,
                format,
                commands,
                thread: Some(thread),
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::Device("audio thread exited".into())),
        }
    }
}

fn build_stream(format: AudioFormat, shared: Arc<Shared>) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let sample_format = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?
        .sample_format();

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    match sample_format {
        SampleFormat::I16 => build_typed::<i16>(&device, &config, shared),
        SampleFormat::U16 => build_typed::<u16>(&device, &config, shared),
        SampleFormat::I32 => build_typed::<i32>(&device, &config, shared),
        SampleFormat::F32 => build_typed::<f32>(&device, &config, shared),
        other => Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut ring = shared.ring.lock();
                let mut consumed = 0u64;
                for out in data.iter_mut() {
                    *out = match ring.pop_front() {
                        Some(s) => {
                            consumed += 1;
                            T::from_sample(s)
                        }
                        None => T::from_sample(0i16),
                    };
                }
                shared.played.fetch_add(consumed, Ordering::Relaxed);
            },
            |e| tracing::warn!(error = %e, "Audio stream error"),
            None,
        )
        .map_err(|e| AudioError::Device(e.to_string()))
}

impl AudioOutput for CpalOutput {
    fn start(&mut self) {
        let _ = self.commands.send(Command::Play);
    }

    fn available(&self) -> usize {
        let len = self.shared.ring.lock().len();
        self.shared.capacity.saturating_sub(len) * 2
    }

    fn write(&mut self, pcm: &[u8]) -> usize {
        let mut ring = self.shared.ring.lock();
        let room = self.shared.capacity.saturating_sub(ring.len());
        let n = (pcm.len() / 2).min(room);
        ring.extend(
            pcm[..n * 2]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        n * 2
    }

    fn position_us(&self) -> i64 {
        let frames = self.shared.played.load(Ordering::Relaxed) / self.format.channels as u64;
        (frames * 1_000_000 / self.format.sample_rate as u64) as i64
    }

    fn close(&mut self) {
        let _ = self.commands.send(Command::Close);
        self.shared.ring.lock().clear();
        // The stream thread exits on its own; never wait for it here
        self.thread.take();
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
