//! [`MediaBackend`] on the system FFmpeg libraries
//!
//! Video is scaled to BGR24 at the requested size. Audio keeps its native
//! rate and is converted to signed 16-bit, keeping at most two channels.

use std::collections::VecDeque;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{self, Pixel, Sample};
use ffmpeg::software::scaling;
use ffmpeg::{codec, decoder, frame, media, Dictionary, Packet, Rational};

use super::backend::{DecodedUnit, MediaBackend, MediaStream, StreamInfo, VideoImage};
use super::options::NetOptions;
use crate::audio::SampleBlock;
use crate::error::DecodeError;

/// Decode backend using `ffmpeg-next`
#[derive(Debug)]
pub struct FfmpegBackend {
    _init: (),
}

impl FfmpegBackend {
    /// Initialize the FFmpeg libraries
    pub fn new() -> Result<Self, DecodeError> {
        ffmpeg::init().map_err(|e| DecodeError::Open {
            url: String::new(),
            reason: format!("ffmpeg init: {e}"),
        })?;
        Ok(Self { _init: () })
    }
}

fn dictionary(options: &NetOptions) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    for (key, value) in options.to_pairs() {
        dict.set(key, &value);
    }
    dict
}

fn open_input(url: &str, options: &NetOptions) -> Result<format::context::Input, DecodeError> {
    format::input_with_dictionary(&url, dictionary(options)).map_err(|e| DecodeError::Open {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn to_us(ts: i64, time_base: Rational) -> i64 {
    let den = time_base.denominator().max(1) as i128;
    (ts as i128 * time_base.numerator() as i128 * 1_000_000 / den) as i64
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, url: &str, options: &NetOptions) -> Result<StreamInfo, DecodeError> {
        let probe_err = |reason: String| DecodeError::Probe {
            url: url.to_string(),
            reason,
        };

        let input = open_input(url, options)?;
        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| probe_err("no video stream".into()))?;
        let video = codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| probe_err(e.to_string()))?;

        let duration_us = input.duration();
        Ok(StreamInfo {
            width: video.width() as i32,
            height: video.height() as i32,
            fps: f64::from(stream.avg_frame_rate()),
            duration_ms: if duration_us > 0 { duration_us / 1000 } else { 0 },
        })
    }

    fn open(
        &self,
        url: &str,
        width: u32,
        height: u32,
        options: &NetOptions,
    ) -> Result<Box<dyn MediaStream>, DecodeError> {
        let open_err = |reason: String| DecodeError::Open {
            url: url.to_string(),
            reason,
        };

        let input = open_input(url, options)?;
        let (video_index, video_time_base, fps, video) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| open_err("no video stream".into()))?;
            let video = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().video())
                .map_err(|e| open_err(e.to_string()))?;
            (
                stream.index(),
                stream.time_base(),
                f64::from(stream.avg_frame_rate()),
                video,
            )
        };

        let audio = input.streams().best(media::Type::Audio).and_then(|stream| {
            let decoder = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().audio());
            match decoder {
                Ok(decoder) => Some(AudioTrack {
                    index: stream.index(),
                    time_base: stream.time_base(),
                    rate: decoder.rate(),
                    channels: decoder.ch_layout().channels() as usize,
                    decoder,
                }),
                Err(e) => {
                    tracing::debug!(error = %e, "Audio track not decodable");
                    None
                }
            }
        });

        Ok(Box::new(FfmpegStream {
            input,
            video,
            video_index,
            video_time_base,
            fps,
            scaler: None,
            width,
            height,
            audio,
            ready: VecDeque::new(),
            drained: false,
            position_us: -1,
        }))
    }
}

struct AudioTrack {
    decoder: decoder::Audio,
    index: usize,
    time_base: Rational,
    rate: u32,
    channels: usize,
}

struct Scaler {
    context: scaling::Context,
    source: (Pixel, u32, u32),
}

struct FfmpegStream {
    input: format::context::Input,
    video: decoder::Video,
    video_index: usize,
    video_time_base: Rational,
    fps: f64,
    scaler: Option<Scaler>,
    width: u32,
    height: u32,
    audio: Option<AudioTrack>,
    ready: VecDeque<DecodedUnit>,
    drained: bool,
    position_us: i64,
}

// SAFETY: every FFmpeg context is owned by the stream and only used through
// `&mut self`, so it is never touched from two threads at once.
unsafe impl Send for FfmpegStream {}

fn grab_err(e: ffmpeg::Error) -> DecodeError {
    DecodeError::Grab(e.to_string())
}

impl FfmpegStream {
    fn scaler_for(&mut self, decoded: &frame::Video) -> Result<&mut scaling::Context, DecodeError> {
        let source = (decoded.format(), decoded.width(), decoded.height());
        let stale = self.scaler.as_ref().map_or(true, |s| s.source != source);
        if stale {
            let context = scaling::Context::get(
                source.0,
                source.1,
                source.2,
                Pixel::BGR24,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .map_err(grab_err)?;
            self.scaler = Some(Scaler { context, source });
        }
        match self.scaler.as_mut() {
            Some(scaler) => Ok(&mut scaler.context),
            None => Err(DecodeError::Grab("scaler unavailable".into())),
        }
    }

    fn receive_video(&mut self) -> Result<(), DecodeError> {
        let mut decoded = frame::Video::empty();
        while self.video.receive_frame(&mut decoded).is_ok() {
            let mut scaled = frame::Video::empty();
            self.scaler_for(&decoded)?
                .run(&decoded, &mut scaled)
                .map_err(grab_err)?;

            let timestamp_us = decoded
                .timestamp()
                .map_or(-1, |ts| to_us(ts, self.video_time_base));
            self.ready.push_back(DecodedUnit::Video {
                image: VideoImage {
                    data: scaled.data(0).to_vec(),
                    stride: scaled.stride(0),
                    width: self.width,
                    height: self.height,
                },
                timestamp_us,
            });
        }
        Ok(())
    }

    fn receive_audio(&mut self) {
        let Some(track) = self.audio.as_mut() else {
            return;
        };
        let mut decoded = frame::Audio::empty();
        while track.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(block) = sample_block(&decoded, track.channels) else {
                continue;
            };
            let timestamp_us = decoded
                .timestamp()
                .map_or(-1, |ts| to_us(ts, track.time_base));
            self.ready.push_back(DecodedUnit::Audio {
                block,
                timestamp_us,
            });
        }
    }

    /// Decode until a unit is ready or the input is exhausted
    fn next_unit(&mut self) -> Result<Option<DecodedUnit>, DecodeError> {
        loop {
            if let Some(unit) = self.ready.pop_front() {
                return Ok(Some(unit));
            }
            if self.drained {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    let index = packet.stream();
                    if index == self.video_index {
                        if let Err(e) = self.video.send_packet(&packet) {
                            tracing::trace!(error = %e, "Video packet rejected");
                            continue;
                        }
                        self.receive_video()?;
                    } else if let Some(track) = self.audio.as_mut().filter(|t| t.index == index) {
                        if let Err(e) = track.decoder.send_packet(&packet) {
                            tracing::trace!(error = %e, "Audio packet rejected");
                            continue;
                        }
                        self.receive_audio();
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.drained = true;
                    let _ = self.video.send_eof();
                    self.receive_video()?;
                    if let Some(track) = self.audio.as_mut() {
                        let _ = track.decoder.send_eof();
                    }
                    self.receive_audio();
                }
                Err(e) => return Err(grab_err(e)),
            }
        }
    }
}

impl MediaStream for FfmpegStream {
    fn seek(&mut self, timestamp_us: i64) -> Result<(), DecodeError> {
        self.input
            .seek(timestamp_us, ..timestamp_us)
            .map_err(|e| DecodeError::Seek(e.to_string()))?;
        self.video.flush();
        if let Some(track) = self.audio.as_mut() {
            track.decoder.flush();
        }
        self.ready.clear();
        self.drained = false;

        // Position becomes the first unit after the landing point
        self.position_us = -1;
        if let Some(unit) = self.next_unit()? {
            self.position_us = unit.timestamp_us();
            self.ready.push_front(unit);
        }
        Ok(())
    }

    fn position_us(&self) -> i64 {
        self.position_us
    }

    fn grab(&mut self) -> Result<Option<DecodedUnit>, DecodeError> {
        let unit = self.next_unit()?;
        if let Some(ts) = unit.as_ref().map(DecodedUnit::timestamp_us) {
            if ts > 0 {
                self.position_us = ts;
            }
        }
        Ok(unit)
    }

    fn audio_params(&self) -> Option<(i32, i32)> {
        self.audio
            .as_ref()
            .map(|t| (t.rate as i32, t.channels.min(2) as i32))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }
}

/// Convert one decoded audio frame, keeping the first two channels
fn sample_block(decoded: &frame::Audio, channels: usize) -> Option<SampleBlock> {
    let format = decoded.format();
    let bytes = format.bytes();
    let samples = decoded.samples();
    if bytes == 0 || samples == 0 || channels == 0 {
        return None;
    }

    if format.is_planar() {
        let plane = |i: usize| to_i16(format, decoded.data(i).get(..samples * bytes)?);
        return match channels {
            1 => plane(0).map(SampleBlock::interleaved),
            _ => Some(SampleBlock::planar(plane(0)?, plane(1)?)),
        };
    }

    let packed = to_i16(format, decoded.data(0).get(..samples * channels * bytes)?)?;
    if channels <= 2 {
        return Some(SampleBlock::interleaved(packed));
    }
    let stereo = packed
        .chunks_exact(channels)
        .flat_map(|f| [f[0], f[1]])
        .collect();
    Some(SampleBlock::interleaved(stereo))
}

fn to_i16(format: Sample, raw: &[u8]) -> Option<Vec<i16>> {
    let out = match format {
        Sample::U8(_) => raw.iter().map(|&b| (b as i16 - 128) << 8).collect(),
        Sample::I16(_) => raw
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect(),
        Sample::I32(_) => raw
            .chunks_exact(4)
            .map(|c| (i32::from_ne_bytes([c[0], c[1], c[2], c[3]]) >> 16) as i16)
            .collect(),
        Sample::F32(_) => raw
            .chunks_exact(4)
            .map(|c| float_to_i16(f32::from_ne_bytes([c[0], c[1], c[2], c[3]]) as f64))
            .collect(),
        Sample::F64(_) => raw
            .chunks_exact(8)
            .map(|c| {
                float_to_i16(f64::from_ne_bytes([
                    c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                ]))
            })
            .collect(),
        _ => return None,
    };
    Some(out)
}

fn float_to_i16(v: f64) -> i16 {
    (v.clamp(-1.0, 1.0) * i16::MAX as f64).round() as i16
}
