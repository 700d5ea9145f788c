// Audio decoder using Symphonia
// Decodes in-memory encoded audio to interleaved f32 PCM

use std::io::Cursor;
use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::warn;

use crate::error::RenderError;

/// A fully decoded clip, ready for the output device
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }
}

pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl AudioDecoder {
    /// Probe encoded bytes and prepare for decoding
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RenderError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // No extension to go on; let the probe sniff the container
        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| RenderError::Decode(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(RenderError::NoAudioTrack)?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| RenderError::Decode(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decode next packet, returns interleaved f32 samples
    /// Returns None when end of stream is reached
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, RenderError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(RenderError::Decode(format!("Failed to read packet: {}", e))),
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    // The codec may only learn the real layout from the first packet
                    let spec = decoded.spec();
                    self.sample_rate = spec.rate;
                    self.channels = spec.channels.count();
                    return Ok(Some(Self::audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = %e, "Decode error (skipping packet)");
                    continue;
                }
                Err(e) => return Err(RenderError::Decode(format!("Decode failed: {}", e))),
            }
        }
    }

    /// Decode the whole stream into one clip
    pub fn decode_all(mut self) -> Result<DecodedClip, RenderError> {
        let mut samples = Vec::new();
        while let Some(chunk) = self.decode_next()? {
            samples.extend_from_slice(&chunk);
        }
        if samples.is_empty() {
            return Err(RenderError::Decode("Stream contains no audio samples".into()));
        }
        Ok(DecodedClip {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    /// Convert any AudioBufferRef to interleaved f32 samples
    fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
        match buf {
            AudioBufferRef::F32(b) => Self::interleave_convert(b.planes(), b.frames(), |s: f32| s),
            AudioBufferRef::F64(b) => {
                Self::interleave_convert(b.planes(), b.frames(), |s: f64| s as f32)
            }
            AudioBufferRef::S8(b) => {
                let scale = 1.0 / 128.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i8| s as f32 * scale)
            }
            AudioBufferRef::S16(b) => {
                let scale = 1.0 / 32768.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i16| s as f32 * scale)
            }
            AudioBufferRef::S24(b) => {
                let scale = 1.0 / 8388608.0;
                Self::interleave_convert(b.planes(), b.frames(), |s| s.inner() as f32 * scale)
            }
            AudioBufferRef::S32(b) => {
                let scale = 1.0 / 2147483648.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i32| s as f32 * scale)
            }
            AudioBufferRef::U8(b) => {
                Self::interleave_convert(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
            }
            AudioBufferRef::U16(b) => Self::interleave_convert(b.planes(), b.frames(), |s: u16| {
                (s as f32 - 32768.0) / 32768.0
            }),
            AudioBufferRef::U24(b) => Self::interleave_convert(b.planes(), b.frames(), |s| {
                (s.inner() as f32 - 8388608.0) / 8388608.0
            }),
            AudioBufferRef::U32(b) => Self::interleave_convert(b.planes(), b.frames(), |s: u32| {
                (s as f64 - 2147483648.0) as f32 / 2147483648.0
            }),
        }
    }

    fn interleave_convert<T: Sample + Copy, F: Fn(T) -> f32>(
        planes: AudioPlanes<T>,
        frames: usize,
        convert: F,
    ) -> Vec<f32> {
        let num_channels = planes.planes().len();
        if num_channels == 0 || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * num_channels);

        for frame in 0..frames {
            for ch in 0..num_channels {
                interleaved.push(convert(planes.planes()[ch][frame]));
            }
        }

        interleaved
    }
}

/// Decode encoded bytes into a clip in one call
pub fn decode_clip(bytes: Vec<u8>) -> Result<DecodedClip, RenderError> {
    AudioDecoder::from_bytes(bytes)?.decode_all()
}
