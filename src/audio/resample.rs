// Fit a decoded clip to the output device's channel layout and sample rate
use rubato::{FftFixedIn, Resampler};

use super::decoder::DecodedClip;
use crate::error::RenderError;

const CHUNK_FRAMES: usize = 1024;

/// Convert a clip to `channels` interleaved channels at `sample_rate`
pub fn adapt_clip(
    clip: &DecodedClip,
    sample_rate: u32,
    channels: usize,
) -> Result<Vec<f32>, RenderError> {
    if clip.channels == 0 || channels == 0 {
        return Err(RenderError::Resample("Zero channel layout".into()));
    }

    let planes = remap_channels(&deinterleave(&clip.samples, clip.channels), channels);
    let planes = if clip.sample_rate == sample_rate {
        planes
    } else {
        resample(planes, clip.sample_rate, sample_rate)?
    };

    Ok(interleave(&planes))
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planes[ch].push(*sample);
        }
    }
    planes
}

fn interleave(planes: &[Vec<f32>]) -> Vec<f32> {
    let frames = planes.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            out.push(plane.get(frame).copied().unwrap_or(0.0));
        }
    }
    out
}

/// Mono is spread to every output channel; stereo down to mono is averaged;
/// anything else maps channel by channel, reusing the last input channel.
fn remap_channels(planes: &[Vec<f32>], channels: usize) -> Vec<Vec<f32>> {
    if planes.len() == channels {
        return planes.to_vec();
    }
    if channels == 1 {
        let frames = planes[0].len();
        let scale = 1.0 / planes.len() as f32;
        let mixed = (0..frames)
            .map(|i| planes.iter().map(|p| p[i]).sum::<f32>() * scale)
            .collect();
        return vec![mixed];
    }
    (0..channels)
        .map(|ch| planes[ch.min(planes.len() - 1)].clone())
        .collect()
}

fn resample(
    planes: Vec<Vec<f32>>,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, RenderError> {
    let channels = planes.len();
    let frames = planes[0].len();
    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_FRAMES, 2, channels)
            .map_err(|e| RenderError::Resample(e.to_string()))?;

    let expected = (frames as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut out = vec![Vec::with_capacity(expected + CHUNK_FRAMES); channels];
    let mut pos = 0;

    while pos < frames {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(frames);
        let chunk: Vec<&[f32]> = planes.iter().map(|p| &p[pos..end]).collect();
        let processed = if end - pos == needed {
            resampler.process(&chunk, None)
        } else {
            resampler.process_partial(Some(chunk.as_slice()), None)
        }
        .map_err(|e| RenderError::Resample(e.to_string()))?;
        for (plane, data) in out.iter_mut().zip(processed) {
            plane.extend(data);
        }
        pos = end;
    }

    // Flush the resampler's internal delay line
    let tail = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| RenderError::Resample(e.to_string()))?;
    for (plane, data) in out.iter_mut().zip(tail) {
        plane.extend(data);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(samples: Vec<f32>, sample_rate: u32, channels: usize) -> DecodedClip {
        DecodedClip {
            samples,
            sample_rate,
            channels,
        }
    }

    #[test]
    fn test_matching_layout_is_untouched() {
        let input = clip(vec![0.1, 0.2, 0.3, 0.4], 48000, 2);
        assert_eq!(adapt_clip(&input, 48000, 2).unwrap(), input.samples);
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let input = clip(vec![0.1, 0.2], 48000, 1);
        assert_eq!(adapt_clip(&input, 48000, 2).unwrap(), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_stereo_is_averaged_to_mono() {
        let input = clip(vec![0.2, 0.4, -0.2, 0.0], 48000, 2);
        let out = adapt_clip(&input, 48000, 1).unwrap();
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_upsampling_roughly_doubles_length() {
        let input = clip(vec![0.0; 4410], 22050, 1);
        let out = adapt_clip(&input, 44100, 1).unwrap();
        assert!(out.len() >= 8820, "got {} samples", out.len());
    }
}
