//! Symphonia decoding into the engine's interleaved PCM format.

use log::warn;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Decode a whole file into interleaved samples at `sample_rate` with `channels` channels.
///
/// Mono input is duplicated across channels; extra input channels are dropped.
pub fn decode_file(path: &Path, sample_rate: u32, channels: u16) -> Result<Vec<f32>, AudioError> {
    let (mut decoder, mut format, track_id) = open_file(path)?;
    let channels = channels.max(1) as usize;

    let mut planar: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut source_rate = 0_u32;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                source_rate = spec.rate;
                let input_channels = spec.channels.count().max(1);
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);

                for frame in buffer.samples().chunks(input_channels) {
                    for (channel, output) in planar.iter_mut().enumerate() {
                        let index = channel.min(input_channels - 1);
                        output.push(frame.get(index).copied().unwrap_or(0.0));
                    }
                }
            }
            Err(Error::DecodeError(err)) => {
                warn!("decode error in {}: {}", path.display(), err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    if source_rate != 0 && source_rate != sample_rate {
        planar = resample(planar, source_rate, sample_rate)?;
    }

    Ok(interleave(&planar))
}

fn open_file(path: &Path) -> Result<(Box<dyn Decoder>, Box<dyn FormatReader>, u32), AudioError> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("no supported audio tracks".to_string()))?;
    let track_id = track.id;

    let dec_opts: DecoderOptions = Default::default();
    let decoder = symphonia::default::get_codecs().make(&track.codec_params, &dec_opts)?;

    Ok((decoder, format, track_id))
}

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

fn resample(planar: Vec<Vec<f32>>, from: u32, to: u32) -> Result<Vec<Vec<f32>>, AudioError> {
    let frames = planar.first().map(Vec::len).unwrap_or(0);
    if frames == 0 {
        return Ok(planar);
    }

    let ratio = to as f64 / from as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, planar.len())
        .map_err(|err| AudioError::Resample(err.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); planar.len()];

    let mut position = 0;
    while position < frames {
        let end = (position + RESAMPLE_CHUNK).min(frames);
        let block: Vec<&[f32]> = planar.iter().map(|channel| &channel[position..end]).collect();
        let resampled = if end - position == RESAMPLE_CHUNK {
            resampler.process(block.as_slice(), None)
        } else {
            resampler.process_partial(Some(block.as_slice()), None)
        }
        .map_err(|err| AudioError::Resample(err.to_string()))?;
        append(&mut output, resampled);
        position = end;
    }

    // Flush the filter tail.
    while output[0].len() < expected + delay {
        let resampled = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|err| AudioError::Resample(err.to_string()))?;
        if resampled.first().map_or(true, Vec::is_empty) {
            break;
        }
        append(&mut output, resampled);
    }

    for channel in &mut output {
        channel.drain(..delay.min(channel.len()));
        channel.truncate(expected);
    }
    Ok(output)
}

fn append(output: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(block) {
        channel.extend(samples);
    }
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            samples.push(channel[frame]);
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_uses_shortest_channel() {
        let planar = vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0]];
        assert_eq!(interleave(&planar), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn resample_doubles_frame_count() {
        let planar = vec![vec![0.25_f32; 4410], vec![0.25_f32; 4410]];
        let output = resample(planar, 22_050, 44_100).expect("resample");
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].len(), 8_820);
    }

    #[test]
    fn resample_is_delay_compensated() {
        let planar = vec![vec![0.25_f32; 4410]];
        let output = resample(planar, 22_050, 44_100).expect("resample");
        let channel = &output[0];
        assert_eq!(channel.len(), 8_820);
        // Signal must reach both ends, not be shifted or cut off.
        assert!((channel[400] - 0.25).abs() < 0.01);
        assert!((channel[4_410] - 0.25).abs() < 0.01);
        assert!((channel[8_820 - 400] - 0.25).abs() < 0.01);
    }

    /// Silent MPEG-1 Layer III frames: 128 kbit/s, 44.1 kHz, mono.
    fn silent_mp3(frames: usize) -> Vec<u8> {
        const FRAME_LEN: usize = 417;
        let mut bytes = Vec::with_capacity(frames * FRAME_LEN);
        for _ in 0..frames {
            let mut frame = vec![0_u8; FRAME_LEN];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0xC4]);
            bytes.extend_from_slice(&frame);
        }
        bytes
    }

    #[test]
    fn mp3_codec_is_registered() {
        use symphonia::core::codecs::CODEC_TYPE_MP3;
        assert!(symphonia::default::get_codecs()
            .get_codec(CODEC_TYPE_MP3)
            .is_some());
    }

    #[test]
    fn decodes_mp3_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.mp3");
        std::fs::write(&path, silent_mp3(20)).unwrap();

        let samples = decode_file(&path, 44_100, 2).expect("decode mp3");
        let frames = samples.len() / 2;
        assert_eq!(samples.len() % 2, 0);
        assert!(frames >= 10 * 1152 && frames <= 20 * 1152, "{} frames", frames);
        assert!(samples.iter().all(|sample| sample.abs() < 1e-3));
    }
}
