//! File decoding and resampling.

use std::fs::File;
use std::path::Path;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::Waveform;
use crate::error::AnalysisError;

/// Input chunk size fed to the FFT resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Decode a file to mono and resample it to `target_rate`.
pub fn load_waveform<P: AsRef<Path>>(path: P, target_rate: u32) -> Result<Waveform, AnalysisError> {
    let path = path.as_ref();
    let (samples, source_rate) = load_audio_samples(path)?;
    log::debug!(
        "Decoded {} samples at {} Hz from {:?}",
        samples.len(),
        source_rate,
        path
    );

    let samples = resample(&samples, source_rate, target_rate)?;

    Ok(Waveform {
        path: path.to_path_buf(),
        samples,
        sample_rate: target_rate,
    })
}

/// Load audio samples from a file (mono, normalized to -1.0 to 1.0).
fn load_audio_samples(path: &Path) -> Result<(Vec<f32>, u32), AnalysisError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AnalysisError::Decode("Unknown sample rate".to_string()))?;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_mono_samples(&mut samples, &mut sample_buf, decoded),
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if samples.is_empty() {
        return Err(AnalysisError::Decode(format!(
            "No audio samples decoded from {}",
            path.display()
        )));
    }

    Ok((samples, sample_rate))
}

/// Append decoded audio to the sample buffer, averaging all channels.
fn append_mono_samples(
    samples: &mut Vec<f32>,
    sample_buf: &mut Option<SampleBuffer<f32>>,
    decoded: AudioBufferRef<'_>,
) {
    let spec = *decoded.spec();
    let channels = spec.channels.count().max(1);
    let capacity = decoded.capacity() as u64;

    let needs_alloc = sample_buf
        .as_ref()
        .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
    if needs_alloc {
        *sample_buf = Some(SampleBuffer::<f32>::new(capacity, spec));
    }

    if let Some(buf) = sample_buf.as_mut() {
        buf.copy_interleaved_ref(decoded);
        samples.extend(
            buf.samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }
}

/// Resample mono audio with an FFT resampler, compensating for its delay.
///
/// The output length is `round(len * to / from)`.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, AnalysisError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| AnalysisError::Decode(format!("Resampler setup failed: {}", e)))?;

    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let frames = resampler.input_frames_next();
        let input = [&samples[pos..pos + frames]];
        let out = resampler
            .process(&input[..], None)
            .map_err(|e| AnalysisError::Decode(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
        pos += frames;
    }

    if pos < samples.len() {
        let input = [&samples[pos..]];
        let out = resampler
            .process_partial(Some(&input[..]), None)
            .map_err(|e| AnalysisError::Decode(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| AnalysisError::Decode(format!("Resampling failed: {}", e)))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let mut resampled: Vec<f32> = output.into_iter().skip(delay).collect();
    resampled.truncate(expected);
    Ok(resampled)
}
