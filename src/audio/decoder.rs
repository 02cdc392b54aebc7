//! # Audio Decoding
//!
//! Reads an uploaded audio file from disk into the representation the model
//! consumes: mono f32 samples in [-1.0, 1.0] at 16 kHz.
//!
//! ## Decoding Steps:
//! 1. Try the WAV fast path first (the overwhelmingly common upload)
//! 2. Fall back to symphonia for compressed containers (MP3, M4A/AAC,
//!    OGG/Vorbis, FLAC)
//! 3. Scale integer PCM to float
//! 4. Downmix multi-channel audio to mono by averaging
//! 5. Linearly resample to 16 kHz if the source rate differs

use crate::audio::WHISPER_SAMPLE_RATE;
use anyhow::{anyhow, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Read an audio file and return mono f32 samples at 16 kHz.
///
/// WAV files go through the `wav` crate directly; anything else is handed to
/// symphonia's format detection, which covers the compressed formats clients
/// actually send (MP3, M4A, OGG, FLAC). Bytes neither path can decode fail
/// with a descriptive error, which callers map to the unsupported-audio
/// response class.
pub fn read_audio_file(path: &Path) -> Result<Vec<f32>> {
    let (samples, channels, sample_rate) = match read_wav(path) {
        Ok(decoded) => decoded,
        Err(wav_err) => read_compressed(path).map_err(|fallback_err| {
            anyhow!(
                "Could not decode audio: not WAV ({}) and no supported compressed format ({})",
                wav_err,
                fallback_err
            )
        })?,
    };

    if samples.is_empty() {
        return Err(anyhow!("Audio file contains no samples"));
    }

    let mono = downmix_to_mono(&samples, channels);
    let resampled = resample(&mono, sample_rate, WHISPER_SAMPLE_RATE);

    tracing::debug!(
        "Decoded {:?}: {} Hz, {} ch, {} samples -> {} samples at {} Hz",
        path.file_name().unwrap_or_default(),
        sample_rate,
        channels,
        samples.len(),
        resampled.len(),
        WHISPER_SAMPLE_RATE
    );

    Ok(resampled)
}

/// WAV fast path: interleaved f32 samples plus channel count and rate.
fn read_wav(path: &Path) -> Result<(Vec<f32>, usize, u32)> {
    let mut file = File::open(path)
        .map_err(|e| anyhow!("Failed to open audio file {:?}: {}", path, e))?;

    let (header, data) = wav::read(&mut file).map_err(|e| anyhow!("WAV parse failed: {}", e))?;
    let samples = bit_depth_to_float(data)?;
    let channels = header.channel_count.max(1) as usize;

    Ok((samples, channels, header.sampling_rate))
}

/// Compressed-format path: let symphonia identify the container and decode
/// every packet of the first audio track into interleaved f32 samples.
fn read_compressed(path: &Path) -> Result<(Vec<f32>, usize, u32)> {
    let file = File::open(path)
        .map_err(|e| anyhow!("Failed to open audio file {:?}: {}", path, e))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut format = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!("Unrecognized audio container: {}", e))?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No decodable audio track in container"))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("No decoder for audio codec: {}", e))?;

    let mut samples = Vec::new();
    let mut channels = 0usize;
    let mut sample_rate = 0u32;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream surfaces as an unexpected-EOF io error
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(anyhow!("Error reading audio packet: {}", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                sample_rate = spec.rate;

                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt packet mid-stream is skippable; keep going
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(anyhow!("Audio decode failed: {}", e)),
        }
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(anyhow!("Audio stream produced no samples"));
    }

    Ok((samples, channels, sample_rate))
}

/// Scale the parsed PCM payload to f32 in [-1.0, 1.0].
fn bit_depth_to_float(data: wav::BitDepth) -> Result<Vec<f32>> {
    let samples = match data {
        // 8-bit WAV is unsigned, centered on 128
        wav::BitDepth::Eight(samples) => samples
            .into_iter()
            .map(|s| (s as f32 - 128.0) / 128.0)
            .collect(),
        wav::BitDepth::Sixteen(samples) => samples
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        wav::BitDepth::TwentyFour(samples) => samples
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples,
        wav::BitDepth::Empty => return Err(anyhow!("WAV file has an empty data chunk")),
    };
    Ok(samples)
}

/// Average interleaved channels into a single mono channel.
fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler.
///
/// Adequate for speech fed into Whisper; the mel front end is far more
/// forgiving than music applications would be.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let current = samples[idx.min(samples.len() - 1)];
        let next = samples[(idx + 1).min(samples.len() - 1)];
        out.push(current + (next - current) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: Vec<i16>) {
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, channels, sample_rate, 16);
        let mut file = File::create(path).unwrap();
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut file).unwrap();
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("decoder-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_decodes_mono_16k_wav() {
        let path = temp_path("mono.wav");
        write_wav(&path, 16_000, 1, vec![0, 16384, -16384, 32767]);

        let samples = read_audio_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-3);
        assert!((samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_downmixes_stereo() {
        let path = temp_path("stereo.wav");
        // L=16384, R=-16384 in every frame: downmix should be silence
        write_wav(&path, 16_000, 2, vec![16384, -16384, 16384, -16384]);

        let samples = read_audio_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(samples.len(), 2);
        for s in samples {
            assert!(s.abs() < 1e-3);
        }
    }

    #[test]
    fn test_resamples_to_16k() {
        let path = temp_path("rate.wav");
        // 1 second at 8 kHz should come out as ~1 second at 16 kHz
        write_wav(&path, 8_000, 1, vec![1000; 8_000]);

        let samples = read_audio_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let expected = 16_000usize;
        assert!(samples.len().abs_diff(expected) <= 2);
    }

    #[test]
    fn test_rejects_non_wav_bytes() {
        let path = temp_path("garbage.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"this is definitely not audio").unwrap();
        drop(file);

        let result = read_audio_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_compressed_path_decodes_pcm_container() {
        // symphonia's own wav reader exercises the container-detection and
        // packet-decode loop without a binary mp3 fixture in the tree
        let path = temp_path("compressed.wav");
        write_wav(&path, 16_000, 1, vec![8192; 1600]);

        let (samples, channels, rate) = read_compressed(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(channels, 1);
        assert_eq!(rate, 16_000);
        assert_eq!(samples.len(), 1600);
        assert!((samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_compressed_path_rejects_garbage() {
        let path = temp_path("compressed-garbage.bin");
        std::fs::write(&path, b"no container here").unwrap();

        let result = read_compressed(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }
}
