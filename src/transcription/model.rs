//! # Whisper Model
//!
//! Loads a Whisper checkpoint from HuggingFace via Candle and exposes one
//! operation: turn 16 kHz mono f32 samples into text.
//!
//! ## Loading Process:
//! 1. Download config.json, tokenizer.json, and model.safetensors (cached
//!    locally by hf-hub)
//! 2. Build the tokenizer and the mel filter bank
//! 3. Load weights on the target device, f16 on CUDA for speed, f32
//!    elsewhere
//!
//! ## Decoding:
//! A single greedy pass: argmax at every step, no sampling, no temperature
//! fallback. Deterministic by construction, which is what the service
//! contract requires.

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;

/// Available Whisper checkpoint sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository for this size.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate weight size, reported by the health endpoint.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper model ready for transcription.
///
/// Decoding mutates the KV cache, so callers need `&mut self`; the engine
/// serializes access behind its lock.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    size: ModelSize,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Download (or reuse the local cache for) and load a checkpoint.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = {
            use hf_hub::api::tokio::ApiBuilder;

            let mut builder = ApiBuilder::new().with_progress(false);
            if let Ok(token) = std::env::var("HF_TOKEN") {
                builder = builder.with_token(Some(token));
            }
            if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
                builder = builder.with_cache_dir(cache_dir.into());
            }
            builder
                .build()
                .map_err(|e| anyhow!("Failed to create HuggingFace API client: {}", e))?
        };

        let repo = api.model(size.repo_name().to_string());
        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let mel_filters = mel_filter_bank(config.num_mel_bins as usize);

        // fp16 only where it actually speeds things up
        let dtype = if device.is_cuda() { DType::F16 } else { m::DTYPE };
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], dtype, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded on {} in {:.2}s",
            size,
            crate::device::describe(&device),
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            size,
            tokenizer,
            mel_filters,
        })
    }

    pub fn size(&self) -> ModelSize {
        self.size
    }

    /// Transcribe 16 kHz mono samples to text with greedy decoding.
    ///
    /// `language` is an ISO 639-1 code; the task is always "transcribe".
    pub fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<String> {
        if samples.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }

        let start_time = std::time::Instant::now();

        let mel = m::audio::pcm_to_mel(&self.config, samples, &self.mel_filters);
        let mel_len = mel.len();
        let n_mels = self.config.num_mel_bins as usize;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;

        let audio_features = self.model.encoder.forward(&mel, true)?;

        let mut tokens = vec![self.token_id(m::SOT_TOKEN)?];
        // .en checkpoints have no language/task tokens in their vocabulary
        if let Ok(lang_token) = self.token_id(&format!("<|{}|>", language)) {
            tokens.push(lang_token);
            tokens.push(self.token_id(m::TRANSCRIBE_TOKEN)?);
        }
        if let Ok(no_ts) = self.token_id(m::NO_TIMESTAMPS_TOKEN) {
            tokens.push(no_ts);
        }

        let eot_token = self.token_id(m::EOT_TOKEN)?;
        let prompt_len = tokens.len();
        let max_tokens = self.config.max_target_positions.saturating_sub(prompt_len);

        for i in 0..max_tokens {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;

            // Temperature 0, beam 1, best-of 1: plain argmax
            let next_token = logits
                .to_dtype(DType::F32)?
                .argmax(0)?
                .to_scalar::<u32>()?;

            if next_token == eot_token {
                break;
            }
            tokens.push(next_token);
        }

        let text = self.decode_tokens(&tokens[prompt_len..])?;

        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s: '{}'",
            samples.len() as f64 / 16000.0,
            start_time.elapsed().as_secs_f64(),
            text
        );

        Ok(text)
    }

    /// Look up a special token id in the tokenizer vocabulary.
    fn token_id(&self, token: &str) -> Result<u32> {
        self.tokenizer
            .token_to_id(token)
            .ok_or_else(|| anyhow!("Token '{}' not in tokenizer vocabulary", token))
    }

    /// Decode output tokens and strip residual special markers.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

/// Convert a frequency to the slaney mel scale: linear below 1 kHz,
/// logarithmic above, as in librosa's default mel filters.
fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / (6.4f64.ln() / 27.0)
    }
}

/// Inverse of [`hz_to_mel`].
fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

    if mel < MIN_LOG_MEL {
        F_SP * mel
    } else {
        MIN_LOG_HZ * ((6.4f64.ln() / 27.0) * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Build the mel filter bank used by the spectrogram front end.
///
/// Triangular filters over the 201 FFT bins of Whisper's 400-point STFT at
/// 16 kHz, with slaney-style area normalization. Band edges sit on the
/// slaney mel scale (librosa's `htk=False` default), which is the bank the
/// Whisper checkpoints were trained with; an HTK-scale bank shifts every
/// band center and measurably degrades transcriptions. Layout matches what
/// `candle_transformers::models::whisper::audio` expects: `n_mels` rows of
/// `n_fft / 2 + 1` weights.
pub fn mel_filter_bank(n_mels: usize) -> Vec<f32> {
    const N_FREQS: usize = m::N_FFT / 2 + 1;
    const SAMPLE_RATE: f64 = 16_000.0;

    let max_mel = hz_to_mel(SAMPLE_RATE / 2.0);
    let band_edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let bin_hz: Vec<f64> = (0..N_FREQS)
        .map(|i| i as f64 * SAMPLE_RATE / m::N_FFT as f64)
        .collect();

    let mut filters = vec![0.0f32; n_mels * N_FREQS];
    for mel_idx in 0..n_mels {
        let (lower, center, upper) = (
            band_edges[mel_idx],
            band_edges[mel_idx + 1],
            band_edges[mel_idx + 2],
        );
        // Slaney normalization keeps per-band energy comparable
        let norm = 2.0 / (upper - lower);

        for (freq_idx, &hz) in bin_hz.iter().enumerate() {
            let weight = if hz >= lower && hz <= center {
                (hz - lower) / (center - lower)
            } else if hz > center && hz <= upper {
                (upper - hz) / (upper - center)
            } else {
                0.0
            };
            filters[mel_idx * N_FREQS + freq_idx] = (weight * norm) as f32;
        }
    }

    filters
}
