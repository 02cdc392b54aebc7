//! # Transcription Engine
//!
//! Process-wide wrapper around the loaded Whisper model. Owns three things:
//! the model itself, the fixed decoding options, and the admission gate that
//! keeps concurrent requests from piling onto one accelerator.
//!
//! ## Resource model:
//! - The model sits behind `RwLock<Option<WhisperModel>>`; inference takes
//!   the write lock because decoding mutates the KV cache.
//! - A semaphore sized from `limits.max_concurrent_transcriptions` bounds
//!   how many requests may even wait on that lock. Requests beyond the cap
//!   queue on the semaphore instead of stacking up on the GPU.
//! - Client disconnects do not cancel an inference already under way; the
//!   permit is released when decoding finishes.

use crate::audio;
use crate::config::AppConfig;
use crate::device;
use crate::transcription::model::{ModelSize, WhisperModel};
use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{RwLock, Semaphore};

/// Decoding options applied to every request.
///
/// The service contract pins everything except the language: task
/// "transcribe", temperature 0, beam width 1, best-of 1. Greedy and
/// deterministic.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Spoken language (ISO 639-1), "en" in the shipped configuration
    pub language: String,
    /// Sampling temperature; 0.0 selects pure argmax decoding
    pub temperature: f32,
    /// Beam search width; 1 disables beam search
    pub beam_size: usize,
    /// Number of candidate decodes to pick from; 1 with temperature 0
    pub best_of: usize,
}

impl DecodeOptions {
    fn from_config(config: &AppConfig) -> Self {
        Self {
            language: config.model.language.clone(),
            temperature: 0.0,
            beam_size: 1,
            best_of: 1,
        }
    }
}

/// Result of one transcription, with the metadata the service logs.
///
/// The HTTP response exposes only `text`; the rest feeds logging and the
/// metrics counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub audio_duration: f64,
    pub processing_time_ms: u64,
    pub language: String,
    pub model_name: String,
    pub timestamp: u64,
}

/// Failure classes the handler maps onto distinct HTTP statuses.
#[derive(Debug)]
pub enum TranscribeError {
    /// No model loaded (startup failed or still in progress)
    NotLoaded,
    /// The uploaded bytes could not be decoded as audio
    UnsupportedAudio(anyhow::Error),
    /// The model rejected or failed on the decoded audio
    Inference(anyhow::Error),
}

impl fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscribeError::NotLoaded => write!(f, "No model loaded for transcription"),
            TranscribeError::UnsupportedAudio(e) => write!(f, "Audio decode failed: {}", e),
            TranscribeError::Inference(e) => write!(f, "Transcription failed: {}", e),
        }
    }
}

impl std::error::Error for TranscribeError {}

/// The shared transcription dependency injected into request handlers.
pub struct TranscriptionEngine {
    model: RwLock<Option<WhisperModel>>,
    options: DecodeOptions,
    model_size: ModelSize,
    device_preference: String,
    max_concurrent: usize,
    permits: Semaphore,
}

impl TranscriptionEngine {
    /// Build an engine with no model loaded yet.
    ///
    /// Falls back to the medium checkpoint if the configured size string is
    /// unparseable; config validation should have caught that earlier.
    pub fn new(config: &AppConfig) -> Self {
        let model_size = config
            .model
            .whisper_model
            .parse::<ModelSize>()
            .unwrap_or(ModelSize::Medium);

        let options = DecodeOptions::from_config(config);
        tracing::debug!(
            "Engine configured: model {}, language {}, temperature {}, beam {}, best-of {}",
            model_size,
            options.language,
            options.temperature,
            options.beam_size,
            options.best_of
        );

        Self {
            model: RwLock::new(None),
            options,
            model_size,
            device_preference: config.model.device.clone(),
            max_concurrent: config.limits.max_concurrent_transcriptions,
            permits: Semaphore::new(config.limits.max_concurrent_transcriptions),
        }
    }

    /// Load the configured model. Called exactly once at startup by the
    /// composition root, before the server starts accepting requests.
    pub async fn load_model(&self) -> Result<()> {
        let device = device::device_from_config(&self.device_preference);
        let model = WhisperModel::load(self.model_size, device).await?;

        let mut guard = self.model.write().await;
        *guard = Some(model);
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }

    pub fn model_size(&self) -> ModelSize {
        self.model_size
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// The configured cap on simultaneous transcriptions.
    ///
    /// Reports the cap itself, not the permits currently free, so the value
    /// stays stable while requests are in flight.
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent
    }

    /// Transcribe the audio file at `path`.
    ///
    /// ## Steps:
    /// 1. Acquire an admission permit (queues when the accelerator is busy)
    /// 2. Decode the file to 16 kHz mono f32 samples
    /// 3. Run the greedy decode under the model write lock
    pub async fn transcribe_file(&self, path: &Path) -> Result<TranscriptionResult, TranscribeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TranscribeError::Inference(anyhow::anyhow!("Admission gate closed: {}", e)))?;

        let samples =
            audio::read_audio_file(path).map_err(TranscribeError::UnsupportedAudio)?;
        let audio_duration = samples.len() as f64 / audio::WHISPER_SAMPLE_RATE as f64;

        let start_time = Instant::now();
        let (text, model_name) = {
            let mut guard = self.model.write().await;
            let model = guard.as_mut().ok_or(TranscribeError::NotLoaded)?;
            let text = model
                .transcribe(&samples, &self.options.language)
                .map_err(TranscribeError::Inference)?;
            (text, model.size().to_string())
        };
        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        tracing::info!(
            "Transcription completed: {:.2}s audio -> {} chars in {}ms",
            audio_duration,
            text.len(),
            processing_time_ms
        );

        Ok(TranscriptionResult {
            text,
            audio_duration,
            processing_time_ms,
            language: self.options.language.clone(),
            model_name,
            timestamp,
        })
    }
}
