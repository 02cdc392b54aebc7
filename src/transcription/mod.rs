//! # Transcription Module
//!
//! Speech-to-text over Whisper models through the Candle framework (pure
//! Rust, no whisper.cpp FFI).
//!
//! ## Key Components:
//! - **Model**: loading a Whisper checkpoint from HuggingFace and running
//!   the mel front end plus greedy decoding
//! - **Engine**: process-wide wrapper that owns the loaded model, applies
//!   the fixed decoding options, and gates concurrent inference
//!
//! ## Decoding contract:
//! The service transcribes with a fixed configuration: English, task
//! "transcribe" (never "translate"), temperature 0, beam width 1, best-of 1.
//! That makes output deterministic for identical input audio.

pub mod engine;
pub mod model;

pub use engine::{DecodeOptions, TranscribeError, TranscriptionEngine, TranscriptionResult};
pub use model::{ModelSize, WhisperModel};
