//! # Audio Module
//!
//! Everything between "bytes arrived in a multipart field" and "f32 samples
//! the model can consume":
//! - **Temp file guard**: request-unique on-disk spool for the upload,
//!   removed on every exit path
//! - **Decoder**: WAV parsing, PCM-to-float conversion, mono downmix, and
//!   resampling to the 16 kHz the Whisper front end expects

pub mod decoder;
pub mod temp;

pub use decoder::read_audio_file;
pub use temp::TempAudioFile;

/// Sample rate required by the Whisper mel front end.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;
