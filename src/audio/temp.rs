//! # Temporary Upload Files
//!
//! Each upload is spooled to its own on-disk file before transcription,
//! because the decoder consumes a file path rather than an in-memory stream.
//!
//! Two invariants hold for every request:
//! - The file name is derived from a request-scoped UUID, never from the
//!   client-supplied filename alone, so concurrent uploads of `voice.wav`
//!   can never share a path.
//! - The file is removed when the guard drops, whichever way the request
//!   ends (success, decode error, transcription error, early return).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// RAII guard around one spooled upload.
pub struct TempAudioFile {
    path: PathBuf,
    file: Option<File>,
}

impl TempAudioFile {
    /// Create the temp file under `dir`.
    ///
    /// The client filename contributes only its extension (sanitized), which
    /// keeps decoder format hints without trusting the client with path
    /// construction.
    pub fn create(dir: &Path, client_filename: Option<&str>) -> std::io::Result<Self> {
        let ext = client_filename
            .and_then(sanitized_extension)
            .unwrap_or_else(|| "wav".to_string());
        let path = dir.join(format!("upload-{}.{}", Uuid::new_v4(), ext));
        let file = File::create(&path)?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Append one chunk of the upload stream.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "temp file already finalized",
            )),
        }
    }

    /// Flush and close the handle so readers see the full contents.
    pub fn finalize(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudioFile {
    fn drop(&mut self) {
        // Close before unlinking; required on platforms with mandatory locks
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove temp file {:?}: {}", self.path, e);
            }
        }
    }
}

/// Extract a filesystem-safe extension from the client filename.
fn sanitized_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_drop() {
        let dir = std::env::temp_dir();
        let path = {
            let mut temp = TempAudioFile::create(&dir, Some("clip.wav")).unwrap();
            temp.write_chunk(b"RIFF").unwrap();
            temp.finalize().unwrap();
            assert!(temp.path().exists());
            temp.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_removed_on_drop_without_finalize() {
        // Error paths drop the guard before finalize is reached
        let dir = std::env::temp_dir();
        let path = {
            let mut temp = TempAudioFile::create(&dir, Some("clip.wav")).unwrap();
            temp.write_chunk(b"partial").unwrap();
            temp.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_identical_client_filenames_get_distinct_paths() {
        let dir = std::env::temp_dir();
        let a = TempAudioFile::create(&dir, Some("voice.wav")).unwrap();
        let b = TempAudioFile::create(&dir, Some("voice.wav")).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());
        assert!(b.path().exists());
    }

    #[test]
    fn test_extension_sanitization() {
        assert_eq!(sanitized_extension("a.WAV"), Some("wav".to_string()));
        assert_eq!(sanitized_extension("a.mp3"), Some("mp3".to_string()));
        assert_eq!(sanitized_extension("noext"), None);
        assert_eq!(sanitized_extension("weird.../../x"), None);
        assert_eq!(sanitized_extension("a.waytoolongext"), None);
    }

    #[test]
    fn test_missing_filename_defaults_to_wav() {
        let dir = std::env::temp_dir();
        let temp = TempAudioFile::create(&dir, None).unwrap();
        let name = temp.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".wav"));
    }
}
