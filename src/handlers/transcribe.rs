//! # Transcription Endpoint
//!
//! `POST /transcribe` is the one substantive operation of this service.
//!
//! ## Request path:
//! 1. Walk the multipart body until the file field appears
//! 2. Stream its chunks into a request-unique temp file, enforcing the
//!    configured upload cap as bytes arrive
//! 3. Hand the temp path to the engine (decode + greedy Whisper pass)
//! 4. Answer `{"text": "..."}` on success
//!
//! The temp file is an RAII guard, so it is removed whichever way this
//! function exits. A failed transcription does not leave uploads behind.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::json;
use tracing::debug;

use crate::audio::TempAudioFile;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn transcribe(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let max_upload_bytes = state.config.limits.max_upload_bytes;

    // First field carrying a file wins; the original accepted exactly one
    let mut field = loop {
        match payload.try_next().await? {
            Some(field) => {
                if field.content_disposition().and_then(|cd| cd.get_filename()).is_some() {
                    break field;
                }
                // Non-file form values are ignored, matching the original
                debug!("Skipping non-file multipart field");
            }
            None => {
                return Err(AppError::BadUpload(
                    "Request contains no file field".to_string(),
                ))
            }
        }
    };

    let client_filename = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(|name| name.to_string());
    debug!("Receiving upload: {:?}", client_filename);

    let mut temp = TempAudioFile::create(
        &state.config.limits.temp_dir,
        client_filename.as_deref(),
    )?;

    let mut received: usize = 0;
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        received += chunk.len();
        if received > max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload exceeds the {} byte limit",
                max_upload_bytes
            )));
        }
        temp.write_chunk(&chunk)?;
    }

    if received == 0 {
        return Err(AppError::BadUpload("Uploaded file is empty".to_string()));
    }
    temp.finalize()?;

    let result = state.engine.transcribe_file(temp.path()).await?;
    state.record_transcription();

    // Only the text crosses the API boundary; segment-level detail stays out
    Ok(HttpResponse::Ok().json(json!({ "text": result.text })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transcription::TranscriptionEngine;
    use actix_web::{test, App};

    fn test_state() -> AppState {
        let config = AppConfig::default();
        let engine = TranscriptionEngine::new(&config);
        AppState::new(config, engine)
    }

    fn multipart_body(boundary: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"audio\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        body
    }

    #[actix_web::test]
    async fn test_missing_file_field_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let boundary = "----test-boundary";
        // A plain form value, no filename: not an upload
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n");
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_upload_without_model_is_service_unavailable() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        // Valid 0.1s WAV; the only missing piece is the model
        let mut wav_bytes = std::io::Cursor::new(Vec::new());
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, 16_000, 16);
        wav::write(header, &wav::BitDepth::Sixteen(vec![100; 1600]), &mut wav_bytes).unwrap();

        let boundary = "----test-boundary";
        let body = multipart_body(boundary, "clip.wav", wav_bytes.get_ref());

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_garbage_upload_is_unprocessable() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let boundary = "----test-boundary";
        let body = multipart_body(boundary, "clip.wav", b"definitely not a wav file");

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[actix_web::test]
    async fn test_oversized_upload_is_rejected() {
        let mut config = AppConfig::default();
        config.limits.max_upload_bytes = 16;
        let engine = TranscriptionEngine::new(&config);
        let state = AppState::new(config, engine);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let boundary = "----test-boundary";
        let body = multipart_body(boundary, "clip.wav", &[0u8; 64]);

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
