use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET / - fixed liveness message, independent of model state.
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Whisper API is running"
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let uptime_seconds = state.uptime_seconds();
    let model_loaded = state.engine.is_loaded().await;
    let model_size = state.engine.model_size();

    HttpResponse::Ok().json(json!({
        "status": if model_loaded { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "whisper-api-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host.clone(),
            "port": state.config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "transcriptions_completed": metrics.transcriptions_completed
        },
        "model": {
            "whisper": model_size.to_string(),
            "size_mb": model_size.size_mb(),
            "language": state.engine.options().language.clone(),
            "loaded": model_loaded,
            "max_concurrent_transcriptions": state.engine.concurrency_limit()
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let uptime_seconds = state.uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "transcriptions_completed": metrics.transcriptions_completed,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats
    }))
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

    #[actix_web::test]
    async fn test_root_returns_fixed_message() {
        let app = test::init_service(App::new().route("/", web::get().to(root))).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Whisper API is running");
    }

    #[actix_web::test]
    async fn test_health_reports_degraded_without_model() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model"]["loaded"], false);
        assert_eq!(body["model"]["whisper"], "medium");
    }

    #[actix_web::test]
    async fn test_health_reports_configured_concurrency_cap() {
        let mut config = AppConfig::default();
        config.limits.max_concurrent_transcriptions = 4;
        let engine = TranscriptionEngine::new(&config);
        let state = AppState::new(config, engine);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["model"]["max_concurrent_transcriptions"], 4);
    }
}
