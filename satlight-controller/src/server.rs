use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use satlight_common::{
    ErrorResponse, HealthResponse, TransmittingResponse, WebhookEvent, WebhookResponse,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::model::{SatelliteTable, local_now};
use crate::render::{RenderStateHandle, StripLayout};

/// Shared-secret header (`X-Webhook-Secret`), checked when a secret is configured
pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppState {
    pub table: Arc<SatelliteTable>,
    pub render_state: RenderStateHandle,
    pub layout: StripLayout,
    pub webhook_secret: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .route("/transmitting", get(handle_transmitting))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Compare without bailing out at the first differing byte.
fn secrets_match(expected: &str, received: &str) -> bool {
    expected.len() == received.len()
        && expected
            .bytes()
            .zip(received.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn satellite_index(raw: i64, count: usize) -> Result<usize, Response> {
    usize::try_from(raw).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "Invalid satellite index {}. Must be between 0 and {}",
                raw,
                count.saturating_sub(1)
            ),
        )
    })
}

/// Webhook handler for scoring platform events
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    tracing::debug!("Received webhook: {}", body);

    if let Some(expected) = &state.webhook_secret {
        let received = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if !received.is_some_and(|r| secrets_match(expected, r)) {
            tracing::warn!("Invalid webhook secret received");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid webhook secret");
        }
    }

    let event: WebhookEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Rejected webhook payload: {}", e);
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid webhook payload: {}", e));
        }
    };

    let event_id = uuid::Uuid::now_v7().to_string();
    tracing::info!("Webhook {} ({})", event.kind(), event_id);

    let count = state.table.count();
    let result = match event {
        WebhookEvent::ChallengeSolved { satellite_index: raw } => {
            let index = match satellite_index(raw, count) {
                Ok(index) => index,
                Err(response) => return response,
            };
            state.table.set_solved(index, true).await
        }
        WebhookEvent::ChallengeUnsolved { satellite_index: raw } => {
            let index = match satellite_index(raw, count) {
                Ok(index) => index,
                Err(response) => return response,
            };
            state.table.set_solved(index, false).await
        }
        WebhookEvent::AddTransmissionTimes {
            satellite_index: raw,
            transmission_times,
        } => {
            let index = match satellite_index(raw, count) {
                Ok(index) => index,
                Err(response) => return response,
            };
            state
                .table
                .add_windows(index, &transmission_times)
                .await
                .map(|_| ())
        }
        WebhookEvent::ClearTransmissionTimes {
            satellite_index: Some(raw),
        } => {
            let index = match satellite_index(raw, count) {
                Ok(index) => index,
                Err(response) => return response,
            };
            state.table.clear_windows(index).await
        }
        WebhookEvent::ClearTransmissionTimes {
            satellite_index: None,
        } => {
            state.table.clear_all_windows().await;
            Ok(())
        }
    };

    match result {
        Ok(()) => Json(WebhookResponse {
            status: "success".to_string(),
            event_id,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("Rejected webhook {}: {}", event_id, e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// Health check endpoint
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.table.snapshot().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        satellite_count: state.layout.satellite_count,
        leds_per_satellite: state.layout.leds_per_satellite,
        total_led_count: state.layout.total_leds(),
        render_state: state.render_state.get().await.to_string(),
        satellite_states: snapshot.to_views(),
    })
}

/// Satellites transmitting right now
async fn handle_transmitting(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(TransmittingResponse {
        transmitting: state.table.transmitting_at(local_now()).await,
    })
}
