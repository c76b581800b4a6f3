use crate::error::AppError;
use crate::state::AppState;
use autoclaims::chat::{ChatAgentChunk, ChatAgentRequest, ChatAgentResponse};
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde_json::json;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Server-sent events body fed from a channel
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

struct EventFormatter;

impl EventFormatter {
    fn format_chunk(chunk: &ChatAgentChunk) -> String {
        match serde_json::to_string(chunk) {
            Ok(data) => format!("data: {}\n\n", data),
            Err(e) => Self::format_error(&e.to_string()),
        }
    }

    fn format_error(message: &str) -> String {
        format!("event: error\ndata: {}\n\n", json!({ "error": message }))
    }

    fn format_done() -> String {
        "data: [DONE]\n\n".to_string()
    }
}

async fn invocations(
    State(state): State<AppState>,
    Json(request): Json<ChatAgentRequest>,
) -> Result<Json<ChatAgentResponse>, AppError> {
    let response = state.agent.predict(&request).await?;
    Ok(Json(response))
}

async fn invocations_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatAgentRequest>,
) -> SseResponse {
    let (tx, rx) = mpsc::channel(100);
    let agent = state.agent.clone();

    tokio::spawn(async move {
        let mut stream = agent.predict_stream(request);

        while let Some(chunk) = stream.next().await {
            let event = match chunk {
                Ok(chunk) => EventFormatter::format_chunk(&chunk),
                Err(e) => {
                    let message = format!("{:#}", e);
                    tracing::error!("Error processing turn: {}", message);
                    let _ = tx.send(EventFormatter::format_error(&message)).await;
                    return;
                }
            };
            if tx.send(event).await.is_err() {
                tracing::debug!("client disconnected before the turn finished");
                return;
            }
        }

        let _ = tx.send(EventFormatter::format_done()).await;
    });

    SseResponse::new(ReceiverStream::new(rx))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/invocations", post(invocations))
        .route("/invocations/stream", post(invocations_stream))
        .with_state(state)
}
