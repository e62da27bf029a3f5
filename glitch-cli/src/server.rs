//! # Broadcast Web Server
//!
//! | Path | Description |
//! |------|-------------|
//! | `/all.mp3` | Live stream, starting near the newest chunk |
//! | `/status.json` | Render watermark and track history |
//! | `/log.json` | Recent log lines |

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use log::{debug, info};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use glitch_lib::broadcast::{ChunkRing, Delivery, ListenerCursor};
use glitch_lib::status::StreamStatus;

use crate::logging::{self, LogBuffer};

/// Shared state passed to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub ring: Arc<ChunkRing>,
    pub status: Arc<StreamStatus>,
    pub log: LogBuffer,
    /// Chunks behind the frontier a new listener starts at.
    pub listener_lead: u64,
    pub poll_interval: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/all.mp3", get(handle_audio_stream))
        .route("/status.json", get(handle_status))
        .route("/log.json", get(handle_log))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Streams chunks to one listener until it falls behind or the stream ends.
async fn handle_audio_stream(State(state): State<AppState>) -> Response {
    let cursor = state.ring.listener(state.listener_lead);
    info!("Listener joined at chunk {}", cursor.position());

    let stream = futures::stream::unfold((cursor, state), |(mut cursor, state)| async move {
        let bytes = next_chunk(&mut cursor, &state).await?;
        Some((Ok::<Bytes, std::io::Error>(bytes), (cursor, state)))
    });

    let body = Body::from_stream(stream);
    ([(header::CONTENT_TYPE, "audio/mpeg")], body).into_response()
}

async fn next_chunk(cursor: &mut ListenerCursor, state: &AppState) -> Option<Bytes> {
    loop {
        match cursor.poll(&state.ring) {
            Delivery::Chunk(bytes) => {
                debug!("Sending chunk {} ({} bytes)", cursor.position() - 1, bytes.len());
                return Some(bytes);
            }
            Delivery::Wait => tokio::time::sleep(state.poll_interval).await,
            Delivery::Evicted => {
                info!("Listener fell behind at chunk {}, disconnecting", cursor.position());
                return None;
            }
            Delivery::Closed => {
                info!("Stream ended, disconnecting listener");
                return None;
            }
        }
    }
}

async fn handle_status(State(state): State<AppState>) -> Response {
    let snapshot = state.status.snapshot();
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(serde_json::json!({
            "ts": snapshot.ts,
            "render_time": snapshot.render_time,
            "tracks": snapshot.tracks,
            "recent": snapshot.recent,
        })),
    )
        .into_response()
}

async fn handle_log(State(state): State<AppState>) -> Response {
    Json(logging::snapshot(&state.log)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn state(ring: Arc<ChunkRing>) -> AppState {
        AppState {
            ring,
            status: Arc::new(StreamStatus::new(4)),
            log: Arc::new(Mutex::new(VecDeque::new())),
            listener_lead: 1,
            poll_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn listener_receives_chunks_until_close() {
        let ring = Arc::new(ChunkRing::new(4));
        ring.append(Bytes::from_static(b"one"));
        let state = state(ring.clone());
        let mut cursor = ring.listener(1);

        assert_eq!(next_chunk(&mut cursor, &state).await.unwrap(), "one");

        let producer = ring.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.append(Bytes::from_static(b"two"));
            producer.close();
        });
        assert_eq!(next_chunk(&mut cursor, &state).await.unwrap(), "two");
        assert!(next_chunk(&mut cursor, &state).await.is_none());
    }

    #[tokio::test]
    async fn lagging_listener_is_dropped() {
        let ring = Arc::new(ChunkRing::new(2));
        let state = state(ring.clone());
        let mut cursor = ring.listener(0);
        for _ in 0..3 {
            ring.append(Bytes::from_static(b"x"));
        }
        assert!(next_chunk(&mut cursor, &state).await.is_none());
    }
}
