//! HTTP and WebSocket endpoints
//!
//! `/` serves the single-page UI, `/ws` upgrades to the JSON protocol.

use crate::context::WebContext;
use crate::error::{Result, UiError};
use crate::messages::ServerMessage;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

pub fn router(ctx: WebContext) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/ws", get(ws_upgrade))
        .with_state(ctx)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, ctx: WebContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| UiError::Bind { addr, source })?;
    info!(%addr, "Web UI listening");
    serve_listener(listener, ctx, shutdown).await
}

pub async fn serve_listener<F>(listener: TcpListener, ctx: WebContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(UiError::Server)?;
    info!("Web UI stopped");
    Ok(())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(ctx): State<WebContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(socket, ctx))
}

async fn client_session(socket: WebSocket, ctx: WebContext) {
    let hub = ctx.hub().clone();
    let (id, mut queues) = hub.register();
    info!(client = id, "UI client connected");

    match serde_json::to_string(&ServerMessage::welcome()) {
        Ok(frame) => {
            hub.send_to(id, frame);
        }
        Err(e) => warn!(error = %e, "Failed to encode welcome"),
    }

    let (mut sink, mut stream) = socket.split();

    // Structural frames go out ahead of queued value updates
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                Some(frame) = queues.reliable.recv() => frame,
                Some(frame) = queues.fast.recv() => frame,
                else => break,
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => ctx.handle_text(id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client = id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    hub.unregister(id);
    writer.abort();
    info!(client = id, "UI client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use faderlink_core::domain::{AssignmentStore, AudioTargetRegistry, Configuration};
    use faderlink_core::testing::{FakeAudioServer, NullPersistence};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn context() -> WebContext {
        let registry = Arc::new(AudioTargetRegistry::new(Arc::new(FakeAudioServer::new())));
        let store = Arc::new(AssignmentStore::new(
            Configuration::default_scaffold(),
            Arc::new(NullPersistence),
            AssignmentStore::DEFAULT_DEBOUNCE,
        ));
        WebContext::new(store, registry)
    }

    #[tokio::test]
    async fn test_index_page_is_served() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_listener(listener, context(), async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("faderlink"));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[test]
    fn test_page_gives_up_reconnecting() {
        assert!(INDEX_HTML.contains("const MAX_RECONNECTS = 10;"));
        assert!(INDEX_HTML.contains("reconnects >= MAX_RECONNECTS"));
        assert!(INDEX_HTML.contains("'setDefaultOutput'"));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let err = serve(addr, context(), async {}).await.unwrap_err();
        assert!(matches!(err, UiError::Bind { .. }));
    }
}
