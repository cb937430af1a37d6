//! Local message port for the authorization window.
//!
//! The backend's OAuth callback page connects here over WebSocket and posts
//! its `{code, state, expires_in}` payload. The page's `Origin` handshake
//! header becomes the message origin, so the popup flow can vet it.

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::popup::WindowMessage;

/// Bind `addr` and forward posted messages until `cancel` fires.
pub async fn serve(
    addr: &str,
    messages: broadcast::Sender<WindowMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind callback listener on {}", addr))?;
    tracing::info!("Listening for authorization callbacks on {}", addr);
    run(listener, messages, cancel).await;
    Ok(())
}

async fn run(
    listener: TcpListener,
    messages: broadcast::Sender<WindowMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Callback connection from {}", peer);
                    let messages = messages.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, messages, cancel).await {
                            tracing::debug!("Callback connection ended: {:#}", e);
                        }
                    });
                }
                Err(e) => tracing::warn!("Callback accept failed: {}", e),
            },
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: broadcast::Sender<WindowMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut origin = String::new();
    let capture_origin = |req: &Request, resp: Response| {
        if let Some(value) = req.headers().get("origin").and_then(|v| v.to_str().ok()) {
            origin = value.to_string();
        }
        Ok::<_, ErrorResponse>(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, capture_origin)
        .await
        .context("WebSocket handshake failed")?;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = ws.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                Ok(data) => {
                    let _ = messages.send(WindowMessage {
                        origin: origin.clone(),
                        data,
                    });
                }
                Err(e) => tracing::debug!("Ignoring non-JSON callback message: {}", e),
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e).context("Callback socket error"),
        }
    }
    Ok(())
}
