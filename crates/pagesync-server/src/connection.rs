//! One WebSocket connection from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use pagesync_core::{codec, ClientMessage, ServerMessage, SessionId};
use pagesync_engine::{Engine, Outbound, Session};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn, Instrument};

use crate::client::ClientRegistry;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DECODE_ERRORS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Per-connection knobs taken from the server config.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionSettings {
    pub heartbeat_interval: Duration,
    pub dispatch_queue: usize,
    /// How long messages already read may keep dispatching after the socket closes.
    pub drain_timeout: Duration,
}

/// Run a connection: writer (outbound frames + ping), reader (decode +
/// pong tracking) and one dispatch task that processes this session's
/// messages strictly in arrival order.
///
/// Every message read before the socket closed is still dispatched, up to
/// `drain_timeout`; the session stays registered until that queue is empty.
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn handle_ws_connection(
    socket: WebSocket,
    session_id: SessionId,
    mut outbound_rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    engine: Arc<Engine>,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // The client learns its unicast identity before anything else.
    let _ = registry.send_to(
        &session_id,
        &ServerMessage::Connect {
            session_id: session_id.clone(),
        },
    );

    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(settings.heartbeat_interval);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    trace!("sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    }.in_current_span());

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<ClientMessage>(settings.dispatch_queue);

    let session = Arc::new(Session::new(session_id.clone()));
    let mut dispatcher = engine.dispatcher(Arc::clone(&session));
    let mut dispatch = tokio::spawn(async move {
        while let Some(message) = inbound_rx.recv().await {
            let outcome = dispatcher.handle(message).await;
            trace!(?outcome, "message dispatched");
        }
    }.in_current_span());

    let reader_id = session_id.clone();
    let reader_registry = Arc::clone(&registry);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                WsMessage::Text(text) => text.as_str().to_owned(),
                WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                        continue;
                    }
                },
                WsMessage::Pong(_) | WsMessage::Ping(_) => {
                    reader_registry.record_pong(&reader_id);
                    continue;
                }
                WsMessage::Close(_) => break,
            };
            reader_registry.record_pong(&reader_id);

            match codec::decode(&text) {
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "ignoring undecodable frame");
                    counter!(WS_DECODE_ERRORS_TOTAL, "error_type" => err.error_kind()).increment(1);
                }
            }
        }
    }.in_current_span());

    let writer_done = tokio::select! {
        _ = &mut writer => true,
        _ = &mut reader => false,
        () = shutdown.cancelled() => {
            debug!("closing connection for shutdown");
            false
        }
    };

    // Dropping the reader drops the queue sender, so the dispatch task ends
    // once it has handled everything already read.
    reader.abort();
    if tokio::time::timeout(settings.drain_timeout, &mut dispatch).await.is_err() {
        warn!(
            timeout_secs = settings.drain_timeout.as_secs_f64(),
            "dispatch queue not drained in time, aborting"
        );
        dispatch.abort();
    }

    let _ = registry.unregister(&session_id);
    // Unregistering drops the last sender, letting the writer flush and close.
    if !writer_done && tokio::time::timeout(Duration::from_secs(1), &mut writer).await.is_err() {
        writer.abort();
    }

    let age = session.age();
    info!(connected_secs = age.as_secs(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
}
