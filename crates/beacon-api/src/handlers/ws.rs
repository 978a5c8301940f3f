//! WebSocket upgrade handler.
//!
//! Maps socket lifecycle onto presence engine events: the upgrade registers
//! the identity and opens a connection; a client Close frame is an
//! intentional close; stream errors, EOF and heartbeat timeouts are
//! transient.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use beacon_core::types::{CloseReason, Identity, LocationHint};
use beacon_realtime::message::serializer::serialize_outbound;
use beacon_realtime::message::validator::{ValidatedInbound, parse_inbound};
use beacon_realtime::{OutboundMessage, VerifyOutcome};

use crate::dto::request::WsQuery;
use crate::error::ApiError;
use crate::state::AppState;
use crate::transport::{Connection, HeartbeatConfig, run_heartbeat};

/// GET /ws?identity={name}&country=..&region=.. — WebSocket upgrade
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let identity = Identity::parse(query.identity)?;
    let location = LocationHint::from_parts(query.country, query.region);
    state.engine.register(identity.clone(), location).await?;

    let max_message_size = state.config.realtime.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(state, identity, socket)))
}

/// Handles an established WebSocket connection.
async fn handle_socket(state: AppState, identity: Identity, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (conn, mut outbound_rx) = state
        .connections
        .register(identity.clone(), state.config.realtime.channel_buffer_size);
    let handle = conn.id;

    info!(conn_id = %handle, identity = %identity, "WebSocket connection established");

    if let Err(e) = state.engine.connection_opened(identity.clone(), handle).await {
        error!(conn_id = %handle, error = %e, "Presence engine unavailable, dropping connection");
        state.connections.remove(&handle);
        return;
    }

    // Outbound forwarder: ends once every sender is dropped, after draining.
    let forwarder = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match serialize_outbound(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!(kind = msg.kind(), error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(&conn),
        HeartbeatConfig::from(&state.config.realtime),
    ));

    let reason = loop {
        tokio::select! {
            _ = conn.closed() => {
                break conn.close_reason().unwrap_or(CloseReason::Transient);
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    conn.touch().await;
                    dispatch(&state, &conn, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) => break CloseReason::Intentional,
                Some(Ok(_)) => conn.touch().await,
                Some(Err(e)) => {
                    warn!(conn_id = %handle, error = %e, "WebSocket error");
                    break CloseReason::Transient;
                }
                None => break CloseReason::Transient,
            }
        }
    };

    conn.close(reason);
    state.connections.remove(&handle);
    if let Err(e) = state
        .engine
        .connection_closed(identity.clone(), handle, reason)
        .await
    {
        warn!(conn_id = %handle, error = %e, "Could not report connection close");
    }

    let _ = heartbeat.await;
    drop(conn);
    let _ = forwarder.await;

    info!(
        conn_id = %handle,
        identity = %identity,
        reason = reason.as_str(),
        "WebSocket connection closed"
    );
}

/// Route one inbound text frame.
async fn dispatch(state: &AppState, conn: &Arc<Connection>, raw: &str) {
    let frame = match parse_inbound(raw, state.config.realtime.max_message_size) {
        Ok(frame) => frame,
        Err(e) => {
            state.engine.record_rejected();
            debug!(conn_id = %conn.id, error = %e, "Rejected inbound frame");
            conn.send(OutboundMessage::error("INVALID_MESSAGE", e.message));
            return;
        }
    };

    let engine = &state.engine;
    let identity = conn.identity.clone();
    let result = match frame {
        ValidatedInbound::Heartbeat => engine.liveness(identity, Some(conn.id)).await,
        ValidatedInbound::Verify(target) => {
            // Verification waits on a transport probe; keep reading meanwhile.
            let engine = engine.clone();
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                let reply = match engine.verify_one(target.clone()).await {
                    Ok(VerifyOutcome::Found(status)) => OutboundMessage::PresenceStatus {
                        identity: status.identity,
                        online: status.online,
                        last_seen: status.last_seen,
                    },
                    Ok(VerifyOutcome::NotFound) => OutboundMessage::IdentityNotFound {
                        identity: target.to_string(),
                    },
                    Err(e) => OutboundMessage::error("VERIFY_FAILED", e.message),
                };
                conn.send(reply);
            });
            Ok(())
        }
        ValidatedInbound::VerifyBatch(identities) => engine
            .verify_many(identities, Some(identity))
            .await
            .map(|_| ()),
        ValidatedInbound::GoingOffline => engine.mark_offline(identity).await.map(|_| ()),
        ValidatedInbound::Send {
            event_type,
            to,
            payload,
        } => {
            engine
                .outbound_event(identity, conn.id, event_type, to, payload)
                .await
        }
    };

    if let Err(e) = result {
        warn!(conn_id = %conn.id, error = %e, "Inbound frame could not be processed");
        conn.send(OutboundMessage::error(e.kind.to_string(), e.message));
    }
}
