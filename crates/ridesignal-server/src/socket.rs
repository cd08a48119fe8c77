//! WebSocket driver: one reader loop and one writer task per connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;

use crate::hub::Hub;
use crate::lifecycle;
use crate::router::EventRouter;

/// Drive one accepted socket until the client goes away, then tear it down.
///
/// The writer drains the outbound queue and sends periodic pings. It stops
/// when the queue is closed (liveness sweep, overflow under the
/// `disconnect` policy) or the socket write fails. The reader dispatches
/// text frames in arrival order. Whichever side ends first, the disconnect
/// sequence runs once.
pub async fn handle_ws_connection(socket: WebSocket, router: Arc<EventRouter>, heartbeat: Duration) {
    let hub = Arc::clone(router.hub());
    let (mut session, mut rx) = lifecycle::connect(&hub);
    let connection_id = session.id().clone();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if ws_tx.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = ws_tx.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_cid, "Sent ping");
                }
            }
        }
    });

    let reader = async {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    router.dispatch(&mut session, text.as_str()).await;
                }
                Ok(WsMessage::Binary(_)) => {
                    tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
                }
                Ok(WsMessage::Pong(_)) => hub.connections.record_pong(&connection_id),
                Ok(WsMessage::Close(_)) => break,
                Ok(WsMessage::Ping(_)) => {} // axum answers pings
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut writer => {},
        () = reader => {},
    }

    router.disconnect(&mut session);
    writer.abort();
}

/// Periodically close connections that stopped answering pings.
pub fn start_liveness_sweep(
    hub: Arc<Hub>,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = hub.connections.expire_silent(timeout);
            if !expired.is_empty() {
                tracing::info!(expired = expired.len(), "Liveness sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridesignal_settings::OverflowPolicy;

    #[tokio::test(start_paused = true)]
    async fn sweep_closes_silent_connections() {
        let hub = Arc::new(Hub::new(8, OverflowPolicy::DropOldest));
        let (session, mut rx) = lifecycle::connect(&hub);
        assert!(rx.try_recv().is_some());

        // A zero timeout treats every connection as silent.
        let sweep = start_liveness_sweep(Arc::clone(&hub), Duration::from_secs(1), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(rx.is_closed());
        assert!(rx.recv().await.is_none());
        // The registry entry stays until the driver runs the disconnect.
        assert!(hub.connections.contains(session.id()));
        sweep.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_responsive_connections() {
        let hub = Arc::new(Hub::new(8, OverflowPolicy::DropOldest));
        let (_session, rx) = lifecycle::connect(&hub);

        let sweep =
            start_liveness_sweep(Arc::clone(&hub), Duration::from_secs(1), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(!rx.is_closed());
        sweep.abort();
    }
}
