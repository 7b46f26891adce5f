use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use blocks_shared::protocol::{encode_heartbeat, ClientMsg};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::relay_loop::{unix_millis, RelayCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub relay_tx: mpsc::Sender<RelayCommand>,
    pub broadcast_tx: broadcast::Sender<Bytes>,
    pub heartbeat_interval: Duration,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    let remote_address = remote_address(&headers, addr);
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, remote_address))
}

/// First `X-Forwarded-For` entry if present, else the TCP peer's IP.
pub fn remote_address(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_canonical().to_string())
}

async fn handle_socket(socket: WebSocket, app_state: AppState, remote_address: String) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before joining so the USERS frame announcing us is not missed.
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    let (resp_tx, resp_rx) = oneshot::channel();
    let (evict_tx, mut evict_rx) = oneshot::channel();
    if app_state
        .relay_tx
        .send(RelayCommand::Join {
            remote_address: remote_address.clone(),
            evict: evict_tx,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return;
    }

    let key = match resp_rx.await {
        Ok(Ok(key)) => key,
        Ok(Err(err)) => {
            tracing::warn!(address = %remote_address, "Admitting as spectator: {}", err);
            spectate(sink, stream, broadcast_rx).await;
            tracing::info!(address = %remote_address, "Spectator disconnected");
            return;
        }
        Err(_) => {
            tracing::error!("Relay dropped the join response");
            return;
        }
    };

    tracing::info!(slot = key.slot, address = %remote_address, "Peer connected");

    // First tick fires immediately.
    let mut heartbeat = tokio::time::interval(app_state.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Client -> Relay
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(Message::Binary(data))) => ClientMsg::decode(&data),
                    // The protocol is binary only; text still counts as activity.
                    Some(Ok(Message::Text(_))) => ClientMsg::Unrecognized { tag: None },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue, // ping/pong
                };
                if app_state.relay_tx.send(RelayCommand::Frame { key, msg }).await.is_err() {
                    break;
                }
            }

            // Relay -> Client
            result = broadcast_rx.recv() => {
                match result {
                    Ok(frame) => {
                        if sink.send(Message::Binary(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Oldest frames were dropped; buffers are self-contained.
                        tracing::warn!(slot = key.slot, "Peer lagged by {} frames", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                let frame = encode_heartbeat(key.slot, unix_millis());
                if sink.send(Message::Binary(frame.into())).await.is_err() {
                    break;
                }
            }

            _ = &mut evict_rx => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let _ = app_state.relay_tx.send(RelayCommand::Leave { key }).await;
    tracing::info!(slot = key.slot, "Peer disconnected");
}

/// Forward broadcasts to a socket that did not get a room slot.
///
/// Spectators hold no slot and receive no heartbeat. Anything they send is
/// dropped and never reaches the relay, so the idle sweep cannot see them.
async fn spectate(
    mut sink: SplitSink<WebSocket, Message>,
    mut stream: SplitStream<WebSocket>,
    mut broadcast_rx: broadcast::Receiver<Bytes>,
) {
    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },

            result = broadcast_rx.recv() => match result {
                Ok(frame) => {
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn addr(text: &str) -> SocketAddr {
        text.parse().unwrap()
    }

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(remote_address(&headers, addr("127.0.0.1:5000")), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_peer_ip() {
        let headers = HeaderMap::new();
        assert_eq!(remote_address(&headers, addr("192.168.1.4:5000")), "192.168.1.4");
    }

    #[test]
    fn mapped_ipv6_is_reported_as_ipv4() {
        let headers = HeaderMap::new();
        assert_eq!(
            remote_address(&headers, addr("[::ffff:10.0.0.9]:5000")),
            "10.0.0.9"
        );
        assert_eq!(remote_address(&headers, addr("[::1]:5000")), "::1");
    }

    #[test]
    fn empty_forwarded_for_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(remote_address(&headers, addr("10.1.1.1:80")), "10.1.1.1");
    }
}
