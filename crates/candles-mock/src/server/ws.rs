//! WebSocket 연결 처리.
//!
//! 연결마다 송신 태스크와 수신 태스크를 두고, 합성 태스크는 송신 채널로만 push 합니다.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AppState, Outbound};
use crate::plugin::{SubscriptionAction, WsSubscription};
use crate::rate_limit::MessageLimiter;

/// 연결별 송신 큐 크기.
const OUTBOUND_BUFFER: usize = 256;

/// WebSocket 업그레이드 핸들러.
pub(crate) async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    state.shared.register_connection(connection_id, tx.clone()).await;
    state.monitoring.ws_connected();
    info!(%connection_id, exchange = state.shared.plugin.id(), "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    if let Some(welcome) = state.shared.plugin.ws_welcome(&connection_id.to_string()) {
        if let Err(e) = sender.send(Message::Text(welcome.to_string().into())).await {
            debug!(%connection_id, "Failed to send welcome: {}", e);
        }
    }

    // 송신 태스크
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Message(value) => {
                    if sender.send(Message::Text(to_text(value).into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // 수신 태스크
    let recv_state = state.clone();
    let mut receive_task = tokio::spawn(async move {
        let plugin = recv_state.shared.plugin.clone();
        let mut limiter =
            MessageLimiter::from_settings(&plugin.rate_limits(), &recv_state.shared.config.rate_limit);

        while let Some(result) = receiver.next().await {
            let text = match result {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    debug!(%connection_id, "Close message received");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(%connection_id, "WebSocket receive error: {}", e);
                    break;
                }
            };

            if !limiter.allow() {
                warn!(%connection_id, "WebSocket message rate exceeded, dropping message");
                continue;
            }

            // 일반 텍스트(`ping`)는 JSON 문자열로 취급
            let message = serde_json::from_str::<Value>(text.as_str())
                .unwrap_or_else(|_| Value::String(text.as_str().to_string()));

            if !handle_client_message(&recv_state, connection_id, &message, &tx).await {
                break;
            }
        }
    });

    // 하나의 태스크가 종료되면 다른 것도 종료
    tokio::select! {
        _ = &mut send_task => {
            debug!(%connection_id, "Send task ended");
        }
        _ = &mut receive_task => {
            debug!(%connection_id, "Receive task ended");
        }
    }
    send_task.abort();
    receive_task.abort();

    state.shared.remove_connection(connection_id).await;
    state.monitoring.ws_disconnected();
    info!(%connection_id, "WebSocket disconnected");
}

/// 클라이언트 메시지 처리.
///
/// # Returns
///
/// `true`면 연결 유지, `false`면 송신 채널이 닫혀 종료
async fn handle_client_message(
    state: &AppState,
    connection_id: Uuid,
    message: &Value,
    tx: &mpsc::Sender<Outbound>,
) -> bool {
    let plugin = &state.shared.plugin;

    if let Some(subscription) = plugin.parse_ws_subscription(message) {
        apply_subscription(state, connection_id, &subscription).await;
        let ack = plugin.create_ws_subscription_success(message, &subscription);
        if tx.send(Outbound::Message(ack)).await.is_err() {
            return false;
        }
        if subscription.action == SubscriptionAction::Subscribe {
            return push_latest(state, &subscription, tx).await;
        }
        return true;
    }

    if let Some(pong) = plugin.create_ws_pong(message) {
        return tx.send(Outbound::Message(pong)).await.is_ok();
    }

    match plugin.create_ws_error(message) {
        Some(error) => {
            warn!(%connection_id, %message, "Unsupported WebSocket request");
            tx.send(Outbound::Message(error)).await.is_ok()
        }
        None => {
            debug!(%connection_id, %message, "Ignoring WebSocket message");
            true
        }
    }
}

async fn apply_subscription(state: &AppState, connection_id: Uuid, subscription: &WsSubscription) {
    let plugin = &state.shared.plugin;
    for stream in &subscription.streams {
        let key = plugin.create_ws_subscription_key(&stream.trading_pair, &stream.interval);
        match subscription.action {
            SubscriptionAction::Subscribe => {
                state
                    .shared
                    .ensure_requested(&stream.trading_pair, &stream.interval)
                    .await;
                state.shared.subscribe(key.clone(), connection_id).await;
                debug!(%connection_id, %key, "Subscribed");
            }
            SubscriptionAction::Unsubscribe => {
                state.shared.unsubscribe(&key, connection_id).await;
                debug!(%connection_id, %key, "Unsubscribed");
            }
        }
    }
}

/// 구독 직후 각 스트림의 최신 봉을 미마감 상태로 보냅니다.
async fn push_latest(
    state: &AppState,
    subscription: &WsSubscription,
    tx: &mpsc::Sender<Outbound>,
) -> bool {
    let plugin = &state.shared.plugin;
    for stream in &subscription.streams {
        let Some(candle) = state
            .shared
            .latest(&stream.trading_pair, &stream.interval)
            .await
        else {
            continue;
        };
        let message =
            plugin.format_ws_candle_message(&candle, &stream.trading_pair, &stream.interval, false);
        if tx.send(Outbound::Message(message)).await.is_err() {
            return false;
        }
        state.monitoring.record_pushed(1);
    }
    true
}

/// 문자열 값은 따옴표 없이 보냅니다 (OKX `pong`).
fn to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(json!("pong")), "pong");
        assert_eq!(to_text(json!({"op": "pong"})), r#"{"op":"pong"}"#);
    }
}
