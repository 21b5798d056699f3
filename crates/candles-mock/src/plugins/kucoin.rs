//! KuCoin 현물 플러그인.
//!
//! WebSocket 접속 전 토큰 발급(`POST /api/v1/bullet-public`)을 흉내내고,
//! 발급 응답의 엔드포인트로 모의 서버 자신의 WS 주소를 돌려줍니다.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit, TradingPair};
use candles_exchange::adapters::kucoin::{
    KucoinAdapter, KUCOIN_INTERVALS, KUCOIN_SUCCESS_CODE, KUCOIN_WS_TOKEN_PATH,
};
use candles_exchange::common::fmt_num;
use candles_exchange::CandleAdapter;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::plugin::{
    canonical_interval, parse_time, CandlesQuery, ErrorResponse, ExchangePlugin, RateLimits,
    RestRequest, RestRoute, RouteHandler, SubscriptionAction, WsStream, WsSubscription,
};

/// 한 번에 반환하는 최대 봉 수.
const KUCOIN_MAX_BARS: usize = 1500;

const TOPIC_PREFIX: &str = "/market/candles:";

/// KuCoin 모의 플러그인.
#[derive(Debug, Default)]
pub struct KucoinPlugin {
    adapter: KucoinAdapter,
}

impl KucoinPlugin {
    pub fn new() -> Self {
        Self {
            adapter: KucoinAdapter::new(),
        }
    }

    fn error(message: &str) -> ErrorResponse {
        ErrorResponse::bad_request(json!({ "code": "400100", "msg": message }))
    }

    fn id_of(message: &Value) -> Value {
        message.get("id").cloned().unwrap_or(Value::Null)
    }

    fn row(candle: &CandleData) -> Value {
        // [time, open, close, high, low, volume, turnover]
        json!([
            candle.timestamp.to_string(),
            fmt_num(candle.open),
            fmt_num(candle.close),
            fmt_num(candle.high),
            fmt_num(candle.low),
            fmt_num(candle.volume),
            fmt_num(candle.quote_asset_volume),
        ])
    }

    /// `/market/candles:BTC-USDT_1hour,ETH-USDT_1hour`
    fn parse_topic(topic: &str) -> Option<Vec<WsStream>> {
        let targets = topic.strip_prefix(TOPIC_PREFIX)?;
        Some(
            targets
                .split(',')
                .filter_map(|target| {
                    let (symbol, token) = target.trim().rsplit_once('_')?;
                    Some(WsStream::new(
                        TradingPair::parse(symbol).ok()?.to_string(),
                        canonical_interval(&KUCOIN_INTERVALS, token)?,
                    ))
                })
                .collect(),
        )
    }
}

impl ExchangePlugin for KucoinPlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        vec![
            RestRoute::get("/api/v1/market/candles", RouteHandler::Candles),
            RestRoute::post(KUCOIN_WS_TOKEN_PATH, RouteHandler::WsToken),
            RestRoute::get("/api/v1/timestamp", RouteHandler::Time),
            RestRoute::get("/api/v2/symbols", RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        _trading_pair: &str,
        _interval: &str,
    ) -> Value {
        // 최신 봉이 먼저
        let data: Vec<Value> = candles.iter().rev().map(Self::row).collect();
        json!({ "code": KUCOIN_SUCCESS_CODE, "data": data })
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        _is_final: bool,
    ) -> Value {
        let now_ns = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        json!({
            "type": "message",
            "topic": self.adapter.topic(trading_pair, interval),
            "subject": "trade.candles.update",
            "data": {
                "symbol": trading_pair,
                "candles": Self::row(candle),
                "time": now_ns,
            }
        })
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        let action = match message.get("type")?.as_str()? {
            "subscribe" => SubscriptionAction::Subscribe,
            "unsubscribe" => SubscriptionAction::Unsubscribe,
            _ => return None,
        };
        let streams = Self::parse_topic(message.get("topic")?.as_str()?)?;
        Some(WsSubscription { action, streams })
    }

    fn create_ws_subscription_success(
        &self,
        message: &Value,
        _subscription: &WsSubscription,
    ) -> Value {
        json!({ "id": Self::id_of(message), "type": "ack" })
    }

    fn create_ws_pong(&self, message: &Value) -> Option<Value> {
        (message.get("type").and_then(Value::as_str) == Some("ping"))
            .then(|| json!({ "id": Self::id_of(message), "type": "pong" }))
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        let topic = message.get("topic").and_then(Value::as_str).unwrap_or("");
        Some(json!({
            "id": Self::id_of(message),
            "type": "error",
            "code": 404,
            "data": format!("topic {} is not found", topic),
        }))
    }

    fn ws_welcome(&self, connection_id: &str) -> Option<Value> {
        Some(json!({ "id": connection_id, "type": "welcome" }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let symbol = request
            .param("symbol")
            .ok_or_else(|| Self::error("symbol is required"))?;
        let trading_pair = TradingPair::parse(symbol)
            .map_err(|_| Self::error("Unsupported trading pair."))?
            .to_string();
        let token = request
            .param("type")
            .ok_or_else(|| Self::error("type is required"))?;
        let interval = canonical_interval(&KUCOIN_INTERVALS, token)
            .ok_or_else(|| Self::error("Unsupported type."))?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        if let Some(start) = request.param("startAt").filter(|v| *v != "0") {
            query.start_time = Some(
                parse_time(start, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::error("startAt is invalid"))?,
            );
        }
        if let Some(end) = request.param("endAt").filter(|v| *v != "0") {
            query.end_time = Some(
                parse_time(end, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::error("endAt is invalid"))?,
            );
        }
        query.limit = Some(KUCOIN_MAX_BARS);
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "code": "429000", "msg": "Too Many Requests" }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 1800,
            ws_messages_per_second: 10,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        json!({ "code": KUCOIN_SUCCESS_CODE, "data": now_ms })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let data: Vec<Value> = trading_pairs
            .iter()
            .filter_map(|pair| TradingPair::parse(pair).ok())
            .map(|pair| {
                json!({
                    "symbol": pair.to_string(),
                    "baseCurrency": pair.base,
                    "quoteCurrency": pair.quote,
                    "enableTrading": true,
                })
            })
            .collect();
        json!({ "code": KUCOIN_SUCCESS_CODE, "data": data })
    }

    fn create_ws_token(&self, ws_endpoint: &str) -> Value {
        json!({
            "code": KUCOIN_SUCCESS_CODE,
            "data": {
                "token": format!("mock-token-{}", Uuid::new_v4().simple()),
                "instanceServers": [{
                    "endpoint": ws_endpoint,
                    "encrypt": false,
                    "protocol": "websocket",
                    "pingInterval": 18000,
                    "pingTimeout": 10000,
                }]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_topic_subscription() {
        let plugin = KucoinPlugin::new();
        let message = json!({
            "id": "7",
            "type": "subscribe",
            "topic": "/market/candles:BTC-USDT_1hour,ETH-USDT_1min",
            "response": true
        });
        let sub = plugin.parse_ws_subscription(&message).unwrap();
        assert_eq!(
            sub.streams,
            vec![WsStream::new("BTC-USDT", "1h"), WsStream::new("ETH-USDT", "1m")]
        );
        assert_eq!(
            plugin.create_ws_subscription_success(&message, &sub),
            json!({"id": "7", "type": "ack"})
        );
    }

    #[test]
    fn test_token_round_trips_through_adapter() {
        let plugin = KucoinPlugin::new();
        let body = plugin.create_ws_token("ws://127.0.0.1:9000/");
        let (endpoint, token) = KucoinAdapter::parse_ws_token(&body).unwrap();
        assert_eq!(endpoint, "ws://127.0.0.1:9000/");
        assert!(token.starts_with("mock-token-"));
    }

    #[test]
    fn test_welcome_ping_error() {
        let plugin = KucoinPlugin::new();
        assert_eq!(
            plugin.ws_welcome("abc"),
            Some(json!({"id": "abc", "type": "welcome"}))
        );
        assert_eq!(
            plugin.create_ws_pong(&json!({"id": "1", "type": "ping"})),
            Some(json!({"id": "1", "type": "pong"}))
        );
        let err = plugin
            .create_ws_error(&json!({"id": "2", "type": "subscribe", "topic": "/market/ticker:X"}))
            .unwrap();
        assert_eq!(err["code"], 404);
    }

    #[test]
    fn test_rest_errors() {
        let plugin = KucoinPlugin::new();
        let mut request = RestRequest::default();
        request.query.insert("symbol".into(), "BTCUSDT".into());
        request.query.insert("type".into(), "1hour".into());
        let err = plugin.parse_rest_candles_params(&request).unwrap_err();
        assert_eq!(err.body["code"], "400100");

        request.query.insert("symbol".into(), "BTC-USDT".into());
        let query = plugin.parse_rest_candles_params(&request).unwrap();
        assert_eq!(query.interval, "1h");
    }
}
