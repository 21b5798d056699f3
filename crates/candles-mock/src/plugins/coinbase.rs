//! Coinbase Advanced Trade 현물 플러그인.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit, TradingPair};
use candles_exchange::adapters::coinbase::{
    CoinbaseAdvancedTradeAdapter, COINBASE_CANDLES_PATH, COINBASE_INTERVALS, COINBASE_MAX_LIMIT,
};
use candles_exchange::common::fmt_num;
use candles_exchange::CandleAdapter;
use chrono::{SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};

use crate::plugin::{
    canonical_interval, parse_limit, parse_time, CandlesQuery, ErrorResponse, ExchangePlugin,
    RateLimits, RestRequest, RestRoute, RouteHandler, SubscriptionAction, WsStream,
    WsSubscription,
};

/// WebSocket 캔들 채널의 고정 인터벌.
const WS_INTERVAL: &str = "5m";

/// Coinbase 모의 플러그인.
#[derive(Debug, Default)]
pub struct CoinbasePlugin {
    adapter: CoinbaseAdvancedTradeAdapter,
}

impl CoinbasePlugin {
    pub fn new() -> Self {
        Self {
            adapter: CoinbaseAdvancedTradeAdapter::new(),
        }
    }

    fn invalid_argument(message: &str) -> ErrorResponse {
        ErrorResponse::bad_request(json!({
            "error": "INVALID_ARGUMENT",
            "error_details": message,
            "message": message,
        }))
    }

    fn candle_object(candle: &CandleData) -> Value {
        json!({
            "start": candle.timestamp.to_string(),
            "low": fmt_num(candle.low),
            "high": fmt_num(candle.high),
            "open": fmt_num(candle.open),
            "close": fmt_num(candle.close),
            "volume": fmt_num(candle.volume),
        })
    }

    fn now_iso() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl ExchangePlugin for CoinbasePlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        vec![
            RestRoute::get(COINBASE_CANDLES_PATH, RouteHandler::Candles),
            RestRoute::get("/api/v3/brokerage/time", RouteHandler::Time),
            RestRoute::get("/api/v3/brokerage/market/products", RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        _trading_pair: &str,
        _interval: &str,
    ) -> Value {
        // 최신 봉이 먼저
        let list: Vec<Value> = candles.iter().rev().map(Self::candle_object).collect();
        json!({ "candles": list })
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        _interval: &str,
        _is_final: bool,
    ) -> Value {
        let mut object = Self::candle_object(candle);
        object["product_id"] = json!(trading_pair);
        json!({
            "channel": "candles",
            "client_id": "",
            "timestamp": Self::now_iso(),
            "sequence_num": 0,
            "events": [{ "type": "update", "candles": [object] }],
        })
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        let action = match message.get("type")?.as_str()? {
            "subscribe" => SubscriptionAction::Subscribe,
            "unsubscribe" => SubscriptionAction::Unsubscribe,
            _ => return None,
        };
        if message.get("channel")?.as_str()? != "candles" {
            return None;
        }
        let streams = message
            .get("product_ids")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|id| TradingPair::parse(id).ok())
            .map(|pair| WsStream::new(pair.to_string(), WS_INTERVAL))
            .collect();
        Some(WsSubscription { action, streams })
    }

    fn create_ws_subscription_success(
        &self,
        _message: &Value,
        subscription: &WsSubscription,
    ) -> Value {
        let product_ids: Vec<&str> = match subscription.action {
            SubscriptionAction::Subscribe => subscription
                .streams
                .iter()
                .map(|s| s.trading_pair.as_str())
                .collect(),
            SubscriptionAction::Unsubscribe => Vec::new(),
        };
        json!({
            "channel": "subscriptions",
            "client_id": "",
            "timestamp": Self::now_iso(),
            "sequence_num": 0,
            "events": [{ "subscriptions": { "candles": product_ids } }],
        })
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        // heartbeats 구독은 응답 없이 허용
        if message.get("channel").and_then(Value::as_str) == Some("heartbeats") {
            return None;
        }
        Some(json!({ "type": "error", "message": "Failure to subscribe" }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let trading_pair = request
            .path_param("product_id")
            .and_then(|id| TradingPair::parse(id).ok())
            .ok_or_else(|| {
                ErrorResponse::new(
                    StatusCode::NOT_FOUND,
                    json!({
                        "error": "NOT_FOUND",
                        "error_details": "ProductID is invalid",
                        "message": "ProductID is invalid",
                    }),
                )
            })?;
        let granularity = request
            .param("granularity")
            .ok_or_else(|| Self::invalid_argument("granularity is required"))?;
        let interval = canonical_interval(&COINBASE_INTERVALS, granularity)
            .ok_or_else(|| Self::invalid_argument("Granularity is invalid"))?;

        let mut query = CandlesQuery::new(trading_pair.to_string(), interval);
        if let Some(start) = request.param("start") {
            query.start_time = Some(
                parse_time(start, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::invalid_argument("start is invalid"))?,
            );
        }
        if let Some(end) = request.param("end") {
            query.end_time = Some(
                parse_time(end, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::invalid_argument("end is invalid"))?,
            );
        }
        let max = COINBASE_MAX_LIMIT as usize;
        query.limit = Some(match request.param("limit") {
            Some(limit) => parse_limit(limit)
                .ok_or_else(|| Self::invalid_argument("limit is invalid"))?
                .clamp(1, max),
            None => max,
        });
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "error": "RATE_LIMIT_EXCEEDED",
                "error_details": "Too many requests",
                "message": "Too many requests",
            }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 600,
            ws_messages_per_second: 8,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        let now = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .unwrap_or_else(Utc::now);
        json!({
            "iso": now.to_rfc3339_opts(SecondsFormat::Millis, true),
            "epochSeconds": now.timestamp().to_string(),
            "epochMillis": now.timestamp_millis().to_string(),
        })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let products: Vec<Value> = trading_pairs
            .iter()
            .filter_map(|pair| TradingPair::parse(pair).ok())
            .map(|pair| {
                json!({
                    "product_id": pair.to_string(),
                    "base_currency_id": pair.base,
                    "quote_currency_id": pair.quote,
                    "status": "online",
                })
            })
            .collect();
        json!({ "num_products": products.len(), "products": products })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_path_param() {
        let plugin = CoinbasePlugin::new();
        let mut request = RestRequest::default();
        request
            .path_params
            .insert("product_id".into(), "BTC-USD".into());
        request.query.insert("granularity".into(), "ONE_HOUR".into());
        request.query.insert("limit".into(), "1000".into());
        let query = plugin.parse_rest_candles_params(&request).unwrap();
        assert_eq!(query.trading_pair, "BTC-USD");
        assert_eq!(query.interval, "1h");
        assert_eq!(query.limit, Some(350));

        request.path_params.insert("product_id".into(), "BTCUSD".into());
        let err = plugin.parse_rest_candles_params(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_granularity_errors() {
        let plugin = CoinbasePlugin::new();
        let mut request = RestRequest::default();
        request
            .path_params
            .insert("product_id".into(), "BTC-USD".into());
        request.query.insert("granularity".into(), "TEN_MINUTE".into());
        let err = plugin.parse_rest_candles_params(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body["error"], "INVALID_ARGUMENT");
    }

    #[test]
    fn test_ws_channels() {
        let plugin = CoinbasePlugin::new();
        let message = json!({"type": "subscribe", "product_ids": ["ETH-USD"], "channel": "candles"});
        let sub = plugin.parse_ws_subscription(&message).unwrap();
        assert_eq!(sub.streams, vec![WsStream::new("ETH-USD", "5m")]);
        let ack = plugin.create_ws_subscription_success(&message, &sub);
        assert_eq!(ack["channel"], "subscriptions");

        let heartbeats = json!({"type": "subscribe", "product_ids": [], "channel": "heartbeats"});
        assert!(plugin.parse_ws_subscription(&heartbeats).is_none());
        assert!(plugin.create_ws_error(&heartbeats).is_none());

        let level2 = json!({"type": "subscribe", "product_ids": ["ETH-USD"], "channel": "level2"});
        assert_eq!(plugin.create_ws_error(&level2).unwrap()["type"], "error");
    }
}
