//! Hyperliquid 현물/무기한 플러그인.
//!
//! 캔들 조회는 `POST /info` 한 곳으로 들어오고, 잘못된 본문은 422 일반 텍스트로 거절합니다.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit};
use candles_exchange::adapters::hyperliquid::{
    HyperliquidAdapter, HyperliquidCoinFormat, HYPERLIQUID_INTERVALS,
};
use candles_exchange::common::fmt_num;
use candles_exchange::{CandleAdapter, TradingPairFormatter};
use serde_json::{json, Value};

use crate::plugin::{
    canonical_interval, canonical_separated, interval_seconds, parse_time_value, CandlesQuery,
    ErrorResponse, ExchangePlugin, RateLimits, RestRequest, RestRoute, RouteHandler,
    SubscriptionAction, WsStream, WsSubscription,
};

/// 무기한 코인의 정산 자산.
const PERPETUAL_QUOTE: &str = "USD";

const DESERIALIZE_ERROR: &str = "Failed to deserialize the JSON body into the target type";

/// Hyperliquid 모의 플러그인.
#[derive(Debug)]
pub struct HyperliquidPlugin {
    adapter: HyperliquidAdapter,
}

impl HyperliquidPlugin {
    pub fn new(adapter: HyperliquidAdapter) -> Self {
        Self { adapter }
    }

    pub fn spot() -> Self {
        Self::new(HyperliquidAdapter::spot())
    }

    pub fn perpetual() -> Self {
        Self::new(HyperliquidAdapter::perpetual())
    }

    fn unprocessable() -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            Value::String(DESERIALIZE_ERROR.to_string()),
        )
    }

    /// `BTC` -> `BTC-USD`, `PURR/USDC` -> `PURR-USDC`
    fn canonical_coin(&self, coin: &str) -> Option<String> {
        match self.adapter.market().coin_format {
            HyperliquidCoinFormat::BaseOnly if !coin.is_empty() && !coin.contains('/') => {
                Some(format!("{}-{}", coin.to_uppercase(), PERPETUAL_QUOTE))
            }
            HyperliquidCoinFormat::BaseOnly => None,
            HyperliquidCoinFormat::Slash => canonical_separated(coin, '/'),
        }
    }

    fn candle_object(&self, candle: &CandleData, trading_pair: &str, interval: &str) -> Value {
        let close_ms = (candle.timestamp + interval_seconds(&HYPERLIQUID_INTERVALS, interval))
            * 1000
            - 1;
        json!({
            "t": candle.timestamp_ms(),
            "T": close_ms,
            "s": self.adapter.get_trading_pair_format(trading_pair),
            "i": HYPERLIQUID_INTERVALS.token_or_passthrough(interval),
            "o": fmt_num(candle.open),
            "c": fmt_num(candle.close),
            "h": fmt_num(candle.high),
            "l": fmt_num(candle.low),
            "v": fmt_num(candle.volume),
            "n": candle.n_trades,
        })
    }
}

impl ExchangePlugin for HyperliquidPlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        vec![RestRoute::post("/info", RouteHandler::Candles)]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        trading_pair: &str,
        interval: &str,
    ) -> Value {
        Value::Array(
            candles
                .iter()
                .map(|c| self.candle_object(c, trading_pair, interval))
                .collect(),
        )
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        _is_final: bool,
    ) -> Value {
        json!({
            "channel": "candle",
            "data": self.candle_object(candle, trading_pair, interval),
        })
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        let action = match message.get("method")?.as_str()? {
            "subscribe" => SubscriptionAction::Subscribe,
            "unsubscribe" => SubscriptionAction::Unsubscribe,
            _ => return None,
        };
        let subscription = message.get("subscription")?;
        if subscription.get("type")?.as_str()? != "candle" {
            return None;
        }
        let stream = self
            .canonical_coin(subscription.get("coin")?.as_str()?)
            .zip(canonical_interval(
                &HYPERLIQUID_INTERVALS,
                subscription.get("interval")?.as_str()?,
            ))
            .map(|(pair, interval)| WsStream::new(pair, interval));
        Some(WsSubscription {
            action,
            streams: stream.into_iter().collect(),
        })
    }

    fn create_ws_subscription_success(
        &self,
        message: &Value,
        _subscription: &WsSubscription,
    ) -> Value {
        json!({
            "channel": "subscriptionResponse",
            "data": {
                "method": message.get("method").cloned().unwrap_or(Value::Null),
                "subscription": message.get("subscription").cloned().unwrap_or(Value::Null),
            }
        })
    }

    fn create_ws_pong(&self, message: &Value) -> Option<Value> {
        (message.get("method").and_then(Value::as_str) == Some("ping"))
            .then(|| json!({ "channel": "pong" }))
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        Some(json!({
            "channel": "error",
            "data": format!("Error parsing JSON into valid websocket request: {}", message),
        }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let body = request.body.as_ref().ok_or_else(Self::unprocessable)?;
        if body.get("type").and_then(Value::as_str) != Some("candleSnapshot") {
            return Err(Self::unprocessable());
        }
        let req = body.get("req").ok_or_else(Self::unprocessable)?;
        let trading_pair = req
            .get("coin")
            .and_then(Value::as_str)
            .and_then(|coin| self.canonical_coin(coin))
            .ok_or_else(Self::unprocessable)?;
        let interval = req
            .get("interval")
            .and_then(Value::as_str)
            .and_then(|token| canonical_interval(&HYPERLIQUID_INTERVALS, token))
            .ok_or_else(Self::unprocessable)?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        // startTime 누락은 허용하고 최근 봉부터 반환
        if let Some(start) = req.get("startTime") {
            query.start_time = Some(
                parse_time_value(start, TimestampUnit::Milliseconds)
                    .ok_or_else(Self::unprocessable)?,
            );
        }
        if let Some(end) = req.get("endTime").filter(|v| !v.is_null()) {
            query.end_time = Some(
                parse_time_value(end, TimestampUnit::Milliseconds)
                    .ok_or_else(Self::unprocessable)?,
            );
        }
        query.limit = Some(5000);
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            Value::String("Too many requests".to_string()),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 1200,
            ws_messages_per_second: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(req: Value) -> RestRequest {
        RestRequest {
            body: Some(json!({ "type": "candleSnapshot", "req": req })),
            ..Default::default()
        }
    }

    #[test]
    fn test_coin_mapping() {
        assert_eq!(
            HyperliquidPlugin::perpetual().canonical_coin("BTC").as_deref(),
            Some("BTC-USD")
        );
        assert_eq!(
            HyperliquidPlugin::spot().canonical_coin("PURR/USDC").as_deref(),
            Some("PURR-USDC")
        );
        assert!(HyperliquidPlugin::spot().canonical_coin("PURR").is_none());
    }

    #[test]
    fn test_snapshot_body() {
        let plugin = HyperliquidPlugin::perpetual();
        let query = plugin
            .parse_rest_candles_params(&snapshot(json!({
                "coin": "ETH", "interval": "15m", "startTime": 1_700_000_000_000_i64
            })))
            .unwrap();
        assert_eq!(query.trading_pair, "ETH-USD");
        assert_eq!(query.interval, "15m");
        assert_eq!(query.start_time, Some(1_700_000_000));

        let missing_start = plugin
            .parse_rest_candles_params(&snapshot(json!({"coin": "ETH", "interval": "1m"})))
            .unwrap();
        assert_eq!(missing_start.start_time, None);
    }

    #[test]
    fn test_invalid_body_is_plain_text_422() {
        let plugin = HyperliquidPlugin::perpetual();
        let err = plugin
            .parse_rest_candles_params(&RestRequest {
                body: Some(json!({"type": "meta"})),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body, json!(DESERIALIZE_ERROR));

        let err = plugin
            .parse_rest_candles_params(&snapshot(json!({"coin": "ETH", "interval": "7x"})))
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_ws_subscription() {
        let plugin = HyperliquidPlugin::perpetual();
        let message = json!({
            "method": "subscribe",
            "subscription": {"type": "candle", "coin": "BTC", "interval": "1h"}
        });
        let sub = plugin.parse_ws_subscription(&message).unwrap();
        assert_eq!(sub.streams, vec![WsStream::new("BTC-USD", "1h")]);
        let ack = plugin.create_ws_subscription_success(&message, &sub);
        assert_eq!(ack["channel"], "subscriptionResponse");
        assert_eq!(
            plugin.create_ws_pong(&json!({"method": "ping"})),
            Some(json!({"channel": "pong"}))
        );
    }
}
