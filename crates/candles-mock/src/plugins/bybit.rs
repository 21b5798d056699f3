//! Bybit v5 현물/리니어 플러그인.
//!
//! Bybit은 파라미터 에러도 HTTP 200에 `retCode`로 알립니다.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit};
use candles_exchange::adapters::bybit::{BybitAdapter, BYBIT_INTERVALS, BYBIT_MAX_LIMIT};
use candles_exchange::common::fmt_num;
use candles_exchange::{CandleAdapter, TradingPairFormatter};
use chrono::Utc;
use serde_json::{json, Value};

use crate::plugin::{
    canonical_concatenated, canonical_interval, interval_seconds, parse_limit, parse_time,
    CandlesQuery, ErrorResponse, ExchangePlugin, RateLimits, RestRequest, RestRoute,
    RouteHandler, SubscriptionAction, WsStream, WsSubscription,
};

/// Bybit 모의 플러그인.
#[derive(Debug)]
pub struct BybitPlugin {
    adapter: BybitAdapter,
}

impl BybitPlugin {
    pub fn new(adapter: BybitAdapter) -> Self {
        Self { adapter }
    }

    pub fn spot() -> Self {
        Self::new(BybitAdapter::spot())
    }

    pub fn perpetual() -> Self {
        Self::new(BybitAdapter::perpetual())
    }

    fn error(message: &str) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::OK,
            json!({
                "retCode": 10001,
                "retMsg": message,
                "result": {},
                "retExtInfo": {},
                "time": Utc::now().timestamp_millis(),
            }),
        )
    }

    /// `kline.60.BTCUSDT` -> (BTC-USDT, 1h)
    fn parse_topic(topic: &str) -> Option<WsStream> {
        let mut parts = topic.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("kline"), Some(token), Some(symbol), None) => Some(WsStream::new(
                canonical_concatenated(symbol)?,
                canonical_interval(&BYBIT_INTERVALS, token)?,
            )),
            _ => None,
        }
    }
}

impl ExchangePlugin for BybitPlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        vec![
            RestRoute::get("/v5/market/kline", RouteHandler::Candles),
            RestRoute::get("/v5/market/time", RouteHandler::Time),
            RestRoute::get("/v5/market/instruments-info", RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        trading_pair: &str,
        _interval: &str,
    ) -> Value {
        // 최신 봉이 먼저
        let list: Vec<Value> = candles
            .iter()
            .rev()
            .map(|c| {
                json!([
                    c.timestamp_ms().to_string(),
                    fmt_num(c.open),
                    fmt_num(c.high),
                    fmt_num(c.low),
                    fmt_num(c.close),
                    fmt_num(c.volume),
                    fmt_num(c.quote_asset_volume),
                ])
            })
            .collect();
        json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": self.adapter.market().category,
                "symbol": self.adapter.get_trading_pair_format(trading_pair),
                "list": list,
            },
            "retExtInfo": {},
            "time": Utc::now().timestamp_millis(),
        })
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        is_final: bool,
    ) -> Value {
        let end = (candle.timestamp + interval_seconds(&BYBIT_INTERVALS, interval)) * 1000 - 1;
        let now = Utc::now().timestamp_millis();
        json!({
            "topic": self.adapter.topic(trading_pair, interval),
            "data": [{
                "start": candle.timestamp_ms(),
                "end": end,
                "interval": BYBIT_INTERVALS.token_or_passthrough(interval),
                "open": fmt_num(candle.open),
                "close": fmt_num(candle.close),
                "high": fmt_num(candle.high),
                "low": fmt_num(candle.low),
                "volume": fmt_num(candle.volume),
                "turnover": fmt_num(candle.quote_asset_volume),
                "confirm": is_final,
                "timestamp": now,
            }],
            "ts": now,
            "type": "snapshot",
        })
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        let action = match message.get("op")?.as_str()? {
            "subscribe" => SubscriptionAction::Subscribe,
            "unsubscribe" => SubscriptionAction::Unsubscribe,
            _ => return None,
        };
        let streams = message
            .get("args")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .filter_map(Self::parse_topic)
            .collect();
        Some(WsSubscription { action, streams })
    }

    fn create_ws_subscription_success(
        &self,
        message: &Value,
        _subscription: &WsSubscription,
    ) -> Value {
        json!({
            "success": true,
            "ret_msg": "",
            "conn_id": "mock",
            "req_id": message.get("req_id").cloned().unwrap_or(json!("")),
            "op": message.get("op").cloned().unwrap_or(Value::Null),
        })
    }

    fn create_ws_pong(&self, message: &Value) -> Option<Value> {
        if message.get("op").and_then(Value::as_str) != Some("ping") {
            return None;
        }
        Some(json!({
            "success": true,
            "ret_msg": "pong",
            "conn_id": "mock",
            "req_id": message.get("req_id").cloned().unwrap_or(json!("")),
            "op": "ping",
        }))
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        let op = message.get("op").cloned().unwrap_or(Value::Null);
        Some(json!({
            "success": false,
            "ret_msg": format!("Invalid op: {}", op),
            "conn_id": "mock",
            "op": op,
        }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let symbol = request
            .param("symbol")
            .ok_or_else(|| Self::error("params error: symbol invalid"))?;
        let interval = request
            .param("interval")
            .ok_or_else(|| Self::error("params error: interval invalid"))?;
        if let Some(category) = request.param("category") {
            if category != self.adapter.market().category {
                return Err(Self::error("params error: category invalid"));
            }
        }

        let trading_pair = canonical_concatenated(symbol)
            .ok_or_else(|| Self::error("params error: symbol invalid"))?;
        let interval = canonical_interval(&BYBIT_INTERVALS, interval)
            .ok_or_else(|| Self::error("params error: interval invalid"))?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        if let Some(start) = request.param("start") {
            query.start_time = Some(
                parse_time(start, TimestampUnit::Milliseconds)
                    .ok_or_else(|| Self::error("params error: start invalid"))?,
            );
        }
        if let Some(end) = request.param("end") {
            query.end_time = Some(
                parse_time(end, TimestampUnit::Milliseconds)
                    .ok_or_else(|| Self::error("params error: end invalid"))?,
            );
        }
        query.limit = Some(match request.param("limit") {
            Some(limit) => parse_limit(limit)
                .ok_or_else(|| Self::error("params error: limit invalid"))?
                .clamp(1, BYBIT_MAX_LIMIT as usize),
            None => 200,
        });
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::OK,
            json!({
                "retCode": 10006,
                "retMsg": "Too many visits!",
                "result": {},
                "retExtInfo": {},
                "time": Utc::now().timestamp_millis(),
            }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 600,
            ws_messages_per_second: 10,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "timeSecond": (now_ms / 1000).to_string(),
                "timeNano": (now_ms as i128 * 1_000_000).to_string(),
            },
            "retExtInfo": {},
            "time": now_ms,
        })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let list: Vec<Value> = trading_pairs
            .iter()
            .map(|pair| {
                let (base, quote) = pair.split_once('-').unwrap_or((pair.as_str(), ""));
                json!({
                    "symbol": self.adapter.get_trading_pair_format(pair),
                    "baseCoin": base,
                    "quoteCoin": quote,
                    "status": "Trading",
                })
            })
            .collect();
        json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": { "category": self.adapter.market().category, "list": list },
        })
    }
}
