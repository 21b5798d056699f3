//! Gate.io v4 현물/USDT 선물 플러그인.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit};
use candles_exchange::adapters::gate_io::{GateIoAdapter, GateIoKind, GATE_IO_INTERVALS};
use candles_exchange::common::fmt_num;
use candles_exchange::{CandleAdapter, TradingPairFormatter};
use chrono::Utc;
use serde_json::{json, Value};

use crate::plugin::{
    canonical_interval, canonical_separated, parse_limit, parse_time, CandlesQuery,
    ErrorResponse, ExchangePlugin, RateLimits, RestRequest, RestRoute, RouteHandler,
    SubscriptionAction, WsStream, WsSubscription,
};

/// Gate.io 모의 플러그인.
#[derive(Debug)]
pub struct GateIoPlugin {
    adapter: GateIoAdapter,
}

impl GateIoPlugin {
    pub fn new(adapter: GateIoAdapter) -> Self {
        Self { adapter }
    }

    pub fn spot() -> Self {
        Self::new(GateIoAdapter::spot())
    }

    pub fn perpetual() -> Self {
        Self::new(GateIoAdapter::perpetual())
    }

    fn error(label: &str, message: &str) -> ErrorResponse {
        ErrorResponse::bad_request(json!({ "label": label, "message": message }))
    }

    fn is_spot(&self) -> bool {
        self.adapter.market().kind == GateIoKind::Spot
    }

    fn pong_channel(&self) -> &'static str {
        match self.adapter.market().kind {
            GateIoKind::Spot => "spot.pong",
            GateIoKind::Futures => "futures.pong",
        }
    }

    fn futures_object(candle: &CandleData) -> Value {
        json!({
            "t": candle.timestamp,
            "v": candle.volume,
            "c": fmt_num(candle.close),
            "h": fmt_num(candle.high),
            "l": fmt_num(candle.low),
            "o": fmt_num(candle.open),
            "sum": fmt_num(candle.quote_asset_volume),
        })
    }

    fn series_name(&self, trading_pair: &str, interval: &str) -> String {
        format!(
            "{}_{}",
            GATE_IO_INTERVALS.token_or_passthrough(interval),
            self.adapter.get_trading_pair_format(trading_pair)
        )
    }
}

impl ExchangePlugin for GateIoPlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        let info_path = if self.is_spot() {
            "/api/v4/spot/currency_pairs"
        } else {
            "/api/v4/futures/usdt/contracts"
        };
        vec![
            RestRoute::get(self.adapter.market().rest_path, RouteHandler::Candles),
            RestRoute::get("/api/v4/spot/time", RouteHandler::Time),
            RestRoute::get(info_path, RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        _trading_pair: &str,
        _interval: &str,
    ) -> Value {
        let last = candles.len().saturating_sub(1);
        let rows = candles.iter().enumerate().map(|(index, c)| {
            if self.is_spot() {
                // [t, quoteVol, close, high, low, open, baseVol, closed]
                json!([
                    c.timestamp.to_string(),
                    fmt_num(c.quote_asset_volume),
                    fmt_num(c.close),
                    fmt_num(c.high),
                    fmt_num(c.low),
                    fmt_num(c.open),
                    fmt_num(c.volume),
                    (index < last).to_string(),
                ])
            } else {
                Self::futures_object(c)
            }
        });
        Value::Array(rows.collect())
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        is_final: bool,
    ) -> Value {
        let now = Utc::now();
        let name = self.series_name(trading_pair, interval);
        let result = if self.is_spot() {
            json!({
                "t": candle.timestamp.to_string(),
                "v": fmt_num(candle.quote_asset_volume),
                "c": fmt_num(candle.close),
                "h": fmt_num(candle.high),
                "l": fmt_num(candle.low),
                "o": fmt_num(candle.open),
                "n": name,
                "a": fmt_num(candle.volume),
                "w": is_final,
            })
        } else {
            let mut object = Self::futures_object(candle);
            object["n"] = json!(name);
            json!([object])
        };
        json!({
            "time": now.timestamp(),
            "time_ms": now.timestamp_millis(),
            "channel": self.adapter.market().channel,
            "event": "update",
            "result": result,
        })
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        if message.get("channel")?.as_str()? != self.adapter.market().channel {
            return None;
        }
        let action = match message.get("event")?.as_str()? {
            "subscribe" => SubscriptionAction::Subscribe,
            "unsubscribe" => SubscriptionAction::Unsubscribe,
            _ => return None,
        };
        // payload: [interval, currency_pair]
        let payload = message.get("payload")?.as_array()?;
        let token = payload.first()?.as_str()?;
        let symbol = payload.get(1)?.as_str()?;
        let streams = match (
            canonical_separated(symbol, '_'),
            canonical_interval(&GATE_IO_INTERVALS, token),
        ) {
            (Some(pair), Some(interval)) => vec![WsStream::new(pair, interval)],
            _ => Vec::new(),
        };
        Some(WsSubscription { action, streams })
    }

    fn create_ws_subscription_success(
        &self,
        message: &Value,
        _subscription: &WsSubscription,
    ) -> Value {
        json!({
            "time": Utc::now().timestamp(),
            "channel": self.adapter.market().channel,
            "event": message.get("event").cloned().unwrap_or(json!("subscribe")),
            "result": { "status": "success" },
        })
    }

    fn create_ws_pong(&self, message: &Value) -> Option<Value> {
        if message.get("channel").and_then(Value::as_str) != Some(self.adapter.market().ping_channel)
        {
            return None;
        }
        Some(json!({
            "time": Utc::now().timestamp(),
            "channel": self.pong_channel(),
            "event": "",
            "result": null,
        }))
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        Some(json!({
            "time": Utc::now().timestamp(),
            "channel": message.get("channel").cloned().unwrap_or(json!("")),
            "event": message.get("event").cloned().unwrap_or(json!("")),
            "error": { "code": 2, "message": "unknown channel or event" },
            "result": null,
        }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let symbol_param = self.adapter.market().symbol_param;
        let symbol = request.param(symbol_param).ok_or_else(|| {
            Self::error(
                "MISSING_REQUIRED_PARAM",
                &format!("Missing required parameter: {}", symbol_param),
            )
        })?;
        let trading_pair = canonical_separated(symbol, '_').ok_or_else(|| {
            Self::error(
                "INVALID_CURRENCY_PAIR",
                &format!("Invalid currency pair {}", symbol),
            )
        })?;
        let interval = canonical_interval(&GATE_IO_INTERVALS, request.param("interval").unwrap_or("30m"))
            .ok_or_else(|| Self::error("INVALID_PARAM_VALUE", "Invalid interval"))?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        if let Some(from) = request.param("from") {
            query.start_time = Some(
                parse_time(from, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::error("INVALID_PARAM_VALUE", "Invalid from"))?,
            );
        }
        if let Some(to) = request.param("to") {
            query.end_time = Some(
                parse_time(to, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::error("INVALID_PARAM_VALUE", "Invalid to"))?,
            );
        }

        let max = self.adapter.market().max_limit as usize;
        query.limit = match request.param("limit") {
            Some(_) if query.start_time.is_some() && query.end_time.is_some() => {
                return Err(Self::error(
                    "INVALID_PARAM_VALUE",
                    "limit can not be used together with from and to",
                ));
            }
            Some(limit) => Some(
                parse_limit(limit)
                    .ok_or_else(|| Self::error("INVALID_PARAM_VALUE", "Invalid limit"))?
                    .clamp(1, max),
            ),
            None => Some(max.min(100)),
        };
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "label": "TOO_MANY_REQUESTS", "message": "Request Rate limit Exceeded" }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 900,
            ws_messages_per_second: 10,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        json!({ "server_time": now_ms })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let pairs: Vec<Value> = trading_pairs
            .iter()
            .map(|pair| {
                let (base, quote) = pair.split_once('-').unwrap_or((pair.as_str(), ""));
                let id = self.adapter.get_trading_pair_format(pair);
                if self.is_spot() {
                    json!({ "id": id, "base": base, "quote": quote, "trade_status": "tradable" })
                } else {
                    json!({ "name": id, "type": "direct", "in_delisting": false })
                }
            })
            .collect();
        Value::Array(pairs)
    }
}
