//! OKX v5 현물/스왑 플러그인.
//!
//! WebSocket ping/pong은 JSON이 아닌 일반 텍스트 `ping`/`pong` 입니다.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit, TradingPair};
use candles_exchange::adapters::okx::{OkxAdapter, OKX_INTERVALS, OKX_MAX_LIMIT};
use candles_exchange::common::fmt_num;
use candles_exchange::{CandleAdapter, TradingPairFormatter};
use serde_json::{json, Value};

use crate::plugin::{
    canonical_interval, parse_limit, parse_time, CandlesQuery, ErrorResponse, ExchangePlugin,
    RateLimits, RestRequest, RestRoute, RouteHandler, SubscriptionAction, WsStream,
    WsSubscription,
};

/// OKX 모의 플러그인.
#[derive(Debug)]
pub struct OkxPlugin {
    adapter: OkxAdapter,
}

impl OkxPlugin {
    pub fn new(adapter: OkxAdapter) -> Self {
        Self { adapter }
    }

    pub fn spot() -> Self {
        Self::new(OkxAdapter::spot())
    }

    pub fn perpetual() -> Self {
        Self::new(OkxAdapter::perpetual())
    }

    fn error(code: &str, msg: &str) -> ErrorResponse {
        ErrorResponse::bad_request(json!({ "code": code, "msg": msg, "data": [] }))
    }

    /// `BTC-USDT-SWAP` -> `BTC-USDT`
    fn canonical_inst_id(&self, inst_id: &str) -> Option<String> {
        let suffix = self.adapter.market().inst_suffix;
        let pair = inst_id.strip_suffix(suffix).unwrap_or(inst_id);
        TradingPair::parse(pair).ok().map(|p| p.to_string())
    }

    fn row(candle: &CandleData, confirm: bool) -> Value {
        // [ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]
        json!([
            candle.timestamp_ms().to_string(),
            fmt_num(candle.open),
            fmt_num(candle.high),
            fmt_num(candle.low),
            fmt_num(candle.close),
            fmt_num(candle.volume),
            fmt_num(candle.quote_asset_volume),
            fmt_num(candle.quote_asset_volume),
            if confirm { "1" } else { "0" },
        ])
    }

    fn parse_arg(&self, arg: &Value) -> Option<WsStream> {
        let token = arg.get("channel")?.as_str()?.strip_prefix("candle")?;
        Some(WsStream::new(
            self.canonical_inst_id(arg.get("instId")?.as_str()?)?,
            canonical_interval(&OKX_INTERVALS, token)?,
        ))
    }
}

impl ExchangePlugin for OkxPlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        vec![
            RestRoute::get("/api/v5/market/candles", RouteHandler::Candles),
            RestRoute::get("/api/v5/market/history-candles", RouteHandler::Candles),
            RestRoute::get("/api/v5/public/time", RouteHandler::Time),
            RestRoute::get("/api/v5/public/instruments", RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        _trading_pair: &str,
        _interval: &str,
    ) -> Value {
        // 최신 봉이 먼저, 가장 최신 봉만 미확정
        let data: Vec<Value> = candles
            .iter()
            .rev()
            .enumerate()
            .map(|(index, c)| Self::row(c, index > 0))
            .collect();
        json!({ "code": "0", "msg": "", "data": data })
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        is_final: bool,
    ) -> Value {
        json!({
            "arg": {
                "channel": OkxAdapter::channel(interval),
                "instId": self.adapter.get_trading_pair_format(trading_pair),
            },
            "data": [Self::row(candle, is_final)],
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
            .filter_map(|arg| self.parse_arg(arg))
            .collect();
        Some(WsSubscription { action, streams })
    }

    /// OKX는 인자마다 이벤트를 보내지만 모의 서버는 첫 인자에 대해서만 응답합니다.
    fn create_ws_subscription_success(
        &self,
        message: &Value,
        _subscription: &WsSubscription,
    ) -> Value {
        let arg = message
            .get("args")
            .and_then(Value::as_array)
            .and_then(|args| args.first())
            .cloned()
            .unwrap_or(Value::Null);
        json!({
            "event": message.get("op").cloned().unwrap_or(Value::Null),
            "arg": arg,
            "connId": "mock",
        })
    }

    fn create_ws_pong(&self, message: &Value) -> Option<Value> {
        (message.as_str() == Some("ping")).then(|| Value::String("pong".to_string()))
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        let detail = match message.get("op") {
            Some(op) => format!("Invalid request: {{\"op\": {}}}", op),
            None => "Invalid request".to_string(),
        };
        Some(json!({
            "event": "error",
            "code": "60012",
            "msg": detail,
            "connId": "mock",
        }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let inst_id = request
            .param("instId")
            .ok_or_else(|| Self::error("50014", "Parameter instId can not be empty"))?;
        let trading_pair = self
            .canonical_inst_id(inst_id)
            .ok_or_else(|| Self::error("51001", "Instrument ID does not exist"))?;
        // bar 기본값은 1m
        let interval = canonical_interval(&OKX_INTERVALS, request.param("bar").unwrap_or("1m"))
            .ok_or_else(|| Self::error("51000", "Parameter bar error"))?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        if let Some(after) = request.param("after") {
            query.end_time = Some(
                parse_time(after, TimestampUnit::Milliseconds)
                    .ok_or_else(|| Self::error("51000", "Parameter after error"))?,
            );
        }
        if let Some(before) = request.param("before") {
            query.start_time = Some(
                parse_time(before, TimestampUnit::Milliseconds)
                    .ok_or_else(|| Self::error("51000", "Parameter before error"))?,
            );
        }
        query.limit = Some(match request.param("limit") {
            Some(limit) => parse_limit(limit)
                .ok_or_else(|| Self::error("51000", "Parameter limit error"))?
                .clamp(1, OKX_MAX_LIMIT as usize),
            None => 100,
        });
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "code": "50011",
                "msg": "Rate limit reached. Please refer to API documentation and throttle requests accordingly.",
                "data": [],
            }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 600,
            ws_messages_per_second: 3,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        json!({ "code": "0", "msg": "", "data": [{ "ts": now_ms.to_string() }] })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let data: Vec<Value> = trading_pairs
            .iter()
            .map(|pair| {
                let (base, quote) = pair.split_once('-').unwrap_or((pair.as_str(), ""));
                json!({
                    "instId": self.adapter.get_trading_pair_format(pair),
                    "baseCcy": base,
                    "quoteCcy": quote,
                    "state": "live",
                })
            })
            .collect();
        json!({ "code": "0", "msg": "", "data": data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_ping() {
        let plugin = OkxPlugin::spot();
        assert_eq!(plugin.create_ws_pong(&json!("ping")), Some(json!("pong")));
        assert!(plugin.create_ws_pong(&json!({"op": "ping"})).is_none());
    }

    #[test]
    fn test_swap_subscription() {
        let plugin = OkxPlugin::perpetual();
        let message = json!({
            "op": "subscribe",
            "args": [{"channel": "candle1H", "instId": "BTC-USDT-SWAP"}]
        });
        let sub = plugin.parse_ws_subscription(&message).unwrap();
        assert_eq!(sub.streams, vec![WsStream::new("BTC-USDT", "1h")]);

        let ack = plugin.create_ws_subscription_success(&message, &sub);
        assert_eq!(ack["event"], "subscribe");
        assert_eq!(ack["arg"]["instId"], "BTC-USDT-SWAP");
    }

    #[test]
    fn test_rest_bar_error() {
        let plugin = OkxPlugin::spot();
        let mut request = RestRequest::default();
        request.query.insert("instId".into(), "BTC-USDT".into());
        request.query.insert("bar".into(), "7x".into());
        let err = plugin.parse_rest_candles_params(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err.body,
            json!({"code": "51000", "msg": "Parameter bar error", "data": []})
        );
    }

    #[test]
    fn test_rest_time_window() {
        let plugin = OkxPlugin::spot();
        let mut request = RestRequest::default();
        request.query.insert("instId".into(), "BTC-USDT".into());
        request.query.insert("bar".into(), "1H".into());
        request.query.insert("after".into(), "1672534800000".into());
        request.query.insert("before".into(), "1672531200000".into());
        let query = plugin.parse_rest_candles_params(&request).unwrap();
        assert_eq!(query.start_time, Some(1672531200));
        assert_eq!(query.end_time, Some(1672534800));
    }
}
