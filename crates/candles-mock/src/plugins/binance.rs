//! Binance 현물/무기한 플러그인.

use axum::http::StatusCode;
use candles_core::{CandleData, TimestampUnit, TradingPair};
use candles_exchange::adapters::binance::BinanceAdapter;
use candles_exchange::common::fmt_num;
use candles_exchange::{CandleAdapter, TradingPairFormatter};
use chrono::Utc;
use serde_json::{json, Value};

use crate::plugin::{
    canonical_concatenated, canonical_interval, interval_seconds, parse_limit, parse_time,
    CandlesQuery, ErrorResponse, ExchangePlugin, RateLimits, RestRequest, RestRoute,
    RouteHandler, WsStream, WsSubscription,
};

/// Binance 모의 플러그인.
#[derive(Debug)]
pub struct BinancePlugin {
    adapter: BinanceAdapter,
}

impl BinancePlugin {
    pub fn new(adapter: BinanceAdapter) -> Self {
        Self { adapter }
    }

    pub fn spot() -> Self {
        Self::new(BinanceAdapter::spot())
    }

    pub fn perpetual() -> Self {
        Self::new(BinanceAdapter::perpetual())
    }

    /// `/api/v3/klines` -> `/api/v3`
    fn api_prefix(&self) -> &'static str {
        let path = self.adapter.market().rest_path;
        path.strip_suffix("/klines").unwrap_or(path)
    }

    fn error(code: i64, msg: &str) -> ErrorResponse {
        ErrorResponse::bad_request(json!({ "code": code, "msg": msg }))
    }

    fn mandatory(name: &str) -> ErrorResponse {
        Self::error(
            -1102,
            &format!(
                "Mandatory parameter '{}' was not sent, was empty/null, or malformed.",
                name
            ),
        )
    }

    /// `btcusdt@kline_1m` -> (BTC-USDT, 1m)
    fn parse_stream(&self, stream: &str) -> Option<WsStream> {
        let (symbol, token) = stream.split_once("@kline_")?;
        Some(WsStream::new(
            canonical_concatenated(symbol)?,
            canonical_interval(&self.adapter.intervals(), token)?,
        ))
    }

    fn close_time_ms(&self, candle: &CandleData, interval: &str) -> i64 {
        (candle.timestamp + interval_seconds(&self.adapter.intervals(), interval)) * 1000 - 1
    }
}

impl ExchangePlugin for BinancePlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        let prefix = self.api_prefix();
        vec![
            RestRoute::get(self.adapter.market().rest_path, RouteHandler::Candles),
            RestRoute::get(format!("{}/ping", prefix), RouteHandler::Ping),
            RestRoute::get(format!("{}/time", prefix), RouteHandler::Time),
            RestRoute::get(format!("{}/exchangeInfo", prefix), RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        _trading_pair: &str,
        interval: &str,
    ) -> Value {
        Value::Array(
            candles
                .iter()
                .map(|c| {
                    json!([
                        c.timestamp_ms(),
                        fmt_num(c.open),
                        fmt_num(c.high),
                        fmt_num(c.low),
                        fmt_num(c.close),
                        fmt_num(c.volume),
                        self.close_time_ms(c, interval),
                        fmt_num(c.quote_asset_volume),
                        c.n_trades,
                        fmt_num(c.taker_buy_base_volume),
                        fmt_num(c.taker_buy_quote_volume),
                        "0",
                    ])
                })
                .collect(),
        )
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        is_final: bool,
    ) -> Value {
        let symbol = self.adapter.get_trading_pair_format(trading_pair);
        json!({
            "e": "kline",
            "E": Utc::now().timestamp_millis(),
            "s": symbol,
            "k": {
                "t": candle.timestamp_ms(),
                "T": self.close_time_ms(candle, interval),
                "s": symbol,
                "i": self.adapter.intervals().token_or_passthrough(interval),
                "f": 100,
                "L": 200,
                "o": fmt_num(candle.open),
                "c": fmt_num(candle.close),
                "h": fmt_num(candle.high),
                "l": fmt_num(candle.low),
                "v": fmt_num(candle.volume),
                "n": candle.n_trades,
                "x": is_final,
                "q": fmt_num(candle.quote_asset_volume),
                "V": fmt_num(candle.taker_buy_base_volume),
                "Q": fmt_num(candle.taker_buy_quote_volume),
                "B": "0",
            }
        })
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        let method = message.get("method")?.as_str()?;
        let streams: Vec<WsStream> = message
            .get("params")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|stream| self.parse_stream(stream))
            .collect();

        match method {
            "SUBSCRIBE" => Some(WsSubscription::subscribe(streams)),
            "UNSUBSCRIBE" => Some(WsSubscription::unsubscribe(streams)),
            _ => None,
        }
    }

    fn create_ws_subscription_success(
        &self,
        message: &Value,
        _subscription: &WsSubscription,
    ) -> Value {
        json!({ "result": null, "id": message.get("id").cloned().unwrap_or(Value::Null) })
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        match message {
            Value::Object(_) => Some(json!({
                "error": { "code": 2, "msg": "Invalid request: unknown method" },
                "id": id,
            })),
            _ => Some(json!({
                "error": { "code": 3, "msg": "Invalid JSON: expected value at line 1 column 1" },
                "id": id,
            })),
        }
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let symbol = request
            .param("symbol")
            .ok_or_else(|| Self::mandatory("symbol"))?;
        let interval = request
            .param("interval")
            .ok_or_else(|| Self::mandatory("interval"))?;

        let trading_pair =
            canonical_concatenated(symbol).ok_or_else(|| Self::error(-1121, "Invalid symbol."))?;
        let interval = canonical_interval(&self.adapter.intervals(), interval)
            .ok_or_else(|| Self::error(-1120, "Invalid interval."))?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        if let Some(start) = request.param("startTime") {
            query.start_time = Some(
                parse_time(start, TimestampUnit::Milliseconds)
                    .ok_or_else(|| Self::mandatory("startTime"))?,
            );
        }
        if let Some(end) = request.param("endTime") {
            query.end_time = Some(
                parse_time(end, TimestampUnit::Milliseconds)
                    .ok_or_else(|| Self::mandatory("endTime"))?,
            );
        }
        let max = self.adapter.market().max_limit as usize;
        query.limit = match request.param("limit") {
            Some(limit) => Some(parse_limit(limit).ok_or_else(|| {
                Self::error(-1100, "Illegal characters found in parameter 'limit'.")
            })?),
            None => Some(500),
        }
        .map(|limit| limit.clamp(1, max));
        Ok(query)
    }

    fn create_rate_limit_error(&self, retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "code": -1003,
                "msg": format!(
                    "Too many requests; current limit is {} requests per minute. Retry after {}s.",
                    self.rate_limits().rest_requests_per_minute,
                    retry_after
                ),
            }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 1200,
            ws_messages_per_second: 5,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        json!({ "serverTime": now_ms })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let symbols: Vec<Value> = trading_pairs
            .iter()
            .filter_map(|pair| TradingPair::parse(pair).ok())
            .map(|pair| {
                json!({
                    "symbol": pair.joined(""),
                    "status": "TRADING",
                    "baseAsset": pair.base,
                    "quoteAsset": pair.quote,
                })
            })
            .collect();
        json!({
            "timezone": "UTC",
            "serverTime": Utc::now().timestamp_millis(),
            "symbols": symbols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pairs: &[(&str, &str)]) -> RestRequest {
        RestRequest {
            query: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_routes() {
        let plugin = BinancePlugin::perpetual();
        let paths: Vec<String> = plugin.rest_routes().into_iter().map(|r| r.path).collect();
        assert!(paths.contains(&"/fapi/v1/klines".to_string()));
        assert!(paths.contains(&"/fapi/v1/time".to_string()));
        assert_eq!(plugin.ws_routes(), vec!["/ws".to_string()]);
    }

    #[test]
    fn test_rest_params() {
        let plugin = BinancePlugin::spot();
        let query = plugin
            .parse_rest_candles_params(&request(&[
                ("symbol", "ETHUSDT"),
                ("interval", "1h"),
                ("startTime", "1672531200000"),
                ("limit", "5000"),
            ]))
            .unwrap();
        assert_eq!(query.trading_pair, "ETH-USDT");
        assert_eq!(query.interval, "1h");
        assert_eq!(query.start_time, Some(1672531200));
        assert_eq!(query.limit, Some(1000));
    }

    #[test]
    fn test_rest_errors() {
        let plugin = BinancePlugin::spot();
        let err = plugin
            .parse_rest_candles_params(&request(&[("symbol", "BTCUSDT"), ("interval", "7x")]))
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body["code"], -1120);

        let err = plugin
            .parse_rest_candles_params(&request(&[("interval", "1m")]))
            .unwrap_err();
        assert_eq!(err.body["code"], -1102);

        let err = plugin
            .parse_rest_candles_params(&request(&[("symbol", "FOO"), ("interval", "1m")]))
            .unwrap_err();
        assert_eq!(err.body["code"], -1121);
    }

    #[test]
    fn test_ws_subscription() {
        let plugin = BinancePlugin::spot();
        let message = json!({
            "method": "SUBSCRIBE",
            "params": ["btcusdt@kline_1m", "ethusdt@kline_1h", "btcusdt@trade"],
            "id": 7
        });
        let sub = plugin.parse_ws_subscription(&message).unwrap();
        assert_eq!(
            sub.streams,
            vec![WsStream::new("BTC-USDT", "1m"), WsStream::new("ETH-USDT", "1h")]
        );
        assert_eq!(
            plugin.create_ws_subscription_success(&message, &sub),
            json!({"result": null, "id": 7})
        );

        let unknown = json!({"method": "LIST_SUBSCRIPTIONS", "id": 8});
        assert!(plugin.parse_ws_subscription(&unknown).is_none());
        assert_eq!(plugin.create_ws_error(&unknown).unwrap()["error"]["code"], 2);
    }

    #[test]
    fn test_ws_message_flags_final() {
        let plugin = BinancePlugin::spot();
        let candle = CandleData::new(1672531200, 1.0, 2.0, 0.5, 1.5, 10.0);
        let open = plugin.format_ws_candle_message(&candle, "BTC-USDT", "1m", false);
        assert_eq!(open["k"]["x"], false);
        assert_eq!(open["k"]["T"], 1672531259999_i64);
        assert_eq!(open["s"], "BTCUSDT");
    }
}
