//! Kraken 현물 플러그인.
//!
//! REST 에러와 rate limit 초과도 HTTP 200에 `error` 배열로 응답합니다.

use axum::http::StatusCode;
use candles_core::{split_concatenated_symbol, CandleData, TimestampUnit, COMMON_QUOTES};
use candles_exchange::adapters::kraken::{
    from_kraken_asset, to_kraken_asset, KrakenAdapter, KRAKEN_INTERVALS,
};
use candles_exchange::common::fmt_num;
use candles_exchange::{CandleAdapter, TradingPairFormatter};
use chrono::Utc;
use serde_json::{json, Value};

use crate::plugin::{
    canonical_interval, interval_seconds, parse_time, CandlesQuery, ErrorResponse,
    ExchangePlugin, RateLimits, RestRequest, RestRoute, RouteHandler, SubscriptionAction,
    WsStream, WsSubscription,
};

/// 응답 키가 `X<base>Z<quote>` 형태인 레거시 자산.
const LEGACY_BASES: &[&str] = &["XBT", "ETH", "LTC", "XRP", "XDG", "XLM", "ETC", "XMR", "ZEC"];
const LEGACY_QUOTES: &[&str] = &["USD", "EUR", "GBP", "CAD", "JPY"];

/// 한 번에 반환하는 최대 봉 수.
const KRAKEN_MAX_BARS: usize = 720;

/// 모의 채널 ID.
const CHANNEL_ID: i64 = 42;

/// Kraken 모의 플러그인.
#[derive(Debug, Default)]
pub struct KrakenPlugin {
    adapter: KrakenAdapter,
}

impl KrakenPlugin {
    pub fn new() -> Self {
        Self {
            adapter: KrakenAdapter::new(),
        }
    }

    fn error(message: &str) -> ErrorResponse {
        ErrorResponse::new(StatusCode::OK, json!({ "error": [message] }))
    }

    /// REST 결과 키 (`BTC-USD` -> `XXBTZUSD`).
    pub fn result_key(trading_pair: &str) -> String {
        match trading_pair.split_once('-') {
            Some((base, quote)) => {
                let base = to_kraken_asset(base);
                let quote = to_kraken_asset(quote);
                if LEGACY_BASES.contains(&base.as_str()) && LEGACY_QUOTES.contains(&quote.as_str())
                {
                    format!("X{}Z{}", base, quote)
                } else {
                    format!("{}{}", base, quote)
                }
            }
            None => to_kraken_asset(trading_pair),
        }
    }

    /// `XBTUSD`, `XXBTZUSD` -> `BTC-USD`
    fn canonical_pair(symbol: &str) -> Option<String> {
        let upper = symbol.to_uppercase();
        let (base, quote) = if upper.len() == 8
            && upper.starts_with('X')
            && upper.as_bytes().get(4) == Some(&b'Z')
        {
            (upper[1..4].to_string(), upper[5..].to_string())
        } else {
            let pair = split_concatenated_symbol(&upper, COMMON_QUOTES)?;
            (pair.base, pair.quote)
        };
        Some(format!(
            "{}-{}",
            from_kraken_asset(&base),
            from_kraken_asset(&quote)
        ))
    }

    /// `XBT/USD` -> `BTC-USD`
    fn canonical_ws_pair(pair: &str) -> Option<String> {
        let (base, quote) = pair.split_once('/')?;
        Some(format!(
            "{}-{}",
            from_kraken_asset(&base.to_uppercase()),
            from_kraken_asset(&quote.to_uppercase())
        ))
    }

    fn minutes(interval: &str) -> i64 {
        interval_seconds(&KRAKEN_INTERVALS, interval) / 60
    }

    fn vwap(candle: &CandleData) -> f64 {
        if candle.volume > 0.0 {
            candle.quote_asset_volume / candle.volume
        } else {
            candle.close
        }
    }

    fn is_ohlc_subscription(message: &Value) -> bool {
        message
            .get("subscription")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            == Some("ohlc")
    }
}

impl ExchangePlugin for KrakenPlugin {
    fn adapter(&self) -> &dyn CandleAdapter {
        &self.adapter
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        vec![
            RestRoute::get("/0/public/OHLC", RouteHandler::Candles),
            RestRoute::get("/0/public/Time", RouteHandler::Time),
            RestRoute::get("/0/public/AssetPairs", RouteHandler::ExchangeInfo),
        ]
    }

    fn format_rest_candles(
        &self,
        candles: &[CandleData],
        trading_pair: &str,
        _interval: &str,
    ) -> Value {
        let rows: Vec<Value> = candles
            .iter()
            .map(|c| {
                json!([
                    c.timestamp,
                    fmt_num(c.open),
                    fmt_num(c.high),
                    fmt_num(c.low),
                    fmt_num(c.close),
                    fmt_num(Self::vwap(c)),
                    fmt_num(c.volume),
                    c.n_trades,
                ])
            })
            .collect();
        let last = candles.last().map_or(0, |c| c.timestamp);

        let mut result = serde_json::Map::new();
        result.insert(Self::result_key(trading_pair), Value::Array(rows));
        result.insert("last".into(), json!(last));
        json!({ "error": [], "result": result })
    }

    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        _is_final: bool,
    ) -> Value {
        let minutes = Self::minutes(interval);
        let etime = candle.timestamp + minutes * 60;
        json!([
            CHANNEL_ID,
            [
                format!("{:.6}", candle.timestamp as f64),
                format!("{:.6}", etime as f64),
                fmt_num(candle.open),
                fmt_num(candle.high),
                fmt_num(candle.low),
                fmt_num(candle.close),
                fmt_num(Self::vwap(candle)),
                fmt_num(candle.volume),
                candle.n_trades,
            ],
            format!("ohlc-{}", minutes),
            KrakenAdapter::ws_pair(trading_pair),
        ])
    }

    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription> {
        let action = match message.get("event")?.as_str()? {
            "subscribe" => SubscriptionAction::Subscribe,
            "unsubscribe" => SubscriptionAction::Unsubscribe,
            _ => return None,
        };
        if !Self::is_ohlc_subscription(message) {
            return None;
        }

        let minutes = message
            .get("subscription")
            .and_then(|s| s.get("interval"))
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let interval = canonical_interval(&KRAKEN_INTERVALS, &minutes.to_string())?;

        let streams = message
            .get("pair")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .filter_map(Self::canonical_ws_pair)
            .map(|pair| WsStream::new(pair, interval.clone()))
            .collect();
        Some(WsSubscription { action, streams })
    }

    /// Kraken은 거래쌍마다 상태 메시지를 보내지만 모의 서버는 첫 거래쌍에 대해서만 응답합니다.
    fn create_ws_subscription_success(
        &self,
        message: &Value,
        subscription: &WsSubscription,
    ) -> Value {
        let minutes = message
            .get("subscription")
            .and_then(|s| s.get("interval"))
            .cloned()
            .unwrap_or(json!(1));
        let pair = subscription
            .streams
            .first()
            .map(|s| KrakenAdapter::ws_pair(&s.trading_pair))
            .unwrap_or_default();
        let status = match subscription.action {
            SubscriptionAction::Subscribe => "subscribed",
            SubscriptionAction::Unsubscribe => "unsubscribed",
        };
        let mut ack = json!({
            "channelID": CHANNEL_ID,
            "channelName": format!("ohlc-{}", minutes),
            "event": "subscriptionStatus",
            "pair": pair,
            "status": status,
            "subscription": { "interval": minutes, "name": "ohlc" },
        });
        if let Some(reqid) = message.get("reqid") {
            ack["reqid"] = reqid.clone();
        }
        ack
    }

    fn create_ws_pong(&self, message: &Value) -> Option<Value> {
        if message.get("event").and_then(Value::as_str) != Some("ping") {
            return None;
        }
        let mut pong = json!({ "event": "pong" });
        if let Some(reqid) = message.get("reqid") {
            pong["reqid"] = reqid.clone();
        }
        Some(pong)
    }

    fn create_ws_error(&self, message: &Value) -> Option<Value> {
        match message.get("event").and_then(Value::as_str) {
            Some("subscribe") | Some("unsubscribe") if !Self::is_ohlc_subscription(message) => {
                Some(json!({
                    "errorMessage": "Subscription name invalid",
                    "event": "subscriptionStatus",
                    "status": "error",
                    "subscription": message.get("subscription").cloned().unwrap_or(Value::Null),
                }))
            }
            Some("subscribe") | Some("unsubscribe") => Some(json!({
                "errorMessage": "Subscription ohlc interval not supported",
                "event": "subscriptionStatus",
                "status": "error",
            })),
            _ => Some(json!({
                "errorMessage": "Unsupported event",
                "event": "error",
                "status": "error",
            })),
        }
    }

    fn ws_welcome(&self, _connection_id: &str) -> Option<Value> {
        Some(json!({
            "connectionID": 1,
            "event": "systemStatus",
            "status": "online",
            "version": "1.9.1",
        }))
    }

    fn parse_rest_candles_params(
        &self,
        request: &RestRequest,
    ) -> Result<CandlesQuery, ErrorResponse> {
        let pair = request
            .param("pair")
            .ok_or_else(|| Self::error("EGeneral:Invalid arguments:pair"))?;
        let trading_pair =
            Self::canonical_pair(pair).ok_or_else(|| Self::error("EQuery:Unknown asset pair"))?;
        let interval = canonical_interval(&KRAKEN_INTERVALS, request.param("interval").unwrap_or("1"))
            .ok_or_else(|| Self::error("EGeneral:Invalid arguments"))?;

        let mut query = CandlesQuery::new(trading_pair, interval);
        if let Some(since) = request.param("since") {
            query.start_time = Some(
                parse_time(since, TimestampUnit::Seconds)
                    .ok_or_else(|| Self::error("EGeneral:Invalid arguments:since"))?,
            );
        }
        query.limit = Some(KRAKEN_MAX_BARS);
        Ok(query)
    }

    fn create_rate_limit_error(&self, _retry_after: u64) -> ErrorResponse {
        Self::error("EGeneral:Too many requests")
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            rest_requests_per_minute: 60,
            ws_messages_per_second: 10,
        }
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        let now = chrono::DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now);
        json!({
            "error": [],
            "result": {
                "unixtime": now.timestamp(),
                "rfc1123": now.format("%a, %d %b %y %H:%M:%S +0000").to_string(),
            }
        })
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        let mut result = serde_json::Map::new();
        for pair in trading_pairs {
            result.insert(
                Self::result_key(pair),
                json!({
                    "altname": self.adapter.get_trading_pair_format(pair),
                    "wsname": KrakenAdapter::ws_pair(pair),
                    "status": "online",
                }),
            );
        }
        json!({ "error": [], "result": result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key() {
        assert_eq!(KrakenPlugin::result_key("BTC-USD"), "XXBTZUSD");
        assert_eq!(KrakenPlugin::result_key("SOL-USD"), "SOLUSD");
    }

    #[test]
    fn test_canonical_pair() {
        assert_eq!(KrakenPlugin::canonical_pair("XBTUSD").as_deref(), Some("BTC-USD"));
        assert_eq!(KrakenPlugin::canonical_pair("XXBTZUSD").as_deref(), Some("BTC-USD"));
        assert_eq!(KrakenPlugin::canonical_pair("ETHUSDT").as_deref(), Some("ETH-USDT"));
    }

    #[test]
    fn test_rest_error_is_http_ok() {
        let plugin = KrakenPlugin::new();
        let mut request = RestRequest::default();
        request.query.insert("pair".into(), "FOO".into());
        let err = plugin.parse_rest_candles_params(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::OK);
        assert_eq!(err.body, json!({"error": ["EQuery:Unknown asset pair"]}));
    }

    #[test]
    fn test_ws_subscription_and_errors() {
        let plugin = KrakenPlugin::new();
        let message = json!({
            "event": "subscribe",
            "reqid": 5,
            "pair": ["XBT/USD", "ETH/USD"],
            "subscription": {"name": "ohlc", "interval": 60}
        });
        let sub = plugin.parse_ws_subscription(&message).unwrap();
        assert_eq!(
            sub.streams,
            vec![WsStream::new("BTC-USD", "1h"), WsStream::new("ETH-USD", "1h")]
        );
        let ack = plugin.create_ws_subscription_success(&message, &sub);
        assert_eq!(ack["channelName"], "ohlc-60");
        assert_eq!(ack["pair"], "XBT/USD");
        assert_eq!(ack["reqid"], 5);

        let ticker = json!({"event": "subscribe", "pair": ["XBT/USD"], "subscription": {"name": "ticker"}});
        assert!(plugin.parse_ws_subscription(&ticker).is_none());
        assert_eq!(plugin.create_ws_error(&ticker).unwrap()["status"], "error");

        let pong = plugin.create_ws_pong(&json!({"event": "ping", "reqid": 9})).unwrap();
        assert_eq!(pong, json!({"event": "pong", "reqid": 9}));
    }
}
