//! KuCoin 현물 캔들 어댑터.
//!
//! REST 행은 `[time, open, close, high, low, volume, turnover]` 순서입니다 (시가-종가-고가-저가).
//! WebSocket 연결 전 `POST /api/v1/bullet-public` 로 토큰과 엔드포인트를 받아야 합니다.

use std::sync::atomic::{AtomicU64, Ordering};

use candles_core::{
    sort_candles, CandleData, CandleResult, IntervalSpec, IntervalTable, TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, as_object, plain, reported, row_num, text, timestamp};
use crate::traits::{
    CandleAdapter, RestParamBuilder, RestParams, RestResponseParser, TradingPairFormatter,
    WsMessageCodec,
};

/// KuCoin REST 기본 URL.
pub const KUCOIN_REST_URL: &str = "https://api.kucoin.com";

/// KuCoin 공개 WebSocket 엔드포인트 (토큰은 bullet-public 응답에서 받음).
pub const KUCOIN_WS_URL: &str = "wss://ws-api-spot.kucoin.com/";

/// WebSocket 토큰 발급 경로.
pub const KUCOIN_WS_TOKEN_PATH: &str = "/api/v1/bullet-public";

/// 성공 응답 코드.
pub const KUCOIN_SUCCESS_CODE: &str = "200000";

/// KuCoin 인터벌 테이블.
pub const KUCOIN_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1m", 60, "1min", true),
    IntervalSpec::new("3m", 180, "3min", true),
    IntervalSpec::new("5m", 300, "5min", true),
    IntervalSpec::new("15m", 900, "15min", true),
    IntervalSpec::new("30m", 1_800, "30min", true),
    IntervalSpec::new("1h", 3_600, "1hour", true),
    IntervalSpec::new("2h", 7_200, "2hour", true),
    IntervalSpec::new("4h", 14_400, "4hour", true),
    IntervalSpec::new("6h", 21_600, "6hour", true),
    IntervalSpec::new("8h", 28_800, "8hour", true),
    IntervalSpec::new("12h", 43_200, "12hour", true),
    IntervalSpec::new("1d", 86_400, "1day", true),
    IntervalSpec::new("1w", 604_800, "1week", true),
    IntervalSpec::new("1M", 2_592_000, "1month", false),
]);

/// KuCoin 캔들 어댑터.
#[derive(Debug)]
pub struct KucoinAdapter {
    request_id: AtomicU64,
}

impl Default for KucoinAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl KucoinAdapter {
    /// 어댑터를 생성합니다.
    pub fn new() -> Self {
        Self {
            request_id: AtomicU64::new(1),
        }
    }

    /// 캔들 토픽 (`/market/candles:BTC-USDT_1hour`).
    pub fn topic(&self, trading_pair: &str, interval: &str) -> String {
        format!(
            "/market/candles:{}_{}",
            self.get_trading_pair_format(trading_pair),
            KUCOIN_INTERVALS.token_or_passthrough(interval)
        )
    }

    /// bullet-public 응답에서 (엔드포인트, 토큰)을 꺼냅니다.
    pub fn parse_ws_token(payload: &Value) -> CandleResult<(String, String)> {
        if let Some(code) = payload.get("code") {
            if plain(Some(code)) != KUCOIN_SUCCESS_CODE {
                return Err(reported(code, payload.get("msg")));
            }
        }
        let data = payload.get("data");
        let token = text(data.and_then(|d| d.get("token"))).to_string();
        let endpoint = data
            .and_then(|d| d.get("instanceServers"))
            .and_then(Value::as_array)
            .and_then(|servers| servers.first())
            .map(|server| text(server.get("endpoint")).to_string())
            .unwrap_or_else(|| KUCOIN_WS_URL.to_string());
        Ok((endpoint, token))
    }

    fn parse_row(row: &Value) -> CandleResult<CandleData> {
        let ctx = "kucoin candle row";
        let row = as_array(row, ctx)?;
        Ok(CandleData::new(
            timestamp(row.first(), TimestampUnit::Seconds, ctx)?,
            row_num(row, 1, ctx)?,
            row_num(row, 3, ctx)?,
            row_num(row, 4, ctx)?,
            row_num(row, 2, ctx)?,
            row_num(row, 5, ctx)?,
        )
        .with_quote_asset_volume(row_num(row, 6, ctx)?))
    }
}

impl TradingPairFormatter for KucoinAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        trading_pair.to_string()
    }
}

impl RestParamBuilder for KucoinAdapter {
    /// KuCoin은 개수 파라미터가 없고 최대 1500개를 반환합니다.
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        _limit: Option<u32>,
    ) -> RestParams {
        let mut params = RestParams::new();
        params.insert(
            "symbol".into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        params.insert(
            "type".into(),
            json!(KUCOIN_INTERVALS.token_or_passthrough(interval)),
        );
        if let Some(start) = start_time {
            params.insert("startAt".into(), json!(self.to_exchange_time(start)));
        }
        if let Some(end) = end_time {
            params.insert("endAt".into(), json!(self.to_exchange_time(end)));
        }
        params
    }
}

impl RestResponseParser for KucoinAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let payload = as_object(payload, "kucoin rest response")?;

        if let Some(code) = payload.get("code") {
            if plain(Some(code)) != KUCOIN_SUCCESS_CODE {
                return Err(reported(code, payload.get("msg")));
            }
        }

        let Some(data) = payload.get("data") else {
            return Ok(Vec::new());
        };
        let mut candles = as_array(data, "kucoin data")?
            .iter()
            .map(Self::parse_row)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for KucoinAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        json!({
            "id": self.request_id.fetch_add(1, Ordering::Relaxed).to_string(),
            "type": "subscribe",
            "topic": self.topic(trading_pair, interval),
            "privateChannel": false,
            "response": true,
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        // welcome, pong, ack 는 type 으로 구분
        if text(payload.get("type")) != "message"
            || !text(payload.get("subject")).starts_with("trade.candles")
        {
            return Ok(None);
        }

        match payload.get("data").and_then(|d| d.get("candles")) {
            Some(row) => Ok(Some(vec![Self::parse_row(row)?])),
            None => Ok(None),
        }
    }
}

impl CandleAdapter for KucoinAdapter {
    fn name(&self) -> &'static str {
        "kucoin_spot"
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Seconds
    }

    fn intervals(&self) -> IntervalTable {
        KUCOIN_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        KUCOIN_REST_URL
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        "/api/v1/market/candles".to_string()
    }

    fn ws_url(&self) -> &'static str {
        KUCOIN_WS_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candles_core::CandleError;

    #[test]
    fn test_row_open_close_high_low_order() {
        let adapter = KucoinAdapter::new();
        let payload = json!({
            "code": "200000",
            "data": [
                ["1672531260", "2", "2.5", "3", "1", "4", "10"],
                ["1672531200", "1", "1.5", "2", "0.5", "3", "4.5"]
            ]
        });
        let candles = adapter.parse_rest_response(Some(&payload)).unwrap();
        let c = &candles[0];
        assert_eq!(c.timestamp, 1672531200);
        assert_eq!(c.open, 1.0);
        assert_eq!(c.close, 1.5);
        assert_eq!(c.high, 2.0);
        assert_eq!(c.low, 0.5);
        assert_eq!(c.volume, 3.0);
        assert_eq!(c.quote_asset_volume, 4.5);
    }

    #[test]
    fn test_error_envelope() {
        let adapter = KucoinAdapter::new();
        let err = adapter
            .parse_rest_response(Some(&json!({"code": "400100", "msg": "Unsupported trading pair."})))
            .unwrap_err();
        assert!(matches!(err, CandleError::ExchangeReported { ref code, .. } if code == "400100"));
    }

    #[test]
    fn test_rest_params() {
        let adapter = KucoinAdapter::new();
        let params = adapter.get_rest_params("BTC-USDT", "1h", Some(10), Some(20), Some(5));
        assert_eq!(params["type"], json!("1hour"));
        assert_eq!(params["startAt"], json!(10));
        assert_eq!(params["endAt"], json!(20));
        assert!(!params.contains_key("limit"));
    }

    #[test]
    fn test_ws_token() {
        let payload = json!({"code": "200000", "data": {
            "token": "abc",
            "instanceServers": [{"endpoint": "ws://127.0.0.1:1234/ws", "pingInterval": 18000}]
        }});
        let (endpoint, token) = KucoinAdapter::parse_ws_token(&payload).unwrap();
        assert_eq!(endpoint, "ws://127.0.0.1:1234/ws");
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_ws_messages() {
        let adapter = KucoinAdapter::new();
        let sub = adapter.get_ws_subscription_payload("BTC-USDT", "1h");
        assert_eq!(sub["topic"], "/market/candles:BTC-USDT_1hour");
        assert_eq!(sub["response"], true);

        let push = json!({
            "type": "message",
            "topic": "/market/candles:BTC-USDT_1hour",
            "subject": "trade.candles.update",
            "data": {
                "symbol": "BTC-USDT",
                "candles": ["1589968800", "9786.9", "9740.8", "9806.1", "9732", "27.45649579", "268280.09830877"],
                "time": 1589970010253893337_i64
            }
        });
        let c = &adapter.parse_ws_message(Some(&push)).unwrap().unwrap()[0];
        assert_eq!(c.timestamp, 1589968800);
        assert_eq!(c.close, 9740.8);
        assert_eq!(c.high, 9806.1);

        for ignored in [
            json!({"id": "x", "type": "welcome"}),
            json!({"id": "1", "type": "pong"}),
            json!({"id": "1", "type": "ack"}),
        ] {
            assert!(adapter.parse_ws_message(Some(&ignored)).unwrap().is_none());
        }
    }
}
