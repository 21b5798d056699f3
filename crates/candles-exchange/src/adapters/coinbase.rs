//! Coinbase Advanced Trade 현물 캔들 어댑터.
//!
//! 상품 ID는 경로 템플릿(`/products/{product_id}/candles`)에 들어갑니다.
//! WebSocket 캔들 채널은 5분봉만 제공합니다.

use candles_core::{
    sort_candles, CandleData, CandleError, CandleResult, IntervalSpec, IntervalTable,
    TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, as_object, num, reported, text, timestamp};
use crate::traits::{
    clamp_limit, CandleAdapter, RestParamBuilder, RestParams, RestResponseParser,
    TradingPairFormatter, WsMessageCodec,
};

/// Coinbase REST 기본 URL.
pub const COINBASE_REST_URL: &str = "https://api.coinbase.com";

/// Coinbase Advanced Trade WebSocket URL.
pub const COINBASE_WS_URL: &str = "wss://advanced-trade-ws.coinbase.com";

/// 캔들 경로 템플릿.
pub const COINBASE_CANDLES_PATH: &str = "/api/v3/brokerage/market/products/{product_id}/candles";

/// Coinbase 요청당 최대 캔들 수.
pub const COINBASE_MAX_LIMIT: u32 = 350;

/// Coinbase 인터벌 테이블.
pub const COINBASE_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1m", 60, "ONE_MINUTE", false),
    IntervalSpec::new("5m", 300, "FIVE_MINUTE", true),
    IntervalSpec::new("15m", 900, "FIFTEEN_MINUTE", false),
    IntervalSpec::new("30m", 1_800, "THIRTY_MINUTE", false),
    IntervalSpec::new("1h", 3_600, "ONE_HOUR", false),
    IntervalSpec::new("2h", 7_200, "TWO_HOUR", false),
    IntervalSpec::new("6h", 21_600, "SIX_HOUR", false),
    IntervalSpec::new("1d", 86_400, "ONE_DAY", false),
]);

/// Coinbase Advanced Trade 캔들 어댑터.
#[derive(Debug, Clone, Default)]
pub struct CoinbaseAdvancedTradeAdapter;

impl CoinbaseAdvancedTradeAdapter {
    /// 어댑터를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    fn parse_candle(obj: &Value) -> CandleResult<CandleData> {
        let ctx = "coinbase candle";
        if !obj.is_object() {
            return Err(CandleError::unexpected(ctx, "object"));
        }
        Ok(CandleData::new(
            timestamp(obj.get("start"), TimestampUnit::Seconds, ctx)?,
            num(obj.get("open"), ctx)?,
            num(obj.get("high"), ctx)?,
            num(obj.get("low"), ctx)?,
            num(obj.get("close"), ctx)?,
            num(obj.get("volume"), ctx)?,
        ))
    }
}

impl TradingPairFormatter for CoinbaseAdvancedTradeAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        trading_pair.to_string()
    }
}

impl RestParamBuilder for CoinbaseAdvancedTradeAdapter {
    /// 상품 ID는 경로에 포함되므로 쿼리에는 넣지 않습니다.
    fn get_rest_params(
        &self,
        _trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> RestParams {
        let mut params = RestParams::new();
        params.insert(
            "granularity".into(),
            json!(COINBASE_INTERVALS.token_or_passthrough(interval)),
        );
        if let Some(start) = start_time {
            params.insert("start".into(), json!(self.to_exchange_time(start).to_string()));
        }
        if let Some(end) = end_time {
            params.insert("end".into(), json!(self.to_exchange_time(end).to_string()));
        }
        params.insert(
            "limit".into(),
            json!(clamp_limit(limit, COINBASE_MAX_LIMIT)),
        );
        params
    }
}

impl RestResponseParser for CoinbaseAdvancedTradeAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let payload = as_object(payload, "coinbase rest response")?;

        // {"error": "INVALID_ARGUMENT", "error_details": "...", "message": "..."}
        if let Some(error) = payload.get("error") {
            return Err(reported(error, payload.get("message")));
        }

        let Some(list) = payload.get("candles") else {
            return Ok(Vec::new());
        };
        let mut candles = as_array(list, "coinbase candles")?
            .iter()
            .map(Self::parse_candle)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for CoinbaseAdvancedTradeAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, _interval: &str) -> Value {
        json!({
            "type": "subscribe",
            "product_ids": [self.get_trading_pair_format(trading_pair)],
            "channel": "candles",
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        // heartbeats, subscriptions 채널 무시
        if text(payload.get("channel")) != "candles" {
            return Ok(None);
        }
        let Some(events) = payload.get("events") else {
            return Ok(None);
        };

        let mut candles = Vec::new();
        for event in as_array(events, "coinbase events")? {
            if let Some(list) = event.get("candles") {
                for candle in as_array(list, "coinbase event candles")? {
                    candles.push(Self::parse_candle(candle)?);
                }
            }
        }
        sort_candles(&mut candles);
        Ok(Some(candles))
    }
}

impl CandleAdapter for CoinbaseAdvancedTradeAdapter {
    fn name(&self) -> &'static str {
        "coinbase_advanced_trade"
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Seconds
    }

    fn intervals(&self) -> IntervalTable {
        COINBASE_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        COINBASE_REST_URL
    }

    fn rest_path(&self, trading_pair: &str) -> String {
        COINBASE_CANDLES_PATH.replace("{product_id}", &self.get_trading_pair_format(trading_pair))
    }

    fn ws_url(&self) -> &'static str {
        COINBASE_WS_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_endpoint_template() {
        let adapter = CoinbaseAdvancedTradeAdapter::new();
        assert_eq!(
            adapter.rest_endpoint("http://127.0.0.1:9000/", "BTC-USD"),
            "http://127.0.0.1:9000/api/v3/brokerage/market/products/BTC-USD/candles"
        );
    }

    #[test]
    fn test_rest_params() {
        let adapter = CoinbaseAdvancedTradeAdapter::new();
        let params = adapter.get_rest_params("BTC-USD", "1h", Some(100), Some(200), None);
        assert_eq!(params["granularity"], json!("ONE_HOUR"));
        assert_eq!(params["start"], json!("100"));
        assert_eq!(params["end"], json!("200"));
        assert_eq!(params["limit"], json!(350));
        assert!(!params.contains_key("product_id"));
    }

    #[test]
    fn test_parse_rest_newest_first() {
        let adapter = CoinbaseAdvancedTradeAdapter::new();
        let payload = json!({"candles": [
            {"start": "1672531260", "low": "1", "high": "3", "open": "2", "close": "2.5", "volume": "4"},
            {"start": "1672531200", "low": "0.5", "high": "2", "open": "1", "close": "1.5", "volume": "3"}
        ]});
        let candles = adapter.parse_rest_response(Some(&payload)).unwrap();
        assert_eq!(candles[0].timestamp, 1672531200);
        assert_eq!(candles[0].low, 0.5);
        assert_eq!(candles[1].high, 3.0);
    }

    #[test]
    fn test_error_envelope() {
        let adapter = CoinbaseAdvancedTradeAdapter::new();
        let payload = json!({
            "error": "INVALID_ARGUMENT",
            "error_details": "granularity is required",
            "message": "granularity is required"
        });
        let err = adapter.parse_rest_response(Some(&payload)).unwrap_err();
        assert_eq!(err.to_string(), "거래소 에러 INVALID_ARGUMENT: granularity is required");
    }

    #[test]
    fn test_ws_messages() {
        let adapter = CoinbaseAdvancedTradeAdapter::new();
        assert_eq!(adapter.get_ws_supported_intervals(), vec!["5m".to_string()]);

        let push = json!({
            "channel": "candles",
            "client_id": "",
            "timestamp": "2023-06-09T20:19:35.39625135Z",
            "sequence_num": 0,
            "events": [{"type": "snapshot", "candles": [{
                "start": "1688998200", "high": "1867.72", "low": "1865.63",
                "open": "1867.38", "close": "1866.81", "volume": "0.20269406",
                "product_id": "ETH-USD"
            }]}]
        });
        let c = &adapter.parse_ws_message(Some(&push)).unwrap().unwrap()[0];
        assert_eq!(c.timestamp, 1688998200);
        assert_eq!(c.close, 1866.81);

        let heartbeat = json!({"channel": "heartbeats", "events": []});
        assert!(adapter.parse_ws_message(Some(&heartbeat)).unwrap().is_none());
    }
}
