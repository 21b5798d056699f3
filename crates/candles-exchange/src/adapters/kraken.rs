//! Kraken 현물 캔들 어댑터.
//!
//! Kraken은 BTC를 XBT로 표기하고, 인터벌을 분 단위 정수로 받습니다.
//! REST 결과는 `{"result": {<pair key>: [...], "last": n}}` 형태이며 `last`는 커서입니다.
//! WebSocket v1 push는 배열이고 봉 시작 시각은 `etime - interval` 입니다.

use candles_core::{
    interval_to_seconds, sort_candles, CandleData, CandleError, CandleResult, IntervalSpec,
    IntervalTable, TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, as_object, count, row_num, text, timestamp};
use crate::traits::{
    CandleAdapter, RestParamBuilder, RestParams, RestResponseParser, TradingPairFormatter,
    WsMessageCodec,
};

/// Kraken REST 기본 URL.
pub const KRAKEN_REST_URL: &str = "https://api.kraken.com";

/// Kraken WebSocket v1 URL.
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com";

/// Kraken 인터벌 테이블 (토큰은 분).
pub const KRAKEN_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1m", 60, "1", true),
    IntervalSpec::new("5m", 300, "5", true),
    IntervalSpec::new("15m", 900, "15", true),
    IntervalSpec::new("30m", 1_800, "30", true),
    IntervalSpec::new("1h", 3_600, "60", true),
    IntervalSpec::new("4h", 14_400, "240", true),
    IntervalSpec::new("1d", 86_400, "1440", true),
    IntervalSpec::new("1w", 604_800, "10080", true),
    IntervalSpec::new("15d", 1_296_000, "21600", true),
]);

/// Kraken 자산 표기로 변환합니다 (`BTC` -> `XBT`).
pub fn to_kraken_asset(asset: &str) -> String {
    let upper = asset.to_uppercase();
    match upper.as_str() {
        "BTC" => "XBT".to_string(),
        "DOGE" => "XDG".to_string(),
        _ => upper,
    }
}

/// Kraken 자산 표기를 정규 표기로 되돌립니다.
pub fn from_kraken_asset(asset: &str) -> String {
    match asset {
        "XBT" => "BTC".to_string(),
        "XDG" => "DOGE".to_string(),
        other => other.to_string(),
    }
}

/// Kraken 캔들 어댑터.
#[derive(Debug, Clone, Default)]
pub struct KrakenAdapter;

impl KrakenAdapter {
    /// 어댑터를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// WebSocket v1 거래쌍 표기 (`XBT/USD`).
    pub fn ws_pair(trading_pair: &str) -> String {
        match trading_pair.split_once('-') {
            Some((base, quote)) => format!("{}/{}", to_kraken_asset(base), to_kraken_asset(quote)),
            None => to_kraken_asset(trading_pair),
        }
    }

    fn parse_rest_row(row: &Value) -> CandleResult<CandleData> {
        let ctx = "kraken ohlc row";
        let row = as_array(row, ctx)?;
        // [time, open, high, low, close, vwap, volume, count]
        let vwap = row_num(row, 5, ctx)?;
        let volume = row_num(row, 6, ctx)?;
        Ok(CandleData::new(
            timestamp(row.first(), TimestampUnit::Seconds, ctx)?,
            row_num(row, 1, ctx)?,
            row_num(row, 2, ctx)?,
            row_num(row, 3, ctx)?,
            row_num(row, 4, ctx)?,
            volume,
        )
        .with_quote_asset_volume(vwap * volume)
        .with_n_trades(count(row.get(7), ctx)?))
    }

    fn parse_ws_bar(bar: &Value, interval_secs: i64) -> CandleResult<CandleData> {
        let ctx = "kraken ws ohlc";
        let bar = as_array(bar, ctx)?;
        // [time, etime, open, high, low, close, vwap, volume, count]
        let end = timestamp(bar.get(1), TimestampUnit::Seconds, ctx)?;
        let vwap = row_num(bar, 6, ctx)?;
        let volume = row_num(bar, 7, ctx)?;
        Ok(CandleData::new(
            end - interval_secs,
            row_num(bar, 2, ctx)?,
            row_num(bar, 3, ctx)?,
            row_num(bar, 4, ctx)?,
            row_num(bar, 5, ctx)?,
            volume,
        )
        .with_quote_asset_volume(vwap * volume)
        .with_n_trades(count(bar.get(8), ctx)?))
    }
}

impl TradingPairFormatter for KrakenAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        // "BTC-USD" -> "XBTUSD"
        trading_pair
            .split('-')
            .map(to_kraken_asset)
            .collect::<Vec<_>>()
            .concat()
    }
}

impl RestParamBuilder for KrakenAdapter {
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        _end_time: Option<i64>,
        _limit: Option<u32>,
    ) -> RestParams {
        // Kraken은 종료 시각/개수 파라미터가 없고 최대 720개를 반환
        let mut params = RestParams::new();
        params.insert(
            "pair".into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        params.insert(
            "interval".into(),
            json!(KRAKEN_INTERVALS.token_or_passthrough(interval)),
        );
        if let Some(start) = start_time {
            params.insert("since".into(), json!(self.to_exchange_time(start)));
        }
        params
    }
}

impl RestResponseParser for KrakenAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let payload = as_object(payload, "kraken rest response")?;

        // {"error": ["EQuery:Unknown asset pair"]}
        if let Some(errors) = payload.get("error") {
            let errors = as_array(errors, "kraken error")?;
            if let Some(first) = errors.first() {
                let first = text(Some(first));
                let (code, message) = first.split_once(':').unwrap_or((first, ""));
                return Err(CandleError::exchange(code, message));
            }
        }

        let Some(result) = payload.get("result") else {
            return Ok(Vec::new());
        };
        let result = as_object(result, "kraken result")?;

        let mut candles = Vec::new();
        for (key, rows) in result {
            if key == "last" {
                continue;
            }
            for row in as_array(rows, "kraken result rows")? {
                candles.push(Self::parse_rest_row(row)?);
            }
        }
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for KrakenAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        // 표에 없는 인터벌은 분으로 환산하고, 환산도 안 되면 그대로 넘김
        let minutes = KRAKEN_INTERVALS
            .token_or_passthrough(interval)
            .parse::<i64>()
            .ok()
            .or_else(|| interval_to_seconds(interval).map(|s| s / 60))
            .filter(|m| *m > 0);
        let interval = match minutes {
            Some(m) => json!(m),
            None => json!(interval),
        };
        json!({
            "event": "subscribe",
            "pair": [Self::ws_pair(trading_pair)],
            "subscription": {"name": "ohlc", "interval": interval},
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        // heartbeat, systemStatus, subscriptionStatus 는 객체
        let Some(message) = payload.and_then(Value::as_array) else {
            return Ok(None);
        };
        if message.len() < 4 {
            return Ok(None);
        }

        let Some(minutes) = text(message.get(2))
            .strip_prefix("ohlc-")
            .and_then(|m| m.parse::<i64>().ok())
        else {
            return Ok(None);
        };

        let candle = Self::parse_ws_bar(&message[1], minutes * 60)?;
        Ok(Some(vec![candle]))
    }
}

impl CandleAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken_spot"
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Seconds
    }

    fn intervals(&self) -> IntervalTable {
        KRAKEN_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        KRAKEN_REST_URL
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        "/0/public/OHLC".to_string()
    }

    fn ws_url(&self) -> &'static str {
        KRAKEN_WS_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_formats() {
        let adapter = KrakenAdapter::new();
        assert_eq!(adapter.get_trading_pair_format("BTC-USD"), "XBTUSD");
        assert_eq!(adapter.get_trading_pair_format("ETH-USDT"), "ETHUSDT");
        assert_eq!(KrakenAdapter::ws_pair("BTC-USD"), "XBT/USD");
    }

    #[test]
    fn test_rest_params() {
        let adapter = KrakenAdapter::new();
        let params = adapter.get_rest_params("BTC-USD", "1h", Some(1_672_531_200), Some(1), Some(5));
        assert_eq!(params["interval"], json!("60"));
        assert_eq!(params["since"], json!(1_672_531_200));
        assert!(!params.contains_key("limit"));
    }

    #[test]
    fn test_parse_rest_skips_cursor() {
        let adapter = KrakenAdapter::new();
        let payload = json!({
            "error": [],
            "result": {
                "XXBTZUSD": [
                    [1672531260, "2", "3", "1", "2.5", "2", "4", 7],
                    [1672531200, "1", "2", "0.5", "1.5", "1.25", "8", 12]
                ],
                "last": 1672531260
            }
        });
        let candles = adapter.parse_rest_response(Some(&payload)).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1672531200);
        assert_eq!(candles[0].volume, 8.0);
        assert_eq!(candles[0].quote_asset_volume, 10.0);
        assert_eq!(candles[0].n_trades, 12);
    }

    #[test]
    fn test_parse_rest_error() {
        let adapter = KrakenAdapter::new();
        let err = adapter
            .parse_rest_response(Some(&json!({"error": ["EQuery:Unknown asset pair"]})))
            .unwrap_err();
        assert_eq!(err.to_string(), "거래소 에러 EQuery: Unknown asset pair");
    }

    #[test]
    fn test_ws_bar_open_from_end_time() {
        let adapter = KrakenAdapter::new();
        let push = json!([
            42,
            ["1542057314.748456", "1542057360.435743", "3586.7", "3586.7", "3586.6", "3586.6",
             "3586.68894", "0.03373000", 2],
            "ohlc-1",
            "XBT/USD"
        ]);
        let candles = adapter.parse_ws_message(Some(&push)).unwrap().unwrap();
        assert_eq!(candles[0].timestamp, 1542057300);
        assert_eq!(candles[0].open, 3586.7);
        assert_eq!(candles[0].close, 3586.6);

        let heartbeat = json!({"event": "heartbeat"});
        assert!(adapter.parse_ws_message(Some(&heartbeat)).unwrap().is_none());
        let book = json!([1, {"a": []}, "book-10", "XBT/USD"]);
        assert!(adapter.parse_ws_message(Some(&book)).unwrap().is_none());
    }

    #[test]
    fn test_ws_subscription_unmapped_interval() {
        let adapter = KrakenAdapter::new();
        let sub = adapter.get_ws_subscription_payload("BTC-USD", "1h");
        assert_eq!(sub["subscription"]["interval"], 60);

        let sub = adapter.get_ws_subscription_payload("BTC-USD", "2h");
        assert_eq!(sub["subscription"]["interval"], 120);

        let sub = adapter.get_ws_subscription_payload("BTC-USD", "7x");
        assert_eq!(sub["subscription"]["interval"], "7x");
    }
}
