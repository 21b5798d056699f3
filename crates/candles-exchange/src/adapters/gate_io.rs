//! Gate.io v4 현물/USDT 선물 캔들 어댑터.
//!
//! 현물 REST 행은 `[t, quoteVol, close, high, low, open, baseVol, closed]` 순서이고,
//! 선물 REST는 `{t, v, c, h, l, o, sum}` 객체 배열입니다.
//! `limit`은 `from`/`to`와 함께 보낼 수 없습니다.

use candles_core::{
    sort_candles, CandleData, CandleError, CandleResult, IntervalSpec, IntervalTable,
    TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, num, reported, row_num, text, timestamp};
use crate::traits::{
    clamp_limit, CandleAdapter, RestParamBuilder, RestParams, RestResponseParser,
    TradingPairFormatter, WsMessageCodec,
};

/// 현물/선물 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateIoKind {
    Spot,
    Futures,
}

/// 현물/선물 변형을 구분하는 시장 설정.
#[derive(Debug, Clone, Copy)]
pub struct GateIoMarket {
    /// 레지스트리 식별자
    pub id: &'static str,
    /// 현물/선물
    pub kind: GateIoKind,
    /// 캔들 엔드포인트 경로
    pub rest_path: &'static str,
    /// 심볼 파라미터 이름
    pub symbol_param: &'static str,
    /// WebSocket URL
    pub ws_url: &'static str,
    /// 캔들 채널
    pub channel: &'static str,
    /// ping 채널
    pub ping_channel: &'static str,
    /// 요청당 최대 캔들 수
    pub max_limit: u32,
}

/// Gate.io REST 기본 URL.
pub const GATE_IO_REST_URL: &str = "https://api.gateio.ws";

/// Gate.io 인터벌 테이블.
pub const GATE_IO_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("10s", 10, "10s", true),
    IntervalSpec::new("1m", 60, "1m", true),
    IntervalSpec::new("5m", 300, "5m", true),
    IntervalSpec::new("15m", 900, "15m", true),
    IntervalSpec::new("30m", 1_800, "30m", true),
    IntervalSpec::new("1h", 3_600, "1h", true),
    IntervalSpec::new("4h", 14_400, "4h", true),
    IntervalSpec::new("8h", 28_800, "8h", true),
    IntervalSpec::new("1d", 86_400, "1d", true),
    IntervalSpec::new("1w", 604_800, "7d", true),
    IntervalSpec::new("1M", 2_592_000, "30d", false),
]);

/// Gate.io 현물.
pub const GATE_IO_SPOT: GateIoMarket = GateIoMarket {
    id: "gate_io_spot",
    kind: GateIoKind::Spot,
    rest_path: "/api/v4/spot/candlesticks",
    symbol_param: "currency_pair",
    ws_url: "wss://api.gateio.ws/ws/v4/",
    channel: "spot.candlesticks",
    ping_channel: "spot.ping",
    max_limit: 1000,
};

/// Gate.io USDT 무기한 선물.
pub const GATE_IO_PERPETUAL: GateIoMarket = GateIoMarket {
    id: "gate_io_perpetual",
    kind: GateIoKind::Futures,
    rest_path: "/api/v4/futures/usdt/candlesticks",
    symbol_param: "contract",
    ws_url: "wss://fx-ws.gateio.ws/v4/ws/usdt",
    channel: "futures.candlesticks",
    ping_channel: "futures.ping",
    max_limit: 2000,
};

/// Gate.io 캔들 어댑터.
#[derive(Debug, Clone)]
pub struct GateIoAdapter {
    market: GateIoMarket,
}

impl GateIoAdapter {
    /// 시장 설정으로 어댑터를 생성합니다.
    pub fn new(market: GateIoMarket) -> Self {
        Self { market }
    }

    /// 현물 어댑터.
    pub fn spot() -> Self {
        Self::new(GATE_IO_SPOT)
    }

    /// 무기한 어댑터.
    pub fn perpetual() -> Self {
        Self::new(GATE_IO_PERPETUAL)
    }

    /// 시장 설정.
    pub fn market(&self) -> &GateIoMarket {
        &self.market
    }

    fn parse_spot_row(row: &Value) -> CandleResult<CandleData> {
        let ctx = "gate.io spot candlestick";
        let row = as_array(row, ctx)?;
        Ok(CandleData::new(
            timestamp(row.first(), TimestampUnit::Seconds, ctx)?,
            row_num(row, 5, ctx)?,
            row_num(row, 3, ctx)?,
            row_num(row, 4, ctx)?,
            row_num(row, 2, ctx)?,
            row_num(row, 6, ctx)?,
        )
        .with_quote_asset_volume(row_num(row, 1, ctx)?))
    }

    fn parse_futures_object(obj: &Value) -> CandleResult<CandleData> {
        let ctx = "gate.io futures candlestick";
        if !obj.is_object() {
            return Err(CandleError::unexpected(ctx, "object"));
        }
        Ok(CandleData::new(
            timestamp(obj.get("t"), TimestampUnit::Seconds, ctx)?,
            num(obj.get("o"), ctx)?,
            num(obj.get("h"), ctx)?,
            num(obj.get("l"), ctx)?,
            num(obj.get("c"), ctx)?,
            num(obj.get("v"), ctx)?,
        )
        .with_quote_asset_volume(num(obj.get("sum"), ctx)?))
    }

    fn parse_spot_ws(result: &Value) -> CandleResult<CandleData> {
        let ctx = "gate.io spot ws candlestick";
        if !result.is_object() {
            return Err(CandleError::unexpected(ctx, "object"));
        }
        // 현물 push: v = 호가 자산 거래대금, a = 기준 자산 거래량
        Ok(CandleData::new(
            timestamp(result.get("t"), TimestampUnit::Seconds, ctx)?,
            num(result.get("o"), ctx)?,
            num(result.get("h"), ctx)?,
            num(result.get("l"), ctx)?,
            num(result.get("c"), ctx)?,
            num(result.get("a"), ctx)?,
        )
        .with_quote_asset_volume(num(result.get("v"), ctx)?))
    }
}

impl TradingPairFormatter for GateIoAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        trading_pair.replace('-', "_")
    }
}

impl RestParamBuilder for GateIoAdapter {
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> RestParams {
        let mut params = RestParams::new();
        params.insert(
            self.market.symbol_param.into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        params.insert(
            "interval".into(),
            json!(GATE_IO_INTERVALS.token_or_passthrough(interval)),
        );
        if let Some(start) = start_time {
            params.insert("from".into(), json!(self.to_exchange_time(start)));
        }
        if let Some(end) = end_time {
            params.insert("to".into(), json!(self.to_exchange_time(end)));
        }
        if start_time.is_none() && end_time.is_none() {
            params.insert(
                "limit".into(),
                json!(clamp_limit(limit, self.market.max_limit)),
            );
        }
        params
    }
}

impl RestResponseParser for GateIoAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };

        // {"label": "INVALID_PARAM_VALUE", "message": "..."}
        if let Some(label) = payload.get("label") {
            return Err(reported(label, payload.get("message")));
        }

        let rows = as_array(payload, "gate.io rest response")?;
        let mut candles = match self.market.kind {
            GateIoKind::Spot => rows
                .iter()
                .map(Self::parse_spot_row)
                .collect::<CandleResult<Vec<_>>>()?,
            GateIoKind::Futures => rows
                .iter()
                .map(Self::parse_futures_object)
                .collect::<CandleResult<Vec<_>>>()?,
        };
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for GateIoAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        json!({
            "time": chrono::Utc::now().timestamp(),
            "channel": self.market.channel,
            "event": "subscribe",
            "payload": [
                GATE_IO_INTERVALS.token_or_passthrough(interval),
                self.get_trading_pair_format(trading_pair),
            ],
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        if text(payload.get("channel")) != self.market.channel
            || text(payload.get("event")) != "update"
        {
            return Ok(None);
        }
        let Some(result) = payload.get("result") else {
            return Ok(None);
        };

        let mut candles = match self.market.kind {
            GateIoKind::Spot => vec![Self::parse_spot_ws(result)?],
            GateIoKind::Futures => as_array(result, "gate.io futures ws result")?
                .iter()
                .map(Self::parse_futures_object)
                .collect::<CandleResult<Vec<_>>>()?,
        };
        sort_candles(&mut candles);
        Ok(Some(candles))
    }
}

impl CandleAdapter for GateIoAdapter {
    fn name(&self) -> &'static str {
        self.market.id
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Seconds
    }

    fn intervals(&self) -> IntervalTable {
        GATE_IO_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        GATE_IO_REST_URL
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        self.market.rest_path.to_string()
    }

    fn ws_url(&self) -> &'static str {
        self.market.ws_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_row_column_order() {
        let adapter = GateIoAdapter::spot();
        let payload = json!([[
            "1672531200", "5000", "1.5", "2", "0.5", "1", "3000", "true"
        ]]);
        let c = &adapter.parse_rest_response(Some(&payload)).unwrap()[0];
        assert_eq!(c.timestamp, 1672531200);
        assert_eq!(c.open, 1.0);
        assert_eq!(c.high, 2.0);
        assert_eq!(c.low, 0.5);
        assert_eq!(c.close, 1.5);
        assert_eq!(c.volume, 3000.0);
        assert_eq!(c.quote_asset_volume, 5000.0);
    }

    #[test]
    fn test_futures_objects() {
        let adapter = GateIoAdapter::perpetual();
        let payload = json!([
            {"t": 1672531260, "v": 10, "c": "2", "h": "3", "l": "1", "o": "1.5", "sum": "20"},
            {"t": 1672531200, "v": 5, "c": "1.5", "h": "2", "l": "1", "o": "1", "sum": "7"}
        ]);
        let candles = adapter.parse_rest_response(Some(&payload)).unwrap();
        assert_eq!(candles[0].timestamp, 1672531200);
        assert_eq!(candles[1].open, 1.5);
        assert_eq!(candles[1].quote_asset_volume, 20.0);
    }

    #[test]
    fn test_limit_omitted_with_time_range() {
        let adapter = GateIoAdapter::spot();
        let params = adapter.get_rest_params("BTC-USDT", "1w", Some(100), None, Some(10));
        assert_eq!(params["currency_pair"], json!("BTC_USDT"));
        assert_eq!(params["interval"], json!("7d"));
        assert_eq!(params["from"], json!(100));
        assert!(!params.contains_key("limit"));

        let params = adapter.get_rest_params("BTC-USDT", "1m", None, None, None);
        assert_eq!(params["limit"], json!(1000));
    }

    #[test]
    fn test_error_envelope() {
        let adapter = GateIoAdapter::spot();
        let err = adapter
            .parse_rest_response(Some(&json!({"label": "INVALID_PARAM_VALUE", "message": "bad"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "거래소 에러 INVALID_PARAM_VALUE: bad");
    }

    #[test]
    fn test_ws_update() {
        let adapter = GateIoAdapter::spot();
        let sub = adapter.get_ws_subscription_payload("BTC-USDT", "1m");
        assert_eq!(sub["payload"], json!(["1m", "BTC_USDT"]));

        let push = json!({
            "time": 1672531201, "channel": "spot.candlesticks", "event": "update",
            "result": {"t": "1672531200", "v": "15", "c": "1.5", "h": "2", "l": "0.5",
                       "o": "1", "n": "1m_BTC_USDT", "a": "10", "w": false}
        });
        let c = &adapter.parse_ws_message(Some(&push)).unwrap().unwrap()[0];
        assert_eq!(c.volume, 10.0);
        assert_eq!(c.quote_asset_volume, 15.0);

        let pong = json!({"time": 1, "channel": "spot.pong", "event": "", "result": null});
        assert!(adapter.parse_ws_message(Some(&pong)).unwrap().is_none());
        let ack = json!({"time": 1, "channel": "spot.candlesticks", "event": "subscribe",
                         "result": {"status": "success"}});
        assert!(adapter.parse_ws_message(Some(&ack)).unwrap().is_none());
    }
}
